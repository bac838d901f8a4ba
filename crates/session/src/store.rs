//! Persisted state store.
//!
//! One flat string-to-JSON mapping in a single file. Numeric-string keys
//! ("0".."N-1") hold the ordered cookie snapshot and are fully replaced on
//! every snapshot; alphabetic-string keys hold local-storage values and are
//! only ever upserted. The two namespaces never collide.

use kioskd_core::{CookieRecord, Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct StateStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

fn is_slot_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_digit())
}

fn is_local_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_alphabetic())
}

impl StateStore {
    /// Open the store at `path`. A missing file is an empty store; a corrupt
    /// one is logged and treated as empty rather than blocking startup.
    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, Value>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), "State file unreadable, starting empty: {}", e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cookie snapshot in ascending slot order. Slots that no longer parse
    /// as cookie records are skipped.
    pub fn cookie_slots(&self) -> Vec<CookieRecord> {
        let mut slots: Vec<(usize, &Value)> = self
            .entries
            .iter()
            .filter(|(k, _)| is_slot_key(k))
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|n| (n, v)))
            .collect();
        slots.sort_by_key(|(n, _)| *n);

        slots
            .into_iter()
            .filter_map(|(n, v)| match serde_json::from_value(v.clone()) {
                Ok(cookie) => Some(cookie),
                Err(e) => {
                    warn!(slot = n, "Skipping malformed cookie slot: {}", e);
                    None
                }
            })
            .collect()
    }

    pub fn has_cookie_slots(&self) -> bool {
        self.entries.keys().any(|k| is_slot_key(k))
    }

    /// Replace the entire cookie snapshot: clear every numeric key, then
    /// write slots "0".."N-1" in the given order. Never merges.
    pub fn replace_cookie_slots(&mut self, cookies: &[CookieRecord]) -> Result<()> {
        self.entries.retain(|k, _| !is_slot_key(k));
        for (slot, cookie) in cookies.iter().enumerate() {
            self.entries
                .insert(slot.to_string(), serde_json::to_value(cookie)?);
        }
        self.persist()
    }

    /// Local-storage entries (alphabetic keys with string values).
    pub fn local_entries(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|(k, _)| is_local_key(k))
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    }

    pub fn has_local_entries(&self) -> bool {
        self.entries.keys().any(|k| is_local_key(k))
    }

    /// Upsert local-storage entries. Entries removed in the browser are
    /// deliberately left in place (accumulate-only, matching the snapshot
    /// protocol's accepted asymmetry). Keys that would land in the numeric
    /// namespace are refused.
    pub fn merge_local_entries<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut changed = false;
        for (key, value) in items {
            if !is_local_key(&key) {
                warn!(key = %key, "Skipping local-storage key outside the alphabetic namespace");
                continue;
            }
            let value = Value::String(value);
            if self.entries.get(&key) != Some(&value) {
                self.entries.insert(key, value);
                changed = true;
            }
        }
        if changed {
            self.persist()
        } else {
            Ok(())
        }
    }

    /// Rewrite the whole file through a temp file + atomic rename so readers
    /// never observe a partial write.
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            Error::Storage(format!(
                "atomic replace of {} failed: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}
