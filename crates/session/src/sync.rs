//! State synchronizer: moves cookies and local-storage between the live
//! driver and the persisted store.
//!
//! Per-item failures are logged and skipped; only transport-level driver
//! loss propagates to the caller.

use crate::store::StateStore;
use kioskd_core::{CookieRecord, Result};
use kioskd_driver::Automation;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const LOCAL_STORAGE_ITEMS_JS: &str = "(() => { \
     const ls = window.localStorage, items = {}; \
     for (let i = 0; i < ls.length; ++i) { \
       const k = ls.key(i); items[k] = ls.getItem(k); \
     } \
     return items; })()";

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

/// Replay persisted cookies into the live session, ascending by slot.
///
/// Duplicate `(domain, name)` pairs collapse last-write-wins: only the
/// highest slot for an identity is replayed, so the winner is deterministic
/// in slot order. A cookie's origin page is visited first when the current
/// host differs, since cookies can only be added for the active host.
pub async fn restore_cookies(driver: &dyn Automation, store: &StateStore) -> Result<()> {
    let cookies = store.cookie_slots();
    if cookies.is_empty() {
        return Ok(());
    }
    info!(count = cookies.len(), "Restoring persisted cookies");

    let mut winner: HashMap<(&str, &str), usize> = HashMap::new();
    for (slot, cookie) in cookies.iter().enumerate() {
        winner.insert(cookie.identity(), slot);
    }

    let mut current_host = match driver.current_url().await {
        Ok(url) => host_of(&url),
        Err(e) if e.is_fatal() => return Err(e),
        Err(_) => None,
    };

    for (slot, cookie) in cookies.iter().enumerate() {
        if winner[&cookie.identity()] != slot {
            debug!(
                domain = %cookie.domain,
                name = %cookie.name,
                slot,
                "Duplicate cookie identity collapsed"
            );
            continue;
        }

        let origin = cookie.origin_url();
        let origin_host = host_of(&origin);
        if origin_host.is_some() && origin_host != current_host {
            match driver.navigate(&origin).await {
                Ok(()) => current_host = origin_host,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(url = %origin, "Skipping cookie, origin unreachable: {}", e);
                    continue;
                }
            }
        }

        match driver.add_cookie(cookie).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                "Skipping cookie: {}", e
            ),
        }
    }
    Ok(())
}

/// Replay persisted local-storage entries into the current page. Only valid
/// once the kiosk target has fully loaded; the broker enforces that ordering.
pub async fn restore_local_storage(driver: &dyn Automation, store: &StateStore) -> Result<()> {
    let entries = store.local_entries();
    if entries.is_empty() {
        return Ok(());
    }
    info!(count = entries.len(), "Restoring persisted local-storage");

    for (key, value) in entries {
        let js = format!(
            "localStorage.setItem({}, {})",
            serde_json::to_string(&key)?,
            serde_json::to_string(&value)?
        );
        match driver.eval(&js).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(key = %key, "Skipping local-storage entry: {}", e),
        }
    }
    Ok(())
}

/// Read the live browser state and persist it. Cookie slots are fully
/// replaced in adapter-returned order; kiosk sessions additionally upsert
/// local-storage entries.
pub async fn snapshot(driver: &dyn Automation, store: &mut StateStore, kiosk: bool) -> Result<()> {
    let cookies = driver.cookies().await?;
    if let Err(e) = store.replace_cookie_slots(&cookies) {
        warn!("Cookie snapshot not persisted: {}", e);
    }

    if kiosk {
        let items = local_storage_items(driver).await?;
        if let Err(e) = store.merge_local_entries(items) {
            warn!("Local-storage snapshot not persisted: {}", e);
        }
    }
    Ok(())
}

async fn local_storage_items(driver: &dyn Automation) -> Result<Vec<(String, String)>> {
    let value = driver.eval(LOCAL_STORAGE_ITEMS_JS).await?;
    let mut items = Vec::new();
    if let Some(map) = value.as_object() {
        for (k, v) in map {
            if let Some(s) = v.as_str() {
                items.push((k.clone(), s.to_string()));
            }
        }
    }
    Ok(items)
}
