use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".kioskd"))
            .unwrap_or_else(|| PathBuf::from(".kioskd"));
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Flat key/value store holding cookie slots and local-storage entries.
    pub fn state_file(&self) -> PathBuf {
        self.base.join("state.json")
    }

    /// Root for per-start browser profile directories. Each start gets a
    /// fresh subdirectory; none is ever reused.
    pub fn profiles_dir(&self) -> PathBuf {
        self.base.join("profiles")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
