use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Fixed target URL. When set the session runs in kiosk mode: pinned to
    /// one page with local-storage sync enabled.
    #[serde(default)]
    pub target_url: Option<String>,
    /// Interval between screenshot/snapshot ticks.
    #[serde(default = "default_capture_interval_ms")]
    pub capture_interval_ms: u64,
    /// Upper bound on waiting for a page to become interactive.
    #[serde(default = "default_nav_timeout_secs")]
    pub nav_timeout_secs: u64,
    /// Upper bound on foreground session-lock acquisition.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Explicit browser binary path; auto-discovered when unset.
    #[serde(default)]
    pub browser_path: Option<String>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

fn default_capture_interval_ms() -> u64 {
    1000
}

fn default_nav_timeout_secs() -> u64 {
    10
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_url: None,
            capture_interval_ms: default_capture_interval_ms(),
            nav_timeout_secs: default_nav_timeout_secs(),
            lock_timeout_ms: default_lock_timeout_ms(),
            browser_path: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl SessionConfig {
    pub fn capture_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.capture_interval_ms.max(100))
    }

    pub fn nav_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.nav_timeout_secs.max(1))
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms.max(100))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Override for the persisted state file; defaults to `state.json`
    /// under the base directory.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// Override for the profile-directory root.
    #[serde(default)]
    pub profile_root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            profile_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn state_file(&self, paths: &Paths) -> PathBuf {
        self.storage
            .state_file
            .clone()
            .unwrap_or_else(|| paths.state_file())
    }

    pub fn profile_root(&self, paths: &Paths) -> PathBuf {
        self.storage
            .profile_root
            .clone()
            .unwrap_or_else(|| paths.profiles_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 5000);
        assert!(config.session.target_url.is_none());
        assert_eq!(config.session.capture_interval_ms, 1000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"session": {"targetUrl": "https://example.com"}}"#).unwrap();
        assert_eq!(
            config.session.target_url.as_deref(),
            Some("https://example.com")
        );
        assert_eq!(config.session.nav_timeout_secs, 10);
        assert_eq!(config.gateway.host, "127.0.0.1");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = std::env::temp_dir().join("kioskd_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("config.json");

        let mut config = Config::default();
        config.session.target_url = Some("https://news.ycombinator.com".to_string());
        config.gateway.port = 8080;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.gateway.port, 8080);
        assert_eq!(
            loaded.session.target_url.as_deref(),
            Some("https://news.ycombinator.com")
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
