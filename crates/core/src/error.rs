use thiserror::Error;

/// Error taxonomy shared across the workspace.
///
/// `DriverLost` is the transport-level class: the browser process or its
/// control channel is gone and the session must be restarted explicitly.
/// `Driver` covers command-level failures the session survives.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("browser start failed: {0}")]
    StartFailure(String),

    #[error("session degraded, restart required")]
    Degraded,

    #[error("session not running")]
    NotRunning,

    #[error("session busy, try again")]
    LockTimeout,

    #[error("{0}")]
    ElementNotFound(String),

    #[error("navigation timed out")]
    NavigationTimeout,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("driver connection lost: {0}")]
    DriverLost(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True when the underlying browser handle can no longer be trusted
    /// and the session should transition to Degraded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::DriverLost(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
