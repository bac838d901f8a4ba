pub mod config;
pub mod cookie;
pub mod error;
pub mod paths;

pub use config::{Config, GatewayConfig, SessionConfig, StorageConfig};
pub use cookie::CookieRecord;
pub use error::{Error, Result};
pub use paths::Paths;
