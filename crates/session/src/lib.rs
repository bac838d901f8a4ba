//! Session layer: one long-lived browser automation session behind a broker,
//! with persisted cookie/local-storage state and a periodic screenshot loop.

pub mod broker;
pub mod capture;
pub mod interact;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use broker::{Lifecycle, SessionBroker, StartOutcome, StopOutcome};
pub use capture::{Frame, ScreenshotCache};
pub use interact::Action;
pub use store::StateStore;

/// Page a general-mode session opens when it has nowhere else to go.
pub const DEFAULT_PAGE: &str = "https://www.google.com";
