//! Screenshot cache and the periodic capture/snapshot loop.

use crate::broker::{Lifecycle, SessionBroker};
use crate::sync;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, warn};

/// The most recent frame. Single slot, no history.
#[derive(Debug, Clone)]
pub struct Frame {
    pub captured_at: DateTime<Utc>,
    /// Base64-encoded JPEG.
    pub image_base64: String,
}

impl Frame {
    pub fn new(image_base64: String) -> Self {
        Self {
            captured_at: Utc::now(),
            image_base64,
        }
    }
}

/// One-slot frame cache behind its own lock, so screenshot reads never
/// contend with the session lock.
#[derive(Default)]
pub struct ScreenshotCache {
    slot: RwLock<Option<Frame>>,
}

impl ScreenshotCache {
    pub fn store(&self, frame: Frame) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(frame);
        }
    }

    pub fn latest(&self) -> Option<Frame> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }
}

/// Periodic task spawned per successful start: capture a frame into the
/// cache, then snapshot cookie/local-storage state. Waits unboundedly for
/// its turn on the session lock; exits when the session leaves Ready for
/// good or the driver is lost.
pub(crate) async fn run(broker: Arc<SessionBroker>) {
    let interval = broker.capture_interval();
    debug!("Capture loop started");

    loop {
        tokio::time::sleep(interval).await;

        match broker.status() {
            Lifecycle::Ready => {}
            Lifecycle::Starting => continue,
            _ => break,
        }

        let mut guard = broker.lock_unbounded().await;
        if broker.status() != Lifecycle::Ready {
            break;
        }
        let inner = &mut *guard;
        let Some(driver) = inner.driver.as_ref() else {
            break;
        };

        match driver.screenshot().await {
            Ok(data) => broker.cache().store(Frame::new(data)),
            Err(e) if e.is_fatal() => {
                error!("Driver lost during capture, session degraded: {}", e);
                broker.mark_degraded();
                break;
            }
            Err(e) => {
                // Transitional page states make captures flaky; next tick
                // will retry.
                debug!("Transient capture failure: {}", e);
                continue;
            }
        }

        let kiosk = inner.kiosk_target.is_some();
        match sync::snapshot(driver.as_ref(), &mut inner.store, kiosk).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                error!("Driver lost during snapshot, session degraded: {}", e);
                broker.mark_degraded();
                break;
            }
            Err(e) => warn!("State snapshot failed: {}", e),
        }
    }

    debug!("Capture loop exited");
}
