//! Session broker: owns the single driver handle and its locking discipline.
//!
//! All adapter traffic is serialized through one session-wide async mutex,
//! multi-step sequences included. Foreground callers acquire it with a
//! bounded timeout; the capture loop waits for its turn unboundedly. A
//! transport-level driver failure flips the session to Degraded and every
//! call fails fast until an explicit restart.

use crate::capture::{self, Frame, ScreenshotCache};
use crate::interact::{self, Action};
use crate::store::StateStore;
use crate::sync;
use crate::DEFAULT_PAGE;
use kioskd_core::{CookieRecord, Error, Result, SessionConfig};
use kioskd_driver::{Automation, DriverLauncher};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Stopped,
    Starting,
    Ready,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

pub(crate) struct SessionInner {
    pub driver: Option<Box<dyn Automation>>,
    pub profile_dir: Option<PathBuf>,
    /// Fixed page the session is pinned to; `None` means general mode.
    pub kiosk_target: Option<String>,
    pub store: StateStore,
    capture_task: Option<tokio::task::JoinHandle<()>>,
}

pub struct SessionBroker {
    inner: Mutex<SessionInner>,
    /// Lifecycle is readable without queueing on the session lock so
    /// degraded/stopped calls can fail fast.
    lifecycle: StdMutex<Lifecycle>,
    cache: ScreenshotCache,
    launcher: Arc<dyn DriverLauncher>,
    config: SessionConfig,
    profile_root: PathBuf,
}

impl SessionBroker {
    pub fn new(
        config: SessionConfig,
        store: StateStore,
        profile_root: PathBuf,
        launcher: Arc<dyn DriverLauncher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SessionInner {
                driver: None,
                profile_dir: None,
                kiosk_target: None,
                store,
                capture_task: None,
            }),
            lifecycle: StdMutex::new(Lifecycle::Stopped),
            cache: ScreenshotCache::default(),
            launcher,
            config,
            profile_root,
        })
    }

    pub fn status(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, lifecycle: Lifecycle) {
        *self.lifecycle.lock().unwrap_or_else(|e| e.into_inner()) = lifecycle;
    }

    pub(crate) fn mark_degraded(&self) {
        self.set_status(Lifecycle::Degraded);
    }

    pub(crate) fn cache(&self) -> &ScreenshotCache {
        &self.cache
    }

    pub(crate) fn capture_interval(&self) -> std::time::Duration {
        self.config.capture_interval()
    }

    pub(crate) async fn lock_unbounded(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().await
    }

    /// Latest cached frame; never contends the session lock.
    pub fn screenshot(&self) -> Option<Frame> {
        self.cache.latest()
    }

    /// Start the session. No-op if one is already starting or running.
    ///
    /// A fresh profile directory is created per start and never reused.
    /// `url` overrides the configured target; either pins the session into
    /// kiosk mode.
    pub async fn start(self: &Arc<Self>, url: Option<String>) -> Result<StartOutcome> {
        if matches!(self.status(), Lifecycle::Starting | Lifecycle::Ready) {
            return Ok(StartOutcome::AlreadyRunning);
        }

        // Serializes with stop() and any in-flight foreground call.
        let mut inner = self.inner.lock().await;
        if matches!(self.status(), Lifecycle::Starting | Lifecycle::Ready) {
            return Ok(StartOutcome::AlreadyRunning);
        }

        // Clear out whatever a degraded session left behind.
        if let Some(task) = inner.capture_task.take() {
            task.abort();
        }
        if let Some(mut old) = inner.driver.take() {
            old.close().await;
        }
        if let Some(dir) = inner.profile_dir.take() {
            let _ = std::fs::remove_dir_all(&dir);
        }

        let kiosk_target = match url.or_else(|| self.config.target_url.clone()) {
            Some(raw) => Some(interact::normalize_url(&raw, "")?),
            None => None,
        };
        let kiosk = kiosk_target.is_some();

        self.set_status(Lifecycle::Starting);
        info!(kiosk = kiosk, target = ?kiosk_target, "Starting browser session");

        let profile_dir = self.profile_root.join(format!("profile-{}", Uuid::new_v4()));
        if let Err(e) = std::fs::create_dir_all(&profile_dir) {
            self.set_status(Lifecycle::Stopped);
            return Err(Error::StartFailure(format!(
                "cannot create profile dir: {}",
                e
            )));
        }

        let result = self.boot(&mut inner, &profile_dir, &kiosk_target).await;
        let driver = match result {
            Ok(driver) => driver,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&profile_dir);
                self.set_status(Lifecycle::Stopped);
                return Err(Error::StartFailure(e.to_string()));
            }
        };

        inner.driver = Some(driver);
        inner.profile_dir = Some(profile_dir);
        inner.kiosk_target = kiosk_target;
        self.set_status(Lifecycle::Ready);
        inner.capture_task = Some(tokio::spawn(capture::run(Arc::clone(self))));
        info!("Session ready");
        Ok(StartOutcome::Started)
    }

    /// Launch the driver, navigate to the initial page and replay persisted
    /// state. On any error the caller tears the profile directory down.
    async fn boot(
        &self,
        inner: &mut SessionInner,
        profile_dir: &std::path::Path,
        kiosk_target: &Option<String>,
    ) -> Result<Box<dyn Automation>> {
        let mut driver = self.launcher.launch(profile_dir, kiosk_target.is_some()).await?;

        let initial = kiosk_target.clone().unwrap_or_else(|| DEFAULT_PAGE.to_string());
        let nav_timeout = self.config.nav_timeout();

        let booted: Result<()> = async {
            driver.navigate(&initial).await?;
            interact::wait_ready(driver.as_ref(), nav_timeout).await?;

            sync::restore_cookies(driver.as_ref(), &inner.store).await?;

            if let Some(target) = kiosk_target {
                // Cookie restore may have wandered off to cookie origins;
                // local-storage replay only makes sense on the fully loaded
                // target page.
                driver.navigate(target).await?;
                interact::wait_ready(driver.as_ref(), nav_timeout).await?;
                sync::restore_local_storage(driver.as_ref(), &inner.store).await?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = booted {
            driver.close().await;
            return Err(e);
        }
        Ok(driver)
    }

    /// Stop the session: best-effort final snapshot, close the driver,
    /// delete its profile directory. Idempotent.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let mut inner = self.inner.lock().await;

        if let Some(task) = inner.capture_task.take() {
            task.abort();
        }

        let Some(mut driver) = inner.driver.take() else {
            self.set_status(Lifecycle::Stopped);
            return Ok(StopOutcome::NotRunning);
        };

        if self.status() != Lifecycle::Degraded {
            let kiosk = inner.kiosk_target.is_some();
            if let Err(e) = sync::snapshot(driver.as_ref(), &mut inner.store, kiosk).await {
                warn!("Final snapshot failed: {}", e);
            }
        }

        driver.close().await;
        if let Some(dir) = inner.profile_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), "Profile dir not removed: {}", e);
            }
        }
        inner.kiosk_target = None;
        self.cache.clear();
        self.set_status(Lifecycle::Stopped);
        info!("Session stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Acquire the session lock for a foreground call: bounded wait, fail
    /// fast when the session is degraded or not running.
    async fn lock_ready(&self) -> Result<MutexGuard<'_, SessionInner>> {
        match self.status() {
            Lifecycle::Degraded => return Err(Error::Degraded),
            Lifecycle::Stopped => return Err(Error::NotRunning),
            _ => {}
        }

        let guard = tokio::time::timeout(self.config.lock_timeout(), self.inner.lock())
            .await
            .map_err(|_| Error::LockTimeout)?;

        match self.status() {
            Lifecycle::Ready => {}
            Lifecycle::Degraded => return Err(Error::Degraded),
            _ => return Err(Error::NotRunning),
        }
        if guard.driver.is_none() {
            return Err(Error::NotRunning);
        }
        Ok(guard)
    }

    /// Flip to Degraded on transport-level driver loss; other errors pass
    /// through for the gateway boundary to classify.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                warn!("Driver lost, session degraded: {}", e);
                self.mark_degraded();
            }
        }
        result
    }

    pub async fn navigate(&self, url: &str) -> Result<String> {
        let guard = self.lock_ready().await?;
        let Some(driver) = guard.driver.as_ref() else {
            return Err(Error::NotRunning);
        };
        let result = interact::navigate(driver.as_ref(), url, self.config.nav_timeout()).await;
        self.observe(result)
    }

    pub async fn interact(&self, action: &Action) -> Result<()> {
        let guard = self.lock_ready().await?;
        let Some(driver) = guard.driver.as_ref() else {
            return Err(Error::NotRunning);
        };
        let result = interact::dispatch(driver.as_ref(), action, self.config.nav_timeout()).await;
        self.observe(result)
    }

    pub async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        let guard = self.lock_ready().await?;
        let Some(driver) = guard.driver.as_ref() else {
            return Err(Error::NotRunning);
        };
        let result = driver.cookies().await;
        self.observe(result)
    }

    pub async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<()> {
        let guard = self.lock_ready().await?;
        let Some(driver) = guard.driver.as_ref() else {
            return Err(Error::NotRunning);
        };
        for cookie in cookies {
            let result = driver.add_cookie(cookie).await;
            self.observe(result)?;
        }
        Ok(())
    }
}
