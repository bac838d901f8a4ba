//! Browser automation driver.
//!
//! One external Chrome process per driver, controlled over the DevTools
//! protocol. The session layer consumes it through the [`Automation`] trait
//! so brokering and state-sync logic never depend on a real browser.

pub mod cdp;
pub mod launch;

use async_trait::async_trait;
use cdp::CdpClient;
use kioskd_core::{CookieRecord, Error, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Child;
use tracing::debug;

pub use launch::find_browser_binary;

/// The automation capability the session broker drives. All calls are
/// stateful and must be serialized by the caller.
#[async_trait]
pub trait Automation: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn cookies(&self) -> Result<Vec<CookieRecord>>;
    async fn add_cookie(&self, cookie: &CookieRecord) -> Result<()>;
    /// Base64-encoded JPEG of the current viewport.
    async fn screenshot(&self) -> Result<String>;
    /// Evaluate an expression in the page context and return its value.
    async fn eval(&self, js: &str) -> Result<Value>;
    /// Synthesize a mouse press + release at viewport coordinates.
    async fn click_at(&self, x: f64, y: f64) -> Result<()>;
    /// Dispatch a raw key event ("keyDown" / "keyUp").
    async fn key_event(&self, kind: &str, key: &str, code: &str, text: Option<&str>)
        -> Result<()>;
    /// Insert text into the focused element, bypassing key events.
    async fn insert_text(&self, text: &str) -> Result<()>;
    async fn close(&mut self);
}

/// Launching policy seam: the broker decides when to start a driver, tests
/// inject fakes here.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self, profile_dir: &Path, kiosk: bool) -> Result<Box<dyn Automation>>;
}

#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    /// Explicit binary path; discovered via well-known locations when unset.
    pub browser_path: Option<String>,
    pub window: Option<(u32, u32)>,
}

#[async_trait]
impl DriverLauncher for ChromeLauncher {
    async fn launch(&self, profile_dir: &Path, kiosk: bool) -> Result<Box<dyn Automation>> {
        let driver = ChromeDriver::launch(
            self.browser_path.clone(),
            profile_dir.to_path_buf(),
            kiosk,
            self.window.unwrap_or((1280, 720)),
        )
        .await?;
        Ok(Box::new(driver))
    }
}

/// A live Chrome process plus its CDP connection.
pub struct ChromeDriver {
    process: Child,
    cdp: CdpClient,
}

impl ChromeDriver {
    pub async fn launch(
        browser_path: Option<String>,
        profile_dir: PathBuf,
        kiosk: bool,
        window: (u32, u32),
    ) -> Result<Self> {
        let browser_path = match browser_path {
            Some(p) => p,
            None => find_browser_binary()
                .ok_or_else(|| Error::StartFailure("no Chrome binary found".to_string()))?,
        };

        let debug_port = launch::find_free_port().await?;
        let process =
            launch::spawn_browser(&browser_path, debug_port, &profile_dir, kiosk, window).await?;

        launch::wait_for_cdp_ready(debug_port, Duration::from_secs(15)).await?;
        let ws_url = launch::get_page_ws_url(debug_port).await?;
        let cdp = CdpClient::connect(&ws_url).await?;

        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;
        cdp.enable_domain("Network").await?;

        Ok(Self { process, cdp })
    }
}

#[async_trait]
impl Automation for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        let result = self
            .cdp
            .send_command("Page.navigate", json!({"url": url}))
            .await?;
        if let Some(text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(Error::InvalidUrl(format!("{}: {}", url, text)));
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.cdp.evaluate("window.location.href").await?;
        value
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Driver("location.href not a string".to_string()))
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        let result = self.cdp.send_command("Network.getCookies", json!({})).await?;
        let cookies = result.get("cookies").cloned().unwrap_or(json!([]));
        Ok(serde_json::from_value(cookies)?)
    }

    async fn add_cookie(&self, cookie: &CookieRecord) -> Result<()> {
        let mut params = json!({
            "name": cookie.name,
            "value": cookie.value,
            "domain": cookie.domain,
            "path": cookie.path,
            "secure": cookie.secure,
            "httpOnly": cookie.http_only,
        });
        if let Some(expires) = cookie.expires {
            params["expires"] = json!(expires);
        }
        if let Some(same_site) = &cookie.same_site {
            params["sameSite"] = json!(same_site);
        }
        let result = self.cdp.send_command("Network.setCookie", params).await?;
        if result.get("success").and_then(|v| v.as_bool()) == Some(false) {
            return Err(Error::Driver(format!(
                "cookie '{}' for '{}' rejected",
                cookie.name, cookie.domain
            )));
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<String> {
        let result = self
            .cdp
            .send_command(
                "Page.captureScreenshot",
                json!({"format": "jpeg", "quality": 70}),
            )
            .await?;
        result
            .get("data")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Driver("no screenshot data returned".to_string()))
    }

    async fn eval(&self, js: &str) -> Result<Value> {
        self.cdp.evaluate(js).await
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        for kind in ["mousePressed", "mouseReleased"] {
            self.cdp
                .send_command(
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": kind,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "clickCount": 1,
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn key_event(
        &self,
        kind: &str,
        key: &str,
        code: &str,
        text: Option<&str>,
    ) -> Result<()> {
        let mut params = json!({
            "type": kind,
            "key": key,
            "code": code,
        });
        if let Some(text) = text {
            params["text"] = json!(text);
        }
        self.cdp
            .send_command("Input.dispatchKeyEvent", params)
            .await?;
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        self.cdp
            .send_command("Input.insertText", json!({"text": text}))
            .await?;
        Ok(())
    }

    async fn close(&mut self) {
        // Graceful close first, then make sure the process is gone.
        if let Err(e) = self.cdp.send_command("Browser.close", json!({})).await {
            debug!("Browser.close failed (may already be gone): {}", e);
        }
        let _ = self.process.kill().await;
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}
