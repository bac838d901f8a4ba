//! Chrome process launch and CDP endpoint discovery.

use kioskd_core::{Error, Result};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::info;

/// Find a Chrome/Chromium binary on the system.
pub fn find_browser_binary() -> Option<String> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

pub(crate) fn build_args(
    debug_port: u16,
    profile_dir: &Path,
    kiosk: bool,
    window: (u32, u32),
) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", profile_dir.display()),
        "--headless=new".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--password-store=basic".to_string(),
    ];
    if kiosk {
        args.push("--kiosk".to_string());
    } else {
        args.push("--start-maximized".to_string());
    }
    args.push(format!("--window-size={},{}", window.0, window.1));
    args.push("about:blank".to_string());
    args
}

pub(crate) async fn spawn_browser(
    browser_path: &str,
    debug_port: u16,
    profile_dir: &Path,
    kiosk: bool,
    window: (u32, u32),
) -> Result<Child> {
    let args = build_args(debug_port, profile_dir, kiosk, window);

    info!(
        browser = browser_path,
        port = debug_port,
        kiosk = kiosk,
        profile = %profile_dir.display(),
        "Launching browser"
    );

    Command::new(browser_path)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::StartFailure(format!("failed to launch {}: {}", browser_path, e)))
}

pub(crate) async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::StartFailure(format!("no free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::StartFailure(format!("no local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll /json/version until the debugging endpoint answers.
pub(crate) async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> Result<()> {
    let start = std::time::Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::StartFailure(format!(
                "CDP endpoint not ready after {}s on port {}",
                timeout.as_secs(),
                port
            )));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if resp.json::<Value>().await.is_ok() {
                return Ok(());
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Resolve the WebSocket URL of the first page target via /json/list.
/// Retries a few times since the page may not appear immediately.
pub(crate) async fn get_page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        let resp = match reqwest::get(&url).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        let targets: Vec<Value> = match resp.json().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        for target in &targets {
            if target.get("type").and_then(|v| v.as_str()) == Some("page") {
                if let Some(ws_url) = target.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }
    }

    Err(Error::StartFailure(
        "no page target found after retries".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn kiosk_flag_follows_mode() {
        let dir = PathBuf::from("/tmp/profile");
        let kiosk_args = build_args(9222, &dir, true, (1280, 720));
        assert!(kiosk_args.iter().any(|a| a == "--kiosk"));

        let general_args = build_args(9222, &dir, false, (1280, 720));
        assert!(!general_args.iter().any(|a| a == "--kiosk"));
        assert!(general_args.iter().any(|a| a == "--start-maximized"));
    }

    #[test]
    fn args_pin_profile_and_port() {
        let dir = PathBuf::from("/tmp/profile-x");
        let args = build_args(9333, &dir, false, (800, 600));
        assert!(args.iter().any(|a| a == "--remote-debugging-port=9333"));
        assert!(args.iter().any(|a| a == "--user-data-dir=/tmp/profile-x"));
        assert!(args.iter().any(|a| a == "--window-size=800,600"));
    }
}
