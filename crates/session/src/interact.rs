//! Interaction dispatcher: maps abstract user actions onto driver calls.
//!
//! Runs under the broker's exclusive session lock; every fallible step
//! returns a classified error rather than panicking or hanging.

use kioskd_core::{Error, Result};
use kioskd_driver::Automation;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::DEFAULT_PAGE;

/// Wire shape of `POST /session/interact`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        x: f64,
        y: f64,
    },
    Type {
        x: f64,
        y: f64,
        text: String,
    },
    Keypress {
        x: f64,
        y: f64,
        key: String,
    },
    Scroll {
        // Clients send the offsets as `x`/`y` like the positional actions.
        #[serde(default, alias = "x")]
        dx: f64,
        #[serde(default, alias = "y")]
        dy: f64,
    },
    Navigate {
        #[serde(alias = "text")]
        url: String,
    },
}

const NO_TARGET: &str = "no target at location";

fn element_probe_js(x: f64, y: f64) -> String {
    format!(
        "(() => {{ const el = document.elementFromPoint({x}, {y}); \
         return el ? 'ok' : 'none'; }})()"
    )
}

fn editable_probe_js(x: f64, y: f64) -> String {
    format!(
        "(() => {{ \
         const el = document.elementFromPoint({x}, {y}); \
         if (!el) return 'none'; \
         const tag = el.tagName; \
         const editable = el.isContentEditable || \
           ((tag === 'INPUT' || tag === 'TEXTAREA') && !el.disabled); \
         if (!editable) return 'none'; \
         el.focus(); \
         if (tag === 'INPUT' || tag === 'TEXTAREA') {{ el.value = ''; }} \
         else {{ el.textContent = ''; }} \
         return 'ok'; }})()"
    )
}

fn focus_probe_js(x: f64, y: f64) -> String {
    format!(
        "(() => {{ const el = document.elementFromPoint({x}, {y}); \
         if (!el) return 'none'; el.focus(); return 'ok'; }})()"
    )
}

async fn probe(driver: &dyn Automation, js: &str) -> Result<()> {
    let value = driver.eval(js).await?;
    if value.as_str() == Some("ok") {
        Ok(())
    } else {
        Err(Error::ElementNotFound(NO_TARGET.to_string()))
    }
}

/// Map a key name to the (key, code, text) triple of a synthesized key
/// event. A few names carry semantic codes; everything else passes through.
fn key_descriptor(key: &str) -> (String, String, Option<String>) {
    match key {
        "Enter" => ("Enter".to_string(), "Enter".to_string(), Some("\r".to_string())),
        "Backspace" => ("Backspace".to_string(), "Backspace".to_string(), None),
        "Tab" => ("Tab".to_string(), "Tab".to_string(), Some("\t".to_string())),
        other => {
            let code = match other.chars().next() {
                Some(c) if other.len() == 1 && c.is_ascii_alphabetic() => {
                    format!("Key{}", c.to_ascii_uppercase())
                }
                _ => other.to_string(),
            };
            let text = if other.chars().count() == 1 {
                Some(other.to_string())
            } else {
                None
            };
            (other.to_string(), code, text)
        }
    }
}

fn with_default_scheme(raw: &str) -> Option<String> {
    Url::parse(&format!("http://{}", raw))
        .ok()
        .filter(|u| u.has_host())
        .map(|u| u.to_string())
}

/// Normalize a navigation target: keep absolute URLs, resolve path-relative
/// refs against the current location, and default the scheme for bare hosts.
pub fn normalize_url(raw: &str, current: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidUrl("empty target".to_string()));
    }

    match Url::parse(raw) {
        Ok(u) if u.has_host() => return Ok(u.to_string()),
        // "localhost:5000" parses with "localhost" as the scheme; retry
        // with a default scheme before giving up.
        Ok(_) => {
            return with_default_scheme(raw).ok_or_else(|| Error::InvalidUrl(raw.to_string()))
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {}
        Err(e) => return Err(Error::InvalidUrl(format!("{}: {}", raw, e))),
    }

    if raw.starts_with('/') || raw.starts_with("./") || raw.starts_with("../") {
        let base = if current.is_empty()
            || current.starts_with("about:")
            || current.starts_with("data:")
        {
            DEFAULT_PAGE
        } else {
            current
        };
        let base = Url::parse(base).map_err(|e| Error::InvalidUrl(format!("{}: {}", base, e)))?;
        return base
            .join(raw)
            .map(|u| u.to_string())
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)));
    }

    with_default_scheme(raw).ok_or_else(|| Error::InvalidUrl(raw.to_string()))
}

/// Poll until the document leaves the "loading" state, bounded by `timeout`.
pub async fn wait_ready(driver: &dyn Automation, timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match driver.eval("document.readyState").await {
            Ok(v) if v.as_str().is_some_and(|s| s != "loading") => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            // Evaluation can fail mid-navigation while the context is being
            // swapped; keep polling.
            _ => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::NavigationTimeout);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Normalize, navigate and wait for minimal interactivity. Returns the URL
/// the session landed on.
pub async fn navigate(driver: &dyn Automation, raw: &str, timeout: Duration) -> Result<String> {
    let current = driver.current_url().await.unwrap_or_default();
    let target = normalize_url(raw, &current)?;
    driver.navigate(&target).await?;
    wait_ready(driver, timeout).await?;
    driver.current_url().await
}

pub async fn dispatch(
    driver: &dyn Automation,
    action: &Action,
    nav_timeout: Duration,
) -> Result<()> {
    match action {
        Action::Click { x, y } => {
            probe(driver, &element_probe_js(*x, *y)).await?;
            driver.click_at(*x, *y).await
        }
        Action::Type { x, y, text } => {
            probe(driver, &editable_probe_js(*x, *y)).await?;
            driver.insert_text(text).await
        }
        Action::Keypress { x, y, key } => {
            probe(driver, &focus_probe_js(*x, *y)).await?;
            let (key, code, text) = key_descriptor(key);
            driver
                .key_event("keyDown", &key, &code, text.as_deref())
                .await?;
            driver.key_event("keyUp", &key, &code, None).await
        }
        Action::Scroll { dx, dy } => {
            driver
                .eval(&format!("window.scrollBy({}, {})", dx, dy))
                .await?;
            Ok(())
        }
        Action::Navigate { url } => {
            navigate(driver, url, nav_timeout).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDriver;
    use serde_json::json;

    #[test]
    fn normalize_keeps_absolute_urls() {
        assert_eq!(
            normalize_url("https://example.com/a?b=1", "").unwrap(),
            "https://example.com/a?b=1"
        );
    }

    #[test]
    fn normalize_defaults_scheme_for_bare_hosts() {
        assert_eq!(
            normalize_url("example.com", "https://other.io/").unwrap(),
            "http://example.com/"
        );
        assert_eq!(
            normalize_url("localhost:5000/admin", "").unwrap(),
            "http://localhost:5000/admin"
        );
    }

    #[test]
    fn normalize_resolves_relative_against_current() {
        assert_eq!(
            normalize_url("/about", "https://example.com/x/y").unwrap(),
            "https://example.com/about"
        );
        assert_eq!(
            normalize_url("../up", "https://example.com/a/b/c").unwrap(),
            "https://example.com/a/up"
        );
    }

    #[test]
    fn normalize_relative_on_blank_page_uses_default() {
        let resolved = normalize_url("/search", "about:blank").unwrap();
        assert!(resolved.starts_with("https://www.google.com/"));
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize_url("", "").is_err());
        assert!(normalize_url("http://", "").is_err());
    }

    #[test]
    fn key_descriptor_maps_semantic_names() {
        assert_eq!(
            key_descriptor("Enter"),
            ("Enter".to_string(), "Enter".to_string(), Some("\r".to_string()))
        );
        assert_eq!(
            key_descriptor("a"),
            ("a".to_string(), "KeyA".to_string(), Some("a".to_string()))
        );
        let (key, code, text) = key_descriptor("F5");
        assert_eq!((key.as_str(), code.as_str(), text), ("F5", "F5", None));
    }

    #[tokio::test]
    async fn click_with_no_target_makes_no_state_change() {
        let driver = FakeDriver::new();
        driver.push_eval(json!("none"));

        let err = dispatch(
            &driver,
            &Action::Click { x: 10.0, y: 20.0 },
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::ElementNotFound(_)));
        assert_eq!(err.to_string(), "no target at location");
        // Only the read-only probe ran.
        assert_eq!(driver.calls(), vec!["eval:element".to_string()]);
    }

    #[tokio::test]
    async fn click_hits_resolved_target() {
        let driver = FakeDriver::new();
        dispatch(
            &driver,
            &Action::Click { x: 5.0, y: 6.0 },
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                "eval:element".to_string(),
                "click:begin:5,6".to_string(),
                "click:end".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn type_inserts_text_after_probe() {
        let driver = FakeDriver::new();
        dispatch(
            &driver,
            &Action::Type {
                x: 1.0,
                y: 2.0,
                text: "hello".to_string(),
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(driver.calls().contains(&"insert_text:hello".to_string()));
    }

    #[tokio::test]
    async fn keypress_sends_down_then_up() {
        let driver = FakeDriver::new();
        dispatch(
            &driver,
            &Action::Keypress {
                x: 1.0,
                y: 2.0,
                key: "Enter".to_string(),
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        let calls = driver.calls();
        assert!(calls.contains(&"key:keyDown:Enter".to_string()));
        assert!(calls.contains(&"key:keyUp:Enter".to_string()));
    }

    #[tokio::test]
    async fn interact_navigate_normalizes_target() {
        let driver = FakeDriver::new();
        driver.set_current_url("https://example.com/home");
        dispatch(
            &driver,
            &Action::Navigate {
                url: "/next".to_string(),
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(driver
            .calls()
            .contains(&"navigate:https://example.com/next".to_string()));
    }

    #[test]
    fn action_parses_from_wire_shape() {
        let action: Action =
            serde_json::from_value(json!({"type": "click", "x": 10, "y": 20})).unwrap();
        assert!(matches!(action, Action::Click { .. }));

        let action: Action =
            serde_json::from_value(json!({"type": "navigate", "text": "example.com"})).unwrap();
        match action {
            Action::Navigate { url } => assert_eq!(url, "example.com"),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn scroll_accepts_coordinate_field_names() {
        let action: Action =
            serde_json::from_value(json!({"type": "scroll", "x": 0, "y": 120})).unwrap();
        match action {
            Action::Scroll { dx, dy } => assert_eq!((dx, dy), (0.0, 120.0)),
            other => panic!("unexpected action {:?}", other),
        }

        let action: Action =
            serde_json::from_value(json!({"type": "scroll", "dx": -5, "dy": 7})).unwrap();
        match action {
            Action::Scroll { dx, dy } => assert_eq!((dx, dy), (-5.0, 7.0)),
            other => panic!("unexpected action {:?}", other),
        }
    }
}
