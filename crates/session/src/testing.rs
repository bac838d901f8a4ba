//! Recording fake driver used by the crate's tests.

use async_trait::async_trait;
use kioskd_core::{CookieRecord, Error, Result};
use kioskd_driver::{Automation, DriverLauncher};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    calls: Mutex<Vec<String>>,
    cookies: Mutex<Vec<CookieRecord>>,
    local: Mutex<BTreeMap<String, String>>,
    current_url: Mutex<String>,
    rejected_cookies: Mutex<HashSet<String>>,
    eval_queue: Mutex<VecDeque<Value>>,
    fatal: AtomicBool,
    click_delay_ms: AtomicU64,
    frame_counter: AtomicU64,
}

#[derive(Clone, Default)]
pub(crate) struct FakeDriver {
    state: Arc<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        driver.set_current_url("about:blank");
        driver
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    fn record(&self, call: impl Into<String>) {
        self.state.calls.lock().unwrap().push(call.into());
    }

    fn gate(&self) -> Result<()> {
        if self.state.fatal.load(Ordering::SeqCst) {
            Err(Error::DriverLost("fake driver marked dead".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn set_fatal(&self) {
        self.state.fatal.store(true, Ordering::SeqCst);
    }

    pub fn seed_cookies(&self, cookies: Vec<CookieRecord>) {
        *self.state.cookies.lock().unwrap() = cookies;
    }

    pub fn live_cookies(&self) -> Vec<CookieRecord> {
        self.state.cookies.lock().unwrap().clone()
    }

    pub fn reject_cookie(&self, name: &str) {
        self.state
            .rejected_cookies
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub fn set_current_url(&self, url: &str) {
        *self.state.current_url.lock().unwrap() = url.to_string();
    }

    pub fn seed_local_storage(&self, items: &[(&str, &str)]) {
        let mut local = self.state.local.lock().unwrap();
        local.clear();
        for (k, v) in items {
            local.insert(k.to_string(), v.to_string());
        }
    }

    pub fn local_storage_value(&self, key: &str) -> Option<String> {
        self.state.local.lock().unwrap().get(key).cloned()
    }

    pub fn push_eval(&self, value: Value) {
        self.state.eval_queue.lock().unwrap().push_back(value);
    }

    pub fn set_click_delay_ms(&self, ms: u64) {
        self.state.click_delay_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl Automation for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.gate()?;
        self.record(format!("navigate:{}", url));
        self.set_current_url(url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.gate()?;
        self.record("current_url");
        Ok(self.state.current_url.lock().unwrap().clone())
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        self.gate()?;
        self.record("cookies");
        Ok(self.live_cookies())
    }

    async fn add_cookie(&self, cookie: &CookieRecord) -> Result<()> {
        self.gate()?;
        self.record(format!("add_cookie:{}/{}", cookie.domain, cookie.name));
        if self
            .state
            .rejected_cookies
            .lock()
            .unwrap()
            .contains(&cookie.name)
        {
            return Err(Error::Driver(format!("cookie '{}' rejected", cookie.name)));
        }
        let mut cookies = self.state.cookies.lock().unwrap();
        cookies.retain(|c| c.identity() != cookie.identity());
        cookies.push(cookie.clone());
        Ok(())
    }

    async fn screenshot(&self) -> Result<String> {
        self.gate()?;
        self.record("screenshot");
        let n = self.state.frame_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("frame-{}", n))
    }

    async fn eval(&self, js: &str) -> Result<Value> {
        self.gate()?;
        if js.contains("ls.getItem") {
            self.record("eval:local_items");
            let local = self.state.local.lock().unwrap();
            let map: serde_json::Map<String, Value> = local
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            return Ok(Value::Object(map));
        }
        if let Some(inner) = js
            .strip_prefix("localStorage.setItem(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            self.record("eval:local_set");
            let args: Vec<String> = serde_json::from_str(&format!("[{}]", inner))
                .map_err(|e| Error::Driver(format!("bad setItem args: {}", e)))?;
            if let [key, value] = args.as_slice() {
                self.state
                    .local
                    .lock()
                    .unwrap()
                    .insert(key.clone(), value.clone());
            }
            return Ok(Value::Null);
        }
        if js.contains("document.readyState") {
            self.record("eval:ready_state");
            return Ok(json!("complete"));
        }
        if js.contains("elementFromPoint") {
            self.record("eval:element");
            let queued = self.state.eval_queue.lock().unwrap().pop_front();
            return Ok(queued.unwrap_or(json!("ok")));
        }
        if js.contains("scrollBy") {
            self.record("eval:scroll");
            return Ok(Value::Null);
        }
        self.record("eval:other");
        Ok(self
            .state
            .eval_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Value::Null))
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        self.gate()?;
        self.record(format!("click:begin:{},{}", x, y));
        let delay = self.state.click_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        self.record("click:end");
        Ok(())
    }

    async fn key_event(
        &self,
        kind: &str,
        key: &str,
        _code: &str,
        _text: Option<&str>,
    ) -> Result<()> {
        self.gate()?;
        self.record(format!("key:{}:{}", kind, key));
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        self.gate()?;
        self.record(format!("insert_text:{}", text));
        Ok(())
    }

    async fn close(&mut self) {
        self.record("close");
    }
}

/// Hands out handles to one shared fake driver and counts launches.
pub(crate) struct FakeLauncher {
    pub driver: FakeDriver,
    pub launches: AtomicUsize,
    pub fail_launch: AtomicBool,
}

impl FakeLauncher {
    pub fn new(driver: FakeDriver) -> Arc<Self> {
        Arc::new(Self {
            driver,
            launches: AtomicUsize::new(0),
            fail_launch: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl DriverLauncher for FakeLauncher {
    async fn launch(&self, _profile_dir: &Path, _kiosk: bool) -> Result<Box<dyn Automation>> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(Error::StartFailure("fake launch refused".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.driver.clone()))
    }
}
