#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use figment::providers::{Format, Yaml};
use figment::Figment;
use tokio::sync::Notify;

use smdc_client::config::{from_figment, ConfigV1};
use smdc_client::context::{AppContext, Capabilities};
use smdc_client::platform::{LoginCodeSource, Navigator, Notice, NoticeKind, Notifier};

/// Navigator that keeps the full navigation history.
pub struct RecordingNavigator {
    current: Mutex<Option<String>>,
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn on(route: &str) -> Arc<Self> {
        Arc::new(RecordingNavigator {
            current: Mutex::new(Some(route.to_string())),
            redirects: Mutex::new(Vec::new()),
        })
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }

    /// The user opens another view on their own.
    pub fn visit(&self, route: &str) {
        *self.current.lock().unwrap() = Some(route.to_string());
    }
}

impl Navigator for RecordingNavigator {
    fn current_route(&self) -> Option<String> {
        self.current.lock().unwrap().clone()
    }

    fn redirect(&self, route: &str) {
        self.redirects.lock().unwrap().push(route.to_string());
        self.visit(route);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn count(&self, kind: NoticeKind) -> usize {
        self.notices().iter().filter(|n| n.kind == kind).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Hands out a fixed code, counting how often it was asked.
pub struct StaticCodes {
    pub code: String,
    pub calls: AtomicUsize,
}

impl StaticCodes {
    pub fn new(code: &str) -> Arc<Self> {
        Arc::new(StaticCodes {
            code: code.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginCodeSource for StaticCodes {
    async fn login_code(&self) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.code.clone())
    }
}

/// Hands out a code only once released, so concurrent callers can pile up first.
pub struct GatedCodes {
    pub gate: Notify,
    pub calls: AtomicUsize,
}

impl GatedCodes {
    pub fn new() -> Arc<Self> {
        Arc::new(GatedCodes {
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginCodeSource for GatedCodes {
    async fn login_code(&self) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok("gated-code".to_string())
    }
}

pub fn admin_config(base_url: &str) -> ConfigV1 {
    config(&format!(
        r#"
version: "1.0.0"
platform: admin
http:
  base_url: "{base_url}"
session:
  login_route: "/login"
  login_path: "/admin/employee/login"
routes:
  public: ["/about"]
"#
    ))
}

pub fn mini_config(base_url: &str, alternate: Option<&str>) -> ConfigV1 {
    let alternate = alternate
        .map(|a| format!("  alternate_base_url: \"{a}\"\n"))
        .unwrap_or_default();
    config(&format!(
        r#"
version: "1.0.0"
platform: mini
http:
  base_url: "{base_url}"
{alternate}session:
  login_route: "/pages/login/login"
  login_path: "/mini/user/login"
  refresh_path: "/mini/user/refresh"
  whoami_path: "/mini/user/info"
routes:
  lenient: ["/pages/index/index"]
"#
    ))
}

pub fn config(yaml: &str) -> ConfigV1 {
    from_figment(Figment::new().merge(Yaml::string(yaml))).expect("test config should be valid")
}

pub struct TestApp {
    pub context: Arc<AppContext>,
    pub navigator: Arc<RecordingNavigator>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn build(
    config: ConfigV1,
    route: &str,
    login_codes: Option<Arc<dyn LoginCodeSource>>,
) -> TestApp {
    let navigator = RecordingNavigator::on(route);
    let notifier = Arc::new(RecordingNotifier::default());
    let capabilities = Capabilities {
        navigator: navigator.clone(),
        notifier: notifier.clone(),
        login_codes,
    };
    let context =
        Arc::new(AppContext::build(config, capabilities).expect("context should build"));
    TestApp {
        context,
        navigator,
        notifier,
    }
}
