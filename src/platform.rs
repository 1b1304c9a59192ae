//! Capabilities the host platform provides to the pipeline.
//!
//! The admin dashboard and the mini-program differ only in these: where the
//! current view is and how to navigate, how to show a notification, and how
//! to obtain a one-time login code for silent re-authentication.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::SESSION_EXPIRED_MESSAGE;

/// Navigation primitives of the UI framework.
pub trait Navigator: Send + Sync {
    /// The route of the view currently shown, if any.
    fn current_route(&self) -> Option<String>;
    /// Replace the current view with `route`.
    fn redirect(&self, route: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Error,
    SessionExpired,
}

/// A dismissable user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Notice {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    pub fn session_expired() -> Self {
        Notice {
            kind: NoticeKind::SessionExpired,
            message: SESSION_EXPIRED_MESSAGE.to_string(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Source of one-time login codes (the `wx.login` analogue) used to
/// re-authenticate without user interaction.
#[async_trait]
pub trait LoginCodeSource: Send + Sync {
    async fn login_code(&self) -> Result<String, String>;
}

/// Navigator for headless runs: remembers the route and logs navigations.
pub struct HeadlessNavigator {
    current: Mutex<Option<String>>,
}

impl HeadlessNavigator {
    pub fn new(initial_route: Option<String>) -> Self {
        HeadlessNavigator {
            current: Mutex::new(initial_route),
        }
    }
}

impl Default for HeadlessNavigator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Navigator for HeadlessNavigator {
    fn current_route(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn redirect(&self, route: &str) {
        info!(route, "Navigating");
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(route.to_string());
    }
}

/// Notifier for headless runs: notices become log lines.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Error => warn!(kind = "error", "{}", notice.message),
            NoticeKind::SessionExpired => warn!(kind = "session_expired", "{}", notice.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_navigator_tracks_route() {
        let navigator = HeadlessNavigator::new(Some("/home".to_string()));
        assert_eq!(navigator.current_route().as_deref(), Some("/home"));
        navigator.redirect("/login");
        assert_eq!(navigator.current_route().as_deref(), Some("/login"));
    }
}
