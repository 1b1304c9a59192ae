use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Minimum spacing between forced navigations to the login view.
#[derive(Debug)]
pub struct RedirectCooldown {
    window: Duration,
    last: Mutex<Option<Instant>>,
}

impl RedirectCooldown {
    pub fn new(window: Duration) -> Self {
        RedirectCooldown {
            window,
            last: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a redirect now unless one was recorded within the window.
    /// Returns whether the caller may navigate.
    pub fn try_begin(&self) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    pub fn is_active(&self) -> bool {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.is_some_and(|at| at.elapsed() < self.window)
    }

    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
