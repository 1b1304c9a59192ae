use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::cooldown::RedirectCooldown;
use crate::platform::Navigator;
use crate::utils::LogThrottle;

/// What became of a request to send the user to the login view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOutcome {
    Navigated,
    /// The login view is already shown.
    AlreadyOnLogin,
    /// Another forced navigation happened within the cooldown window.
    Suppressed,
}

/// Issues forced navigations to the login view, at most one per cooldown window.
/// Shared by the refresh coordinator and the route guards.
pub struct LoginRedirector {
    navigator: Arc<dyn Navigator>,
    cooldown: RedirectCooldown,
    login_route: String,
    throttle: LogThrottle,
}

impl LoginRedirector {
    pub fn new(navigator: Arc<dyn Navigator>, login_route: &str, cooldown: Duration) -> Self {
        LoginRedirector {
            navigator,
            cooldown: RedirectCooldown::new(cooldown),
            login_route: login_route.to_string(),
            throttle: LogThrottle::new(Duration::from_secs(10)),
        }
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub fn cooldown(&self) -> &RedirectCooldown {
        &self.cooldown
    }

    /// Routes compare without their leading slash, so `/pages/login/login`
    /// and `pages/login/login` are the same view.
    pub fn is_login_route(&self, route: &str) -> bool {
        normalize_route(route) == normalize_route(&self.login_route)
    }

    pub fn on_login_view(&self) -> bool {
        self.navigator
            .current_route()
            .is_some_and(|route| self.is_login_route(&route))
    }

    pub fn redirect_to_login(&self) -> RedirectOutcome {
        if self.on_login_view() {
            debug!("Already on the login view, not redirecting");
            return RedirectOutcome::AlreadyOnLogin;
        }
        if !self.cooldown.try_begin() {
            if let Some(suppressed) = self.throttle.should_emit("session.redirect.suppressed") {
                info!(
                    event_name = "session.redirect.suppressed",
                    event_domain = "session",
                    suppressed_count = suppressed,
                    "login redirect suppressed, another one happened within {:?}",
                    self.cooldown.window()
                );
            }
            return RedirectOutcome::Suppressed;
        }
        info!(
            event_name = "session.redirect",
            event_domain = "session",
            route = self.login_route.as_str(),
            "redirecting to the login view"
        );
        self.navigator.redirect(&self.login_route);
        RedirectOutcome::Navigated
    }

    pub fn reset(&self) {
        self.cooldown.reset();
    }
}

pub(crate) fn normalize_route(route: &str) -> &str {
    let route = route.trim();
    let route = route.split(['?', '#']).next().unwrap_or(route);
    route.trim_start_matches('/')
}
