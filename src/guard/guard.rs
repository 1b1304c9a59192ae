use std::sync::Arc;

use tracing::debug;

use crate::session::{LoginRedirector, RedirectOutcome};
use crate::store::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// The view is entered.
    Enter,
    /// An already loaded view is shown again.
    Reactivate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub route: String,
    pub kind: NavigationKind,
}

impl Navigation {
    pub fn enter(route: impl Into<String>) -> Self {
        Navigation {
            route: route.into(),
            kind: NavigationKind::Enter,
        }
    }

    pub fn reactivate(route: impl Into<String>) -> Self {
        Navigation {
            route: route.into(),
            kind: NavigationKind::Reactivate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny { redirect: RedirectOutcome },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// A check evaluated by the router before a protected view runs its entry logic.
pub trait Guard: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, navigation: &Navigation) -> GuardDecision;
}

/// Lets a navigation through only while a token is stored.
pub struct AuthGuard {
    tokens: Arc<TokenStore>,
    redirector: Arc<LoginRedirector>,
}

impl AuthGuard {
    pub fn new(tokens: Arc<TokenStore>, redirector: Arc<LoginRedirector>) -> Self {
        AuthGuard { tokens, redirector }
    }

    /// Whether a token is stored. When it is not, the user is sent to the
    /// login view, subject to the redirect cooldown.
    pub fn allow(&self) -> GuardDecision {
        if self.tokens.has_token() {
            return GuardDecision::Allow;
        }
        GuardDecision::Deny {
            redirect: self.redirector.redirect_to_login(),
        }
    }
}

impl Guard for AuthGuard {
    fn name(&self) -> &str {
        "auth"
    }

    fn check(&self, navigation: &Navigation) -> GuardDecision {
        if self.redirector.is_login_route(&navigation.route) {
            return GuardDecision::Allow;
        }
        let decision = self.allow();
        if !decision.is_allowed() {
            debug!(route = navigation.route.as_str(), kind = ?navigation.kind, "no token, denying");
        }
        decision
    }
}
