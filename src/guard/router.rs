use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use super::guard::{Guard, GuardDecision, Navigation};
use crate::config::RoutesConfig;
use crate::session::redirect::normalize_route;
use crate::session::LoginRedirector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    /// No guard runs.
    Public,
    /// Entry logic runs only when every guard allows it.
    Protected,
    /// Guards run (and may redirect) but entry logic runs regardless.
    Lenient,
}

/// Evaluates the registered guards once per navigation, centrally, instead of
/// every view wrapping its own lifecycle hooks.
pub struct ViewRouter {
    public: HashSet<String>,
    lenient: HashSet<String>,
    redirector: Arc<LoginRedirector>,
    guards: Vec<Arc<dyn Guard>>,
}

impl ViewRouter {
    pub fn new(routes: &RoutesConfig, redirector: Arc<LoginRedirector>) -> Self {
        let normalized = |list: &[String]| {
            list.iter()
                .map(|r| normalize_route(r).to_string())
                .collect::<HashSet<_>>()
        };
        ViewRouter {
            public: normalized(&routes.public),
            lenient: normalized(&routes.lenient),
            redirector,
            guards: Vec::new(),
        }
    }

    pub fn with_guard(mut self, guard: Arc<dyn Guard>) -> Self {
        info!("Registering view guard '{}'", guard.name());
        self.guards.push(guard);
        self
    }

    pub fn policy(&self, route: &str) -> RoutePolicy {
        let route = normalize_route(route);
        if self.redirector.is_login_route(route) || self.public.contains(route) {
            RoutePolicy::Public
        } else if self.lenient.contains(route) {
            RoutePolicy::Lenient
        } else {
            RoutePolicy::Protected
        }
    }

    /// Runs the guards in registration order; the first denial wins.
    pub fn authorize(&self, navigation: &Navigation) -> GuardDecision {
        if self.policy(&navigation.route) == RoutePolicy::Public {
            return GuardDecision::Allow;
        }
        for guard in &self.guards {
            let decision = guard.check(navigation);
            if !decision.is_allowed() {
                debug!(
                    guard = guard.name(),
                    route = navigation.route.as_str(),
                    ?decision,
                    "navigation denied"
                );
                return decision;
            }
        }
        GuardDecision::Allow
    }

    /// Runs `load`, the view's entry logic, when the navigation may proceed.
    /// Returns `None` when a protected view was denied; `load` has not run then.
    pub async fn enter<F, Fut, R>(&self, navigation: Navigation, load: F) -> Option<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let policy = self.policy(&navigation.route);
        let decision = self.authorize(&navigation);
        match (policy, decision) {
            (RoutePolicy::Protected, GuardDecision::Deny { .. }) => None,
            _ => Some(load().await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::AuthGuard;
    use crate::models::Token;
    use crate::platform::{HeadlessNavigator, Navigator};
    use crate::session::RedirectOutcome;
    use crate::store::TokenStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn router() -> (ViewRouter, Arc<TokenStore>, Arc<HeadlessNavigator>) {
        let tokens = Arc::new(TokenStore::in_memory());
        let navigator = Arc::new(HeadlessNavigator::new(Some("/pages/index/index".into())));
        let redirector = Arc::new(LoginRedirector::new(
            navigator.clone(),
            "/pages/login/login",
            Duration::from_secs(3),
        ));
        let routes = RoutesConfig {
            public: vec!["/pages/about/about".into()],
            lenient: vec!["pages/index/index".into()],
        };
        let router = ViewRouter::new(&routes, redirector.clone())
            .with_guard(Arc::new(AuthGuard::new(tokens.clone(), redirector)));
        (router, tokens, navigator)
    }

    #[test]
    fn classifies_routes() {
        let (router, _, _) = router();
        assert_eq!(router.policy("pages/login/login"), RoutePolicy::Public);
        assert_eq!(router.policy("/pages/about/about?from=share"), RoutePolicy::Public);
        assert_eq!(router.policy("/pages/index/index"), RoutePolicy::Lenient);
        assert_eq!(router.policy("/pages/order/order"), RoutePolicy::Protected);
    }

    #[tokio::test]
    async fn denied_view_does_not_load() {
        let (router, _, navigator) = router();
        let loaded = AtomicBool::new(false);
        let flag = &loaded;
        let result = router
            .enter(Navigation::enter("/pages/order/order"), || async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await;
        assert_eq!(result, None);
        assert!(!loaded.load(Ordering::SeqCst));
        assert_eq!(navigator.current_route().as_deref(), Some("/pages/login/login"));
    }

    #[tokio::test]
    async fn lenient_view_loads_and_redirects() {
        let (router, _, navigator) = router();
        let result = router
            .enter(Navigation::enter("/pages/index/index"), || async { 42 })
            .await;
        assert_eq!(result, Some(42));
        assert_eq!(navigator.current_route().as_deref(), Some("/pages/login/login"));
    }

    #[tokio::test]
    async fn authorized_view_loads() {
        let (router, tokens, navigator) = router();
        tokens.set(&Token::new("abc")).unwrap();
        let result = router
            .enter(Navigation::reactivate("/pages/order/order"), || async { "orders" })
            .await;
        assert_eq!(result, Some("orders"));
        assert_eq!(navigator.current_route().as_deref(), Some("/pages/index/index"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_denial_within_cooldown_is_suppressed() {
        let (router, _, navigator) = router();
        assert!(!router.authorize(&Navigation::enter("/pages/order/order")).is_allowed());
        navigator.redirect("/pages/cart/cart");
        assert_eq!(
            router.authorize(&Navigation::enter("/pages/cart/cart")),
            GuardDecision::Deny {
                redirect: RedirectOutcome::Suppressed
            }
        );
        assert_eq!(navigator.current_route().as_deref(), Some("/pages/cart/cart"));
    }
}
