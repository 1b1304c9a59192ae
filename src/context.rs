//! The explicit session context.
//!
//! Built once at start from the configuration and the platform capabilities,
//! handed to whatever UI code needs it, and torn down on logout. It owns the
//! only copies of the session pipeline's shared state: the token store, the
//! refresh coordinator, the login redirector and the cart.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::cart::Cart;
use crate::client::{ApiClient, Transport};
use crate::config::ConfigV1;
use crate::error::ClientError;
use crate::guard::{AuthGuard, ViewRouter};
use crate::models::{Credentials, Session};
use crate::platform::{
    HeadlessNavigator, LogNotifier, LoginCodeSource, Navigator, Notice, Notifier,
};
use crate::session::{self, create_reauthenticator, LoginRedirector, RefreshCoordinator, RestoreOutcome};
use crate::store::{create_store, TokenStore};

/// Platform primitives injected into the pipeline.
#[derive(Clone)]
pub struct Capabilities {
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
    /// Present on platforms that can silently re-authenticate.
    pub login_codes: Option<Arc<dyn LoginCodeSource>>,
}

impl Capabilities {
    pub fn headless() -> Self {
        Capabilities {
            navigator: Arc::new(HeadlessNavigator::default()),
            notifier: Arc::new(LogNotifier),
            login_codes: None,
        }
    }
}

pub struct AppContext {
    config: Arc<ConfigV1>,
    tokens: Arc<TokenStore>,
    redirector: Arc<LoginRedirector>,
    coordinator: Arc<RefreshCoordinator>,
    api: ApiClient,
    router: ViewRouter,
    notifier: Arc<dyn Notifier>,
    cart: Mutex<Cart>,
}

impl AppContext {
    /// Builds the context with the storage layers named in the configuration.
    pub fn build(config: ConfigV1, capabilities: Capabilities) -> Result<Self, ClientError> {
        let tokens = create_store(&config.store, &config.session.token_key)?;
        Self::with_store(config, capabilities, tokens)
    }

    pub fn with_store(
        config: ConfigV1,
        capabilities: Capabilities,
        tokens: TokenStore,
    ) -> Result<Self, ClientError> {
        let config = Arc::new(config);
        let tokens = Arc::new(tokens);
        let transport = Arc::new(Transport::new(&config.http, tokens.clone())?);

        let redirector = Arc::new(LoginRedirector::new(
            capabilities.navigator.clone(),
            &config.session.login_route,
            config.session.redirect_cooldown(),
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            tokens.clone(),
            create_reauthenticator(&config, capabilities.login_codes.clone()),
            redirector.clone(),
            capabilities.notifier.clone(),
            config.session.redirect_cooldown(),
        ));
        let api = ApiClient::new(transport, coordinator.clone(), capabilities.notifier.clone());
        let router = ViewRouter::new(&config.routes, redirector.clone()).with_guard(Arc::new(
            AuthGuard::new(tokens.clone(), redirector.clone()),
        ));

        info!(
            platform = ?config.platform,
            base_url = config.http.base_url.as_str(),
            has_session = tokens.has_token(),
            "session context ready"
        );

        Ok(AppContext {
            config,
            tokens,
            redirector,
            coordinator,
            api,
            router,
            notifier: capabilities.notifier,
            cart: Mutex::new(Cart::new()),
        })
    }

    pub fn config(&self) -> &ConfigV1 {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn router(&self) -> &ViewRouter {
        &self.router
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn redirector(&self) -> &Arc<LoginRedirector> {
        &self.redirector
    }

    pub fn session(&self) -> Session {
        Session {
            token: self.tokens.get(),
            principal: self.tokens.principal(),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.tokens.has_token()
    }

    /// Logs in with username and password. Failures are shown to the user and returned.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ClientError> {
        let result = session::login(
            self.api.transport(),
            &self.config.session.login_path,
            credentials,
        )
        .await;
        match &result {
            Ok(_) => {
                self.coordinator.reset();
                self.redirector.reset();
            }
            Err(e) => self.notifier.notify(Notice::error(e.user_message())),
        }
        result
    }

    /// Ends the session: token, principal and cart are gone afterwards.
    pub fn logout(&self) -> Result<(), ClientError> {
        self.with_cart(Cart::clear);
        let cleared = session::logout(&self.tokens);
        // after clearing, so queued callers see no session
        self.coordinator.reset();
        self.redirector.reset();
        cleared?;
        Ok(())
    }

    /// Launch-time check of a stored session against the backend.
    pub async fn restore(&self) -> RestoreOutcome {
        let outcome = session::restore(self.api.transport(), &self.config.session.whoami_path).await;
        if outcome == RestoreOutcome::Cleared {
            self.with_cart(Cart::clear);
        }
        outcome
    }

    pub fn with_cart<R>(&self, f: impl FnOnce(&mut Cart) -> R) -> R {
        let mut cart = self.cart.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut cart)
    }
}
