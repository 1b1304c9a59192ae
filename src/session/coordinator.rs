//! Recovery from session-invalid signals.
//!
//! The first signal clears the session and starts the only re-authentication
//! exchange; signals arriving while it runs wait for its outcome instead of
//! starting their own. A failed exchange notifies the user, redirects to the
//! login view (subject to the redirect cooldown) and makes further signals fail
//! fast until the cooldown window has passed.
//!
//! A signal is only acted on while the stored token is still the one the
//! rejected request carried. An exchange that outlives a `reset` (an explicit
//! login or logout) is discarded when it finishes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::reauth::Reauthenticator;
use super::redirect::{LoginRedirector, RedirectOutcome};
use crate::client::Transport;
use crate::error::ClientError;
use crate::models::{Session, Token};
use crate::platform::{Notice, Notifier};
use crate::store::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Refreshing,
    RedirectCooldown,
}

/// The single outcome every caller waiting on one re-authentication observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Recovered,
    Failed,
}

enum Phase {
    Idle,
    Refreshing {
        epoch: u64,
        waiters: Vec<oneshot::Sender<Recovery>>,
    },
    Cooldown {
        until: Instant,
    },
}

enum Turn {
    Done(Recovery),
    Wait(oneshot::Receiver<Recovery>),
    Lead(u64),
}

pub struct RefreshCoordinator {
    phase: Mutex<Phase>,
    tokens: Arc<TokenStore>,
    reauth: Box<dyn Reauthenticator>,
    redirector: Arc<LoginRedirector>,
    notifier: Arc<dyn Notifier>,
    cooldown: Duration,
    attempts: AtomicU64,
    // bumped by every reset; a leader from an older epoch is stale
    epoch: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        tokens: Arc<TokenStore>,
        reauth: Box<dyn Reauthenticator>,
        redirector: Arc<LoginRedirector>,
        notifier: Arc<dyn Notifier>,
        cooldown: Duration,
    ) -> Self {
        RefreshCoordinator {
            phase: Mutex::new(Phase::Idle),
            tokens,
            reauth,
            redirector,
            notifier,
            cooldown,
            attempts: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CoordinatorState {
        match &*self.lock() {
            Phase::Idle => CoordinatorState::Idle,
            Phase::Refreshing { .. } => CoordinatorState::Refreshing,
            Phase::Cooldown { until } if Instant::now() < *until => {
                CoordinatorState::RedirectCooldown
            }
            Phase::Cooldown { .. } => CoordinatorState::Idle,
        }
    }

    /// Callers currently queued behind the running re-authentication.
    pub fn pending(&self) -> usize {
        match &*self.lock() {
            Phase::Refreshing { waiters, .. } => waiters.len(),
            _ => 0,
        }
    }

    /// Number of re-authentication exchanges started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Back to `Idle`, e.g. after an explicit login or logout. A running
    /// exchange is abandoned. Queued callers are released with `Recovered`
    /// when a session is stored at this point and with `Failed` otherwise.
    pub fn reset(&self) {
        let mut phase = self.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let previous = std::mem::replace(&mut *phase, Phase::Idle);
        if let Phase::Refreshing { waiters, .. } = previous {
            let outcome = if self.tokens.has_token() {
                Recovery::Recovered
            } else {
                Recovery::Failed
            };
            debug!(released = waiters.len(), ?outcome, "coordinator reset");
            for waiter in waiters {
                let _ = waiter.send(outcome);
            }
        }
    }

    /// Handles one session-invalid signal and resolves once the session is
    /// usable again or recovery has definitely failed.
    ///
    /// `sent_with` is the token the rejected request carried. When a different
    /// token has been stored since, the signal is stale and the caller is told
    /// to replay without anything being cleared.
    pub async fn recover(&self, transport: &Transport, sent_with: Option<&Token>) -> Recovery {
        let turn = {
            let mut phase = self.lock();
            match self.tokens.get() {
                Some(current) if sent_with != Some(&current) => {
                    debug!("session changed while the request was in flight, replaying");
                    Turn::Done(Recovery::Recovered)
                }
                _ => match &mut *phase {
                    Phase::Refreshing { waiters, .. } => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        debug!(queued = waiters.len(), "re-authentication in flight, queueing");
                        Turn::Wait(rx)
                    }
                    Phase::Cooldown { until } if Instant::now() < *until => {
                        debug!("session invalid during redirect cooldown, failing fast");
                        Turn::Done(Recovery::Failed)
                    }
                    _ => {
                        let epoch = self.epoch.load(Ordering::SeqCst);
                        *phase = Phase::Refreshing {
                            epoch,
                            waiters: Vec::new(),
                        };
                        if let Err(e) = self.tokens.clear() {
                            warn!("Clearing the invalid session failed: {}", e);
                        }
                        Turn::Lead(epoch)
                    }
                },
            }
        };

        match turn {
            Turn::Done(outcome) => outcome,
            // a dropped sender means the leader was cancelled
            Turn::Wait(rx) => rx.await.unwrap_or(Recovery::Failed),
            Turn::Lead(epoch) => self.lead(transport, epoch).await,
        }
    }

    async fn lead(&self, transport: &Transport, epoch: u64) -> Recovery {
        let mut guard = LeaderGuard {
            coordinator: self,
            finished: false,
        };
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            event_name = "session.refresh.start",
            event_domain = "session",
            attempt,
            reauthenticator = self.reauth.get_name(),
            "session invalid, cleared it and re-authenticating"
        );

        let exchanged = self.reauth.reauthenticate(transport).await;

        let (outcome, waiters) = {
            let mut phase = self.lock();
            guard.finished = true;
            if !matches!(&*phase, Phase::Refreshing { epoch: current, .. } if *current == epoch) {
                info!(
                    event_name = "session.refresh.superseded",
                    event_domain = "session",
                    attempt,
                    "coordinator was reset during re-authentication, discarding the result"
                );
                return if self.tokens.has_token() {
                    Recovery::Recovered
                } else {
                    Recovery::Failed
                };
            }

            let outcome = match exchanged {
                // a session stored in the meantime wins over the exchanged one
                Ok(_) if self.tokens.has_token() => {
                    debug!("a session was stored during re-authentication, keeping it");
                    Recovery::Recovered
                }
                Ok(session) => match self.install(&session) {
                    Ok(()) => Recovery::Recovered,
                    Err(e) => {
                        warn!("Storing the re-authenticated session failed: {}", e);
                        Recovery::Failed
                    }
                },
                Err(e) => {
                    warn!(
                        event_name = "session.refresh.failed",
                        event_domain = "session",
                        attempt,
                        "re-authentication failed: {}",
                        e
                    );
                    Recovery::Failed
                }
            };
            let next = match outcome {
                Recovery::Recovered => Phase::Idle,
                Recovery::Failed => Phase::Cooldown {
                    until: Instant::now() + self.cooldown,
                },
            };
            let waiters = match std::mem::replace(&mut *phase, next) {
                Phase::Refreshing { waiters, .. } => waiters,
                _ => Vec::new(),
            };
            (outcome, waiters)
        };

        if outcome == Recovery::Failed {
            self.notifier.notify(Notice::session_expired());
            let redirect = self.redirector.redirect_to_login();
            debug!(?redirect, "login redirect after failed re-authentication");
            if redirect == RedirectOutcome::Suppressed {
                debug!("redirect suppressed by cooldown, failing callers only");
            }
        } else {
            info!(
                event_name = "session.refresh.succeeded",
                event_domain = "session",
                attempt,
                released = waiters.len(),
                "session recovered"
            );
        }

        for waiter in waiters {
            if waiter.send(outcome).is_err() {
                debug!("a queued caller went away before recovery finished");
            }
        }
        outcome
    }

    fn install(&self, session: &Session) -> Result<(), ClientError> {
        let token = session.token.as_ref().ok_or(ClientError::MissingToken)?;
        self.tokens.set(token)?;
        if let Some(principal) = &session.principal {
            self.tokens.set_principal(principal)?;
        }
        Ok(())
    }
}

/// Puts the coordinator back to `Idle` if the leading future is dropped
/// mid-exchange, so queued callers are released instead of waiting forever.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    finished: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("re-authentication was cancelled, releasing queued callers");
            self.coordinator.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::models::Token;
    use crate::platform::{HeadlessNavigator, Navigator};
    use crate::session::reauth::NoReauth;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    impl Notifier for CountingNotifier {
        fn notify(&self, _notice: Notice) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Re-authenticates only once released, so tests can pile up callers first.
    struct GatedReauth {
        gate: Arc<Notify>,
        result: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Reauthenticator for GatedReauth {
        fn get_name(&self) -> &str {
            "gated"
        }

        async fn reauthenticate(&self, _transport: &Transport) -> Result<Session, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            match self.result {
                Some(token) => Ok(Session {
                    token: Some(Token::new(token)),
                    principal: None,
                }),
                None => Err(ClientError::ReauthUnavailable),
            }
        }
    }

    struct Fixture {
        coordinator: Arc<RefreshCoordinator>,
        transport: Arc<Transport>,
        tokens: Arc<TokenStore>,
        navigator: Arc<HeadlessNavigator>,
        notifier: Arc<CountingNotifier>,
    }

    fn fixture(reauth: Box<dyn Reauthenticator>) -> Fixture {
        let tokens = Arc::new(TokenStore::in_memory());
        tokens.set(&Token::new("stale")).unwrap();
        let navigator = Arc::new(HeadlessNavigator::new(Some("/order/list".into())));
        let notifier = Arc::new(CountingNotifier::default());
        let redirector = Arc::new(LoginRedirector::new(
            navigator.clone(),
            "/login",
            Duration::from_secs(3),
        ));
        let transport = Arc::new(
            Transport::new(
                &HttpConfig {
                    base_url: "http://127.0.0.1:1".into(),
                    alternate_base_url: None,
                    timeout_in_ms: 1_000,
                    with_credentials: false,
                },
                tokens.clone(),
            )
            .unwrap(),
        );
        let coordinator = Arc::new(RefreshCoordinator::new(
            tokens.clone(),
            reauth,
            redirector,
            notifier.clone(),
            Duration::from_secs(3),
        ));
        Fixture {
            coordinator,
            transport,
            tokens,
            navigator,
            notifier,
        }
    }

    async fn wait_for_pending(coordinator: &RefreshCoordinator, expected: usize) {
        for _ in 0..1_000 {
            if coordinator.pending() == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {expected} queued callers, found {}", coordinator.pending());
    }

    fn stale() -> Token {
        Token::new("stale")
    }

    async fn signal(f: &Fixture) -> Recovery {
        f.coordinator.recover(&f.transport, Some(&stale())).await
    }

    fn spawn_recover(f: &Fixture) -> tokio::task::JoinHandle<Recovery> {
        let coordinator = f.coordinator.clone();
        let transport = f.transport.clone();
        tokio::spawn(async move { coordinator.recover(&transport, Some(&stale())).await })
    }

    #[tokio::test]
    async fn concurrent_signals_share_one_successful_refresh() {
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let f = fixture(Box::new(GatedReauth {
            gate: gate.clone(),
            result: Some("fresh"),
            calls: calls.clone(),
        }));

        let handles: Vec<_> = (0..5).map(|_| spawn_recover(&f)).collect();
        wait_for_pending(&f.coordinator, 4).await;
        assert_eq!(f.coordinator.state(), CoordinatorState::Refreshing);
        assert_eq!(f.tokens.get(), None, "session is cleared while refreshing");

        gate.notify_one();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Recovery::Recovered);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.coordinator.attempts(), 1);
        assert_eq!(f.coordinator.state(), CoordinatorState::Idle);
        assert_eq!(f.tokens.get(), Some(Token::new("fresh")));
        assert_eq!(f.navigator.current_route().as_deref(), Some("/order/list"));
        assert_eq!(f.notifier.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_refresh_fails_everyone_and_redirects_once() {
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let f = fixture(Box::new(GatedReauth {
            gate: gate.clone(),
            result: None,
            calls: calls.clone(),
        }));

        let handles: Vec<_> = (0..4).map(|_| spawn_recover(&f)).collect();
        wait_for_pending(&f.coordinator, 3).await;
        gate.notify_one();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Recovery::Failed);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.navigator.current_route().as_deref(), Some("/login"));
        assert_eq!(f.notifier.0.load(Ordering::SeqCst), 1);
        assert_eq!(f.coordinator.state(), CoordinatorState::RedirectCooldown);
        assert_eq!(f.tokens.get(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_fails_fast_then_lapses() {
        let f = fixture(Box::new(NoReauth));

        assert_eq!(signal(&f).await, Recovery::Failed);
        assert_eq!(f.coordinator.attempts(), 1);
        assert_eq!(f.coordinator.state(), CoordinatorState::RedirectCooldown);

        assert_eq!(signal(&f).await, Recovery::Failed);
        assert_eq!(f.coordinator.attempts(), 1, "no new attempt during cooldown");

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(f.coordinator.state(), CoordinatorState::Idle);
        assert_eq!(signal(&f).await, Recovery::Failed);
        assert_eq!(f.coordinator.attempts(), 2);
    }

    #[tokio::test]
    async fn no_redirect_from_login_view() {
        let f = fixture(Box::new(NoReauth));
        f.navigator.redirect("/login");
        assert_eq!(signal(&f).await, Recovery::Failed);
        assert_eq!(f.navigator.current_route().as_deref(), Some("/login"));
        assert_eq!(f.notifier.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_leader_releases_waiters() {
        let gate = Arc::new(Notify::new());
        let f = fixture(Box::new(GatedReauth {
            gate,
            result: Some("never"),
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        let leader = spawn_recover(&f);
        wait_for_refreshing(&f.coordinator).await;
        let follower = spawn_recover(&f);
        wait_for_pending(&f.coordinator, 1).await;

        leader.abort();
        assert_eq!(follower.await.unwrap(), Recovery::Failed);
        assert_eq!(f.coordinator.state(), CoordinatorState::Idle);
    }

    async fn wait_for_refreshing(coordinator: &RefreshCoordinator) {
        while coordinator.state() != CoordinatorState::Refreshing {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn signal_for_replaced_token_only_replays() {
        let f = fixture(Box::new(NoReauth));
        f.tokens.set(&Token::new("fresh-login")).unwrap();

        assert_eq!(signal(&f).await, Recovery::Recovered);
        assert_eq!(f.tokens.get(), Some(Token::new("fresh-login")));
        assert_eq!(f.coordinator.attempts(), 0);
        assert_eq!(f.coordinator.state(), CoordinatorState::Idle);
        assert_eq!(f.navigator.current_route().as_deref(), Some("/order/list"));
        assert_eq!(f.notifier.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn signal_for_request_sent_before_refresh_finished_replays() {
        let gate = Arc::new(Notify::new());
        let f = fixture(Box::new(GatedReauth {
            gate: gate.clone(),
            result: Some("fresh"),
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        let leader = spawn_recover(&f);
        wait_for_refreshing(&f.coordinator).await;
        gate.notify_one();
        assert_eq!(leader.await.unwrap(), Recovery::Recovered);

        // a request that went out with the old token answers late
        assert_eq!(signal(&f).await, Recovery::Recovered);
        // and one that went out with no token at all during the refresh
        assert_eq!(
            f.coordinator.recover(&f.transport, None).await,
            Recovery::Recovered
        );
        assert_eq!(f.coordinator.attempts(), 1);
        assert_eq!(f.tokens.get(), Some(Token::new("fresh")));
    }

    #[tokio::test]
    async fn reset_during_failing_refresh_discards_it() {
        let gate = Arc::new(Notify::new());
        let f = fixture(Box::new(GatedReauth {
            gate: gate.clone(),
            result: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        let leader = spawn_recover(&f);
        wait_for_refreshing(&f.coordinator).await;
        let follower = spawn_recover(&f);
        wait_for_pending(&f.coordinator, 1).await;

        // an explicit login lands while the exchange is still running
        f.tokens.set(&Token::new("logged-in")).unwrap();
        f.coordinator.reset();
        assert_eq!(follower.await.unwrap(), Recovery::Recovered);

        gate.notify_one();
        assert_eq!(leader.await.unwrap(), Recovery::Recovered);
        assert_eq!(f.coordinator.state(), CoordinatorState::Idle);
        assert_eq!(f.tokens.get(), Some(Token::new("logged-in")));
        assert_eq!(f.navigator.current_route().as_deref(), Some("/order/list"));
        assert_eq!(f.notifier.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reset_during_refresh_after_logout_fails_quietly() {
        let gate = Arc::new(Notify::new());
        let f = fixture(Box::new(GatedReauth {
            gate: gate.clone(),
            result: Some("refreshed"),
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        let leader = spawn_recover(&f);
        wait_for_refreshing(&f.coordinator).await;
        f.coordinator.reset();

        gate.notify_one();
        assert_eq!(leader.await.unwrap(), Recovery::Failed);
        assert_eq!(f.tokens.get(), None, "a discarded exchange stores nothing");
        assert_eq!(f.coordinator.state(), CoordinatorState::Idle);
        assert_eq!(f.navigator.current_route().as_deref(), Some("/order/list"));
        assert_eq!(f.notifier.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn session_stored_during_refresh_wins() {
        let gate = Arc::new(Notify::new());
        let f = fixture(Box::new(GatedReauth {
            gate: gate.clone(),
            result: Some("refreshed"),
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        let leader = spawn_recover(&f);
        wait_for_refreshing(&f.coordinator).await;
        f.tokens.set(&Token::new("logged-in")).unwrap();

        gate.notify_one();
        assert_eq!(leader.await.unwrap(), Recovery::Recovered);
        assert_eq!(f.tokens.get(), Some(Token::new("logged-in")));
        assert_eq!(f.coordinator.state(), CoordinatorState::Idle);
    }
}
