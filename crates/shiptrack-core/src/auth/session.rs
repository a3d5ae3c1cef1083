//! The authenticated API session.
//!
//! `SessionManager` owns the access/refresh token pair. It logs in, signs
//! up, logs out, and keeps the access token fresh in the background.
//!
//! ## States
//!
//! ```text
//!              login / signup+login
//!  [Anonymous] ─────────────────────▶ [Authenticated] ◀─┐
//!       ▲                                  │            │ renewed
//!       │      logout / refresh rejected   ▼            │
//!       └──────────────────────────── [Refreshing] ─────┘
//! ```
//!
//! The starting state comes from the durable store: a persisted access
//! token means `Authenticated`, and a persisted refresh token starts the
//! renewal loop.
//!
//! ## Concurrency
//!
//! A renewal can be in flight while the user logs out or logs in again.
//! Every login and logout bumps an epoch; a renewal only writes its new
//! access token if the epoch it started under is still current and the store
//! still holds the refresh token it used. Locks are always taken renewal
//! first, then state, and never held across an await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::api::{AuthApi, LoginReply, RefreshReply, SignupReply};
use crate::config::SessionConfig;
use crate::models::{Credentials, Notice, Registration, SessionSnapshot, TokenPair};
use crate::navigation::Navigator;
use crate::notify::Notifier;

use super::renewal::{RenewalHandle, RenewalOutcome};
use super::store::{TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use super::SessionError;

pub const LOGIN_SUCCEEDED: &str = "Successfully logged in!";
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const LOGIN_FAILED: &str = "An error occurred during login";
pub const SIGNUP_SUCCEEDED: &str = "Account created successfully!";
pub const SIGNUP_REJECTED: &str = "Failed to create account";
pub const SIGNUP_FAILED: &str = "An error occurred during signup";
pub const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SessionState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    epoch: u64,
    last_renewed_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl SessionState {
    fn begin(&mut self, pair: &TokenPair) {
        self.access_token = Some(pair.access.clone());
        self.refresh_token = Some(pair.refresh.clone());
        self.epoch += 1;
        self.last_renewed_at = None;
        self.consecutive_failures = 0;
    }

    fn end(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.epoch += 1;
        self.last_renewed_at = None;
        self.consecutive_failures = 0;
    }
}

struct Inner {
    config: SessionConfig,
    auth: Arc<dyn AuthApi>,
    store: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    state: Mutex<SessionState>,
    renewal: Mutex<Option<RenewalHandle>>,
}

/// Handle to a session. Clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Restore the session from `store`.
    ///
    /// Silent renewal needs a tokio runtime; constructed outside one, the
    /// session works but never renews on its own.
    pub fn new(
        config: SessionConfig,
        auth: Arc<dyn AuthApi>,
        store: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let access_token = read_persisted(store.access_token(), ACCESS_TOKEN_KEY);
        let refresh_token = read_persisted(store.refresh_token(), REFRESH_TOKEN_KEY);
        info!(
            authenticated = access_token.is_some(),
            renewable = refresh_token.is_some(),
            "Session restored"
        );

        let renewable = refresh_token.is_some();
        let manager = Self {
            inner: Arc::new(Inner {
                config,
                auth,
                store,
                notifier,
                navigator,
                state: Mutex::new(SessionState {
                    access_token,
                    refresh_token,
                    ..SessionState::default()
                }),
                renewal: Mutex::new(None),
            }),
        };

        if renewable {
            let handle = manager.spawn_renewal();
            *lock(&manager.inner.renewal) = handle;
        }
        manager
    }

    /// True iff an access token is held
    pub fn is_authenticated(&self) -> bool {
        lock(&self.inner.state).access_token.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        lock(&self.inner.state).access_token.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let renewal_active = lock(&self.inner.renewal)
            .as_ref()
            .is_some_and(RenewalHandle::is_running);
        let state = lock(&self.inner.state);
        SessionSnapshot {
            authenticated: state.access_token.is_some(),
            has_refresh_token: state.refresh_token.is_some(),
            renewal_active,
            last_renewed_at: state.last_renewed_at,
            consecutive_refresh_failures: state.consecutive_failures,
        }
    }

    fn notify(&self, notice: Notice) {
        self.inner.notifier.notify(notice);
    }

    // =========================================================================
    // Login / signup / logout
    // =========================================================================

    /// Exchange credentials for a token pair, then land on the main surface.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.authenticate(&Credentials::new(email, password)).await
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<(), SessionError> {
        let email = credentials.email.as_str();
        let pair = match self.inner.auth.obtain_token(credentials).await {
            Ok(LoginReply::Issued(pair)) => pair,
            Ok(LoginReply::Rejected) => {
                info!(email, "Login rejected");
                self.notify(Notice::error(INVALID_CREDENTIALS));
                return Err(SessionError::InvalidCredentials);
            }
            Err(e) => {
                error!(error = %e, "Login request failed");
                self.notify(Notice::error(LOGIN_FAILED));
                return Err(e.into());
            }
        };

        if let Err(e) = self.establish(&pair) {
            error!(error = %format!("{:#}", e), "Failed to persist tokens");
            self.notify(Notice::error(LOGIN_FAILED));
            return Err(SessionError::Store(e));
        }

        info!(email, "Login successful");
        self.notify(Notice::success(LOGIN_SUCCEEDED));
        self.inner.navigator.navigate(&self.inner.config.landing_path);
        Ok(())
    }

    /// Register an account and log straight into it.
    pub async fn signup(&self, registration: &Registration) -> Result<(), SessionError> {
        match self.inner.auth.register(registration).await {
            Ok(SignupReply::Created) => {
                info!(email = %registration.email, "Account created");
                self.notify(Notice::success(SIGNUP_SUCCEEDED));
                self.authenticate(&registration.credentials()).await
            }
            Ok(SignupReply::Rejected { message }) => {
                info!(email = %registration.email, reason = ?message, "Signup rejected");
                self.notify(Notice::error(SIGNUP_REJECTED));
                if let Some(ref message) = message {
                    self.notify(Notice::error(message.clone()));
                }
                Err(SessionError::RegistrationRejected(message))
            }
            Err(e) => {
                error!(error = %e, "Signup request failed");
                self.notify(Notice::error(SIGNUP_FAILED));
                Err(e.into())
            }
        }
    }

    /// Drop the session and return to the login surface. Never fails.
    pub fn logout(&self) {
        self.end_session(None);
        info!("Logged out");
        self.inner.navigator.navigate(&self.inner.config.login_path);
    }

    /// Persist a fresh pair and restart renewal for it
    fn establish(&self, pair: &TokenPair) -> anyhow::Result<()> {
        let mut renewal = lock(&self.inner.renewal);
        {
            let mut state = lock(&self.inner.state);
            if let Err(e) = self.inner.store.store_pair(pair) {
                state.end();
                *renewal = None;
                return Err(e);
            }
            state.begin(pair);
        }
        // Replacing the handle aborts the previous session's loop
        *renewal = self.spawn_renewal();
        Ok(())
    }

    /// Clear tokens and stop renewal. With `expected_epoch`, only if the
    /// session has not changed since then. Returns whether it ended.
    fn end_session(&self, expected_epoch: Option<u64>) -> bool {
        let mut renewal = lock(&self.inner.renewal);
        {
            let mut state = lock(&self.inner.state);
            if expected_epoch.is_some_and(|epoch| epoch != state.epoch) {
                return false;
            }
            state.end();
            if let Err(e) = self.inner.store.clear() {
                warn!(error = %format!("{:#}", e), "Failed to clear persisted tokens");
            }
        }
        if renewal.take().is_some() {
            debug!("Silent renewal stopped");
        }
        true
    }

    // =========================================================================
    // Silent renewal
    // =========================================================================

    fn spawn_renewal(&self) -> Option<RenewalHandle> {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime available, silent renewal disabled");
            return None;
        };
        let session = Arc::downgrade(&self.inner);
        let handle = RenewalHandle::spawn(&runtime, self.inner.config.refresh_interval, move || {
            session.upgrade().map(|inner| async move {
                let session = SessionManager { inner };
                session.renew().await
            })
        });
        Some(handle)
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Hard rejections end the session at once. Transient failures are
    /// counted and end it after `max_refresh_failures` in a row.
    pub async fn renew(&self) -> RenewalOutcome {
        let epoch = lock(&self.inner.state).epoch;

        let refresh_token = match self.inner.store.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => return self.ended_elsewhere(epoch),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Failed to read refresh token");
                return self.record_failure(epoch);
            }
        };

        match self.inner.auth.refresh_access(&refresh_token).await {
            Ok(RefreshReply::Renewed(access)) => self.apply_renewal(epoch, &refresh_token, access),
            Ok(RefreshReply::Rejected) => self.expire(epoch),
            Err(e) if e.is_auth_rejection() => self.expire(epoch),
            Err(e) => {
                warn!(error = %e, "Silent renewal request failed");
                self.record_failure(epoch)
            }
        }
    }

    fn apply_renewal(&self, epoch: u64, used_refresh: &str, access: String) -> RenewalOutcome {
        let mut state = lock(&self.inner.state);
        let still_current = state.epoch == epoch
            && matches!(self.inner.store.refresh_token(), Ok(Some(ref stored)) if stored == used_refresh);
        if !still_current {
            debug!("Session changed during renewal, discarding new access token");
            return RenewalOutcome::Discarded;
        }

        if let Err(e) = self.inner.store.set(ACCESS_TOKEN_KEY, &access) {
            warn!(error = %format!("{:#}", e), "Failed to persist renewed access token");
            drop(state);
            return self.record_failure(epoch);
        }

        state.access_token = Some(access);
        state.last_renewed_at = Some(Utc::now());
        state.consecutive_failures = 0;
        info!("Access token renewed");
        RenewalOutcome::Renewed
    }

    fn record_failure(&self, epoch: u64) -> RenewalOutcome {
        let consecutive = {
            let mut state = lock(&self.inner.state);
            if state.epoch != epoch {
                return RenewalOutcome::Discarded;
            }
            state.consecutive_failures += 1;
            state.consecutive_failures
        };

        let max = self.inner.config.max_refresh_failures;
        if consecutive >= max {
            warn!(consecutive, "Silent renewal keeps failing, ending session");
            return self.expire(epoch);
        }
        warn!(consecutive, max, "Silent renewal failed, will retry");
        RenewalOutcome::Failed { consecutive }
    }

    /// The store lost its refresh token, e.g. another process logged out.
    /// Drop whatever this process still holds.
    fn ended_elsewhere(&self, epoch: u64) -> RenewalOutcome {
        if lock(&self.inner.state).refresh_token.is_none() {
            debug!("No refresh token stored, skipping renewal");
            return RenewalOutcome::NoSession;
        }
        if !self.end_session(Some(epoch)) {
            return RenewalOutcome::Discarded;
        }
        info!("Session was ended outside this process");
        self.inner.navigator.navigate(&self.inner.config.login_path);
        RenewalOutcome::NoSession
    }

    fn expire(&self, epoch: u64) -> RenewalOutcome {
        if !self.end_session(Some(epoch)) {
            return RenewalOutcome::Discarded;
        }
        warn!("Refresh token no longer accepted, session ended");
        self.notify(Notice::error(SESSION_EXPIRED));
        self.inner.navigator.navigate(&self.inner.config.login_path);
        RenewalOutcome::Expired
    }
}

fn read_persisted(result: anyhow::Result<Option<String>>, key: &str) -> Option<String> {
    match result {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %format!("{:#}", e), key, "Failed to read persisted token");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::sync::Notify;

    use crate::api::ApiError;
    use crate::auth::store::MemoryTokenStore;
    use crate::testing::{FakeAuth, RecordingNavigator, RecordingNotifier};

    struct Harness {
        session: SessionManager,
        auth: Arc<FakeAuth>,
        store: Arc<MemoryTokenStore>,
        notifier: Arc<RecordingNotifier>,
        navigator: Arc<RecordingNavigator>,
    }

    fn harness(auth: FakeAuth, store: MemoryTokenStore, path: &str) -> Harness {
        let auth = Arc::new(auth);
        let store = Arc::new(store);
        let notifier = Arc::new(RecordingNotifier::default());
        let navigator = Arc::new(RecordingNavigator::at(path));
        let session = SessionManager::new(
            SessionConfig::default(),
            auth.clone(),
            store.clone(),
            notifier.clone(),
            navigator.clone(),
        );
        Harness {
            session,
            auth,
            store,
            notifier,
            navigator,
        }
    }

    fn anonymous(auth: FakeAuth) -> Harness {
        harness(auth, MemoryTokenStore::new(), "/login")
    }

    fn signed_in(auth: FakeAuth) -> Harness {
        harness(auth, MemoryTokenStore::with_pair("A1", "R1"), "/shipments")
    }

    fn stored(h: &Harness) -> (Option<String>, Option<String>) {
        (
            h.store.access_token().unwrap(),
            h.store.refresh_token().unwrap(),
        )
    }

    fn registration() -> Registration {
        Registration {
            email: "user@example.com".to_string(),
            password: "pw123".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    #[tokio::test]
    async fn test_restores_authenticated_session() {
        let h = signed_in(FakeAuth::new());
        assert!(h.session.is_authenticated());
        assert_eq!(h.session.access_token().as_deref(), Some("A1"));
        let snapshot = h.session.snapshot();
        assert!(snapshot.has_refresh_token);
        assert!(snapshot.renewal_active);
    }

    #[tokio::test]
    async fn test_restores_anonymous_session() {
        let h = anonymous(FakeAuth::new());
        assert!(!h.session.is_authenticated());
        assert!(!h.session.snapshot().renewal_active);
    }

    #[test]
    fn test_constructs_without_runtime() {
        let h = signed_in(FakeAuth::new());
        assert!(h.session.is_authenticated());
        assert!(!h.session.snapshot().renewal_active);
    }

    #[tokio::test]
    async fn test_login_stores_pair_and_lands() {
        let auth = FakeAuth::new();
        auth.push_login(Ok(LoginReply::Issued(TokenPair::new("A1", "R1"))));
        let h = anonymous(auth);

        h.session.login("user@example.com", "pw123").await.unwrap();

        assert!(h.session.is_authenticated());
        assert_eq!(stored(&h), (Some("A1".to_string()), Some("R1".to_string())));
        assert_eq!(h.notifier.messages(), vec![LOGIN_SUCCEEDED]);
        assert_eq!(h.navigator.navigations(), vec!["/shipments"]);
        assert!(h.session.snapshot().renewal_active);
        assert_eq!(
            *h.auth.login_calls.lock().unwrap(),
            vec![("user@example.com".to_string(), "pw123".to_string())]
        );
    }

    #[tokio::test]
    async fn test_login_rejected_leaves_store_empty() {
        let auth = FakeAuth::new();
        auth.push_login(Ok(LoginReply::Rejected));
        let h = anonymous(auth);

        let result = h.session.login("user@example.com", "wrong").await;

        assert!(matches!(result, Err(SessionError::InvalidCredentials)));
        assert!(!h.session.is_authenticated());
        assert!(h.store.is_empty());
        assert_eq!(h.notifier.messages(), vec![INVALID_CREDENTIALS]);
        assert!(h.notifier.notices()[0].is_error());
        assert!(h.navigator.navigations().is_empty());
    }

    #[tokio::test]
    async fn test_login_transport_failure() {
        let auth = FakeAuth::new();
        auth.push_login(Err(ApiError::ServerError("down".to_string())));
        let h = anonymous(auth);

        let result = h.session.login("user@example.com", "pw123").await;

        assert!(matches!(result, Err(SessionError::Api(ApiError::ServerError(_)))));
        assert!(!h.session.is_authenticated());
        assert_eq!(h.notifier.messages(), vec![LOGIN_FAILED]);
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let h = signed_in(FakeAuth::new());

        h.session.logout();

        assert!(!h.session.is_authenticated());
        assert!(h.store.is_empty());
        assert_eq!(h.navigator.navigations(), vec!["/login"]);
        let snapshot = h.session.snapshot();
        assert!(!snapshot.has_refresh_token);
        assert!(!snapshot.renewal_active);

        // Logging out twice is harmless
        h.session.logout();
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_renewal_replaces_only_access_token() {
        let auth = FakeAuth::new();
        auth.push_login(Ok(LoginReply::Issued(TokenPair::new("A1", "R1"))));
        auth.push_refresh(Ok(RefreshReply::Renewed("A2".to_string())));
        let h = anonymous(auth);
        h.session.login("user@example.com", "pw123").await.unwrap();

        let outcome = h.session.renew().await;

        assert_eq!(outcome, RenewalOutcome::Renewed);
        assert_eq!(stored(&h), (Some("A2".to_string()), Some("R1".to_string())));
        assert_eq!(h.session.access_token().as_deref(), Some("A2"));
        assert_eq!(*h.auth.refresh_calls.lock().unwrap(), vec!["R1".to_string()]);
        assert!(h.session.snapshot().last_renewed_at.is_some());
    }

    #[tokio::test]
    async fn test_renewal_after_logout_is_discarded() {
        let gate = Arc::new(Notify::new());
        let auth = FakeAuth::gated(gate.clone());
        auth.push_refresh(Ok(RefreshReply::Renewed("A2".to_string())));
        let h = signed_in(auth);

        let pending = tokio::spawn({
            let session = h.session.clone();
            async move { session.renew().await }
        });
        while h.auth.refresh_count() == 0 {
            tokio::task::yield_now().await;
        }

        h.session.logout();
        gate.notify_one();
        let outcome = pending.await.unwrap();

        assert_eq!(outcome, RenewalOutcome::Discarded);
        assert!(h.store.is_empty());
        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_renewal_after_relogin_is_discarded() {
        let gate = Arc::new(Notify::new());
        let auth = FakeAuth::gated(gate.clone());
        auth.push_refresh(Ok(RefreshReply::Renewed("stale".to_string())));
        auth.push_login(Ok(LoginReply::Issued(TokenPair::new("B1", "S1"))));
        let h = signed_in(auth);

        let pending = tokio::spawn({
            let session = h.session.clone();
            async move { session.renew().await }
        });
        while h.auth.refresh_count() == 0 {
            tokio::task::yield_now().await;
        }

        h.session.login("other@example.com", "pw").await.unwrap();
        gate.notify_one();

        assert_eq!(pending.await.unwrap(), RenewalOutcome::Discarded);
        assert_eq!(stored(&h), (Some("B1".to_string()), Some("S1".to_string())));
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let auth = FakeAuth::new();
        auth.push_signup(Ok(SignupReply::Created));
        auth.push_login(Ok(LoginReply::Issued(TokenPair::new("A1", "R1"))));
        let h = anonymous(auth);

        h.session.signup(&registration()).await.unwrap();

        assert!(h.session.is_authenticated());
        assert_eq!(stored(&h), (Some("A1".to_string()), Some("R1".to_string())));
        assert_eq!(h.auth.signup_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.notifier.messages(), vec![SIGNUP_SUCCEEDED, LOGIN_SUCCEEDED]);
        assert_eq!(h.navigator.navigations(), vec!["/shipments"]);
        assert_eq!(
            *h.auth.login_calls.lock().unwrap(),
            vec![("user@example.com".to_string(), "pw123".to_string())]
        );
    }

    #[tokio::test]
    async fn test_signup_conflict_surfaces_field_message() {
        let auth = FakeAuth::new();
        auth.push_signup(Ok(SignupReply::Rejected {
            message: Some("user with this email already exists.".to_string()),
        }));
        let h = anonymous(auth);

        let result = h.session.signup(&registration()).await;

        assert!(matches!(result, Err(SessionError::RegistrationRejected(Some(_)))));
        assert_eq!(
            h.notifier.messages(),
            vec![SIGNUP_REJECTED, "user with this email already exists."]
        );
        assert!(h.auth.login_calls.lock().unwrap().is_empty());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_signup_rejection_without_details() {
        let auth = FakeAuth::new();
        auth.push_signup(Ok(SignupReply::Rejected { message: None }));
        let h = anonymous(auth);

        let result = h.session.signup(&registration()).await;

        assert!(matches!(result, Err(SessionError::RegistrationRejected(None))));
        assert_eq!(h.notifier.messages(), vec![SIGNUP_REJECTED]);
    }

    #[tokio::test]
    async fn test_signup_transport_failure() {
        let auth = FakeAuth::new();
        auth.push_signup(Err(ApiError::RateLimited));
        let h = anonymous(auth);

        assert!(h.session.signup(&registration()).await.is_err());
        assert_eq!(h.notifier.messages(), vec![SIGNUP_FAILED]);
    }

    #[tokio::test]
    async fn test_rejected_refresh_ends_session() {
        let auth = FakeAuth::new();
        auth.push_refresh(Ok(RefreshReply::Rejected));
        let h = signed_in(auth);

        assert_eq!(h.session.renew().await, RenewalOutcome::Expired);

        assert!(!h.session.is_authenticated());
        assert!(h.store.is_empty());
        assert_eq!(h.notifier.messages(), vec![SESSION_EXPIRED]);
        assert_eq!(h.navigator.navigations(), vec!["/login"]);
    }

    #[tokio::test]
    async fn test_unauthorized_refresh_error_ends_session() {
        let auth = FakeAuth::new();
        auth.push_refresh(Err(ApiError::Unauthorized));
        let h = signed_in(auth);

        assert_eq!(h.session.renew().await, RenewalOutcome::Expired);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_are_bounded() {
        let auth = FakeAuth::new();
        auth.push_refresh(Err(ApiError::ServerError("502".to_string())));
        auth.push_refresh(Err(ApiError::RateLimited));
        auth.push_refresh(Err(ApiError::ServerError("503".to_string())));
        let h = signed_in(auth);

        assert_eq!(h.session.renew().await, RenewalOutcome::Failed { consecutive: 1 });
        assert_eq!(h.session.renew().await, RenewalOutcome::Failed { consecutive: 2 });
        assert!(h.session.is_authenticated());
        assert_eq!(h.session.snapshot().consecutive_refresh_failures, 2);
        assert_eq!(stored(&h), (Some("A1".to_string()), Some("R1".to_string())));

        assert_eq!(h.session.renew().await, RenewalOutcome::Expired);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let auth = FakeAuth::new();
        auth.push_refresh(Err(ApiError::ServerError("502".to_string())));
        auth.push_refresh(Err(ApiError::ServerError("502".to_string())));
        auth.push_refresh(Ok(RefreshReply::Renewed("A2".to_string())));
        auth.push_refresh(Err(ApiError::ServerError("502".to_string())));
        let h = signed_in(auth);

        h.session.renew().await;
        h.session.renew().await;
        assert_eq!(h.session.renew().await, RenewalOutcome::Renewed);
        assert_eq!(h.session.renew().await, RenewalOutcome::Failed { consecutive: 1 });
    }

    #[tokio::test]
    async fn test_renew_notices_external_logout() {
        let h = signed_in(FakeAuth::new());

        h.store.clear().unwrap();
        let outcome = h.session.renew().await;

        assert_eq!(outcome, RenewalOutcome::NoSession);
        assert!(!h.session.is_authenticated());
        assert_eq!(h.session.access_token(), None);
        assert_eq!(h.navigator.navigations(), vec!["/login"]);
        assert!(h.notifier.messages().is_empty());
        assert!(!h.session.snapshot().renewal_active);
        assert_eq!(h.auth.refresh_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_after_external_logout() {
        let h = signed_in(FakeAuth::new());
        h.store.clear().unwrap();

        tokio::time::sleep(Duration::from_secs(241)).await;
        assert!(!h.session.is_authenticated());
        assert_eq!(h.navigator.navigations(), vec!["/login"]);

        tokio::time::sleep(Duration::from_secs(1200)).await;
        assert_eq!(h.navigator.navigations(), vec!["/login"]);
        assert_eq!(h.auth.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_renew_without_session() {
        let h = anonymous(FakeAuth::new());
        assert_eq!(h.session.renew().await, RenewalOutcome::NoSession);
        assert_eq!(h.auth.refresh_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_renews_every_interval() {
        let auth = FakeAuth::new();
        auth.push_login(Ok(LoginReply::Issued(TokenPair::new("A1", "R1"))));
        auth.push_refresh(Ok(RefreshReply::Renewed("A2".to_string())));
        auth.push_refresh(Ok(RefreshReply::Renewed("A3".to_string())));
        let h = anonymous(auth);
        h.session.login("user@example.com", "pw123").await.unwrap();

        tokio::time::sleep(Duration::from_secs(239)).await;
        assert_eq!(h.auth.refresh_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(stored(&h), (Some("A2".to_string()), Some("R1".to_string())));

        tokio::time::sleep(Duration::from_secs(240)).await;
        assert_eq!(stored(&h), (Some("A3".to_string()), Some("R1".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_stops_timer() {
        let h = signed_in(FakeAuth::new());
        h.session.logout();

        tokio::time::sleep(Duration::from_secs(1200)).await;
        assert_eq!(h.auth.refresh_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_after_rejection() {
        let h = signed_in(FakeAuth::new());

        tokio::time::sleep(Duration::from_secs(241)).await;
        assert_eq!(h.auth.refresh_count(), 1);
        assert!(h.store.is_empty());
        assert_eq!(h.notifier.messages(), vec![SESSION_EXPIRED]);

        tokio::time::sleep(Duration::from_secs(1200)).await;
        assert_eq!(h.auth.refresh_count(), 1);
    }
}
