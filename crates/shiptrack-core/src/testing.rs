//! Test doubles for the session's collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::{ApiError, AuthApi, LoginReply, RefreshReply, SignupReply};
use crate::models::{Credentials, Notice, Registration};
use crate::navigation::Navigator;
use crate::notify::Notifier;

/// Scripted `AuthApi`. Replies are consumed in order; once a queue is empty
/// logins and refreshes are rejected and registrations succeed.
#[derive(Default)]
pub(crate) struct FakeAuth {
    logins: Mutex<VecDeque<Result<LoginReply, ApiError>>>,
    refreshes: Mutex<VecDeque<Result<RefreshReply, ApiError>>>,
    signups: Mutex<VecDeque<Result<SignupReply, ApiError>>>,
    refresh_gate: Option<Arc<Notify>>,
    pub(crate) login_calls: Mutex<Vec<(String, String)>>,
    pub(crate) refresh_calls: Mutex<Vec<String>>,
    pub(crate) signup_calls: AtomicUsize,
}

impl FakeAuth {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hold every refresh until the gate is notified
    pub(crate) fn gated(gate: Arc<Notify>) -> Self {
        Self {
            refresh_gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn push_login(&self, reply: Result<LoginReply, ApiError>) {
        self.logins.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_refresh(&self, reply: Result<RefreshReply, ApiError>) {
        self.refreshes.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_signup(&self, reply: Result<SignupReply, ApiError>) {
        self.signups.lock().unwrap().push_back(reply);
    }

    pub(crate) fn refresh_count(&self) -> usize {
        self.refresh_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AuthApi for FakeAuth {
    async fn obtain_token(&self, credentials: &Credentials) -> Result<LoginReply, ApiError> {
        self.login_calls
            .lock()
            .unwrap()
            .push((credentials.email.clone(), credentials.password.clone()));
        let next = self.logins.lock().unwrap().pop_front();
        next.unwrap_or(Ok(LoginReply::Rejected))
    }

    async fn refresh_access(&self, refresh_token: &str) -> Result<RefreshReply, ApiError> {
        self.refresh_calls.lock().unwrap().push(refresh_token.to_string());
        if let Some(gate) = &self.refresh_gate {
            gate.notified().await;
        }
        let next = self.refreshes.lock().unwrap().pop_front();
        next.unwrap_or(Ok(RefreshReply::Rejected))
    }

    async fn register(&self, _registration: &Registration) -> Result<SignupReply, ApiError> {
        self.signup_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.signups.lock().unwrap().pop_front();
        next.unwrap_or(Ok(SignupReply::Created))
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }

    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Navigator that remembers every navigation.
pub(crate) struct RecordingNavigator {
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn at(path: &str) -> Self {
        Self {
            history: Mutex::new(vec![path.to_string()]),
        }
    }

    /// Navigations performed after construction
    pub(crate) fn navigations(&self) -> Vec<String> {
        self.history.lock().unwrap()[1..].to_vec()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.history.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn navigate(&self, path: &str) {
        self.history.lock().unwrap().push(path.to_string());
    }
}
