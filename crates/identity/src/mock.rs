//! Mock Identity Provider Implementation
//!
//! In-memory provider for tests and local development:
//! - `MockIdentityBackend`: accounts and single-use login tokens, shareable
//!   between several providers to model separate execution contexts
//! - `MockBehavior`: programmable claims delay and failures
//! - `MockIdentityProvider`: one context's session, with call counters

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sessionsync_common::Claims;

use crate::{
    FunctionResponse, IdTokenResult, IdentityProvider, ProviderError, ProviderUser,
    SessionBroadcaster, SessionChanges, SessionState, LOGIN_TOKEN_FUNCTION,
    REFRESH_CLAIMS_FUNCTION,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An account known to the mock backend.
#[derive(Debug, Clone)]
pub struct MockAccount {
    pub user: ProviderUser,
    pub claims: Claims,
}

/// Server side of the mock: accounts and outstanding login tokens.
#[derive(Debug, Default)]
pub struct MockIdentityBackend {
    accounts: Mutex<HashMap<String, MockAccount>>,
    login_tokens: Mutex<HashMap<String, String>>,
}

impl MockIdentityBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create or replace an account.
    pub fn add_user(&self, user: ProviderUser, claims: Claims) {
        lock(&self.accounts).insert(user.uid.clone(), MockAccount { user, claims });
    }

    /// Replace an account's claims. Sessions see them on their next
    /// freshly minted id token.
    pub fn set_claims(&self, uid: &str, claims: Claims) {
        if let Some(account) = lock(&self.accounts).get_mut(uid) {
            account.claims = claims;
        }
    }

    /// Delete an account. Existing sessions fail on their next reload.
    pub fn remove_user(&self, uid: &str) {
        lock(&self.accounts).remove(uid);
    }

    pub fn account(&self, uid: &str) -> Option<MockAccount> {
        lock(&self.accounts).get(uid).cloned()
    }

    /// Mint a single-use login token for `uid`.
    pub fn issue_login_token(&self, uid: &str) -> String {
        let token = format!("mock-login-{}", uuid::Uuid::new_v4());
        lock(&self.login_tokens).insert(token.clone(), uid.to_string());
        token
    }

    /// Number of issued tokens not yet redeemed.
    pub fn outstanding_login_tokens(&self) -> usize {
        lock(&self.login_tokens).len()
    }

    fn redeem_login_token(&self, token: &str) -> Option<MockAccount> {
        let uid = lock(&self.login_tokens).remove(token)?;
        self.account(&uid)
    }
}

/// Programmable behavior for the mock identity provider
#[derive(Debug, Default)]
pub struct MockBehavior {
    claims_delay_ms: RwLock<u64>,
    fail_claims: RwLock<bool>,
    fail_functions: RwLock<bool>,
}

impl MockBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every id token lookup, after the session has been read.
    pub fn set_claims_delay_ms(&self, delay: u64) {
        *self.claims_delay_ms.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Make id token lookups fail with a request error.
    pub fn set_fail_claims(&self, fail: bool) {
        *self.fail_claims.write().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Make remote function calls fail with a request error.
    pub fn set_fail_functions(&self, fail: bool) {
        *self.fail_functions.write().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Reset to default behavior
    pub fn reset(&self) {
        self.set_claims_delay_ms(0);
        self.set_fail_claims(false);
        self.set_fail_functions(false);
    }

    fn claims_delay_ms(&self) -> u64 {
        *self.claims_delay_ms.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail_claims(&self) -> bool {
        *self.fail_claims.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail_functions(&self) -> bool {
        *self.fail_functions.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct MockCalls {
    id_token: usize,
    forced_refresh: usize,
    reload: usize,
    functions: Vec<String>,
}

#[derive(Debug, Clone)]
struct MockSession {
    user: ProviderUser,
    token: IdTokenResult,
}

/// Mock identity provider holding one context's session.
#[derive(Debug)]
pub struct MockIdentityProvider {
    backend: Arc<MockIdentityBackend>,
    behavior: Arc<MockBehavior>,
    session: Mutex<Option<MockSession>>,
    changes: SessionBroadcaster,
    calls: Mutex<MockCalls>,
    token_serial: Mutex<u64>,
}

impl MockIdentityProvider {
    /// Create a mock provider with its own private backend.
    pub fn new() -> Self {
        Self::with_backend(MockIdentityBackend::new())
    }

    /// Create a mock provider sharing `backend` with other contexts.
    pub fn with_backend(backend: Arc<MockIdentityBackend>) -> Self {
        Self {
            backend,
            behavior: Arc::new(MockBehavior::new()),
            session: Mutex::new(None),
            changes: SessionBroadcaster::new(),
            calls: Mutex::new(MockCalls::default()),
            token_serial: Mutex::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<MockIdentityBackend> {
        &self.backend
    }

    /// Get the shared behavior for external configuration
    pub fn behavior(&self) -> &Arc<MockBehavior> {
        &self.behavior
    }

    /// Simulate a sign-in that happened outside the session core, e.g. an
    /// interactive login. Unknown users are registered with no claims.
    pub fn simulate_sign_in(&self, user: ProviderUser) {
        let account = match self.backend.account(&user.uid) {
            Some(mut account) => {
                account.user = user;
                account
            }
            None => MockAccount {
                user,
                claims: Claims::new(),
            },
        };
        self.backend.add_user(account.user.clone(), account.claims.clone());
        self.start_session(account);
    }

    /// Simulate a sign-out that happened outside the session core.
    pub fn simulate_sign_out(&self) {
        self.end_session();
    }

    /// Number of id token lookups, forced or not.
    pub fn id_token_call_count(&self) -> usize {
        lock(&self.calls).id_token
    }

    /// Number of id token lookups made with `force_refresh = true`.
    pub fn forced_refresh_count(&self) -> usize {
        lock(&self.calls).forced_refresh
    }

    pub fn reload_count(&self) -> usize {
        lock(&self.calls).reload
    }

    /// Names of remote functions invoked, in call order.
    pub fn function_calls(&self) -> Vec<String> {
        lock(&self.calls).functions.clone()
    }

    /// Number of live change subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.changes.listener_count()
    }

    fn mint_token(&self, account: &MockAccount) -> IdTokenResult {
        let serial = {
            let mut serial = lock(&self.token_serial);
            *serial += 1;
            *serial
        };
        let issued_at = Utc::now();
        IdTokenResult {
            token: format!("mock-id-token-{}-{}", account.user.uid, serial),
            claims: account.claims.clone(),
            issued_at,
            expiration_time: issued_at + chrono::Duration::hours(1),
        }
    }

    fn start_session(&self, account: MockAccount) {
        let token = self.mint_token(&account);
        let user = account.user;
        tracing::info!(uid = %user.uid, "Mock identity: session started");
        self.changes.transition(|| {
            *lock(&self.session) = Some(MockSession {
                user: user.clone(),
                token,
            });
            Some(SessionState::SignedIn(user))
        });
    }

    fn end_session(&self) {
        self.changes.transition(|| {
            lock(&self.session).take().map(|_| {
                tracing::info!("Mock identity: session ended");
                SessionState::SignedOut
            })
        });
    }

    /// End the session only if it still belongs to `uid`.
    fn end_session_of(&self, uid: &str) {
        self.changes.transition(|| {
            let mut session = lock(&self.session);
            if session.as_ref().is_some_and(|s| s.user.uid == uid) {
                *session = None;
                tracing::info!(uid = %uid, "Mock identity: account gone, session ended");
                Some(SessionState::SignedOut)
            } else {
                None
            }
        });
    }

    fn require_session(&self) -> Result<MockSession, ProviderError> {
        lock(&self.session)
            .clone()
            .ok_or_else(|| ProviderError::Response("UNAUTHENTICATED".to_string()))
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn current_session(&self) -> Option<ProviderUser> {
        lock(&self.session).as_ref().map(|s| s.user.clone())
    }

    fn subscribe_to_changes(&self) -> SessionChanges {
        self.changes
            .subscribe(|| SessionState::from_user(self.current_session()))
    }

    async fn id_token_result(
        &self,
        force_refresh: bool,
    ) -> Result<Option<IdTokenResult>, ProviderError> {
        {
            let mut calls = lock(&self.calls);
            calls.id_token += 1;
            if force_refresh {
                calls.forced_refresh += 1;
            }
        }

        let session = lock(&self.session).clone();
        let Some(session) = session else {
            return Ok(None);
        };

        let delay = self.behavior.claims_delay_ms();
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.behavior.fail_claims() {
            return Err(ProviderError::Request(
                "Mock identity: simulated network failure".to_string(),
            ));
        }

        if !force_refresh && session.token.expiration_time > Utc::now() {
            return Ok(Some(session.token));
        }

        let Some(account) = self.backend.account(&session.user.uid) else {
            self.end_session_of(&session.user.uid);
            return Err(ProviderError::AccountUnavailable("USER_NOT_FOUND".to_string()));
        };
        let token = self.mint_token(&account);

        if let Some(current) = lock(&self.session).as_mut() {
            if current.user.uid == session.user.uid {
                current.token = token.clone();
            }
        }

        Ok(Some(token))
    }

    async fn reload_session(&self) -> Result<(), ProviderError> {
        lock(&self.calls).reload += 1;

        let session = lock(&self.session).clone();
        let session = session.ok_or(ProviderError::NoActiveSession)?;

        match self.backend.account(&session.user.uid) {
            Some(account) => {
                if let Some(current) = lock(&self.session).as_mut() {
                    current.user = account.user;
                }
                Ok(())
            }
            None => {
                self.end_session_of(&session.user.uid);
                Err(ProviderError::NoActiveSession)
            }
        }
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<ProviderUser, ProviderError> {
        let account = self
            .backend
            .redeem_login_token(token)
            .ok_or_else(|| ProviderError::InvalidToken("INVALID_CUSTOM_TOKEN".to_string()))?;
        let user = account.user.clone();
        self.start_session(account);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.end_session();
        Ok(())
    }

    async fn invoke_remote_function(
        &self,
        name: &str,
        _data: serde_json::Value,
    ) -> Result<FunctionResponse, ProviderError> {
        tracing::debug!(function = %name, "Mock identity: recording function call");
        lock(&self.calls).functions.push(name.to_string());

        if self.behavior.fail_functions() {
            return Err(ProviderError::Request(
                "Mock identity: simulated function failure".to_string(),
            ));
        }

        match name {
            LOGIN_TOKEN_FUNCTION => {
                let session = self.require_session()?;
                Ok(FunctionResponse {
                    data: json!(self.backend.issue_login_token(&session.user.uid)),
                })
            }
            REFRESH_CLAIMS_FUNCTION => {
                let session = self.require_session()?;
                Ok(FunctionResponse {
                    data: json!({ "uid": session.user.uid }),
                })
            }
            other => Err(ProviderError::Response(format!(
                "NOT_FOUND: no remote function named {}",
                other
            ))),
        }
    }
}
