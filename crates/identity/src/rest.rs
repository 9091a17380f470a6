//! REST Identity Provider Implementation
//!
//! Talks to the identity service's REST APIs using reqwest:
//! - `{auth_url}/accounts:signInWithCustomToken` and `{auth_url}/accounts:lookup`
//! - `{token_url}/token` to refresh the id token
//! - `{functions_url}/{name}` for callable remote functions

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sessionsync_common::Claims;

use crate::{
    FunctionResponse, IdTokenResult, IdentityConfig, IdentityProvider, ProviderError,
    ProviderUser, SessionBroadcaster, SessionChanges, SessionState,
};

pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// Cached id tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomTokenRequest<'a> {
    token: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomTokenResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<ProviderUser>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
struct CallableRequest {
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CallableResponse {
    #[serde(alias = "data")]
    result: serde_json::Value,
}

/// Identity service error body
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    status: Option<String>,
}

/// Token messages that mean the credential itself was refused.
const REJECTED_TOKEN_MESSAGES: &[&str] = &[
    "INVALID_CUSTOM_TOKEN",
    "CREDENTIAL_MISMATCH",
    "TOKEN_EXPIRED",
    "INVALID_ID_TOKEN",
];

/// Messages meaning the account behind the session is gone.
const ACCOUNT_GONE_MESSAGES: &[&str] = &["USER_NOT_FOUND", "USER_DISABLED"];

#[derive(Debug, Clone)]
struct RestSession {
    user: ProviderUser,
    refresh_token: String,
    token: IdTokenResult,
}

/// Identity provider backed by the identity service's REST APIs.
pub struct RestIdentityProvider {
    client: Client,
    config: IdentityConfig,
    session: RwLock<Option<RestSession>>,
    changes: SessionBroadcaster,
}

impl RestIdentityProvider {
    /// Create a new REST identity provider
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            session: RwLock::new(None),
            changes: SessionBroadcaster::new(),
        }
    }

    fn snapshot(&self) -> Option<RestSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the session if it still belongs to `uid` and announce it.
    /// A session established meanwhile for someone else is left alone.
    fn end_session_of(&self, uid: &str) {
        self.changes.transition(|| {
            let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
            if guard.as_ref().is_some_and(|s| s.user.uid == uid) {
                *guard = None;
                tracing::info!(uid = %uid, "Account no longer available, ending session");
                Some(SessionState::SignedOut)
            } else {
                None
            }
        });
    }

    fn auth_endpoint(&self, method: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            self.config.auth_url.trim_end_matches('/'),
            method,
            self.config.api_key
        )
    }

    async fn post_json<B, R>(&self, url: &str, body: &B, bearer: Option<&str>) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_body) {
                let message = error_response.error.message;
                if REJECTED_TOKEN_MESSAGES
                    .iter()
                    .any(|m| message.starts_with(m))
                {
                    return Err(ProviderError::InvalidToken(message));
                }
                if ACCOUNT_GONE_MESSAGES.iter().any(|m| message.starts_with(m)) {
                    return Err(ProviderError::AccountUnavailable(message));
                }
                return Err(ProviderError::Response(format!(
                    "Identity API error ({}): {}",
                    error_response.error.status.unwrap_or_else(|| status.to_string()),
                    message
                )));
            }

            return Err(ProviderError::Response(format!(
                "Identity API returned {}: {}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Response(format!("Failed to parse response: {}", e)))
    }

    async fn lookup(&self, id_token: &str) -> Result<Option<ProviderUser>, ProviderError> {
        let response: LookupResponse = self
            .post_json(&self.auth_endpoint("lookup"), &LookupRequest { id_token }, None)
            .await?;
        Ok(response.users.into_iter().next())
    }

    async fn refresh_token(&self, session: &RestSession) -> Result<IdTokenResult, ProviderError> {
        let url = format!(
            "{}/token?key={}",
            self.config.token_url.trim_end_matches('/'),
            self.config.api_key
        );
        let body = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: &session.refresh_token,
        };

        tracing::debug!(uid = %session.user.uid, "Refreshing id token");

        let response: RefreshResponse = match self.post_json(&url, &body, None).await {
            Err(e @ ProviderError::AccountUnavailable(_)) => {
                self.end_session_of(&session.user.uid);
                return Err(e);
            }
            other => other?,
        };
        let token = token_result(response.id_token, response.expires_in.as_deref())?;

        // Only write back if the session was not replaced while we waited.
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = guard.as_mut() {
            if current.refresh_token == session.refresh_token {
                current.refresh_token = response.refresh_token;
                current.token = token.clone();
            }
        }

        Ok(token)
    }
}

/// Decode the claims segment of an id token.
///
/// The signature is not checked here: the token came straight from the
/// identity service over TLS, and servers verify it on every request.
pub(crate) fn decode_claims(id_token: &str) -> Result<Claims, ProviderError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(id_token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| ProviderError::Response(format!("Malformed id token: {}", e)))
}

fn timestamp_claim(claims: &Claims, key: &str) -> Option<DateTime<Utc>> {
    claims
        .get(key)
        .and_then(serde_json::Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn token_result(id_token: String, expires_in: Option<&str>) -> Result<IdTokenResult, ProviderError> {
    let claims = decode_claims(&id_token)?;
    let now = Utc::now();
    let issued_at = timestamp_claim(&claims, "iat").unwrap_or(now);
    let expiration_time = timestamp_claim(&claims, "exp").unwrap_or_else(|| {
        let secs = expires_in.and_then(|s| s.parse().ok()).unwrap_or(3600);
        now + Duration::seconds(secs)
    });

    Ok(IdTokenResult {
        token: id_token,
        claims,
        issued_at,
        expiration_time,
    })
}

fn is_fresh(token: &IdTokenResult) -> bool {
    token.expiration_time - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > Utc::now()
}

#[async_trait::async_trait]
impl IdentityProvider for RestIdentityProvider {
    fn current_session(&self) -> Option<ProviderUser> {
        self.snapshot().map(|s| s.user)
    }

    fn subscribe_to_changes(&self) -> SessionChanges {
        self.changes
            .subscribe(|| SessionState::from_user(self.current_session()))
    }

    async fn id_token_result(
        &self,
        force_refresh: bool,
    ) -> Result<Option<IdTokenResult>, ProviderError> {
        let Some(session) = self.snapshot() else {
            return Ok(None);
        };

        if !force_refresh && is_fresh(&session.token) {
            return Ok(Some(session.token));
        }

        self.refresh_token(&session).await.map(Some)
    }

    async fn reload_session(&self) -> Result<(), ProviderError> {
        let session = self.snapshot().ok_or(ProviderError::NoActiveSession)?;
        let token = self
            .id_token_result(false)
            .await?
            .ok_or(ProviderError::NoActiveSession)?;

        match self.lookup(&token.token).await {
            Ok(Some(user)) => {
                let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
                match guard.as_mut() {
                    Some(current) if current.user.uid == user.uid => {
                        current.user = user;
                        Ok(())
                    }
                    _ => Err(ProviderError::NoActiveSession),
                }
            }
            Ok(None) | Err(ProviderError::AccountUnavailable(_)) => {
                self.end_session_of(&session.user.uid);
                Err(ProviderError::NoActiveSession)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<ProviderUser, ProviderError> {
        let request = CustomTokenRequest {
            token,
            return_secure_token: true,
        };
        let response: CustomTokenResponse = self
            .post_json(&self.auth_endpoint("signInWithCustomToken"), &request, None)
            .await?;

        let token = token_result(response.id_token, response.expires_in.as_deref())?;
        let user = self.lookup(&token.token).await?.ok_or_else(|| {
            ProviderError::Response("Account lookup returned no user after sign-in".to_string())
        })?;

        tracing::info!(uid = %user.uid, "Signed in with custom token");

        self.changes.transition(|| {
            *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(RestSession {
                user: user.clone(),
                refresh_token: response.refresh_token,
                token,
            });
            Some(SessionState::SignedIn(user.clone()))
        });

        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.changes.transition(|| {
            let previous = self
                .session
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            previous.map(|session| {
                tracing::info!(uid = %session.user.uid, "Signed out");
                SessionState::SignedOut
            })
        });
        Ok(())
    }

    async fn invoke_remote_function(
        &self,
        name: &str,
        data: serde_json::Value,
    ) -> Result<FunctionResponse, ProviderError> {
        let bearer = self.id_token_result(false).await?.map(|t| t.token);
        let url = format!(
            "{}/{}",
            self.config.functions_url.trim_end_matches('/'),
            name
        );

        tracing::debug!(function = %name, authenticated = bearer.is_some(), "Invoking remote function");

        let response: CallableResponse = self
            .post_json(&url, &CallableRequest { data }, bearer.as_deref())
            .await?;

        Ok(FunctionResponse {
            data: response.result,
        })
    }
}
