//! Admin sign-in boundary
//!
//! Credentials are checked by the hosted auth service; this module only
//! calls through to it and adds the allow-list check that turns a signed-in
//! user into an administrator.

use crate::config::RemoteConfig;
use crate::core::SyncError;
use crate::gateway::rest::error_message;
use crate::gateway::{RowQuery, TableGateway};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// Allow-list of administrator user ids.
pub const ADMIN_TABLE: &str = "admin_users";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication is not configured")]
    NotConfigured,

    #[error("{0}")]
    Validation(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address has not been confirmed")]
    EmailNotConfirmed,

    /// Signed in, but not on the administrator allow-list.
    #[error("This account has no access to the admin panel")]
    NotAdmin,

    #[error("Auth transport error: {0}")]
    Transport(String),
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

/// Hosted auth service as seen by the site.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session>;

    /// Current session, if signed in.
    fn session(&self) -> Option<Session>;

    /// Receiver notified on every sign-in and sign-out.
    fn session_changes(&self) -> watch::Receiver<Option<Session>>;

    /// Ends the session locally even if the remote call fails.
    async fn sign_out(&self) -> AuthResult<()>;
}

// ============================================================================
// REST implementation
// ============================================================================

/// [`AuthProvider`] over the hosted auth REST endpoint.
pub struct RestAuth {
    http: reqwest::Client,
    auth_url: String,
    anon_key: String,
    session: watch::Sender<Option<Session>>,
}

impl RestAuth {
    pub fn new(config: &RemoteConfig) -> AuthResult<Self> {
        config.validate().map_err(AuthError::Transport)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let (session, _) = watch::channel(None);
        Ok(Self {
            http,
            auth_url: config.auth_url(),
            anon_key: config.anon_key.clone(),
            session,
        })
    }
}

/// Maps the auth service's error message to a typed failure.
fn classify_auth_failure(message: String) -> AuthError {
    let lowered = message.to_lowercase();
    if lowered.contains("invalid login credentials") {
        AuthError::InvalidCredentials
    } else if lowered.contains("email not confirmed") {
        AuthError::EmailNotConfirmed
    } else {
        AuthError::Transport(message)
    }
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let response = self
            .http
            .post(format!("{}/token", self.auth_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_auth_failure(error_message(status, &body)));
        }

        let session: Session = response
            .json()
            .await
            .map_err(|err| AuthError::Transport(format!("malformed session: {err}")))?;
        info!(user_id = %session.user.id, "signed in");
        self.session.send_replace(Some(session.clone()));
        Ok(session)
    }

    fn session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn session_changes(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let Some(session) = self.session.send_replace(None) else {
            return Ok(());
        };
        let result = self
            .http
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(status = %response.status(), "remote sign-out refused"),
            Err(err) => warn!(error = %err, "remote sign-out failed"),
        }
        info!(user_id = %session.user.id, "signed out");
        Ok(())
    }
}

// ============================================================================
// Admin gate
// ============================================================================

/// A session whose user is on the administrator allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub session: Session,
    pub role: Option<String>,
}

type AdminTableFactory = dyn Fn(&Session) -> Arc<dyn TableGateway> + Send + Sync;

/// Signs administrators in: credential check, then allow-list check.
pub struct AdminGate {
    auth: Arc<dyn AuthProvider>,
    admins: Box<AdminTableFactory>,
}

impl AdminGate {
    /// `admins` yields the allow-list table as seen by a given session.
    pub fn new<F>(auth: Arc<dyn AuthProvider>, admins: F) -> Self
    where
        F: Fn(&Session) -> Arc<dyn TableGateway> + Send + Sync + 'static,
    {
        Self {
            auth,
            admins: Box::new(admins),
        }
    }

    /// Gate reading the allow-list through one fixed gateway.
    pub fn with_table(auth: Arc<dyn AuthProvider>, admins: Arc<dyn TableGateway>) -> Self {
        Self::new(auth, move |_| Arc::clone(&admins))
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AdminSession> {
        let email = email.trim();
        if email.is_empty() || password.trim().is_empty() {
            return Err(AuthError::Validation(
                "email and password are required".to_string(),
            ));
        }

        let session = self.auth.sign_in(email, password).await?;
        self.admit(session).await
    }

    /// Re-checks an existing session, e.g. one restored at startup.
    pub async fn admit(&self, session: Session) -> AuthResult<AdminSession> {
        let admins = (self.admins)(&session);
        let probe = RowQuery::first()
            .eq("user_id", session.user.id.as_str())
            .select(&["id", "role"]);

        match admins.fetch_one(&probe).await {
            Ok(row) => {
                let role = row.get("role").and_then(Value::as_str).map(str::to_string);
                info!(user_id = %session.user.id, role = ?role, "admin admitted");
                Ok(AdminSession { session, role })
            }
            Err(err) => {
                if !matches!(err, SyncError::NotFound(_)) {
                    warn!(user_id = %session.user.id, error = %err, "admin probe failed");
                }
                if let Err(sign_out) = self.auth.sign_out().await {
                    warn!(error = %sign_out, "sign-out after rejected admin failed");
                }
                Err(AuthError::NotAdmin)
            }
        }
    }

    pub async fn sign_out(&self) -> AuthResult<()> {
        self.auth.sign_out().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_are_typed() {
        assert_eq!(
            classify_auth_failure("Invalid login credentials".to_string()),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            classify_auth_failure("Email not confirmed".to_string()),
            AuthError::EmailNotConfirmed
        );
        assert!(matches!(
            classify_auth_failure("rate limited".to_string()),
            AuthError::Transport(m) if m == "rate limited"
        ));
    }

    #[test]
    fn test_session_parses_token_response() {
        let body = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r1",
            "user": {"id": "u-1", "email": "admin@digimagang.id", "role": "authenticated"}
        }"#;
        let session: Session = serde_json::from_str(body).unwrap();
        assert_eq!(session.user.id, "u-1");
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
    }
}
