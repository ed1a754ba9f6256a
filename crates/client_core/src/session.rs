//! Injected capabilities: the session/identity provider used for ownership
//! checks and the confirmation prompt guarding destructive actions.

use async_trait::async_trait;
use shared::{
    domain::{Post, UserSummary},
    protocol::{AuthResponse, LoginRequest, RegisterRequest},
};
use tokio::sync::Mutex;

use crate::{check_response, WorkflowError};

/// Identity provider consumed for ownership checks. Injected rather than
/// looked up ambiently so controllers can be driven with a canned user.
#[async_trait]
pub trait SessionGate: Send + Sync {
    async fn current_user(&self) -> Option<UserSummary>;
    async fn logout(&self) -> Result<(), WorkflowError>;
}

/// No identity available; ownership-gated actions are rejected.
pub struct AnonymousSession;

#[async_trait]
impl SessionGate for AnonymousSession {
    async fn current_user(&self) -> Option<UserSummary> {
        None
    }

    async fn logout(&self) -> Result<(), WorkflowError> {
        Ok(())
    }
}

/// Cookie-credentialed session against the `/api/auth` endpoints. Share its
/// `http()` client with the `DashboardClient` so both ride one cookie jar.
pub struct ApiSession {
    http: reqwest::Client,
    server_url: String,
    user: Mutex<Option<UserSummary>>,
}

impl ApiSession {
    pub fn new(server_url: impl Into<String>) -> Result<Self, WorkflowError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self::new_with_http(http, server_url))
    }

    pub fn from_settings(settings: &crate::Settings) -> Result<Self, WorkflowError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(
                settings.request_timeout_seconds,
            ))
            .build()?;
        Ok(Self::new_with_http(http, settings.server_url.clone()))
    }

    pub fn new_with_http(http: reqwest::Client, server_url: impl Into<String>) -> Self {
        Self {
            http,
            server_url: server_url.into(),
            user: Mutex::new(None),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserSummary, WorkflowError> {
        let response = self
            .http
            .post(format!("{}/api/auth/login", self.server_url))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let auth: AuthResponse = check_response(response).await?.json().await?;
        *self.user.lock().await = Some(auth.user.clone());
        Ok(auth.user)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserSummary, WorkflowError> {
        let response = self
            .http
            .post(format!("{}/api/auth/register", self.server_url))
            .json(&RegisterRequest {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let auth: AuthResponse = check_response(response).await?.json().await?;
        *self.user.lock().await = Some(auth.user.clone());
        Ok(auth.user)
    }

    /// Re-reads the profile from the server, e.g. after a restart with a
    /// still-valid session cookie.
    pub async fn refresh_profile(&self) -> Result<UserSummary, WorkflowError> {
        let response = self
            .http
            .get(format!("{}/api/auth/profile", self.server_url))
            .send()
            .await?;
        let auth: AuthResponse = check_response(response).await?.json().await?;
        *self.user.lock().await = Some(auth.user.clone());
        Ok(auth.user)
    }
}

#[async_trait]
impl SessionGate for ApiSession {
    async fn current_user(&self) -> Option<UserSummary> {
        self.user.lock().await.clone()
    }

    async fn logout(&self) -> Result<(), WorkflowError> {
        let response = self
            .http
            .post(format!("{}/api/auth/logout", self.server_url))
            .send()
            .await?;
        check_response(response).await?;
        *self.user.lock().await = None;
        Ok(())
    }
}

/// Confirmation prompt for destructive actions. Declining is a no-op for
/// the caller, never an error.
#[async_trait]
pub trait DeleteConfirmer: Send + Sync {
    async fn confirm_delete(&self, post: &Post) -> bool;
}

/// Headless callers that have already confirmed out of band.
pub struct AlwaysConfirm;

#[async_trait]
impl DeleteConfirmer for AlwaysConfirm {
    async fn confirm_delete(&self, _post: &Post) -> bool {
        true
    }
}

pub struct NeverConfirm;

#[async_trait]
impl DeleteConfirmer for NeverConfirm {
    async fn confirm_delete(&self, _post: &Post) -> bool {
        false
    }
}
