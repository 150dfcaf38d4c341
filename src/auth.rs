use crate::api::error_detail;
use crate::error::{ApiError, SessionError};
use crate::session::{SharedSession, Viewer};
use crate::store::models::UserId;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    name: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: AuthUser,
}

/// Client for the account service that issues bearer tokens.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = SignInRequest { email, password };
        self.post("signin", &body).await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let body = SignUpRequest {
            email,
            name,
            password,
        };
        self.post("signup", &body).await
    }

    async fn post<B: Serialize>(&self, action: &str, body: &B) -> Result<AuthResponse, ApiError> {
        let response = self
            .http
            .post(format!("{}/api/auth/{action}", self.base_url))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let detail = error_detail(status, &text);
            error!(status = status.as_u16(), "{action} failed: {detail}");
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Signs in and stores the resulting credential in `session`.
    pub async fn login(
        &self,
        session: &SharedSession,
        email: &str,
        password: &str,
    ) -> Result<Viewer, SessionError> {
        let response = self.sign_in(email, password).await?;
        establish(session, response).await
    }

    /// Creates an account and stores the resulting credential in `session`.
    pub async fn signup(
        &self,
        session: &SharedSession,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Viewer, SessionError> {
        let response = self.sign_up(email, name, password).await?;
        establish(session, response).await
    }
}

async fn establish(session: &SharedSession, response: AuthResponse) -> Result<Viewer, SessionError> {
    let viewer = Viewer {
        id: response.user.id,
        email: response.user.email,
        name: response.user.name.unwrap_or_default(),
    };

    session
        .write()
        .await
        .establish(response.access_token, viewer.clone())?;

    info!(user_id = %viewer.id, "Login successful");
    Ok(viewer)
}
