use crate::error::ApiError;
use crate::polls::NewPoll;
use crate::session::SharedSession;
use crate::store::models::{OptionId, PollId, PollView, UserId};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{error, warn};

/// Request/response surface of the poll service.
#[async_trait]
pub trait PollApi: Send + Sync + 'static {
    async fn create_poll(&self, poll: &NewPoll) -> Result<PollView, ApiError>;
    async fn list_polls(&self) -> Result<Vec<PollView>, ApiError>;
    async fn list_polls_by_user(&self, user_id: &UserId) -> Result<Vec<PollView>, ApiError>;
    async fn get_poll(&self, poll_id: &PollId) -> Result<PollView, ApiError>;
    /// Acknowledgement only; the new count arrives on the push channel.
    async fn vote(&self, poll_id: &PollId, option_id: &OptionId) -> Result<(), ApiError>;
    /// Acknowledgement only; the new count arrives on the push channel.
    async fn like(&self, poll_id: &PollId) -> Result<(), ApiError>;
}

#[derive(Clone)]
pub struct HttpPollApi {
    http: reqwest::Client,
    base_url: String,
    session: SharedSession,
}

impl HttpPollApi {
    pub fn new(
        base_url: impl Into<String>,
        session: SharedSession,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url, session))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>, session: SharedSession) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/poll/{path}", self.base_url)
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.read().await.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends the request and maps non-2xx answers. A 401 also drops the
    /// stored credential.
    async fn dispatch(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorized(request).await.send().await.map_err(|e| {
            error!("API request failed: {e}");
            ApiError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("Poll service rejected credential, clearing session");
            self.session.write().await.invalidate();
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(status, &body);
        error!(status = status.as_u16(), "API request failed: {detail}");
        Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.dispatch(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn acknowledge(&self, request: RequestBuilder) -> Result<(), ApiError> {
        self.dispatch(request).await.map(drop)
    }
}

#[async_trait]
impl PollApi for HttpPollApi {
    async fn create_poll(&self, poll: &NewPoll) -> Result<PollView, ApiError> {
        self.fetch(self.http.post(self.url("create-poll")).json(poll)).await
    }

    async fn list_polls(&self) -> Result<Vec<PollView>, ApiError> {
        self.fetch(self.http.get(self.url("get-all-polls"))).await
    }

    async fn list_polls_by_user(&self, user_id: &UserId) -> Result<Vec<PollView>, ApiError> {
        self.fetch(self.http.get(self.url(&format!("get-poll-by-user-id/{user_id}"))))
            .await
    }

    async fn get_poll(&self, poll_id: &PollId) -> Result<PollView, ApiError> {
        self.fetch(self.http.get(self.url(&format!("get-poll-by-id/{poll_id}"))))
            .await
    }

    async fn vote(&self, poll_id: &PollId, option_id: &OptionId) -> Result<(), ApiError> {
        self.acknowledge(
            self.http
                .post(self.url(&format!("vote-on-poll/{poll_id}/{option_id}"))),
        )
        .await
    }

    async fn like(&self, poll_id: &PollId) -> Result<(), ApiError> {
        self.acknowledge(self.http.post(self.url(&format!("like-poll/{poll_id}"))))
            .await
    }
}

/// Picks `detail` or `message` out of an error body, falling back to the
/// bare status.
pub(crate) fn error_detail(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()))
}
