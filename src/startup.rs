use crate::api::HttpPollApi;
use crate::auth::AuthClient;
use crate::config::Config;
use crate::error::ClientError;
use crate::push::SseSource;
use crate::reconciler::{LiveHandle, LiveUpdates, Scope};
use crate::session::{Session, SharedSession};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Everything one signed-in client session needs, wired from [`Config`].
#[derive(Clone)]
pub struct ClientState {
    pub config: Config,
    pub session: SharedSession,
    pub api: Arc<HttpPollApi>,
    pub auth: AuthClient,
    pub push: Arc<SseSource>,
}

impl ClientState {
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let session = Session::restore(&config.session_file)?.into_shared();

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(crate::error::ApiError::from)?;
        // The push stream stays open indefinitely, so it gets a client
        // without the request timeout.
        let streaming = reqwest::Client::builder()
            .build()
            .map_err(crate::error::ApiError::from)?;

        let api = Arc::new(HttpPollApi::with_client(
            http.clone(),
            config.poll_url.clone(),
            session.clone(),
        ));
        let auth = AuthClient::new(http, config.auth_url.clone());
        let push = Arc::new(SseSource::new(streaming, config.push_url.clone(), session.clone()));

        info!(poll_url = %config.poll_url, push_url = %config.push_url, "client configured");

        Ok(Self {
            config,
            session,
            api,
            auth,
            push,
        })
    }

    /// Starts the live-update loop for the current viewer.
    pub async fn live(&self, scope: Scope) -> (LiveHandle, JoinHandle<()>) {
        let viewer = self.session.read().await.viewer().map(|v| v.id.clone());
        LiveUpdates::spawn(self.api.clone(), self.push.clone(), scope, viewer)
    }

    /// Clears the stored credential and detaches the live loop from the
    /// viewer.
    pub async fn logout(&self, live: &LiveHandle) -> Result<(), ClientError> {
        self.session.write().await.logout();
        live.set_viewer(None)
    }
}
