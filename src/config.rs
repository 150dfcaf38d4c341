use crate::error::ConfigError;
use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};
use tracing::{info, warn};

const DEFAULT_AUTH_URL: &str = "http://localhost:8000";
const DEFAULT_POLL_URL: &str = "http://localhost:8001";
const DEFAULT_SESSION_FILE: &str = ".quickpoll/session.json";
const PUSH_PATH: &str = "/api/poll/events";

/// Client settings.
///
/// `push_url` must name an endpoint that answers with `text/event-stream`
/// (named `vote-update` / `like-update` events). It defaults to
/// `{poll_url}/api/poll/events`; a socket.io endpoint will not work here.
#[derive(Debug, Clone)]
pub struct Config {
    pub auth_url: String,
    pub poll_url: String,
    pub push_url: String,
    pub session_file: PathBuf,
    pub request_timeout: Duration,
}

impl Config {
    /// Reads `QUICKPOLL_*` variables, after merging a `.env` file if present.
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_ok() {
            info!("Loaded environment from .env");
        }

        let auth_url = trim_slash(try_load::<String>("QUICKPOLL_AUTH_URL", DEFAULT_AUTH_URL)?);
        let poll_url = trim_slash(try_load::<String>("QUICKPOLL_POLL_URL", DEFAULT_POLL_URL)?);
        let push_url = try_load::<String>("QUICKPOLL_PUSH_URL", &format!("{poll_url}{PUSH_PATH}"))?;
        let session_file = try_load("QUICKPOLL_SESSION_FILE", DEFAULT_SESSION_FILE)?;
        let timeout_secs: u64 = try_load("QUICKPOLL_REQUEST_TIMEOUT_SECS", "10")?;

        Ok(Self {
            auth_url,
            poll_url,
            push_url,
            session_file,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            poll_url: DEFAULT_POLL_URL.to_string(),
            push_url: format!("{DEFAULT_POLL_URL}{PUSH_PATH}"),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            request_timeout: Duration::from_secs(10),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
