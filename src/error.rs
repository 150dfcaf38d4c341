use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication expired. Please login again.")]
    Unauthorized,
    #[error("{detail}")]
    Status { status: u16, detail: String },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    Expired,
    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt credential file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Auth(#[from] ApiError),
}

impl From<jsonwebtoken::errors::Error> for SessionError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
            _ => SessionError::InvalidToken,
        }
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Unknown update kind: {0}")]
    UnknownKind(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Push channel rejected subscription: status {0}")]
    Rejected(u16),
    #[error("Push channel transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PollFormError {
    #[error("Please enter a poll question")]
    EmptyQuestion,
    #[error("Please provide at least 2 options")]
    TooFewOptions,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Form(#[from] PollFormError),
    #[error(transparent)]
    Push(#[from] PushError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("You must be logged in to do that")]
    NoViewer,
    #[error("Live update loop has stopped")]
    Closed,
}
