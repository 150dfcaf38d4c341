use crate::error::EventError;
use crate::store::models::{OptionId, PollId, UserId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A push message as it comes off the wire: a kind plus an undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUpdate {
    pub kind: String,
    pub data: String,
}

impl RawUpdate {
    pub fn new(kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteUpdate {
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub new_count: u64,
    pub user_id: UserId,
    pub version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeUpdate {
    pub poll_id: PollId,
    pub new_count: u64,
    pub user_id: UserId,
    pub version: Option<u64>,
}

/// Canonical push event, produced only by [`decode_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    VoteUpdate(VoteUpdate),
    LikeUpdate(LikeUpdate),
}

impl UpdateEvent {
    pub fn poll_id(&self) -> &PollId {
        match self {
            UpdateEvent::VoteUpdate(u) => &u.poll_id,
            UpdateEvent::LikeUpdate(u) => &u.poll_id,
        }
    }

    pub fn user_id(&self) -> &UserId {
        match self {
            UpdateEvent::VoteUpdate(u) => &u.user_id,
            UpdateEvent::LikeUpdate(u) => &u.user_id,
        }
    }

    pub fn version(&self) -> Option<u64> {
        match self {
            UpdateEvent::VoteUpdate(u) => u.version,
            UpdateEvent::LikeUpdate(u) => u.version,
        }
    }
}

// Identifiers arrive as strings from some producers and bare numbers
// from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

// Producers disagree on field names; the first name present wins.
const POLL_ID: &[&str] = &["pollId", "poll_id"];
const OPTION_ID: &[&str] = &["optionId", "option_id"];
const NEW_COUNT: &[&str] = &[
    "newCount",
    "new_count",
    "voteCount",
    "vote_count",
    "new_vote_count",
    "likeCount",
    "like_count",
];
const USER_ID: &[&str] = &["userId", "user_id"];
const VERSION: &[&str] = &["version"];

fn field<T: DeserializeOwned>(body: &Map<String, Value>, names: &[&str]) -> Result<Option<T>, EventError> {
    names
        .iter()
        .find_map(|name| body.get(*name).filter(|value| !value.is_null()))
        .map(|value| T::deserialize(value))
        .transpose()
        .map_err(EventError::from)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateKind {
    Vote,
    Like,
}

fn parse_kind(kind: &str) -> Result<UpdateKind, EventError> {
    match kind {
        "vote-update" | "vote_update" | "voteUpdate" => Ok(UpdateKind::Vote),
        "like-update" | "like_update" | "likeUpdate" => Ok(UpdateKind::Like),
        other => Err(EventError::UnknownKind(other.to_string())),
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, EventError> {
    value.ok_or(EventError::MissingField(field))
}

/// Normalizes a raw push message into an [`UpdateEvent`], accepting both
/// camelCase and snake_case field names.
pub fn decode_update(raw: &RawUpdate) -> Result<UpdateEvent, EventError> {
    let kind = parse_kind(&raw.kind)?;
    let body: Map<String, Value> = serde_json::from_str(&raw.data)?;

    let poll_id = PollId(required(field::<WireId>(&body, POLL_ID)?, "pollId")?.into_string());
    let new_count = required(field::<u64>(&body, NEW_COUNT)?, "newCount")?;
    let user_id = UserId(required(field::<WireId>(&body, USER_ID)?, "userId")?.into_string());
    let version = field::<u64>(&body, VERSION)?;

    let event = match kind {
        UpdateKind::Vote => UpdateEvent::VoteUpdate(VoteUpdate {
            poll_id,
            option_id: OptionId(required(field::<WireId>(&body, OPTION_ID)?, "optionId")?.into_string()),
            new_count,
            user_id,
            version,
        }),
        UpdateKind::Like => UpdateEvent::LikeUpdate(LikeUpdate {
            poll_id,
            new_count,
            user_id,
            version,
        }),
    };

    Ok(event)
}
