use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Reserved key inside [`PollView::counts`] holding the like count.
pub const LIKES_KEY: &str = "likes";

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

opaque_id!(PollId);
opaque_id!(OptionId);
opaque_id!(UserId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: OptionId,
    pub text: String,
}

/// Client-side read model for one poll, as returned by the poll service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    pub id: PollId,
    pub question: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub counts: HashMap<String, u64>,
    #[serde(default)]
    pub user_has_voted: Option<OptionId>,
    #[serde(default)]
    pub user_has_liked: bool,
}

impl PollView {
    /// Ensures every option has a count entry so absent keys never leak
    /// out of the store.
    pub fn normalize(mut self) -> Self {
        for option in &self.options {
            self.counts.entry(option.id.0.clone()).or_insert(0);
        }
        self
    }

    pub fn has_option(&self, option_id: &OptionId) -> bool {
        self.options.iter().any(|o| &o.id == option_id)
    }

    pub fn votes_for(&self, option_id: &OptionId) -> u64 {
        self.counts.get(option_id.as_str()).copied().unwrap_or(0)
    }

    pub fn likes(&self) -> u64 {
        self.counts.get(LIKES_KEY).copied().unwrap_or(0)
    }

    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| self.votes_for(&o.id)).sum()
    }
}

// The poll service has been seen emitting both RFC 3339 and naive
// timestamps; naive ones are taken as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_service_payload() {
        let poll: PollView = serde_json::from_value(json!({
            "id": "p1",
            "question": "Tabs or spaces?",
            "userId": "u9",
            "createdAt": "2025-03-01T10:00:00.123456",
            "options": [{"id": "a", "text": "Tabs", "pollId": "p1"}, {"id": "b", "text": "Spaces"}],
            "counts": {"a": 2, "likes": 4},
            "userHasVoted": null,
            "userHasLiked": true
        }))
        .unwrap();

        assert_eq!(poll.user_id, Some(UserId::from("u9")));
        assert!(poll.created_at.is_some());
        assert_eq!(poll.votes_for(&OptionId::from("b")), 0);
        assert_eq!(poll.likes(), 4);
        assert!(poll.user_has_liked);

        let poll = poll.normalize();
        assert_eq!(poll.counts.get("b"), Some(&0));
        assert_eq!(poll.total_votes(), 2);
    }

    #[test]
    fn missing_optional_fields_default() {
        let poll: PollView = serde_json::from_value(json!({
            "id": "p2",
            "question": "Lunch?",
            "options": [{"id": "x", "text": "Pizza"}]
        }))
        .unwrap();

        assert!(poll.created_at.is_none());
        assert!(poll.user_has_voted.is_none());
        assert!(!poll.user_has_liked);
        assert_eq!(poll.likes(), 0);
    }
}
