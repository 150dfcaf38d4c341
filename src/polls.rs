use crate::error::PollFormError;
use crate::store::models::UserId;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPollOption {
    pub text: String,
}

/// Request body for creating a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPoll {
    pub question: String,
    pub user_id: UserId,
    pub options: Vec<NewPollOption>,
}

impl NewPoll {
    /// Trims the question and options, drops blank options, and requires
    /// a question plus at least two options.
    pub fn validate<I, S>(question: &str, options: I, creator: UserId) -> Result<Self, PollFormError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(PollFormError::EmptyQuestion);
        }

        let options: Vec<NewPollOption> = options
            .into_iter()
            .map(|o| o.as_ref().trim().to_string())
            .filter(|o| !o.is_empty())
            .map(|text| NewPollOption { text })
            .collect();

        if options.len() < 2 {
            return Err(PollFormError::TooFewOptions);
        }

        Ok(Self {
            question: question.to_string(),
            user_id: creator,
            options,
        })
    }
}
