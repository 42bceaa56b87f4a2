//! Poll definitions submitted by the teacher
//!
//! A [`PollDefinition`] is the payload of `create_poll`. It is validated with
//! `garde` before a poll is materialized; any violation leaves the classroom
//! untouched and is reported back as `InvalidPollDefinition`.

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::constants::poll::{
    MAX_DURATION_SECONDS, MAX_OPTION_COUNT, MAX_OPTION_LENGTH, MAX_QUESTION_LENGTH,
    MIN_DURATION_SECONDS, MIN_OPTION_COUNT,
};

/// Rejects text that is empty once surrounding whitespace is removed
fn not_blank(value: &str) -> garde::Result {
    if value.trim().is_empty() {
        Err(garde::Error::new("must not be blank"))
    } else {
        Ok(())
    }
}

/// The shapes an option may arrive in over the wire
#[derive(Deserialize)]
#[serde(untagged)]
enum OptionInput {
    Plain(String),
    Object { text: String },
}

/// The text of one answer option in a poll definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(from = "OptionInput")]
pub struct OptionText {
    /// Text displayed for the option
    #[garde(length(chars, max = MAX_OPTION_LENGTH), custom(|v, _| not_blank(v)))]
    pub text: String,
}

impl From<OptionInput> for OptionText {
    fn from(input: OptionInput) -> Self {
        match input {
            OptionInput::Plain(text) | OptionInput::Object { text } => Self { text },
        }
    }
}

impl From<&str> for OptionText {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_owned(),
        }
    }
}

/// Everything needed to start a poll
///
/// Options keep the order in which they were submitted; that order is
/// preserved for the lifetime of the poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PollDefinition {
    /// The question put to the students
    #[garde(length(chars, max = MAX_QUESTION_LENGTH), custom(|v, _| not_blank(v)))]
    pub question: String,
    /// Between two and four answer options
    #[garde(length(min = MIN_OPTION_COUNT, max = MAX_OPTION_COUNT), dive)]
    pub options: Vec<OptionText>,
    /// How long the poll accepts votes
    #[garde(range(min = MIN_DURATION_SECONDS, max = MAX_DURATION_SECONDS))]
    #[serde(alias = "duration")]
    pub duration_seconds: u64,
}

impl PollDefinition {
    /// Builds a definition from plain strings
    pub fn new<Q, I, O>(question: Q, options: I, duration_seconds: u64) -> Self
    where
        Q: Into<String>,
        I: IntoIterator<Item = O>,
        O: Into<String>,
    {
        Self {
            question: question.into(),
            options: options
                .into_iter()
                .map(|text| OptionText { text: text.into() })
                .collect(),
            duration_seconds,
        }
    }

    /// Validates the definition, rendering any violation as the error detail
    ///
    /// # Errors
    ///
    /// Returns `poll::Error::InvalidPollDefinition` describing every rule
    /// the definition breaks.
    pub fn check(&self) -> Result<(), crate::poll::Error> {
        self.validate()
            .map_err(|report| crate::poll::Error::InvalidPollDefinition(report.to_string()))
    }
}
