//! The poll aggregate
//!
//! A [`Poll`] is the single source of truth for the current (or most
//! recently ended) question: its ordered options, their tallies and the
//! countdown. Everything sent to clients is a [`PollSnapshot`] of it.

use std::{fmt::Display, str::FromStr};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;
use web_time::SystemTime;

use crate::{
    definition::PollDefinition,
    timer::{Countdown, TickOutcome},
};

/// Rejections produced by poll operations
///
/// Every rejection is local to the request that caused it; none of them
/// modify the poll.
#[derive(Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The create request broke one of the definition rules
    #[error("invalid poll definition: {0}")]
    InvalidPollDefinition(String),
    /// A poll is already running
    #[error("a poll is already in progress")]
    PollInProgress,
    /// There is no active poll with the requested id
    #[error("no active poll")]
    NoActivePoll,
    /// The option does not belong to the poll
    #[error("unknown option")]
    UnknownOption,
    /// The participant already voted in this poll
    #[error("participant has already voted")]
    DuplicateVote,
}

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
        )]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::from_str(s)?))
            }
        }
    };
}

uuid_newtype!(
    /// Opaque identifier of a poll
    PollId
);

uuid_newtype!(
    /// Opaque identifier of an option, stable for the poll's lifetime
    OptionId
);

/// Lifecycle status of a materialized poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Accepting votes, countdown running
    Active,
    /// Closed; tallies are final
    Ended,
}

/// One answer option and its tally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOption {
    id: OptionId,
    text: String,
    votes: u64,
}

impl PollOption {
    /// The option identifier
    pub fn id(&self) -> OptionId {
        self.id
    }

    /// The option's display text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of votes cast for this option
    pub fn votes(&self) -> u64 {
        self.votes
    }
}

/// Share of `votes` in `total`, rounded to the nearest whole percent
///
/// Defined as zero when nobody has voted. Rounding is per option, so the
/// shares of a poll may add up to 99 or 101.
pub fn percentage(votes: u64, total: u64) -> u8 {
    if total == 0 {
        0
    } else {
        (votes as f64 / total as f64 * 100.).round() as u8
    }
}

/// The authoritative state of one poll
#[derive(Debug, Clone)]
pub struct Poll {
    id: PollId,
    question: String,
    options: Vec<PollOption>,
    countdown: Countdown,
    status: Status,
    created_at: SystemTime,
}

impl Poll {
    /// Materializes an active poll from a definition
    ///
    /// The definition is expected to have passed [`PollDefinition::check`].
    /// Texts are stored trimmed; option order is kept as given.
    pub fn new(definition: &PollDefinition) -> Self {
        Self {
            id: PollId::new(),
            question: definition.question.trim().to_owned(),
            options: definition
                .options
                .iter()
                .map(|option| PollOption {
                    id: OptionId::new(),
                    text: option.text.trim().to_owned(),
                    votes: 0,
                })
                .collect_vec(),
            countdown: Countdown::new(definition.duration_seconds),
            status: Status::Active,
            created_at: SystemTime::now(),
        }
    }

    /// The poll identifier
    pub fn id(&self) -> PollId {
        self.id
    }

    /// The question text
    pub fn question(&self) -> &str {
        &self.question
    }

    /// The options in their creation order
    pub fn options(&self) -> &[PollOption] {
        &self.options
    }

    /// Looks up an option by id
    pub fn option(&self, option_id: OptionId) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }

    /// Current lifecycle status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether the poll still accepts votes
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Configured duration in seconds
    pub fn duration(&self) -> u64 {
        self.countdown.duration()
    }

    /// Remaining time in seconds
    pub fn remaining(&self) -> u64 {
        self.countdown.remaining()
    }

    /// When the poll was created
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Sum of the votes across all options
    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(PollOption::votes).sum()
    }

    /// Adds one vote to an option
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownOption` if the option is not part of this poll.
    pub(crate) fn record_vote(&mut self, option_id: OptionId) -> Result<(), Error> {
        let option = self
            .options
            .iter_mut()
            .find(|option| option.id == option_id)
            .ok_or(Error::UnknownOption)?;
        option.votes += 1;
        Ok(())
    }

    /// Advances the countdown, ending the poll on the last second
    pub(crate) fn tick(&mut self) -> TickOutcome {
        if !self.is_active() {
            return TickOutcome::Stopped;
        }
        match self.countdown.tick() {
            0 => {
                self.end();
                TickOutcome::Expired
            }
            remaining => TickOutcome::Running(remaining),
        }
    }

    /// Closes the poll and forces the remaining time to zero
    ///
    /// # Returns
    ///
    /// `true` if this call performed the transition, `false` if the poll
    /// had already ended
    pub(crate) fn end(&mut self) -> bool {
        if self.status == Status::Active {
            self.status = Status::Ended;
            self.countdown.expire();
            true
        } else {
            false
        }
    }

    /// A complete, self-sufficient copy of the poll for clients
    pub fn snapshot(&self) -> PollSnapshot {
        let total = self.total_votes();
        PollSnapshot {
            id: self.id,
            question: self.question.clone(),
            options: self
                .options
                .iter()
                .map(|option| OptionSnapshot {
                    id: option.id,
                    text: option.text.clone(),
                    votes: option.votes,
                    percentage: percentage(option.votes, total),
                })
                .collect_vec(),
            duration: self.duration(),
            remaining_time: self.remaining(),
            status: self.status,
        }
    }
}

/// Wire representation of one option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSnapshot {
    /// Option identifier
    pub id: OptionId,
    /// Display text
    pub text: String,
    /// Votes cast so far
    pub votes: u64,
    /// Rounded share of all votes, zero when nobody voted
    pub percentage: u8,
}

/// Wire representation of a poll, sent whole on every notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    /// Poll identifier
    pub id: PollId,
    /// Question text
    pub question: String,
    /// Options in creation order
    pub options: Vec<OptionSnapshot>,
    /// Configured duration in seconds
    pub duration: u64,
    /// Remaining time in seconds
    pub remaining_time: u64,
    /// Lifecycle status
    pub status: Status,
}

impl PollSnapshot {
    /// Sum of the votes across all options
    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|option| option.votes).sum()
    }

    /// Whether the option belongs to this poll
    pub fn has_option(&self, option_id: OptionId) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn create_test_poll() -> Poll {
        Poll::new(&PollDefinition::new(
            "Capital of France?",
            ["Paris", "London"],
            10,
        ))
    }

    #[test]
    fn test_new_poll_is_active_with_full_time() {
        let poll = create_test_poll();
        assert_eq!(poll.status(), Status::Active);
        assert_eq!(poll.remaining(), 10);
        assert_eq!(poll.duration(), 10);
        assert_eq!(poll.total_votes(), 0);
    }

    #[test]
    fn test_new_poll_trims_and_keeps_order() {
        let poll = Poll::new(&PollDefinition::new(
            "  Pick one ",
            [" b ", "a", "c  "],
            5,
        ));
        assert_eq!(poll.question(), "Pick one");
        let texts = poll.options().iter().map(PollOption::text).collect_vec();
        assert_eq!(texts, ["b", "a", "c"]);
    }

    #[test]
    fn test_option_ids_are_distinct() {
        let poll = create_test_poll();
        let ids = poll.options().iter().map(PollOption::id).unique().count();
        assert_eq!(ids, poll.options().len());
    }

    #[test]
    fn test_record_vote() {
        let mut poll = create_test_poll();
        let paris = poll.options()[0].id();
        poll.record_vote(paris).unwrap();
        assert_eq!(poll.option(paris).unwrap().votes(), 1);
        assert_eq!(poll.total_votes(), 1);
    }

    #[test]
    fn test_record_vote_unknown_option() {
        let mut poll = create_test_poll();
        assert_eq!(poll.record_vote(OptionId::new()), Err(Error::UnknownOption));
        assert_eq!(poll.total_votes(), 0);
    }

    #[test]
    fn test_percentage_zero_votes() {
        assert_eq!(percentage(0, 0), 0);
        let snapshot = create_test_poll().snapshot();
        assert!(snapshot.options.iter().all(|option| option.percentage == 0));
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 1), 100);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
    }

    fn percentages_after(counts: [u64; 3]) -> Vec<u8> {
        let mut poll = Poll::new(&PollDefinition::new("Q", ["A", "B", "C"], 10));
        let ids = poll.options().iter().map(PollOption::id).collect_vec();
        for (id, count) in ids.into_iter().zip(counts) {
            for _ in 0..count {
                poll.record_vote(id).unwrap();
            }
        }
        poll.snapshot()
            .options
            .iter()
            .map(|option| option.percentage)
            .collect_vec()
    }

    #[test]
    fn test_percentages_are_rounded_independently() {
        // 28.6, 28.6, 42.9 round up to 101
        assert_eq!(percentages_after([2, 2, 3]), vec![29, 29, 43]);
        // 33.3 three times rounds down to 99
        assert_eq!(percentages_after([1, 1, 1]), vec![33, 33, 33]);
        assert_eq!(percentages_after([1, 1, 2]), vec![25, 25, 50]);
    }

    #[test]
    fn test_tick_until_expired() {
        let mut poll = Poll::new(&PollDefinition::new("Q", ["A", "B"], 3));
        assert_eq!(poll.tick(), TickOutcome::Running(2));
        assert_eq!(poll.tick(), TickOutcome::Running(1));
        assert_eq!(poll.status(), Status::Active);
        assert_eq!(poll.tick(), TickOutcome::Expired);
        assert_eq!(poll.remaining(), 0);
        assert_eq!(poll.status(), Status::Ended);
        assert_eq!(poll.tick(), TickOutcome::Stopped);
    }

    #[test]
    fn test_end_is_idempotent() {
        let mut poll = create_test_poll();
        assert!(poll.end());
        assert!(!poll.end());
        assert_eq!(poll.status(), Status::Ended);
        assert_eq!(poll.remaining(), 0);
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let mut poll = create_test_poll();
        let paris = poll.options()[0].id();
        poll.record_vote(paris).unwrap();

        let json = serde_json::to_value(poll.snapshot()).unwrap();
        assert_eq!(json["question"], "Capital of France?");
        assert_eq!(json["remainingTime"], 10);
        assert_eq!(json["duration"], 10);
        assert_eq!(json["status"], "active");
        assert_eq!(json["options"][0]["text"], "Paris");
        assert_eq!(json["options"][0]["votes"], 1);
        assert_eq!(json["options"][0]["percentage"], 100);
        assert_eq!(json["options"][1]["percentage"], 0);
        assert_eq!(json["id"], poll.id().to_string());
    }

    #[test]
    fn test_snapshot_helpers() {
        let poll = create_test_poll();
        let snapshot = poll.snapshot();
        assert!(snapshot.has_option(poll.options()[1].id()));
        assert!(!snapshot.has_option(OptionId::new()));
        assert_eq!(snapshot.total_votes(), 0);
    }

    #[test]
    fn test_id_round_trip_through_string() {
        let id = PollId::new();
        assert_eq!(id.to_string().parse::<PollId>().unwrap(), id);
        assert!("not-a-uuid".parse::<OptionId>().is_err());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::PollInProgress.to_string(), "a poll is already in progress");
        assert_eq!(Error::NoActivePoll.to_string(), "no active poll");
        assert_eq!(Error::UnknownOption.to_string(), "unknown option");
        assert_eq!(Error::DuplicateVote.to_string(), "participant has already voted");
        assert_eq!(
            Error::InvalidPollDefinition("question: must not be blank".to_string()).to_string(),
            "invalid poll definition: question: must not be blank"
        );
    }
}
