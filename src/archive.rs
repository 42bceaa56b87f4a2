//! Finalized poll records for the history store
//!
//! Every poll that ends (by timer or early termination) is handed exactly
//! once to a [`PollArchive`]. The engine only appends; reading history back
//! is left to whoever owns the store.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use web_time::SystemTime;

use crate::poll::{Poll, PollId};

/// Final tally of one option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedOption {
    /// Option text
    pub text: String,
    /// Votes the option received
    pub votes: u64,
}

/// A closed poll as written to the history store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedPoll {
    /// Identifier the poll had while running
    pub poll_id: PollId,
    /// Question text
    pub question: String,
    /// Options in creation order with their final tallies
    pub options: Vec<FinalizedOption>,
    /// Sum of all votes
    pub total_votes: u64,
    /// When the poll was created
    pub created_at: SystemTime,
    /// When the poll ended
    pub completed_at: SystemTime,
}

impl FinalizedPoll {
    /// Captures an ended poll, stamping the completion time as now
    pub fn from_poll(poll: &Poll) -> Self {
        Self {
            poll_id: poll.id(),
            question: poll.question().to_owned(),
            options: poll
                .options()
                .iter()
                .map(|option| FinalizedOption {
                    text: option.text().to_owned(),
                    votes: option.votes(),
                })
                .collect(),
            total_votes: poll.total_votes(),
            created_at: poll.created_at(),
            completed_at: SystemTime::now(),
        }
    }
}

/// Append-only sink for finalized polls
pub trait PollArchive {
    /// Stores one finalized poll
    fn append(&mut self, record: FinalizedPoll);
}

/// Keeps finalized polls in memory, oldest first
#[derive(Debug, Default, Clone)]
pub struct MemoryArchive {
    records: Vec<FinalizedPoll>,
}

impl MemoryArchive {
    /// All records appended so far
    pub fn records(&self) -> &[FinalizedPoll] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been archived
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PollArchive for MemoryArchive {
    fn append(&mut self, record: FinalizedPoll) {
        self.records.push(record);
    }
}

/// Forwards finalized polls to a consumer task, e.g. a database writer
impl PollArchive for mpsc::UnboundedSender<FinalizedPoll> {
    fn append(&mut self, record: FinalizedPoll) {
        if let Err(mpsc::error::SendError(record)) = self.send(record) {
            tracing::warn!(poll_id = %record.poll_id, "history consumer is gone, dropping record");
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::definition::PollDefinition;

    fn ended_poll() -> Poll {
        let mut poll = Poll::new(&PollDefinition::new(
            "Capital of France?",
            ["Paris", "London"],
            10,
        ));
        let paris = poll.options()[0].id();
        poll.record_vote(paris).unwrap();
        poll.record_vote(paris).unwrap();
        poll.end();
        poll
    }

    #[test]
    fn test_finalized_poll_from_poll() {
        let poll = ended_poll();
        let record = FinalizedPoll::from_poll(&poll);

        assert_eq!(record.poll_id, poll.id());
        assert_eq!(record.question, "Capital of France?");
        assert_eq!(
            record.options,
            vec![
                FinalizedOption {
                    text: "Paris".to_string(),
                    votes: 2
                },
                FinalizedOption {
                    text: "London".to_string(),
                    votes: 0
                },
            ]
        );
        assert_eq!(record.total_votes, 2);
        assert!(record.completed_at >= record.created_at);
    }

    #[test]
    fn test_memory_archive_appends_in_order() {
        let mut archive = MemoryArchive::default();
        assert!(archive.is_empty());

        let first = FinalizedPoll::from_poll(&ended_poll());
        let second = FinalizedPoll::from_poll(&ended_poll());
        archive.append(first.clone());
        archive.append(second.clone());

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.records(), &[first, second]);
    }

    #[test]
    fn test_channel_archive_forwards() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        let record = FinalizedPoll::from_poll(&ended_poll());

        tx.append(record.clone());

        assert_eq!(rx.try_recv().unwrap(), record);
    }

    #[test]
    fn test_channel_archive_without_consumer_does_not_panic() {
        let (mut tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.append(FinalizedPoll::from_poll(&ended_poll()));
    }
}
