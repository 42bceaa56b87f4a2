//! At-most-once vote recording
//!
//! The ledger remembers which option each participant chose in the current
//! poll. It is replaced together with the poll on every create and dropped
//! on reset; disconnecting does not touch it, so a student who rejoins under
//! the same name is still bound to their earlier vote.

use std::collections::{HashMap, hash_map::Entry};

use crate::{
    participant::ParticipantKey,
    poll::{Error, OptionId, Poll, PollId},
};

/// Votes recorded for one poll, at most one per participant
#[derive(Debug, Clone)]
pub struct Ledger {
    poll_id: PollId,
    entries: HashMap<ParticipantKey, OptionId>,
}

impl Ledger {
    /// Creates an empty ledger bound to a poll
    pub fn new(poll_id: PollId) -> Self {
        Self {
            poll_id,
            entries: HashMap::new(),
        }
    }

    /// The poll this ledger belongs to
    pub fn poll_id(&self) -> PollId {
        self.poll_id
    }

    /// The option a participant voted for, if any
    pub fn vote_of(&self, participant: &ParticipantKey) -> Option<OptionId> {
        self.entries.get(participant).copied()
    }

    /// Whether the participant already has an entry
    pub fn has_voted(&self, participant: &ParticipantKey) -> bool {
        self.entries.contains_key(participant)
    }

    /// Number of recorded votes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no vote has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a vote and increments the chosen option's tally
    ///
    /// Checks run in order: the poll must be this ledger's poll and still
    /// active, the option must belong to it, and the participant must not
    /// have voted yet. A rejected vote leaves both the ledger and the poll
    /// unchanged.
    ///
    /// # Errors
    ///
    /// * `Error::NoActivePoll` - `poll_id` is not the current poll or it has ended
    /// * `Error::UnknownOption` - the option is not part of the poll
    /// * `Error::DuplicateVote` - the participant already voted in this poll
    pub fn submit_vote(
        &mut self,
        poll: &mut Poll,
        participant: &ParticipantKey,
        poll_id: PollId,
        option_id: OptionId,
    ) -> Result<(), Error> {
        if poll_id != poll.id() || poll_id != self.poll_id || !poll.is_active() {
            return Err(Error::NoActivePoll);
        }
        if poll.option(option_id).is_none() {
            return Err(Error::UnknownOption);
        }
        match self.entries.entry(participant.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateVote),
            Entry::Vacant(entry) => {
                poll.record_vote(option_id)?;
                entry.insert(option_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::definition::PollDefinition;

    fn setup() -> (Poll, Ledger) {
        let poll = Poll::new(&PollDefinition::new(
            "Capital of France?",
            ["Paris", "London"],
            10,
        ));
        let ledger = Ledger::new(poll.id());
        (poll, ledger)
    }

    fn key(name: &str) -> ParticipantKey {
        ParticipantKey::from_name(name).unwrap()
    }

    #[test]
    fn test_submit_vote() {
        let (mut poll, mut ledger) = setup();
        let paris = poll.options()[0].id();
        let poll_id = poll.id();

        ledger
            .submit_vote(&mut poll, &key("A"), poll_id, paris)
            .unwrap();

        assert_eq!(ledger.vote_of(&key("A")), Some(paris));
        assert!(ledger.has_voted(&key("A")));
        assert_eq!(ledger.len(), 1);
        assert_eq!(poll.option(paris).unwrap().votes(), 1);
    }

    #[test]
    fn test_duplicate_vote_never_changes_tallies() {
        let (mut poll, mut ledger) = setup();
        let paris = poll.options()[0].id();
        let london = poll.options()[1].id();
        let poll_id = poll.id();

        ledger.submit_vote(&mut poll, &key("A"), poll_id, paris).unwrap();
        let before = poll.snapshot();

        assert_eq!(
            ledger.submit_vote(&mut poll, &key("A"), poll_id, london),
            Err(Error::DuplicateVote)
        );
        assert_eq!(
            ledger.submit_vote(&mut poll, &key("A"), poll_id, paris),
            Err(Error::DuplicateVote)
        );

        assert_eq!(poll.snapshot(), before);
        assert_eq!(ledger.vote_of(&key("A")), Some(paris));
    }

    #[test]
    fn test_vote_for_other_poll() {
        let (mut poll, mut ledger) = setup();
        let paris = poll.options()[0].id();

        assert_eq!(
            ledger.submit_vote(&mut poll, &key("A"), PollId::new(), paris),
            Err(Error::NoActivePoll)
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_vote_after_end() {
        let (mut poll, mut ledger) = setup();
        let paris = poll.options()[0].id();
        let poll_id = poll.id();
        poll.end();

        assert_eq!(
            ledger.submit_vote(&mut poll, &key("A"), poll_id, paris),
            Err(Error::NoActivePoll)
        );
        assert_eq!(poll.total_votes(), 0);
    }

    #[test]
    fn test_unknown_option() {
        let (mut poll, mut ledger) = setup();
        let poll_id = poll.id();

        assert_eq!(
            ledger.submit_vote(&mut poll, &key("A"), poll_id, OptionId::new()),
            Err(Error::UnknownOption)
        );
        assert!(!ledger.has_voted(&key("A")));
    }

    #[test]
    fn test_tally_sum_equals_accepted_votes() {
        let (mut poll, mut ledger) = setup();
        let poll_id = poll.id();
        let options = [poll.options()[0].id(), poll.options()[1].id()];

        let mut accepted = 0;
        for (i, name) in ["A", "B", "C", "D", "E", "A", "C"].iter().enumerate() {
            if ledger
                .submit_vote(&mut poll, &key(name), poll_id, options[i % 2])
                .is_ok()
            {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 5);
        assert_eq!(poll.total_votes(), 5);
        assert_eq!(ledger.len(), 5);
    }
}
