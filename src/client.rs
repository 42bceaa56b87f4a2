//! Client-side poll state
//!
//! A [`ClientPoll`] is what a teacher or student view keeps locally: the last
//! authoritative snapshot plus at most one optimistic vote. Every snapshot
//! from the server replaces the local state outright and discards the
//! optimistic overlay; nothing is merged.

use crate::{
    Frame, StatePayload, SyncMessage, UpdateMessage,
    classroom::{IncomingMessage, StateQuery, VoteRequest},
    participant::ParticipantKey,
    poll::{self, OptionId, PollSnapshot, Status},
};

/// Local view of the live poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientPoll {
    /// Last authoritative snapshot, `None` when the server reported no poll
    poll: Option<PollSnapshot>,
    /// Own vote as last confirmed by the server
    voted: Option<OptionId>,
    /// Own vote submitted but not yet reflected in a snapshot
    pending: Option<OptionId>,
}

impl ClientPoll {
    /// A client that has not heard from the server yet
    pub fn new() -> Self {
        Self::default()
    }

    /// The last authoritative snapshot
    pub fn poll(&self) -> Option<&PollSnapshot> {
        self.poll.as_ref()
    }

    /// The option to show as chosen, optimistic or confirmed
    pub fn voted_option(&self) -> Option<OptionId> {
        self.pending.or(self.voted)
    }

    /// The option the server confirmed as this client's vote
    pub fn confirmed_vote(&self) -> Option<OptionId> {
        self.voted
    }

    /// Whether an optimistic vote is waiting for the server
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the vote controls should be enabled
    pub fn can_vote(&self) -> bool {
        self.voted_option().is_none()
            && self
                .poll
                .as_ref()
                .is_some_and(|poll| poll.status == Status::Active)
    }

    fn replace(&mut self, poll: Option<PollSnapshot>, voted: Option<OptionId>) {
        self.poll = poll;
        self.voted = voted;
        self.pending = None;
    }

    /// Applies a broadcast or rejection
    ///
    /// A rejection keeps the snapshot but drops the optimistic vote, since
    /// the server did not count it.
    pub fn apply_update(&mut self, message: &UpdateMessage) {
        match message {
            UpdateMessage::PollStarted(view)
            | UpdateMessage::PollUpdated(view)
            | UpdateMessage::PollEnded(view) => {
                self.replace(Some(view.poll.clone()), view.user_voted_option_id);
            }
            UpdateMessage::PollError(_) => self.pending = None,
        }
    }

    /// Applies a private state reply
    pub fn apply_state(&mut self, message: &SyncMessage) {
        match message {
            SyncMessage::SyncState(StatePayload {
                poll,
                voted_option_id,
            }) => self.replace(poll.clone(), *voted_option_id),
        }
    }

    /// Applies any frame received from the server
    pub fn apply(&mut self, frame: &Frame) {
        match frame {
            Frame::Update(message) => self.apply_update(message),
            Frame::Sync(message) => self.apply_state(message),
        }
    }

    /// Marks an option as voted locally and builds the request to send
    ///
    /// # Errors
    ///
    /// * `Error::NoActivePoll` - no poll is known or it has ended
    /// * `Error::UnknownOption` - the option is not in the current poll
    /// * `Error::DuplicateVote` - this client already voted, optimistically
    ///   or on record
    pub fn submit_vote(
        &mut self,
        option_id: OptionId,
        participant_key: Option<ParticipantKey>,
    ) -> Result<IncomingMessage, poll::Error> {
        let poll = self
            .poll
            .as_ref()
            .filter(|poll| poll.status == Status::Active)
            .ok_or(poll::Error::NoActivePoll)?;
        if self.voted_option().is_some() {
            return Err(poll::Error::DuplicateVote);
        }
        if !poll.has_option(option_id) {
            return Err(poll::Error::UnknownOption);
        }

        let request = VoteRequest {
            poll_id: poll.id,
            option_id,
            participant_key,
        };
        self.pending = Some(option_id);
        Ok(IncomingMessage::SubmitVote(request))
    }

    /// The request to send after (re)connecting
    pub fn resync_request(participant_key: Option<ParticipantKey>) -> IncomingMessage {
        IncomingMessage::GetCurrentState(Some(StateQuery { participant_key }))
    }
}
