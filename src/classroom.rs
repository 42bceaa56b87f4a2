//! Poll lifecycle and request handling
//!
//! The [`Classroom`] owns the single poll aggregate, its vote ledger and the
//! session registry. Every teacher command, student vote, state query and
//! timer tick goes through one `&mut self` method, so requests are applied
//! one at a time and a vote can never interleave with a tick.
//!
//! Lifecycle: `Idle -> Active` on create, `Active -> Ended` when the
//! countdown runs out (or, if enabled, once every connected student has
//! voted), `Active | Ended -> Idle` on reset, and `Ended -> Active` only by
//! creating a new poll.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use web_time::Duration;

use crate::{
    AlarmMessage, StatePayload, SyncMessage,
    archive::{FinalizedPoll, MemoryArchive, PollArchive},
    broadcast::{self, Notification},
    definition::PollDefinition,
    ledger::Ledger,
    participant::ParticipantKey,
    poll::{Error, OptionId, Poll, PollId},
    session::Tunnel,
    timer::{self, TickOutcome},
    watcher::{self, Id, Value, ValueKind, Watchers},
};

/// Where the classroom is in the poll lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// No poll exists
    Idle,
    /// A poll is running and accepting votes
    Active,
    /// The last poll closed; its results are read-only
    Ended,
}

/// Behavior switches for a classroom
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// End the poll as soon as every connected student has voted
    #[serde(default)]
    end_when_all_voted: bool,
}

impl Options {
    /// Enables or disables early termination once everyone has voted
    pub fn with_end_when_all_voted(mut self, enabled: bool) -> Self {
        self.end_when_all_voted = enabled;
        self
    }

    /// Whether early termination is enabled
    pub fn end_when_all_voted(self) -> bool {
        self.end_when_all_voted
    }
}

/// Messages received from connected clients
///
/// Deserialized from `{"event": ..., "data": ...}` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum IncomingMessage {
    /// Teacher: start a new poll
    CreatePoll(PollDefinition),
    /// Student: vote for an option
    SubmitVote(VoteRequest),
    /// Anyone: ask for the current state
    ///
    /// Clients may send the event with no `data` at all.
    GetCurrentState(Option<StateQuery>),
    /// Teacher: discard the poll and return to idle
    ResetPoll,
}

impl IncomingMessage {
    /// Whether a session of the given role may send this message
    fn follows(&self, sender_kind: ValueKind) -> bool {
        matches!(
            (self, sender_kind),
            (IncomingMessage::CreatePoll(_) | IncomingMessage::ResetPoll, ValueKind::Teacher)
                | (IncomingMessage::SubmitVote(_), ValueKind::Student)
                | (IncomingMessage::GetCurrentState(_), _)
        )
    }
}

/// Payload of `submit_vote`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    /// The poll the student is voting in
    pub poll_id: PollId,
    /// The chosen option
    pub option_id: OptionId,
    /// The key the client believes it votes under
    ///
    /// Informational only: the vote is always recorded under the name the
    /// session joined with.
    #[serde(default)]
    pub participant_key: Option<ParticipantKey>,
}

/// Payload of `get_current_state`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateQuery {
    /// Whose vote status to report when the session itself is not a student
    #[serde(default)]
    pub participant_key: Option<ParticipantKey>,
}

/// The current poll together with its ledger
#[derive(Debug, Clone)]
struct Ballot {
    poll: Poll,
    ledger: Ledger,
}

/// The single authority over the live poll
pub struct Classroom<A: PollArchive = MemoryArchive> {
    /// Every connected session
    pub watchers: Watchers,
    /// The active or most recently ended poll
    current: Option<Ballot>,
    /// Behavior switches
    options: Options,
    /// Where ended polls are recorded
    archive: A,
}

impl<A: PollArchive> Debug for Classroom<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classroom")
            .field("phase", &self.phase())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Classroom<MemoryArchive> {
    fn default() -> Self {
        Self::new(Options::default(), MemoryArchive::default())
    }
}

// Accessors
impl<A: PollArchive> Classroom<A> {
    /// Creates an idle classroom
    pub fn new(options: Options, archive: A) -> Self {
        Self {
            watchers: Watchers::default(),
            current: None,
            options,
            archive,
        }
    }

    /// The current lifecycle phase
    pub fn phase(&self) -> Phase {
        match &self.current {
            None => Phase::Idle,
            Some(ballot) if ballot.poll.is_active() => Phase::Active,
            Some(_) => Phase::Ended,
        }
    }

    /// The active or most recently ended poll
    pub fn poll(&self) -> Option<&Poll> {
        self.current.as_ref().map(|ballot| &ballot.poll)
    }

    /// The ledger of the current poll
    pub fn ledger(&self) -> Option<&Ledger> {
        self.current.as_ref().map(|ballot| &ballot.ledger)
    }

    /// The history sink
    pub fn archive(&self) -> &A {
        &self.archive
    }

    /// The behavior switches in effect
    pub fn options(&self) -> Options {
        self.options
    }

    /// The `sync_state` message for a participant (or for the teacher when
    /// `participant` is `None`)
    pub fn state_message(&self, participant: Option<&ParticipantKey>) -> SyncMessage {
        SyncMessage::SyncState(self.state_payload(participant))
    }

    fn state_payload(&self, participant: Option<&ParticipantKey>) -> StatePayload {
        broadcast::state_payload(
            self.current
                .as_ref()
                .map(|ballot| (&ballot.poll, &ballot.ledger)),
            participant,
        )
    }

    fn sync<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        watcher_id: Id,
        participant: Option<&ParticipantKey>,
        tunnel_finder: F,
    ) {
        broadcast::sync_session(
            &self.watchers,
            watcher_id,
            self.state_payload(participant),
            tunnel_finder,
        );
    }

    fn everyone_voted(&self) -> bool {
        let Some(ballot) = &self.current else {
            return false;
        };
        let students = self.watchers.student_keys();
        !students.is_empty() && students.iter().all(|key| ballot.ledger.has_voted(key))
    }
}

// Sessions
impl<A: PollArchive> Classroom<A> {
    /// Registers a new connection and answers it with the current state
    ///
    /// A teacher connection replaces any earlier teacher session, whose
    /// tunnel is closed. The reply is sent before any later notification,
    /// so a client that connects mid-poll never waits for the next change.
    ///
    /// # Errors
    ///
    /// Returns `watcher::Error::MaximumParticipants` if a student joins a full
    /// room.
    pub fn add_session<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher_id: Id,
        value: Value,
        tunnel_finder: F,
    ) -> Result<(), watcher::Error> {
        if matches!(value, Value::Teacher)
            && let Some(previous) = self.watchers.teacher()
            && previous != watcher_id
        {
            info!(session = %previous, "teacher session superseded");
            self.watchers
                .remove_watcher_session(previous, &tunnel_finder);
        }

        self.watchers.add_watcher(watcher_id, value.clone())?;
        info!(session = %watcher_id, role = ?value.kind(), "session joined");

        self.sync(watcher_id, value.participant(), tunnel_finder);

        Ok(())
    }

    /// Forgets a disconnected session
    ///
    /// The session's ledger entry stays; a student who rejoins under the
    /// same name is still bound to it. The poll keeps running when the
    /// teacher leaves.
    pub fn remove_session<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        let Some(value) = self.watchers.remove_watcher(watcher_id) else {
            return;
        };
        info!(session = %watcher_id, role = ?value.kind(), "session left");

        if matches!(value, Value::Student(_))
            && self.options.end_when_all_voted
            && self.phase() == Phase::Active
            && self.everyone_voted()
        {
            self.finish(tunnel_finder);
        }
    }
}

// Lifecycle
impl<A: PollArchive> Classroom<A> {
    /// Starts a new poll and its countdown
    ///
    /// Allowed from `Idle` and `Ended`; the previous poll and ledger are
    /// replaced wholesale. Every session receives `poll_started`.
    ///
    /// # Errors
    ///
    /// * `Error::PollInProgress` - a poll is still active
    /// * `Error::InvalidPollDefinition` - the definition breaks a rule
    pub fn create_poll<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        definition: &PollDefinition,
        schedule_message: S,
        tunnel_finder: F,
    ) -> Result<PollId, Error> {
        if self.phase() == Phase::Active {
            return Err(Error::PollInProgress);
        }
        definition.check()?;

        let poll = Poll::new(definition);
        let poll_id = poll.id();
        info!(
            poll_id = %poll_id,
            question = poll.question(),
            options = poll.options().len(),
            duration = poll.duration(),
            "poll created"
        );

        let ballot = self.current.insert(Ballot {
            ledger: Ledger::new(poll_id),
            poll,
        });

        broadcast::announce_poll(
            &self.watchers,
            Notification::Started,
            &ballot.poll,
            &ballot.ledger,
            tunnel_finder,
        );
        timer::schedule_tick(poll_id, schedule_message);

        Ok(poll_id)
    }

    /// Records a student's vote and broadcasts the new tallies
    ///
    /// # Errors
    ///
    /// * `Error::NoActivePoll` - no poll, another poll, or the poll has ended
    /// * `Error::UnknownOption` - the option is not part of the poll
    /// * `Error::DuplicateVote` - the participant already voted
    pub fn submit_vote<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        participant: &ParticipantKey,
        poll_id: PollId,
        option_id: OptionId,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        let Some(ballot) = self.current.as_mut() else {
            return Err(Error::NoActivePoll);
        };
        ballot
            .ledger
            .submit_vote(&mut ballot.poll, participant, poll_id, option_id)?;
        debug!(
            poll_id = %poll_id,
            participant = %participant,
            option_id = %option_id,
            total = ballot.poll.total_votes(),
            "vote accepted"
        );

        broadcast::announce_poll(
            &self.watchers,
            Notification::Updated,
            &ballot.poll,
            &ballot.ledger,
            &tunnel_finder,
        );

        if self.options.end_when_all_voted && self.everyone_voted() {
            self.finish(tunnel_finder);
        }

        Ok(())
    }

    /// Discards the poll and ledger and tells every session
    ///
    /// Pending ticks for the discarded poll become stale. Resetting an idle
    /// classroom does nothing.
    pub fn reset<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: F) {
        match self.current.take() {
            Some(ballot) => {
                info!(poll_id = %ballot.poll.id(), "poll reset");
                broadcast::announce_cleared(&self.watchers, tunnel_finder);
            }
            None => debug!("reset while idle"),
        }
    }

    /// Ends the active poll early
    fn finish<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: F) {
        let Some(ballot) = self.current.as_mut() else {
            return;
        };
        if ballot.poll.end() {
            info!(poll_id = %ballot.poll.id(), "every student voted, ending early");
            self.announce_ended(tunnel_finder);
        }
    }

    /// Broadcasts the terminal snapshot and hands the poll to the archive
    fn announce_ended<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: F) {
        let Some(ballot) = &self.current else {
            return;
        };
        info!(
            poll_id = %ballot.poll.id(),
            total = ballot.poll.total_votes(),
            "poll ended"
        );
        broadcast::announce_poll(
            &self.watchers,
            Notification::Ended,
            &ballot.poll,
            &ballot.ledger,
            tunnel_finder,
        );
        self.archive.append(FinalizedPoll::from_poll(&ballot.poll));
    }
}

// Network
impl<A: PollArchive> Classroom<A> {
    /// Handles a message from a connected session
    ///
    /// Messages from unknown sessions or from the wrong role are dropped.
    /// Rejections go back to the sender as `poll_error`, except a duplicate
    /// vote, which is answered with `sync_state` carrying the vote already
    /// on record.
    ///
    /// # Arguments
    ///
    /// * `watcher_id` - The session the message came from
    /// * `message` - The decoded client message
    /// * `schedule_message` - Schedules the first tick when a poll starts
    /// * `tunnel_finder` - Finds the tunnel of a session by its id
    ///
    /// # Type Parameters
    ///
    /// * `T` - Type implementing the Tunnel trait for client delivery
    /// * `F` - Function type for finding tunnels by session ID
    /// * `S` - Function type for scheduling alarms
    pub fn receive_message<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    >(
        &mut self,
        watcher_id: Id,
        message: IncomingMessage,
        schedule_message: S,
        tunnel_finder: F,
    ) {
        let Some(watcher_value) = self.watchers.get_watcher_value(watcher_id) else {
            warn!(session = %watcher_id, "message from unknown session");
            return;
        };

        if !message.follows(watcher_value.kind()) {
            warn!(
                session = %watcher_id,
                role = ?watcher_value.kind(),
                ?message,
                "message not permitted for role"
            );
            return;
        }

        match message {
            IncomingMessage::CreatePoll(definition) => {
                if let Err(e) = self.create_poll(&definition, schedule_message, &tunnel_finder) {
                    warn!(session = %watcher_id, error = %e, "create rejected");
                    broadcast::reject(&self.watchers, watcher_id, e, tunnel_finder);
                }
            }
            IncomingMessage::SubmitVote(VoteRequest {
                poll_id, option_id, ..
            }) => {
                let Some(participant) = watcher_value.participant() else {
                    return;
                };
                match self.submit_vote(participant, poll_id, option_id, &tunnel_finder) {
                    Ok(()) => {}
                    Err(Error::DuplicateVote) => {
                        debug!(participant = %participant, "duplicate vote");
                        self.sync(watcher_id, Some(participant), tunnel_finder);
                    }
                    Err(e) => {
                        warn!(participant = %participant, error = %e, "vote rejected");
                        broadcast::reject(&self.watchers, watcher_id, e, tunnel_finder);
                    }
                }
            }
            IncomingMessage::GetCurrentState(query) => {
                let queried = query.and_then(|query| query.participant_key);
                let participant = watcher_value.participant().or(queried.as_ref());
                self.sync(watcher_id, participant, tunnel_finder);
            }
            IncomingMessage::ResetPoll => self.reset(tunnel_finder),
        }
    }

    /// Handles a scheduled alarm
    ///
    /// A tick for the current active poll takes one second off the
    /// countdown. While time remains, every session gets `poll_updated` and
    /// the next tick is scheduled; the tick that reaches zero ends the poll
    /// and sends `poll_ended` instead. Ticks for any other poll are stale
    /// and dropped, which ends their chain.
    pub fn receive_alarm<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    >(
        &mut self,
        message: AlarmMessage,
        schedule_message: S,
        tunnel_finder: F,
    ) {
        match message {
            AlarmMessage::Tick { poll_id } => {
                let Some(ballot) = self.current.as_mut() else {
                    debug!(poll_id = %poll_id, "stale tick while idle");
                    return;
                };
                if ballot.poll.id() != poll_id {
                    debug!(poll_id = %poll_id, "stale tick for replaced poll");
                    return;
                }

                match ballot.poll.tick() {
                    TickOutcome::Running(remaining) => {
                        debug!(poll_id = %poll_id, remaining, "tick");
                        broadcast::announce_poll(
                            &self.watchers,
                            Notification::Updated,
                            &ballot.poll,
                            &ballot.ledger,
                            tunnel_finder,
                        );
                        timer::schedule_tick(poll_id, schedule_message);
                    }
                    TickOutcome::Expired => self.announce_ended(tunnel_finder),
                    TickOutcome::Stopped => {
                        debug!(poll_id = %poll_id, "tick after poll ended");
                    }
                }
            }
        }
    }
}
