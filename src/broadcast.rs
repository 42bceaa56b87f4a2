//! Broadcast dispatcher
//!
//! Turns the current poll into outbound messages. Every notification carries
//! a full snapshot, never a diff. Broadcasts are personalized only by the
//! recipient's own vote; the poll part is the same for everyone.

use crate::{
    PollView, StatePayload, SyncMessage, UpdateMessage,
    ledger::Ledger,
    participant::ParticipantKey,
    poll::{self, Poll, PollSnapshot},
    session::Tunnel,
    watcher::{Id, Value, Watchers},
};

/// The broadcast kinds a poll snapshot can go out as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notification {
    Started,
    Updated,
    Ended,
}

impl Notification {
    fn wrap(self, view: PollView) -> UpdateMessage {
        match self {
            Self::Started => UpdateMessage::PollStarted(view),
            Self::Updated => UpdateMessage::PollUpdated(view),
            Self::Ended => UpdateMessage::PollEnded(view),
        }
    }
}

fn view_for(snapshot: &PollSnapshot, ledger: &Ledger, value: &Value) -> PollView {
    PollView {
        poll: snapshot.clone(),
        user_voted_option_id: value.participant().and_then(|key| ledger.vote_of(key)),
    }
}

/// Sends one snapshot of the poll to every session
pub(crate) fn announce_poll<T: Tunnel, F: Fn(Id) -> Option<T>>(
    watchers: &Watchers,
    notification: Notification,
    poll: &Poll,
    ledger: &Ledger,
    tunnel_finder: F,
) {
    let snapshot = poll.snapshot();
    watchers.announce_with(
        |_, value| Some(notification.wrap(view_for(&snapshot, ledger, value))),
        tunnel_finder,
    );
}

/// Builds the `sync_state` payload for one participant
pub(crate) fn state_payload(
    current: Option<(&Poll, &Ledger)>,
    participant: Option<&ParticipantKey>,
) -> StatePayload {
    match current {
        Some((poll, ledger)) => StatePayload {
            poll: Some(poll.snapshot()),
            voted_option_id: participant.and_then(|key| ledger.vote_of(key)),
        },
        None => StatePayload {
            poll: None,
            voted_option_id: None,
        },
    }
}

/// Replies privately to one session with the current state
pub(crate) fn sync_session<T: Tunnel, F: Fn(Id) -> Option<T>>(
    watchers: &Watchers,
    watcher_id: Id,
    payload: StatePayload,
    tunnel_finder: F,
) {
    watchers.send_state(&SyncMessage::SyncState(payload), watcher_id, tunnel_finder);
}

/// Tells every session that no poll exists any more
pub(crate) fn announce_cleared<T: Tunnel, F: Fn(Id) -> Option<T>>(
    watchers: &Watchers,
    tunnel_finder: F,
) {
    watchers.sync_with(
        |_, _| SyncMessage::SyncState(state_payload(None, None)),
        tunnel_finder,
    );
}

/// Reports a rejected request to the connection that sent it
pub(crate) fn reject<T: Tunnel, F: Fn(Id) -> Option<T>>(
    watchers: &Watchers,
    watcher_id: Id,
    error: poll::Error,
    tunnel_finder: F,
) {
    watchers.send_message(&UpdateMessage::PollError(error), watcher_id, tunnel_finder);
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{definition::PollDefinition, session::testing::MockTunnel};

    fn key(name: &str) -> ParticipantKey {
        ParticipantKey::from_name(name).unwrap()
    }

    #[test]
    fn test_announce_personalizes_vote_only() {
        let mut poll = Poll::new(&PollDefinition::new("Q", ["A", "B"], 10));
        let mut ledger = Ledger::new(poll.id());
        let option_a = poll.options()[0].id();
        let poll_id = poll.id();
        ledger
            .submit_vote(&mut poll, &key("Alice"), poll_id, option_a)
            .unwrap();

        let mut watchers = Watchers::default();
        let teacher = Id::new();
        let alice = Id::new();
        let bob = Id::new();
        watchers.add_watcher(teacher, Value::Teacher).unwrap();
        watchers.add_watcher(alice, Value::Student(key("Alice"))).unwrap();
        watchers.add_watcher(bob, Value::Student(key("Bob"))).unwrap();

        let tunnels = [
            (teacher, MockTunnel::new()),
            (alice, MockTunnel::new()),
            (bob, MockTunnel::new()),
        ];
        let finder = |id: Id| {
            tunnels
                .iter()
                .find(|(tunnel_id, _)| *tunnel_id == id)
                .map(|(_, tunnel)| tunnel.clone())
        };

        announce_poll(&watchers, Notification::Updated, &poll, &ledger, finder);

        let view_of = |tunnel: &MockTunnel| {
            let messages = tunnel.messages();
            assert_eq!(messages.len(), 1);
            match &messages[0] {
                UpdateMessage::PollUpdated(view) => view.clone(),
                other => panic!("unexpected message {other:?}"),
            }
        };

        let teacher_view = view_of(&tunnels[0].1);
        let alice_view = view_of(&tunnels[1].1);
        let bob_view = view_of(&tunnels[2].1);

        assert_eq!(teacher_view.user_voted_option_id, None);
        assert_eq!(alice_view.user_voted_option_id, Some(option_a));
        assert_eq!(bob_view.user_voted_option_id, None);
        assert_eq!(teacher_view.poll, alice_view.poll);
        assert_eq!(alice_view.poll, bob_view.poll);
    }

    #[test]
    fn test_state_payload_idle() {
        let payload = state_payload(None, Some(&key("Alice")));
        assert_eq!(payload.poll, None);
        assert_eq!(payload.voted_option_id, None);
    }

    #[test]
    fn test_state_payload_reports_vote() {
        let mut poll = Poll::new(&PollDefinition::new("Q", ["A", "B"], 10));
        let mut ledger = Ledger::new(poll.id());
        let option_b = poll.options()[1].id();
        let poll_id = poll.id();
        ledger
            .submit_vote(&mut poll, &key("Alice"), poll_id, option_b)
            .unwrap();

        let payload = state_payload(Some((&poll, &ledger)), Some(&key("Alice")));
        assert_eq!(payload.poll, Some(poll.snapshot()));
        assert_eq!(payload.voted_option_id, Some(option_b));

        let teacher_payload = state_payload(Some((&poll, &ledger)), None);
        assert_eq!(teacher_payload.voted_option_id, None);
    }

    #[test]
    fn test_reject_goes_to_one_session() {
        let mut watchers = Watchers::default();
        let teacher = Id::new();
        watchers.add_watcher(teacher, Value::Teacher).unwrap();
        let tunnel = MockTunnel::new();

        reject(&watchers, teacher, poll::Error::PollInProgress, |_| {
            Some(tunnel.clone())
        });

        assert_eq!(
            tunnel.messages(),
            vec![UpdateMessage::PollError(poll::Error::PollInProgress)]
        );
    }
}
