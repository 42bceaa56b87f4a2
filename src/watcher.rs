//! Session registry
//!
//! Tracks every live connection together with its role: at most one teacher
//! and any number of named students. Sessions are purely connection scoped;
//! nothing here outlives a disconnect. Outbound delivery goes through the
//! [`Tunnel`] found for each session id, so the registry itself never owns a
//! transport.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    str::FromStr,
};

use enum_map::{Enum, EnumMap};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

use super::{SyncMessage, UpdateMessage, participant::ParticipantKey, session::Tunnel};

/// A unique identifier for one connection
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// The role a session was opened with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// The coordinator driving the poll lifecycle
    Teacher,
    /// A named participant who may vote
    Student(ParticipantKey),
}

/// The role without associated data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum ValueKind {
    /// The teacher session
    Teacher,
    /// A student session
    Student,
}

impl Value {
    /// Returns the kind of this value without the associated data
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Teacher => ValueKind::Teacher,
            Value::Student(_) => ValueKind::Student,
        }
    }

    /// The participant key of a student session
    pub fn participant(&self) -> Option<&ParticipantKey> {
        match self {
            Value::Teacher => None,
            Value::Student(key) => Some(key),
        }
    }
}

/// Errors that can occur when registering sessions
#[derive(Error, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The room already holds the maximum number of student sessions
    #[error("maximum number of participants reached")]
    MaximumParticipants,
}

/// All live sessions, indexed by id and by role
#[derive(Debug, Default)]
pub struct Watchers {
    /// Primary mapping from session ID to its role
    mapping: HashMap<Id, Value>,

    /// Reverse mapping organized by role for efficient filtering
    reverse_mapping: EnumMap<ValueKind, HashSet<Id>>,
}

impl Watchers {
    /// Gets all sessions that currently have a tunnel, with their roles
    pub fn vec<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, tunnel_finder: F) -> Vec<(Id, T, Value)> {
        self.reverse_mapping
            .values()
            .flat_map(|v| v.iter())
            .filter_map(|x| match (tunnel_finder(*x), self.mapping.get(x)) {
                (Some(t), Some(v)) => Some((*x, t, v.to_owned())),
                _ => None,
            })
            .collect_vec()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether no session is registered
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Registers a session
    ///
    /// Only students count against the session limit; the teacher can
    /// always join.
    ///
    /// # Errors
    ///
    /// Returns `Error::MaximumParticipants` if a student joins a full room.
    pub fn add_watcher(&mut self, watcher_id: Id, watcher_value: Value) -> Result<(), Error> {
        let kind = watcher_value.kind();

        if kind == ValueKind::Student
            && self.reverse_mapping[ValueKind::Student].len()
                >= crate::constants::session::MAX_STUDENTS
        {
            return Err(Error::MaximumParticipants);
        }

        self.mapping.insert(watcher_id, watcher_value);
        self.reverse_mapping[kind].insert(watcher_id);

        Ok(())
    }

    /// Forgets a session
    ///
    /// # Returns
    ///
    /// The role the session had, or `None` if it was not registered
    pub fn remove_watcher(&mut self, watcher_id: Id) -> Option<Value> {
        let value = self.mapping.remove(&watcher_id)?;
        self.reverse_mapping[value.kind()].remove(&watcher_id);
        Some(value)
    }

    /// Gets the role of a session
    pub fn get_watcher_value(&self, watcher_id: Id) -> Option<Value> {
        self.mapping.get(&watcher_id).map(|v| v.to_owned())
    }

    /// Checks if a session is registered
    pub fn has_watcher(&self, watcher_id: Id) -> bool {
        self.mapping.contains_key(&watcher_id)
    }

    /// The registered teacher session, if any
    pub fn teacher(&self) -> Option<Id> {
        self.reverse_mapping[ValueKind::Teacher].iter().next().copied()
    }

    /// Distinct participant keys among the registered students
    ///
    /// Several connections declaring the same name count once.
    pub fn student_keys(&self) -> HashSet<&ParticipantKey> {
        self.reverse_mapping[ValueKind::Student]
            .iter()
            .filter_map(|id| self.mapping.get(id).and_then(Value::participant))
            .collect()
    }

    /// Closes a session's tunnel and forgets the session
    pub fn remove_watcher_session<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        if let Some(x) = tunnel_finder(watcher_id) {
            x.close();
        }
        self.remove_watcher(watcher_id);
    }

    /// Sends an update message to one session
    pub fn send_message<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        let Some(session) = tunnel_finder(watcher_id) else {
            return;
        };

        session.send_message(message);
    }

    /// Sends a state synchronization message to one session
    pub fn send_state<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &SyncMessage,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        let Some(session) = tunnel_finder(watcher_id) else {
            return;
        };

        session.send_state(message);
    }

    /// Sends a personalized update to every session
    ///
    /// The sender is called once per session with its id and role and may
    /// return `None` to skip that session.
    pub fn announce_with<S, T: Tunnel, F: Fn(Id) -> Option<T>>(&self, sender: S, tunnel_finder: F)
    where
        S: Fn(Id, &Value) -> Option<UpdateMessage>,
    {
        for (watcher, session, v) in self.vec(tunnel_finder) {
            let Some(message) = sender(watcher, &v) else {
                continue;
            };

            session.send_message(&message);
        }
    }

    /// Sends a personalized state message to every session
    pub fn sync_with<S, T: Tunnel, F: Fn(Id) -> Option<T>>(&self, sender: S, tunnel_finder: F)
    where
        S: Fn(Id, &Value) -> SyncMessage,
    {
        for (watcher, session, v) in self.vec(tunnel_finder) {
            session.send_state(&sender(watcher, &v));
        }
    }
}
