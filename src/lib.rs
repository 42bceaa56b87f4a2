//! # Live Poll Library
//!
//! This library provides the synchronization core for live classroom polls:
//! one teacher broadcasts a timed multiple-choice question, any number of
//! students vote at most once, and every connection is kept in step with a
//! single authoritative poll through full-snapshot notifications, a
//! server-driven countdown and explicit resynchronization on (re)connect.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
use serde::{Deserialize, Serialize};

pub mod archive;
mod broadcast;
pub mod classroom;
pub mod client;
pub mod constants;
pub mod definition;
pub mod ledger;
pub mod participant;
pub mod poll;
pub mod runtime;
pub mod session;
pub mod timer;
pub mod watcher;

pub use timer::AlarmMessage;

use poll::{OptionId, PollSnapshot};

/// A poll snapshot as delivered to one recipient
///
/// The poll part is identical for every recipient of a broadcast. Students
/// who already have a ledger entry additionally see which option they chose.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    /// The full poll snapshot
    #[serde(flatten)]
    pub poll: PollSnapshot,
    /// The recipient's own vote, if they cast one
    pub user_voted_option_id: Option<OptionId>,
}

/// Payload of a `sync_state` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    /// The current poll, or `None` (serialized as `null`) when no poll exists
    pub poll: Option<PollSnapshot>,
    /// The querying participant's vote in that poll, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted_option_id: Option<OptionId>,
}

/// Notifications pushed to connections as the poll changes
///
/// Serialized as `{"event": ..., "data": ...}` with the event names the
/// clients listen for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum UpdateMessage {
    /// A poll was created and is now accepting votes
    PollStarted(PollView),
    /// A vote was accepted or the countdown advanced
    PollUpdated(PollView),
    /// The poll closed; the snapshot carries the final tallies
    PollEnded(PollView),
    /// A request from this connection was rejected
    PollError(poll::Error),
}

impl UpdateMessage {
    /// Converts the update message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }

    /// The poll view carried by a notification
    pub fn view(&self) -> Option<&PollView> {
        match self {
            Self::PollStarted(view) | Self::PollUpdated(view) | Self::PollEnded(view) => {
                Some(view)
            }
            Self::PollError(_) => None,
        }
    }
}

/// Messages sent privately to bring one connection up to date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SyncMessage {
    /// The complete current state, sent in reply to `get_current_state`
    SyncState(StatePayload),
}

impl SyncMessage {
    /// Converts the sync message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Anything the server delivers to a connection, in delivery order
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// A broadcast notification or a rejection
    Update(UpdateMessage),
    /// A private state reply
    Sync(SyncMessage),
}

impl Frame {
    /// Converts the frame to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        match self {
            Self::Update(message) => message.to_message(),
            Self::Sync(message) => message.to_message(),
        }
    }
}
