//! Server-driven countdown
//!
//! The timer never runs on its own thread. Each tick is an [`AlarmMessage`]
//! handed to the host's scheduler, and handling a tick schedules the next
//! one. A tick whose poll is gone or no longer active is dropped without
//! rescheduling, which is how the chain gets cancelled on end or reset.

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::poll::PollId;

/// Alarm messages delivered back to the classroom by the host scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// One countdown step for the given poll
    Tick {
        /// The poll this tick belongs to; ticks for any other poll are stale
        poll_id: PollId,
    },
}

/// Result of advancing a countdown by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Time remains; carries the new remaining seconds
    Running(u64),
    /// This tick consumed the last second
    Expired,
    /// The poll was not active, nothing changed
    Stopped,
}

/// Remaining time of a poll, kept within `[0, duration]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    duration: u64,
    remaining: u64,
}

impl Countdown {
    /// Starts a countdown with the full duration remaining
    pub fn new(duration: u64) -> Self {
        Self {
            duration,
            remaining: duration,
        }
    }

    /// The configured duration in seconds
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// The remaining seconds
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Removes one second, never going below zero
    ///
    /// # Returns
    ///
    /// The remaining seconds after the tick
    pub fn tick(&mut self) -> u64 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    /// Forces the remaining time to zero
    pub fn expire(&mut self) {
        self.remaining = 0;
    }
}

/// Asks the host scheduler for the next tick of `poll_id`
pub(crate) fn schedule_tick<S: FnMut(AlarmMessage, Duration)>(
    poll_id: PollId,
    mut schedule_message: S,
) {
    schedule_message(
        AlarmMessage::Tick { poll_id },
        crate::constants::timer::TICK_INTERVAL,
    );
}
