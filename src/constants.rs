//! Configuration constants for the live poll system
//!
//! This module contains the limits and timings used throughout the poll
//! engine to keep poll definitions, participant names and the session
//! registry within consistent boundaries.

/// Poll definition limits
pub mod poll {
    /// Minimum number of options a poll must offer
    pub const MIN_OPTION_COUNT: usize = 2;
    /// Maximum number of options a poll may offer
    pub const MAX_OPTION_COUNT: usize = 4;
    /// Maximum length of the question text in characters
    pub const MAX_QUESTION_LENGTH: usize = 500;
    /// Maximum length of a single option text in characters
    pub const MAX_OPTION_LENGTH: usize = 200;
    /// Shortest allowed poll duration in seconds
    pub const MIN_DURATION_SECONDS: u64 = 1;
    /// Longest allowed poll duration in seconds
    pub const MAX_DURATION_SECONDS: u64 = 3600;
}

/// Timer driver configuration
pub mod timer {
    use web_time::Duration;

    /// Interval between two countdown ticks
    pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
}

/// Session registry limits
pub mod session {
    /// Maximum number of simultaneously connected student sessions
    ///
    /// Guards process memory only. The teacher session is never refused.
    pub const MAX_STUDENTS: usize = 10_000;
    /// Maximum length of a student display name in bytes
    pub const MAX_NAME_LENGTH: usize = 30;
}
