//! Outbound connection seam
//!
//! The poll engine never touches sockets. Every message for a connection is
//! handed to a [`Tunnel`], which the host implements on top of whatever
//! transport it serves (WebSocket, SSE, an in-process channel). A tunnel
//! must deliver messages in the order it receives them.

use super::{SyncMessage, UpdateMessage};

/// Sends messages to one connected client
pub trait Tunnel {
    /// Sends a broadcast notification (`poll_started`, `poll_updated`,
    /// `poll_ended`) or a rejection (`poll_error`)
    fn send_message(&self, message: &UpdateMessage);

    /// Sends a private `sync_state` reply
    fn send_state(&self, state: &SyncMessage);

    /// Closes the connection
    fn close(self);
}
