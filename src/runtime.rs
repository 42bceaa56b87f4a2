//! Tokio host for a classroom
//!
//! [`Service::spawn`] moves a [`Classroom`] into a background task that owns
//! it exclusively. Connections, client messages, disconnects and timer ticks
//! all arrive as commands on one channel and are applied one at a time, so
//! the classroom never needs a lock.
//!
//! Each [`Connection`] gets its own outbound channel; frames for one
//! connection arrive in the order the classroom produced them. Ticks are
//! spawned sleeps that post back into the command channel through a weak
//! handle, so pending ticks never keep a finished service alive.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use web_time::Duration;

use crate::{
    AlarmMessage, Frame, SyncMessage, UpdateMessage,
    archive::PollArchive,
    classroom::{Classroom, IncomingMessage, Options},
    participant::{self, ParticipantKey},
    session::Tunnel,
    watcher::{self, Id, Value},
};

/// Reasons a connection could not be opened or used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The declared student name was refused
    #[error(transparent)]
    Participant(#[from] participant::Error),
    /// The room is full of students
    #[error(transparent)]
    Watcher(#[from] watcher::Error),
    /// The service task is no longer running
    #[error("the poll service has shut down")]
    Closed,
}

enum Command {
    Connect {
        id: Id,
        value: Value,
        tunnel: ChannelTunnel,
        reply: oneshot::Sender<Result<(), watcher::Error>>,
    },
    Message {
        id: Id,
        message: IncomingMessage,
    },
    Disconnect {
        id: Id,
    },
    Alarm(AlarmMessage),
    State {
        participant: Option<ParticipantKey>,
        reply: oneshot::Sender<SyncMessage>,
    },
}

/// Delivers frames into a connection's channel
#[derive(Debug, Clone)]
struct ChannelTunnel(mpsc::UnboundedSender<Frame>);

impl ChannelTunnel {
    fn deliver(&self, frame: Frame) {
        if self.0.send(frame).is_err() {
            debug!("connection receiver dropped, frame discarded");
        }
    }
}

impl Tunnel for ChannelTunnel {
    fn send_message(&self, message: &UpdateMessage) {
        self.deliver(Frame::Update(message.clone()));
    }

    fn send_state(&self, state: &SyncMessage) {
        self.deliver(Frame::Sync(state.clone()));
    }

    // the stored sender is dropped by the `retain` in `Actor::handle`, which ends the stream
    fn close(self) {}
}

struct Actor<A: PollArchive> {
    classroom: Classroom<A>,
    tunnels: HashMap<Id, ChannelTunnel>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

fn scheduler(
    commands: &mpsc::WeakUnboundedSender<Command>,
) -> impl FnMut(AlarmMessage, Duration) + '_ {
    move |alarm, duration| {
        let commands = commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Alarm(alarm));
            }
        });
    }
}

impl<A: PollArchive> Actor<A> {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        info!("poll service started");
        while let Some(command) = receiver.recv().await {
            self.handle(command);
        }
        info!("poll service stopped");
    }

    fn handle(&mut self, command: Command) {
        let Self {
            classroom,
            tunnels,
            commands,
        } = self;

        match command {
            Command::Connect {
                id,
                value,
                tunnel,
                reply,
            } => {
                tunnels.insert(id, tunnel);
                let result = classroom.add_session(id, value, |id| tunnels.get(&id).cloned());
                if let Err(e) = &result {
                    warn!(session = %id, error = %e, "connection refused");
                }
                // drops the refused tunnel and any superseded one
                tunnels.retain(|id, _| classroom.watchers.has_watcher(*id));
                let _ = reply.send(result);
            }
            Command::Message { id, message } => {
                classroom.receive_message(id, message, scheduler(commands), |id| {
                    tunnels.get(&id).cloned()
                });
            }
            Command::Disconnect { id } => {
                tunnels.remove(&id);
                classroom.remove_session(id, |id| tunnels.get(&id).cloned());
            }
            Command::Alarm(alarm) => {
                classroom.receive_alarm(alarm, scheduler(commands), |id| {
                    tunnels.get(&id).cloned()
                });
            }
            Command::State { participant, reply } => {
                let _ = reply.send(classroom.state_message(participant.as_ref()));
            }
        }
    }
}

/// Handle to a running classroom
///
/// Cheap to clone. The background task stops once every handle and every
/// connection has been dropped.
#[derive(Debug, Clone)]
pub struct Service {
    commands: mpsc::UnboundedSender<Command>,
}

impl Service {
    /// Starts a classroom on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<A>(options: Options, archive: A) -> Self
    where
        A: PollArchive + Send + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let actor = Actor {
            classroom: Classroom::new(options, archive),
            tunnels: HashMap::new(),
            commands: commands.downgrade(),
        };
        tokio::spawn(actor.run(receiver));
        Self { commands }
    }

    /// Opens the teacher connection, replacing any previous one
    ///
    /// # Errors
    ///
    /// Fails if the service has stopped.
    pub async fn connect_teacher(&self) -> Result<Connection, ConnectError> {
        self.connect(Value::Teacher).await
    }

    /// Opens a student connection under a declared name
    ///
    /// Students reconnecting with the same name are bound to the vote they
    /// already cast.
    ///
    /// # Errors
    ///
    /// Fails if the name is refused, the room is full or the service
    /// has stopped.
    pub async fn connect_student(&self, name: &str) -> Result<Connection, ConnectError> {
        let key = ParticipantKey::from_name(name)?;
        self.connect(Value::Student(key)).await
    }

    async fn connect(&self, value: Value) -> Result<Connection, ConnectError> {
        let id = Id::new();
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (reply, response) = oneshot::channel();

        self.commands
            .send(Command::Connect {
                id,
                value,
                tunnel: ChannelTunnel(frames_tx),
                reply,
            })
            .map_err(|_| ConnectError::Closed)?;
        response.await.map_err(|_| ConnectError::Closed)??;

        Ok(Connection {
            id,
            frames,
            commands: self.commands.clone(),
        })
    }

    /// The current state as a teacher or the given participant would see it
    ///
    /// # Errors
    ///
    /// Fails if the service has stopped.
    pub async fn state(
        &self,
        participant: Option<ParticipantKey>,
    ) -> Result<SyncMessage, ConnectError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::State { participant, reply })
            .map_err(|_| ConnectError::Closed)?;
        response.await.map_err(|_| ConnectError::Closed)
    }
}

/// One open connection to the classroom
///
/// Dropping it disconnects the session.
#[derive(Debug)]
pub struct Connection {
    id: Id,
    frames: mpsc::UnboundedReceiver<Frame>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Connection {
    /// The session id
    pub fn id(&self) -> Id {
        self.id
    }

    /// Sends a client message
    ///
    /// # Errors
    ///
    /// Returns `ConnectError::Closed` if the service has stopped.
    pub fn send(&self, message: IncomingMessage) -> Result<(), ConnectError> {
        self.commands
            .send(Command::Message {
                id: self.id,
                message,
            })
            .map_err(|_| ConnectError::Closed)
    }

    /// Parses and sends a raw JSON frame
    ///
    /// Malformed frames are logged and dropped; the connection stays open.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError::Closed` if the service has stopped.
    pub fn send_text(&self, text: &str) -> Result<(), ConnectError> {
        match serde_json::from_str(text) {
            Ok(message) => self.send(message),
            Err(e) => {
                warn!(session = %self.id, error = %e, "malformed frame dropped");
                Ok(())
            }
        }
    }

    /// Waits for the next frame
    ///
    /// Returns `None` once the session was closed by the server, for example
    /// because a newer teacher connection replaced it.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    /// The next frame if one is already queued
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.frames.try_recv().ok()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Disconnect { id: self.id });
    }
}
