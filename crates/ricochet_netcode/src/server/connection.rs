//! # Client Connections
//!
//! One bounded single-producer/single-consumer queue per connection.
//!
//! ## Design
//!
//! - The transport thread owns the [`ConnectionHandle`] (producer)
//! - The tick loop owns the [`Connection`] (consumer) and drains it with
//!   `try_recv`, never blocking
//! - Anything arriving mid-tick is seen on the next tick
//! - Dropping the handle is a disconnect, applied at the next tick boundary

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use ricochet_shared::{EntityId, FireRequest, InputCommand, Tick};

use crate::error::{SessionError, SessionResult};
use crate::server::sequencer::CommandSequencer;

/// Messages a client can send.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InboundMessage {
    /// One tick of movement intent
    Input(InputCommand),
    /// A shot
    Fire(FireRequest),
    /// A reload
    Reload,
    /// Graceful leave
    Disconnect,
}

/// State of a connection as seen by the tick loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Active
    #[default]
    Connected = 0,
    /// Leave requested or producer dropped; removed at the tick boundary
    Disconnecting = 1,
}

/// Transport-side producer for one connection.
///
/// Not `Clone`: exactly one producer per queue.
#[derive(Debug)]
pub struct ConnectionHandle {
    entity: EntityId,
    tx: Sender<InboundMessage>,
}

impl ConnectionHandle {
    /// Entity controlled through this connection
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Queues a movement command.
    ///
    /// # Errors
    ///
    /// [`SessionError::QueueFull`] or [`SessionError::Disconnected`].
    pub fn send_input(&self, command: InputCommand) -> SessionResult<()> {
        self.send(InboundMessage::Input(command))
    }

    /// Queues a fire request.
    ///
    /// # Errors
    ///
    /// [`SessionError::QueueFull`] or [`SessionError::Disconnected`].
    pub fn send_fire(&self, request: FireRequest) -> SessionResult<()> {
        self.send(InboundMessage::Fire(request))
    }

    /// Queues a reload request.
    ///
    /// # Errors
    ///
    /// [`SessionError::QueueFull`] or [`SessionError::Disconnected`].
    pub fn send_reload(&self) -> SessionResult<()> {
        self.send(InboundMessage::Reload)
    }

    /// Leaves the session at the next tick boundary.
    ///
    /// Anything queued behind the leave is discarded.
    pub fn disconnect(self) {
        // A full or closed queue still disconnects: dropping `tx` does it.
        let _ = self.tx.try_send(InboundMessage::Disconnect);
    }

    fn send(&self, message: InboundMessage) -> SessionResult<()> {
        self.tx.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => SessionError::QueueFull(self.entity),
            TrySendError::Disconnected(_) => SessionError::Disconnected(self.entity),
        })
    }
}

/// Tick-loop side of one connection.
#[derive(Debug)]
pub struct Connection {
    entity: EntityId,
    rx: Receiver<InboundMessage>,
    state: ConnectionState,
    /// Per-owner command ordering
    pub sequencer: CommandSequencer,
    connected_at: Tick,
}

impl Connection {
    /// Creates both ends of a connection for `entity`.
    #[must_use]
    pub fn open(
        entity: EntityId,
        queue_capacity: usize,
        sequencer: CommandSequencer,
        tick: Tick,
    ) -> (Self, ConnectionHandle) {
        let (tx, rx) = crossbeam_channel::bounded(queue_capacity.max(1));
        let connection = Self {
            entity,
            rx,
            state: ConnectionState::Connected,
            sequencer,
            connected_at: tick,
        };
        (connection, ConnectionHandle { entity, tx })
    }

    /// Entity controlled through this connection
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Tick the connection was approved at
    #[must_use]
    pub const fn connected_at(&self) -> Tick {
        self.connected_at
    }

    /// Next queued message, without blocking.
    ///
    /// Returns `None` when the queue is empty. A leave message or a dropped
    /// handle flips the connection to [`ConnectionState::Disconnecting`]
    /// and ends the drain.
    pub fn poll(&mut self) -> Option<InboundMessage> {
        if self.state == ConnectionState::Disconnecting {
            return None;
        }
        match self.rx.try_recv() {
            Ok(InboundMessage::Disconnect) | Err(TryRecvError::Disconnected) => {
                self.state = ConnectionState::Disconnecting;
                None
            }
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ricochet_shared::Vec2;

    fn open(capacity: usize) -> (Connection, ConnectionHandle) {
        Connection::open(EntityId(1), capacity, CommandSequencer::new(15, 128), 0)
    }

    fn cmd(sequence: u32) -> InputCommand {
        InputCommand::new(sequence, Vec2::ZERO, 0.0, 0.0).unwrap()
    }

    #[test]
    fn test_connection_lifecycle() {
        let (mut conn, handle) = open(8);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(handle.entity(), EntityId(1));

        handle.send_input(cmd(1)).unwrap();
        handle.send_reload().unwrap();
        handle.disconnect();

        assert_eq!(conn.poll(), Some(InboundMessage::Input(cmd(1))));
        assert_eq!(conn.poll(), Some(InboundMessage::Reload));
        assert_eq!(conn.poll(), None);
        assert_eq!(conn.state(), ConnectionState::Disconnecting);
    }

    #[test]
    fn test_dropped_handle_disconnects() {
        let (mut conn, handle) = open(8);
        drop(handle);
        assert_eq!(conn.poll(), None);
        assert_eq!(conn.state(), ConnectionState::Disconnecting);
    }

    #[test]
    fn test_queue_full() {
        let (_conn, handle) = open(2);
        handle.send_input(cmd(1)).unwrap();
        handle.send_input(cmd(2)).unwrap();
        assert_eq!(
            handle.send_input(cmd(3)),
            Err(SessionError::QueueFull(EntityId(1)))
        );
    }

    #[test]
    fn test_send_after_session_gone() {
        let (conn, handle) = open(2);
        drop(conn);
        assert_eq!(
            handle.send_reload(),
            Err(SessionError::Disconnected(EntityId(1)))
        );
    }

    #[test]
    fn test_empty_poll() {
        let (mut conn, _handle) = open(2);
        assert_eq!(conn.poll(), None);
        assert_eq!(conn.state(), ConnectionState::Connected);
    }
}
