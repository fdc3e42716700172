//! Connection bookkeeping for the arena server
//!
//! This module tracks every open websocket connection together with the
//! per-connection state that gates its traffic:
//! - outbound queue handle used by snapshots and liveness pings
//! - close handle that tears the socket down regardless of the queue
//! - liveness flag and pending pong watchdog
//!
//! The manager is owned by the server's single run loop, so none of this
//! state is shared across tasks. Frame rate limiting happens earlier, in
//! each socket's reader task.

use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::liveness::{Liveness, Probe};
use crate::world::ConnectionId;

/// One open connection and the state that gates its traffic
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Peer address, kept for logging
    pub addr: SocketAddr,
    /// Queue drained by the connection's writer task
    pub sender: mpsc::Sender<Message>,
    /// Fired to end the socket's tasks even when the queue is wedged
    closer: oneshot::Sender<()>,
    pub liveness: Liveness,
    pub connected_at: Instant,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
        closer: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            addr,
            sender,
            closer,
            liveness: Liveness::new(),
            connected_at: Instant::now(),
        }
    }

    /// Queues a message without waiting. A full queue drops the message;
    /// returns false only when the writer side is gone.
    pub fn send(&self, message: Message) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Outbound queue full for connection {}, dropping", self.id);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Forcibly closes the socket
    ///
    /// A Close frame is queued if there is room, then the socket task is
    /// signalled. The signal does not go through the outbound queue, so a
    /// peer that stopped reading cannot hold the socket open.
    pub fn close(self) {
        let _ = self.sender.try_send(Message::Close(None));
        let _ = self.closer.send(());
    }
}

/// Registry of open connections
///
/// Enforces the connection cap, hands out process-unique ids and owns each
/// connection's rate-limit and liveness state until it closes.
pub struct ClientManager {
    connections: HashMap<ConnectionId, Connection>,
    next_connection_id: ConnectionId,
    max_connections: usize,
}

impl ClientManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
            max_connections,
        }
    }

    /// Registers a new connection
    ///
    /// Returns None if the server is at capacity. Ids are never reused.
    pub fn add_connection(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
        closer: oneshot::Sender<()>,
    ) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let id = self.next_connection_id;
        self.next_connection_id += 1;

        info!("Connection {} opened from {}", id, addr);
        self.connections
            .insert(id, Connection::new(id, addr, sender, closer));
        Some(id)
    }

    /// Forgets a connection, cancelling its pending watchdog
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let mut connection = self.connections.remove(&id)?;
        connection.liveness.cancel();
        info!(
            "Connection {} from {} closed after {:?}",
            id,
            connection.addr,
            connection.connected_at.elapsed()
        );
        Some(connection)
    }

    pub fn send_to(&self, id: ConnectionId, message: Message) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|connection| connection.send(message))
    }

    /// Queues the same text frame on every connection
    pub fn broadcast(&self, text: &str) {
        for connection in self.connections.values() {
            connection.send(Message::Text(text.to_string()));
        }
    }

    pub fn probe(&mut self, id: ConnectionId) -> Option<Probe> {
        self.connections
            .get_mut(&id)
            .map(|connection| connection.liveness.probe())
    }

    pub fn arm_watchdog(&mut self, id: ConnectionId, watchdog: JoinHandle<()>) {
        match self.connections.get_mut(&id) {
            Some(connection) => connection.liveness.arm(watchdog),
            None => watchdog.abort(),
        }
    }

    pub fn on_pong(&mut self, id: ConnectionId) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.liveness.on_pong();
        }
    }

    /// True when the watchdog for probe `seq` should close the connection
    pub fn watchdog_expired(&mut self, id: ConnectionId, seq: u64) -> bool {
        self.connections
            .get_mut(&id)
            .is_some_and(|connection| connection.liveness.on_watchdog(seq))
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Returns the number of open connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connections are open
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
