//! Live connection tracking for the chat server
//!
//! This module owns every connection that has completed its handshake:
//! - Connection identity (ID, remote address, display name)
//! - The write half used for broadcast delivery
//! - The reader task feeding inbound messages to the event loop
//!
//! Only the event loop mutates the registry, so no locking is involved.
//! Every registered connection is also a broadcast target.

use log::debug;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

pub type ConnectionId = u32;

/// Boxed write half of a connection's stream
pub type ConnectionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A client connection that has declared its name
pub struct Connection {
    /// Server-assigned identifier, unique for the server's lifetime
    pub id: ConnectionId,
    /// Peer address reported by the transport on accept
    pub addr: SocketAddr,
    /// Display name from the handshake; never changes afterwards
    pub name: String,
    pub(crate) writer: ConnectionWriter,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn new<W>(id: ConnectionId, addr: SocketAddr, name: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            addr,
            name: name.into(),
            writer: Box::new(writer),
            reader: None,
        }
    }

    /// Attaches the task reading this connection's inbound messages,
    /// so closing the connection also stops the reader.
    pub fn with_reader(mut self, reader: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Renders `<name>@<host>` for notices and relayed lines
    pub fn display(&self) -> String {
        format!("{}@{}", self.name, self.addr.ip())
    }

    /// Shuts down the outgoing stream and stops the reader task.
    ///
    /// Consumes the connection so a stream is only ever closed once.
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.display(), e);
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Set of live connections, keyed by ID
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection; it becomes a broadcast target immediately
    pub fn register(&mut self, connection: Connection) {
        self.connections.insert(connection.id, connection);
    }

    /// Removes a connection, returning it if it was still registered.
    ///
    /// Removing an ID twice is harmless; the second call returns None.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn display(&self, id: ConnectionId) -> Option<String> {
        self.get(id).map(Connection::display)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Broadcast targets: every registered connection
    pub fn targets_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    /// Empties the registry, handing back every connection for closing
    pub fn drain(&mut self) -> Vec<Connection> {
        self.connections.drain().map(|(_, conn)| conn).collect()
    }
}
