//! Server network layer: accepts TCP clients and relays chat between them

use crate::registry::{Connection, ConnectionId, ConnectionRegistry};
use crate::router;
use log::{debug, info, warn};
use shared::codec;
use shared::{Message, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    /// A client declared its name and is waiting for the ack
    Handshake {
        id: ConnectionId,
        addr: SocketAddr,
        name: String,
        writer: OwnedWriteHalf,
    },
    Received {
        id: ConnectionId,
        message: Message,
    },
    /// Peer said goodbye, hung up, or its stream failed (`reason` is set)
    Closed {
        id: ConnectionId,
        reason: Option<String>,
    },
    Shutdown,
}

/// Cloneable trigger for stopping a running [`Server`] from another task.
///
/// Calling [`ShutdownHandle::shutdown`] more than once is harmless.
#[derive(Clone)]
pub struct ShutdownHandle {
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.events.send(ServerEvent::Shutdown).is_err() {
            debug!("Shutdown requested after server loop ended");
        }
    }
}

/// Chat server multiplexing every client on a single dispatcher
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    registry: ConnectionRegistry,
    /// Reader tasks of connections still in their handshake
    handshaking: HashMap<ConnectionId, JoinHandle<()>>,
    next_connection_id: ConnectionId,
    max_frame_len: usize,
    /// Connections whose last send failed, dropped after the current dispatch
    pending_drops: Vec<ConnectionId>,
    running: bool,
    shut_down: bool,

    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn new(addr: &str, max_frame_len: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("[SERVER][0]: Listening on {}.", local_addr);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            registry: ConnectionRegistry::new(),
            handshaking: HashMap::new(),
            next_connection_id: 1,
            max_frame_len,
            pending_drops: Vec::new(),
            running: false,
            shut_down: false,
            events_tx,
            events_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            events: self.events_tx.clone(),
        }
    }

    /// Main server loop.
    ///
    /// Waits on the listener, the console, and the connection event queue.
    /// Any line on the console stops the loop; a closed console is just no
    /// longer watched, unlike a plain select on stdin where EOF reads as an
    /// empty line and stops the server. Returns after [`Server::shutdown`] has run.
    pub async fn run<C>(&mut self, console: C) -> Result<()>
    where
        C: AsyncRead + Unpin,
    {
        let mut console = Some(BufReader::new(console).lines());
        self.running = !self.shut_down;

        info!("Server started successfully");

        while self.running {
            tokio::select! {
                accepted = Self::accept(self.listener.as_ref()) => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) if is_per_connection(&e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                        Err(e) => {
                            warn!("[SERVER][{}]: Listener failed: {}.", self.registry.len(), e);
                            self.running = false;
                        }
                    }
                },

                event = self.events_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    }
                },

                line = Self::next_console_line(&mut console) => {
                    match line {
                        Ok(Some(line)) => {
                            info!("[SERVER][{}]: {}.", self.registry.len(), line.trim());
                            self.running = false;
                        }
                        Ok(None) => {
                            debug!("Console closed, no longer watching it");
                            console = None;
                        }
                        Err(e) => {
                            info!("[SERVER][{}]: Unreadable console input ({}).", self.registry.len(), e);
                            self.running = false;
                        }
                    }
                },
            }

            self.drop_failed().await;
        }

        self.shutdown().await;
        Ok(())
    }

    /// Closes every connection and the listening socket.
    ///
    /// Safe to call any number of times; only the first call does work.
    pub async fn shutdown(&mut self) {
        self.running = false;
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let count = self.registry.len();
        for connection in self.registry.drain() {
            connection.close().await;
        }
        for (_, reader) in self.handshaking.drain() {
            reader.abort();
        }
        self.listener = None;

        info!("[SERVER][{}]: Shutdown.", count);
    }

    async fn accept(listener: Option<&TcpListener>) -> std::io::Result<(TcpStream, SocketAddr)> {
        match listener {
            Some(listener) => listener.accept().await,
            None => std::future::pending().await,
        }
    }

    async fn next_console_line<R>(
        console: &mut Option<Lines<BufReader<R>>>,
    ) -> std::io::Result<Option<String>>
    where
        R: AsyncRead + Unpin,
    {
        match console {
            Some(lines) => lines.next_line().await,
            None => std::future::pending().await,
        }
    }

    fn spawn_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let id = self.next_connection_id;
        self.next_connection_id += 1;

        info!(
            "[SERVER][{}]: Got connection {} from {}.",
            self.registry.len(),
            id,
            addr
        );

        let reader = tokio::spawn(read_connection(
            id,
            stream,
            addr,
            self.events_tx.clone(),
            self.max_frame_len,
        ));
        self.handshaking.insert(id, reader);
    }

    async fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Handshake {
                id,
                addr,
                name,
                writer,
            } => {
                self.complete_handshake(id, addr, name, writer).await;
            }

            ServerEvent::Received { id, message } => {
                let Some(display) = self.registry.display(id) else {
                    debug!("Ignoring message from unregistered connection {}", id);
                    return;
                };

                match message {
                    Message::Chat { text } => {
                        debug!("{} says {:?}", display, text);
                        self.broadcast(format!("[{}]>> {}", display, text)).await;
                    }
                    other => warn!("Unexpected message from {}: {:?}", display, other),
                }
            }

            ServerEvent::Closed { id, reason } => {
                self.disconnect(id, reason).await;
            }

            ServerEvent::Shutdown => {
                info!("Server shutting down");
                self.running = false;
            }
        }
    }

    /// Acks the client's observed host, announces it, then registers it.
    ///
    /// The join notice goes out before registration, so the newcomer
    /// never receives its own.
    async fn complete_handshake(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        name: String,
        writer: OwnedWriteHalf,
    ) {
        let mut connection = Connection::new(id, addr, name, writer);
        if let Some(reader) = self.handshaking.remove(&id) {
            connection = connection.with_reader(reader);
        }

        let ack = Message::HandshakeAck {
            host: addr.ip().to_string(),
        };
        if let Err(e) = codec::write_message(&mut connection.writer, &ack).await {
            warn!("Handshake ack to {} failed: {}", connection.display(), e);
            connection.close().await;
            return;
        }

        let count = self.registry.len() + 1;
        let display = connection.display();
        info!("[SERVER][{}]: {} joined.", count, display);

        self.broadcast(format!("[SERVER]: {} has joined. Count = {}.", display, count))
            .await;
        self.registry.register(connection);
    }

    /// Removes a connection and tells everyone else it left.
    /// Unknown or already-removed IDs are ignored.
    async fn disconnect(&mut self, id: ConnectionId, reason: Option<String>) {
        if let Some(reader) = self.handshaking.remove(&id) {
            reader.abort();
            match reason {
                Some(reason) => warn!("Connection {} failed its handshake: {}", id, reason),
                None => debug!("Connection {} left before its handshake", id),
            }
            return;
        }

        let Some(connection) = self.registry.unregister(id) else {
            return;
        };

        let display = connection.display();
        let count = self.registry.len();
        match reason {
            Some(reason) => warn!("[SERVER][{}]: {} dropped: {}.", count, display, reason),
            None => info!("[SERVER][{}]: {} hung up.", count, display),
        }
        connection.close().await;

        self.broadcast(format!("[SERVER]: {} has left. Count = {}.", display, count))
            .await;
    }

    async fn broadcast(&mut self, text: String) {
        let message = Message::chat(text);
        let failed = router::broadcast(&message, self.registry.targets_mut()).await;
        self.pending_drops.extend(failed);
    }

    /// Drops connections whose sends failed. Each drop broadcasts a leave
    /// notice, which can fail further sends, so drain until quiet.
    async fn drop_failed(&mut self) {
        while let Some(id) = self.pending_drops.pop() {
            self.disconnect(id, Some("send failed".to_string())).await;
        }
    }
}

/// Accept errors that concern only the connection being accepted
fn is_per_connection(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

/// Reads one connection until it closes, forwarding everything to the server loop.
///
/// The first message must be a handshake; anything else drops the connection
/// before it is ever registered.
async fn read_connection(
    id: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<ServerEvent>,
    max_frame_len: usize,
) {
    let (mut reader, writer) = stream.into_split();

    let name = match codec::decode(&mut reader, max_frame_len).await {
        Ok(Some(Message::Handshake { name })) => name,
        Ok(Some(other)) => {
            let reason = format!("expected handshake, got {:?}", other);
            let _ = events.send(ServerEvent::Closed {
                id,
                reason: Some(reason),
            });
            return;
        }
        Ok(None) => {
            let _ = events.send(ServerEvent::Closed { id, reason: None });
            return;
        }
        Err(e) => {
            let _ = events.send(ServerEvent::Closed {
                id,
                reason: Some(e.to_string()),
            });
            return;
        }
    };

    if events
        .send(ServerEvent::Handshake {
            id,
            addr,
            name,
            writer,
        })
        .is_err()
    {
        return;
    }

    loop {
        let event = match codec::decode(&mut reader, max_frame_len).await {
            Ok(Some(message)) if !message.is_leave() => ServerEvent::Received { id, message },
            Ok(_) => ServerEvent::Closed { id, reason: None },
            Err(e) => ServerEvent::Closed {
                id,
                reason: Some(e.to_string()),
            },
        };

        let closed = matches!(event, ServerEvent::Closed { .. });
        if events.send(event).is_err() || closed {
            break;
        }
    }
}
