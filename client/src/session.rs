//! Client session: one server connection multiplexed against the local console

use log::{debug, info, warn};
use shared::codec;
use shared::{ChatError, Message, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Connected,
    ShuttingDown,
}

/// Messages sent from the server reader task and shutdown handles to the session loop
#[derive(Debug)]
pub enum ClientEvent {
    Received(Message),
    /// Server went away; `Some` carries the read error
    ServerClosed(Option<String>),
    Shutdown,
}

/// Requests a graceful leave from another task, e.g. a Ctrl+C listener.
#[derive(Clone)]
pub struct ShutdownHandle {
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.events.send(ClientEvent::Shutdown).is_err() {
            debug!("Shutdown requested after session ended");
        }
    }
}

pub struct Client {
    name: String,
    host: String,
    state: ClientState,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,

    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Client {
    /// Connects to the server and completes the name handshake.
    ///
    /// Failing to connect is not retried; the error goes straight back
    /// to the caller.
    pub async fn connect(addr: &str, name: &str, max_frame_len: usize) -> Result<Self> {
        debug!("Connecting to {}", addr);

        let stream = TcpStream::connect(addr).await?;
        info!("[LOCAL]: Connected to server@{} successfully.", addr);

        let (mut reader, mut writer) = stream.into_split();
        let hello = Message::Handshake {
            name: name.to_string(),
        };
        codec::write_message(&mut writer, &hello).await?;

        let host = match codec::decode(&mut reader, max_frame_len).await? {
            Some(Message::HandshakeAck { host }) => host,
            Some(other) => {
                return Err(ChatError::Handshake(format!(
                    "unexpected reply {:?}",
                    other
                )))
            }
            None => {
                return Err(ChatError::Handshake(
                    "server closed the connection".to_string(),
                ))
            }
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_server(reader, events_tx.clone(), max_frame_len));

        Ok(Client {
            name: name.to_string(),
            host,
            state: ClientState::Connected,
            writer,
            reader,
            events_tx,
            events_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host the server observed for this client
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            events: self.events_tx.clone(),
        }
    }

    /// Session loop.
    ///
    /// Non-blank lines from `input` go to the server; chat lines from the
    /// server are written to `output`. Ends when the server goes away, the
    /// input closes, or a shutdown is requested. Only a failing `output`
    /// is returned as an error.
    pub async fn run<I, O>(&mut self, input: I, mut output: O) -> Result<()>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut input = BufReader::new(input).lines();

        while self.state == ClientState::Connected {
            tokio::select! {
                line = next_line(&mut input) => {
                    match line {
                        Ok(Some(line)) => self.send_line(line.trim()).await,
                        Ok(None) => {
                            debug!("Console closed");
                            self.shutdown().await;
                        }
                        Err(e) => warn!("[LOCAL]: {}", e),
                    }
                },

                event = self.events_rx.recv() => {
                    match event {
                        Some(ClientEvent::Received(message)) => {
                            show(&mut output, message).await?;
                        }
                        Some(ClientEvent::ServerClosed(reason)) => {
                            if let Some(reason) = reason {
                                warn!("[SERVER]: {}", reason);
                            }
                            warn!("[SERVER]: Crashed.");
                            self.state = ClientState::ShuttingDown;
                        }
                        Some(ClientEvent::Shutdown) | None => self.shutdown().await,
                    }
                },
            }
        }

        Ok(())
    }

    /// Tells the server we are leaving with an empty envelope.
    /// Only the first call sends anything.
    pub async fn shutdown(&mut self) {
        if self.state == ClientState::ShuttingDown {
            return;
        }
        self.state = ClientState::ShuttingDown;

        if let Err(e) = codec::write_message(&mut self.writer, &Message::Disconnect).await {
            debug!("Goodbye not delivered: {}", e);
        }
        info!("[LOCAL]: Shutdown.");
    }

    async fn send_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }

        if let Err(e) = codec::write_message(&mut self.writer, &Message::chat(line)).await {
            warn!("[LOCAL]: {}", e);
            self.state = ClientState::ShuttingDown;
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn next_line<R>(lines: &mut Lines<BufReader<R>>) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    lines.next_line().await
}

async fn show<W>(output: &mut W, message: Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match message {
        Message::Chat { text } => {
            output.write_all(text.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        other => warn!("Unexpected message from server: {:?}", other),
    }
    Ok(())
}

async fn read_server(
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<ClientEvent>,
    max_frame_len: usize,
) {
    loop {
        let event = match codec::decode(&mut reader, max_frame_len).await {
            Ok(Some(message)) if !message.is_leave() => ClientEvent::Received(message),
            Ok(_) => ClientEvent::ServerClosed(None),
            Err(e) => ClientEvent::ServerClosed(Some(e.to_string())),
        };

        let closed = matches!(event, ClientEvent::ServerClosed(_));
        if events.send(event).is_err() || closed {
            break;
        }
    }
}
