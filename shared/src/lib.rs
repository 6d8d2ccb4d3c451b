//! # Chat Protocol Library
//!
//! Types and wire format shared by the chat server and its clients.
//!
//! ## Wire Format
//!
//! Each message travels in its own envelope: a 4-byte big-endian length
//! prefix followed by exactly that many payload bytes. There is no batching;
//! one envelope carries one [`Message`].
//!
//! ## Message Vocabulary
//!
//! - `Handshake { name }`: client to server, first message on a connection
//! - `HandshakeAck { host }`: server reply carrying the client's observed host
//! - `Chat { text }`: chat lines in both directions, plus server notices
//! - `Disconnect`: an empty payload; the sender is leaving
//!
//! ## Module Organization
//!
//! - [`codec`]: envelope framing and message read/write helpers
//! - [`protocol`]: the [`Message`] type and its payload serialization
//! - [`config`]: defaults and mode selection used by the binary
//! - [`error`]: the [`ChatError`] type returned across the workspace

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;

pub use error::{ChatError, Result};
pub use protocol::Message;
