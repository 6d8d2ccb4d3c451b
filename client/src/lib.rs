//! # Chat Client Library
//!
//! Terminal client for the chat server. A session connects, declares its
//! display name, then multiplexes two sources on one loop: lines typed on the
//! local console are sent to the server, and lines relayed by the server are
//! printed.
//!
//! A dedicated task reads the server socket and feeds decoded messages into
//! the loop through a channel, so a half-received envelope is never lost when
//! console input wins the race.
//!
//! Leaving sends an empty envelope so the server can announce the departure
//! right away. If the server disappears first, the session just ends.

pub mod session;

pub use session::{Client, ClientState, ShutdownHandle};
