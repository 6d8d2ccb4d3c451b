//! # Chat Server Library
//!
//! Relays chat lines between every connected client. Each line a client sends
//! is rebroadcast, tagged with the sender's `<name>@<host>`, to all clients.
//! Joins and leaves are announced with the live connection count.
//!
//! ## Architecture Design
//!
//! ### Single Dispatcher
//! One loop owns all server state. It waits on the listening socket, the
//! operator console, and a single ordered event queue. Each accepted
//! connection gets a reader task that decodes inbound envelopes and pushes
//! them onto that queue; the tasks never touch shared state. Registry
//! mutation and every outbound write happen on the dispatcher.
//!
//! ### Failure Isolation
//! A connection that closes, sends garbage, or fails a write is dropped on
//! its own. The rest of the room sees a leave notice and carries on.
//!
//! ### Backpressure
//! There is none. Broadcasts write to each target in turn, so a slow reader
//! stalls that fan-out until its socket drains.
//!
//! ## Module Organization
//!
//! - `network`: the [`Server`] event loop and its [`ShutdownHandle`]
//! - `registry`: live connections and their display identities
//! - `router`: per-target isolated fan-out
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::Server;
//! use shared::config::DEFAULT_MAX_FRAME_LEN;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:9999", DEFAULT_MAX_FRAME_LEN).await?;
//!
//!     let handle = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         if tokio::signal::ctrl_c().await.is_ok() {
//!             handle.shutdown();
//!         }
//!     });
//!
//!     // Any line typed on stdin also stops the server
//!     server.run(tokio::io::stdin()).await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod registry;
pub mod router;

pub use network::{Server, ShutdownHandle};
