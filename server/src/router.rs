//! Fan-out of one message to many connections.

use crate::registry::{Connection, ConnectionId};
use log::warn;
use shared::codec;
use shared::Message;
use tokio::io::AsyncWriteExt;

/// Sends `message` to each target in turn.
///
/// A failed send is logged and skipped; delivery to the remaining targets
/// continues. Returns the IDs whose send failed so the caller can drop them.
/// Sends are sequential, so a slow target delays the ones after it.
pub async fn broadcast<'a, I>(message: &Message, targets: I) -> Vec<ConnectionId>
where
    I: IntoIterator<Item = &'a mut Connection>,
{
    let frame = match codec::encode(message) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping broadcast that failed to encode: {}", e);
            return Vec::new();
        }
    };

    let mut failed = Vec::new();
    for target in targets {
        if let Err(e) = send_frame(target, &frame).await {
            warn!("Failed to send to {}: {}", target.display(), e);
            failed.push(target.id);
        }
    }
    failed
}

async fn send_frame(target: &mut Connection, frame: &[u8]) -> std::io::Result<()> {
    target.writer.write_all(frame).await?;
    target.writer.flush().await
}
