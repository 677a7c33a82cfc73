//! Heartbeat pump: a `ping` text frame every interval.

use std::time::Duration;

use chunkflow_protocol::constants::HEARTBEAT_PING;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Sends the heartbeat text frame every `period` until cancelled or the
/// writer goes away.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                trace!("sending heartbeat");
                let ping = tungstenite::Message::Text(HEARTBEAT_PING.into());
                if write_tx.send(ping).await.is_err() {
                    break;
                }
            }
        }
    }
}
