//! WebSocket read pump: turns inbound frames into events.

use chunkflow_protocol::constants::HEARTBEAT_PONG;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::types::{CLOSE_ABNORMAL, CLOSE_NORMAL, NotifyEvent};

/// Reads frames until the connection ends and returns its close code.
///
/// A local cancellation reports [`CLOSE_NORMAL`]; a stream that ends or
/// fails without a close frame reports [`CLOSE_ABNORMAL`].
pub(crate) async fn read_pump<S>(
    mut read: S,
    events_tx: &mpsc::Sender<NotifyEvent>,
    write_tx: &mpsc::Sender<tungstenite::Message>,
    cancel: &CancellationToken,
) -> u16
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return CLOSE_NORMAL,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text_message(&text, events_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let code = frame.map_or(CLOSE_NORMAL, |f| u16::from(f.code));
                        debug!(code, "received close frame");
                        return code;
                    }
                    Some(Ok(_)) => {} // Binary and pong frames carry nothing for us.
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        return CLOSE_ABNORMAL;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return CLOSE_ABNORMAL;
                    }
                }
            }
        }
    }
}

/// Swallows heartbeat replies and forwards JSON messages.
fn handle_text_message(text: &str, events_tx: &mpsc::Sender<NotifyEvent>) {
    if text == HEARTBEAT_PONG {
        trace!("received heartbeat reply");
        return;
    }

    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(raw = text, "failed to parse notification: {e}");
            return;
        }
    };

    if let Err(e) = events_tx.try_send(NotifyEvent::Message(value)) {
        warn!("failed to forward notification: {e}");
    }
}
