//! WebSocket write pump: serialises outbound frames.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Writes queued frames to the socket.
///
/// On cancellation the pump sends a normal close frame (1000) before
/// returning.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let close = CloseFrame {
        code: CloseCode::Normal,
        reason: "client closing".into(),
    };
    if let Err(e) = write.send(tungstenite::Message::Close(Some(close))).await {
        debug!("close frame not sent: {e}");
    }
}
