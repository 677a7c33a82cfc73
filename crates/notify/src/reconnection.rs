//! Connection supervisor: endpoint fallback, per-connection pumps and the
//! fixed-interval reconnect loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pumps::{ping::ping_pump, read::read_pump, write::write_pump};
use crate::types::{CLOSE_ABNORMAL, CLOSE_NORMAL, ChannelState, NotifyConfig, NotifyEvent};

/// State shared between a client and its supervisor task.
pub(crate) struct Shared {
    state: Mutex<ChannelState>,
    writer: Mutex<Option<mpsc::Sender<tungstenite::Message>>>,
    events_tx: mpsc::Sender<NotifyEvent>,
    attempts: AtomicU32,
}

impl Shared {
    pub(crate) fn new(events_tx: mpsc::Sender<NotifyEvent>) -> Self {
        Self {
            state: Mutex::new(ChannelState::Closed),
            writer: Mutex::new(None),
            events_tx,
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Sender of the open connection, if any.
    pub(crate) fn writer(&self) -> Option<mpsc::Sender<tungstenite::Message>> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_writer(&self, writer: Option<mpsc::Sender<tungstenite::Message>>) {
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = writer;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_attempts(&self) {
        self.attempts.store(0, Ordering::Relaxed);
    }

    fn emit(&self, event: NotifyEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            warn!("failed to deliver channel event: {e}");
        }
    }
}

enum Dial<S> {
    Connected { ws: S, endpoint: String },
    Failed,
    Cancelled,
}

/// Runs the channel until a normal close, a local disconnect, or reconnect
/// exhaustion. `done` is cancelled when the supervisor exits.
pub(crate) async fn supervise(
    shared: std::sync::Arc<Shared>,
    config: NotifyConfig,
    cancel: CancellationToken,
    done: CancellationToken,
) {
    let _done = done.drop_guard();
    let urls = config.urls();

    loop {
        shared.set_state(ChannelState::Connecting);
        let code = match dial(&shared, &urls, config.reconnect.endpoint_fallback_delay, &cancel).await
        {
            Dial::Connected { ws, endpoint } => {
                shared.reset_attempts();
                info!(endpoint = %endpoint, "notification channel open");
                run_connection(ws, &shared, endpoint, config.heartbeat_interval, &cancel).await
            }
            Dial::Failed => CLOSE_ABNORMAL,
            Dial::Cancelled => break,
        };

        shared.set_state(ChannelState::Closed);
        shared.emit(NotifyEvent::Closed { code });

        if cancel.is_cancelled() || code == CLOSE_NORMAL {
            debug!(code, "notification channel closed");
            break;
        }

        let tried = shared.attempts();
        if tried >= config.reconnect.max_attempts {
            warn!(attempts = tried, "giving up on notification channel");
            shared.emit(NotifyEvent::Error(format!(
                "reconnect attempts exhausted after {tried} tries"
            )));
            break;
        }
        let attempt = shared.attempts.fetch_add(1, Ordering::Relaxed) + 1;

        shared.set_state(ChannelState::Connecting);
        shared.emit(NotifyEvent::Reconnecting { attempt });
        info!(
            code,
            attempt,
            delay_secs = config.reconnect.interval.as_secs_f64(),
            "notification channel closed unexpectedly, reconnecting"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reconnect cancelled");
                break;
            }
            _ = tokio::time::sleep(config.reconnect.interval) => {}
        }
    }

    shared.set_writer(None);
    shared.set_state(ChannelState::Closed);
}

/// Tries each endpoint in order, pausing `fallback_delay` between them.
async fn dial(
    shared: &Shared,
    urls: &[String],
    fallback_delay: Duration,
    cancel: &CancellationToken,
) -> Dial<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
> {
    for (i, url) in urls.iter().enumerate() {
        if i > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return Dial::Cancelled,
                _ = tokio::time::sleep(fallback_delay) => {}
            }
        }

        debug!(url = %url, "dialing notification endpoint");
        let result = tokio::select! {
            _ = cancel.cancelled() => return Dial::Cancelled,
            r = tokio_tungstenite::connect_async(url.as_str()) => r,
        };
        match result {
            Ok((ws, _)) => {
                return Dial::Connected {
                    ws,
                    endpoint: url.clone(),
                };
            }
            Err(e) => {
                warn!(url = %url, error = %e, "notification endpoint unreachable");
                shared.emit(NotifyEvent::Error(format!("{url}: {e}")));
            }
        }
    }

    warn!("all notification endpoints failed");
    Dial::Failed
}

/// Drives one open socket and returns its close code.
async fn run_connection<S>(
    ws: S,
    shared: &Shared,
    endpoint: String,
    heartbeat: Duration,
    cancel: &CancellationToken,
) -> u16
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>>
        + SinkExt<tungstenite::Message, Error = tungstenite::Error>
        + Unpin
        + Send
        + 'static,
{
    let (write, read) = ws.split();
    let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
    let conn = cancel.child_token();

    let write_handle = tokio::spawn(write_pump(write, write_rx, conn.clone()));
    let ping_handle = tokio::spawn(ping_pump(write_tx.clone(), heartbeat, conn.clone()));

    shared.set_writer(Some(write_tx.clone()));
    shared.set_state(ChannelState::Open);
    shared.emit(NotifyEvent::Opened { endpoint });

    let code = read_pump(read, &shared.events_tx, &write_tx, &conn).await;

    shared.set_writer(None);
    if cancel.is_cancelled() {
        shared.set_state(ChannelState::Closing);
    }
    conn.cancel();
    drop(write_tx);
    let _ = ping_handle.await;
    let _ = write_handle.await;
    code
}
