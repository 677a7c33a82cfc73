//! Owned notification channel handle.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::NotifyError;
use crate::reconnection::{Shared, supervise};
use crate::types::{ChannelState, NotifyConfig, NotifyEvent};

/// Capacity of the event channel returned by
/// [`NotificationClient::take_events`].
const EVENT_BUFFER: usize = 256;

struct Session {
    cancel: CancellationToken,
    done: CancellationToken,
    handle: JoinHandle<()>,
}

/// A reconnecting WebSocket channel for one owner.
///
/// Events are delivered on the receiver from [`take_events`](Self::take_events).
/// Nothing runs until [`connect`](Self::connect); dropping the client stops
/// the channel without a close handshake.
pub struct NotificationClient {
    config: NotifyConfig,
    shared: Arc<Shared>,
    events_rx: Option<mpsc::Receiver<NotifyEvent>>,
    session: Mutex<Option<Session>>,
}

impl NotificationClient {
    pub fn new(config: NotifyConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            config,
            shared: Arc::new(Shared::new(events_tx)),
            events_rx: Some(events_rx),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// Returns the event receiver. Only the first call gets it.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<NotifyEvent>> {
        self.events_rx.take()
    }

    /// Starts the channel, closing any previous session first.
    ///
    /// Returns once the supervisor is running; watch for
    /// [`NotifyEvent::Opened`] to know when the socket is up.
    pub async fn connect(&self) -> Result<(), NotifyError> {
        if self.config.endpoints.is_empty() {
            return Err(NotifyError::NoEndpoints);
        }
        self.disconnect().await;

        info!(
            owner = self.config.owner_id,
            endpoints = self.config.endpoints.len(),
            "connecting notification channel"
        );
        self.shared.set_state(ChannelState::Connecting);
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let handle = tokio::spawn(supervise(
            self.shared.clone(),
            self.config.clone(),
            cancel.clone(),
            done.clone(),
        ));
        *self.lock_session() = Some(Session {
            cancel,
            done,
            handle,
        });
        Ok(())
    }

    /// Resolves once the channel has stopped for good: a normal close,
    /// reconnect exhaustion, or [`disconnect`](Self::disconnect). Resolves
    /// immediately when never connected.
    pub async fn closed(&self) {
        let done = self.lock_session().as_ref().map(|s| s.done.clone());
        if let Some(done) = done {
            done.cancelled().await;
        }
    }

    /// Closes the channel with code 1000 and cancels any pending reconnect.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let session = self.lock_session().take();
        if let Some(session) = session {
            if self.shared.state() != ChannelState::Closed {
                self.shared.set_state(ChannelState::Closing);
            }
            session.cancel.cancel();
            if let Err(e) = session.handle.await {
                warn!("notification supervisor ended abnormally: {e}");
            }
            debug!("notification channel disconnected");
        }
        self.shared.reset_attempts();
        self.shared.set_state(ChannelState::Closed);
    }

    /// Queues a JSON message. Returns `true` only if the socket is open and
    /// the frame was queued.
    pub fn send(&self, message: &serde_json::Value) -> bool {
        let writer = match self.shared.writer() {
            Some(w) if self.is_connected() => w,
            _ => {
                warn!("notification channel not open, message dropped");
                return false;
            }
        };

        match writer.try_send(tungstenite::Message::Text(message.to_string().into())) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to queue notification message: {e}");
                false
            }
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Open
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for NotificationClient {
    fn drop(&mut self) {
        if let Some(session) = self.lock_session().take() {
            session.cancel.cancel();
            session.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use crate::ReconnectConfig;

    const WAIT: Duration = Duration::from_secs(5);

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}/api/ws/message", listener.local_addr().unwrap());
        (listener, endpoint)
    }

    /// An endpoint nobody listens on.
    async fn dead_endpoint() -> String {
        let (listener, endpoint) = listener().await;
        drop(listener);
        endpoint
    }

    async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, String) {
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .expect("client should dial")
            .unwrap();
        let mut uri = String::new();
        let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            uri = req.uri().to_string();
            Ok::<_, ErrorResponse>(resp)
        })
        .await
        .unwrap();
        (ws, uri)
    }

    fn fast_config(endpoints: Vec<String>) -> NotifyConfig {
        NotifyConfig {
            endpoints,
            owner_id: 42,
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig {
                interval: Duration::from_millis(20),
                max_attempts: 2,
                endpoint_fallback_delay: Duration::from_millis(10),
            },
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<NotifyEvent>) -> NotifyEvent {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("event expected")
            .expect("channel open")
    }

    /// Skips events until one matches.
    async fn wait_for(
        rx: &mut mpsc::Receiver<NotifyEvent>,
        pred: impl Fn(&NotifyEvent) -> bool,
    ) -> NotifyEvent {
        loop {
            let event = next_event(rx).await;
            if pred(&event) {
                return event;
            }
        }
    }

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            let msg = tokio::time::timeout(WAIT, ws.next())
                .await
                .expect("frame expected")
                .expect("stream open")
                .unwrap();
            if let tungstenite::Message::Text(text) = msg {
                return text.as_str().to_owned();
            }
        }
    }

    #[tokio::test]
    async fn connect_without_endpoints_fails() {
        let client = NotificationClient::new(fast_config(vec![]));
        assert!(matches!(
            client.connect().await,
            Err(NotifyError::NoEndpoints)
        ));
        assert_eq!(client.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn send_before_connect_returns_false() {
        let client = NotificationClient::new(fast_config(vec!["ws://127.0.0.1:1/x".into()]));
        assert!(!client.send(&serde_json::json!({"a": 1})));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn take_events_only_once() {
        let mut client = NotificationClient::new(fast_config(vec![]));
        assert!(client.take_events().is_some());
        assert!(client.take_events().is_none());
    }

    #[tokio::test]
    async fn opens_and_delivers_messages() {
        let (listener, endpoint) = listener().await;
        let mut client = NotificationClient::new(fast_config(vec![endpoint.clone()]));
        let mut events = client.take_events().unwrap();

        client.connect().await.unwrap();
        let (mut ws, uri) = accept(&listener).await;
        assert_eq!(uri, "/api/ws/message?userId=42");

        assert_eq!(
            next_event(&mut events).await,
            NotifyEvent::Opened {
                endpoint: format!("{endpoint}?userId=42")
            }
        );
        assert!(client.is_connected());

        ws.send(tungstenite::Message::Text("pong".into())).await.unwrap();
        ws.send(tungstenite::Message::Text("garbage".into())).await.unwrap();
        ws.send(tungstenite::Message::Text(r#"{"title":"会议提醒","type":1}"#.into()))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut events).await,
            NotifyEvent::Message(serde_json::json!({"title": "会议提醒", "type": 1}))
        );

        assert!(client.send(&serde_json::json!({"read": 7})));
        assert_eq!(next_text(&mut ws).await, r#"{"read":7}"#);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn heartbeat_sends_ping_text() {
        let (listener, endpoint) = listener().await;
        let mut config = fast_config(vec![endpoint]);
        config.heartbeat_interval = Duration::from_millis(30);
        let client = NotificationClient::new(config);

        client.connect().await.unwrap();
        let (mut ws, _) = accept(&listener).await;

        assert_eq!(next_text(&mut ws).await, "ping");
        assert_eq!(next_text(&mut ws).await, "ping");
        client.disconnect().await;
    }

    #[tokio::test]
    async fn falls_back_to_next_endpoint() {
        let dead = dead_endpoint().await;
        let (listener, live) = listener().await;
        let mut client = NotificationClient::new(fast_config(vec![dead, live.clone()]));
        let mut events = client.take_events().unwrap();

        client.connect().await.unwrap();
        let _server = accept(&listener).await;

        assert!(matches!(next_event(&mut events).await, NotifyEvent::Error(_)));
        assert_eq!(
            next_event(&mut events).await,
            NotifyEvent::Opened {
                endpoint: format!("{live}?userId=42")
            }
        );
        client.disconnect().await;
    }

    #[tokio::test]
    async fn reconnects_after_abnormal_close() {
        let (listener, endpoint) = listener().await;
        let mut client = NotificationClient::new(fast_config(vec![endpoint]));
        let mut events = client.take_events().unwrap();

        client.connect().await.unwrap();
        let (ws, _) = accept(&listener).await;
        wait_for(&mut events, |e| matches!(e, NotifyEvent::Opened { .. })).await;

        // Drop the TCP stream without a close frame.
        drop(ws);
        assert_eq!(
            wait_for(&mut events, |e| matches!(e, NotifyEvent::Closed { .. })).await,
            NotifyEvent::Closed { code: 1006 }
        );
        assert_eq!(
            next_event(&mut events).await,
            NotifyEvent::Reconnecting { attempt: 1 }
        );

        let _second = accept(&listener).await;
        wait_for(&mut events, |e| matches!(e, NotifyEvent::Opened { .. })).await;
        assert!(client.is_connected());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn normal_server_close_does_not_reconnect() {
        let (listener, endpoint) = listener().await;
        let mut client = NotificationClient::new(fast_config(vec![endpoint]));
        let mut events = client.take_events().unwrap();

        client.connect().await.unwrap();
        let (mut ws, _) = accept(&listener).await;
        wait_for(&mut events, |e| matches!(e, NotifyEvent::Opened { .. })).await;

        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();

        assert_eq!(
            wait_for(&mut events, |e| matches!(e, NotifyEvent::Closed { .. })).await,
            NotifyEvent::Closed { code: 1000 }
        );
        tokio::time::timeout(WAIT, client.closed()).await.unwrap();
        assert!(events.try_recv().is_err(), "no reconnect expected");
        assert_eq!(client.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let dead = dead_endpoint().await;
        let mut client = NotificationClient::new(fast_config(vec![dead]));
        let mut events = client.take_events().unwrap();

        client.connect().await.unwrap();

        let mut reconnects = Vec::new();
        loop {
            match next_event(&mut events).await {
                NotifyEvent::Reconnecting { attempt } => reconnects.push(attempt),
                NotifyEvent::Error(msg) if msg.contains("exhausted") => break,
                _ => {}
            }
        }
        assert_eq!(reconnects, vec![1, 2]);

        tokio::time::timeout(WAIT, client.closed()).await.unwrap();
        assert_eq!(client.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn disconnect_sends_normal_close_and_is_idempotent() {
        let (listener, endpoint) = listener().await;
        let mut client = NotificationClient::new(fast_config(vec![endpoint]));
        let mut events = client.take_events().unwrap();

        client.connect().await.unwrap();
        let (mut ws, _) = accept(&listener).await;
        wait_for(&mut events, |e| matches!(e, NotifyEvent::Opened { .. })).await;

        client.disconnect().await;
        assert_eq!(client.state(), ChannelState::Closed);
        assert!(!client.send(&serde_json::json!({})));

        let close = loop {
            match tokio::time::timeout(WAIT, ws.next()).await.unwrap() {
                Some(Ok(tungstenite::Message::Close(frame))) => break frame,
                Some(Ok(_)) => continue,
                other => panic!("expected close frame, got {other:?}"),
            }
        };
        assert_eq!(close.map(|f| u16::from(f.code)), Some(1000));

        assert_eq!(
            wait_for(&mut events, |e| matches!(e, NotifyEvent::Closed { .. })).await,
            NotifyEvent::Closed { code: 1000 }
        );

        client.disconnect().await;
        assert_eq!(client.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_reconnect() {
        let dead = dead_endpoint().await;
        let mut config = fast_config(vec![dead]);
        config.reconnect.interval = Duration::from_secs(60);
        let mut client = NotificationClient::new(config);
        let mut events = client.take_events().unwrap();

        client.connect().await.unwrap();
        wait_for(&mut events, |e| matches!(e, NotifyEvent::Reconnecting { .. })).await;

        tokio::time::timeout(WAIT, client.disconnect())
            .await
            .expect("disconnect should not wait for the reconnect timer");
        assert_eq!(client.state(), ChannelState::Closed);
    }
}
