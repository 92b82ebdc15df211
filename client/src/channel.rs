//! Topic-scoped pub/sub transport over a websocket to the relay server.
//!
//! A channel owns one connection and a fixed set of topic subscriptions. On
//! transport drop it reconnects after a fixed delay and re-subscribes on its
//! own; callers only ever see the coarse connection status, never individual
//! drops.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use crate::protocol::{Frame, Topic};

/// Fixed delay between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(4);

/// Interval between keep-alive pings while connected.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(12);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid server url: {0}")]
    BadUrl(String),
}

/// Coarse transport state for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
}

type ReadyHook = Box<dyn FnOnce() + Send>;
type EventHandler = Box<dyn Fn(Topic, serde_json::Value) + Send + Sync>;

/// Handle to a live pub/sub channel. Cloning shares the underlying
/// connection; `disconnect` is an idempotent no-op once closed.
#[derive(Clone)]
pub struct PubSubChannel {
    inner: Arc<ChannelShared>,
}

struct ChannelShared {
    ws_url: String,
    topics: Vec<Topic>,
    tx: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    /// Topics awaiting confirmation on the current connection.
    awaiting: Mutex<HashSet<Topic>>,
    on_ready: Mutex<Option<ReadyHook>>,
    on_event: EventHandler,
    status_tx: watch::Sender<ChannelStatus>,
    shutdown_tx: watch::Sender<bool>,
}

impl PubSubChannel {
    /// Open a channel subscribed to `topics`. `on_ready` fires exactly once,
    /// after the server has confirmed every subscription; reconnects after
    /// that are transparent. Must be called from within a tokio runtime.
    pub fn open<R>(
        ws_url: String,
        topics: Vec<Topic>,
        on_ready: R,
        on_event: EventHandler,
    ) -> Self
    where
        R: FnOnce() + Send + 'static,
    {
        let (status_tx, _) = watch::channel(ChannelStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(ChannelShared {
            ws_url,
            topics,
            tx: Mutex::new(None),
            awaiting: Mutex::new(HashSet::new()),
            on_ready: Mutex::new(Some(Box::new(on_ready))),
            on_event,
            status_tx,
            shutdown_tx,
        });

        tokio::spawn(run_channel(Arc::clone(&inner), shutdown_rx));

        Self { inner }
    }

    /// Publish a payload to a topic. Best-effort: no delivery acknowledgment
    /// is awaited, and publishing while disconnected is an error the caller
    /// may choose to ignore.
    pub fn publish(&self, topic: Topic, body: serde_json::Value) -> Result<(), ChannelError> {
        let json = serde_json::to_string(&Frame::Publish { topic, body })?;
        let tx = self
            .inner
            .tx
            .lock()
            .clone()
            .ok_or(ChannelError::NotConnected)?;
        tx.send(WsMessage::Text(json.into()))
            .map_err(|_| ChannelError::NotConnected)
    }

    pub fn status(&self) -> ChannelStatus {
        *self.inner.status_tx.borrow()
    }

    /// Watch connection status transitions, e.g. to drive a status label.
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Tear down the transport. Safe to call repeatedly or when already
    /// disconnected.
    pub fn disconnect(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        *self.inner.tx.lock() = None;
        self.inner.set_status(ChannelStatus::Disconnected);
    }
}

impl ChannelShared {
    fn set_status(&self, status: ChannelStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn handle_frame(&self, text: &str) {
        let frame = match serde_json::from_str::<Frame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("dropping malformed relay frame: {e}");
                return;
            }
        };

        match frame {
            Frame::Subscribed { topic } => {
                let all_confirmed = {
                    let mut awaiting = self.awaiting.lock();
                    awaiting.remove(&topic);
                    awaiting.is_empty()
                };
                if all_confirmed {
                    if let Some(ready) = self.on_ready.lock().take() {
                        ready();
                    }
                }
            }
            Frame::Event { topic, body } => (self.on_event)(topic, body),
            Frame::Error { message } => {
                tracing::warn!("relay reported error: {message}");
            }
            other => {
                tracing::warn!("unexpected frame from relay: {other:?}");
            }
        }
    }
}

/// Derive the websocket endpoint from the API base URL, attaching the bearer
/// credential as a query parameter when present. Anonymous connections are
/// allowed.
pub fn relay_url(api_base: &str, bearer: Option<&str>) -> Result<String, ChannelError> {
    let mut url =
        Url::parse(api_base).map_err(|e| ChannelError::BadUrl(format!("{api_base}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ChannelError::BadUrl(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::BadUrl(api_base.to_string()))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);

    Ok(match bearer {
        Some(token) => format!("{url}?token={}", urlencoding::encode(token)),
        None => url.to_string(),
    })
}

async fn run_channel(shared: Arc<ChannelShared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        shared.set_status(ChannelStatus::Connecting);
        match connect_async(shared.ws_url.as_str()).await {
            Ok((ws_stream, _)) => {
                shared.set_status(ChannelStatus::Connected);
                run_connection(&shared, ws_stream, &mut shutdown).await;
                *shared.tx.lock() = None;
            }
            Err(e) => {
                tracing::warn!("relay connect failed: {e}");
            }
        }

        if *shutdown.borrow() {
            shared.set_status(ChannelStatus::Disconnected);
            return;
        }
        shared.set_status(ChannelStatus::Disconnected);

        tokio::select! {
            _ = sleep(RECONNECT_DELAY) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn run_connection<S>(
    shared: &Arc<ChannelShared>,
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    shutdown: &mut watch::Receiver<bool>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    *shared.tx.lock() = Some(tx.clone());
    *shared.awaiting.lock() = shared.topics.iter().cloned().collect();

    // Re-issue the subscription set; confirmations drain `awaiting`.
    for topic in &shared.topics {
        let frame = Frame::Subscribe {
            topic: topic.clone(),
        };
        match serde_json::to_string(&frame) {
            Ok(json) => {
                let _ = tx.send(WsMessage::Text(json.into()));
            }
            Err(e) => tracing::error!("failed to serialize subscribe frame: {e}"),
        }
    }

    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await; // first tick completes immediately

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => shared.handle_frame(&text),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("relay transport error: {e}");
                    break;
                }
            },
            outgoing = rx.recv() => match outgoing {
                Some(msg) => {
                    if ws_sender.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = keepalive.tick() => {
                if ws_sender.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    // Frames queued before the shutdown signal (a leave
                    // notification, typically) must still go out; teardown
                    // never outruns them.
                    while let Ok(msg) = rx.try_recv() {
                        if ws_sender.send(msg).await.is_err() {
                            return;
                        }
                    }
                    let _ = ws_sender.send(WsMessage::Close(None)).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room_code::RoomCode;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn relay_url_swaps_scheme_and_sets_path() {
        let url = relay_url("https://example.com/api", None).unwrap();
        assert_eq!(url, "wss://example.com/ws");

        let url = relay_url("http://localhost:3005/api", None).unwrap();
        assert_eq!(url, "ws://localhost:3005/ws");
    }

    #[test]
    fn relay_url_attaches_encoded_token() {
        let url = relay_url("https://example.com/api", Some("a b/c")).unwrap();
        assert_eq!(url, "wss://example.com/ws?token=a%20b%2Fc");
    }

    #[test]
    fn relay_url_rejects_garbage() {
        assert!(relay_url("not a url", None).is_err());
        assert!(relay_url("ftp://example.com", None).is_err());
    }

    #[tokio::test]
    async fn publish_without_transport_is_not_connected() {
        let channel = PubSubChannel::open(
            "ws://127.0.0.1:1/ws".to_string(),
            vec![],
            || {},
            Box::new(|_, _| {}),
        );
        let err = channel
            .publish(
                Topic::watch_party(&crate::room_code::RoomCode::parse("AB12").unwrap()),
                serde_json::json!({}),
            )
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }

    #[tokio::test]
    async fn frames_queued_before_disconnect_flush_ahead_of_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    WsMessage::Text(text) => match serde_json::from_str::<Frame>(&text) {
                        Ok(Frame::Subscribe { topic }) => {
                            let reply =
                                serde_json::to_string(&Frame::Subscribed { topic }).unwrap();
                            ws.send(WsMessage::Text(reply.into())).await.unwrap();
                        }
                        Ok(frame) => {
                            let _ = seen_tx.send(frame);
                        }
                        Err(_) => {}
                    },
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
        });

        let topic = Topic::watch_party(&RoomCode::parse("AB12").unwrap());
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let channel = PubSubChannel::open(
            format!("ws://{addr}"),
            vec![topic.clone()],
            move || {
                let _ = ready_tx.send(());
            },
            Box::new(|_, _| {}),
        );
        tokio::time::timeout(Duration::from_secs(5), ready_rx)
            .await
            .unwrap()
            .unwrap();

        // Publish-then-disconnect is the leave-notification pattern: the
        // frame must reach the server even though teardown follows in the
        // same breath.
        channel
            .publish(topic, serde_json::json!({"kind": "leave"}))
            .unwrap();
        channel.disconnect();

        let frame = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match frame {
            Frame::Publish { body, .. } => assert_eq!(body["kind"], "leave"),
            other => panic!("expected the queued publish, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reconnect_resubscribes_without_refiring_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (subs_tx, mut subs_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for attempt in 0u8..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                while let Some(Ok(WsMessage::Text(text))) = ws.next().await {
                    if let Ok(Frame::Subscribe { topic }) = serde_json::from_str(&text) {
                        let reply = serde_json::to_string(&Frame::Subscribed {
                            topic: topic.clone(),
                        })
                        .unwrap();
                        ws.send(WsMessage::Text(reply.into())).await.unwrap();
                        let _ = subs_tx.send((attempt, topic));
                        if attempt == 0 {
                            // Drop the transport out from under the client.
                            break;
                        }
                    }
                }
            }
        });

        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        let channel = PubSubChannel::open(
            format!("ws://{addr}"),
            vec![Topic::watch_party(&RoomCode::parse("AB12").unwrap())],
            move || {
                let _ = ready_tx.send(());
            },
            Box::new(|_, _| {}),
        );

        let (attempt, topic) = tokio::time::timeout(Duration::from_secs(5), subs_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt, 0);
        assert_eq!(topic.as_str(), "watch-party/AB12");
        tokio::time::timeout(Duration::from_secs(5), ready_rx.recv())
            .await
            .unwrap()
            .unwrap();

        // After the fixed delay the channel reconnects and re-issues the
        // subscription with no caller involvement.
        let (attempt, topic) = tokio::time::timeout(RECONNECT_DELAY * 3, subs_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt, 1);
        assert_eq!(topic.as_str(), "watch-party/AB12");

        // Readiness already fired on the first connection; the reconnect
        // confirmation must not fire it again.
        sleep(Duration::from_millis(200)).await;
        assert!(ready_rx.try_recv().is_err());
        channel.disconnect();
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let channel = PubSubChannel::open(
            "ws://127.0.0.1:1/ws".to_string(),
            vec![],
            || {},
            Box::new(|_, _| {}),
        );
        channel.disconnect();
        channel.disconnect();
        assert_eq!(channel.status(), ChannelStatus::Disconnected);
    }
}
