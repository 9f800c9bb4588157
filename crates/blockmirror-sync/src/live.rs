//! The `newHeads` live feed.
//!
//! One WebSocket connection, one subscription and one read loop. The loop is
//! the only reader of the socket: each notification spawns a [`BlockWorker`]
//! for the announced hash and reading resumes immediately. The feed does not
//! reconnect; when the socket closes or errors the loop exits and [`LiveFeed::done`]
//! resolves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use blockmirror_core::MirrorError;
use blockmirror_rpc::codec::de_hex_u64;
use blockmirror_rpc::JsonRpcError;

use crate::worker::BlockWorker;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The subscription request sent right after connecting.
pub const SUBSCRIBE_REQUEST: &str =
    r#"{"id":1,"jsonrpc":"2.0","method":"eth_subscribe","params":["newHeads"]}"#;

/// How long [`LiveFeed::close`] waits for the read loop to finish.
pub const CLOSE_WAIT: Duration = Duration::from_secs(1);

const NOTIFICATION_METHOD: &str = "eth_subscription";

/// A new head announced by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadNotification {
    pub hash: String,
    pub number: u64,
}

#[derive(Deserialize)]
struct Frame {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct FrameParams {
    result: HeadPayload,
}

#[derive(Deserialize)]
struct HeadPayload {
    hash: String,
    #[serde(deserialize_with = "de_hex_u64")]
    number: u64,
}

/// Parse one text frame.
///
/// `Ok(None)` for frames that are not `eth_subscription` notifications (the
/// subscription acknowledgement, other responses). A JSON-RPC error reply,
/// such as a rejected `eth_subscribe`, is a [`MirrorError::Subscription`].
pub fn parse_notification(text: &str) -> Result<Option<HeadNotification>, MirrorError> {
    let frame: Frame =
        serde_json::from_str(text).map_err(|e| MirrorError::Decode(format!("live frame: {e}")))?;

    if let Some(err) = frame.error {
        return Err(MirrorError::Subscription(format!("node replied with error {err}")));
    }

    if frame.method.as_deref() != Some(NOTIFICATION_METHOD) {
        return Ok(None);
    }

    let params = frame
        .params
        .ok_or_else(|| MirrorError::Decode("notification without params".into()))?;
    let params: FrameParams = serde_json::from_value(params)
        .map_err(|e| MirrorError::Decode(format!("notification payload: {e}")))?;

    Ok(Some(HeadNotification {
        hash: params.result.hash,
        number: params.result.number,
    }))
}

/// A running `newHeads` subscription.
pub struct LiveFeed {
    url: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    done: watch::Receiver<bool>,
    dispatched: Arc<AtomicU64>,
}

impl LiveFeed {
    /// Dial `url`, subscribe to `newHeads` and start the read loop.
    pub async fn connect(url: impl Into<String>, worker: BlockWorker) -> Result<Self, MirrorError> {
        let url = url.into();
        info!(url = %url, "connecting live feed");

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| MirrorError::Subscription(format!("connect {url}: {e}")))?;
        let (mut sink, stream) = ws.split();

        sink.send(Message::Text(SUBSCRIBE_REQUEST.to_string()))
            .await
            .map_err(|e| MirrorError::Subscription(format!("subscribe: {e}")))?;

        let (done_tx, done_rx) = watch::channel(false);
        let dispatched = Arc::new(AtomicU64::new(0));

        tokio::spawn(read_loop(stream, worker, Arc::clone(&dispatched), done_tx));
        info!(url = %url, "subscribed to newHeads");

        Ok(Self {
            url,
            sink: Mutex::new(sink),
            done: done_rx,
            dispatched,
        })
    }

    /// Notifications handed to workers so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Resolves once the read loop has exited.
    pub async fn done(&self) {
        let mut done = self.done.clone();
        // Err means the loop is gone without signalling, which is also done.
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Send a close frame and wait (bounded) for the read loop to finish.
    ///
    /// Workers already dispatched are left running.
    pub async fn close(&self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = self.sink.lock().await.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "close frame not sent, connection already gone");
        }

        if tokio::time::timeout(CLOSE_WAIT, self.done()).await.is_err() {
            warn!(url = %self.url, "live feed did not finish within {CLOSE_WAIT:?}");
        } else {
            info!(url = %self.url, dispatched = self.dispatched(), "live feed closed");
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    worker: BlockWorker,
    dispatched: Arc<AtomicU64>,
    done: watch::Sender<bool>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match parse_notification(&text) {
                Ok(Some(head)) => {
                    dispatched.fetch_add(1, Ordering::Relaxed);
                    info!(number = head.number, hash = %head.hash, "new head");
                    // Detached: the loop never waits on a worker.
                    drop(worker.spawn(head.hash));
                }
                Ok(None) => debug!("skipping non-notification frame"),
                Err(e @ MirrorError::Subscription(_)) => {
                    warn!(error = %e, "live feed received an error reply, notifications may not arrive")
                }
                Err(e) => warn!(error = %e, "skipping unparseable frame"),
            },
            Ok(Message::Close(frame)) => {
                info!(?frame, "live feed close received");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "live feed read error");
                break;
            }
        }
    }

    debug!("live feed read loop finished");
    let _ = done.send(true);
}
