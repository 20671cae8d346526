//! WebSocket RPC client for the user service.
//!
//! Frames are JSON [`Message`]s in binary WebSocket messages, the same
//! framing clients use with the hall. The client connects on first use
//! and multiplexes every call over that one connection: a reader task
//! owns the receiving half and hands each reply to the caller waiting on
//! its correlation id. The sending half is locked only while a frame is
//! written, so a slow call never holds up the others.
//!
//! When the connection fails, every call in flight on it fails and the
//! next call reconnects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hall::{UpstreamError, UserService};
use hall_protocol::{Codec, JsonCodec, Message};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type UserServiceStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SERVICE: &str = "user service";

/// Callers waiting for a reply, keyed by correlation id.
#[derive(Default)]
struct Waiters {
    pending: HashMap<String, oneshot::Sender<Message>>,
    /// Set by the reader when the connection is gone.
    closed: bool,
}

type SharedWaiters = Arc<StdMutex<Waiters>>;

fn lock(waiters: &SharedWaiters) -> MutexGuard<'_, Waiters> {
    waiters.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One live connection: the sending half plus the reader task that owns
/// the receiving half.
struct Link {
    sink: SplitSink<UserServiceStream, WsMessage>,
    waiters: SharedWaiters,
    reader: JoinHandle<()>,
}

impl Link {
    fn is_closed(&self) -> bool {
        lock(&self.waiters).closed
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
        let mut waiters = lock(&self.waiters);
        waiters.closed = true;
        waiters.pending.clear();
    }
}

/// Lazily connected user-service client.
pub struct WsUserServiceClient {
    url: String,
    timeout: Duration,
    link: Mutex<Option<Link>>,
    codec: JsonCodec,
}

impl WsUserServiceClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            link: Mutex::new(None),
            codec: JsonCodec,
        }
    }

    async fn connect(&self) -> Result<Link, UpstreamError> {
        let (stream, _) = tokio::time::timeout(
            self.timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| UpstreamError::new(SERVICE, format!("connect {}: timed out", self.url)))?
        .map_err(|e| UpstreamError::new(SERVICE, format!("connect {}: {e}", self.url)))?;
        debug!(url = %self.url, "connected to user service");

        let (sink, stream) = stream.split();
        let waiters = SharedWaiters::default();
        let reader = tokio::spawn(read_replies(stream, Arc::clone(&waiters)));
        Ok(Link {
            sink,
            waiters,
            reader,
        })
    }

    /// Registers `correlation_id` and writes `frame`, connecting first if
    /// there is no usable connection. The link lock is released before the
    /// reply is awaited.
    async fn send(
        &self,
        frame: Vec<u8>,
        correlation_id: &str,
    ) -> Result<PendingReply, UpstreamError> {
        let mut guard = self.link.lock().await;
        if guard.as_ref().is_none_or(Link::is_closed) {
            *guard = Some(self.connect().await?);
        }
        let Some(link) = guard.as_mut() else {
            return Err(UpstreamError::new(SERVICE, "not connected"));
        };

        let (tx, rx) = oneshot::channel();
        if lock(&link.waiters)
            .pending
            .insert(correlation_id.to_string(), tx)
            .is_some()
        {
            warn!(correlation_id, "correlation id reused, replacing earlier waiter");
        }
        let waiters = Arc::clone(&link.waiters);

        let write = link.sink.send(WsMessage::Binary(frame.into()));
        let sent = match tokio::time::timeout(self.timeout, write).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err("timed out".to_string()),
        };
        if let Err(reason) = sent {
            warn!(%reason, "send to user service failed, dropping connection");
            // Dropping the link fails every other call waiting on it.
            *guard = None;
            return Err(UpstreamError::new(SERVICE, format!("send: {reason}")));
        }
        Ok(PendingReply { waiters, rx })
    }
}

/// A call whose frame is written and whose reply hasn't arrived yet.
struct PendingReply {
    waiters: SharedWaiters,
    rx: oneshot::Receiver<Message>,
}

impl UserService for WsUserServiceClient {
    async fn request_sync(&self, message: Message) -> Result<Message, UpstreamError> {
        let frame = self
            .codec
            .encode(&message)
            .map_err(|e| UpstreamError::new(SERVICE, e.to_string()))?;

        let PendingReply { waiters, rx } = self.send(frame, &message.reply).await?;
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                warn!(route = %message.route, "user service connection lost during call");
                Err(UpstreamError::new(SERVICE, "connection closed"))
            }
            Err(_) => {
                lock(&waiters).pending.remove(&message.reply);
                warn!(route = %message.route, "user service call timed out");
                Err(UpstreamError::new(SERVICE, "timed out"))
            }
        }
    }
}

/// Routes every reply on the connection to its waiter until the
/// connection ends, then fails the calls still waiting.
async fn read_replies(mut stream: SplitStream<UserServiceStream>, waiters: SharedWaiters) {
    let codec = JsonCodec;
    let reason = loop {
        let data: Vec<u8> = match stream.next().await {
            Some(Ok(WsMessage::Binary(data))) => data.into(),
            Some(Ok(WsMessage::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(WsMessage::Close(_))) | None => break "connection closed".to_string(),
            Some(Ok(_)) => continue,
            Some(Err(e)) => break format!("receive: {e}"),
        };

        let reply: Message = match codec.decode(&data) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "undecodable frame from user service");
                continue;
            }
        };
        let waiter = lock(&waiters).pending.remove(&reply.reply);
        match waiter {
            // The caller may have timed out in the meantime.
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!(reply = %reply.reply, "dropping unmatched reply"),
        }
    };

    let mut state = lock(&waiters);
    state.closed = true;
    let in_flight = state.pending.len();
    // Dropping the senders wakes every waiting caller with an error.
    state.pending.clear();
    drop(state);
    warn!(%reason, in_flight, "user service connection ended");
}
