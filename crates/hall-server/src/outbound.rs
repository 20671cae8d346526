//! Per-connection outbound queues.
//!
//! Every connection owns one writer task fed by an mpsc channel. Replies
//! and announcement pushes both go through the hub, so a connection's
//! socket only ever has one writer.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hall::{ConnectionSender, MODULE_NAME, UpstreamError};
use hall_protocol::{Codec, ConnectionId, JsonCodec, Message};
use tokio::sync::mpsc;

/// Frames buffered per connection before senders wait.
pub const OUTBOUND_BUFFER: usize = 64;

/// Registry of connection writers.
#[derive(Debug, Default)]
pub struct OutboundHub {
    writers: Mutex<HashMap<ConnectionId, mpsc::Sender<Vec<u8>>>>,
    codec: JsonCodec,
}

impl OutboundHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the queue of `id` and returns its consuming end. A second
    /// registration replaces the first.
    pub fn register(&self, id: &ConnectionId) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.lock().insert(id.clone(), tx);
        rx
    }

    /// Closes the queue of `id`; its writer task drains and exits.
    pub fn unregister(&self, id: &ConnectionId) {
        self.lock().remove(id);
    }

    pub fn is_registered(&self, id: &ConnectionId) -> bool {
        self.lock().contains_key(id)
    }

    /// Queues an already encoded frame for `id`.
    pub async fn send_frame(&self, id: &ConnectionId, frame: Vec<u8>) -> Result<(), UpstreamError> {
        let writer = self
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| UpstreamError::new("dispatch", format!("{id} is not connected")))?;
        writer
            .send(frame)
            .await
            .map_err(|_| UpstreamError::new("dispatch", format!("{id} writer closed")))
    }

    /// Encodes a `Hall` frame and queues it for `id`.
    pub async fn send_message(
        &self,
        id: &ConnectionId,
        route: &str,
        data: Vec<u8>,
        reply: &str,
    ) -> Result<(), UpstreamError> {
        let frame = self
            .codec
            .encode(&Message::new(MODULE_NAME, route, data, reply))
            .map_err(|e| UpstreamError::new("dispatch", e.to_string()))?;
        self.send_frame(id, frame).await
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, mpsc::Sender<Vec<u8>>>> {
        self.writers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConnectionSender for OutboundHub {
    async fn send_to(
        &self,
        connection_id: &ConnectionId,
        route: &str,
        payload: &[u8],
    ) -> Result<(), UpstreamError> {
        self.send_message(connection_id, route, payload.to_vec(), "")
            .await
    }
}
