//! Per-request context handed to the hall's route handlers.
//!
//! A handler answers through exactly one of [`RequestContext::success`],
//! [`RequestContext::server_error`] or [`RequestContext::binary_reply`].
//! The answer travels over a oneshot channel to whoever dispatched the
//! request; framing it for the wire happens there, via [`Reply::encode`].

use std::fmt;

use hall_protocol::{CODE_SERVER_ERROR, Codec, ConnectionId, ProtocolError, ReplyEnvelope};
use tokio::sync::oneshot;

use crate::HallError;

/// How a handler answered a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Wrap the payload in a 200 envelope.
    Success(Vec<u8>),
    /// Wrap the message in a 500 envelope with no payload.
    ServerError(String),
    /// Send the bytes as they are, without an envelope.
    Binary(Vec<u8>),
}

impl Reply {
    /// The bytes that go into the `data` field of the reply frame.
    pub fn encode<C: Codec>(self, codec: &C) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Success(data) => codec.encode(&ReplyEnvelope::success(data)),
            Self::ServerError(message) => {
                codec.encode(&ReplyEnvelope::error(CODE_SERVER_ERROR, message))
            }
            Self::Binary(data) => Ok(data),
        }
    }
}

/// Receiving half of a request's reply channel.
pub type ReplyReceiver = oneshot::Receiver<Reply>;

/// One inbound request: who sent it, what it carries, where the answer goes.
#[derive(Debug)]
pub struct RequestContext {
    connection_id: ConnectionId,
    data: Vec<u8>,
    renewed_session: Option<String>,
    reply: Option<oneshot::Sender<Reply>>,
}

impl RequestContext {
    /// Creates a context and the receiver its single reply arrives on.
    pub fn new(connection_id: ConnectionId, data: Vec<u8>) -> (Self, ReplyReceiver) {
        let (tx, rx) = oneshot::channel();
        let ctx = Self {
            connection_id,
            data,
            renewed_session: None,
            reply: Some(tx),
        };
        (ctx, rx)
    }

    /// Attaches a session id the dispatch layer renewed for this request.
    pub fn with_renewed_session(mut self, session: impl Into<String>) -> Self {
        self.renewed_session = Some(session.into());
        self
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Raw request body.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn renewed_session(&self) -> Option<&str> {
        self.renewed_session.as_deref()
    }

    /// `true` once one of the reply methods has been called.
    pub fn has_replied(&self) -> bool {
        self.reply.is_none()
    }

    /// Answers with a 200 envelope around `data`.
    pub fn success(&mut self, data: Vec<u8>) -> Result<(), HallError> {
        self.send(Reply::Success(data))
    }

    /// Answers with a 500 envelope carrying `err`'s message.
    pub fn server_error(&mut self, err: &dyn fmt::Display) -> Result<(), HallError> {
        self.send(Reply::ServerError(err.to_string()))
    }

    /// Answers with `data` verbatim.
    pub fn binary_reply(&mut self, data: Vec<u8>) -> Result<(), HallError> {
        self.send(Reply::Binary(data))
    }

    fn send(&mut self, reply: Reply) -> Result<(), HallError> {
        let tx = self.reply.take().ok_or(HallError::AlreadyReplied)?;
        tx.send(reply).map_err(|_| HallError::ReplyDropped)
    }
}

/// Reply failures never abort a handler; they are only worth a log line.
pub(crate) fn log_reply_error(connection_id: &ConnectionId, result: Result<(), HallError>) {
    if let Err(e) = result {
        tracing::warn!(connection_id = %connection_id, error = %e, "failed to send reply");
    }
}
