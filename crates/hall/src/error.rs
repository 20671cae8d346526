//! Error types for the hall core.

use hall_protocol::ProtocolError;
use hall_session::RegistryError;

/// A collaborator (user service, store, cache, dispatch layer) failed.
///
/// The core never retries; it either surfaces this to the caller or logs
/// it, depending on whether the call was on the synchronous reply path.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{service}: {reason}")]
pub struct UpstreamError {
    /// Which collaborator failed, e.g. `"user service"`.
    pub service: &'static str,
    /// What went wrong.
    pub reason: String,
}

impl UpstreamError {
    pub fn new(service: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}

/// Top-level error of the hall core.
///
/// `#[from]` on the wrapped variants lets `?` lift registry, protocol
/// and collaborator errors into this type.
#[derive(Debug, thiserror::Error)]
pub enum HallError {
    /// Registry state mismatch (`AlreadyExists`, `NotFound`, bad key).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A frame or payload failed to encode or decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A collaborator call failed or answered with a non-success status.
    #[error("upstream unavailable: {0}")]
    Upstream(#[from] UpstreamError),

    /// Malformed request: unknown route, unknown rank type, and so on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A lookup the request depends on found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data didn't have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The handler tried to answer a request twice.
    #[error("request already replied")]
    AlreadyReplied,

    /// The dispatch layer stopped waiting for the reply.
    #[error("reply channel closed")]
    ReplyDropped,
}
