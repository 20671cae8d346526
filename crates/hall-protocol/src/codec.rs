//! Codec trait and implementations for serializing/deserializing frames.
//!
//! Everything the hall puts on a wire (client replies, announcement
//! pushes, RPC calls to the user service) goes through a [`Codec`], so
//! the framing format can change without touching the core.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the life of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do
    /// not match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// JSON is what the user service and the game clients already speak, so
/// this is the only codec the hall ships with.
///
/// ```rust
/// use hall_protocol::{Codec, JsonCodec, ReplyEnvelope};
///
/// let codec = JsonCodec;
/// let reply = ReplyEnvelope::success(b"{}".to_vec());
/// let bytes = codec.encode(&reply).unwrap();
/// let back: ReplyEnvelope = codec.decode(&bytes).unwrap();
/// assert!(back.is_success());
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
