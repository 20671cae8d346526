//! Frame types shared by every hop: client ↔ hall and hall ↔ user service.
//!
//! Two layers nest inside each other:
//!
//! ```text
//! Message { module, route, data, reply }
//!                          └─ ReplyEnvelope { code, message, data }
//!                                                           └─ payload JSON
//! ```
//!
//! Both `data` fields are raw bytes and travel as base64 strings in JSON,
//! so a payload is relayed byte-for-byte no matter what it contains.

use serde::{Deserialize, Serialize};

/// Status code of a successful reply.
pub const CODE_SUCCESS: u32 = 200;

/// Status code used when the hall itself fails to serve a request.
pub const CODE_SERVER_ERROR: u32 = 500;

/// A routed frame.
///
/// For requests, `module` + `route` select the handler and `reply` is the
/// correlation id the answer must carry back. For announcement pushes,
/// `reply` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Target module, e.g. `"Hall"` or `"User"`.
    pub module: String,
    /// Handler name inside the module, e.g. `"login"`.
    pub route: String,
    /// Opaque request or reply body.
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
    /// Correlation id.
    #[serde(default)]
    pub reply: String,
}

impl Message {
    /// Builds a frame from its four parts.
    pub fn new(
        module: impl Into<String>,
        route: impl Into<String>,
        data: Vec<u8>,
        reply: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            route: route.into(),
            data,
            reply: reply.into(),
        }
    }
}

/// Status + payload wrapper every service answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// HTTP-like status code; [`CODE_SUCCESS`] means the payload is valid.
    pub code: u32,
    /// Human-readable status text.
    #[serde(default)]
    pub message: String,
    /// Encoded payload (usually JSON).
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
}

impl ReplyEnvelope {
    /// A 200 envelope around `data`.
    pub fn success(data: Vec<u8>) -> Self {
        Self {
            code: CODE_SUCCESS,
            message: "success".to_string(),
            data,
        }
    }

    /// An error envelope with no payload.
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Vec::new(),
        }
    }

    /// `true` when `code == 200`.
    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }
}

/// serde adapter: `Vec<u8>` <-> standard base64 string.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
