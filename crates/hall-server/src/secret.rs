//! `getUserInfo` secret-key derivation.

use hall::SecretKeyDeriver;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::ServerError;

type HmacSha256 = Hmac<Sha256>;

/// Derives `hex(HMAC-SHA256(secret, token || session))`.
#[derive(Clone)]
pub struct HmacSecretKey {
    keyed: HmacSha256,
}

impl HmacSecretKey {
    /// # Errors
    /// [`ServerError::InvalidConfig`] if the key is rejected.
    pub fn new(secret: &[u8]) -> Result<Self, ServerError> {
        let keyed = HmacSha256::new_from_slice(secret)
            .map_err(|e| ServerError::InvalidConfig(format!("secret: {e}")))?;
        Ok(Self { keyed })
    }
}

impl SecretKeyDeriver for HmacSecretKey {
    fn derive(&self, token: &str, session: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(token.as_bytes());
        mac.update(session.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for HmacSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacSecretKey(..)")
    }
}
