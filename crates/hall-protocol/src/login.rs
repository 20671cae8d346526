//! Payloads exchanged with the user service during login.

use serde::{Deserialize, Serialize};

/// What the user service returns inside a successful `login` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    /// Account token; stable per account.
    pub token: String,
    /// Session id issued for this login.
    pub session: String,
}

/// Body of a `getUserInfo` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfoRequest {
    pub token: String,
    pub session: String,
    /// Derived from `(token, session)` with the secret shared with the
    /// user service.
    pub secret_key: String,
}

/// Enriched profile returned by `getUserInfo`.
///
/// Only `name` is required by the hall; everything else is kept so the
/// profile can be logged whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    /// Renewed session id.
    pub session: String,
    /// 0 = guest, 1 = bound account.
    #[serde(rename = "type")]
    pub account_type: i32,
    pub platform: i32,
    pub name: String,
    pub age: i32,
    pub sex: bool,
    pub head_image: i32,
    pub vip: i32,
    pub game_bg_music_volume: i32,
    pub game_effect_volume: i32,
    /// Balance in cents.
    pub account_balance: i64,
}
