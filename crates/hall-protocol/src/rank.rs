//! Leaderboard request/response payloads.

use serde::{Deserialize, Serialize};

/// Which leaderboard(s) a client wants.
///
/// On the wire this is a bare integer (`rank_type`), decoded into this
/// enum by [`RankType::from_code`]. Unknown codes are rejected by the
/// caller rather than by serde so the rejection can carry the right
/// error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankType {
    /// All three boards in one response.
    All,
    /// Accumulated online time.
    OnlineTime,
    /// Current account balance.
    OwnedMoney,
    /// Lifetime non-deposit earnings.
    EarnedMoney,
}

impl RankType {
    /// Maps a wire code (0–3) to a rank type.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::All),
            1 => Some(Self::OnlineTime),
            2 => Some(Self::OwnedMoney),
            3 => Some(Self::EarnedMoney),
            _ => None,
        }
    }

    /// The wire code for this rank type.
    pub fn code(self) -> i64 {
        match self {
            Self::All => 0,
            Self::OnlineTime => 1,
            Self::OwnedMoney => 2,
            Self::EarnedMoney => 3,
        }
    }
}

/// A leaderboard query as sent by the client.
///
/// `number_per_page` and `current_page` are signed because clients send
/// zero or negative values to mean "use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankRequest {
    pub token: String,
    pub session: String,
    pub rank_type: i64,
    pub number_per_page: i64,
    pub current_page: i64,
}

/// One row of the online-time board (minutes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineTimeItem {
    pub name: String,
    pub online_time: i64,
}

/// One row of a money board (cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyItem {
    pub name: String,
    pub money: i64,
}

impl MoneyItem {
    pub fn new(name: impl Into<String>, money: i64) -> Self {
        Self {
            name: name.into(),
            money,
        }
    }
}

/// Answer to a [`RankRequest`].
///
/// Boards that were not requested are `None` and left out of the JSON.
/// Page metadata is only filled in when a single board was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankResponse {
    /// Session id to echo back to the client.
    #[serde(default)]
    pub session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online_time_list: Option<Vec<OnlineTimeItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own_money_list: Option<Vec<MoneyItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earn_money_list: Option<Vec<MoneyItem>>,
    #[serde(default)]
    pub number_per_page: i64,
    #[serde(default)]
    pub current_page: i64,
    /// Not computed; always 0.
    #[serde(default)]
    pub total_page: i64,
}
