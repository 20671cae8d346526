//! The collaborators the hall talks to, as traits.
//!
//! The core never opens a socket or a database connection itself. The
//! host wires in implementations: a WebSocket client for the user
//! service, a SQL pool for balances, a cache client for profiles. The
//! crate ships in-memory versions in [`crate::memory`].
//!
//! Async methods are declared as `fn … -> impl Future + Send` so the
//! futures can be spawned onto the runtime; implementors may still write
//! them as plain `async fn`.

use std::future::Future;

use hall_protocol::{ConnectionId, Message};

use crate::UpstreamError;

/// Request/response access to the user service.
pub trait UserService: Send + Sync + 'static {
    /// Sends `message` and waits for the reply carrying the same
    /// correlation id.
    fn request_sync(
        &self,
        message: Message,
    ) -> impl Future<Output = Result<Message, UpstreamError>> + Send;
}

/// Derives the `secret_key` sent with `getUserInfo`.
pub trait SecretKeyDeriver: Send + Sync + 'static {
    fn derive(&self, token: &str, session: &str) -> String;
}

impl<F> SecretKeyDeriver for F
where
    F: Fn(&str, &str) -> String + Send + Sync + 'static,
{
    fn derive(&self, token: &str, session: &str) -> String {
        self(token, session)
    }
}

/// Time-ordered announcement store.
pub trait AnnouncementSource: Send + Sync + 'static {
    /// Appends an announcement.
    fn publish(
        &self,
        text: &str,
        from: &str,
    ) -> impl Future<Output = Result<(), UpstreamError>> + Send;

    /// Returns the newest announcement not yet handed out, if any.
    /// Each announcement is returned at most once.
    fn poll_next(&self) -> impl Future<Output = Result<Option<String>, UpstreamError>> + Send;
}

/// Rows to skip and rows to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
}

impl PageWindow {
    /// The window of the 1-based page `page_index` with `page_size` rows
    /// per page.
    pub fn for_page(page_size: u64, page_index: u64) -> Self {
        Self {
            offset: page_index.saturating_sub(1).saturating_mul(page_size),
            limit: page_size,
        }
    }
}

/// One account on the owned-money board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRow {
    pub name: String,
    pub balance: i64,
}

/// Account balances, read-only.
pub trait BalanceStore: Send + Sync + 'static {
    /// Accounts ordered by balance descending, ties by account token
    /// ascending, restricted to `window`. A SQL store runs
    /// `SELECT name, account_balance FROM user_info
    /// ORDER BY account_balance DESC, account_token LIMIT offset, limit`.
    fn balance_page(
        &self,
        window: PageWindow,
    ) -> impl Future<Output = Result<Vec<BalanceRow>, UpstreamError>> + Send;
}

/// Kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LedgerEntryKind {
    Deposit = 1,
    Earning = 2,
}

impl LedgerEntryKind {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Filter and window for [`LedgerStore::aggregate_earnings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarningsQuery {
    pub kind: LedgerEntryKind,
    pub window: PageWindow,
}

/// Sum of one user's ledger entries of the queried kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarningsRow {
    /// Account token of the user.
    pub user: String,
    pub total: i64,
}

/// The money ledger, read-only.
pub trait LedgerStore: Send + Sync + 'static {
    /// Entries of `query.kind` summed per user, ordered by total
    /// descending, then windowed: the offset is applied before the limit.
    fn aggregate_earnings(
        &self,
        query: EarningsQuery,
    ) -> impl Future<Output = Result<Vec<EarningsRow>, UpstreamError>> + Send;
}

/// Key/value cache of user profiles, keyed by account token.
///
/// Values are raw JSON of the shape `{"info":{"name":…}}`; decoding is
/// the caller's job so a bad entry surfaces as a decode error.
pub trait ProfileCache: Send + Sync + 'static {
    fn get(&self, token: &str) -> impl Future<Output = Result<Option<String>, UpstreamError>> + Send;
}

/// Pushes a frame to one live connection.
pub trait ConnectionSender: Send + Sync + 'static {
    fn send_to(
        &self,
        connection_id: &ConnectionId,
        route: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), UpstreamError>> + Send;
}
