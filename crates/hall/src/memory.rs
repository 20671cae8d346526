//! In-memory collaborators.
//!
//! Enough to run the hall on its own and to drive tests. Each one
//! guards its state with a `std::sync::Mutex`; nothing awaits while a
//! lock is held.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::UpstreamError;
use crate::services::{
    AnnouncementSource, BalanceRow, BalanceStore, EarningsQuery, EarningsRow, LedgerEntryKind,
    LedgerStore, PageWindow, ProfileCache,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn window<T>(rows: impl Iterator<Item = T>, window: PageWindow) -> Vec<T> {
    let skip = usize::try_from(window.offset).unwrap_or(usize::MAX);
    let take = usize::try_from(window.limit).unwrap_or(usize::MAX);
    rows.skip(skip).take(take).collect()
}

// ---------------------------------------------------------------------------
// Announcements
// ---------------------------------------------------------------------------

/// One stored announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementRecord {
    /// Insertion order, starting at 1.
    pub seq: u64,
    pub text: String,
    /// Who published it; welcome messages use `"service"`.
    pub from: String,
    pub published_at: SystemTime,
}

#[derive(Debug, Default)]
struct LogState {
    records: Vec<AnnouncementRecord>,
    /// Sequence number of the last record handed out by `poll_next`.
    cursor: u64,
}

/// Append-only announcement log.
///
/// `poll_next` only ever looks at the newest record: if several were
/// published between two polls, the older ones are never handed out.
#[derive(Debug, Default)]
pub struct AnnouncementLog {
    state: Mutex<LogState>,
}

impl AnnouncementLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record published so far, oldest first.
    pub fn records(&self) -> Vec<AnnouncementRecord> {
        lock(&self.state).records.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).records.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).records.is_empty()
    }
}

impl AnnouncementSource for AnnouncementLog {
    async fn publish(&self, text: &str, from: &str) -> Result<(), UpstreamError> {
        let mut state = lock(&self.state);
        let seq = state.records.last().map_or(1, |r| r.seq + 1);
        state.records.push(AnnouncementRecord {
            seq,
            text: text.to_string(),
            from: from.to_string(),
            published_at: SystemTime::now(),
        });
        Ok(())
    }

    async fn poll_next(&self) -> Result<Option<String>, UpstreamError> {
        let mut state = lock(&self.state);
        let Some(latest) = state.records.last() else {
            return Ok(None);
        };
        if latest.seq <= state.cursor {
            return Ok(None);
        }
        let (seq, text) = (latest.seq, latest.text.clone());
        state.cursor = seq;
        Ok(Some(text))
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Account {
    token: String,
    name: String,
    balance: i64,
}

/// Account balances keyed by account token.
#[derive(Debug, Default)]
pub struct MemoryBalances {
    accounts: Mutex<Vec<Account>>,
}

impl MemoryBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an account or overwrites the one with the same token.
    pub fn upsert(&self, token: &str, name: &str, balance: i64) {
        let mut accounts = lock(&self.accounts);
        match accounts.iter_mut().find(|a| a.token == token) {
            Some(account) => {
                account.name = name.to_string();
                account.balance = balance;
            }
            None => accounts.push(Account {
                token: token.to_string(),
                name: name.to_string(),
                balance,
            }),
        }
    }
}

impl BalanceStore for MemoryBalances {
    async fn balance_page(&self, page: PageWindow) -> Result<Vec<BalanceRow>, UpstreamError> {
        let mut accounts = lock(&self.accounts).clone();
        accounts.sort_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.token.cmp(&b.token)));
        let rows = accounts.into_iter().map(|a| BalanceRow {
            name: a.name,
            balance: a.balance,
        });
        Ok(window(rows, page))
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct LedgerEntry {
    user: String,
    kind: LedgerEntryKind,
    amount: i64,
}

/// Money ledger: one entry per deposit or earning.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, user: &str, kind: LedgerEntryKind, amount: i64) {
        lock(&self.entries).push(LedgerEntry {
            user: user.to_string(),
            kind,
            amount,
        });
    }
}

impl LedgerStore for MemoryLedger {
    async fn aggregate_earnings(
        &self,
        query: EarningsQuery,
    ) -> Result<Vec<EarningsRow>, UpstreamError> {
        let mut totals: HashMap<String, i64> = HashMap::new();
        for entry in lock(&self.entries).iter().filter(|e| e.kind == query.kind) {
            let total = totals.entry(entry.user.clone()).or_default();
            *total = total.checked_add(entry.amount).ok_or_else(|| {
                UpstreamError::new("ledger", format!("earnings of {} overflow", entry.user))
            })?;
        }

        let mut rows: Vec<EarningsRow> = totals
            .into_iter()
            .map(|(user, total)| EarningsRow { user, total })
            .collect();
        rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.user.cmp(&b.user)));
        Ok(window(rows.into_iter(), query.window))
    }
}

// ---------------------------------------------------------------------------
// Profile cache
// ---------------------------------------------------------------------------

/// Raw profile cache entries keyed by account token.
#[derive(Debug, Default)]
pub struct MemoryProfileCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a well-formed entry for `token` with display name `name`.
    pub fn insert_user(&self, token: &str, name: &str) {
        let raw = serde_json::json!({ "info": { "name": name } }).to_string();
        self.insert_raw(token, raw);
    }

    /// Stores `raw` as-is, whatever it contains.
    pub fn insert_raw(&self, token: &str, raw: impl Into<String>) {
        lock(&self.entries).insert(token.to_string(), raw.into());
    }

    pub fn remove(&self, token: &str) {
        lock(&self.entries).remove(token);
    }
}

impl ProfileCache for MemoryProfileCache {
    async fn get(&self, token: &str) -> Result<Option<String>, UpstreamError> {
        Ok(lock(&self.entries).get(token).cloned())
    }
}
