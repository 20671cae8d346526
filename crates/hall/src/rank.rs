//! Leaderboards.
//!
//! Three boards, all paged the same way:
//!
//! | Board          | Source                                               |
//! |----------------|------------------------------------------------------|
//! | online time    | not tracked yet, always empty                        |
//! | owned money    | [`BalanceStore`], one page of accounts by balance    |
//! | earned money   | [`LedgerStore`] earnings per user, named via [`ProfileCache`] |
//!
//! Requests are all-or-nothing: any collaborator failure or missing
//! profile fails the whole request, including `ALL`.

use std::sync::Arc;

use hall_protocol::{
    Codec, JsonCodec, MoneyItem, OnlineTimeItem, RankRequest, RankResponse, RankType,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::HallError;
use crate::context::{RequestContext, log_reply_error};
use crate::services::{
    BalanceStore, EarningsQuery, LedgerEntryKind, LedgerStore, PageWindow, ProfileCache,
};

/// Page size used when a request doesn't set one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A validated [`RankRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankQuery {
    pub rank_type: RankType,
    pub page_size: u64,
    /// 1-based.
    pub page_index: u64,
}

impl RankQuery {
    /// Validates the rank type and fills in paging defaults: a page size
    /// of zero or less becomes `default_page_size`, a page index of zero
    /// or less becomes 1.
    ///
    /// # Errors
    /// [`HallError::InvalidArgument`] for an unknown rank type.
    pub fn from_request(request: &RankRequest, default_page_size: u64) -> Result<Self, HallError> {
        let rank_type = RankType::from_code(request.rank_type).ok_or_else(|| {
            HallError::InvalidArgument(format!("unknown rank type {}", request.rank_type))
        })?;
        let page_size = u64::try_from(request.number_per_page)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(default_page_size);
        let page_index = u64::try_from(request.current_page)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(1);

        Ok(Self {
            rank_type,
            page_size,
            page_index,
        })
    }

    pub fn window(&self) -> PageWindow {
        PageWindow::for_page(self.page_size, self.page_index)
    }
}

#[derive(Deserialize)]
struct CachedUser {
    info: CachedInfo,
}

#[derive(Deserialize)]
struct CachedInfo {
    name: String,
}

/// Builds leaderboard responses.
pub struct RankAggregator<B, L, P> {
    balances: Arc<B>,
    ledger: Arc<L>,
    profiles: Arc<P>,
    default_page_size: u64,
    codec: JsonCodec,
}

impl<B, L, P> RankAggregator<B, L, P>
where
    B: BalanceStore,
    L: LedgerStore,
    P: ProfileCache,
{
    pub fn new(balances: Arc<B>, ledger: Arc<L>, profiles: Arc<P>) -> Self {
        Self {
            balances,
            ledger,
            profiles,
            default_page_size: DEFAULT_PAGE_SIZE,
            codec: JsonCodec,
        }
    }

    /// Page size for requests that don't set one. Zero keeps
    /// [`DEFAULT_PAGE_SIZE`].
    pub fn with_default_page_size(mut self, page_size: u64) -> Self {
        self.default_page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        self
    }

    /// Computes the requested board(s).
    ///
    /// Page metadata is set for a single board and left at zero for
    /// `ALL`. `session` is left empty; see [`handle`](Self::handle).
    pub async fn rank(&self, request: &RankRequest) -> Result<RankResponse, HallError> {
        let query = RankQuery::from_request(request, self.default_page_size)?;
        debug!(
            rank_type = ?query.rank_type,
            page_size = query.page_size,
            page_index = query.page_index,
            "rank query"
        );

        let mut response = RankResponse::default();
        match query.rank_type {
            RankType::All => {
                response.online_time_list = Some(self.online_time(&query).await?);
                response.own_money_list = Some(self.owned_money(&query).await?);
                response.earn_money_list = Some(self.earned_money(&query).await?);
                return Ok(response);
            }
            RankType::OnlineTime => {
                response.online_time_list = Some(self.online_time(&query).await?);
            }
            RankType::OwnedMoney => {
                response.own_money_list = Some(self.owned_money(&query).await?);
            }
            RankType::EarnedMoney => {
                response.earn_money_list = Some(self.earned_money(&query).await?);
            }
        }

        response.number_per_page = i64::try_from(query.page_size).unwrap_or(i64::MAX);
        response.current_page = i64::try_from(query.page_index).unwrap_or(i64::MAX);
        Ok(response)
    }

    /// Handles one `rank` request and replies on `ctx`.
    ///
    /// The response echoes the session the dispatch layer renewed, or the
    /// request's own session when nothing was renewed.
    pub async fn handle(&self, ctx: &mut RequestContext) {
        let connection_id = ctx.connection_id().clone();

        let request: RankRequest = match self.codec.decode(ctx.data()) {
            Ok(request) => request,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "undecodable rank request");
                log_reply_error(&connection_id, ctx.server_error(&e));
                return;
            }
        };

        let mut response = match self.rank(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "rank request failed");
                log_reply_error(&connection_id, ctx.server_error(&e));
                return;
            }
        };
        response.session = ctx
            .renewed_session()
            .map_or_else(|| request.session.clone(), str::to_owned);

        let result = match self.codec.encode(&response) {
            Ok(data) => ctx.success(data),
            Err(e) => ctx.server_error(&e),
        };
        log_reply_error(&connection_id, result);
    }

    async fn online_time(&self, _query: &RankQuery) -> Result<Vec<OnlineTimeItem>, HallError> {
        // No online-time tracking exists yet.
        Ok(Vec::new())
    }

    async fn owned_money(&self, query: &RankQuery) -> Result<Vec<MoneyItem>, HallError> {
        let rows = self.balances.balance_page(query.window()).await?;
        Ok(rows
            .into_iter()
            .map(|row| MoneyItem::new(row.name, row.balance))
            .collect())
    }

    async fn earned_money(&self, query: &RankQuery) -> Result<Vec<MoneyItem>, HallError> {
        let rows = self
            .ledger
            .aggregate_earnings(EarningsQuery {
                kind: LedgerEntryKind::Earning,
                window: query.window(),
            })
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let name = self.display_name(&row.user).await?;
            items.push(MoneyItem::new(name, row.total));
        }
        Ok(items)
    }

    async fn display_name(&self, token: &str) -> Result<String, HallError> {
        let raw = self
            .profiles
            .get(token)
            .await?
            .ok_or_else(|| HallError::NotFound(format!("profile of {token}")))?;
        let cached: CachedUser = self
            .codec
            .decode(raw.as_bytes())
            .map_err(|e| HallError::Decode(format!("profile of {token}: {e}")))?;
        Ok(cached.info.name)
    }
}
