//! Fixed-period ticker for the hall's background jobs.
//!
//! The hall needs exactly one scheduling primitive: "call this every N
//! seconds". [`Ticker`] provides it with two extras that matter when the
//! job can block:
//!
//! - **Missed-tick handling** ([`MissedTickPolicy`]) when a job runs past
//!   the next deadline.
//! - **Busy-time monitoring**: the time between [`Ticker::tick`] resolving
//!   and [`Ticker::finish_tick`] is compared against the period, and a
//!   warning is logged when a job eats most of it. For the announcement
//!   poller that is the visible symptom of a saturated fanout queue.
//!
//! # Usage
//!
//! ```ignore
//! let mut ticker = Ticker::every(Duration::from_secs(1));
//! ticker
//!     .run_until(shutdown, |_tick| async { poller.poll().await; })
//!     .await;
//! ```
//!
//! Or inside an existing `select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = &mut shutdown => break,
//!         tick = ticker.tick() => {
//!             job(tick).await;
//!             ticker.finish_tick();
//!         }
//!     }
//! }
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a job overruns one or more deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissedTickPolicy {
    /// Forget the missed deadlines and schedule the next tick one period
    /// from now.
    #[default]
    Skip,
    /// Fire missed ticks back-to-back, at most `max_burst` of them; beyond
    /// that the rest are skipped.
    Burst { max_burst: u32 },
    /// Keep the cadence: the next deadline is always the previous
    /// deadline plus one period, even if it is already in the past.
    KeepCadence,
}

/// Ticker settings.
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Time between ticks. `None` disables the ticker: [`Ticker::tick`]
    /// then pends forever.
    pub period: Option<Duration>,
    /// Overrun handling.
    pub policy: MissedTickPolicy,
    /// Fraction of the period (0.0–1.0) a job may use before a warning.
    pub budget_warn_threshold: f64,
    /// Fraction of the period (0.0–1.0) reported as critical.
    pub budget_critical_threshold: f64,
    /// Track busy-time averages and maxima.
    pub stats_enabled: bool,
    /// Upper bound of a random delay added before the first tick, so that
    /// several hall instances started together don't poll in lockstep.
    pub start_jitter: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            period: None,
            policy: MissedTickPolicy::default(),
            budget_warn_threshold: 0.80,
            budget_critical_threshold: 1.0,
            stats_enabled: true,
            start_jitter: Duration::ZERO,
        }
    }
}

impl TickerConfig {
    /// Shortest accepted period.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    /// Config that ticks once every `period`.
    pub fn every(period: Duration) -> Self {
        Self {
            period: Some(period),
            ..Default::default()
        }
    }

    /// Config for a ticker that never fires.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Normalises out-of-range values. Called by [`Ticker::new`].
    ///
    /// - a zero period disables the ticker; anything else below
    ///   [`Self::MIN_PERIOD`] is raised to it;
    /// - thresholds are clamped to `0.0..=1.0`, warn ≤ critical.
    pub fn validated(mut self) -> Self {
        self.period = match self.period {
            Some(p) if p.is_zero() => None,
            Some(p) if p < Self::MIN_PERIOD => {
                warn!(period_us = p.as_micros() as u64, "ticker period too short, raising to 1ms");
                Some(Self::MIN_PERIOD)
            }
            other => other,
        };
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self.budget_critical_threshold = self.budget_critical_threshold.clamp(0.0, 1.0);
        if self.budget_warn_threshold > self.budget_critical_threshold {
            self.budget_warn_threshold = self.budget_critical_threshold;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick + stats
// ---------------------------------------------------------------------------

/// One fired tick, returned by [`Ticker::tick`].
#[derive(Debug, Clone)]
pub struct Tick {
    /// 1-based tick counter.
    pub number: u64,
    /// The configured period.
    pub period: Duration,
    /// The tick fired more than 10% of a period after its deadline.
    pub late: bool,
    /// Deadlines dropped because of lateness (0 in normal operation).
    pub missed: u64,
}

/// Running counters. Busy times come from [`Ticker::finish_tick`].
#[derive(Debug, Clone, Default)]
pub struct TickerStats {
    pub total_ticks: u64,
    pub late_ticks: u64,
    pub missed_ticks: u64,
    /// Exponential moving average of job time (α = 0.1).
    pub avg_busy: Duration,
    pub max_busy: Duration,
    /// Job time of the last finished tick divided by the period.
    pub last_utilization: f64,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Fires at a fixed period. One ticker per background job.
pub struct Ticker {
    config: TickerConfig,
    ticks: u64,
    next_deadline: Option<TokioInstant>,
    /// Set when a tick fires, consumed by `finish_tick`.
    busy_since: Option<Instant>,
    stats: TickerStats,
}

impl Ticker {
    /// Creates a ticker. The first tick is due one period (plus jitter)
    /// from now.
    pub fn new(config: TickerConfig) -> Self {
        let config = config.validated();

        let next_deadline = config.period.map(|period| {
            let jitter = if config.start_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max_us = config.start_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max_us.max(1)))
            };
            TokioInstant::now() + period + jitter
        });

        match config.period {
            Some(period) => debug!(
                period_ms = period.as_millis() as u64,
                policy = ?config.policy,
                "ticker created"
            ),
            None => debug!("ticker created disabled"),
        }

        Self {
            config,
            ticks: 0,
            next_deadline,
            busy_since: None,
            stats: TickerStats::default(),
        }
    }

    /// Shorthand for `Ticker::new(TickerConfig::every(period))`.
    pub fn every(period: Duration) -> Self {
        Self::new(TickerConfig::every(period))
    }

    /// Waits for the next deadline.
    ///
    /// Pends forever while disabled; inside `select!` the other branches
    /// keep running.
    pub async fn tick(&mut self) -> Tick {
        let (deadline, period) = match (self.next_deadline, self.config.period) {
            (Some(deadline), Some(period)) => (deadline, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(deadline).await;

        let now = TokioInstant::now();
        self.ticks += 1;
        self.busy_since = Some(Instant::now());

        let late_by = now.saturating_duration_since(deadline);
        let late = late_by > period / 10;
        let behind = if late {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };
        let mut missed = 0u64;

        self.next_deadline = Some(match self.config.policy {
            MissedTickPolicy::Skip => {
                missed = behind;
                if missed > 0 {
                    warn!(
                        tick = self.ticks,
                        missed,
                        late_ms = late_by.as_millis() as u64,
                        "ticker late, skipping missed deadlines"
                    );
                }
                now + period
            }
            MissedTickPolicy::Burst { max_burst } => {
                missed = behind.saturating_sub(u64::from(max_burst));
                if behind > 0 {
                    warn!(
                        tick = self.ticks,
                        behind,
                        skipped = missed,
                        "ticker late, bursting (max {max_burst})"
                    );
                }
                if behind <= u64::from(max_burst) {
                    deadline + period
                } else {
                    now + period
                }
            }
            MissedTickPolicy::KeepCadence => {
                if late {
                    warn!(
                        tick = self.ticks,
                        late_ms = late_by.as_millis() as u64,
                        "ticker late, keeping cadence"
                    );
                }
                deadline + period
            }
        });

        if late {
            self.stats.late_ticks += 1;
        }
        self.stats.missed_ticks += missed;
        self.stats.total_ticks += 1;

        trace!(tick = self.ticks, late, "tick");

        Tick {
            number: self.ticks,
            period,
            late,
            missed,
        }
    }

    /// Marks the current tick's job as finished and checks its busy time
    /// against the period. A no-op when no tick is in progress.
    pub fn finish_tick(&mut self) {
        let Some(started) = self.busy_since.take() else {
            return;
        };
        let busy = started.elapsed();

        if let Some(period) = self.config.period {
            let utilization = busy.as_secs_f64() / period.as_secs_f64();
            self.stats.last_utilization = utilization;

            if utilization >= self.config.budget_critical_threshold {
                warn!(
                    tick = self.ticks,
                    busy_ms = busy.as_millis() as u64,
                    period_ms = period.as_millis() as u64,
                    "job overran its tick period"
                );
            } else if utilization >= self.config.budget_warn_threshold {
                warn!(
                    tick = self.ticks,
                    busy_ms = busy.as_millis() as u64,
                    period_ms = period.as_millis() as u64,
                    utilization_pct = format!("{:.1}", utilization * 100.0),
                    "job close to its tick period"
                );
            }
        }

        if self.config.stats_enabled {
            self.stats.max_busy = self.stats.max_busy.max(busy);
            let alpha = 0.1;
            let prev = self.stats.avg_busy.as_secs_f64();
            self.stats.avg_busy =
                Duration::from_secs_f64(prev * (1.0 - alpha) + busy.as_secs_f64() * alpha);
        }
    }

    /// Runs `job` on every tick until `stop` resolves.
    ///
    /// The job is awaited inline, so a job that blocks delays the following
    /// ticks instead of piling up concurrent runs.
    pub async fn run_until<S, F, Fut>(&mut self, stop: S, mut job: F)
    where
        S: Future<Output = ()>,
        F: FnMut(Tick) -> Fut,
        Fut: Future<Output = ()>,
    {
        tokio::pin!(stop);
        loop {
            // Stop wins over an overdue tick.
            tokio::select! {
                biased;
                _ = &mut stop => {
                    debug!(ticks = self.ticks, "ticker stopped");
                    return;
                }
                tick = self.tick() => {
                    job(tick).await;
                    self.finish_tick();
                }
            }
        }
    }

    /// `true` if the ticker was built without a period.
    pub fn is_disabled(&self) -> bool {
        self.config.period.is_none()
    }

    /// Ticks fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn stats(&self) -> &TickerStats {
        &self.stats
    }

    pub fn period(&self) -> Option<Duration> {
        self.config.period
    }
}
