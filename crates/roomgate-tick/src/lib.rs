//! Per-room update clock for Roomgate.
//!
//! Every room owns one [`TickScheduler`]. It decides when the room's
//! `update` callback runs next, stamps each call with a nanosecond
//! timestamp, and watches how much of the period the callback used.
//! Rates default to 30 Hz and are capped at 128 Hz.
//!
//! # Late updates
//!
//! A room never replays updates it missed. While updates keep up, deadlines
//! sit on a fixed grid anchored at room start. Once an update fires late
//! (a long callback, a stalled client send, a busy runtime) the grid is
//! re-anchored at the late fire, so the room sees one delayed update and
//! then carries on at its normal rate.
//!
//! # Rooms without updates
//!
//! A rate of 0 turns the clock off: [`TickScheduler::wait_for_tick`] never
//! resolves and the room is driven by client events alone.
//!
//! # Usage
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         () = stop.cancelled() => break,
//!         tick = scheduler.wait_for_tick() => {
//!             logic.update(tick.timestamp_nanos).await;
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How a room's update clock behaves.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Updates per second. 0 turns updates off.
    pub tick_rate_hz: u32,
    /// Share of the period an update may use before a warning is logged.
    pub budget_warn_threshold: f64,
    /// Share of the period at which the warning becomes critical.
    pub budget_critical_threshold: f64,
    /// Track update durations in [`TickMetrics`].
    pub metrics_enabled: bool,
    /// Upper bound in microseconds for the random delay before the first
    /// update, so rooms opened together spread out.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: Self::DEFAULT_TICK_RATE_HZ,
            budget_warn_threshold: 0.80,
            budget_critical_threshold: 1.0,
            metrics_enabled: true,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    pub const DEFAULT_TICK_RATE_HZ: u32 = 30;
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Default settings at `tick_rate_hz`.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Brings every field into range. [`TickScheduler::new`] calls this.
    ///
    /// The rate is capped at [`Self::MAX_TICK_RATE_HZ`], both thresholds
    /// are clamped to `0.0..=1.0`, and the warning threshold never exceeds
    /// the critical one.
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                requested_hz = self.tick_rate_hz,
                max_hz = Self::MAX_TICK_RATE_HZ,
                "room tick rate too high, using the maximum"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self.budget_critical_threshold = self.budget_critical_threshold.clamp(0.0, 1.0);
        self.budget_warn_threshold = self
            .budget_warn_threshold
            .clamp(0.0, 1.0)
            .min(self.budget_critical_threshold);
        self
    }

    /// Length of one period, or `None` for a room without updates.
    pub fn tick_duration(&self) -> Option<Duration> {
        match self.tick_rate_hz {
            0 => None,
            hz => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-update info
// ---------------------------------------------------------------------------

/// What [`TickScheduler::wait_for_tick`] reports about one update.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Update number, starting at 1.
    pub tick: u64,
    /// Nanoseconds since the Unix epoch. Strictly increasing within a room:
    /// the wall clock is read once when the room starts and the monotonic
    /// clock carries it forward, so system clock changes cannot rewind it.
    pub timestamp_nanos: u64,
    /// The room's period.
    pub dt: Duration,
    /// Fired more than a tenth of a period after its deadline.
    pub overrun: bool,
    /// Whole periods that passed without an update.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Update counters for one room, logged when the room stops.
///
/// Durations cover the time between `wait_for_tick` returning and
/// [`TickScheduler::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Moving average of update duration (weight 0.1 on the newest).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Share of the period used by the last update. Above 1.0 it overran.
    pub budget_utilization: f64,
}

impl TickMetrics {
    fn record_duration(&mut self, elapsed: Duration) {
        const WEIGHT: f64 = 0.1;
        self.max_tick_time = self.max_tick_time.max(elapsed);
        let avg = self.avg_tick_time.as_secs_f64();
        self.avg_tick_time =
            Duration::from_secs_f64(avg + (elapsed.as_secs_f64() - avg) * WEIGHT);
    }
}

/// How close an update came to using its whole period.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Budget {
    Fine,
    Tight,
    Blown,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The update clock of one room.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Option<Duration>,
    tick_count: u64,
    /// Deadline of the next update; `None` when updates are off.
    next_tick: Option<TokioInstant>,
    /// Wall clock at room start, as nanoseconds since the Unix epoch.
    epoch_nanos: u64,
    epoch: TokioInstant,
    /// Set when an update fires, taken by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Starts the clock. The first update is due one period from now,
    /// plus up to `initial_jitter_us` of random delay.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();
        let epoch = TokioInstant::now();
        let epoch_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| u64::try_from(since.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or_default();

        let next_tick = tick_duration.map(|period| epoch + period + first_delay(&config));

        match tick_duration {
            Some(period) => debug!(
                rate_hz = config.tick_rate_hz,
                period_ms = period.as_secs_f64() * 1000.0,
                "room clock started"
            ),
            None => debug!("room clock off, updates disabled"),
        }

        Self {
            config,
            tick_duration,
            tick_count: 0,
            next_tick,
            epoch_nanos,
            epoch,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Sleeps until the next update is due.
    ///
    /// Pends forever for a room without updates. Safe to use as a
    /// `select!` branch: nothing changes until the sleep has finished.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (Some(deadline), Some(period)) = (self.next_tick, self.tick_duration) else {
            return std::future::pending().await;
        };

        time::sleep_until(deadline).await;

        let fired = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = fired.saturating_duration_since(deadline);
        let overrun = late_by > period / 10;
        let ticks_skipped = if overrun {
            self.metrics.total_overruns += 1;
            u64::try_from(late_by.as_nanos() / period.as_nanos()).unwrap_or(u64::MAX)
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "room update late, dropping missed periods"
            );
        }

        self.next_tick = Some(if overrun { fired + period } else { deadline + period });
        self.metrics.total_ticks += 1;
        self.metrics.total_skipped += ticks_skipped;
        trace!(tick = self.tick_count, overrun, "room update due");

        TickInfo {
            tick: self.tick_count,
            timestamp_nanos: self.timestamp_at(fired),
            dt: period,
            overrun,
            ticks_skipped,
        }
    }

    fn timestamp_at(&self, at: TokioInstant) -> u64 {
        let elapsed = at.saturating_duration_since(self.epoch).as_nanos();
        self.epoch_nanos
            .saturating_add(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }

    /// Marks the end of the current update.
    ///
    /// Without this call there are no budget warnings and no duration
    /// metrics. Calling it twice for one update does nothing.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        if let Some(period) = self.tick_duration {
            let used = elapsed.as_secs_f64() / period.as_secs_f64();
            self.metrics.budget_utilization = used;

            let level = if used >= self.config.budget_critical_threshold {
                Budget::Blown
            } else if used >= self.config.budget_warn_threshold {
                Budget::Tight
            } else {
                Budget::Fine
            };
            if level != Budget::Fine {
                warn!(
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    period_ms = period.as_secs_f64() * 1000.0,
                    used_pct = format!("{:.1}", used * 100.0),
                    critical = level == Budget::Blown,
                    "room update used most of its period"
                );
            }
        }

        if self.config.metrics_enabled {
            self.metrics.record_duration(elapsed);
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.tick_duration.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    /// The room's period, or `None` when updates are off.
    pub fn tick_duration(&self) -> Option<Duration> {
        self.tick_duration
    }
}

fn first_delay(config: &TickConfig) -> Duration {
    match config.initial_jitter_us {
        0 => Duration::ZERO,
        max => Duration::from_micros(rand::rng().random_range(0..max)),
    }
}
