//! Spend accounting for the paying client.
//!
//! [`BudgetTracker`] keeps a running total of satoshis spent and refuses
//! payments that would push it past a configured ceiling. The total resets
//! lazily: every [`check`](BudgetTracker::check) or
//! [`record`](BudgetTracker::record) first looks at the clock, and if a full
//! period has elapsed since the period started, zeroes the counter and restarts
//! the period at that instant. There are no timers.
//!
//! ```text
//! check(price) ───► maybe_reset ──► spent + reserved + price > total ? Err : Ok
//! record(amount) ──► maybe_reset ──► spent += amount
//! reserve(price) ──► check, then reserved += price   (one lock)
//! commit(amount) ──► reserved -= price, spent += amount
//! ```
//!
//! A [`BudgetReservation`] holds its price against the limit while a payment
//! is in flight. Dropping it uncommitted releases the hold.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::BudgetError;

// ============================================================================
// Clock
// ============================================================================

/// Source of "now" for budget periods.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Intended for tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ============================================================================
// BudgetConfig
// ============================================================================

/// Limits applied by a [`BudgetTracker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetConfig {
    /// Maximum cumulative spend in satoshis. `None` disables enforcement.
    #[serde(default)]
    pub total_limit: Option<u64>,
    /// Length of a spending period in milliseconds. `None` means spend never
    /// resets.
    #[serde(default)]
    pub period_ms: Option<u64>,
}

impl BudgetConfig {
    /// No limit at all.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// A lifetime limit that never resets.
    pub fn total(limit: u64) -> Self {
        Self {
            total_limit: Some(limit),
            period_ms: None,
        }
    }

    /// A limit that resets after every `period`.
    pub fn per_period(limit: u64, period: std::time::Duration) -> Self {
        Self {
            total_limit: Some(limit),
            period_ms: Some(u64::try_from(period.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

// ============================================================================
// BudgetTracker
// ============================================================================

#[derive(Debug)]
struct BudgetState {
    spent: u64,
    /// Held by live [`BudgetReservation`]s. Survives period resets.
    reserved: u64,
    period_start: DateTime<Utc>,
}

/// Cumulative spend counter with a hard ceiling and an optional reset period.
///
/// `check` and `record` each take the internal lock once, so each call is
/// atomic on its own. Concurrent payers use [`reserve`](Self::reserve)
/// instead, which checks and holds the price under one lock.
pub struct BudgetTracker {
    config: BudgetConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BudgetState>,
}

impl std::fmt::Debug for BudgetTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BudgetTracker")
            .field("config", &self.config)
            .field("spent", &state.spent)
            .field("period_start", &state.period_start)
            .finish()
    }
}

impl BudgetTracker {
    /// Creates a tracker driven by the wall clock.
    pub fn new(config: BudgetConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a tracker driven by the given clock.
    pub fn with_clock(config: BudgetConfig, clock: Arc<dyn Clock>) -> Self {
        let period_start = clock.now();
        Self {
            config,
            clock,
            state: Mutex::new(BudgetState {
                spent: 0,
                reserved: 0,
                period_start,
            }),
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Validates that `price` fits in the remaining budget.
    ///
    /// Never fails when no total limit is configured. Does not change `spent`.
    /// Outstanding reservations count as spent.
    pub fn check(&self, price: u64) -> Result<(), BudgetError> {
        let mut state = self.state.lock();
        self.check_locked(&mut state, price)
    }

    /// Checks `price` and holds it against the limit until the returned
    /// reservation is committed or dropped.
    pub fn reserve(&self, price: u64) -> Result<BudgetReservation<'_>, BudgetError> {
        let mut state = self.state.lock();
        self.check_locked(&mut state, price)?;
        state.reserved = state.reserved.saturating_add(price);
        Ok(BudgetReservation {
            tracker: self,
            price,
            released: false,
        })
    }

    /// Adds a settled payment to the running total.
    ///
    /// Only call this once the payment has settled.
    pub fn record(&self, amount: u64) {
        let mut state = self.state.lock();
        self.maybe_reset(&mut state);
        state.spent = state.spent.saturating_add(amount);

        #[cfg(feature = "tracing")]
        tracing::debug!(amount, spent = state.spent, "Recorded L402 spend");
    }

    /// Satoshis spent in the current period.
    pub fn spent(&self) -> u64 {
        let mut state = self.state.lock();
        self.maybe_reset(&mut state);
        state.spent
    }

    /// Satoshis left in the current period, or `None` when unlimited.
    pub fn remaining(&self) -> Option<u64> {
        let total = self.config.total_limit?;
        Some(total.saturating_sub(self.spent()))
    }

    /// Zeroes spend and restarts the period now.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.spent = 0;
        state.period_start = self.clock.now();
    }

    fn check_locked(&self, state: &mut BudgetState, price: u64) -> Result<(), BudgetError> {
        let Some(total) = self.config.total_limit else {
            return Ok(());
        };
        self.maybe_reset(state);
        let committed = state.spent.saturating_add(state.reserved);
        if committed.saturating_add(price) > total {
            return Err(BudgetError::TotalLimit {
                price,
                spent: committed,
                total,
            });
        }
        Ok(())
    }

    fn release(&self, price: u64) -> parking_lot::MutexGuard<'_, BudgetState> {
        let mut state = self.state.lock();
        state.reserved = state.reserved.saturating_sub(price);
        state
    }

    fn maybe_reset(&self, state: &mut BudgetState) {
        let Some(period_ms) = self.config.period_ms else {
            return;
        };
        let now = self.clock.now();
        let elapsed_ms = (now - state.period_start).num_milliseconds();
        // A clock that stepped backwards yields a negative elapsed time.
        if elapsed_ms >= 0 && elapsed_ms as u64 >= period_ms {
            #[cfg(feature = "tracing")]
            tracing::debug!(previous_spent = state.spent, "L402 budget period elapsed");

            state.spent = 0;
            state.period_start = now;
        }
    }
}

/// A price held against a [`BudgetTracker`] while a payment is in flight.
#[must_use = "dropping a reservation releases it immediately"]
#[derive(Debug)]
pub struct BudgetReservation<'a> {
    tracker: &'a BudgetTracker,
    price: u64,
    released: bool,
}

impl BudgetReservation<'_> {
    pub fn price(&self) -> u64 {
        self.price
    }

    /// Converts the hold into recorded spend of `amount`, which may differ
    /// from the reserved price.
    pub fn commit(mut self, amount: u64) {
        self.released = true;
        let mut state = self.tracker.release(self.price);
        self.tracker.maybe_reset(&mut state);
        state.spent = state.spent.saturating_add(amount);

        #[cfg(feature = "tracing")]
        tracing::debug!(amount, spent = state.spent, "Recorded L402 spend");
    }
}

impl Drop for BudgetReservation<'_> {
    fn drop(&mut self) {
        if !self.released {
            drop(self.tracker.release(self.price));
        }
    }
}
