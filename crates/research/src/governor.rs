//! Credit governor for the metered search API.
//!
//! The governor is the single source of truth for whether a paid query may
//! proceed. All state lives behind one mutex so that the check and the
//! increment of [`CreditGovernor::authorize`] form a single critical section,
//! even when queries fan out concurrently.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use viincci_core::{BudgetConfig, BudgetExceeded};

/// Coarse budget state reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    /// Usage below the warning threshold
    Ok,
    /// Usage between the warning and the stop threshold
    Warning,
    /// Usage at or above the stop threshold; no new queries may start
    Exhausted,
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Exhausted => write!(f, "EXHAUSTED"),
        }
    }
}

/// Result of [`CreditGovernor::estimate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostEstimate {
    pub topic: String,
    pub queries_needed: u64,
    pub credits_needed: u64,
    pub credits_available: u64,
    pub can_afford: bool,
}

/// Token returned by a successful authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Authorization {
    /// Monotonic per-governor sequence number
    pub sequence: u64,
    /// Queries covered by this authorization
    pub queries: u64,
    /// Credits consumed by this authorization
    pub credits: u64,
    /// Total consumption right after this authorization
    pub consumed_after: u64,
}

/// Point-in-time view of the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetSnapshot {
    pub limit: u64,
    pub consumed: u64,
    pub remaining: u64,
    pub status: BudgetStatus,
}

#[derive(Debug, Default)]
struct GovernorState {
    consumed: u64,
    sequence: u64,
}

/// Tracks consumption of the metered search budget.
#[derive(Debug)]
pub struct CreditGovernor {
    config: BudgetConfig,
    state: Mutex<GovernorState>,
}

impl CreditGovernor {
    /// Create a governor with nothing consumed.
    pub fn new(config: BudgetConfig) -> Self {
        Self::with_consumed(config, 0)
    }

    /// Create a governor seeded with prior consumption (e.g. from the ledger).
    ///
    /// Seeding above the limit is clamped to the limit.
    pub fn with_consumed(config: BudgetConfig, consumed: u64) -> Self {
        let consumed = consumed.min(config.limit);
        Self {
            config,
            state: Mutex::new(GovernorState {
                consumed,
                sequence: 0,
            }),
        }
    }

    /// The budget configuration this governor enforces.
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, GovernorState> {
        // State is two integers updated together; a poisoned guard is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Estimate the cost of researching `topic` with `question_count` queries.
    ///
    /// Never mutates state.
    pub fn estimate(&self, topic: &str, question_count: u64) -> CostEstimate {
        let credits_needed = question_count.saturating_mul(self.config.cost_per_query);
        let consumed = self.lock().consumed;
        let credits_available = self.config.limit.saturating_sub(consumed);

        CostEstimate {
            topic: topic.to_string(),
            queries_needed: question_count,
            credits_needed,
            credits_available,
            can_afford: credits_needed <= credits_available
                && self.status_for(consumed) != BudgetStatus::Exhausted,
        }
    }

    /// Authorize `n` queries, all or nothing.
    ///
    /// Succeeds iff `consumed + n * cost_per_query <= limit`; on success the
    /// consumption is recorded before the lock is released.
    pub fn authorize(&self, n: u64) -> Result<Authorization, BudgetExceeded> {
        let mut state = self.lock();
        let available = self.config.limit.saturating_sub(state.consumed);

        if n == 0 {
            return Ok(Authorization {
                sequence: state.sequence,
                queries: 0,
                credits: 0,
                consumed_after: state.consumed,
            });
        }

        let credits = n
            .checked_mul(self.config.cost_per_query)
            .ok_or_else(|| BudgetExceeded::new(u64::MAX, available))?;

        if credits > available {
            tracing::debug!(
                "Denied {} queries ({} credits): {} available",
                n,
                credits,
                available
            );
            return Err(BudgetExceeded::new(credits, available));
        }

        let before = self.status_for(state.consumed);
        state.consumed += credits;
        state.sequence += 1;

        let after = self.status_for(state.consumed);
        if after != before {
            tracing::warn!(
                "Credit budget {} -> {} ({}/{} consumed)",
                before,
                after,
                state.consumed,
                self.config.limit
            );
        }

        Ok(Authorization {
            sequence: state.sequence,
            queries: n,
            credits,
            consumed_after: state.consumed,
        })
    }

    /// Current budget status.
    pub fn status(&self) -> BudgetStatus {
        let consumed = self.lock().consumed;
        self.status_for(consumed)
    }

    fn status_for(&self, consumed: u64) -> BudgetStatus {
        if self.config.limit == 0 {
            return BudgetStatus::Exhausted;
        }

        let ratio = consumed as f64 / self.config.limit as f64;
        if ratio < self.config.threshold_warn {
            BudgetStatus::Ok
        } else if ratio < self.config.threshold_stop {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Exhausted
        }
    }

    /// Credits consumed so far.
    pub fn consumed(&self) -> u64 {
        self.lock().consumed
    }

    /// Consistent view of limit, consumption and status.
    pub fn snapshot(&self) -> BudgetSnapshot {
        let consumed = self.lock().consumed;
        BudgetSnapshot {
            limit: self.config.limit,
            consumed,
            remaining: self.config.limit.saturating_sub(consumed),
            status: self.status_for(consumed),
        }
    }

    /// Explicit external reset (e.g. billing period rollover).
    ///
    /// The only operation that lowers consumption.
    pub fn reset(&self) {
        let mut state = self.lock();
        tracing::info!("Resetting credit budget ({} consumed)", state.consumed);
        state.consumed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn budget(limit: u64) -> BudgetConfig {
        BudgetConfig {
            limit,
            threshold_warn: 0.8,
            threshold_stop: 1.0,
            cost_per_query: 1,
        }
    }

    #[test]
    fn test_authorize_within_limit() {
        let governor = CreditGovernor::new(budget(5));
        let auth = governor.authorize(3).unwrap();
        assert_eq!(auth.credits, 3);
        assert_eq!(auth.consumed_after, 3);
        assert_eq!(governor.consumed(), 3);
    }

    #[test]
    fn test_authorize_is_all_or_nothing() {
        let governor = CreditGovernor::new(budget(5));
        governor.authorize(4).unwrap();

        let denial = governor.authorize(2).unwrap_err();
        assert_eq!(denial.requested, 2);
        assert_eq!(denial.available, 1);
        assert_eq!(denial.shortfall, 1);
        assert_eq!(governor.consumed(), 4);

        assert!(governor.authorize(1).is_ok());
        assert_eq!(governor.consumed(), 5);
    }

    #[test]
    fn test_authorize_honours_cost_per_query() {
        let governor = CreditGovernor::new(BudgetConfig {
            cost_per_query: 3,
            ..budget(10)
        });
        assert!(governor.authorize(3).is_ok());
        assert_eq!(governor.consumed(), 9);
        assert!(governor.authorize(1).is_err());
    }

    #[test]
    fn test_authorize_zero_is_noop() {
        let governor = CreditGovernor::new(budget(0));
        let auth = governor.authorize(0).unwrap();
        assert_eq!(auth.credits, 0);
        assert_eq!(governor.consumed(), 0);
    }

    #[test]
    fn test_authorize_overflow_is_denied() {
        let governor = CreditGovernor::new(BudgetConfig {
            cost_per_query: 2,
            ..budget(10)
        });
        assert!(governor.authorize(u64::MAX).is_err());
        assert_eq!(governor.consumed(), 0);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let governor = CreditGovernor::new(budget(10));
        let first = governor.authorize(1).unwrap();
        let second = governor.authorize(1).unwrap();
        assert!(second.sequence > first.sequence);
    }

    #[test]
    fn test_status_transitions_monotonically() {
        let governor = CreditGovernor::new(budget(10));
        let mut seen = vec![governor.status()];
        while governor.authorize(1).is_ok() {
            seen.push(governor.status());
        }

        assert_eq!(seen.first(), Some(&BudgetStatus::Ok));
        assert_eq!(seen.last(), Some(&BudgetStatus::Exhausted));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.contains(&BudgetStatus::Warning));
    }

    #[test]
    fn test_stop_threshold_below_limit() {
        let governor = CreditGovernor::new(BudgetConfig {
            threshold_warn: 0.5,
            threshold_stop: 0.6,
            ..budget(10)
        });
        governor.authorize(6).unwrap();
        assert_eq!(governor.status(), BudgetStatus::Exhausted);
        // Mathematically still affordable; the orchestrator stops on status.
        assert!(governor.estimate("x", 1).credits_available > 0);
        assert!(!governor.estimate("x", 1).can_afford);
    }

    #[test]
    fn test_estimate_does_not_mutate() {
        let governor = CreditGovernor::new(budget(5));
        let estimate = governor.estimate("Rosa rubiginosa", 4);
        assert_eq!(estimate.queries_needed, 4);
        assert_eq!(estimate.credits_needed, 4);
        assert!(estimate.can_afford);
        assert_eq!(governor.consumed(), 0);

        assert!(!governor.estimate("Rosa rubiginosa", 6).can_afford);
    }

    #[test]
    fn test_with_consumed_clamps_to_limit() {
        let governor = CreditGovernor::with_consumed(budget(5), 9);
        assert_eq!(governor.consumed(), 5);
        assert_eq!(governor.snapshot().remaining, 0);
    }

    #[test]
    fn test_reset() {
        let governor = CreditGovernor::new(budget(2));
        governor.authorize(2).unwrap();
        assert_eq!(governor.status(), BudgetStatus::Exhausted);

        governor.reset();
        assert_eq!(governor.status(), BudgetStatus::Ok);
        assert_eq!(governor.snapshot().remaining, 2);
    }

    #[test]
    fn test_concurrent_authorize_never_overspends() {
        let governor = Arc::new(CreditGovernor::new(budget(50)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let governor = Arc::clone(&governor);
                std::thread::spawn(move || {
                    (0..10).filter(|_| governor.authorize(1).is_ok()).count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
        assert_eq!(governor.consumed(), 50);
    }
}
