// RiskGuard: fail-safe that stops trading when cancellation looks stuck or
// orders accumulate. HALT is terminal until the process is restarted.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskLimits {
    /// Consecutive cancel failures that trigger HALT.
    pub max_cancel_failures: u32,
    /// Open orders above this count trigger HALT.
    pub max_open_orders: usize,
    /// Consecutive placement rejections that trigger HALT.
    pub max_consecutive_rejects: u32,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_cancel_failures: 3,
            max_open_orders: 4,
            max_consecutive_rejects: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    CancelFailures { count: u32 },
    OpenOrders { count: usize, ceiling: usize },
    Rejections { count: u32 },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::CancelFailures { count } => write!(f, "{count} consecutive cancel failures"),
            HaltReason::OpenOrders { count, ceiling } => {
                write!(f, "{count} open orders exceeds ceiling of {ceiling}")
            }
            HaltReason::Rejections { count } => write!(f, "{count} consecutive order rejections"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    Continue,
    Halt(HaltReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RiskStatus {
    pub consecutive_cancel_failures: u32,
    pub consecutive_rejects: u32,
    pub open_orders: usize,
    pub halted: Option<HaltReason>,
}

/// Per-cycle outcome counts fed back by the OrderManager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionTally {
    pub cancels_acked: u32,
    pub cancel_failures: u32,
    pub placed: u32,
    pub rejected: u32,
}

#[derive(Debug, Default)]
pub struct RiskGuard {
    limits: RiskLimits,
    status: Mutex<RiskStatus>,
}

impl RiskGuard {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            status: Mutex::new(RiskStatus::default()),
        }
    }

    pub fn limits(&self) -> RiskLimits {
        self.limits
    }

    pub fn record_cancel_ack(&self) {
        self.status.lock().consecutive_cancel_failures = 0;
    }

    pub fn record_cancel_failure(&self) {
        let mut status = self.status.lock();
        status.consecutive_cancel_failures += 1;
        warn!(
            consecutive = status.consecutive_cancel_failures,
            threshold = self.limits.max_cancel_failures,
            "Cancel failure recorded"
        );
    }

    pub fn record_placed(&self) {
        self.status.lock().consecutive_rejects = 0;
    }

    pub fn record_rejected(&self) {
        self.status.lock().consecutive_rejects += 1;
    }

    /// Fold one cycle's outcomes in. Failures after an ack in the same cycle
    /// still count, so failures are applied last.
    pub fn record(&self, tally: &ActionTally) {
        if tally.cancels_acked > 0 {
            self.record_cancel_ack();
        }
        for _ in 0..tally.cancel_failures {
            self.record_cancel_failure();
        }
        if tally.placed > 0 {
            self.record_placed();
        }
        for _ in 0..tally.rejected {
            self.record_rejected();
        }
    }

    /// CONTINUE or HALT given the current open-order count. Once halted, always HALT.
    pub fn evaluate(&self, open_orders: usize) -> RiskDecision {
        let mut status = self.status.lock();
        status.open_orders = open_orders;
        if let Some(reason) = &status.halted {
            return RiskDecision::Halt(reason.clone());
        }

        let reason = if status.consecutive_cancel_failures >= self.limits.max_cancel_failures {
            Some(HaltReason::CancelFailures {
                count: status.consecutive_cancel_failures,
            })
        } else if open_orders > self.limits.max_open_orders {
            Some(HaltReason::OpenOrders {
                count: open_orders,
                ceiling: self.limits.max_open_orders,
            })
        } else if status.consecutive_rejects >= self.limits.max_consecutive_rejects {
            Some(HaltReason::Rejections {
                count: status.consecutive_rejects,
            })
        } else {
            None
        };

        match reason {
            Some(reason) => {
                error!(%reason, "Risk limit breached, halting trading");
                metrics::counter!("fairmm_risk_halts_total").increment(1);
                status.halted = Some(reason.clone());
                RiskDecision::Halt(reason)
            }
            None => RiskDecision::Continue,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.status.lock().halted.is_some()
    }

    pub fn status(&self) -> RiskStatus {
        self.status.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(n: u32) -> RiskGuard {
        RiskGuard::new(RiskLimits {
            max_cancel_failures: n,
            max_open_orders: 4,
            max_consecutive_rejects: 5,
        })
    }

    #[test]
    fn halts_at_exactly_n_cancel_failures() {
        let g = guard(3);
        g.record_cancel_failure();
        g.record_cancel_failure();
        assert_eq!(g.evaluate(0), RiskDecision::Continue);
        g.record_cancel_failure();
        assert_eq!(
            g.evaluate(0),
            RiskDecision::Halt(HaltReason::CancelFailures { count: 3 })
        );
    }

    #[test]
    fn ack_resets_consecutive_failures() {
        let g = guard(3);
        g.record_cancel_failure();
        g.record_cancel_failure();
        g.record_cancel_ack();
        g.record_cancel_failure();
        assert_eq!(g.evaluate(0), RiskDecision::Continue);
        assert_eq!(g.status().consecutive_cancel_failures, 1);
    }

    #[test]
    fn open_order_ceiling() {
        let g = guard(3);
        assert_eq!(g.evaluate(4), RiskDecision::Continue);
        assert_eq!(
            g.evaluate(5),
            RiskDecision::Halt(HaltReason::OpenOrders { count: 5, ceiling: 4 })
        );
    }

    #[test]
    fn halt_is_sticky() {
        let g = guard(1);
        g.record_cancel_failure();
        assert!(matches!(g.evaluate(0), RiskDecision::Halt(_)));
        g.record_cancel_ack();
        assert!(matches!(g.evaluate(0), RiskDecision::Halt(_)));
        assert!(g.is_halted());
    }

    #[test]
    fn single_rejection_does_not_halt() {
        let g = guard(3);
        g.record(&ActionTally { rejected: 1, ..Default::default() });
        assert_eq!(g.evaluate(0), RiskDecision::Continue);
        for _ in 0..4 {
            g.record_rejected();
        }
        assert_eq!(
            g.evaluate(0),
            RiskDecision::Halt(HaltReason::Rejections { count: 5 })
        );
    }

    #[test]
    fn tally_failures_after_ack_still_count() {
        let g = guard(2);
        g.record_cancel_failure();
        g.record(&ActionTally { cancels_acked: 1, cancel_failures: 1, ..Default::default() });
        assert_eq!(g.status().consecutive_cancel_failures, 1);
    }
}
