//! Knobs for the order placement workflow.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How stock is decremented for each order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockStrategy {
    /// Conditional decrement in the Data Store; never oversells.
    #[default]
    Atomic,
    /// Write back `observed stock - quantity`. Concurrent orders can oversell.
    ReadThenWrite,
}

/// What happens when a write fails after the order header exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Restore applied stock decrements, delete the recorded lines, then mark
    /// the order failed and soft-delete it.
    #[default]
    Compensate,
    /// Leave the order `placing` and report where it stopped; the
    /// reconciliation pass unwinds it later.
    Surface,
}

/// Full workflow configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    pub stock: StockStrategy,
    pub on_failure: FailurePolicy,
    /// Budget for compensation, independent of the request deadline.
    pub compensation_timeout: Duration,
    /// Period of the background reconciliation pass.
    pub reconcile_interval: Duration,
}

impl PlacementPolicy {
    /// Age after which a `placing` order can no longer belong to a live
    /// request, given the per-request deadline.
    #[must_use]
    pub fn settle_after(&self, request_timeout: Duration) -> Duration {
        (request_timeout + self.compensation_timeout) * 2
    }
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            stock: StockStrategy::default(),
            on_failure: FailurePolicy::default(),
            compensation_timeout: Duration::from_secs(10),
            reconcile_interval: Duration::from_secs(60),
        }
    }
}

/// An unrecognised policy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPolicy {
    value: String,
    expected: &'static str,
}

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}', expected {}", self.value, self.expected)
    }
}

impl std::error::Error for UnknownPolicy {}

impl FromStr for StockStrategy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(Self::Atomic),
            "read-then-write" => Ok(Self::ReadThenWrite),
            _ => Err(UnknownPolicy {
                value: s.to_string(),
                expected: "'atomic' or 'read-then-write'",
            }),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compensate" => Ok(Self::Compensate),
            "surface" => Ok(Self::Surface),
            _ => Err(UnknownPolicy {
                value: s.to_string(),
                expected: "'compensate' or 'surface'",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("atomic".parse(), Ok(StockStrategy::Atomic));
        assert_eq!(" Read-Then-Write ".parse(), Ok(StockStrategy::ReadThenWrite));
        assert_eq!("surface".parse(), Ok(FailurePolicy::Surface));
        assert_eq!("COMPENSATE".parse(), Ok(FailurePolicy::Compensate));

        let err = "rollback".parse::<FailurePolicy>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown value 'rollback', expected 'compensate' or 'surface'"
        );
    }

    #[test]
    fn test_settle_after_outlives_a_request() {
        let policy = PlacementPolicy::default();
        assert_eq!(
            policy.settle_after(Duration::from_secs(30)),
            Duration::from_secs(80)
        );
    }
}
