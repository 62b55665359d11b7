//! Order lifecycle status.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of an order header.
///
/// A placement writes its header as [`OrderStatus::Placing`] and moves it to
/// [`OrderStatus::Pending`] once every line is recorded; a `placing` order is
/// not a real order yet. [`OrderStatus::Failed`] marks a placement whose
/// writes were undone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placing,
    #[default]
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
    Failed,
}

impl OrderStatus {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Placing => "placing",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Shipping => "shipping",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether staff may move an order into this status. `placing` and
    /// `failed` belong to the placement workflow.
    #[must_use]
    pub const fn is_assignable(self) -> bool {
        !matches!(self, Self::Placing | Self::Failed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a status string that is not part of [`OrderStatus`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placing" => Ok(Self::Placing),
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "shipping" => Ok(Self::Shipping),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_from_str_matches_serde() {
        for status in [
            OrderStatus::Placing,
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipping,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_workflow_statuses_are_not_assignable() {
        assert!(!OrderStatus::Placing.is_assignable());
        assert!(!OrderStatus::Failed.is_assignable());
        assert!(OrderStatus::Confirmed.is_assignable());
        assert!(OrderStatus::Pending.is_assignable());
    }
}
