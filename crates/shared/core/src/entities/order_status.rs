use serde::{Deserialize, Serialize};

/// Order lifecycle status as reported by the trading platform
///
/// `Pending` is local: the order was submitted and no response arrived yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted, awaiting the platform's response
    Pending,
    /// Order has been partially filled
    PartiallyFilled,
    /// Order has been completely filled
    Filled,
    /// Order has been canceled
    #[serde(alias = "cancelled")]
    Canceled,
    /// Order was rejected by the platform
    Rejected,
    /// Any status string this bridge does not know about
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Returns true if the order has (at least partially) executed
    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::PartiallyFilled)
    }

    /// Returns true if the order can no longer execute
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Canceled | OrderStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(OrderStatus::Filled.is_live());
        assert!(OrderStatus::PartiallyFilled.is_live());
        assert!(!OrderStatus::Pending.is_live());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        let parse = |s: &str| serde_json::from_value::<OrderStatus>(serde_json::json!(s)).unwrap();
        assert_eq!(parse("partially_filled"), OrderStatus::PartiallyFilled);
        assert_eq!(parse("cancelled"), OrderStatus::Canceled);
        assert_eq!(parse("expired"), OrderStatus::Unknown);
    }
}
