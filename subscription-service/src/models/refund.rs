//! Manual refund decisions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Refund decision status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
    Processed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Approved => "approved",
            RefundStatus::Rejected => "rejected",
            RefundStatus::Processed => "processed",
        }
    }

    /// Allowed moves: pending to approved or rejected, approved to processed.
    pub fn can_move_to(&self, next: RefundStatus) -> bool {
        matches!(
            (self, next),
            (RefundStatus::Pending, RefundStatus::Approved)
                | (RefundStatus::Pending, RefundStatus::Rejected)
                | (RefundStatus::Approved, RefundStatus::Processed)
        )
    }

    /// Whether the refund counts against the refundable balance.
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            RefundStatus::Pending | RefundStatus::Approved | RefundStatus::Processed
        )
    }
}

/// Refund record. Executing the refund happens outside this service; the
/// record never changes subscription or invoice balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub refund_id: String,
    pub subscription_id: String,
    pub advertiser_id: String,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    pub amount: Decimal,
    pub reason: String,
    pub status: RefundStatus,
    pub requested_by: String,
    #[serde(default)]
    pub decided_by: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a refund decision.
#[derive(Debug, Clone)]
pub struct CreateRefund {
    pub subscription_id: String,
    pub invoice_id: Option<String>,
    pub payment_id: Option<String>,
    pub amount: Decimal,
    pub reason: String,
    pub actor_id: String,
}
