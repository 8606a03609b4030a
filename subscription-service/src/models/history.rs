//! Subscription status history (append-only audit trail).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::subscription::SubscriptionStatus;

/// Action that produced a status history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Pause,
    Resume,
    Stop,
    Reactivate,
    Activate,
    Cancel,
    Expire,
    GraceActivate,
    GraceEnd,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Pause => "pause",
            ActionType::Resume => "resume",
            ActionType::Stop => "stop",
            ActionType::Reactivate => "reactivate",
            ActionType::Activate => "activate",
            ActionType::Cancel => "cancel",
            ActionType::Expire => "expire",
            ActionType::GraceActivate => "grace_activate",
            ActionType::GraceEnd => "grace_end",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status change, with day counters and the money position at that moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionStatusHistory {
    pub history_id: String,
    pub subscription_id: String,
    pub advertiser_id: String,
    pub from_status: SubscriptionStatus,
    pub to_status: SubscriptionStatus,
    pub action_type: ActionType,
    pub changed_at: DateTime<Utc>,
    pub end_date_before: NaiveDate,
    pub end_date_after: NaiveDate,
    pub remaining_days_before: i64,
    pub remaining_days_after: i64,
    pub paused_days_before: i64,
    pub paused_days_after: i64,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub changed_by: String,
    #[serde(default)]
    pub reason: Option<String>,
}
