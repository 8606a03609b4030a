//! Persisted progress of an advertiser deletion cascade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::advertiser::AdvertiserStatus;

/// Steps of the deletion cascade, children before parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    DeactivateAdvertiser,
    Payments,
    Invoices,
    Refunds,
    StatusHistory,
    Subscriptions,
    Advertiser,
}

impl CascadeStep {
    pub const ORDER: [CascadeStep; 7] = [
        CascadeStep::DeactivateAdvertiser,
        CascadeStep::Payments,
        CascadeStep::Invoices,
        CascadeStep::Refunds,
        CascadeStep::StatusHistory,
        CascadeStep::Subscriptions,
        CascadeStep::Advertiser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeStep::DeactivateAdvertiser => "deactivate_advertiser",
            CascadeStep::Payments => "payments",
            CascadeStep::Invoices => "invoices",
            CascadeStep::Refunds => "refunds",
            CascadeStep::StatusHistory => "status_history",
            CascadeStep::Subscriptions => "subscriptions",
            CascadeStep::Advertiser => "advertiser",
        }
    }

    /// Whether the step removes documents (and therefore cannot be undone).
    pub fn is_destructive(&self) -> bool {
        !matches!(self, CascadeStep::DeactivateAdvertiser)
    }
}

/// Overall cascade status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStatus {
    InProgress,
    Completed,
    /// Stopped partway; resumable.
    Failed,
    /// Failed before anything was deleted and the advertiser status was restored.
    Compensated,
}

impl CascadeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeStatus::InProgress => "in_progress",
            CascadeStatus::Completed => "completed",
            CascadeStatus::Failed => "failed",
            CascadeStatus::Compensated => "compensated",
        }
    }
}

/// Result of one cascade step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeStepResult {
    pub step: CascadeStep,
    pub deleted: u64,
    pub completed_utc: DateTime<Utc>,
}

/// Cascade record, rewritten after every step so progress is observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeRecord {
    pub cascade_id: String,
    pub advertiser_id: String,
    pub status: CascadeStatus,
    #[serde(default)]
    pub completed_steps: Vec<CascadeStepResult>,
    #[serde(default)]
    pub failed_step: Option<CascadeStep>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub previous_advertiser_status: Option<AdvertiserStatus>,
    pub requested_by: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl CascadeRecord {
    pub fn is_step_done(&self, step: CascadeStep) -> bool {
        self.completed_steps.iter().any(|r| r.step == step)
    }

    /// Steps still to run, in cascade order.
    pub fn pending_steps(&self) -> Vec<CascadeStep> {
        CascadeStep::ORDER
            .iter()
            .copied()
            .filter(|s| !self.is_step_done(*s))
            .collect()
    }

    pub fn total_deleted(&self) -> u64 {
        self.completed_steps.iter().map(|r| r.deleted).sum()
    }
}
