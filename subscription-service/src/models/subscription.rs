//! Subscription model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::plan::PlanCoverage;
use crate::services::clock::days_between;

/// Operational status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    PendingPayment,
    Active,
    Paused,
    Stopped,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::PendingPayment => "pending_payment",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Stopped => "stopped",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment progress, derived only from paid vs. total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

/// How the discount amount on a subscription is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[default]
    Amount,
    Percentage,
}

/// One admin-granted grace extension, embedded on the subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GracePeriodExtension {
    pub days_added: i64,
    pub previous_end_date: NaiveDate,
    pub new_end_date: NaiveDate,
    pub extended_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub extended_at: DateTime<Utc>,
}

/// Subscription document.
///
/// Money fields are written by the ledger coordinator; status and date fields
/// by the lifecycle state machine and grace period service. `version` is
/// bumped on every successful write and used for compare-and-swap updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: String,
    pub advertiser_id: String,
    pub plan_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub planned_days: i64,

    pub base_price: Decimal,
    #[serde(default)]
    pub discount_type: DiscountType,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub discount_value: Decimal,
    #[serde(default)]
    pub vat_percentage: Decimal,
    #[serde(default)]
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,

    pub status: SubscriptionStatus,
    pub payment_status: PaymentStatus,

    pub coverage_type: PlanCoverage,
    #[serde(default)]
    pub coverage_cities: Vec<String>,

    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_paused_days: i64,
    #[serde(default)]
    pub remaining_active_days: Option<i64>,
    #[serde(default)]
    pub active_days: Option<i64>,
    #[serde(default)]
    pub original_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub original_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub original_planned_days: Option<i64>,

    #[serde(default)]
    pub actual_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub days_used: Option<i64>,
    #[serde(default)]
    pub days_wasted: Option<i64>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub reactivation_count: u32,

    #[serde(default)]
    pub is_in_grace_period: bool,
    #[serde(default)]
    pub grace_period_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub grace_period_extensions: Vec<GracePeriodExtension>,
    #[serde(default)]
    pub total_grace_extensions: u32,

    #[serde(default)]
    pub version: i64,
    pub created_by: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    /// Days left in the current run as of `today`.
    ///
    /// A paused subscription reports its frozen snapshot and a finished run
    /// reports zero; otherwise calendar days to `end_date`, never below zero.
    pub fn remaining_days_on(&self, today: NaiveDate) -> i64 {
        match self.status {
            SubscriptionStatus::Paused => self
                .remaining_active_days
                .unwrap_or_else(|| days_between(today, self.end_date).max(0)),
            SubscriptionStatus::Stopped
            | SubscriptionStatus::Expired
            | SubscriptionStatus::Cancelled => 0,
            SubscriptionStatus::Active | SubscriptionStatus::PendingPayment => {
                days_between(today, self.end_date).max(0)
            }
        }
    }

    /// Plan duration a reactivation restarts with.
    pub fn reactivation_days(&self) -> i64 {
        self.original_planned_days.unwrap_or(self.planned_days)
    }

    /// Whether the advertiser is publicly visible through this subscription.
    pub fn grants_visibility(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// Subscription as returned to readers, with derived day counts.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub remaining_days: i64,
}

impl SubscriptionView {
    pub fn new(subscription: Subscription, today: NaiveDate) -> Self {
        let remaining_days = subscription.remaining_days_on(today);
        Self {
            subscription,
            remaining_days,
        }
    }
}

/// Discount requested at subscription creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscountInput {
    pub discount_type: DiscountType,
    pub amount: Decimal,
}

/// Payment taken together with the subscription order.
#[derive(Debug, Clone)]
pub struct InitialPayment {
    pub amount: Decimal,
    pub payment_method: String,
    pub transaction_id: Option<String>,
}

/// Input for creating a subscription with its invoice.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub advertiser_id: String,
    pub plan_id: String,
    pub start_date: Option<NaiveDate>,
    pub discount: Option<DiscountInput>,
    pub initial_payment: Option<InitialPayment>,
    pub vat_override: Option<Decimal>,
    /// Narrow a city plan to a subset of its cities.
    pub coverage_cities: Option<Vec<String>>,
    pub actor_id: String,
}

/// Identifiers produced by subscription creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSubscription {
    pub subscription_id: String,
    pub invoice_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub subscription: Subscription,
}

/// Result of a lifecycle action: new status plus the effective dates.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub remaining_active_days: i64,
    pub total_paused_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<NaiveDate>,
}

impl TransitionOutcome {
    pub fn from_subscription(subscription: &Subscription, today: NaiveDate) -> Self {
        Self {
            subscription_id: subscription.subscription_id.clone(),
            status: subscription.status,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            remaining_active_days: subscription.remaining_days_on(today),
            total_paused_days: subscription.total_paused_days,
            actual_end_date: subscription.actual_end_date,
        }
    }
}

/// Grace period state returned by grace operations.
#[derive(Debug, Clone, Serialize)]
pub struct GraceState {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub is_in_grace_period: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_end_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
    pub total_grace_extensions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<NaiveDate>,
}

impl From<&Subscription> for GraceState {
    fn from(s: &Subscription) -> Self {
        Self {
            subscription_id: s.subscription_id.clone(),
            status: s.status,
            is_in_grace_period: s.is_in_grace_period,
            grace_period_end_date: s.grace_period_end_date,
            end_date: s.end_date,
            total_grace_extensions: s.total_grace_extensions,
            actual_end_date: s.actual_end_date,
        }
    }
}

/// Outcome of cancelling a subscription.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    /// Advisory prorated refund; no money is moved.
    pub suggested_refund: Decimal,
    pub remaining_days: i64,
    pub cancelled_invoice_ids: Vec<String>,
}
