//! Read models returned to callers.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{Invoice, Payment, Refund};

/// Aggregate money position of one advertiser.
#[derive(Debug, Clone, Serialize)]
pub struct FinancialSummary {
    pub advertiser_id: String,
    pub total_billed: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
    pub total_refunded: Decimal,
    pub subscription_count: usize,
    pub subscriptions_by_status: BTreeMap<String, usize>,
    pub invoices: Vec<Invoice>,
    pub payments: Vec<Payment>,
    pub refunds: Vec<Refund>,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: Vec<String>,
    pub grace_activated: Vec<String>,
    pub grace_ended: Vec<String>,
    pub failed: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
            && self.grace_activated.is_empty()
            && self.grace_ended.is_empty()
            && self.failed.is_empty()
    }
}
