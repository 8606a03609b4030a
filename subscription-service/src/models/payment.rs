//! Payment model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable payment record. Payments are only ever inserted, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: String,
    pub subscription_id: String,
    pub advertiser_id: String,
    #[serde(default)]
    pub invoice_id: Option<String>,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub recorded_by: String,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a payment against a subscription.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub subscription_id: String,
    pub amount: Decimal,
    pub invoice_id: Option<String>,
    pub payment_method: String,
    pub payment_date: Option<NaiveDate>,
    pub transaction_id: Option<String>,
    pub actor_id: String,
}
