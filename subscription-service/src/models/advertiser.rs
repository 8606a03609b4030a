//! Advertiser model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account status of an advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertiserStatus {
    Active,
    Inactive,
    Pending,
}

impl AdvertiserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvertiserStatus::Active => "active",
            AdvertiserStatus::Inactive => "inactive",
            AdvertiserStatus::Pending => "pending",
        }
    }
}

/// Customer tier, drives the default grace period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    #[default]
    New,
    Trusted,
    Vip,
}

impl CustomerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerType::New => "new",
            CustomerType::Trusted => "trusted",
            CustomerType::Vip => "vip",
        }
    }
}

/// Derived visibility scope of an advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageType {
    /// No active subscription, not publicly visible.
    #[default]
    None,
    Kingdom,
    City,
    Both,
}

impl CoverageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageType::None => "none",
            CoverageType::Kingdom => "kingdom",
            CoverageType::City => "city",
            CoverageType::Both => "both",
        }
    }
}

/// Advertiser document.
///
/// `coverage_type` and `coverage_cities` are a read model owned by the
/// coverage projector and are never accepted from request input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advertiser {
    pub advertiser_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: AdvertiserStatus,
    #[serde(default)]
    pub customer_type: CustomerType,
    #[serde(default)]
    pub vat_enabled: bool,
    #[serde(default)]
    pub vat_percentage: Decimal,
    #[serde(default)]
    pub coverage_type: CoverageType,
    #[serde(default)]
    pub coverage_cities: Vec<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Advertiser {
    /// VAT rate applied to new invoices, zero unless the advertiser opted in.
    pub fn effective_vat_percentage(&self) -> Decimal {
        if self.vat_enabled {
            self.vat_percentage
        } else {
            Decimal::ZERO
        }
    }
}

/// Input for creating an advertiser.
#[derive(Debug, Clone)]
pub struct CreateAdvertiser {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub customer_type: CustomerType,
    pub vat_enabled: bool,
    pub vat_percentage: Decimal,
}

/// Billing settings an admin may change on an existing advertiser.
#[derive(Debug, Clone, Default)]
pub struct UpdateBillingSettings {
    pub customer_type: Option<CustomerType>,
    pub vat_enabled: Option<bool>,
    pub vat_percentage: Option<Decimal>,
    pub status: Option<AdvertiserStatus>,
}
