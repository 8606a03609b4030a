//! Advertising plan model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Geographic reach bought by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCoverage {
    /// Visible everywhere in the kingdom.
    Kingdom,
    /// Visible only in the listed cities.
    City,
}

impl PlanCoverage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCoverage::Kingdom => "kingdom",
            PlanCoverage::City => "city",
        }
    }
}

/// Purchasable plan template.
///
/// Plans referenced by live subscriptions are never edited in place; they are
/// only soft-deactivated so historical subscriptions keep their terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub duration_days: i64,
    pub price: Decimal,
    pub coverage_type: PlanCoverage,
    #[serde(default)]
    pub coverage_cities: Vec<String>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a plan.
#[derive(Debug, Clone)]
pub struct CreatePlan {
    pub name: String,
    pub description: Option<String>,
    pub duration_days: i64,
    pub price: Decimal,
    pub coverage_type: PlanCoverage,
    pub coverage_cities: Vec<String>,
}
