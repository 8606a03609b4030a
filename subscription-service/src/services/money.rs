//! Money calculator: discount and VAT arithmetic.
//!
//! These are the only functions allowed to derive money amounts. All results
//! are rounded to two decimal places, half away from zero.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::models::{DiscountType, PaymentStatus};

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Tolerance used when deciding whether a balance is fully paid.
pub fn paid_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Invalid discount: {0}")]
    InvalidDiscount(String),

    #[error("Invalid VAT percentage {0}: must be between 0 and 100")]
    InvalidVat(Decimal),

    #[error("{field} must not be negative (got {value})")]
    NegativeAmount { field: &'static str, value: Decimal },
}

/// Result of applying a discount to a base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountBreakdown {
    pub discount_value: Decimal,
    pub total_amount: Decimal,
}

/// Result of applying VAT to a subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VatBreakdown {
    pub vat_amount: Decimal,
    pub total_with_vat: Decimal,
}

/// Round to two decimal places, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn ensure_non_negative(field: &'static str, value: Decimal) -> Result<(), MoneyError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(MoneyError::NegativeAmount { field, value });
    }
    Ok(())
}

/// Apply a discount to `base_price`.
///
/// Percentage discounts above 100 and fixed discounts above the base price are
/// rejected, so the resulting total is never negative.
pub fn calculate_discount(
    base_price: Decimal,
    discount_type: DiscountType,
    amount: Decimal,
) -> Result<DiscountBreakdown, MoneyError> {
    ensure_non_negative("base_price", base_price)?;
    ensure_non_negative("discount", amount)?;

    let discount_value = match discount_type {
        DiscountType::Percentage => {
            if amount > ONE_HUNDRED {
                return Err(MoneyError::InvalidDiscount(format!(
                    "percentage {} exceeds 100",
                    amount
                )));
            }
            round2(base_price * amount / ONE_HUNDRED)
        }
        DiscountType::Amount => {
            if amount > base_price {
                return Err(MoneyError::InvalidDiscount(format!(
                    "amount {} exceeds base price {}",
                    amount, base_price
                )));
            }
            round2(amount)
        }
    };

    let total_amount = (round2(base_price) - discount_value).max(Decimal::ZERO);

    Ok(DiscountBreakdown {
        discount_value,
        total_amount,
    })
}

/// Apply a flat VAT percentage to `subtotal`.
pub fn calculate_vat(subtotal: Decimal, percentage: Decimal) -> Result<VatBreakdown, MoneyError> {
    ensure_non_negative("subtotal", subtotal)?;
    if percentage < Decimal::ZERO || percentage > ONE_HUNDRED {
        return Err(MoneyError::InvalidVat(percentage));
    }

    let vat_amount = round2(subtotal * percentage / ONE_HUNDRED);
    Ok(VatBreakdown {
        vat_amount,
        total_with_vat: subtotal + vat_amount,
    })
}

/// `max(0, total - paid)`.
pub fn remaining_balance(total: Decimal, paid: Decimal) -> Decimal {
    (total - paid).max(Decimal::ZERO)
}

/// Derive payment status from paid vs. total, treating anything within
/// [`paid_tolerance`] of the total as fully paid.
pub fn payment_status(total: Decimal, paid: Decimal) -> PaymentStatus {
    if paid > Decimal::ZERO && paid >= total - paid_tolerance() {
        PaymentStatus::Paid
    } else if total.is_zero() {
        PaymentStatus::Paid
    } else if paid > Decimal::ZERO {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}

/// Straight-line prorated refund for the unused part of a run.
pub fn prorated_refund(total: Decimal, planned_days: i64, remaining_days: i64) -> Decimal {
    if planned_days <= 0 {
        return Decimal::ZERO;
    }
    let daily_rate = total / Decimal::from(planned_days);
    round2(daily_rate * Decimal::from(remaining_days.max(0)))
}
