//! Quantity reconciliation.
//!
//! Pure functions deriving shortage/overage, count variance and task
//! differences. Callers re-run them on every quantity change and store the
//! result only as a cache of the inputs.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Variance percentage above which a count row is flagged high severity.
pub const HIGH_SEVERITY_THRESHOLD_PCT: Decimal = dec!(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReceivingVariance {
    pub shortage: Decimal,
    pub overage: Decimal,
}

impl ReceivingVariance {
    pub fn is_exact(&self) -> bool {
        self.shortage.is_zero() && self.overage.is_zero()
    }
}

/// `shortage = max(expected - actual, 0)`, `overage = max(actual - expected, 0)`.
pub fn receiving_variance(expected: Decimal, actual: Decimal) -> ReceivingVariance {
    let diff = actual - expected;
    ReceivingVariance {
        shortage: (-diff).max(Decimal::ZERO),
        overage: diff.max(Decimal::ZERO),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum VarianceClass {
    Matched,
    Variance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum Severity {
    None,
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountVariance {
    pub variance_qty: Decimal,
    pub variance_pct: Decimal,
    pub variance_value: Decimal,
    pub class: VarianceClass,
    pub severity: Severity,
}

impl CountVariance {
    pub fn is_matched(&self) -> bool {
        self.class == VarianceClass::Matched
    }
}

/// Derives count variance from book and counted quantities.
///
/// A zero book quantity with a non-zero count reports 100%.
pub fn count_variance(book: Decimal, counted: Decimal, valuation_rate: Decimal) -> CountVariance {
    let variance_qty = counted - book;
    let variance_pct = if !book.is_zero() {
        variance_qty / book * dec!(100)
    } else if !variance_qty.is_zero() {
        dec!(100)
    } else {
        Decimal::ZERO
    };

    let (class, severity) = if variance_qty.is_zero() {
        (VarianceClass::Matched, Severity::None)
    } else if variance_pct.abs() > HIGH_SEVERITY_THRESHOLD_PCT {
        (VarianceClass::Variance, Severity::High)
    } else {
        (VarianceClass::Variance, Severity::Low)
    };

    CountVariance {
        variance_qty,
        variance_pct: variance_pct.normalize(),
        variance_value: variance_qty * valuation_rate,
        class,
        severity,
    }
}

/// `actual - required`.
pub fn task_difference(required: Decimal, actual: Decimal) -> Decimal {
    actual - required
}
