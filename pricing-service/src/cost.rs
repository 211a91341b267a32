//! Cost calculation engine.
//!
//! Pure evaluation of a plan's charges against measured usage. No I/O.

use crate::error::PricingError;
use crate::models::{Charge, ChargeKind, UsageMetrics};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Decimal places of the persisted and reported cost.
pub const COST_SCALE: u32 = 2;

/// Contribution of one charge to the total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeLine {
    pub kind: ChargeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<Decimal>,
    pub amount: Decimal,
}

/// Result of evaluating a plan: per-charge lines in plan order, the exact
/// subtotal, and the rounded total that gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub lines: Vec<ChargeLine>,
    pub subtotal: Decimal,
    pub total: Decimal,
}

/// Round half-up (away from zero) to [`COST_SCALE`] places.
pub fn round_cost(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Evaluate `charges` against `usage`.
///
/// Usage charges multiply the metric's quantity (zero when absent) by the
/// rate; fixed charges always add their amount. A line or subtotal that does
/// not fit in a [`Decimal`] is rejected as invalid usage.
pub fn compute_breakdown(
    charges: &[Charge],
    usage: &UsageMetrics,
) -> Result<CostBreakdown, PricingError> {
    let lines = charges
        .iter()
        .map(|charge| charge_line(charge, usage))
        .collect::<Result<Vec<_>, _>>()?;

    let subtotal = lines
        .iter()
        .try_fold(Decimal::ZERO, |acc, line| acc.checked_add(line.amount))
        .ok_or_else(|| PricingError::InvalidUsageMetrics("cost out of range".to_string()))?;

    Ok(CostBreakdown {
        lines,
        subtotal,
        total: round_cost(subtotal),
    })
}

fn charge_line(charge: &Charge, usage: &UsageMetrics) -> Result<ChargeLine, PricingError> {
    match charge {
        Charge::Usage { metric_name, rate } => {
            let quantity = usage.get(metric_name);
            let amount = quantity.checked_mul(*rate).ok_or_else(|| {
                PricingError::InvalidUsageMetrics(format!("cost of {} out of range", metric_name))
            })?;
            Ok(ChargeLine {
                kind: ChargeKind::Usage,
                metric_name: Some(metric_name.clone()),
                quantity: Some(quantity),
                rate: Some(*rate),
                amount,
            })
        }
        Charge::Fixed { amount } => Ok(ChargeLine {
            kind: ChargeKind::Fixed,
            metric_name: None,
            quantity: None,
            rate: None,
            amount: *amount,
        }),
    }
}

/// Total cost of `charges` for `usage`, rounded to [`COST_SCALE`] places.
pub fn compute_cost(charges: &[Charge], usage: &UsageMetrics) -> Result<Decimal, PricingError> {
    compute_breakdown(charges, usage).map(|breakdown| breakdown.total)
}
