// src/costing.rs
//! Production cost breakdown by component.

use actix_web::{web, HttpRequest, HttpResponse};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use crate::auth::{require_permission, Permission};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CostComponent {
    #[validate(length(min = 1, max = 100, message = "Component name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(custom(function = "crate::validator::validate_non_negative"))]
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CostBreakdownRequest {
    #[validate(length(min = 1, message = "At least one cost component is required"), nested)]
    pub components: Vec<CostComponent>,
    /// Units produced; enables the per-unit cost.
    pub output_quantity: Option<Decimal>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CostLine {
    pub name: String,
    pub amount: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CostBreakdown {
    pub lines: Vec<CostLine>,
    pub total: Decimal,
    pub unit_cost: Option<Decimal>,
}

fn round_percent(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn cost_breakdown(components: &[CostComponent], output_quantity: Option<Decimal>) -> ApiResult<CostBreakdown> {
    let mut seen = HashSet::new();
    for component in components {
        let name = component.name.trim();
        if name.is_empty() {
            return Err(ApiError::ValidationError("Component name cannot be empty".to_string()));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(ApiError::ValidationError(format!("Duplicate cost component '{}'", name)));
        }
        if component.amount < Decimal::ZERO {
            return Err(ApiError::ValidationError(format!(
                "Amount for '{}' cannot be negative",
                name
            )));
        }
    }

    let total = components
        .iter()
        .try_fold(Decimal::ZERO, |acc, c| acc.checked_add(c.amount))
        .ok_or_else(|| ApiError::ValidationError("Total cost is out of range".to_string()))?;

    let lines = components
        .iter()
        .map(|c| CostLine {
            name: c.name.trim().to_string(),
            amount: c.amount,
            percentage: if total.is_zero() {
                Decimal::ZERO
            } else {
                round_percent(c.amount / total * Decimal::ONE_HUNDRED)
            },
        })
        .collect();

    let unit_cost = match output_quantity {
        Some(q) if q > Decimal::ZERO => {
            let unit = total
                .checked_div(q)
                .ok_or_else(|| ApiError::ValidationError("Unit cost is out of range".to_string()))?;
            Some(unit.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero))
        }
        Some(q) => {
            return Err(ApiError::ValidationError(format!(
                "Output quantity must be positive, got {}",
                q
            )))
        }
        None => None,
    };

    Ok(CostBreakdown {
        lines,
        total,
        unit_cost,
    })
}

pub async fn calculate_breakdown(
    body: web::Json<CostBreakdownRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Permission::ViewCosting)?;
    body.validate()?;

    let breakdown = cost_breakdown(&body.components, body.output_quantity)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(breakdown)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn component(name: &str, amount: Decimal) -> CostComponent {
        CostComponent {
            name: name.to_string(),
            amount,
        }
    }

    #[test]
    fn test_percentages_and_unit_cost() {
        let components = vec![
            component("API", dec!(600)),
            component("Excipients", dec!(150)),
            component("Packaging", dec!(250)),
        ];
        let breakdown = cost_breakdown(&components, Some(dec!(400))).unwrap();

        assert_eq!(breakdown.total, dec!(1000));
        let percentages: Vec<_> = breakdown.lines.iter().map(|l| l.percentage).collect();
        assert_eq!(percentages, vec![dec!(60), dec!(15), dec!(25)]);
        assert_eq!(breakdown.unit_cost, Some(dec!(2.5)));
    }

    #[test]
    fn test_rounding_to_two_places() {
        let components = vec![component("A", dec!(1)), component("B", dec!(2))];
        let breakdown = cost_breakdown(&components, Some(dec!(7))).unwrap();
        assert_eq!(breakdown.lines[0].percentage, dec!(33.33));
        assert_eq!(breakdown.lines[1].percentage, dec!(66.67));
        assert_eq!(breakdown.unit_cost, Some(dec!(0.4286)));
    }

    #[test]
    fn test_zero_total() {
        let components = vec![component("A", dec!(0)), component("B", dec!(0))];
        let breakdown = cost_breakdown(&components, None).unwrap();
        assert!(breakdown.lines.iter().all(|l| l.percentage.is_zero()));
        assert_eq!(breakdown.unit_cost, None);
    }

    #[test]
    fn test_invalid_components() {
        let duplicate = vec![component("Labour", dec!(1)), component("labour ", dec!(2))];
        assert!(cost_breakdown(&duplicate, None).is_err());

        let blank = vec![component("  ", dec!(1))];
        assert!(cost_breakdown(&blank, None).is_err());

        let negative = vec![component("Energy", dec!(-1))];
        assert!(cost_breakdown(&negative, None).is_err());

        let ok = vec![component("Energy", dec!(1))];
        assert!(cost_breakdown(&ok, Some(dec!(0))).is_err());
    }

    #[test]
    fn test_out_of_range_amounts_are_rejected() {
        let huge = vec![component("API", Decimal::MAX), component("Labour", dec!(1))];
        assert!(matches!(cost_breakdown(&huge, None), Err(ApiError::ValidationError(_))));

        let large = vec![component("API", Decimal::from_scientific("1e21").unwrap())];
        assert!(matches!(
            cost_breakdown(&large, Some(Decimal::from_scientific("1e-22").unwrap())),
            Err(ApiError::ValidationError(_))
        ));
    }
}
