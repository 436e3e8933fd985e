//! Lab orders
//!
//! Money is whole VND. The totals chain is fixed:
//! `subtotal = Σ line prices`, `total = subtotal − discount`,
//! `patient_owes = total − Σ coverage`.
//! Every step is checked; a chain that leaves `i64` has no totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{ValidationErrorCode, ValidationFailure, ValidationResult};

const TOTAL_TOO_LARGE: &str = "Order total is too large";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        matches!(
            (self, to),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Processing, OrderStatus::Cancelled)
        )
    }

    pub fn is_final(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// One test in the cart
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub test_code: String,
    pub test_name: String,
    pub price_vnd: i64,
}

/// Amount a payer (BHYT, private insurer) covers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub payer: String,
    pub amount_vnd: i64,
}

impl Coverage {
    /// Coverage of `percent` of `total_vnd`, rounded down to the dong.
    pub fn percent_of(payer: &str, percent: u8, total_vnd: i64) -> Self {
        let share = i128::from(total_vnd) * i128::from(percent.min(100)) / 100;
        Self {
            payer: payer.to_string(),
            // never larger in magnitude than total_vnd
            amount_vnd: share as i64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal_vnd: i64,
    pub total_amount_vnd: i64,
    pub covered_vnd: i64,
    pub patient_owes_vnd: i64,
}

impl OrderTotals {
    /// `None` when any step overflows.
    pub fn compute(lines: &[OrderLine], discount_vnd: i64, coverage: &[Coverage]) -> Option<Self> {
        let subtotal_vnd = lines
            .iter()
            .try_fold(0i64, |sum, l| sum.checked_add(l.price_vnd))?;
        let total_amount_vnd = subtotal_vnd.checked_sub(discount_vnd)?;
        let covered_vnd = coverage
            .iter()
            .try_fold(0i64, |sum, c| sum.checked_add(c.amount_vnd))?;
        Some(Self {
            subtotal_vnd,
            total_amount_vnd,
            covered_vnd,
            patient_owes_vnd: total_amount_vnd.checked_sub(covered_vnd)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub lines: Vec<OrderLine>,
    pub discount_vnd: i64,
    pub coverage: Vec<Coverage>,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require("patient_id", &self.patient_id, "Patient is required");
        if self.lines.is_empty() {
            result.add_error("lines", "Select at least one test", ValidationErrorCode::Required);
        }
        let mut seen = std::collections::HashSet::new();
        for line in &self.lines {
            if line.test_code.trim().is_empty() {
                result.add_error("lines", "Test code is required", ValidationErrorCode::Required);
            } else if !seen.insert(line.test_code.as_str()) {
                result.add_error(
                    "lines",
                    "The same test was ordered twice",
                    ValidationErrorCode::DuplicateValue,
                );
            }
            if line.price_vnd < 0 {
                result.add_error("lines", "Test price cannot be negative", ValidationErrorCode::OutOfRange);
            }
        }
        if self.discount_vnd < 0 {
            result.add_error("discount_vnd", "Discount cannot be negative", ValidationErrorCode::OutOfRange);
        }
        for cover in &self.coverage {
            result.require("coverage", &cover.payer, "Coverage payer is required");
            if cover.amount_vnd < 0 {
                result.add_error("coverage", "Coverage cannot be negative", ValidationErrorCode::OutOfRange);
            }
        }

        match self.totals() {
            None => result.add_error("lines", TOTAL_TOO_LARGE, ValidationErrorCode::OutOfRange),
            Some(totals) if totals.total_amount_vnd < 0 => result.add_error(
                "discount_vnd",
                "Discount cannot exceed the subtotal",
                ValidationErrorCode::OutOfRange,
            ),
            Some(totals) if totals.patient_owes_vnd < 0 => result.add_error(
                "coverage",
                "Coverage cannot exceed the order total",
                ValidationErrorCode::OutOfRange,
            ),
            Some(_) => {}
        }
        result
    }

    pub fn totals(&self) -> Option<OrderTotals> {
        OrderTotals::compute(&self.lines, self.discount_vnd, &self.coverage)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub lines: Vec<OrderLine>,
    pub subtotal_vnd: i64,
    pub discount_vnd: i64,
    pub total_amount_vnd: i64,
    pub coverage: Vec<Coverage>,
    pub patient_owes_vnd: i64,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Derived totals are always computed here, never taken from input.
    pub fn from_new(id: String, input: NewOrder, now: DateTime<Utc>) -> Result<Self, ValidationFailure> {
        let Some(totals) = input.totals() else {
            let mut result = ValidationResult::new();
            result.add_error("lines", TOTAL_TOO_LARGE, ValidationErrorCode::OutOfRange);
            return Err(ValidationFailure { errors: result.errors });
        };
        Ok(Self {
            id,
            patient_id: input.patient_id,
            visit_id: input.visit_id,
            lines: input.lines,
            subtotal_vnd: totals.subtotal_vnd,
            discount_vnd: input.discount_vnd,
            total_amount_vnd: totals.total_amount_vnd,
            coverage: input.coverage,
            patient_owes_vnd: totals.patient_owes_vnd,
            status: OrderStatus::Pending,
            notes: input
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn test_codes(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.test_code.as_str()).collect()
    }

    /// Stored totals agree with the lines, discount and coverage.
    pub fn validate_totals(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        let Some(expected) = OrderTotals::compute(&self.lines, self.discount_vnd, &self.coverage) else {
            result.add_error("subtotal_vnd", TOTAL_TOO_LARGE, ValidationErrorCode::OutOfRange);
            return result;
        };
        if self.subtotal_vnd != expected.subtotal_vnd {
            result.add_error("subtotal_vnd", "Subtotal does not match the ordered tests", ValidationErrorCode::InvalidReference);
        }
        if self.total_amount_vnd != expected.total_amount_vnd {
            result.add_error("total_amount_vnd", "Total does not match subtotal and discount", ValidationErrorCode::InvalidReference);
        }
        if self.patient_owes_vnd != expected.patient_owes_vnd {
            result.add_error(
                "patient_owes_vnd",
                "Patient balance must equal total minus coverage",
                ValidationErrorCode::InvalidReference,
            );
        }
        if self.patient_owes_vnd < 0 {
            result.add_error("patient_owes_vnd", "Patient balance cannot be negative", ValidationErrorCode::OutOfRange);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart() -> NewOrder {
        NewOrder {
            patient_id: "PAT-1".to_string(),
            visit_id: None,
            lines: vec![
                OrderLine {
                    test_code: "CBC".to_string(),
                    test_name: "Complete blood count".to_string(),
                    price_vnd: 120_000,
                },
                OrderLine {
                    test_code: "HBA1C".to_string(),
                    test_name: "HbA1c".to_string(),
                    price_vnd: 180_000,
                },
            ],
            discount_vnd: 0,
            coverage: vec![Coverage::percent_of("BHYT", 80, 300_000)],
            notes: None,
        }
    }

    #[test]
    fn test_patient_owes_derived() {
        let order = Order::from_new("ORD-1".to_string(), cart(), Utc::now()).unwrap();
        assert_eq!(order.subtotal_vnd, 300_000);
        assert_eq!(order.total_amount_vnd, 300_000);
        assert_eq!(order.patient_owes_vnd, 60_000);
        assert!(order.validate_totals().is_valid());
    }

    #[test]
    fn test_tampered_balance_detected() {
        let mut order = Order::from_new("ORD-1".to_string(), cart(), Utc::now()).unwrap();
        order.patient_owes_vnd = 0;
        assert!(order.validate_totals().has_error_for("patient_owes_vnd"));
    }

    #[test]
    fn test_over_coverage_rejected() {
        let mut input = cart();
        input.coverage.push(Coverage {
            payer: "Bao Viet".to_string(),
            amount_vnd: 100_000,
        });
        assert!(input.validate().has_error_for("coverage"));
    }

    #[test]
    fn test_empty_cart_rejected() {
        let mut input = cart();
        input.lines.clear();
        input.coverage.clear();
        assert!(input.validate().has_error_for("lines"));
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    fn priced(prices: &[i64]) -> NewOrder {
        let mut input = cart();
        input.coverage.clear();
        input.lines = prices
            .iter()
            .enumerate()
            .map(|(i, &price_vnd)| OrderLine {
                test_code: format!("T{}", i),
                test_name: format!("Test {}", i),
                price_vnd,
            })
            .collect();
        input
    }

    #[test]
    fn test_overflowing_subtotal_rejected() {
        let input = priced(&[i64::MAX, 1]);
        assert_eq!(input.totals(), None);
        let result = input.validate();
        assert!(result
            .errors
            .iter()
            .any(|e| e.field == "lines" && e.code == ValidationErrorCode::OutOfRange));
        assert!(Order::from_new("ORD-1".to_string(), input, Utc::now()).is_err());
    }

    #[test]
    fn test_wrapping_subtotal_not_accepted() {
        // Would wrap to a subtotal of 0
        let input = priced(&[i64::MAX, i64::MAX, 2]);
        assert!(input.validate().has_error_for("lines"));

        let mut input = cart();
        input.coverage = vec![
            Coverage { payer: "A".to_string(), amount_vnd: i64::MAX },
            Coverage { payer: "B".to_string(), amount_vnd: i64::MAX },
        ];
        assert_eq!(input.totals(), None);
        assert!(!input.validate().is_valid());
    }

    #[test]
    fn test_stored_order_with_overflowing_lines_invalid() {
        let mut order = Order::from_new("ORD-1".to_string(), cart(), Utc::now()).unwrap();
        order.lines[0].price_vnd = i64::MAX;
        let result = order.validate_totals();
        assert!(!result.is_valid());
        assert!(result.has_error_for("subtotal_vnd"));
    }

    #[test]
    fn test_percent_of_extreme_total() {
        assert_eq!(Coverage::percent_of("BHYT", 80, i64::MAX).amount_vnd, 7_378_697_629_483_820_645);
        assert_eq!(Coverage::percent_of("BHYT", 100, i64::MAX).amount_vnd, i64::MAX);
    }

    #[test]
    fn test_percent_coverage_rounds_down() {
        assert_eq!(Coverage::percent_of("BHYT", 95, 12_345).amount_vnd, 11_727);
    }
}
