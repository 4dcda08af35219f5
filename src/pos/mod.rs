//! Payment splitting for the point-of-sale flow.
//!
//! All arithmetic is done in `Decimal`, rounded to 2 decimal places, and
//! compared with a 0.01 tolerance so a split never strands a sub-cent balance.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Rounding precision for monetary values.
pub const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01).
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Mobile,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Transfer => "TRANSFER",
            PaymentMethod::Mobile => "MOBILE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "CASH" => Some(PaymentMethod::Cash),
            "CARD" => Some(PaymentMethod::Card),
            "TRANSFER" => Some(PaymentMethod::Transfer),
            "MOBILE" => Some(PaymentMethod::Mobile),
            _ => None,
        }
    }
}

/// A payment as entered at the register, before validation.
#[derive(Debug, Clone)]
pub struct PaymentDraft {
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub tendered: Option<Decimal>,
    pub reference: Option<String>,
}

/// A validated payment with its derived fields filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPayment {
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub tendered: Option<Decimal>,
    pub change_given: Option<Decimal>,
    pub reference: Option<String>,
}

#[derive(Error, Debug, PartialEq)]
pub enum SplitError {
    #[error("payment amount must be positive")]
    NonPositiveAmount,
    #[error("payment of {amount} exceeds the outstanding balance of {balance}")]
    Overpayment { amount: Decimal, balance: Decimal },
    #[error("cash tendered must cover the payment amount")]
    InsufficientTendered,
    #[error("{method} payments require a reference")]
    MissingReference { method: &'static str },
    #[error("order is already settled")]
    AlreadySettled,
}

/// Half-up rounding to [`DECIMAL_PLACES`].
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Accumulates partial payments against an order total.
///
/// Invariants: `paid() <= total()` within [`MONEY_TOLERANCE`], and
/// `balance() == total() - paid()` clamped to zero.
#[derive(Debug, Clone)]
pub struct SplitRegister {
    total: Decimal,
    already_paid: Decimal,
    payments: Vec<AppliedPayment>,
}

impl SplitRegister {
    pub fn new(total: Decimal) -> Self {
        Self::with_paid(total, Decimal::ZERO)
    }

    /// Seeds the register from an order's stored `total` and `paid_amount`.
    pub fn with_paid(total: Decimal, already_paid: Decimal) -> Self {
        Self {
            total: round_money(total),
            already_paid: round_money(already_paid),
            payments: Vec::new(),
        }
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn paid(&self) -> Decimal {
        let added: Decimal = self.payments.iter().map(|payment| payment.amount).sum();
        round_money(self.already_paid + added)
    }

    pub fn balance(&self) -> Decimal {
        (self.total - self.paid()).max(Decimal::ZERO)
    }

    pub fn is_settled(&self) -> bool {
        self.balance() < MONEY_TOLERANCE
    }

    /// Amount covering `percent` of the outstanding balance, rounded to 2
    /// decimal places and clamped so it never overshoots the balance.
    pub fn quick_fill(&self, percent: u32) -> Decimal {
        let share = self.balance() * Decimal::from(percent) / Decimal::ONE_HUNDRED;
        round_money(share).min(self.balance())
    }

    /// Validates the draft against the outstanding balance and the method's
    /// required fields, then records it.
    pub fn add(&mut self, draft: PaymentDraft) -> Result<AppliedPayment, SplitError> {
        if self.is_settled() {
            return Err(SplitError::AlreadySettled);
        }

        let amount = round_money(draft.amount);
        if amount <= Decimal::ZERO {
            return Err(SplitError::NonPositiveAmount);
        }

        let balance = self.balance();
        if amount > balance + MONEY_TOLERANCE {
            return Err(SplitError::Overpayment { amount, balance });
        }

        let applied = match draft.method {
            PaymentMethod::Cash => {
                let tendered =
                    round_money(draft.tendered.ok_or(SplitError::InsufficientTendered)?);
                if tendered < amount {
                    return Err(SplitError::InsufficientTendered);
                }
                AppliedPayment {
                    method: draft.method,
                    amount,
                    tendered: Some(tendered),
                    change_given: Some(round_money(tendered - amount)),
                    reference: None,
                }
            }
            PaymentMethod::Card | PaymentMethod::Transfer | PaymentMethod::Mobile => {
                let reference = draft
                    .reference
                    .map(|reference| reference.trim().to_string())
                    .filter(|reference| !reference.is_empty())
                    .ok_or(SplitError::MissingReference {
                        method: draft.method.as_str(),
                    })?;
                AppliedPayment {
                    method: draft.method,
                    amount,
                    tendered: None,
                    change_given: None,
                    reference: Some(reference),
                }
            }
        };

        self.payments.push(applied.clone());
        Ok(applied)
    }

    pub fn remove(&mut self, index: usize) -> Option<AppliedPayment> {
        if index < self.payments.len() {
            Some(self.payments.remove(index))
        } else {
            None
        }
    }

    pub fn payments(&self) -> &[AppliedPayment] {
        &self.payments
    }
}

#[cfg(test)]
mod tests;
