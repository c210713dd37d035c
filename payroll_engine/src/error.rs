//! Error type for the payroll engine.
//!
//! Every failure the engine can produce is either a malformed policy
//! table, a malformed input, or misuse of the cumulative year state.
//! None of them are transient, so the engine never retries; errors are
//! returned to the caller unchanged.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors returned by the payroll computation components.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayrollError {
    /// A contribution base floor lies above its ceiling.
    #[error("invalid contribution base range: floor {floor} exceeds ceiling {ceiling}")]
    InvalidPolicyRange { floor: Decimal, ceiling: Decimal },

    /// A contribution rate, a base or a base limit is negative.
    #[error("negative {field}: {value}")]
    NegativeRateOrBase { field: String, value: Decimal },

    /// The tax resolver was handed a negative taxable income.  Callers
    /// clamp to zero themselves.
    #[error("taxable income must not be negative: {0}")]
    NegativeTaxableIncome(Decimal),

    /// No single bracket covers the taxable income (gap or overlap).
    #[error("no unique tax bracket matches taxable income {0}")]
    NoMatchingBracket(Decimal),

    /// The bracket table failed validation.
    #[error("invalid tax bracket table: {0}")]
    InvalidBracketTable(String),

    /// A period was fed out of order (skipped or reprocessed).
    #[error("out of sequence period: expected period {expected}, got {got}")]
    OutOfSequencePeriod { expected: u32, got: u32 },

    /// The year state is closed or belongs to a different tax year.
    #[error("stale year state: state is for {state_year} ({phase}), input is for {input_year}")]
    StaleYearState {
        state_year: i32,
        input_year: i32,
        phase: String,
    },

    /// Input data violates a basic precondition.
    #[error("invalid payroll input: {0}")]
    InvalidInput(String),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, PayrollError>;
