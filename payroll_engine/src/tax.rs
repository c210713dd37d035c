//! Progressive income tax brackets.
//!
//! The `tax` module defines the bracket table used by the cumulative
//! withholding engine and the resolver that turns a taxable amount into
//! tax owed.  Tables are plain values supplied by policy; several tables
//! (one per tax year, say) can be in use at the same time.
//!
//! Tax is computed with the quick-deduction formula
//! `income * rate - quick_deduction` of the single bracket containing
//! the income.  For a well-formed table this is identical to summing the
//! marginal tax over every lower bracket; [`TaxBracketTable::validate`]
//! rejects tables for which it is not.

use crate::error::{PayrollError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Largest gap tolerated between the two sides of a bracket boundary.
const CONTINUITY_TOLERANCE: Decimal = dec!(0.01);

/// One bracket of a progressive tax table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracket {
    /// Inclusive lower bound.
    pub lower_bound: Decimal,
    /// Exclusive upper bound; `None` for the top bracket.
    #[serde(default)]
    pub upper_bound: Option<Decimal>,
    pub rate: Decimal,
    pub quick_deduction: Decimal,
}

impl TaxBracket {
    fn contains(&self, income: Decimal) -> bool {
        self.lower_bound <= income && self.upper_bound.map_or(true, |upper| income < upper)
    }

    /// Tax on `income` with this bracket's formula, before clamping.
    fn formula(&self, income: Decimal) -> Decimal {
        income * self.rate - self.quick_deduction
    }
}

/// Ordered, contiguous bracket table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxBracketTable {
    brackets: Vec<TaxBracket>,
}

impl TaxBracketTable {
    /// Wraps `brackets` after validating them.
    pub fn new(brackets: Vec<TaxBracket>) -> Result<Self> {
        let table = Self { brackets };
        table.validate()?;
        Ok(table)
    }

    /// Builds a table from `(lower_bound, rate)` pairs, deriving the
    /// quick-deduction constants so that tax is continuous at every
    /// boundary.  The first lower bound must be zero.
    pub fn from_marginal_rates(steps: &[(Decimal, Decimal)]) -> Result<Self> {
        let mut brackets: Vec<TaxBracket> = Vec::with_capacity(steps.len());
        for (i, &(lower, rate)) in steps.iter().enumerate() {
            let quick_deduction = match brackets.last() {
                Some(prev) => prev.quick_deduction + lower * (rate - prev.rate),
                None => Decimal::ZERO,
            };
            brackets.push(TaxBracket {
                lower_bound: lower,
                upper_bound: steps.get(i + 1).map(|&(next, _)| next),
                rate,
                quick_deduction,
            });
        }
        Self::new(brackets)
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    /// Checks the table's shape.
    ///
    /// The first bracket starts at zero, bounds are contiguous and
    /// strictly increasing, only the last bracket is unbounded, rates
    /// strictly increase within `[0, 1]`, and the quick-deduction
    /// constants keep tax continuous across each boundary.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PayrollError::InvalidBracketTable(msg));

        let Some(first) = self.brackets.first() else {
            return invalid("table has no brackets".into());
        };
        if !first.lower_bound.is_zero() {
            return invalid(format!("first bracket starts at {}, not 0", first.lower_bound));
        }
        // Continuity below only ties later constants to this one.
        if !first.quick_deduction.is_zero() {
            return invalid(format!(
                "first bracket has quick deduction {}, not 0",
                first.quick_deduction
            ));
        }
        for (i, bracket) in self.brackets.iter().enumerate() {
            if bracket.rate < Decimal::ZERO || bracket.rate > Decimal::ONE {
                return invalid(format!("bracket {i} has rate {} outside [0, 1]", bracket.rate));
            }
            if bracket.quick_deduction < Decimal::ZERO {
                return invalid(format!("bracket {i} has a negative quick deduction"));
            }
            let is_last = i + 1 == self.brackets.len();
            match (bracket.upper_bound, is_last) {
                (None, true) => {}
                (None, false) => return invalid(format!("bracket {i} is unbounded but not last")),
                (Some(_), true) => return invalid("last bracket must be unbounded".into()),
                (Some(upper), false) => {
                    if upper <= bracket.lower_bound {
                        return invalid(format!("bracket {i} is empty or inverted"));
                    }
                    let next = &self.brackets[i + 1];
                    if next.lower_bound != upper {
                        return invalid(format!(
                            "bracket {i} ends at {upper} but bracket {} starts at {}",
                            i + 1,
                            next.lower_bound
                        ));
                    }
                    if next.rate <= bracket.rate {
                        return invalid(format!("rates do not increase at bracket {}", i + 1));
                    }
                    let gap = (bracket.formula(upper) - next.formula(upper)).abs();
                    if gap > CONTINUITY_TOLERANCE {
                        return invalid(format!(
                            "tax jumps by {gap} at boundary {upper}; quick deduction of bracket {} is inconsistent",
                            i + 1
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Tax owed on `taxable_income` using the quick-deduction formula.
    pub fn resolve_tax(&self, taxable_income: Decimal) -> Result<Decimal> {
        resolve_tax(taxable_income, &self.brackets)
    }

    /// Tax owed on `taxable_income` by summing each bracket's slice.
    ///
    /// Slower than [`resolve_tax`](Self::resolve_tax); used to cross-check
    /// the quick-deduction constants.
    pub fn marginal_tax(&self, taxable_income: Decimal) -> Result<Decimal> {
        if taxable_income < Decimal::ZERO {
            return Err(PayrollError::NegativeTaxableIncome(taxable_income));
        }
        let mut tax = Decimal::ZERO;
        for bracket in &self.brackets {
            if taxable_income <= bracket.lower_bound {
                break;
            }
            let top = match bracket.upper_bound {
                Some(upper) => taxable_income.min(upper),
                None => taxable_income,
            };
            tax += (top - bracket.lower_bound) * bracket.rate;
        }
        Ok(tax)
    }
}

/// Finds the single bracket containing `taxable_income` and applies
/// `income * rate - quick_deduction`, floored at zero.
///
/// Negative income is an error rather than being clamped here, so that
/// every clamp happens visibly at the call site.
pub fn resolve_tax(taxable_income: Decimal, brackets: &[TaxBracket]) -> Result<Decimal> {
    if taxable_income < Decimal::ZERO {
        return Err(PayrollError::NegativeTaxableIncome(taxable_income));
    }
    let mut matching = brackets.iter().filter(|bracket| bracket.contains(taxable_income));
    let bracket = match (matching.next(), matching.next()) {
        (Some(bracket), None) => bracket,
        _ => return Err(PayrollError::NoMatchingBracket(taxable_income)),
    };
    Ok(bracket.formula(taxable_income).max(Decimal::ZERO))
}
