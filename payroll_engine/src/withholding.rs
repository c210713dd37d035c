//! Cumulative (year-to-date) income tax withholding.
//!
//! Tax on periodic wages is not computed period by period.  Instead the
//! amount withheld in period `n` is the tax owed on taxable income
//! accumulated from period 1 through `n`, less what periods `1..n-1`
//! already withheld.  [`EmployeeTaxYearState`] carries those running
//! totals for one employee and one tax year; [`compute_period_tax`]
//! advances it by exactly one period and never mutates its argument.
//!
//! State machine: `Uninitialized -> Active -> YearClosed`.  A closed year
//! accepts no more periods; [`EmployeeTaxYearState::next_year`] starts the
//! following year from zero.

use crate::error::{PayrollError, Result};
use crate::models::{checked_add, round_money, PayrollPeriodInput};
use crate::tax::TaxBracketTable;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a tax year state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearPhase {
    /// Created, no period committed yet.
    Uninitialized,
    /// At least one period committed.
    Active,
    /// Closed at year end; read-only.
    YearClosed,
}

impl fmt::Display for YearPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            YearPhase::Uninitialized => "uninitialized",
            YearPhase::Active => "active",
            YearPhase::YearClosed => "year closed",
        };
        f.write_str(name)
    }
}

/// Year-to-date totals for one employee and one tax year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeTaxYearState {
    pub employee_id: String,
    pub year: i32,
    pub phase: YearPhase,
    pub cumulative_gross_income: Decimal,
    /// Employee social insurance and housing fund contributions.
    pub cumulative_statutory_deductions: Decimal,
    pub cumulative_special_additional_deductions: Decimal,
    /// Sum of the exempt threshold over the elapsed periods, each period
    /// contributing the threshold that applied to it.
    pub cumulative_threshold: Decimal,
    /// Taxable income the last committed period was taxed on.
    pub cumulative_taxable_income: Decimal,
    pub cumulative_tax_withheld: Decimal,
    /// 0 before the first period.
    pub last_period_index: u32,
}

impl EmployeeTaxYearState {
    /// A fresh, uninitialized state for `employee_id` in `year`.
    pub fn new(employee_id: impl Into<String>, year: i32) -> Self {
        Self {
            employee_id: employee_id.into(),
            year,
            phase: YearPhase::Uninitialized,
            cumulative_gross_income: Decimal::ZERO,
            cumulative_statutory_deductions: Decimal::ZERO,
            cumulative_special_additional_deductions: Decimal::ZERO,
            cumulative_threshold: Decimal::ZERO,
            cumulative_taxable_income: Decimal::ZERO,
            cumulative_tax_withheld: Decimal::ZERO,
            last_period_index: 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.phase == YearPhase::YearClosed
    }

    /// Closes the year and reports its totals.
    ///
    /// Tax owed is re-resolved on the final cumulative taxable income so
    /// that any amount withheld beyond it (after a mid-year deduction
    /// increase) is visible.  No refund is computed.
    pub fn close_year(&self, brackets: &TaxBracketTable) -> Result<(YearEndSummary, Self)> {
        if self.is_closed() {
            return Err(self.stale(self.year));
        }
        let tax_owed = round_money(brackets.resolve_tax(self.cumulative_taxable_income)?);
        let summary = YearEndSummary {
            employee_id: self.employee_id.clone(),
            year: self.year,
            periods: self.last_period_index,
            total_gross_income: self.cumulative_gross_income,
            total_statutory_deductions: self.cumulative_statutory_deductions,
            total_special_additional_deductions: self.cumulative_special_additional_deductions,
            total_threshold: self.cumulative_threshold,
            taxable_income: self.cumulative_taxable_income,
            tax_owed,
            tax_withheld: self.cumulative_tax_withheld,
            over_withheld: (self.cumulative_tax_withheld - tax_owed).max(Decimal::ZERO),
        };
        let closed = Self {
            phase: YearPhase::YearClosed,
            ..self.clone()
        };
        Ok((summary, closed))
    }

    /// The state for the following year, starting from zero.
    pub fn next_year(&self) -> Result<Self> {
        if !self.is_closed() {
            return Err(PayrollError::InvalidInput(format!(
                "tax year {} for employee {} is still {}",
                self.year, self.employee_id, self.phase
            )));
        }
        Ok(Self::new(self.employee_id.clone(), self.year + 1))
    }

    fn stale(&self, input_year: i32) -> PayrollError {
        PayrollError::StaleYearState {
            state_year: self.year,
            input_year,
            phase: self.phase.to_string(),
        }
    }

    /// Checks that `input` is the next period this state may accept.
    pub fn check_accepts(&self, input: &PayrollPeriodInput) -> Result<()> {
        if self.is_closed() || input.year != self.year {
            return Err(self.stale(input.year));
        }
        if input.employee_id != self.employee_id {
            return Err(PayrollError::InvalidInput(format!(
                "state belongs to employee {}, input to {}",
                self.employee_id, input.employee_id
            )));
        }
        let Some(expected) = self.last_period_index.checked_add(1) else {
            return Err(PayrollError::InvalidInput(format!(
                "state for employee {} has no period after {}",
                self.employee_id, self.last_period_index
            )));
        };
        if input.period_index != expected {
            return Err(PayrollError::OutOfSequencePeriod {
                expected,
                got: input.period_index,
            });
        }
        Ok(())
    }
}

/// Year totals produced when a year is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearEndSummary {
    pub employee_id: String,
    pub year: i32,
    pub periods: u32,
    pub total_gross_income: Decimal,
    pub total_statutory_deductions: Decimal,
    pub total_special_additional_deductions: Decimal,
    pub total_threshold: Decimal,
    pub taxable_income: Decimal,
    pub tax_owed: Decimal,
    pub tax_withheld: Decimal,
    /// Withheld beyond what the year's income owes; informational only.
    pub over_withheld: Decimal,
}

/// Tax figures for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTax {
    /// This period's own income less its own deductions, floored at zero.
    pub taxable_income_for_period: Decimal,
    pub cumulative_taxable_income: Decimal,
    /// Unrounded tax owed on the cumulative taxable income.
    pub cumulative_tax_owed: Decimal,
    /// Tax to withhold this period, rounded to the minor unit.
    pub tax_due: Decimal,
}

/// Computes the tax due for `input` and the state after committing it.
///
/// `statutory_deductions` is this period's employee contribution total.
/// When the cumulative tax owed falls below what was already withheld
/// the period withholds nothing and the surplus stays in
/// `cumulative_tax_withheld`, to be absorbed by later periods.
pub fn compute_period_tax(
    state: &EmployeeTaxYearState,
    input: &PayrollPeriodInput,
    statutory_deductions: Decimal,
    brackets: &TaxBracketTable,
    monthly_threshold: Decimal,
) -> Result<(PeriodTax, EmployeeTaxYearState)> {
    state.check_accepts(input)?;
    input.check_amounts()?;
    if statutory_deductions < Decimal::ZERO {
        return Err(PayrollError::NegativeRateOrBase {
            field: "statutory deductions".into(),
            value: statutory_deductions,
        });
    }
    if monthly_threshold < Decimal::ZERO {
        return Err(PayrollError::InvalidInput("monthly threshold is negative".into()));
    }

    let period_gross = input.gross_pay.total()?;
    let period_special = input.special_additional_deductions;

    let cumulative_gross = checked_add(state.cumulative_gross_income, period_gross, "cumulative gross")?;
    let cumulative_statutory = checked_add(
        state.cumulative_statutory_deductions,
        statutory_deductions,
        "cumulative statutory deductions",
    )?;
    let cumulative_special = checked_add(
        state.cumulative_special_additional_deductions,
        period_special,
        "cumulative special deductions",
    )?;
    // Each period adds the threshold in force for it; earlier periods keep
    // theirs.
    let cumulative_threshold = checked_add(
        state.cumulative_threshold,
        monthly_threshold,
        "cumulative threshold",
    )?;

    let cumulative_deductions = checked_add(cumulative_statutory, cumulative_special, "cumulative deductions")
        .and_then(|sum| checked_add(sum, cumulative_threshold, "cumulative deductions"))?;
    let cumulative_taxable = (cumulative_gross - cumulative_deductions).max(Decimal::ZERO);
    let cumulative_tax_owed = brackets.resolve_tax(cumulative_taxable)?;

    let outstanding = cumulative_tax_owed - state.cumulative_tax_withheld;
    let tax_due = if outstanding < Decimal::ZERO {
        tracing::warn!(
            employee = %input.employee_id,
            year = input.year,
            period = input.period_index,
            deferred = %outstanding,
            "cumulative tax owed fell below tax withheld; deferring"
        );
        Decimal::ZERO
    } else {
        round_money(outstanding)
    };

    let period_deductions = checked_add(statutory_deductions, period_special, "period deductions")
        .and_then(|sum| checked_add(sum, monthly_threshold, "period deductions"))?;
    let period_taxable = (period_gross - period_deductions).max(Decimal::ZERO);

    let updated = EmployeeTaxYearState {
        employee_id: state.employee_id.clone(),
        year: state.year,
        phase: YearPhase::Active,
        cumulative_gross_income: cumulative_gross,
        cumulative_statutory_deductions: cumulative_statutory,
        cumulative_special_additional_deductions: cumulative_special,
        cumulative_threshold,
        cumulative_taxable_income: cumulative_taxable,
        cumulative_tax_withheld: checked_add(
            state.cumulative_tax_withheld,
            tax_due,
            "cumulative tax withheld",
        )?,
        last_period_index: input.period_index,
    };
    let period = PeriodTax {
        taxable_income_for_period: period_taxable,
        cumulative_taxable_income: cumulative_taxable,
        cumulative_tax_owed,
        tax_due,
    };
    Ok((period, updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GrossPayComponents;
    use rust_decimal_macros::dec;

    fn table() -> TaxBracketTable {
        TaxBracketTable::from_marginal_rates(&[
            (dec!(0), dec!(0.03)),
            (dec!(36000), dec!(0.10)),
            (dec!(144000), dec!(0.20)),
            (dec!(300000), dec!(0.25)),
            (dec!(420000), dec!(0.30)),
            (dec!(660000), dec!(0.35)),
            (dec!(960000), dec!(0.45)),
        ])
        .unwrap()
    }

    fn input(period: u32, gross: Decimal, special: Decimal) -> PayrollPeriodInput {
        PayrollPeriodInput {
            employee_id: "E001".into(),
            year: 2024,
            period_index: period,
            gross_pay: GrossPayComponents::basic(gross),
            special_additional_deductions: special,
            contribution_salary: None,
            monthly_threshold: None,
        }
    }

    #[test]
    fn test_first_period_matches_flat_calculation() {
        let state = EmployeeTaxYearState::new("E001", 2024);
        let (tax, next) =
            compute_period_tax(&state, &input(1, dec!(20500), dec!(0)), dec!(3075), &table(), dec!(5000))
                .unwrap();
        assert_eq!(tax.cumulative_taxable_income, dec!(12425));
        assert_eq!(tax.taxable_income_for_period, dec!(12425));
        assert_eq!(tax.tax_due, dec!(372.75));
        assert_eq!(next.phase, YearPhase::Active);
        assert_eq!(next.cumulative_tax_withheld, dec!(372.75));
        assert_eq!(next.last_period_index, 1);
        // the input state is untouched
        assert_eq!(state.last_period_index, 0);
    }

    #[test]
    fn test_cumulative_method_crosses_bracket_mid_year() {
        // 12425 taxable per month: periods 1-2 stay in the 3% bracket,
        // period 3 crosses 36000.
        let brackets = table();
        let mut state = EmployeeTaxYearState::new("E001", 2024);
        let mut dues = Vec::new();
        for period in 1..=3 {
            let (tax, next) = compute_period_tax(
                &state,
                &input(period, dec!(20500), dec!(0)),
                dec!(3075),
                &brackets,
                dec!(5000),
            )
            .unwrap();
            dues.push(tax.tax_due);
            state = next;
        }
        assert_eq!(dues, vec![dec!(372.75), dec!(372.75), dec!(462.00)]);
        // 37275 * 10% - 2520
        assert_eq!(state.cumulative_tax_withheld, dec!(1207.50));
    }

    #[test]
    fn test_negative_due_is_deferred() {
        let brackets = table();
        let state = EmployeeTaxYearState::new("E001", 2024);
        let (_, state) =
            compute_period_tax(&state, &input(1, dec!(20500), dec!(0)), dec!(3075), &brackets, dec!(5000))
                .unwrap();
        // a large back-dated special deduction in period 2
        let (tax, state) = compute_period_tax(
            &state,
            &input(2, dec!(20500), dec!(20000)),
            dec!(3075),
            &brackets,
            dec!(5000),
        )
        .unwrap();
        assert_eq!(tax.tax_due, dec!(0));
        assert_eq!(state.cumulative_tax_withheld, dec!(372.75));
        assert_eq!(tax.cumulative_tax_owed, dec!(145.50));

        // period 3 absorbs the surplus: owed 17275 * 3% = 518.25
        let (tax, state) =
            compute_period_tax(&state, &input(3, dec!(20500), dec!(0)), dec!(3075), &brackets, dec!(5000))
                .unwrap();
        assert_eq!(tax.tax_due, dec!(145.50));
        assert_eq!(state.cumulative_tax_withheld, dec!(518.25));
    }

    #[test]
    fn test_close_year_reports_over_withheld() {
        let brackets = table();
        let state = EmployeeTaxYearState::new("E001", 2024);
        let (_, state) =
            compute_period_tax(&state, &input(1, dec!(20500), dec!(0)), dec!(3075), &brackets, dec!(5000))
                .unwrap();
        let (_, state) = compute_period_tax(
            &state,
            &input(2, dec!(20500), dec!(20000)),
            dec!(3075),
            &brackets,
            dec!(5000),
        )
        .unwrap();
        let (summary, _) = state.close_year(&brackets).unwrap();
        assert_eq!(summary.tax_owed, dec!(145.50));
        assert_eq!(summary.tax_withheld, dec!(372.75));
        assert_eq!(summary.over_withheld, dec!(227.25));
    }

    #[test]
    fn test_income_below_threshold_owes_nothing() {
        let state = EmployeeTaxYearState::new("E001", 2024);
        let (tax, _) =
            compute_period_tax(&state, &input(1, dec!(4000), dec!(0)), dec!(400), &table(), dec!(5000)).unwrap();
        assert_eq!(tax.cumulative_taxable_income, dec!(0));
        assert_eq!(tax.tax_due, dec!(0));
    }

    #[test]
    fn test_skipped_period_is_out_of_sequence() {
        let state = EmployeeTaxYearState::new("E001", 2024);
        let (_, state) =
            compute_period_tax(&state, &input(1, dec!(10000), dec!(0)), dec!(0), &table(), dec!(5000)).unwrap();
        let err = compute_period_tax(&state, &input(3, dec!(10000), dec!(0)), dec!(0), &table(), dec!(5000))
            .unwrap_err();
        assert_eq!(err, PayrollError::OutOfSequencePeriod { expected: 2, got: 3 });
    }

    #[test]
    fn test_reprocessed_period_is_out_of_sequence() {
        let state = EmployeeTaxYearState::new("E001", 2024);
        let (_, state) =
            compute_period_tax(&state, &input(1, dec!(10000), dec!(0)), dec!(0), &table(), dec!(5000)).unwrap();
        let err = compute_period_tax(&state, &input(1, dec!(10000), dec!(0)), dec!(0), &table(), dec!(5000))
            .unwrap_err();
        assert!(matches!(err, PayrollError::OutOfSequencePeriod { expected: 2, got: 1 }));
    }

    #[test]
    fn test_closed_year_rejects_periods() {
        let state = EmployeeTaxYearState::new("E001", 2024);
        let (_, state) =
            compute_period_tax(&state, &input(1, dec!(10000), dec!(0)), dec!(0), &table(), dec!(5000)).unwrap();
        let (_, closed) = state.close_year(&table()).unwrap();
        let err = compute_period_tax(&closed, &input(2, dec!(10000), dec!(0)), dec!(0), &table(), dec!(5000))
            .unwrap_err();
        assert!(matches!(err, PayrollError::StaleYearState { state_year: 2024, .. }));
    }

    #[test]
    fn test_other_year_is_stale() {
        let state = EmployeeTaxYearState::new("E001", 2023);
        let err = compute_period_tax(&state, &input(1, dec!(10000), dec!(0)), dec!(0), &table(), dec!(5000))
            .unwrap_err();
        assert_eq!(
            err,
            PayrollError::StaleYearState {
                state_year: 2023,
                input_year: 2024,
                phase: "uninitialized".into()
            }
        );
    }

    #[test]
    fn test_close_and_open_next_year() {
        let brackets = table();
        let mut state = EmployeeTaxYearState::new("E001", 2024);
        assert!(state.next_year().is_err());
        for period in 1..=2 {
            state = compute_period_tax(&state, &input(period, dec!(20500), dec!(0)), dec!(3075), &brackets, dec!(5000))
                .unwrap()
                .1;
        }
        let (summary, closed) = state.close_year(&brackets).unwrap();
        assert_eq!(summary.periods, 2);
        assert_eq!(summary.taxable_income, dec!(24850));
        assert_eq!(summary.tax_owed, dec!(745.50));
        assert_eq!(summary.tax_withheld, dec!(745.50));
        assert_eq!(summary.over_withheld, dec!(0));
        assert!(closed.close_year(&brackets).is_err());

        let next = closed.next_year().unwrap();
        assert_eq!(next.year, 2025);
        assert_eq!(next.phase, YearPhase::Uninitialized);
        assert_eq!(next.cumulative_tax_withheld, dec!(0));
    }

    #[test]
    fn test_threshold_change_applies_from_its_period_on() {
        let brackets = table();
        let state = EmployeeTaxYearState::new("E001", 2024);
        let (_, state) =
            compute_period_tax(&state, &input(1, dec!(20500), dec!(0)), dec!(3075), &brackets, dec!(5000))
                .unwrap();
        let (tax, state) =
            compute_period_tax(&state, &input(2, dec!(20500), dec!(0)), dec!(3075), &brackets, dec!(6000))
                .unwrap();
        assert_eq!(state.cumulative_threshold, dec!(11000));
        // 41000 - 6150 - 11000
        assert_eq!(tax.cumulative_taxable_income, dec!(23850));
        assert_eq!(tax.taxable_income_for_period, dec!(11425));
    }

    #[test]
    fn test_exhausted_period_counter_is_rejected() {
        let mut state = EmployeeTaxYearState::new("E001", 2024);
        state.last_period_index = u32::MAX;
        let err = compute_period_tax(&state, &input(1, dec!(10000), dec!(0)), dec!(0), &table(), dec!(5000))
            .unwrap_err();
        assert!(matches!(err, PayrollError::InvalidInput(_)));
    }

    #[test]
    fn test_overflowing_amounts_are_rejected() {
        let state = EmployeeTaxYearState::new("E001", 2024);
        let mut period = input(1, Decimal::MAX, dec!(0));
        period.gross_pay.allowances = Decimal::MAX;
        let err = compute_period_tax(&state, &period, dec!(0), &table(), dec!(5000)).unwrap_err();
        assert!(matches!(err, PayrollError::InvalidInput(_)));

        let period = input(1, dec!(0), Decimal::MAX);
        let err = compute_period_tax(&state, &period, Decimal::MAX, &table(), dec!(5000)).unwrap_err();
        assert!(matches!(err, PayrollError::InvalidInput(_)));
    }

    #[test]
    fn test_wrong_employee_is_rejected() {
        let state = EmployeeTaxYearState::new("E002", 2024);
        let err = compute_period_tax(&state, &input(1, dec!(10000), dec!(0)), dec!(0), &table(), dec!(5000))
            .unwrap_err();
        assert!(matches!(err, PayrollError::InvalidInput(_)));
    }
}
