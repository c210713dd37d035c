//! Data models for the Payroll Engine.
//!
//! The `models` module defines the serialisable inputs and outputs of
//! a payroll computation: the statutory contribution items supplied by
//! policy, the per-period pay input for one employee, and the payslip
//! breakdown produced by the engine.  All amounts are [`Decimal`]s.

use crate::withholding::EmployeeTaxYearState;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places in the currency's minor unit.
pub const MONEY_DP: u32 = 2;

/// Rounds a monetary amount to the minor unit, half-up.
///
/// This is the single rounding rule of the engine.  It is applied to
/// each contribution line and to the tax committed for a period; every
/// other intermediate value stays unrounded.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// `a + b`, or `InvalidInput` naming `what` when the sum leaves the
/// decimal range.
pub(crate) fn checked_add(a: Decimal, b: Decimal, what: &str) -> crate::error::Result<Decimal> {
    a.checked_add(b).ok_or_else(|| overflow(what))
}

/// `a * b`, or `InvalidInput` naming `what` on overflow.
pub(crate) fn checked_mul(a: Decimal, b: Decimal, what: &str) -> crate::error::Result<Decimal> {
    a.checked_mul(b).ok_or_else(|| overflow(what))
}

fn overflow(what: &str) -> crate::error::PayrollError {
    crate::error::PayrollError::InvalidInput(format!("{what} exceeds the representable amount"))
}

/// Identifies a statutory contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContributionItemId {
    Pension,
    Medical,
    Unemployment,
    WorkInjury,
    Maternity,
    HousingFund,
}

impl ContributionItemId {
    /// The housing fund is reported separately from social insurance.
    pub fn is_housing_fund(self) -> bool {
        matches!(self, ContributionItemId::HousingFund)
    }
}

impl fmt::Display for ContributionItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContributionItemId::Pension => "pension",
            ContributionItemId::Medical => "medical",
            ContributionItemId::Unemployment => "unemployment",
            ContributionItemId::WorkInjury => "workInjury",
            ContributionItemId::Maternity => "maternity",
            ContributionItemId::HousingFund => "housingFund",
        };
        f.write_str(name)
    }
}

/// One statutory contribution as configured by policy.
///
/// Rates are fractions (`0.08` for 8%).  The floor and ceiling bound the
/// contribution base this item is charged on; different items may carry
/// different limits, e.g. the housing fund often has its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionItem {
    pub id: ContributionItemId,
    pub employee_rate: Decimal,
    pub employer_rate: Decimal,
    pub base_floor: Decimal,
    pub base_ceiling: Decimal,
}

/// A named extra earning, e.g. overtime or a one-off award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayItem {
    /// Human‑readable description of the item.
    pub description: String,
    /// Non-negative amount paid for this item.
    pub amount: Decimal,
}

/// The gross pay of one period, split by component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrossPayComponents {
    #[serde(default)]
    pub basic: Decimal,
    #[serde(default)]
    pub performance_bonus: Decimal,
    #[serde(default)]
    pub allowances: Decimal,
    #[serde(default)]
    pub subsidies: Decimal,
    /// Any further earnings.
    #[serde(default)]
    pub other: Vec<PayItem>,
}

impl GrossPayComponents {
    /// Salary-only components.
    pub fn basic(amount: Decimal) -> Self {
        Self {
            basic: amount,
            ..Self::default()
        }
    }

    /// Sum of all components.
    pub fn total(&self) -> crate::error::Result<Decimal> {
        [self.performance_bonus, self.allowances, self.subsidies]
            .into_iter()
            .chain(self.other.iter().map(|item| item.amount))
            .try_fold(self.basic, |sum, amount| checked_add(sum, amount, "gross pay"))
    }

    /// Returns the name of the first negative component, if any.
    pub(crate) fn first_negative(&self) -> Option<String> {
        let named = [
            ("basic", self.basic),
            ("performance_bonus", self.performance_bonus),
            ("allowances", self.allowances),
            ("subsidies", self.subsidies),
        ];
        named
            .iter()
            .find(|(_, amount)| *amount < Decimal::ZERO)
            .map(|(name, _)| (*name).to_string())
            .or_else(|| {
                self.other
                    .iter()
                    .find(|item| item.amount < Decimal::ZERO)
                    .map(|item| item.description.clone())
            })
    }
}

/// Pay data for one employee for one period of a tax year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollPeriodInput {
    pub employee_id: String,
    /// Tax year the period belongs to.
    pub year: i32,
    /// 1-based index of the period within the year.
    pub period_index: u32,
    pub gross_pay: GrossPayComponents,
    /// Dependent, education and similar deductions granted for this period.
    #[serde(default)]
    pub special_additional_deductions: Decimal,
    /// Declared salary used to derive the contribution base.  Falls back
    /// to the period's gross total.
    #[serde(default)]
    pub contribution_salary: Option<Decimal>,
    /// Overrides the policy's statutory monthly exempt amount.
    #[serde(default)]
    pub monthly_threshold: Option<Decimal>,
}

impl PayrollPeriodInput {
    /// Rejects negative amounts before any arithmetic happens.
    pub(crate) fn check_amounts(&self) -> crate::error::Result<()> {
        use crate::error::PayrollError;

        if let Some(name) = self.gross_pay.first_negative() {
            return Err(PayrollError::InvalidInput(format!(
                "gross pay component `{name}` is negative"
            )));
        }
        if self.special_additional_deductions < Decimal::ZERO {
            return Err(PayrollError::InvalidInput(
                "special additional deductions are negative".into(),
            ));
        }
        if let Some(salary) = self.contribution_salary {
            if salary < Decimal::ZERO {
                return Err(PayrollError::NegativeRateOrBase {
                    field: "contribution salary".into(),
                    value: salary,
                });
            }
        }
        if let Some(threshold) = self.monthly_threshold {
            if threshold < Decimal::ZERO {
                return Err(PayrollError::InvalidInput(
                    "monthly threshold is negative".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Employee and employer amounts for one contribution item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionLine {
    pub id: ContributionItemId,
    /// Base the rates were applied to, after floor/ceiling clamping.
    pub base: Decimal,
    pub employee: Decimal,
    pub employer: Decimal,
}

/// All contribution lines plus their totals.
///
/// Totals are sums of the already rounded lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionBreakdown {
    pub lines: Vec<ContributionLine>,
    pub employee_total: Decimal,
    pub employer_total: Decimal,
}

impl ContributionBreakdown {
    /// Lines that are social insurance (everything but the housing fund).
    pub fn social_insurance(&self) -> impl Iterator<Item = &ContributionLine> {
        self.lines.iter().filter(|line| !line.id.is_housing_fund())
    }

    /// The housing fund line, when the policy has one.
    pub fn housing_fund(&self) -> Option<&ContributionLine> {
        self.lines.iter().find(|line| line.id.is_housing_fund())
    }

    pub fn line(&self, id: ContributionItemId) -> Option<&ContributionLine> {
        self.lines.iter().find(|line| line.id == id)
    }
}

/// The payslip for one employee and one period.
///
/// `net_pay == gross - employee_contribution_total - tax_due` holds
/// exactly, since every term is already at the minor unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollResult {
    pub employee_id: String,
    pub year: i32,
    pub period_index: u32,
    pub gross: Decimal,
    pub social_insurance: Vec<ContributionLine>,
    pub housing_fund: Option<ContributionLine>,
    pub employee_contribution_total: Decimal,
    pub employer_contribution_total: Decimal,
    pub special_additional_deductions: Decimal,
    /// This period's gross less its own deductions and threshold,
    /// floored at zero.
    pub taxable_income_for_period: Decimal,
    /// Year-to-date taxable income the tax was resolved on.
    pub cumulative_taxable_income: Decimal,
    pub cumulative_tax_owed: Decimal,
    pub tax_due: Decimal,
    pub net_pay: Decimal,
}

/// One employee's period in a batch run, with the state it starts from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeePeriod {
    pub input: PayrollPeriodInput,
    /// Year state after the previous period; `None` for the first
    /// period of the year.
    #[serde(default)]
    pub prior_state: Option<EmployeeTaxYearState>,
}

/// Input to a batch payroll run.
///
/// All entries are computed against the same policy.  Each employee may
/// appear at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRunInput {
    /// Key of the policy to apply, `"{region}-{version}"`.
    pub policy_id: String,
    pub employees: Vec<EmployeePeriod>,
}

/// Outcome of one employee in a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmployeePayOutcome {
    Computed {
        result: PayrollResult,
        state: EmployeeTaxYearState,
    },
    Failed {
        employee_id: String,
        period_index: u32,
        error: String,
    },
}

/// The aggregate result of a batch payroll run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRunResult {
    pub policy_id: String,
    /// Outcomes in input order.
    pub results: Vec<EmployeePayOutcome>,
}
