//! Payroll computation engine.
//!
//! The `engine` module turns one employee's [`PayrollPeriodInput`] into
//! a [`PayrollResult`]: gross pay, contribution lines, tax due and net
//! pay.  It is a pure function of the input, the policy and the prior
//! year state; the updated state is handed back for the caller to
//! persist together with the result.
//!
//! [`run_payroll`] runs many employees at once using [`rayon`].  That is
//! safe because employees share nothing; the same employee must not
//! appear twice in one run.

use crate::contribution::{compute_contributions_with_bases, resolve_item_base};
use crate::error::{PayrollError, Result};
use crate::models::{
    round_money, EmployeePayOutcome, EmployeePeriod, PayRunInput, PayRunResult, PayrollPeriodInput,
    PayrollResult,
};
use crate::policy::PayrollPolicy;
use crate::withholding::{compute_period_tax, EmployeeTaxYearState};
use rayon::prelude::*;
use std::collections::HashSet;

/// Computes one period for one employee.
///
/// Any failure aborts the whole computation; no partial result is ever
/// returned and `state` is left as it was.
pub fn compute_payroll(
    input: &PayrollPeriodInput,
    policy: &PayrollPolicy,
    state: &EmployeeTaxYearState,
) -> Result<(PayrollResult, EmployeeTaxYearState)> {
    if input.year != policy.effective_year {
        return Err(PayrollError::InvalidInput(format!(
            "policy {} applies to {}, not {}",
            policy.id(),
            policy.effective_year,
            input.year
        )));
    }
    if input.period_index == 0 || input.period_index > policy.periods_per_year {
        return Err(PayrollError::InvalidInput(format!(
            "period index {} outside 1..={}",
            input.period_index, policy.periods_per_year
        )));
    }
    state.check_accepts(input)?;
    input.check_amounts()?;

    let gross = input.gross_pay.total()?;
    let nominal_salary = input.contribution_salary.unwrap_or(gross);

    let based = policy
        .contribution_items
        .iter()
        .map(|item| resolve_item_base(nominal_salary, item).map(|base| (item, base)))
        .collect::<Result<Vec<_>>>()?;
    let contributions = compute_contributions_with_bases(based)?;

    let threshold = input.monthly_threshold.unwrap_or(policy.monthly_threshold);
    let (tax, updated) = compute_period_tax(
        state,
        input,
        contributions.employee_total,
        &policy.tax_brackets,
        threshold,
    )?;

    // Presentation amounts are rounded here and nowhere earlier; the
    // returned state keeps full precision.  Contribution lines and tax due
    // are already at the minor unit, so net pay is exact.
    let gross = round_money(gross);
    let net_pay = gross - contributions.employee_total - tax.tax_due;
    tracing::debug!(
        employee = %input.employee_id,
        year = input.year,
        period = input.period_index,
        %gross,
        tax_due = %tax.tax_due,
        %net_pay,
        "computed payroll period"
    );

    let result = PayrollResult {
        employee_id: input.employee_id.clone(),
        year: input.year,
        period_index: input.period_index,
        gross,
        social_insurance: contributions.social_insurance().cloned().collect(),
        housing_fund: contributions.housing_fund().cloned(),
        employee_contribution_total: contributions.employee_total,
        employer_contribution_total: contributions.employer_total,
        special_additional_deductions: round_money(input.special_additional_deductions),
        taxable_income_for_period: round_money(tax.taxable_income_for_period),
        cumulative_taxable_income: round_money(tax.cumulative_taxable_income),
        cumulative_tax_owed: round_money(tax.cumulative_tax_owed),
        tax_due: tax.tax_due,
        net_pay,
    };
    Ok((result, updated))
}

/// Computes a first period from an empty year state.
///
/// With no prior state this reduces to the flat single-month
/// calculation.  The input must be period 1.
pub fn compute_single_period(
    input: &PayrollPeriodInput,
    policy: &PayrollPolicy,
) -> Result<(PayrollResult, EmployeeTaxYearState)> {
    let state = EmployeeTaxYearState::new(input.employee_id.clone(), input.year);
    compute_payroll(input, policy, &state)
}

/// Runs a batch of employees in parallel against `policy`.
///
/// Each employee succeeds or fails on their own.  A second entry for an
/// employee already present in the batch fails without being computed.
pub fn run_payroll(input: PayRunInput, policy: &PayrollPolicy) -> PayRunResult {
    let mut seen = HashSet::new();
    let duplicate: Vec<bool> = input
        .employees
        .iter()
        .map(|entry| !seen.insert(entry.input.employee_id.clone()))
        .collect();

    let results: Vec<EmployeePayOutcome> = input
        .employees
        .into_par_iter()
        .zip(duplicate.into_par_iter())
        .map(|(entry, is_duplicate)| {
            if is_duplicate {
                return failed(&entry, "employee appears more than once in this run".into());
            }
            let state = entry
                .prior_state
                .clone()
                .unwrap_or_else(|| EmployeeTaxYearState::new(entry.input.employee_id.clone(), entry.input.year));
            match compute_payroll(&entry.input, policy, &state) {
                Ok((result, state)) => EmployeePayOutcome::Computed { result, state },
                Err(err) => {
                    tracing::warn!(employee = %entry.input.employee_id, error = %err, "payroll computation failed");
                    failed(&entry, err.to_string())
                }
            }
        })
        .collect();

    PayRunResult {
        policy_id: input.policy_id,
        results,
    }
}

fn failed(entry: &EmployeePeriod, error: String) -> EmployeePayOutcome {
    EmployeePayOutcome::Failed {
        employee_id: entry.input.employee_id.clone(),
        period_index: entry.input.period_index,
        error,
    }
}
