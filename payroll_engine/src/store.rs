//! In-memory store for tax year states and committed payslips.
//!
//! The engine never persists anything; this store is the reference
//! collaborator the HTTP layer uses.  States are keyed by
//! `(employee_id, year)` and committed results by
//! `(employee_id, year, period_index)`.  A period is committed at most
//! once: processing it again returns the recorded result and leaves the
//! state alone, so a retried request cannot count a period twice.
//!
//! The store is not synchronised.  Callers serialise access (the API
//! wraps it in a mutex) so that computing a period and committing it
//! happen as one step.

use crate::engine::compute_payroll;
use crate::error::Result;
use crate::models::{PayrollPeriodInput, PayrollResult};
use crate::policy::PayrollPolicy;
use crate::withholding::{EmployeeTaxYearState, YearEndSummary};
use std::collections::HashMap;

type StateKey = (String, i32);
type PeriodKey = (String, i32, u32);

/// Whether a processed period was computed now or replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    Computed(PayrollResult),
    Replayed(PayrollResult),
}

impl Processed {
    pub fn result(&self) -> &PayrollResult {
        match self {
            Processed::Computed(result) | Processed::Replayed(result) => result,
        }
    }

    pub fn into_result(self) -> PayrollResult {
        match self {
            Processed::Computed(result) | Processed::Replayed(result) => result,
        }
    }
}

#[derive(Debug, Default)]
pub struct StateStore {
    states: HashMap<StateKey, EmployeeTaxYearState>,
    committed: HashMap<PeriodKey, PayrollResult>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, employee_id: &str, year: i32) -> Option<&EmployeeTaxYearState> {
        self.states.get(&(employee_id.to_string(), year))
    }

    pub fn committed(&self, employee_id: &str, year: i32, period_index: u32) -> Option<&PayrollResult> {
        self.committed.get(&(employee_id.to_string(), year, period_index))
    }

    /// Computes `input` against the stored state and commits the result
    /// and the new state together.  A period already committed is
    /// replayed.  On error nothing is written.
    pub fn process(&mut self, input: &PayrollPeriodInput, policy: &PayrollPolicy) -> Result<Processed> {
        if let Some(result) = self.committed(&input.employee_id, input.year, input.period_index) {
            tracing::info!(
                employee = %input.employee_id,
                year = input.year,
                period = input.period_index,
                "period already committed; replaying"
            );
            return Ok(Processed::Replayed(result.clone()));
        }
        let state = self
            .state(&input.employee_id, input.year)
            .cloned()
            .unwrap_or_else(|| EmployeeTaxYearState::new(input.employee_id.clone(), input.year));
        let (result, updated) = compute_payroll(input, policy, &state)?;
        self.committed.insert(
            (input.employee_id.clone(), input.year, input.period_index),
            result.clone(),
        );
        self.states
            .insert((updated.employee_id.clone(), updated.year), updated);
        Ok(Processed::Computed(result))
    }

    /// Closes a stored year.  `None` when the store has no state for it.
    pub fn close_year(
        &mut self,
        employee_id: &str,
        year: i32,
        policy: &PayrollPolicy,
    ) -> Result<Option<YearEndSummary>> {
        let key = (employee_id.to_string(), year);
        let Some(state) = self.states.get(&key) else {
            return Ok(None);
        };
        let (summary, closed) = state.close_year(&policy.tax_brackets)?;
        self.states.insert(key, closed);
        Ok(Some(summary))
    }
}
