//! Payroll policy: contribution items, tax brackets and thresholds.
//!
//! A policy is the complete set of statutory parameters for one region
//! and one tax year.  Policies are plain values handed to the engine on
//! every call, so several versions can be in use side by side.  They are
//! stored externally as versioned JSON files and loaded with
//! [`load_policies_from_dir`].

use crate::contribution::validate_item;
use crate::error::{PayrollError, Result};
use crate::models::ContributionItem;
use crate::tax::TaxBracketTable;
use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_periods_per_year() -> u32 {
    12
}

/// The statutory parameters for one region and tax year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollPolicy {
    /// A region code such as `"CN-BJ"`.
    pub region: String,
    /// Version string, e.g. `"2024"` or `"2024-07"`.
    pub version: String,
    /// Tax year this policy applies to.
    pub effective_year: i32,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: u32,
    /// Exempt amount accrued per elapsed period.
    pub monthly_threshold: Decimal,
    pub contribution_items: Vec<ContributionItem>,
    /// Annual table; the withholding engine compares year-to-date
    /// taxable income against it.
    pub tax_brackets: TaxBracketTable,
}

impl PayrollPolicy {
    /// The key this policy is registered under: `"{region}-{version}"`.
    pub fn id(&self) -> String {
        format!("{}-{}", self.region, self.version)
    }

    /// Parses and validates a policy document.
    pub fn from_json_str(data: &str) -> anyhow::Result<Self> {
        let policy: PayrollPolicy = serde_json::from_str(data).context("malformed policy document")?;
        policy
            .validate()
            .with_context(|| format!("policy {} failed validation", policy.id()))?;
        Ok(policy)
    }

    /// Checks every item and the bracket table.
    pub fn validate(&self) -> Result<()> {
        if self.periods_per_year == 0 {
            return Err(PayrollError::InvalidInput("periods_per_year must be positive".into()));
        }
        if self.monthly_threshold < Decimal::ZERO {
            return Err(PayrollError::NegativeRateOrBase {
                field: "monthly threshold".into(),
                value: self.monthly_threshold,
            });
        }
        let mut seen = HashSet::new();
        for item in &self.contribution_items {
            validate_item(item)?;
            if !seen.insert(item.id) {
                return Err(PayrollError::InvalidInput(format!(
                    "contribution item {} is listed twice",
                    item.id
                )));
            }
        }
        self.tax_brackets.validate()
    }
}

/// Load all policy documents from a directory.
///
/// Every `.json` file is parsed as a [`PayrollPolicy`] and validated.
/// Files that fail either step are logged and skipped so that one bad
/// document does not take every region down with it.
pub fn load_policies_from_dir(path: &Path) -> anyhow::Result<Vec<PayrollPolicy>> {
    let mut policies = Vec::new();
    if !path.is_dir() {
        tracing::warn!(path = %path.display(), "policy directory does not exist");
        return Ok(policies);
    }
    let entries = std::fs::read_dir(path)
        .with_context(|| format!("reading policy directory {}", path.display()))?;
    for entry in entries {
        let entry = entry?;
        let file = entry.path();
        if !entry.file_type()?.is_file() || file.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let data = std::fs::read_to_string(&file)
            .with_context(|| format!("reading policy file {}", file.display()))?;
        match PayrollPolicy::from_json_str(&data) {
            Ok(policy) => {
                tracing::info!(policy = %policy.id(), file = %file.display(), "loaded payroll policy");
                policies.push(policy);
            }
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %format!("{err:#}"), "skipping policy file");
            }
        }
    }
    Ok(policies)
}
