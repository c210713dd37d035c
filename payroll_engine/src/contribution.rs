//! Contribution base resolution and statutory contribution amounts.
//!
//! Social insurance and housing fund contributions are charged on a
//! *contribution base*: the employee's declared salary clamped into the
//! floor/ceiling range set by policy.  Each item then applies its own
//! employee and employer rate to that base, rounding per item.

use crate::error::{PayrollError, Result};
use crate::models::{
    checked_add, checked_mul, round_money, ContributionBreakdown, ContributionItem, ContributionLine,
};
use rust_decimal::Decimal;

/// Clamps `nominal_salary` into `[floor, ceiling]`.
pub fn resolve_base(nominal_salary: Decimal, floor: Decimal, ceiling: Decimal) -> Result<Decimal> {
    if floor > ceiling {
        return Err(PayrollError::InvalidPolicyRange { floor, ceiling });
    }
    check_non_negative("base floor", floor)?;
    check_non_negative("nominal salary", nominal_salary)?;
    Ok(nominal_salary.max(floor).min(ceiling))
}

/// Resolves the base for one item from its own limits.
pub fn resolve_item_base(nominal_salary: Decimal, item: &ContributionItem) -> Result<Decimal> {
    resolve_base(nominal_salary, item.base_floor, item.base_ceiling)
}

/// Applies every item's rates to the same `base`.
pub fn compute_contributions(base: Decimal, items: &[ContributionItem]) -> Result<ContributionBreakdown> {
    compute_contributions_with_bases(items.iter().map(|item| (item, base)))
}

/// Applies each item's rates to the base paired with it.
///
/// Amounts are rounded per line; the totals are sums of rounded lines,
/// which is how payslip totals are reconciled.
pub fn compute_contributions_with_bases<'a, I>(items: I) -> Result<ContributionBreakdown>
where
    I: IntoIterator<Item = (&'a ContributionItem, Decimal)>,
{
    let mut breakdown = ContributionBreakdown::default();
    for (item, base) in items {
        check_non_negative("contribution base", base)?;
        check_non_negative(&format!("{} employee rate", item.id), item.employee_rate)?;
        check_non_negative(&format!("{} employer rate", item.id), item.employer_rate)?;

        let line = ContributionLine {
            id: item.id,
            base,
            employee: round_money(checked_mul(base, item.employee_rate, "contribution")?),
            employer: round_money(checked_mul(base, item.employer_rate, "contribution")?),
        };
        breakdown.employee_total = checked_add(breakdown.employee_total, line.employee, "contribution total")?;
        breakdown.employer_total = checked_add(breakdown.employer_total, line.employer, "contribution total")?;
        breakdown.lines.push(line);
    }
    Ok(breakdown)
}

/// Checks an item's own configuration, independent of any salary.
pub fn validate_item(item: &ContributionItem) -> Result<()> {
    check_non_negative(&format!("{} employee rate", item.id), item.employee_rate)?;
    check_non_negative(&format!("{} employer rate", item.id), item.employer_rate)?;
    check_non_negative(&format!("{} base floor", item.id), item.base_floor)?;
    if item.base_floor > item.base_ceiling {
        return Err(PayrollError::InvalidPolicyRange {
            floor: item.base_floor,
            ceiling: item.base_ceiling,
        });
    }
    Ok(())
}

fn check_non_negative(field: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO {
        return Err(PayrollError::NegativeRateOrBase {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}
