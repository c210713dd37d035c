use payroll_engine::models::{GrossPayComponents, PayrollPeriodInput};
use payroll_engine::tax::TaxBracketTable;
use payroll_engine::withholding::compute_period_tax;
use payroll_engine::{compute_payroll, EmployeeTaxYearState, PayrollError, PayrollPolicy};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const POLICY: &str = include_str!("../policies/cn-2024.json");

fn policy() -> PayrollPolicy {
    PayrollPolicy::from_json_str(POLICY).unwrap()
}

fn brackets() -> TaxBracketTable {
    policy().tax_brackets
}

fn amount(max_cents: i64) -> impl Strategy<Value = Decimal> {
    (0..max_cents).prop_map(|cents| Decimal::new(cents, 2))
}

fn period(index: u32, gross: Decimal) -> PayrollPeriodInput {
    PayrollPeriodInput {
        employee_id: "E100".into(),
        year: 2024,
        period_index: index,
        gross_pay: GrossPayComponents::basic(gross),
        special_additional_deductions: Decimal::ZERO,
        contribution_salary: None,
        monthly_threshold: None,
    }
}

#[test]
fn test_tax_is_continuous_at_every_boundary() {
    let table = brackets();
    let epsilon = dec!(0.01);
    for bracket in &table.brackets()[1..] {
        let boundary = bracket.lower_bound;
        let below = table.resolve_tax(boundary - epsilon).unwrap();
        let at = table.resolve_tax(boundary).unwrap();
        assert!(at >= below);
        // only the marginal slope separates the two sides
        assert!(at - below <= epsilon * bracket.rate, "jump at {boundary}");
    }
}

#[test]
fn test_period_three_after_period_one_is_rejected() {
    let policy = policy();
    let state = EmployeeTaxYearState::new("E100", 2024);
    let (_, state) = compute_payroll(&period(1, dec!(15000)), &policy, &state).unwrap();
    assert_eq!(state.last_period_index, 1);
    let err = compute_payroll(&period(3, dec!(15000)), &policy, &state).unwrap_err();
    assert_eq!(err, PayrollError::OutOfSequencePeriod { expected: 2, got: 3 });
}

#[test]
fn test_full_year_matches_annual_tax() {
    let policy = policy();
    let mut state = EmployeeTaxYearState::new("E100", 2024);
    let mut withheld = Decimal::ZERO;
    for index in 1..=12 {
        let (result, next) = compute_payroll(&period(index, dec!(30000)), &policy, &state).unwrap();
        assert_eq!(result.net_pay, result.gross - result.employee_contribution_total - result.tax_due);
        withheld += result.tax_due;
        state = next;
    }
    let annual = policy.tax_brackets.resolve_tax(state.cumulative_taxable_income).unwrap();
    assert!((withheld - annual).abs() <= dec!(0.01));
    let (summary, _) = state.close_year(&policy.tax_brackets).unwrap();
    assert_eq!(summary.over_withheld, Decimal::ZERO);
    assert_eq!(summary.total_threshold, dec!(60000));
}

proptest! {
    #[test]
    fn prop_tax_is_monotonic(a in amount(200_000_000), b in amount(200_000_000)) {
        let table = brackets();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(table.resolve_tax(low).unwrap() <= table.resolve_tax(high).unwrap());
    }

    #[test]
    fn prop_quick_deduction_equals_marginal_sum(income in amount(200_000_000)) {
        let table = brackets();
        prop_assert_eq!(table.resolve_tax(income).unwrap(), table.marginal_tax(income).unwrap());
    }

    #[test]
    fn prop_cumulative_sum_matches_annual_tax(
        gross in amount(10_000_000),
        deduction_share in 0u32..=100,
    ) {
        let table = brackets();
        let threshold = dec!(5000);
        let statutory = (gross * Decimal::from(deduction_share) / dec!(400)).round_dp(2);

        let mut state = EmployeeTaxYearState::new("E100", 2024);
        let mut withheld = Decimal::ZERO;
        for index in 1..=12 {
            let (tax, next) =
                compute_period_tax(&state, &period(index, gross), statutory, &table, threshold).unwrap();
            prop_assert!(tax.tax_due >= Decimal::ZERO);
            withheld += tax.tax_due;
            state = next;
        }
        let annual_taxable = (dec!(12) * (gross - statutory - threshold)).max(Decimal::ZERO);
        let annual = table.resolve_tax(annual_taxable).unwrap();
        prop_assert!((withheld - annual).abs() <= dec!(0.005) * dec!(12));
    }

    #[test]
    fn prop_computation_is_pure(gross in amount(10_000_000), special in amount(500_000)) {
        let policy = policy();
        let state = EmployeeTaxYearState::new("E100", 2024);
        let mut input = period(1, gross);
        input.special_additional_deductions = special;
        let first = compute_payroll(&input, &policy, &state).unwrap();
        let second = compute_payroll(&input, &policy, &state).unwrap();
        prop_assert_eq!(first, second);
    }
}
