use super::types::TaxSchedule;

pub fn income_tax(gross_income: f64, schedule: &TaxSchedule) -> f64 {
    let gross = if gross_income.is_finite() {
        gross_income.max(0.0)
    } else {
        0.0
    };

    let allowance = personal_allowance(gross, schedule);
    let taxable_income = (gross - allowance).max(0.0);

    let basic_width = schedule.basic_band_width.max(0.0);
    let higher_limit = schedule.higher_band_limit.max(basic_width);

    let basic_taxable = taxable_income.min(basic_width);
    let higher_taxable = (taxable_income.min(higher_limit) - basic_width).max(0.0);
    let additional_taxable = (taxable_income - higher_limit).max(0.0);

    basic_taxable * schedule.basic_rate.clamp(0.0, 1.0)
        + higher_taxable * schedule.higher_rate.clamp(0.0, 1.0)
        + additional_taxable * schedule.additional_rate.clamp(0.0, 1.0)
}

pub fn personal_allowance(gross_income: f64, schedule: &TaxSchedule) -> f64 {
    let allowance = schedule.personal_allowance.max(0.0);
    let excess = (gross_income - schedule.taper_threshold.max(0.0)).max(0.0);
    (allowance - excess / 2.0).max(0.0)
}

pub fn net_after_tax(gross_income: f64, schedule: &TaxSchedule) -> f64 {
    let gross = gross_income.max(0.0);
    (gross - income_tax(gross, schedule)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn zero_income_and_allowance_are_untaxed() {
        let schedule = TaxSchedule::default();
        assert_approx(income_tax(0.0, &schedule), 0.0);
        assert_approx(income_tax(12_570.0, &schedule), 0.0);
    }

    #[test]
    fn basic_and_higher_bands_apply_progressively() {
        let schedule = TaxSchedule::default();
        // 37_700 at 20% + 9_730 at 40%.
        assert_approx(income_tax(60_000.0, &schedule), 11_432.0);
        assert_approx(income_tax(30_000.0, &schedule), 3_486.0);
    }

    #[test]
    fn allowance_tapers_to_zero() {
        let schedule = TaxSchedule::default();
        assert_approx(personal_allowance(100_000.0, &schedule), 12_570.0);
        assert_approx(personal_allowance(110_000.0, &schedule), 7_570.0);
        assert_approx(personal_allowance(125_140.0, &schedule), 0.0);
        assert_approx(personal_allowance(200_000.0, &schedule), 0.0);
    }

    #[test]
    fn additional_rate_applies_above_higher_limit() {
        let schedule = TaxSchedule::default();
        let expected =
            37_700.0 * 0.20 + (125_140.0 - 37_700.0) * 0.40 + (150_000.0 - 125_140.0) * 0.45;
        assert_approx(income_tax(150_000.0, &schedule), expected);
    }

    #[test]
    fn indexing_scales_thresholds_only() {
        let schedule = TaxSchedule::default().indexed(2.0);
        assert_approx(schedule.personal_allowance, 25_140.0);
        assert_approx(schedule.basic_rate, 0.20);
        assert_approx(
            income_tax(120_000.0, &schedule),
            2.0 * income_tax(60_000.0, &TaxSchedule::default()),
        );
    }

    #[test]
    fn non_finite_income_is_treated_as_zero() {
        let schedule = TaxSchedule::default();
        assert_approx(income_tax(f64::NAN, &schedule), 0.0);
        assert_approx(income_tax(-5_000.0, &schedule), 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(256))]

        #[test]
        fn prop_tax_is_non_decreasing(income in 0u32..400_000, step in 1u32..5_000) {
            let schedule = TaxSchedule::default();
            let low = income_tax(income as f64, &schedule);
            let high = income_tax((income + step) as f64, &schedule);
            prop_assert!(high + 1e-9 >= low);
        }

        #[test]
        fn prop_tax_is_continuous(income_cents in 0u64..40_000_000) {
            let schedule = TaxSchedule::default();
            let income = income_cents as f64 / 100.0;
            let here = income_tax(income, &schedule);
            let next = income_tax(income + 0.01, &schedule);
            // Steepest marginal rate is 60% inside the taper.
            prop_assert!((next - here).abs() <= 0.01 * 0.6 + 1e-9);
        }

        #[test]
        fn prop_net_never_exceeds_gross(income in 0u32..1_000_000) {
            let schedule = TaxSchedule::default();
            let net = net_after_tax(income as f64, &schedule);
            prop_assert!(net >= 0.0);
            prop_assert!(net <= income as f64 + 1e-9);
        }
    }
}
