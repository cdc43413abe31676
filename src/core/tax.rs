use super::types::{AccountState, RateConfig};

/// Everything a single gross withdrawal resolves to. Produced by the pure
/// tax/fee functions below; the solver and the engine both consume it so the
/// split is never recomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WithdrawalBreakdown {
    pub gross: f64,
    pub net: f64,
    pub tax: f64,
    pub fee: f64,
    /// Gains share of the gross, proportional method.
    pub gains_portion: f64,
    /// Income tax offset by the annual allowance this withdrawal (AV only).
    pub allowance_used: f64,
}

/// CTO: transaction fee, then flat tax (PS + PFU income portion) on the gains
/// net of the fee. Pure; applying the result to the account is the engine's
/// job.
pub fn cto_withdrawal(gross: f64, state: &AccountState, config: &RateConfig) -> WithdrawalBreakdown {
    if gross <= 0.0 || state.balance <= 0.0 {
        return WithdrawalBreakdown::default();
    }

    let fee = (config.cto_fee_rate * gross).max(config.cto_min_fee);
    let gains_portion = gross * state.gains_fraction();
    let taxable_gains = (gains_portion - fee).max(0.0);
    let tax = taxable_gains * config.pfu_total();

    WithdrawalBreakdown {
        gross,
        net: gross - fee - tax,
        tax,
        fee,
        gains_portion,
        allowance_used: 0.0,
    }
}

/// AV (contract older than 8 years): gains split across the two premium
/// buckets by the basis-bucket fractions, income tax per bucket at the
/// low/high rate, allowance consumed against the low bucket's tax first.
/// Social contributions are due on the full gains portion regardless of the
/// allowance. No withdrawal fee.
pub fn av_withdrawal(gross: f64, state: &AccountState, config: &RateConfig) -> WithdrawalBreakdown {
    if gross <= 0.0 || state.balance <= 0.0 {
        return WithdrawalBreakdown::default();
    }

    let gains_portion = gross * state.gains_fraction();
    let gains_low = gains_portion * state.low_bucket_fraction;
    let gains_high = gains_portion * state.high_bucket_fraction;

    let income_low = gains_low * config.av_income_low;
    let income_high = gains_high * config.av_income_high;

    let mut remaining = state.allowance_remaining.max(0.0);
    let offset_low = income_low.min(remaining);
    remaining -= offset_low;
    let offset_high = income_high.min(remaining);

    let income_tax = (income_low - offset_low) + (income_high - offset_high);
    let social = gains_portion * config.ps_rate;
    let tax = income_tax + social;

    WithdrawalBreakdown {
        gross,
        net: gross - tax,
        tax,
        fee: 0.0,
        gains_portion,
        allowance_used: offset_low + offset_high,
    }
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

    fn state(balance: f64, basis: f64) -> AccountState {
        AccountState {
            balance,
            basis,
            low_bucket_fraction: 1.0,
            high_bucket_fraction: 0.0,
            allowance_remaining: 4_600.0,
            cumulative_net: 0.0,
            cumulative_tax: 0.0,
            cumulative_fees: 0.0,
        }
    }

    #[test]
    fn av_single_bucket_with_allowance_covering_income_tax() {
        // Basis 100k all below threshold, balance 150k, gross 6k: one third of
        // the withdrawal is gains. Income tax (2000 * 7.5% = 150) is fully
        // offset by the allowance; social contributions 2000 * 17.2% = 344
        // remain.
        let config = RateConfig::default();
        let state = state(150_000.0, 100_000.0);
        let out = av_withdrawal(6_000.0, &state, &config);
        assert_approx(out.gains_portion, 2_000.0);
        assert_approx(out.tax, 344.0);
        assert_approx(out.net, 5_656.0);
        assert_approx(out.allowance_used, 150.0);
        assert_approx(out.fee, 0.0);
    }

    #[test]
    fn av_mixed_buckets_with_couple_allowance() {
        // Basis 200k split 150k/50k, balance 300k, gross 15k, allowance 9200.
        // Gains 5000 split 3750/1250; both income-tax amounts are offset, only
        // social contributions (860) are due.
        let config = RateConfig::default();
        let state = AccountState {
            balance: 300_000.0,
            basis: 200_000.0,
            low_bucket_fraction: 0.75,
            high_bucket_fraction: 0.25,
            allowance_remaining: 9_200.0,
            cumulative_net: 0.0,
            cumulative_tax: 0.0,
            cumulative_fees: 0.0,
        };
        let out = av_withdrawal(15_000.0, &state, &config);
        assert_approx(out.gains_portion, 5_000.0);
        assert_approx(out.tax, 860.0);
        assert_approx(out.net, 14_140.0);
        assert_approx(out.allowance_used, 281.25 + 160.0);
    }

    #[test]
    fn av_allowance_exhaustion_spills_into_high_bucket() {
        let config = RateConfig::default();
        let mut state = AccountState {
            balance: 400_000.0,
            basis: 200_000.0,
            low_bucket_fraction: 0.75,
            high_bucket_fraction: 0.25,
            allowance_remaining: 100.0,
            cumulative_net: 0.0,
            cumulative_tax: 0.0,
            cumulative_fees: 0.0,
        };
        // Gains 10_000: income tax 7500 * 7.5% + 2500 * 12.8% = 562.5 + 320.
        let out = av_withdrawal(20_000.0, &state, &config);
        assert_approx(out.allowance_used, 100.0);
        assert_approx(out.tax, (562.5 - 100.0) + 320.0 + 10_000.0 * 0.172);

        // No allowance left at all.
        state.allowance_remaining = 0.0;
        let out = av_withdrawal(20_000.0, &state, &config);
        assert_approx(out.allowance_used, 0.0);
        assert_approx(out.tax, 562.5 + 320.0 + 1_720.0);
    }

    #[test]
    fn cto_fee_floor_and_flat_tax() {
        // Balance 60k, basis 50k, gross 1000, fee 0.1% with a 5 euro floor:
        // the floor binds, gains 166.67, taxable 161.67, tax 48.50.
        let config = RateConfig {
            cto_fee_rate: 0.001,
            cto_min_fee: 5.0,
            ..RateConfig::default()
        };
        let state = state(60_000.0, 50_000.0);
        let out = cto_withdrawal(1_000.0, &state, &config);
        assert_approx(out.fee, 5.0);
        assert!((out.tax - 48.5).abs() < 0.01);
        assert!((out.net - 946.5).abs() < 0.01);
    }

    #[test]
    fn cto_percentage_fee_dominates_for_large_withdrawals() {
        let config = RateConfig {
            cto_fee_rate: 0.001,
            cto_min_fee: 5.0,
            ..RateConfig::default()
        };
        let state = state(1_000_000.0, 1_000_000.0);
        let out = cto_withdrawal(100_000.0, &state, &config);
        assert_approx(out.fee, 100.0);
        // No gains, so the fee is the only deduction.
        assert_approx(out.tax, 0.0);
        assert_approx(out.net, 99_900.0);
    }

    #[test]
    fn cto_fee_shelters_small_gains_from_tax() {
        let config = RateConfig::default();
        let mut s = state(10_000.0, 9_999.0);
        s.allowance_remaining = 0.0;
        // Gains portion below the 3 euro minimum fee: nothing taxable.
        let out = cto_withdrawal(100.0, &s, &config);
        assert!(out.gains_portion < 3.0);
        assert_approx(out.tax, 0.0);
    }

    #[test]
    fn zero_gross_and_zero_balance_yield_zero_breakdown() {
        let config = RateConfig::default();
        let s = state(100_000.0, 50_000.0);
        assert_eq!(av_withdrawal(0.0, &s, &config), WithdrawalBreakdown::default());
        assert_eq!(cto_withdrawal(0.0, &s, &config), WithdrawalBreakdown::default());

        let empty = state(0.0, 0.0);
        assert_eq!(av_withdrawal(500.0, &empty, &config), WithdrawalBreakdown::default());
        assert_eq!(cto_withdrawal(500.0, &empty, &config), WithdrawalBreakdown::default());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_av_net_is_non_decreasing_in_gross(
            balance in 1_000u32..600_000,
            basis_pct in 0u32..101,
            allowance in 0u32..10_000,
            gross_a in 1u32..200_000,
            gross_b in 1u32..200_000
        ) {
            let config = RateConfig::default();
            let mut s = state(balance as f64, balance as f64 * basis_pct as f64 / 100.0);
            s.allowance_remaining = allowance as f64;

            let (lo, hi) = if gross_a <= gross_b {
                (gross_a as f64, gross_b as f64)
            } else {
                (gross_b as f64, gross_a as f64)
            };
            let net_lo = av_withdrawal(lo, &s, &config).net;
            let net_hi = av_withdrawal(hi, &s, &config).net;
            prop_assert!(net_lo <= net_hi + 1e-9);
        }

        #[test]
        fn prop_cto_net_is_non_decreasing_above_fee_floor(
            balance in 1_000u32..600_000,
            basis_pct in 0u32..101,
            gross_a in 100u32..200_000,
            gross_b in 100u32..200_000
        ) {
            let config = RateConfig::default();
            let s = state(balance as f64, balance as f64 * basis_pct as f64 / 100.0);

            let (lo, hi) = if gross_a <= gross_b {
                (gross_a as f64, gross_b as f64)
            } else {
                (gross_b as f64, gross_a as f64)
            };
            let net_lo = cto_withdrawal(lo, &s, &config).net;
            let net_hi = cto_withdrawal(hi, &s, &config).net;
            prop_assert!(net_lo <= net_hi + 1e-9);
        }

        #[test]
        fn prop_av_tax_never_exceeds_gross_and_allowance_use_is_bounded(
            balance in 1_000u32..600_000,
            basis_pct in 0u32..101,
            allowance in 0u32..10_000,
            gross in 1u32..200_000
        ) {
            let config = RateConfig::default();
            let mut s = state(balance as f64, balance as f64 * basis_pct as f64 / 100.0);
            s.allowance_remaining = allowance as f64;

            let out = av_withdrawal(gross as f64, &s, &config);
            prop_assert!(out.tax >= 0.0);
            prop_assert!(out.tax <= out.gross);
            prop_assert!(out.allowance_used <= s.allowance_remaining + 1e-9);
            prop_assert!(out.net <= out.gross);
        }
    }
}
