use super::types::WithdrawalPolicy;

pub const GUARDRAIL_LOWER: f64 = 0.8;
pub const GUARDRAIL_UPPER: f64 = 1.2;
const GUARDRAIL_CUT: f64 = 0.9;
const GUARDRAIL_RAISE: f64 = 1.1;

const DISCRETIONARY_LOWER: f64 = 0.95;
const DISCRETIONARY_UPPER: f64 = 1.05;
const MAX_DISCRETIONARY_CUT: f64 = 0.5;
const MAX_DISCRETIONARY_RAISE: f64 = 0.3;

pub fn performance_ratio(current: f64, initial: f64, expected_rate: f64, elapsed_years: u32) -> f64 {
    if initial <= 0.0 {
        return 1.0;
    }
    let expected = initial * (1.0 + expected_rate).max(0.0).powi(elapsed_years as i32);
    if expected <= 0.0 {
        return 1.0;
    }
    (current.max(0.0) / expected).max(0.0)
}

impl WithdrawalPolicy {
    pub fn adjust(self, target: f64, ratio: f64, essential_ratio: f64) -> f64 {
        let target = target.max(0.0);
        match self {
            WithdrawalPolicy::Fixed | WithdrawalPolicy::CashBuffer => target,
            WithdrawalPolicy::Guardrails => {
                if ratio < GUARDRAIL_LOWER {
                    target * GUARDRAIL_CUT
                } else if ratio > GUARDRAIL_UPPER {
                    target * GUARDRAIL_RAISE
                } else {
                    target
                }
            }
            WithdrawalPolicy::EssentialDiscretionary => {
                let essential = target * essential_ratio.clamp(0.0, 1.0);
                let discretionary = target - essential;
                let discretionary = if ratio < DISCRETIONARY_LOWER {
                    discretionary * (1.0 - (1.0 - ratio).min(MAX_DISCRETIONARY_CUT))
                } else if ratio > DISCRETIONARY_UPPER {
                    discretionary * (1.0 + (ratio - 1.0).min(MAX_DISCRETIONARY_RAISE))
                } else {
                    discretionary
                };
                essential + discretionary
            }
        }
    }

    pub fn uses_cash_buffer(self) -> bool {
        self == WithdrawalPolicy::CashBuffer
    }
}
