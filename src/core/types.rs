use std::time::Duration;

use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalPolicy {
    Fixed,
    Guardrails,
    CashBuffer,
    EssentialDiscretionary,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlidePath {
    pub enabled: bool,
    pub start_stock_allocation: f64,
    pub end_stock_allocation: f64,
    pub glide_years: f64,
    pub lead_years: f64,
}

impl Default for GlidePath {
    fn default() -> Self {
        Self {
            enabled: false,
            start_stock_allocation: 0.6,
            end_stock_allocation: 0.8,
            glide_years: 10.0,
            lead_years: 5.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSchedule {
    pub personal_allowance: f64,
    pub taper_threshold: f64,
    pub basic_band_width: f64,
    pub higher_band_limit: f64,
    pub basic_rate: f64,
    pub higher_rate: f64,
    pub additional_rate: f64,
}

impl Default for TaxSchedule {
    fn default() -> Self {
        Self {
            personal_allowance: 12_570.0,
            taper_threshold: 100_000.0,
            basic_band_width: 37_700.0,
            higher_band_limit: 125_140.0,
            basic_rate: 0.20,
            higher_rate: 0.40,
            additional_rate: 0.45,
        }
    }
}

impl TaxSchedule {
    pub fn indexed(&self, factor: f64) -> Self {
        let factor = factor.max(0.0);
        Self {
            personal_allowance: self.personal_allowance * factor,
            taper_threshold: self.taper_threshold * factor,
            basic_band_width: self.basic_band_width * factor,
            higher_band_limit: self.higher_band_limit * factor,
            ..*self
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PensionRules {
    pub pension_access_age: f64,
    pub state_pension_age: f64,
    pub state_pension_annual: f64,
    pub tax_free_fraction: f64,
    pub lifetime_tax_free_allowance: f64,
}

impl Default for PensionRules {
    fn default() -> Self {
        Self {
            pension_access_age: 57.0,
            state_pension_age: 67.0,
            state_pension_annual: 11_502.40,
            tax_free_fraction: 0.25,
            lifetime_tax_free_allowance: 268_275.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SolverSettings {
    pub terminal_age: f64,
    pub time_budget: Duration,
    pub withdrawal_tolerance: f64,
    pub safe_withdrawal_rate: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            terminal_age: 95.0,
            time_budget: Duration::from_secs(25),
            withdrawal_tolerance: 1.0,
            safe_withdrawal_rate: 0.04,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationParameters {
    pub pension_start: f64,
    pub isa_start: f64,
    pub pension_monthly_contribution: f64,
    pub isa_monthly_contribution: f64,
    pub stock_return_mean: f64,
    pub stock_return_vol: f64,
    pub bond_return_mean: f64,
    pub bond_return_vol: f64,
    pub target_monthly_income: f64,
    pub current_age: f64,
    pub success_target: f64,
    pub inflation_rate: f64,
    pub withdrawal_policy: WithdrawalPolicy,
    pub essential_ratio: f64,
    pub glide_path: GlidePath,
    pub optimize_split: bool,
    pub max_months: u32,
    pub base_simulations: u32,
    pub seed: Option<u64>,
    pub tax: TaxSchedule,
    pub pension_rules: PensionRules,
    pub settings: SolverSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccountState {
    pub pension: f64,
    pub isa: f64,
    pub allowance_used: f64,
    pub cash_buffer: f64,
}

impl AccountState {
    pub fn new(pension: f64, isa: f64) -> Self {
        Self {
            pension: pension.max(0.0),
            isa: isa.max(0.0),
            allowance_used: 0.0,
            cash_buffer: 0.0,
        }
    }

    pub fn invested(&self) -> f64 {
        self.pension + self.isa
    }

    pub fn apply_return(&mut self, rate: f64) {
        self.pension = (self.pension * (1.0 + rate)).max(0.0);
        self.isa = (self.isa * (1.0 + rate)).max(0.0);
    }

    pub fn apply_withdrawal(&mut self, decision: &WithdrawalDecision) {
        self.pension = (self.pension - decision.from_pension).max(0.0);
        self.isa = (self.isa - decision.from_isa).max(0.0);
        self.allowance_used = self.allowance_used.max(decision.allowance_used);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WithdrawalDecision {
    pub from_pension: f64,
    pub from_isa: f64,
    pub pension_tax_free: f64,
    pub state_pension_gross: f64,
    pub tax_paid: f64,
    pub net_income: f64,
    pub allowance_used: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PathOutcome {
    pub success: bool,
    pub pension_at_retirement: f64,
    pub isa_at_retirement: f64,
    pub years_survived: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub months: u32,
    pub success_rate: f64,
    pub expected_pension: f64,
    pub expected_isa: f64,
    pub expected_withdrawal_rate: f64,
    pub simulations_requested: u32,
    pub simulations_run: u32,
    pub stopped_early: bool,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum SolveOutcome {
    #[serde(rename_all = "camelCase")]
    Feasible {
        months: u32,
        pension_at_retirement: f64,
        isa_at_retirement: f64,
        success_rate: f64,
        converged: bool,
    },
    Infeasible,
    Aborted,
    ComputationError { reason: String },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStep {
    pub iteration: u32,
    pub lower_bound: u32,
    pub upper_bound: u32,
    pub candidate_months: u32,
    pub success_rate: f64,
    pub simulations_run: u32,
    pub expected_withdrawal_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverResult {
    pub outcome: SolveOutcome,
    pub iterations: Vec<SearchStep>,
    pub elapsed_ms: u64,
    // Seed the search ran with; drawn from the clock when none was given.
    pub base_seed: u64,
}

impl SolverResult {
    pub const INFEASIBLE: f64 = -1.0;
    pub const COMPUTATION_ERROR: f64 = -2.0;
    pub const ABORTED: f64 = -3.0;

    pub fn as_tuple(&self) -> (f64, f64, f64) {
        match &self.outcome {
            SolveOutcome::Feasible {
                months,
                pension_at_retirement,
                isa_at_retirement,
                ..
            } => (
                *months as f64 / 12.0,
                *pension_at_retirement,
                *isa_at_retirement,
            ),
            SolveOutcome::Infeasible => (Self::INFEASIBLE, 0.0, 0.0),
            SolveOutcome::ComputationError { .. } => (Self::COMPUTATION_ERROR, 0.0, 0.0),
            SolveOutcome::Aborted => (Self::ABORTED, 0.0, 0.0),
        }
    }

    pub fn months_needed(&self) -> Option<u32> {
        match self.outcome {
            SolveOutcome::Feasible { months, .. } => Some(months),
            _ => None,
        }
    }
}
