mod allocator;
mod engine;
mod error;
mod glide_path;
mod returns;
mod solver;
mod strategy;
mod tax;
mod types;

pub use allocator::{
    Lookahead, WithdrawalContext, allocate_with_ratio, allocate_withdrawal, optimal_pension_ratio,
};
pub use engine::{
    YearTracePoint, accumulate, evaluate_duration, evaluate_duration_until, expected_balances,
    expected_withdrawal_rate, simulate_path, trace_path,
};
pub use error::SolverError;
pub use glide_path::blended_mean;
pub use returns::{AssetAssumptions, ReturnGenerator};
pub use solver::{solve, validate_parameters};
pub use strategy::performance_ratio;
pub use tax::{income_tax, net_after_tax, personal_allowance};
pub use types::{
    AccountState, EvaluationResult, GlidePath, PathOutcome, PensionRules, SearchStep,
    SimulationParameters, SolveOutcome, SolverResult, SolverSettings, TaxSchedule,
    WithdrawalDecision, WithdrawalPolicy,
};
