use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use super::engine::evaluate_duration_until;
use super::error::SolverError;
use super::returns::splitmix64;
use super::types::{
    EvaluationResult, SearchStep, SimulationParameters, SolveOutcome, SolverResult,
};

pub const MAX_SEARCH_MONTHS: u32 = 1_200;
pub const MAX_SIMULATIONS: u32 = 1_000_000;

pub fn solve(params: &SimulationParameters) -> Result<SolverResult, SolverError> {
    validate_parameters(params)?;

    let started = Instant::now();
    let base_seed = params.seed.unwrap_or_else(clock_seed);
    info!(
        max_months = params.max_months,
        success_target = params.success_target,
        base_simulations = params.base_simulations,
        policy = ?params.withdrawal_policy,
        "starting duration search"
    );

    let mut iterations = Vec::new();
    let outcome = match search(params, base_seed, started, &mut iterations) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(%err, "duration search failed");
            SolveOutcome::ComputationError {
                reason: err.to_string(),
            }
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(?outcome, iterations = iterations.len(), elapsed_ms, "duration search finished");
    Ok(SolverResult {
        outcome,
        iterations,
        elapsed_ms,
        base_seed,
    })
}

fn search(
    params: &SimulationParameters,
    base_seed: u64,
    started: Instant,
    iterations: &mut Vec<SearchStep>,
) -> Result<SolveOutcome, SolverError> {
    // Durations ending at or past the terminal age have nothing to fund.
    let horizon = ((params.settings.terminal_age - params.current_age) * 12.0).floor() as u32;
    let mut lo = 0_u32;
    let mut hi = params.max_months.min(horizon.saturating_sub(1));
    let mut best: Option<EvaluationResult> = None;
    let mut iteration = 0_u32;
    // No deadline when the budget overflows the clock.
    let deadline = started.checked_add(params.settings.time_budget);
    let budget_exhausted = |best: Option<EvaluationResult>, lo: u32, hi: u32| {
        warn!(
            lower_bound = lo,
            upper_bound = hi,
            best_months = best.map(|b| b.months),
            "time budget exhausted before the search converged"
        );
        best.map_or(SolveOutcome::Aborted, |b| feasible(b, false))
    };

    while lo <= hi {
        if started.elapsed() >= params.settings.time_budget {
            return Ok(budget_exhausted(best, lo, hi));
        }

        iteration += 1;
        let mid = lo + (hi - lo) / 2;
        let eval = evaluate_duration_until(params, mid, base_seed, deadline)?;
        if !eval.success_rate.is_finite() {
            return Err(SolverError::Computation(format!(
                "success rate for {mid} months is not finite"
            )));
        }
        iterations.push(SearchStep {
            iteration,
            lower_bound: lo,
            upper_bound: hi,
            candidate_months: mid,
            success_rate: eval.success_rate,
            simulations_run: eval.simulations_run,
            expected_withdrawal_rate: eval.expected_withdrawal_rate,
        });
        if eval.timed_out {
            return Ok(budget_exhausted(best, lo, hi));
        }

        if eval.success_rate + 1e-12 >= params.success_target {
            best = Some(eval);
            if mid == 0 {
                break;
            }
            hi = mid - 1;
        } else {
            lo = mid + 1;
        }
    }

    Ok(best.map_or(SolveOutcome::Infeasible, |b| feasible(b, true)))
}

fn feasible(eval: EvaluationResult, converged: bool) -> SolveOutcome {
    SolveOutcome::Feasible {
        months: eval.months,
        pension_at_retirement: eval.expected_pension,
        isa_at_retirement: eval.expected_isa,
        success_rate: eval.success_rate,
        converged,
    }
}

fn clock_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5EED);
    splitmix64(nanos)
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), SolverError> {
    if !value.is_finite() || value < min || value > max {
        return Err(SolverError::invalid(
            field,
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), SolverError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SolverError::invalid(
            field,
            format!("must be a finite value >= 0, got {value}"),
        ));
    }
    Ok(())
}

pub fn validate_parameters(params: &SimulationParameters) -> Result<(), SolverError> {
    for (field, value) in [
        ("pension_start", params.pension_start),
        ("isa_start", params.isa_start),
        (
            "pension_monthly_contribution",
            params.pension_monthly_contribution,
        ),
        ("isa_monthly_contribution", params.isa_monthly_contribution),
    ] {
        check_non_negative(field, value)?;
    }

    if !params.target_monthly_income.is_finite() || params.target_monthly_income <= 0.0 {
        return Err(SolverError::invalid(
            "target_monthly_income",
            "must be a finite value > 0",
        ));
    }

    check_range("stock_return_mean", params.stock_return_mean, -0.5, 1.0)?;
    check_range("stock_return_vol", params.stock_return_vol, 0.0, 1.0)?;
    check_range("bond_return_mean", params.bond_return_mean, -0.5, 1.0)?;
    check_range("bond_return_vol", params.bond_return_vol, 0.0, 1.0)?;
    check_range("inflation_rate", params.inflation_rate, -0.05, 0.5)?;
    check_range("current_age", params.current_age, 18.0, 100.0)?;
    check_range("essential_ratio", params.essential_ratio, 0.0, 1.0)?;

    if !params.success_target.is_finite()
        || params.success_target <= 0.0
        || params.success_target > 1.0
    {
        return Err(SolverError::invalid(
            "success_target",
            "must be greater than 0 and at most 1",
        ));
    }

    if params.max_months == 0 || params.max_months > MAX_SEARCH_MONTHS {
        return Err(SolverError::invalid(
            "max_months",
            format!("must be between 1 and {MAX_SEARCH_MONTHS}"),
        ));
    }
    if params.base_simulations == 0 || params.base_simulations > MAX_SIMULATIONS {
        return Err(SolverError::invalid(
            "base_simulations",
            format!("must be between 1 and {MAX_SIMULATIONS}"),
        ));
    }

    let glide = &params.glide_path;
    if glide.enabled {
        check_range(
            "glide_path.start_stock_allocation",
            glide.start_stock_allocation,
            0.0,
            1.0,
        )?;
        check_range(
            "glide_path.end_stock_allocation",
            glide.end_stock_allocation,
            0.0,
            1.0,
        )?;
        check_range("glide_path.glide_years", glide.glide_years, 0.0, 60.0)?;
        check_range("glide_path.lead_years", glide.lead_years, 0.0, 40.0)?;
    }

    let tax = &params.tax;
    for (field, rate) in [
        ("tax.basic_rate", tax.basic_rate),
        ("tax.higher_rate", tax.higher_rate),
        ("tax.additional_rate", tax.additional_rate),
    ] {
        check_range(field, rate, 0.0, 1.0)?;
    }
    for (field, value) in [
        ("tax.personal_allowance", tax.personal_allowance),
        ("tax.taper_threshold", tax.taper_threshold),
        ("tax.basic_band_width", tax.basic_band_width),
        ("tax.higher_band_limit", tax.higher_band_limit),
    ] {
        check_non_negative(field, value)?;
    }
    if tax.higher_band_limit < tax.basic_band_width {
        return Err(SolverError::invalid(
            "tax.higher_band_limit",
            "must be >= tax.basic_band_width",
        ));
    }

    let rules = &params.pension_rules;
    check_range("pension_rules.pension_access_age", rules.pension_access_age, 0.0, 120.0)?;
    check_range("pension_rules.state_pension_age", rules.state_pension_age, 0.0, 120.0)?;
    check_non_negative("pension_rules.state_pension_annual", rules.state_pension_annual)?;
    check_range("pension_rules.tax_free_fraction", rules.tax_free_fraction, 0.0, 1.0)?;
    check_non_negative(
        "pension_rules.lifetime_tax_free_allowance",
        rules.lifetime_tax_free_allowance,
    )?;

    let settings = &params.settings;
    check_range("settings.terminal_age", settings.terminal_age, 0.0, 120.0)?;
    if params.current_age >= settings.terminal_age {
        return Err(SolverError::invalid(
            "current_age",
            "must be below settings.terminal_age",
        ));
    }
    check_non_negative("settings.withdrawal_tolerance", settings.withdrawal_tolerance)?;
    if !settings.safe_withdrawal_rate.is_finite()
        || settings.safe_withdrawal_rate <= 0.0
        || settings.safe_withdrawal_rate > 1.0
    {
        return Err(SolverError::invalid(
            "settings.safe_withdrawal_rate",
            "must be greater than 0 and at most 1",
        ));
    }

    Ok(())
}
