use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    GlidePath, PensionRules, SearchStep, SimulationParameters, SolveOutcome, SolverSettings,
    TaxSchedule, WithdrawalPolicy, YearTracePoint, solve, trace_path, validate_parameters,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalPolicy {
    Fixed,
    Guardrails,
    CashBuffer,
    EssentialDiscretionary,
}

impl From<CliWithdrawalPolicy> for WithdrawalPolicy {
    fn from(value: CliWithdrawalPolicy) -> Self {
        match value {
            CliWithdrawalPolicy::Fixed => WithdrawalPolicy::Fixed,
            CliWithdrawalPolicy::Guardrails => WithdrawalPolicy::Guardrails,
            CliWithdrawalPolicy::CashBuffer => WithdrawalPolicy::CashBuffer,
            CliWithdrawalPolicy::EssentialDiscretionary => WithdrawalPolicy::EssentialDiscretionary,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalPolicy {
    Fixed,
    Guardrails,
    #[serde(alias = "cashBuffer", alias = "cash_buffer")]
    CashBuffer,
    #[serde(alias = "essentialDiscretionary", alias = "essential_discretionary")]
    EssentialDiscretionary,
}

impl From<ApiWithdrawalPolicy> for CliWithdrawalPolicy {
    fn from(value: ApiWithdrawalPolicy) -> Self {
        match value {
            ApiWithdrawalPolicy::Fixed => CliWithdrawalPolicy::Fixed,
            ApiWithdrawalPolicy::Guardrails => CliWithdrawalPolicy::Guardrails,
            ApiWithdrawalPolicy::CashBuffer => CliWithdrawalPolicy::CashBuffer,
            ApiWithdrawalPolicy::EssentialDiscretionary => {
                CliWithdrawalPolicy::EssentialDiscretionary
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    current_age: Option<f64>,
    pension_access_age: Option<f64>,
    state_pension_age: Option<f64>,
    terminal_age: Option<f64>,

    pension_start: Option<f64>,
    isa_start: Option<f64>,
    pension_contribution: Option<f64>,
    isa_contribution: Option<f64>,

    stock_mean: Option<f64>,
    stock_vol: Option<f64>,
    bond_mean: Option<f64>,
    bond_vol: Option<f64>,
    inflation: Option<f64>,

    target_income: Option<f64>,
    success_target: Option<f64>,
    withdrawal_policy: Option<ApiWithdrawalPolicy>,
    essential_ratio: Option<f64>,
    optimize_split: Option<bool>,

    glide_path: Option<bool>,
    glide_start_stock: Option<f64>,
    glide_end_stock: Option<f64>,
    glide_years: Option<f64>,
    glide_lead_years: Option<f64>,

    uk_personal_allowance: Option<f64>,
    uk_taper_threshold: Option<f64>,
    uk_basic_band_width: Option<f64>,
    uk_higher_rate_limit: Option<f64>,
    uk_basic_rate: Option<f64>,
    uk_higher_rate: Option<f64>,
    uk_additional_rate: Option<f64>,
    state_pension_income: Option<f64>,
    tax_free_fraction: Option<f64>,
    tax_free_allowance: Option<f64>,

    max_months: Option<u32>,
    simulations: Option<u32>,
    seed: Option<u64>,
    time_budget_secs: Option<f64>,
}

#[derive(Parser, Debug)]
#[command(
    name = "fire-solver solve",
    about = "Monte Carlo search for the months of saving needed before retirement (pension + ISA)"
)]
struct Cli {
    #[arg(long)]
    current_age: f64,
    #[arg(long, default_value_t = 57.0)]
    pension_access_age: f64,
    #[arg(long, default_value_t = 67.0)]
    state_pension_age: f64,
    #[arg(long, default_value_t = 95.0, help = "Age the money must last until")]
    terminal_age: f64,
    #[arg(long)]
    pension_start: f64,
    #[arg(long)]
    isa_start: f64,
    #[arg(long, default_value_t = 0.0)]
    pension_monthly_contribution: f64,
    #[arg(long, default_value_t = 0.0)]
    isa_monthly_contribution: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected annual stock return in percent"
    )]
    stock_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 15.0,
        help = "Stock annual return volatility in percent"
    )]
    stock_return_volatility: f64,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Expected annual bond return in percent"
    )]
    bond_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Bond annual return volatility in percent"
    )]
    bond_return_volatility: f64,
    #[arg(long, default_value_t = 2.0, help = "Annual inflation in percent")]
    inflation_rate: f64,
    #[arg(long, help = "Net monthly income wanted in retirement, in today's money")]
    target_monthly_income: f64,
    #[arg(
        long,
        default_value_t = 90.0,
        help = "Required share of successful scenarios in percent"
    )]
    success_target: f64,
    #[arg(long, value_enum, default_value_t = CliWithdrawalPolicy::Fixed)]
    withdrawal_policy: CliWithdrawalPolicy,
    #[arg(
        long,
        default_value_t = 60.0,
        help = "Share of the target that is essential spending, in percent"
    )]
    essential_ratio: f64,
    #[arg(
        long,
        help = "Search the pension/ISA split each year instead of drawing the pension first"
    )]
    optimize_split: bool,
    #[arg(long, help = "Hold a bond tent around retirement")]
    glide_path: bool,
    #[arg(long, default_value_t = 60.0, help = "Stock share at retirement, in percent")]
    glide_start_stock: f64,
    #[arg(long, default_value_t = 80.0, help = "Stock share once the glide ends, in percent")]
    glide_end_stock: f64,
    #[arg(long, default_value_t = 10.0)]
    glide_years: f64,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Years before retirement that already hold the start mix"
    )]
    glide_lead_years: f64,
    #[arg(long, default_value_t = 12_570.0)]
    uk_personal_allowance: f64,
    #[arg(long, default_value_t = 100_000.0)]
    uk_taper_threshold: f64,
    #[arg(long, default_value_t = 37_700.0)]
    uk_basic_band_width: f64,
    #[arg(long, default_value_t = 125_140.0)]
    uk_higher_rate_limit: f64,
    #[arg(long, default_value_t = 20.0)]
    uk_basic_rate: f64,
    #[arg(long, default_value_t = 40.0)]
    uk_higher_rate: f64,
    #[arg(long, default_value_t = 45.0)]
    uk_additional_rate: f64,
    #[arg(long, default_value_t = 11_502.40)]
    state_pension_annual_income: f64,
    #[arg(
        long,
        default_value_t = 25.0,
        help = "Tax-free share of each pension draw, in percent"
    )]
    tax_free_fraction: f64,
    #[arg(long, default_value_t = 268_275.0)]
    lifetime_tax_free_allowance: f64,
    #[arg(long, default_value_t = 600)]
    max_months: u32,
    #[arg(long, default_value_t = 1_000)]
    simulations: u32,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 25.0)]
    time_budget_secs: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    years_needed: f64,
    pension_balance_at_retirement: f64,
    tax_free_balance_at_retirement: f64,
    outcome: SolveOutcome,
    withdrawal_policy: WithdrawalPolicy,
    success_target: f64,
    elapsed_ms: u64,
    seed: u64,
    iterations: Vec<SearchStep>,
    sample_path: Vec<YearTracePoint>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_params(cli: Cli) -> Result<SimulationParameters, String> {
    if !(0.0..=100.0).contains(&cli.success_target) {
        return Err("--success-target must be between 0 and 100".to_string());
    }

    if !(0.0..=100.0).contains(&cli.essential_ratio) {
        return Err("--essential-ratio must be between 0 and 100".to_string());
    }

    if cli.pension_access_age > cli.state_pension_age {
        return Err("--pension-access-age must be <= --state-pension-age".to_string());
    }

    if cli.uk_higher_rate_limit < cli.uk_personal_allowance + cli.uk_basic_band_width {
        return Err(
            "--uk-higher-rate-limit must be >= --uk-personal-allowance + --uk-basic-band-width"
                .to_string(),
        );
    }

    let time_budget = Duration::try_from_secs_f64(cli.time_budget_secs)
        .map_err(|_| "--time-budget-secs must be a finite value >= 0".to_string())?;

    let params = SimulationParameters {
        pension_start: cli.pension_start,
        isa_start: cli.isa_start,
        pension_monthly_contribution: cli.pension_monthly_contribution,
        isa_monthly_contribution: cli.isa_monthly_contribution,
        stock_return_mean: cli.stock_growth_rate / 100.0,
        stock_return_vol: cli.stock_return_volatility / 100.0,
        bond_return_mean: cli.bond_growth_rate / 100.0,
        bond_return_vol: cli.bond_return_volatility / 100.0,
        target_monthly_income: cli.target_monthly_income,
        current_age: cli.current_age,
        success_target: cli.success_target / 100.0,
        inflation_rate: cli.inflation_rate / 100.0,
        withdrawal_policy: cli.withdrawal_policy.into(),
        essential_ratio: cli.essential_ratio / 100.0,
        glide_path: GlidePath {
            enabled: cli.glide_path,
            start_stock_allocation: cli.glide_start_stock / 100.0,
            end_stock_allocation: cli.glide_end_stock / 100.0,
            glide_years: cli.glide_years,
            lead_years: cli.glide_lead_years,
        },
        optimize_split: cli.optimize_split,
        max_months: cli.max_months,
        base_simulations: cli.simulations,
        seed: cli.seed,
        tax: TaxSchedule {
            personal_allowance: cli.uk_personal_allowance,
            taper_threshold: cli.uk_taper_threshold,
            basic_band_width: cli.uk_basic_band_width,
            higher_band_limit: cli.uk_higher_rate_limit,
            basic_rate: cli.uk_basic_rate / 100.0,
            higher_rate: cli.uk_higher_rate / 100.0,
            additional_rate: cli.uk_additional_rate / 100.0,
        },
        pension_rules: PensionRules {
            pension_access_age: cli.pension_access_age,
            state_pension_age: cli.state_pension_age,
            state_pension_annual: cli.state_pension_annual_income,
            tax_free_fraction: cli.tax_free_fraction / 100.0,
            lifetime_tax_free_allowance: cli.lifetime_tax_free_allowance,
        },
        settings: SolverSettings {
            terminal_age: cli.terminal_age,
            time_budget,
            ..SolverSettings::default()
        },
    };

    validate_parameters(&params).map_err(|e| e.to_string())?;
    Ok(params)
}

pub fn run_cli<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let params = build_params(Cli::parse_from(args))?;
    let response = build_solve_response(&params)?;
    let json = serde_json::to_string_pretty(&response)
        .map_err(|e| format!("Failed to encode response: {e}"))?;
    println!("{json}");
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/solve", get(solve_get_handler).post(solve_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "solver HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn solve_get_handler(Query(payload): Query<SolvePayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn solve_post_handler(Json(payload): Json<SolvePayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn solve_handler_impl(payload: SolvePayload) -> Response {
    let params = match params_from_payload(payload) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match tokio::task::spawn_blocking(move || build_solve_response(&params)).await {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(err) => {
            error!(%err, "solver task did not complete");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Solver task failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn params_from_json(json: &str) -> Result<SimulationParameters, String> {
    let payload = serde_json::from_str::<SolvePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    params_from_payload(payload)
}

fn params_from_payload(payload: SolvePayload) -> Result<SimulationParameters, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.pension_access_age {
        cli.pension_access_age = v;
    }
    if let Some(v) = payload.state_pension_age {
        cli.state_pension_age = v;
    }
    if let Some(v) = payload.terminal_age {
        cli.terminal_age = v;
    }

    if let Some(v) = payload.pension_start {
        cli.pension_start = v;
    }
    if let Some(v) = payload.isa_start {
        cli.isa_start = v;
    }
    if let Some(v) = payload.pension_contribution {
        cli.pension_monthly_contribution = v;
    }
    if let Some(v) = payload.isa_contribution {
        cli.isa_monthly_contribution = v;
    }

    if let Some(v) = payload.stock_mean {
        cli.stock_growth_rate = v;
    }
    if let Some(v) = payload.stock_vol {
        cli.stock_return_volatility = v;
    }
    if let Some(v) = payload.bond_mean {
        cli.bond_growth_rate = v;
    }
    if let Some(v) = payload.bond_vol {
        cli.bond_return_volatility = v;
    }
    if let Some(v) = payload.inflation {
        cli.inflation_rate = v;
    }

    if let Some(v) = payload.target_income {
        cli.target_monthly_income = v;
    }
    if let Some(v) = payload.success_target {
        cli.success_target = v;
    }
    if let Some(v) = payload.withdrawal_policy {
        cli.withdrawal_policy = v.into();
    }
    if let Some(v) = payload.essential_ratio {
        cli.essential_ratio = v;
    }
    if let Some(v) = payload.optimize_split {
        cli.optimize_split = v;
    }

    if let Some(v) = payload.glide_path {
        cli.glide_path = v;
    }
    if let Some(v) = payload.glide_start_stock {
        cli.glide_start_stock = v;
    }
    if let Some(v) = payload.glide_end_stock {
        cli.glide_end_stock = v;
    }
    if let Some(v) = payload.glide_years {
        cli.glide_years = v;
    }
    if let Some(v) = payload.glide_lead_years {
        cli.glide_lead_years = v;
    }

    if let Some(v) = payload.uk_personal_allowance {
        cli.uk_personal_allowance = v;
    }
    if let Some(v) = payload.uk_taper_threshold {
        cli.uk_taper_threshold = v;
    }
    if let Some(v) = payload.uk_basic_band_width {
        cli.uk_basic_band_width = v;
    }
    if let Some(v) = payload.uk_higher_rate_limit {
        cli.uk_higher_rate_limit = v;
    }
    if let Some(v) = payload.uk_basic_rate {
        cli.uk_basic_rate = v;
    }
    if let Some(v) = payload.uk_higher_rate {
        cli.uk_higher_rate = v;
    }
    if let Some(v) = payload.uk_additional_rate {
        cli.uk_additional_rate = v;
    }
    if let Some(v) = payload.state_pension_income {
        cli.state_pension_annual_income = v;
    }
    if let Some(v) = payload.tax_free_fraction {
        cli.tax_free_fraction = v;
    }
    if let Some(v) = payload.tax_free_allowance {
        cli.lifetime_tax_free_allowance = v;
    }

    if let Some(v) = payload.max_months {
        cli.max_months = v;
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if payload.seed.is_some() {
        cli.seed = payload.seed;
    }
    if let Some(v) = payload.time_budget_secs {
        cli.time_budget_secs = v;
    }

    build_params(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 35.0,
        pension_access_age: 57.0,
        state_pension_age: 67.0,
        terminal_age: 95.0,
        pension_start: 100_000.0,
        isa_start: 50_000.0,
        pension_monthly_contribution: 1_000.0,
        isa_monthly_contribution: 500.0,
        stock_growth_rate: 7.0,
        stock_return_volatility: 15.0,
        bond_growth_rate: 3.0,
        bond_return_volatility: 5.0,
        inflation_rate: 2.0,
        target_monthly_income: 2_500.0,
        success_target: 90.0,
        withdrawal_policy: CliWithdrawalPolicy::Fixed,
        essential_ratio: 60.0,
        optimize_split: false,
        glide_path: false,
        glide_start_stock: 60.0,
        glide_end_stock: 80.0,
        glide_years: 10.0,
        glide_lead_years: 5.0,
        uk_personal_allowance: 12_570.0,
        uk_taper_threshold: 100_000.0,
        uk_basic_band_width: 37_700.0,
        uk_higher_rate_limit: 125_140.0,
        uk_basic_rate: 20.0,
        uk_higher_rate: 40.0,
        uk_additional_rate: 45.0,
        state_pension_annual_income: 11_502.40,
        tax_free_fraction: 25.0,
        lifetime_tax_free_allowance: 268_275.0,
        max_months: 600,
        simulations: 1_000,
        seed: Some(42),
        time_budget_secs: 25.0,
    }
}

fn build_solve_response(params: &SimulationParameters) -> Result<SolveResponse, String> {
    let result = solve(params).map_err(|e| e.to_string())?;
    let (years_needed, pension_balance_at_retirement, tax_free_balance_at_retirement) =
        result.as_tuple();
    let sample_path = match result.months_needed() {
        Some(months) => trace_path(params, months, result.base_seed, 0).1,
        None => Vec::new(),
    };

    Ok(SolveResponse {
        years_needed,
        pension_balance_at_retirement,
        tax_free_balance_at_retirement,
        outcome: result.outcome,
        withdrawal_policy: params.withdrawal_policy,
        success_target: params.success_target,
        elapsed_ms: result.elapsed_ms,
        seed: result.base_seed,
        iterations: result.iterations,
        sample_path,
    })
}
