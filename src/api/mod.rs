use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    AccountState, AdhocWithdrawals, Pence, SolveConfig, Strategy, TaxParameters, YearSnapshot,
    format_gbp, run_timeline_checked, solve_max_spending, to_pence,
};

const MIN_AGE: u32 = 55;
const MAX_AGE: u32 = 99;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliStrategy {
    LumpSumFirst,
    SavingsFirstUfpls,
    AllowanceFillUfpls,
    AllowanceFillWithTopUp,
    BasicBandFill,
    PensionFirstUfpls,
}

impl From<CliStrategy> for Strategy {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::LumpSumFirst => Strategy::LumpSumFirst,
            CliStrategy::SavingsFirstUfpls => Strategy::SavingsFirstUfpls,
            CliStrategy::AllowanceFillUfpls => Strategy::AllowanceFillUfpls,
            CliStrategy::AllowanceFillWithTopUp => Strategy::AllowanceFillWithTopUp,
            CliStrategy::BasicBandFill => Strategy::BasicBandFill,
            CliStrategy::PensionFirstUfpls => Strategy::PensionFirstUfpls,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "drawdown",
    about = "Pension drawdown strategy comparison (savings + pension, simplified UK tax rules)"
)]
struct Cli {
    #[arg(long, default_value_t = 100_000.0, help = "Initial pension pot in pounds")]
    initial_pension: f64,
    #[arg(
        long,
        default_value_t = 10_000.0,
        help = "Initial non-ISA savings in pounds; drawn before ISA savings"
    )]
    initial_other_savings: f64,
    #[arg(long, default_value_t = 0.0, help = "Initial ISA savings in pounds")]
    initial_isa_savings: f64,
    #[arg(
        long,
        default_value_t = 30_000.0,
        help = "Required annual net spending in pounds"
    )]
    annual_spending: f64,
    #[arg(long, default_value_t = 60, help = "First simulated age (55-99)")]
    start_age: u32,
    #[arg(long, default_value_t = 85, help = "Last simulated age, inclusive (55-99)")]
    end_age: u32,
    #[arg(long, default_value_t = 12_570.0, help = "Personal allowance in pounds")]
    personal_allowance: f64,
    #[arg(
        long,
        default_value_t = 11_973.0,
        help = "Annual state pension in pounds, received from age 67"
    )]
    state_pension: f64,
    #[arg(long, default_value_t = 20.0, help = "Basic income tax rate in percent")]
    basic_rate: f64,
    #[arg(long, default_value_t = 37_700.0, help = "Basic-rate band width in pounds")]
    basic_rate_band: f64,
    #[arg(
        long,
        default_value_t = 25.0,
        help = "Tax-free portion of pension withdrawals in percent"
    )]
    tax_free_portion: f64,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Annual pension growth above inflation in percent"
    )]
    pension_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 3_600.0,
        help = "Gross annual pension contribution allowed without earnings, in pounds"
    )]
    no_income_contribution_limit: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliStrategy::SavingsFirstUfpls,
        help = "Strategy used by the sustainable-spending solver"
    )]
    strategy: CliStrategy,
    #[arg(long, default_value_t = 0.0, help = "Solver lower spending bound in pounds")]
    solve_search_min: f64,
    #[arg(
        long,
        default_value_t = 250_000.0,
        help = "Solver upper spending bound in pounds"
    )]
    solve_search_max: f64,
    #[arg(long, default_value_t = 1.0, help = "Solver tolerance in pounds")]
    solve_tolerance: f64,
    #[arg(long, default_value_t = 48)]
    solve_max_iterations: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    initial_pension: Option<f64>,
    initial_other_savings: Option<f64>,
    initial_isa_savings: Option<f64>,
    initial_savings: Option<f64>,
    spending_amounts: Option<Vec<f64>>,
    target_ages: Option<Vec<u32>>,
    start_age: Option<u32>,
    end_age: Option<u32>,
    adhoc_withdrawals: Option<BTreeMap<u32, f64>>,
    personal_allowance: Option<f64>,
    state_pension: Option<f64>,
    basic_rate: Option<f64>,
    basic_rate_band: Option<f64>,
    tax_free_portion: Option<f64>,
    pension_growth_rate: Option<f64>,
    no_income_contribution_limit: Option<f64>,
    strategies: Option<Vec<Strategy>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    strategy: Option<Strategy>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    initial_pension: Option<f64>,
    initial_other_savings: Option<f64>,
    initial_isa_savings: Option<f64>,
    start_age: Option<u32>,
    end_age: Option<u32>,
    adhoc_withdrawals: Option<BTreeMap<u32, f64>>,
    personal_allowance: Option<f64>,
    state_pension: Option<f64>,
    basic_rate: Option<f64>,
    basic_rate_band: Option<f64>,
    tax_free_portion: Option<f64>,
    pension_growth_rate: Option<f64>,
    no_income_contribution_limit: Option<f64>,
}

#[derive(Debug)]
struct SimulateRequest {
    initial: AccountState,
    spending_amounts: Vec<Pence>,
    target_ages: Vec<u32>,
    adhoc: AdhocWithdrawals,
    params: TaxParameters,
    strategies: Vec<Strategy>,
}

#[derive(Debug)]
struct SolveRequest {
    strategy: Strategy,
    initial: AccountState,
    adhoc: AdhocWithdrawals,
    params: TaxParameters,
    config: SolveConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StrategyTimeline {
    strategy: Strategy,
    total_tax_paid: Pence,
    fully_funded: bool,
    years: Vec<YearSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpendingBlock {
    required_net_annual: Pence,
    required_net_annual_display: String,
    strategies: Vec<StrategyTimeline>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StrategyCell {
    strategy: Strategy,
    total_end: Pence,
    pension_end: Pence,
    savings_end: Pence,
    tax_paid: Pence,
    best: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpendColumn {
    required_net_annual: Pence,
    cells: Vec<StrategyCell>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgeComparison {
    age: u32,
    columns: Vec<SpendColumn>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    start_age: u32,
    end_age: u32,
    initial_pension: Pence,
    initial_other_savings: Pence,
    initial_isa_savings: Pence,
    strategies: Vec<Strategy>,
    spending_blocks: Vec<SpendingBlock>,
    comparisons: Vec<AgeComparison>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    strategy: Strategy,
    search_min: Pence,
    search_max: Pence,
    tolerance: Pence,
    max_iterations: u32,
    solved_value: Option<Pence>,
    solved_value_display: Option<String>,
    converged: bool,
    feasible: bool,
    message: String,
    iterations: Vec<crate::core::SolveIteration>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInfo {
    service: &'static str,
    endpoints: [&'static str; 2],
}

fn default_cli_for_api() -> Cli {
    Cli {
        initial_pension: 100_000.0,
        initial_other_savings: 10_000.0,
        initial_isa_savings: 0.0,
        annual_spending: 30_000.0,
        start_age: 60,
        end_age: 85,
        personal_allowance: 12_570.0,
        state_pension: 11_973.0,
        basic_rate: 20.0,
        basic_rate_band: 37_700.0,
        tax_free_portion: 25.0,
        pension_growth_rate: 4.0,
        no_income_contribution_limit: 3_600.0,
        strategy: CliStrategy::SavingsFirstUfpls,
        solve_search_min: 0.0,
        solve_search_max: 250_000.0,
        solve_tolerance: 1.0,
        solve_max_iterations: 48,
    }
}

fn build_tax_params(cli: &Cli) -> Result<TaxParameters, String> {
    if !(MIN_AGE..=MAX_AGE).contains(&cli.start_age) {
        return Err(format!("--start-age must be between {MIN_AGE} and {MAX_AGE}"));
    }
    if !(MIN_AGE..=MAX_AGE).contains(&cli.end_age) {
        return Err(format!("--end-age must be between {MIN_AGE} and {MAX_AGE}"));
    }
    if cli.start_age > cli.end_age {
        return Err("--start-age must be <= --end-age".to_string());
    }

    for (name, value) in [
        ("--personal-allowance", cli.personal_allowance),
        ("--state-pension", cli.state_pension),
        ("--basic-rate-band", cli.basic_rate_band),
        (
            "--no-income-contribution-limit",
            cli.no_income_contribution_limit,
        ),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    if !(0.0..100.0).contains(&cli.basic_rate) {
        return Err("--basic-rate must be between 0 and 100".to_string());
    }
    if !(0.0..=100.0).contains(&cli.tax_free_portion) {
        return Err("--tax-free-portion must be between 0 and 100".to_string());
    }
    if !cli.pension_growth_rate.is_finite() || cli.pension_growth_rate <= -100.0 {
        return Err("--pension-growth-rate must be > -100".to_string());
    }

    Ok(TaxParameters {
        personal_allowance: to_pence(cli.personal_allowance),
        state_pension_annual: to_pence(cli.state_pension),
        basic_rate: cli.basic_rate / 100.0,
        basic_rate_band: to_pence(cli.basic_rate_band),
        tax_free_portion: cli.tax_free_portion / 100.0,
        pension_growth_rate: cli.pension_growth_rate / 100.0,
        no_income_contribution_limit_gross: to_pence(cli.no_income_contribution_limit),
        start_age: cli.start_age,
        end_age: cli.end_age,
    })
}

fn build_initial_balances(cli: &Cli) -> Result<AccountState, String> {
    for (name, value) in [
        ("--initial-pension", cli.initial_pension),
        ("--initial-other-savings", cli.initial_other_savings),
        ("--initial-isa-savings", cli.initial_isa_savings),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    Ok(AccountState {
        pension: to_pence(cli.initial_pension),
        other_savings: to_pence(cli.initial_other_savings),
        isa_savings: to_pence(cli.initial_isa_savings),
    })
}

fn build_adhoc(map: Option<BTreeMap<u32, f64>>) -> Result<AdhocWithdrawals, String> {
    let mut adhoc = AdhocWithdrawals::new();
    if let Some(entries) = map {
        for (age, pounds) in entries {
            if !pounds.is_finite() || pounds < 0.0 {
                return Err(format!("adhocWithdrawals amount for age {age} must be >= 0"));
            }
            adhoc.insert(age, to_pence(pounds));
        }
    }
    Ok(adhoc)
}

fn simulate_request_from_payload(payload: SimulatePayload) -> Result<SimulateRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.initial_pension {
        cli.initial_pension = v;
    }
    if let Some(v) = payload.initial_other_savings {
        cli.initial_other_savings = v;
    }
    if let Some(v) = payload.initial_isa_savings {
        cli.initial_isa_savings = v;
    }
    // Legacy single-pool field: everything into the priority pool.
    if let Some(v) = payload.initial_savings {
        cli.initial_other_savings = v;
        cli.initial_isa_savings = 0.0;
    }
    if let Some(v) = payload.personal_allowance {
        cli.personal_allowance = v;
    }
    if let Some(v) = payload.state_pension {
        cli.state_pension = v;
    }
    if let Some(v) = payload.basic_rate {
        cli.basic_rate = v;
    }
    if let Some(v) = payload.basic_rate_band {
        cli.basic_rate_band = v;
    }
    if let Some(v) = payload.tax_free_portion {
        cli.tax_free_portion = v;
    }
    if let Some(v) = payload.pension_growth_rate {
        cli.pension_growth_rate = v;
    }
    if let Some(v) = payload.no_income_contribution_limit {
        cli.no_income_contribution_limit = v;
    }

    // Explicit startAge/endAge win; otherwise the simulated span stretches to
    // cover the requested target ages.
    match (payload.start_age, payload.end_age) {
        (Some(start), Some(end)) => {
            cli.start_age = start;
            cli.end_age = end;
        }
        (Some(start), None) => {
            cli.start_age = start;
            cli.end_age = cli.end_age.max(start);
        }
        (None, Some(end)) => {
            cli.end_age = end;
            cli.start_age = cli.start_age.min(end);
        }
        (None, None) => {
            if let Some(ages) = payload.target_ages.as_deref() {
                if let (Some(&min), Some(&max)) = (ages.iter().min(), ages.iter().max()) {
                    cli.start_age = min;
                    cli.end_age = max;
                }
            }
        }
    }

    let params = build_tax_params(&cli)?;
    let initial = build_initial_balances(&cli)?;
    let adhoc = build_adhoc(payload.adhoc_withdrawals)?;

    let spending_pounds = payload
        .spending_amounts
        .unwrap_or_else(|| vec![cli.annual_spending]);
    if spending_pounds.is_empty() {
        return Err("spendingAmounts must contain at least one amount".to_string());
    }
    let mut spending_amounts = Vec::with_capacity(spending_pounds.len());
    for pounds in spending_pounds {
        if !pounds.is_finite() || pounds < 0.0 {
            return Err("spendingAmounts entries must be >= 0".to_string());
        }
        spending_amounts.push(to_pence(pounds));
    }

    let target_ages = payload.target_ages.unwrap_or_else(|| vec![params.end_age]);
    if target_ages.is_empty() {
        return Err("targetAges must contain at least one age".to_string());
    }
    for &age in &target_ages {
        if age < params.start_age || age > params.end_age {
            return Err(format!(
                "target age {age} must be between {} and {}",
                params.start_age, params.end_age
            ));
        }
    }

    let strategies = payload
        .strategies
        .unwrap_or_else(|| Strategy::ALL.to_vec());
    if strategies.is_empty() {
        return Err("strategies must contain at least one strategy".to_string());
    }

    Ok(SimulateRequest {
        initial,
        spending_amounts,
        target_ages,
        adhoc,
        params,
        strategies,
    })
}

fn solve_request_from_payload(payload: SolvePayload) -> Result<SolveRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.initial_pension {
        cli.initial_pension = v;
    }
    if let Some(v) = payload.initial_other_savings {
        cli.initial_other_savings = v;
    }
    if let Some(v) = payload.initial_isa_savings {
        cli.initial_isa_savings = v;
    }
    if let Some(v) = payload.start_age {
        cli.start_age = v;
    }
    if let Some(v) = payload.end_age {
        cli.end_age = v;
    }
    if let Some(v) = payload.personal_allowance {
        cli.personal_allowance = v;
    }
    if let Some(v) = payload.state_pension {
        cli.state_pension = v;
    }
    if let Some(v) = payload.basic_rate {
        cli.basic_rate = v;
    }
    if let Some(v) = payload.basic_rate_band {
        cli.basic_rate_band = v;
    }
    if let Some(v) = payload.tax_free_portion {
        cli.tax_free_portion = v;
    }
    if let Some(v) = payload.pension_growth_rate {
        cli.pension_growth_rate = v;
    }
    if let Some(v) = payload.no_income_contribution_limit {
        cli.no_income_contribution_limit = v;
    }
    if let Some(v) = payload.search_min {
        cli.solve_search_min = v;
    }
    if let Some(v) = payload.search_max {
        cli.solve_search_max = v;
    }
    if let Some(v) = payload.tolerance {
        cli.solve_tolerance = v;
    }
    if let Some(v) = payload.max_iterations {
        cli.solve_max_iterations = v;
    }

    let params = build_tax_params(&cli)?;
    let initial = build_initial_balances(&cli)?;
    let adhoc = build_adhoc(payload.adhoc_withdrawals)?;

    for (name, value) in [
        ("searchMin", cli.solve_search_min),
        ("searchMax", cli.solve_search_max),
        ("tolerance", cli.solve_tolerance),
    ] {
        if !value.is_finite() {
            return Err(format!("{name} must be finite"));
        }
    }

    Ok(SolveRequest {
        strategy: payload.strategy.unwrap_or(cli.strategy.into()),
        initial,
        adhoc,
        params,
        config: SolveConfig {
            search_min: to_pence(cli.solve_search_min),
            search_max: to_pence(cli.solve_search_max),
            tolerance: to_pence(cli.solve_tolerance),
            max_iterations: cli.solve_max_iterations,
        },
    })
}

fn build_simulate_response(request: &SimulateRequest) -> SimulateResponse {
    let mut spending_blocks = Vec::with_capacity(request.spending_amounts.len());
    for &required in &request.spending_amounts {
        let mut timelines = Vec::with_capacity(request.strategies.len());
        for &strategy in &request.strategies {
            let outcome = run_timeline_checked(
                strategy,
                request.initial,
                required,
                &request.adhoc,
                &request.params,
            );
            timelines.push(StrategyTimeline {
                strategy,
                total_tax_paid: outcome.years.iter().map(|y| y.tax_paid).sum(),
                fully_funded: outcome.unmet_need == 0,
                years: outcome.years,
            });
        }
        spending_blocks.push(SpendingBlock {
            required_net_annual: required,
            required_net_annual_display: format_gbp(required),
            strategies: timelines,
        });
    }

    let comparisons = build_comparisons(request, &spending_blocks);

    SimulateResponse {
        start_age: request.params.start_age,
        end_age: request.params.end_age,
        initial_pension: request.initial.pension,
        initial_other_savings: request.initial.other_savings,
        initial_isa_savings: request.initial.isa_savings,
        strategies: request.strategies.clone(),
        spending_blocks,
        comparisons,
    }
}

/// Total wealth remaining per strategy at each target age, with the best
/// strategy flagged per spending column.
fn build_comparisons(
    request: &SimulateRequest,
    spending_blocks: &[SpendingBlock],
) -> Vec<AgeComparison> {
    let mut comparisons = Vec::with_capacity(request.target_ages.len());
    for &age in &request.target_ages {
        let idx = (age - request.params.start_age) as usize;
        let mut columns = Vec::with_capacity(spending_blocks.len());
        for block in spending_blocks {
            let best_total = block
                .strategies
                .iter()
                .map(|t| t.years[idx].total_end())
                .max()
                .unwrap_or(0);
            let cells = block
                .strategies
                .iter()
                .map(|timeline| {
                    let year = timeline.years[idx];
                    StrategyCell {
                        strategy: timeline.strategy,
                        total_end: year.total_end(),
                        pension_end: year.pension_end,
                        savings_end: year.savings_end(),
                        tax_paid: year.tax_paid,
                        best: year.total_end() == best_total,
                    }
                })
                .collect();
            columns.push(SpendColumn {
                required_net_annual: block.required_net_annual,
                cells,
            });
        }
        comparisons.push(AgeComparison { age, columns });
    }
    comparisons
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/", get(index_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/solve", get(solve_get_handler).post(solve_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("Drawdown HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

async fn index_handler() -> Response {
    json_response(
        StatusCode::OK,
        ServiceInfo {
            service: "drawdown",
            endpoints: ["/api/simulate", "/api/solve"],
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match simulate_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    json_response(StatusCode::OK, build_simulate_response(&request))
}

async fn solve_get_handler(Query(payload): Query<SolvePayload>) -> Response {
    solve_handler_impl(payload)
}

async fn solve_post_handler(Json(payload): Json<SolvePayload>) -> Response {
    solve_handler_impl(payload)
}

fn solve_handler_impl(payload: SolvePayload) -> Response {
    let request = match solve_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let result = match solve_max_spending(
        request.strategy,
        request.initial,
        &request.adhoc,
        &request.params,
        request.config,
    ) {
        Ok(result) => result,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    json_response(
        StatusCode::OK,
        SolveResponse {
            strategy: request.strategy,
            search_min: request.config.search_min,
            search_max: request.config.search_max,
            tolerance: request.config.tolerance,
            max_iterations: request.config.max_iterations,
            solved_value: result.solved_value,
            solved_value_display: result.solved_value.map(format_gbp),
            converged: result.converged,
            feasible: result.feasible,
            message: result.message,
            iterations: result.iterations,
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
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
fn simulate_request_from_json(json: &str) -> Result<SimulateRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    simulate_request_from_payload(payload)
}

#[cfg(test)]
fn solve_request_from_json(json: &str) -> Result<SolveRequest, String> {
    let payload = serde_json::from_str::<SolvePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    solve_request_from_payload(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_request_parses_web_keys_and_strategy_aliases() {
        let json = r#"{
          "initialPension": 100000,
          "initialOtherSavings": 8000,
          "initialIsaSavings": 2000,
          "spendingAmounts": [25000, 30000],
          "targetAges": [70, 85],
          "startAge": 60,
          "endAge": 85,
          "adhocWithdrawals": {"62": 5000},
          "statePension": 12000,
          "basicRate": 20,
          "strategies": ["strategy1", "strategy3a", "pension-first-ufpls"]
        }"#;

        let request = simulate_request_from_json(json).expect("json should parse");
        assert_eq!(request.initial.pension, 100_000_00);
        assert_eq!(request.initial.other_savings, 8_000_00);
        assert_eq!(request.initial.isa_savings, 2_000_00);
        assert_eq!(request.spending_amounts, vec![25_000_00, 30_000_00]);
        assert_eq!(request.target_ages, vec![70, 85]);
        assert_eq!(request.params.start_age, 60);
        assert_eq!(request.params.end_age, 85);
        assert_eq!(request.params.state_pension_annual, 12_000_00);
        assert_eq!(request.adhoc.get(&62), Some(&5_000_00));
        assert_eq!(
            request.strategies,
            vec![
                Strategy::LumpSumFirst,
                Strategy::AllowanceFillWithTopUp,
                Strategy::PensionFirstUfpls
            ]
        );
    }

    #[test]
    fn simulate_request_defaults_to_all_strategies() {
        let request = simulate_request_from_json("{}").expect("defaults should be valid");
        assert_eq!(request.strategies, Strategy::ALL.to_vec());
        assert_eq!(request.spending_amounts.len(), 1);
        assert_eq!(request.target_ages, vec![request.params.end_age]);
    }

    #[test]
    fn simulate_request_derives_span_from_target_ages() {
        let json = r#"{"targetAges": [65, 72, 90]}"#;
        let request = simulate_request_from_json(json).expect("json should parse");
        assert_eq!(request.params.start_age, 65);
        assert_eq!(request.params.end_age, 90);
    }

    #[test]
    fn legacy_single_savings_field_maps_to_other_pool() {
        let json = r#"{"initialSavings": 15000}"#;
        let request = simulate_request_from_json(json).expect("json should parse");
        assert_eq!(request.initial.other_savings, 15_000_00);
        assert_eq!(request.initial.isa_savings, 0);
    }

    #[test]
    fn simulate_request_rejects_out_of_range_ages() {
        let err = simulate_request_from_json(r#"{"startAge": 50, "endAge": 85}"#)
            .expect_err("must reject age below 55");
        assert!(err.contains("--start-age"));

        let err = simulate_request_from_json(r#"{"startAge": 60, "endAge": 100}"#)
            .expect_err("must reject age above 99");
        assert!(err.contains("--end-age"));

        let err = simulate_request_from_json(r#"{"startAge": 80, "endAge": 60}"#)
            .expect_err("must reject inverted span");
        assert!(err.contains("--start-age must be <="));
    }

    #[test]
    fn simulate_request_rejects_target_age_outside_span() {
        let err =
            simulate_request_from_json(r#"{"startAge": 60, "endAge": 70, "targetAges": [75]}"#)
                .expect_err("must reject target age outside span");
        assert!(err.contains("target age 75"));
    }

    #[test]
    fn simulate_request_rejects_negative_balances_and_amounts() {
        let err = simulate_request_from_json(r#"{"initialPension": -1}"#)
            .expect_err("must reject negative pension");
        assert!(err.contains("--initial-pension"));

        let err = simulate_request_from_json(r#"{"spendingAmounts": [-5]}"#)
            .expect_err("must reject negative spending");
        assert!(err.contains("spendingAmounts"));

        let err = simulate_request_from_json(r#"{"adhocWithdrawals": {"62": -100}}"#)
            .expect_err("must reject negative ad hoc amount");
        assert!(err.contains("adhocWithdrawals"));
    }

    #[test]
    fn simulate_request_rejects_full_basic_rate() {
        let err = simulate_request_from_json(r#"{"basicRate": 100}"#)
            .expect_err("must reject 100% basic rate");
        assert!(err.contains("--basic-rate"));
    }

    #[test]
    fn simulate_response_serialization_contains_expected_fields() {
        let request = simulate_request_from_json(
            r#"{"startAge": 60, "endAge": 62, "spendingAmounts": [20000]}"#,
        )
        .expect("valid request");
        let response = build_simulate_response(&request);
        let json = serde_json::to_string(&response).expect("response should serialize");

        assert!(json.contains("\"spendingBlocks\""));
        assert!(json.contains("\"comparisons\""));
        assert!(json.contains("\"requiredNetAnnual\""));
        assert!(json.contains("\"pensionStart\""));
        assert!(json.contains("\"taxPaid\""));
        assert!(json.contains("\"extraThisYear\""));
        assert!(json.contains("\"fullyFunded\""));
        assert!(json.contains("\"savings-first-ufpls\""));
    }

    #[test]
    fn comparison_flags_best_strategy_per_column() {
        let request = simulate_request_from_json(
            r#"{"startAge": 60, "endAge": 70, "targetAges": [70], "spendingAmounts": [25000]}"#,
        )
        .expect("valid request");
        let response = build_simulate_response(&request);

        assert_eq!(response.comparisons.len(), 1);
        let column = &response.comparisons[0].columns[0];
        let best_total = column
            .cells
            .iter()
            .map(|c| c.total_end)
            .max()
            .expect("cells expected");
        for cell in &column.cells {
            assert_eq!(cell.best, cell.total_end == best_total);
        }
        assert!(column.cells.iter().any(|c| c.best));
    }

    #[test]
    fn solve_request_parses_and_solves() {
        let request = solve_request_from_json(
            r#"{
              "strategy": "strategy5",
              "initialPension": 100000,
              "initialOtherSavings": 0,
              "startAge": 60,
              "endAge": 60,
              "pensionGrowthRate": 0,
              "searchMax": 100000
            }"#,
        )
        .expect("json should parse");
        assert_eq!(request.strategy, Strategy::PensionFirstUfpls);

        let result = solve_max_spending(
            request.strategy,
            request.initial,
            &request.adhoc,
            &request.params,
            request.config,
        )
        .expect("must solve");
        assert!(result.feasible);
        let solved = result.solved_value.expect("value expected");
        assert!((solved - 87_514_00_i64).abs() <= request.config.tolerance + 1);
    }

    #[test]
    fn solve_request_rejects_inverted_bounds() {
        let request = solve_request_from_json(r#"{"searchMin": 100, "searchMax": 50}"#)
            .expect("payload itself parses");
        let err = solve_max_spending(
            request.strategy,
            request.initial,
            &request.adhoc,
            &request.params,
            request.config,
        )
        .expect_err("must reject");
        assert!(err.contains("searchMax"));
    }
}
