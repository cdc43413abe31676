use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use crate::core::{
    GridRow, GridSpec, RateConfig, ScenarioOutcome, ScenarioParams, WithdrawalSpec,
    break_even_capital, closest_to_break_even, run_scenario, sweep_grid,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliWithdrawBase {
    /// Withdrawal rate applies to the initial capital.
    Initial,
    /// Withdrawal rate applies to the current balance each month.
    Balance,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawBase {
    Initial,
    Balance,
}

impl From<ApiWithdrawBase> for CliWithdrawBase {
    fn from(value: ApiWithdrawBase) -> Self {
        match value {
            ApiWithdrawBase::Initial => CliWithdrawBase::Initial,
            ApiWithdrawBase::Balance => CliWithdrawBase::Balance,
        }
    }
}

/// Rates are given in percent on the CLI (`-r 5` means 5%/year) and converted
/// to fractions in `build_request`; euro amounts stay euros.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "avcto",
    about = "Assurance-vie (>8 years) vs CTO (PFU) net-withdrawal simulator with monthly compounding"
)]
pub struct Cli {
    #[arg(short = 'i', long, default_value_t = 100_000.0, help = "Starting capital in euros")]
    initial: f64,
    #[arg(
        short = 'r',
        long,
        default_value_t = 5.0,
        help = "Annual gross return in percent"
    )]
    annual_return: f64,
    #[arg(short = 'y', long, default_value_t = 10, help = "Horizon in whole years")]
    years: u32,
    #[arg(
        short = 'w',
        long,
        default_value_t = 2.5,
        help = "Annual NET withdrawal rate in percent, ignored when --withdraw-fixed is set"
    )]
    withdraw_rate: f64,
    #[arg(long, help = "Fixed monthly NET amount in euros")]
    withdraw_fixed: Option<f64>,
    #[arg(
        long,
        value_enum,
        default_value_t = CliWithdrawBase::Initial,
        help = "Base for --withdraw-rate"
    )]
    withdraw_on: CliWithdrawBase,
    #[arg(long, default_value_t = 0.75, help = "AV annual management fee in percent")]
    av_fee: f64,
    #[arg(
        long,
        default_value_t = 0.008,
        help = "CTO commission per withdrawal in percent"
    )]
    cto_fee: f64,
    #[arg(long, default_value_t = 3.0, help = "Minimum CTO commission per withdrawal in euros")]
    cto_min_fee: f64,
    #[arg(long, default_value_t = 17.2, help = "Social contributions in percent")]
    ps_rate: f64,
    #[arg(
        long,
        default_value_t = 12.8,
        help = "Income-tax portion of the PFU in percent"
    )]
    pfu_ir: f64,
    #[arg(
        long,
        default_value_t = 7.5,
        help = "AV income tax below the premium threshold in percent"
    )]
    av_ir_low: f64,
    #[arg(
        long,
        default_value_t = 12.8,
        help = "AV income tax above the premium threshold in percent"
    )]
    av_ir_high: f64,
    #[arg(long, default_value_t = 150_000.0, help = "AV premium threshold in euros")]
    av_threshold: f64,
    #[arg(
        long,
        default_value_t = 4_600.0,
        help = "Annual AV income-tax allowance in euros (4600 single, 9200 couple)"
    )]
    allowance: f64,
    #[arg(
        long,
        value_parser = parse_grid_arg,
        help = "Sweep initial capitals instead of a single run, format min:max:step"
    )]
    grid: Option<GridSpec>,
    #[arg(long, help = "Write the run (or the grid) as CSV to this path")]
    csv: Option<PathBuf>,
}

/// Parses `min:max:step`, accepting a comma as decimal separator the way the
/// original French-locale tool did.
fn parse_grid_arg(raw: &str) -> Result<GridSpec, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [min, max, step] = parts.as_slice() else {
        return Err("expected format min:max:step".to_string());
    };
    let parse = |s: &str| {
        s.trim()
            .replace(',', ".")
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number"))
    };
    let grid = GridSpec {
        min: parse(min)?,
        max: parse(max)?,
        step: parse(step)?,
    };
    grid.validate().map_err(|e| e.to_string())?;
    Ok(grid)
}

fn build_request(cli: &Cli) -> Result<(ScenarioParams, RateConfig), String> {
    let withdrawal = match (cli.withdraw_fixed, cli.withdraw_on) {
        (Some(net_amount), _) => WithdrawalSpec::FixedMonthly { net_amount },
        (None, CliWithdrawBase::Initial) => WithdrawalSpec::PercentOfInitial {
            annual_rate: cli.withdraw_rate / 100.0,
        },
        (None, CliWithdrawBase::Balance) => WithdrawalSpec::PercentOfBalance {
            annual_rate: cli.withdraw_rate / 100.0,
        },
    };

    let config = RateConfig {
        annual_growth: cli.annual_return / 100.0,
        av_fee_annual: cli.av_fee / 100.0,
        cto_fee_rate: cli.cto_fee / 100.0,
        cto_min_fee: cli.cto_min_fee,
        ps_rate: cli.ps_rate / 100.0,
        pfu_income_rate: cli.pfu_ir / 100.0,
        av_income_low: cli.av_ir_low / 100.0,
        av_income_high: cli.av_ir_high / 100.0,
        av_premium_threshold: cli.av_threshold,
        annual_allowance: cli.allowance,
    };
    config.validate().map_err(|e| e.to_string())?;

    let params = ScenarioParams {
        initial_capital: cli.initial,
        horizon_years: cli.years,
        withdrawal,
    };
    params.validate().map_err(|e| e.to_string())?;

    Ok((params, config))
}

pub fn run_cli(cli: &Cli) -> Result<(), String> {
    let (params, config) = build_request(cli)?;

    if let Some(grid) = cli.grid {
        let rows = sweep_grid(&params, &config, &grid).map_err(|e| e.to_string())?;
        print_grid_summary(&rows);
        if let Some(path) = &cli.csv {
            std::fs::write(path, grid_csv(&rows))
                .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
            println!("CSV written: {}", path.display());
        }
        return Ok(());
    }

    let outcome = run_scenario(&params, &config).map_err(|e| e.to_string())?;
    print_single_summary(&params, &config, &outcome);
    if let Some(path) = &cli.csv {
        std::fs::write(path, single_csv(&params, &outcome))
            .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
        println!("CSV written: {}", path.display());
    }
    Ok(())
}

fn print_single_summary(params: &ScenarioParams, config: &RateConfig, outcome: &ScenarioOutcome) {
    println!("--- Parameters ---");
    println!("Initial capital: {:.2} EUR", params.initial_capital);
    println!(
        "Horizon: {} years | Return: {:.3} %/year",
        params.horizon_years,
        config.annual_growth * 100.0
    );
    match params.withdrawal {
        WithdrawalSpec::FixedMonthly { net_amount } => {
            println!("NET withdrawals: {net_amount:.2} EUR/month fixed");
        }
        WithdrawalSpec::PercentOfInitial { annual_rate } => {
            println!(
                "NET withdrawals: {:.3} %/year on initial capital",
                annual_rate * 100.0
            );
        }
        WithdrawalSpec::PercentOfBalance { annual_rate } => {
            println!(
                "NET withdrawals: {:.3} %/year on current balance",
                annual_rate * 100.0
            );
        }
    }
    println!(
        "AV : fees {:.3} %/year | IR {:.1}% / {:.1}% | premium threshold {:.0} EUR | allowance {:.0} EUR",
        config.av_fee_annual * 100.0,
        config.av_income_low * 100.0,
        config.av_income_high * 100.0,
        config.av_premium_threshold,
        config.annual_allowance
    );
    println!(
        "CTO: commission {:.5} %/withdrawal (min {:.2} EUR) | PFU = IR {:.1}% + PS {:.1}% = {:.1}%",
        config.cto_fee_rate * 100.0,
        config.cto_min_fee,
        config.pfu_income_rate * 100.0,
        config.ps_rate * 100.0,
        config.pfu_total() * 100.0
    );

    println!();
    println!("--- Results over horizon ---");
    println!(
        "AV : final capital = {:.2} EUR | cumulative net withdrawals = {:.2} EUR | taxes = {:.2} EUR",
        outcome.av.final_balance,
        outcome.av.cumulative_net_withdrawals,
        outcome.av.cumulative_tax
    );
    println!(
        "CTO: final capital = {:.2} EUR | cumulative net withdrawals = {:.2} EUR | taxes = {:.2} EUR | commissions = {:.2} EUR",
        outcome.cto.final_balance,
        outcome.cto.cumulative_net_withdrawals,
        outcome.cto.cumulative_tax,
        outcome.cto.cumulative_fees
    );
    println!();
    println!(
        "Difference (AV - CTO) in total net wealth = {:.2} EUR",
        outcome.wealth_difference
    );
}

fn print_grid_summary(rows: &[GridRow]) {
    println!("Grid sweep: {} capitals simulated", rows.len());
    match break_even_capital(rows) {
        Some(capital) => println!("Break-even capital (AV = CTO) ~ {capital:.0} EUR"),
        None => println!("No break-even inside the range; the advantage is one-sided"),
    }
    if let Some(row) = closest_to_break_even(rows) {
        println!(
            "Closest to equilibrium: capital {:.0} EUR, difference {:.2} EUR",
            row.capital, row.wealth_difference
        );
    }
}

/// Column layout consumed by spreadsheet users; changing it is a breaking
/// change for them, not for the engine.
const GRID_CSV_HEADER: &str = "capital,av_final_balance,av_net_withdrawals,av_tax,\
cto_final_balance,cto_net_withdrawals,cto_tax,cto_fees,difference";

fn grid_csv(rows: &[GridRow]) -> String {
    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(GRID_CSV_HEADER);
    out.push('\n');
    for row in rows {
        let _ = writeln!(
            out,
            "{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
            row.capital,
            row.av.final_balance,
            row.av.cumulative_net_withdrawals,
            row.av.cumulative_tax,
            row.cto.final_balance,
            row.cto.cumulative_net_withdrawals,
            row.cto.cumulative_tax,
            row.cto.cumulative_fees,
            row.wealth_difference
        );
    }
    out
}

fn single_csv(params: &ScenarioParams, outcome: &ScenarioOutcome) -> String {
    let mut out = String::new();
    out.push_str(GRID_CSV_HEADER);
    out.push('\n');
    let _ = writeln!(
        out,
        "{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
        params.initial_capital,
        outcome.av.final_balance,
        outcome.av.cumulative_net_withdrawals,
        outcome.av.cumulative_tax,
        outcome.cto.final_balance,
        outcome.cto.cumulative_net_withdrawals,
        outcome.cto.cumulative_tax,
        outcome.cto.cumulative_fees,
        outcome.wealth_difference
    );
    out
}

/// Optional overrides on top of the CLI defaults; rates in percent like the
/// CLI. Accepted as GET query parameters or a POST JSON body.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SimulatePayload {
    initial: Option<f64>,
    annual_return: Option<f64>,
    years: Option<u32>,
    withdraw_rate: Option<f64>,
    withdraw_fixed: Option<f64>,
    withdraw_on: Option<ApiWithdrawBase>,
    av_fee: Option<f64>,
    cto_fee: Option<f64>,
    cto_min_fee: Option<f64>,
    ps_rate: Option<f64>,
    pfu_ir: Option<f64>,
    av_ir_low: Option<f64>,
    av_ir_high: Option<f64>,
    av_threshold: Option<f64>,
    allowance: Option<f64>,
    grid_min: Option<f64>,
    grid_max: Option<f64>,
    grid_step: Option<f64>,
}

fn default_cli() -> Cli {
    Cli {
        initial: 100_000.0,
        annual_return: 5.0,
        years: 10,
        withdraw_rate: 2.5,
        withdraw_fixed: None,
        withdraw_on: CliWithdrawBase::Initial,
        av_fee: 0.75,
        cto_fee: 0.008,
        cto_min_fee: 3.0,
        ps_rate: 17.2,
        pfu_ir: 12.8,
        av_ir_low: 7.5,
        av_ir_high: 12.8,
        av_threshold: 150_000.0,
        allowance: 4_600.0,
        grid: None,
        csv: None,
    }
}

fn cli_from_payload(payload: &SimulatePayload) -> Cli {
    let mut cli = default_cli();
    if let Some(v) = payload.initial {
        cli.initial = v;
    }
    if let Some(v) = payload.annual_return {
        cli.annual_return = v;
    }
    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.withdraw_rate {
        cli.withdraw_rate = v;
    }
    if let Some(v) = payload.withdraw_fixed {
        cli.withdraw_fixed = Some(v);
    }
    if let Some(v) = payload.withdraw_on {
        cli.withdraw_on = v.into();
    }
    if let Some(v) = payload.av_fee {
        cli.av_fee = v;
    }
    if let Some(v) = payload.cto_fee {
        cli.cto_fee = v;
    }
    if let Some(v) = payload.cto_min_fee {
        cli.cto_min_fee = v;
    }
    if let Some(v) = payload.ps_rate {
        cli.ps_rate = v;
    }
    if let Some(v) = payload.pfu_ir {
        cli.pfu_ir = v;
    }
    if let Some(v) = payload.av_ir_low {
        cli.av_ir_low = v;
    }
    if let Some(v) = payload.av_ir_high {
        cli.av_ir_high = v;
    }
    if let Some(v) = payload.av_threshold {
        cli.av_threshold = v;
    }
    if let Some(v) = payload.allowance {
        cli.allowance = v;
    }
    cli
}

fn grid_from_payload(payload: &SimulatePayload) -> Result<GridSpec, String> {
    match (payload.grid_min, payload.grid_max, payload.grid_step) {
        (Some(min), Some(max), Some(step)) => {
            let grid = GridSpec { min, max, step };
            grid.validate().map_err(|e| e.to_string())?;
            Ok(grid)
        }
        _ => Err("gridMin, gridMax and gridStep are all required".to_string()),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GridResponse {
    rows: Vec<GridRow>,
    break_even_capital: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/grid", get(grid_get_handler).post(grid_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("avcto HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
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
    let cli = cli_from_payload(&payload);
    let outcome = match build_request(&cli).and_then(|(params, config)| {
        run_scenario(&params, &config).map_err(|e| e.to_string())
    }) {
        Ok(outcome) => outcome,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    json_response(StatusCode::OK, outcome)
}

async fn grid_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    grid_handler_impl(payload)
}

async fn grid_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    grid_handler_impl(payload)
}

fn grid_handler_impl(payload: SimulatePayload) -> Response {
    let cli = cli_from_payload(&payload);
    let result = grid_from_payload(&payload).and_then(|grid| {
        let (params, config) = build_request(&cli)?;
        sweep_grid(&params, &config, &grid).map_err(|e| e.to_string())
    });
    match result {
        Ok(rows) => {
            let response = GridResponse {
                break_even_capital: break_even_capital(&rows),
                rows,
            };
            json_response(StatusCode::OK, response)
        }
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
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
mod tests {
    use super::*;

    #[test]
    fn default_cli_builds_the_default_request() {
        let (params, config) = build_request(&default_cli()).expect("defaults are valid");
        assert_eq!(config, RateConfig::default());
        assert_eq!(params.initial_capital, 100_000.0);
        assert_eq!(params.horizon_years, 10);
        assert_eq!(
            params.withdrawal,
            WithdrawalSpec::PercentOfInitial { annual_rate: 0.025 }
        );
    }

    #[test]
    fn fixed_withdrawal_overrides_the_rate() {
        let mut cli = default_cli();
        cli.withdraw_fixed = Some(1_000.0);
        let (params, _) = build_request(&cli).expect("valid");
        assert_eq!(
            params.withdrawal,
            WithdrawalSpec::FixedMonthly { net_amount: 1_000.0 }
        );
    }

    #[test]
    fn balance_base_selects_percent_of_balance() {
        let mut cli = default_cli();
        cli.withdraw_on = CliWithdrawBase::Balance;
        cli.withdraw_rate = 4.0;
        let (params, _) = build_request(&cli).expect("valid");
        assert_eq!(
            params.withdrawal,
            WithdrawalSpec::PercentOfBalance { annual_rate: 0.04 }
        );
    }

    #[test]
    fn build_request_rejects_out_of_range_percent() {
        let mut cli = default_cli();
        cli.ps_rate = 172.0;
        let err = build_request(&cli).expect_err("must reject");
        assert!(err.contains("ps_rate"), "unexpected message: {err}");
    }

    #[test]
    fn build_request_rejects_zero_capital() {
        let mut cli = default_cli();
        cli.initial = 0.0;
        assert!(build_request(&cli).is_err());
    }

    #[test]
    fn grid_argument_parses_and_validates() {
        let grid = parse_grid_arg("10000:1000000:10000").expect("parses");
        assert_eq!(grid.min, 10_000.0);
        assert_eq!(grid.max, 1_000_000.0);
        assert_eq!(grid.step, 10_000.0);

        // French decimal comma.
        let grid = parse_grid_arg("10000,5:20000:500").expect("parses");
        assert_eq!(grid.min, 10_000.5);

        assert!(parse_grid_arg("10000:20000").is_err());
        assert!(parse_grid_arg("20000:10000:500").is_err());
        assert!(parse_grid_arg("a:b:c").is_err());
    }

    #[test]
    fn payload_parses_camel_case_overrides() {
        let payload: SimulatePayload = serde_json::from_str(
            r#"{"initial": 50000, "annualReturn": 4.0, "withdrawOn": "balance", "avFee": 0.5}"#,
        )
        .expect("parses");
        let cli = cli_from_payload(&payload);
        assert_eq!(cli.initial, 50_000.0);
        assert_eq!(cli.annual_return, 4.0);
        assert_eq!(cli.withdraw_on, CliWithdrawBase::Balance);
        assert_eq!(cli.av_fee, 0.5);
        // Untouched fields keep their CLI defaults.
        assert_eq!(cli.years, 10);
    }

    #[test]
    fn payload_rejects_unknown_fields() {
        let result: Result<SimulatePayload, _> =
            serde_json::from_str(r#"{"intial": 50000}"#);
        assert!(result.is_err());
    }

    #[test]
    fn grid_payload_requires_all_three_bounds() {
        let payload: SimulatePayload =
            serde_json::from_str(r#"{"gridMin": 10000, "gridMax": 50000}"#).expect("parses");
        assert!(grid_from_payload(&payload).is_err());

        let payload: SimulatePayload = serde_json::from_str(
            r#"{"gridMin": 10000, "gridMax": 50000, "gridStep": 10000}"#,
        )
        .expect("parses");
        let grid = grid_from_payload(&payload).expect("valid");
        assert_eq!(grid.step, 10_000.0);
    }

    #[test]
    fn simulate_payload_round_trips_through_the_engine() {
        let payload = SimulatePayload {
            years: Some(5),
            ..SimulatePayload::default()
        };
        let cli = cli_from_payload(&payload);
        let (params, config) = build_request(&cli).expect("valid");
        let outcome = run_scenario(&params, &config).expect("runs");
        assert!(outcome.av.total_net_wealth.is_finite());
        assert!(outcome.cto.total_net_wealth.is_finite());

        let json = serde_json::to_value(&outcome).expect("serializes");
        assert!(json.get("wealthDifference").is_some());
        assert!(json["av"].get("finalBalance").is_some());
        assert!(json["cto"].get("cumulativeFees").is_some());
    }

    #[test]
    fn grid_csv_has_header_and_one_line_per_row() {
        let cli = default_cli();
        let (params, config) = build_request(&cli).expect("valid");
        let grid = GridSpec {
            min: 50_000.0,
            max: 150_000.0,
            step: 50_000.0,
        };
        let rows = sweep_grid(&params, &config, &grid).expect("sweeps");
        let csv = grid_csv(&rows);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(GRID_CSV_HEADER));
        assert_eq!(lines.count(), rows.len());
        assert!(csv.lines().nth(1).expect("row").starts_with("50000.00,"));
    }

    #[test]
    fn single_csv_uses_the_same_columns() {
        let cli = default_cli();
        let (params, config) = build_request(&cli).expect("valid");
        let outcome = run_scenario(&params, &config).expect("runs");
        let csv = single_csv(&params, &outcome);
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.starts_with(GRID_CSV_HEADER));
    }
}
