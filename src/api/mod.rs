use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::format::{format_months, format_rubles};
use crate::core::{
    CollateralChoice, FormSession, PaymentQuote, Variant, option_estimates, quote_for,
};
use crate::error::FormError;
use crate::storage::{FileFlagStore, FlagStore};
use crate::submission::{Collector, HttpCollector, LogCollector, spawn_submission};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliVariant {
    Collateral,
    FixedTerm,
}

impl From<CliVariant> for Variant {
    fn from(value: CliVariant) -> Self {
        match value {
            CliVariant::Collateral => Variant::Collateral,
            CliVariant::FixedTerm => Variant::FixedTerm,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliCollateral {
    None,
    Auto,
    RealEstate,
}

impl From<CliCollateral> for CollateralChoice {
    fn from(value: CliCollateral) -> Self {
        match value {
            CliCollateral::None => CollateralChoice::None,
            CliCollateral::Auto => CollateralChoice::Auto,
            CliCollateral::RealEstate => CollateralChoice::RealEstate,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "loan-sim",
    about = "Cash-loan simulation form: monthly payment per collateral option"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the form session over a JSON HTTP API
    Serve(ServeArgs),
    /// Print monthly payments for an amount
    Quote(QuoteArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "LOAN_SIM_PORT", default_value_t = 8080)]
    port: u16,
    #[arg(
        long,
        env = "LOAN_SIM_COLLECTOR_URL",
        help = "Analytics collector URL; payloads are only logged when unset"
    )]
    collector_url: Option<String>,
    #[arg(
        long,
        env = "LOAN_SIM_FLAG_FILE",
        default_value = "loan-sim-flags.json",
        help = "File holding the persisted already-submitted flag"
    )]
    flag_file: PathBuf,
    #[arg(long, env = "LOAN_SIM_VARIANT", value_enum, default_value_t = CliVariant::Collateral)]
    variant: CliVariant,
    #[arg(
        long,
        env = "LOAN_SIM_VARIANT_ID",
        help = "Variant identifier sent with each submission; defaults per variant"
    )]
    variant_id: Option<String>,
}

#[derive(Args, Debug)]
struct QuoteArgs {
    #[arg(long, help = "Loan amount in rubles")]
    amount: f64,
    #[arg(long, help = "Term in years; defaults to each option's longest term")]
    term: Option<u32>,
    #[arg(long, value_enum, help = "Quote a single collateral option")]
    collateral: Option<CliCollateral>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub collector_url: Option<String>,
    pub flag_file: PathBuf,
    pub variant: Variant,
    pub variant_id: String,
}

#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<FormSession>>,
    collector: Arc<dyn Collector>,
    flags: Arc<dyn FlagStore>,
}

impl AppState {
    pub fn new(
        session: FormSession,
        collector: Arc<dyn Collector>,
        flags: Arc<dyn FlagStore>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            collector,
            flags,
        }
    }

    pub fn session(&self) -> Arc<Mutex<FormSession>> {
        self.session.clone()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct QuotePayload {
    amount: Option<f64>,
    term: Option<u32>,
    collateral: Option<CollateralChoice>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct QuoteRequest {
    amount: f64,
    term: Option<u32>,
    collateral: Option<CollateralChoice>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    principal: f64,
    principal_display: String,
    quotes: Vec<QuoteRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRow {
    #[serde(flatten)]
    quote: PaymentQuote,
    label: &'static str,
    monthly_payment_display: String,
    term_display: String,
}

#[derive(Debug, Deserialize)]
struct AmountBody {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct AmountInputBody {
    minor: i64,
}

#[derive(Debug, Deserialize)]
struct TermBody {
    years: u32,
}

#[derive(Debug, Deserialize)]
struct CollateralBody {
    choice: CollateralChoice,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve(args) => {
            let config = build_server_config(args)?;
            run_http_server(config)
                .await
                .map_err(|e| format!("Server error: {e}"))
        }
        Command::Quote(args) => {
            let request = QuoteRequest {
                amount: args.amount,
                term: args.term,
                collateral: args.collateral.map(Into::into),
            };
            validate_quote_request(&request)?;
            print_quote_table(&build_quotes(&request));
            Ok(())
        }
    }
}

fn build_server_config(args: ServeArgs) -> Result<ServerConfig, String> {
    if let Some(url) = &args.collector_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err("--collector-url must be an http:// or https:// URL".to_string());
        }
    }

    let variant: Variant = args.variant.into();
    let variant_id = match args.variant_id {
        Some(id) if id.trim().is_empty() => {
            return Err("--variant-id must not be empty".to_string());
        }
        Some(id) => id,
        None => variant.default_id().to_string(),
    };

    Ok(ServerConfig {
        port: args.port,
        collector_url: args.collector_url,
        flag_file: args.flag_file,
        variant,
        variant_id,
    })
}

pub fn build_state(config: &ServerConfig) -> Result<AppState, String> {
    let collector: Arc<dyn Collector> = match &config.collector_url {
        Some(url) => Arc::new(
            HttpCollector::new(url.clone())
                .map_err(|e| format!("Failed to build collector client: {e}"))?,
        ),
        None => Arc::new(LogCollector),
    };
    let flags: Arc<dyn FlagStore> = Arc::new(FileFlagStore::new(&config.flag_file));
    let session = FormSession::restore(config.variant, config.variant_id.clone(), flags.as_ref());
    Ok(AppState::new(session, collector, flags))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/form", get(form_handler))
        .route("/api/form/amount", post(amount_handler))
        .route("/api/form/amount-input", post(amount_input_handler))
        .route("/api/form/amount/blur", post(amount_blur_handler))
        .route("/api/form/term", post(term_handler))
        .route("/api/form/toggles/auto", post(toggle_auto_handler))
        .route(
            "/api/form/toggles/real-estate",
            post(toggle_real_estate_handler),
        )
        .route("/api/form/collateral", post(collateral_handler))
        .route("/api/form/continue", post(continue_handler))
        .route("/api/form/back", post(back_handler))
        .route("/api/form/submit", post(submit_handler))
        .route("/api/quote", get(quote_get_handler).post(quote_post_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(config: ServerConfig) -> std::io::Result<()> {
    let state = build_state(&config).map_err(std::io::Error::other)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(
        %addr,
        variant = ?config.variant,
        variant_id = %config.variant_id,
        collector = config.collector_url.as_deref().unwrap_or("log only"),
        flag_file = %config.flag_file.display(),
        "loan-sim HTTP API listening"
    );

    axum::serve(listener, router(state)).await
}

async fn form_handler(State(state): State<AppState>) -> Response {
    let form = state.session.lock().await;
    json_response(StatusCode::OK, form.view())
}

async fn amount_handler(State(state): State<AppState>, Json(body): Json<AmountBody>) -> Response {
    apply_event(&state, |form| form.set_amount(body.value)).await
}

async fn amount_input_handler(
    State(state): State<AppState>,
    Json(body): Json<AmountInputBody>,
) -> Response {
    apply_event(&state, |form| form.set_amount_minor(body.minor)).await
}

async fn amount_blur_handler(State(state): State<AppState>) -> Response {
    apply_event(&state, FormSession::blur_amount).await
}

async fn term_handler(State(state): State<AppState>, Json(body): Json<TermBody>) -> Response {
    apply_event(&state, |form| form.set_term(body.years)).await
}

async fn toggle_auto_handler(State(state): State<AppState>) -> Response {
    apply_event(&state, FormSession::toggle_auto).await
}

async fn toggle_real_estate_handler(State(state): State<AppState>) -> Response {
    apply_event(&state, FormSession::toggle_real_estate).await
}

async fn collateral_handler(
    State(state): State<AppState>,
    Json(body): Json<CollateralBody>,
) -> Response {
    apply_event(&state, |form| form.select_collateral(body.choice).map(|_| ())).await
}

async fn continue_handler(State(state): State<AppState>) -> Response {
    apply_event(&state, FormSession::proceed).await
}

async fn back_handler(State(state): State<AppState>) -> Response {
    apply_event(&state, FormSession::back).await
}

async fn submit_handler(State(state): State<AppState>) -> Response {
    let started = spawn_submission(
        state.session.clone(),
        state.collector.clone(),
        state.flags.clone(),
    )
    .await;

    match started {
        Ok(_detached) => {
            let form = state.session.lock().await;
            json_response(StatusCode::ACCEPTED, form.view())
        }
        Err(e) => form_error_response(e),
    }
}

async fn quote_get_handler(Query(payload): Query<QuotePayload>) -> Response {
    quote_handler_impl(payload)
}

async fn quote_post_handler(Json(payload): Json<QuotePayload>) -> Response {
    quote_handler_impl(payload)
}

fn quote_handler_impl(payload: QuotePayload) -> Response {
    let request = match quote_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    json_response(StatusCode::OK, build_quote_response(&request))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn apply_event<F>(state: &AppState, event: F) -> Response
where
    F: FnOnce(&mut FormSession) -> Result<(), FormError>,
{
    let mut form = state.session.lock().await;
    match event(&mut *form) {
        Ok(()) => json_response(StatusCode::OK, form.view()),
        Err(e) => form_error_response(e),
    }
}

fn form_error_response(err: FormError) -> Response {
    debug!(error = %err, "form event rejected");
    let status = match err {
        FormError::InvalidAmount => StatusCode::BAD_REQUEST,
        FormError::NotConfiguring
        | FormError::NotReviewing
        | FormError::Busy
        | FormError::AlreadySubmitted
        | FormError::TermFixed => StatusCode::CONFLICT,
    };
    error_response(status, &err.to_string())
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

fn quote_request_from_payload(payload: QuotePayload) -> Result<QuoteRequest, String> {
    let Some(amount) = payload.amount else {
        return Err("amount is required".to_string());
    };
    let request = QuoteRequest {
        amount,
        term: payload.term,
        collateral: payload.collateral,
    };
    validate_quote_request(&request)?;
    Ok(request)
}

fn validate_quote_request(request: &QuoteRequest) -> Result<(), String> {
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err("amount must be > 0".to_string());
    }
    if request.term == Some(0) {
        return Err("term must be >= 1".to_string());
    }
    Ok(())
}

/// Quotes every option (or the requested one). A requested term is clamped
/// into each option's term range.
fn build_quotes(request: &QuoteRequest) -> Vec<PaymentQuote> {
    let Some(term) = request.term else {
        return option_estimates(request.amount)
            .into_iter()
            .filter(|q| request.collateral.is_none_or(|c| c == q.collateral))
            .collect();
    };

    CollateralChoice::ALL
        .into_iter()
        .filter(|choice| request.collateral.is_none_or(|c| c == *choice))
        .map(|choice| {
            let option = choice.option();
            let years = term.clamp(option.term_years.min, option.term_years.max);
            quote_for(option, request.amount, years)
        })
        .collect()
}

fn build_quote_response(request: &QuoteRequest) -> QuoteResponse {
    let quotes = build_quotes(request)
        .into_iter()
        .map(|quote| QuoteRow {
            label: quote.collateral.label(),
            monthly_payment_display: format_rubles(quote.monthly_payment),
            term_display: format_months(quote.periods),
            quote,
        })
        .collect();

    QuoteResponse {
        principal: request.amount,
        principal_display: format_rubles(request.amount),
        quotes,
    }
}

fn print_quote_table(quotes: &[PaymentQuote]) {
    println!(
        "{:<14} {:>7} {:>6} {:>14} {:>16} {:>16}",
        "collateral", "rate", "years", "monthly", "total", "overpayment"
    );
    for quote in quotes {
        println!(
            "{:<14} {:>6.2}% {:>6} {:>14.2} {:>16.2} {:>16.2}",
            quote.collateral.analytics_code(),
            quote.annual_rate * 100.0,
            quote.term_years,
            quote.monthly_payment,
            quote.total_paid,
            quote.overpayment
        );
    }
}
