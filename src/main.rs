// src/main.rs
use anyhow::{Context, Result};
use axum::http::StatusCode as AxumStatusCode;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{env, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod api_client;
mod banner;
mod clock;
mod mechanics;
mod period;
mod reports;
mod reset_config;
mod reset_scheduler;
mod taller;
mod utils;

use api_client::{
    AndradeClient, AndradeConfig, ApiError, BackendApi, DEFAULT_API_BASE_URL,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use banner::{banner_status, BannerStatus};
use clock::{Clock, SystemClock};
use mechanics::MechanicsSection;
use period::{BiweeklyScheme, MonthlyScheme, Period, PeriodScheme};
use reports::ReportsSection;
use reset_config::ResetConfig;
use reset_scheduler::{spawn_polling, PeriodResetScheduler, ResetEvent, ResetState};
use taller::TallerSection;

const DEFAULT_STATUS_ADDR: &str = "127.0.0.1:3000";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Backend API client error")]
    Api(#[from] ApiError),
    #[error("Manual reset is disabled")]
    ManualResetDisabled,
    #[error("Unknown reset scope: {0}")]
    UnknownScope(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        error!("Error occurred: {:?}", self);
        let (status_code, error_message) = match &self {
            AppError::InvalidConfig(_) => (
                AxumStatusCode::INTERNAL_SERVER_ERROR,
                "Server configuration error.".to_string(),
            ),
            AppError::Api(_) => (
                AxumStatusCode::BAD_GATEWAY,
                "Failed to communicate with the backend API.".to_string(),
            ),
            AppError::ManualResetDisabled => (
                AxumStatusCode::FORBIDDEN,
                "Manual reset is disabled by configuration.".to_string(),
            ),
            AppError::UnknownScope(scope) => (
                AxumStatusCode::BAD_REQUEST,
                format!("Unknown reset scope '{}'. Use monthly or biweekly.", scope),
            ),
        };
        (status_code, error_message).into_response()
    }
}

/// Runtime configuration not covered by `ResetConfig`.
#[derive(Clone, Debug)]
struct AppConfig {
    status_addr: SocketAddr,
    api: AndradeConfig,
}

/// Dashboard runtime for the Auto Andrade workshop.
#[derive(Parser, Debug)]
#[command(name = "andrade-core", version, about)]
struct Args {
    /// Bind address for the local status server (overrides ANDRADE_STATUS_ADDR)
    #[arg(long)]
    status_addr: Option<SocketAddr>,
    /// Backend API base URL (overrides ANDRADE_API_BASE_URL)
    #[arg(long)]
    api_base_url: Option<String>,
}

#[derive(Clone)]
struct AppState {
    monthly: Arc<PeriodResetScheduler<MonthlyScheme>>,
    biweekly: Arc<PeriodResetScheduler<BiweeklyScheme>>,
    taller: TallerSection,
    mechanics: MechanicsSection,
    reports: ReportsSection,
    reset_config: ResetConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;
    info!("Tracing subscriber initialized.");

    let app_config = load_app_config(&args)?;
    info!("App configuration loaded.");
    let reset_config = ResetConfig::from_env().context("Loading RESET_* configuration failed")?;
    info!("Reset configuration loaded: {:?}", reset_config);

    let api: Arc<dyn BackendApi> = Arc::new(
        AndradeClient::new(app_config.api.clone()).context("Building backend API client failed")?,
    );
    info!(
        "Backend API client initialized ({})",
        app_config.api.base_url
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let monthly = Arc::new(PeriodResetScheduler::new(
        MonthlyScheme::new(reset_config.reset_day),
        clock.clone(),
        reset_config.clone(),
    ));
    let biweekly = Arc::new(PeriodResetScheduler::new(
        BiweeklyScheme,
        clock.clone(),
        reset_config.for_biweekly(),
    ));
    info!(
        "Schedulers initialized: monthly period {:?}, biweekly period {:?}",
        monthly.current_period(),
        biweekly.current_period()
    );

    let taller = TallerSection::new(api.clone(), clock.clone());
    let mechanics = MechanicsSection::new(api.clone(), clock.clone());
    let reports = ReportsSection::new(api.clone(), clock.clone());

    // Sections subscribe before any reset can fire.
    tokio::spawn(taller::run_reset_listener(
        taller.clone(),
        monthly.subscribe(),
    ));
    tokio::spawn(reports::run_reset_listener(
        reports.clone(),
        monthly.subscribe(),
    ));
    tokio::spawn(mechanics::run_reset_listener(
        mechanics.clone(),
        biweekly.subscribe(),
    ));

    // Initial data load at startup (non-blocking).
    {
        let taller = taller.clone();
        let mechanics = mechanics.clone();
        let reports = reports.clone();
        tokio::spawn(async move {
            info!("Performing initial data load...");
            if let Err(e) = taller.refresh().await {
                error!("Initial taller load failed: {}", e);
            }
            if let Err(e) = mechanics.refresh().await {
                error!("Initial mechanics load failed: {}", e);
            }
            if let Err(e) = reports.refresh().await {
                error!("Initial reports load failed: {}", e);
            }
        });
    }

    // Poll task handles are held for the lifetime of main; dropping them
    // aborts the timers.
    let _monthly_tasks = spawn_polling(&monthly);
    let _biweekly_tasks = spawn_polling(&biweekly);

    let state = AppState {
        monthly,
        biweekly,
        taller,
        mechanics,
        reports,
        reset_config,
    };

    let app = Router::new()
        .route("/status", get(handle_status))
        .route("/api/reset/status", get(handle_reset_status))
        .route("/api/reset/execute", post(handle_execute_reset))
        .route("/api/taller/resumen", get(handle_taller_resumen))
        .route("/api/reportes/resumen", get(handle_reportes_resumen))
        .route("/api/mecanicos/comisiones", get(handle_mecanicos_comisiones))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting status server on http://{}", app_config.status_addr);
    let listener = tokio::net::TcpListener::bind(app_config.status_addr)
        .await
        .context("Binding status server address failed")?;
    axum::serve(listener, app)
        .await
        .context("Status server failed")?;

    Ok(())
}

fn load_app_config(args: &Args) -> Result<AppConfig, AppError> {
    let status_addr = match &args.status_addr {
        Some(addr) => *addr,
        None => env::var("ANDRADE_STATUS_ADDR")
            .unwrap_or_else(|_| DEFAULT_STATUS_ADDR.to_string())
            .parse()
            .map_err(|e| AppError::InvalidConfig(format!("ANDRADE_STATUS_ADDR: {}", e)))?,
    };
    let base_url = args
        .api_base_url
        .clone()
        .or_else(|| env::var("ANDRADE_API_BASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    let request_timeout_secs = env::var("ANDRADE_API_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

    Ok(AppConfig {
        status_addr,
        api: AndradeConfig {
            base_url,
            request_timeout_secs,
        },
    })
}

// --- Web Handlers ---

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn handle_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        service: "andrade-core",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct SchedulerStatus {
    event: &'static str,
    current_period: Period,
    state: ResetState,
    is_boundary_today: bool,
    banner: BannerStatus,
    subscribers: usize,
}

#[derive(Serialize)]
struct ResetStatusResponse {
    enabled: bool,
    allow_manual_reset: bool,
    preserve_history: bool,
    monthly: SchedulerStatus,
    biweekly: SchedulerStatus,
}

fn scheduler_status<S: PeriodScheme>(scheduler: &PeriodResetScheduler<S>) -> SchedulerStatus {
    SchedulerStatus {
        event: scheduler.event_name(),
        current_period: scheduler.current_period(),
        state: scheduler.state(),
        is_boundary_today: scheduler.is_boundary_now(),
        banner: banner_status(scheduler),
        subscribers: scheduler.subscriber_count(),
    }
}

async fn handle_reset_status(State(state): State<AppState>) -> Json<ResetStatusResponse> {
    Json(ResetStatusResponse {
        enabled: state.reset_config.enabled,
        allow_manual_reset: state.reset_config.allow_manual_reset,
        preserve_history: state.reset_config.preserve_history,
        monthly: scheduler_status(&state.monthly),
        biweekly: scheduler_status(&state.biweekly),
    })
}

#[derive(Deserialize)]
struct ResetScopeParams {
    scope: String,
}

async fn handle_execute_reset(
    State(state): State<AppState>,
    Query(params): Query<ResetScopeParams>,
) -> Result<Json<ResetEvent>, AppError> {
    if !state.reset_config.allow_manual_reset {
        return Err(AppError::ManualResetDisabled);
    }
    let event = match params.scope.as_str() {
        "monthly" => state.monthly.execute_reset(),
        "biweekly" => state.biweekly.execute_reset(),
        other => return Err(AppError::UnknownScope(other.to_string())),
    };
    info!("Manual reset executed for scope '{}'", params.scope);
    Ok(Json(event))
}

async fn handle_taller_resumen(State(state): State<AppState>) -> Json<taller::TallerResumen> {
    Json(state.taller.resumen())
}

async fn handle_reportes_resumen(State(state): State<AppState>) -> Json<reports::ReporteMensual> {
    Json(state.reports.resumen_mensual())
}

async fn handle_mecanicos_comisiones(
    State(state): State<AppState>,
) -> Json<mechanics::ComisionesResumen> {
    Json(state.mechanics.comisiones_quincena())
}
