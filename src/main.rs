// Weather Collector v0.1
use axum::{routing::get, Router};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use db::store::{PgStore, Store};
use errors::CollectorError;
use services::cities::CityBootstrap;
use services::collector::Collector;
use services::geodb::GeoDbClient;
use services::openweather::{OpenWeatherClient, WeatherApi};
use services::report::{build_report, ReportOptions};
use services::scheduler::{
    Scheduler, SchedulerState, SchedulerSummary, SharedSchedulerState, ShutdownHandle,
};

/// Weather Collector API: OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Weather Collector API",
        version = "0.1.0",
        description = "Periodically collects current weather for tracked cities from \
            OpenWeather, stores every measurement in Postgres and reports average and \
            latest temperatures per city.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Collector", description = "Background collection scheduler status"),
        (name = "Reports", description = "Aggregates over stored measurements"),
    ),
    paths(
        routes::health::health_check,
        routes::collector::get_collector_status,
        routes::reports::get_summary,
        routes::reports::get_average_temperatures,
        routes::reports::get_latest_temperatures,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::reports::SummaryResponse,
            services::scheduler::SchedulerState,
            services::scheduler::SchedulerPhase,
            db::models::CityAverage,
            db::models::CityLatest,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

/// Scheduled weather collector for tracked cities.
#[derive(Parser)]
#[command(name = "weather-collector", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import cities from the cities file.
    InitCities {
        /// Delete all existing cities (and their measurements) first.
        #[arg(short = 'O', long = "override")]
        replace: bool,
    },
    /// Fetch the most populous cities from GeoDB, save them to the cities file and import them.
    FetchCities {
        /// Delete all existing cities (and their measurements) first.
        #[arg(short = 'O', long = "override")]
        replace: bool,
    },
    /// Run a single collection pass.
    FetchWeather,
    /// Collect weather on a schedule.
    Collect(ScheduleArgs),
    /// Print stored measurement statistics.
    Report {
        /// Include the average temperature per city.
        #[arg(long)]
        average: bool,
        /// Include the latest temperature per city.
        #[arg(long)]
        latest: bool,
    },
    /// Collect weather on a schedule and serve the HTTP API.
    Serve(ScheduleArgs),
}

#[derive(Args)]
struct ScheduleArgs {
    /// Stop after this many passes. Runs until interrupted when omitted.
    #[arg(short, long)]
    repeats: Option<u32>,
    /// Import cities (file first, then GeoDB) before the first pass.
    #[arg(short, long)]
    initial: bool,
    /// With --initial, delete all existing cities first.
    #[arg(short = 'O', long = "override")]
    replace: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let dotenv = dotenvy::dotenv();
    let config = AppConfig::from_env();
    init_tracing(config.as_ref().map(|c| c.log_json).unwrap_or(false));
    if let Err(e) = dotenv {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let result = match config {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "weather_collector=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(command: Command, config: AppConfig) -> Result<(), CollectorError> {
    match command {
        Command::InitCities { replace } => {
            let store = connect_store(&config).await?;
            city_bootstrap(&config, store)?.init_from_file(replace).await?;
        }
        Command::FetchCities { replace } => {
            let store = connect_store(&config).await?;
            city_bootstrap(&config, store)?
                .fetch_from_directory(replace)
                .await?;
        }
        Command::FetchWeather => {
            let store = connect_store(&config).await?;
            let outcome = collector(&config, store)?.run_pass().await?;
            tracing::info!(
                "Stored {} measurements for {} cities ({} skipped, {} newly geocoded)",
                outcome.stored,
                outcome.cities,
                outcome.skipped.len(),
                outcome.coordinates_resolved
            );
        }
        Command::Report { average, latest } => {
            let store = connect_store(&config).await?;
            let report = build_report(store.as_ref(), ReportOptions { average, latest }).await?;
            print!("{}", report);
        }
        Command::Collect(args) => {
            let store = connect_store(&config).await?;
            let state: SharedSchedulerState = Arc::new(RwLock::new(SchedulerState::new()));
            let (scheduler, shutdown) = scheduler(&config, &args, store, state)?;
            tokio::spawn(async move {
                shutdown_on_ctrl_c(shutdown).await;
            });
            log_summary(scheduler.run().await?);
        }
        Command::Serve(args) => serve(&config, &args).await?,
    }
    Ok(())
}

async fn serve(config: &AppConfig, args: &ScheduleArgs) -> Result<(), CollectorError> {
    let store = connect_store(config).await?;

    // Create shared scheduler state and spawn the scheduler
    let scheduler_state: SharedSchedulerState = Arc::new(RwLock::new(SchedulerState::new()));
    let (scheduler, shutdown) = scheduler(config, args, store.clone(), scheduler_state.clone())?;
    let scheduler_task = tokio::spawn(scheduler.run());

    // CORS: read-only API, restrict methods to GET
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .allow_headers(Any);

    // Health and reports read the store; the status route reads scheduler state.
    let store_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/reports/summary", get(routes::reports::get_summary))
        .route(
            "/api/v1/reports/average",
            get(routes::reports::get_average_temperatures),
        )
        .route(
            "/api/v1/reports/latest",
            get(routes::reports::get_latest_temperatures),
        )
        .with_state(store);

    let collector_routes = Router::new()
        .route(
            "/api/v1/collector/status",
            get(routes::collector::get_collector_status),
        )
        .with_state(scheduler_state);

    let app = Router::new()
        .merge(store_routes)
        .merge(collector_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on_ctrl_c(shutdown))
        .await?;

    match scheduler_task.await {
        Ok(result) => log_summary(result?),
        Err(e) => return Err(std::io::Error::other(e).into()),
    }
    Ok(())
}

async fn shutdown_on_ctrl_c(shutdown: ShutdownHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupted, finishing the current pass before stopping"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C, stopping: {}", e),
    }
    shutdown.shutdown();
}

fn log_summary(summary: SchedulerSummary) {
    tracing::info!(
        "Scheduler stopped after {} passes ({} successful, {} failed), {} measurements stored",
        summary.passes,
        summary.successful_passes,
        summary.failed_passes,
        summary.measurements_stored
    );
}

async fn connect_store(config: &AppConfig) -> Result<Arc<dyn Store>, CollectorError> {
    let store = PgStore::connect(config.require_database_url()?).await?;
    Ok(Arc::new(store))
}

fn weather_api(config: &AppConfig) -> Result<Arc<dyn WeatherApi>, CollectorError> {
    let client = OpenWeatherClient::new(
        &config.openweather_base_url,
        config.require_api_key()?,
        config.http_timeout(),
    )?;
    Ok(Arc::new(client))
}

fn city_bootstrap(config: &AppConfig, store: Arc<dyn Store>) -> Result<CityBootstrap, CollectorError> {
    let directory = GeoDbClient::new(&config.geodb_base_url, config.http_timeout())?;
    Ok(CityBootstrap::new(
        store,
        Arc::new(directory),
        &config.cities_file,
        config.cities_amount,
    ))
}

fn collector(config: &AppConfig, store: Arc<dyn Store>) -> Result<Collector, CollectorError> {
    Ok(Collector::new(weather_api(config)?, store, config.geocode_limit))
}

fn scheduler(
    config: &AppConfig,
    args: &ScheduleArgs,
    store: Arc<dyn Store>,
    state: SharedSchedulerState,
) -> Result<(Scheduler, ShutdownHandle), CollectorError> {
    let bootstrap = if args.initial {
        Some(city_bootstrap(config, store.clone())?)
    } else {
        None
    };
    let collector = collector(config, store)?;
    Ok(Scheduler::new(
        config.scheduler_config(args.repeats, args.initial, args.replace),
        collector,
        bootstrap,
        state,
    ))
}
