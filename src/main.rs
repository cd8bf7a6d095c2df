use std::{future::IntoFuture, process, sync::Arc};

use covid_chart::{
    application::{
        chart::ChartService,
        dataset::CovidDataService,
        error::AppError,
        fetch::FetchEngine,
        ports::{CacheStore, SystemClock},
    },
    config,
    domain::jurisdiction::Jurisdiction,
    infra::{
        assets::StaticAssets,
        error::InfraError,
        http::{self, HttpState},
        memory_store::MemoryCacheStore,
        redis_store::RedisCacheStore,
        telemetry,
        upstream::HttpUpstream,
    },
};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args.command.unwrap_or(config::Command::Serve);

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve => run_serve(settings).await,
        config::Command::Payload(args) => run_payload(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let charts = build_chart_service(&settings).await?;
    let assets = StaticAssets::new(settings.chart.static_dir.clone());
    if !assets.root().is_dir() {
        warn!(
            target: "covid_chart::startup",
            path = %assets.root().display(),
            "static directory does not exist; /static/ requests will 404"
        );
    }

    let state = HttpState { charts, assets };
    serve_http(&settings, state).await
}

async fn run_payload(settings: config::Settings, args: config::PayloadArgs) -> Result<(), AppError> {
    let charts = build_chart_service(&settings).await?;
    let jurisdiction = match args.state.as_deref() {
        Some(code) if !code.trim().is_empty() => Jurisdiction::state(code),
        _ => Jurisdiction::Us,
    };

    info!(
        target: "covid_chart::payload",
        page_type = jurisdiction.page_type(),
        "building chart payload"
    );

    let payload = charts.payload(&jurisdiction).await;
    let json = serde_json::to_string_pretty(&payload)
        .map_err(|err| AppError::unexpected(format!("failed to encode payload: {err}")))?;
    println!("{json}");
    Ok(())
}

async fn build_chart_service(settings: &config::Settings) -> Result<Arc<ChartService>, AppError> {
    let store = init_cache_store(settings).await?;
    let upstream = HttpUpstream::new(&settings.upstream.user_agent, settings.upstream.timeout)?;
    let engine = FetchEngine::new(store, Arc::new(upstream), Arc::new(SystemClock));

    let data = CovidDataService::new(
        Arc::new(engine),
        settings.upstream.endpoints.clone(),
        settings.upstream.ttls,
    );

    Ok(Arc::new(ChartService::new(
        Arc::new(data),
        settings.chart.time_zone,
    )))
}

async fn init_cache_store(settings: &config::Settings) -> Result<Arc<dyn CacheStore>, AppError> {
    match settings.redis.as_ref() {
        Some(redis) => {
            let store = RedisCacheStore::connect(&redis.url, &redis.endpoint).await?;
            Ok(Arc::new(store))
        }
        None => {
            warn!(
                target: "covid_chart::startup",
                "no redis address configured; using in-process cache"
            );
            Ok(Arc::new(MemoryCacheStore::new()))
        }
    }
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target: "covid_chart::startup",
        addr = %settings.server.addr,
        "listening"
    );

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        if signalled_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = deadline => {
            warn!(
                target: "covid_chart::shutdown",
                grace_seconds = grace.as_secs(),
                "in-flight requests did not finish in time"
            );
        }
    }

    info!(target: "covid_chart::shutdown", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target: "covid_chart::shutdown", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(
                    target: "covid_chart::shutdown",
                    error = %err,
                    "failed to listen for SIGTERM"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(target: "covid_chart::shutdown", "shutdown signal received");
}
