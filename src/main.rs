use std::{process, sync::Arc};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::{CronStream, Schedule};
use trendline::{
    application::{
        error::AppError,
        jobs::{
            RecomputeScheduleContext, TaskQueue, process_scheduled_recompute, spawn_task_worker,
            task_queue,
        },
        recommendations::{InvalidationStatus, RecommendationService, RecomputeOutcome},
        repos::{EventStore, RecommendationStore},
    },
    cache::{CacheConfig, KvCache, MemoryCache, RedisCache},
    config::{self, CacheBackendSettings},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        memory::MemoryRepositories,
        telemetry,
    },
};
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

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Recompute(_) => run_recompute(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let service = Arc::new(build_service(&settings).await?);

    let (tasks, receiver) = task_queue(settings.jobs.queue_capacity.get() as usize);
    let worker = spawn_task_worker(
        receiver,
        service.clone(),
        settings.jobs.task_concurrency.get() as usize,
    );

    let monitor_handle = settings
        .jobs
        .recompute_schedule
        .clone()
        .map(|schedule| spawn_recompute_monitor(schedule, tasks.clone()));

    let state = HttpState {
        service,
        tasks,
        default_limit: settings.recommendations.default_limit,
    };
    let result = serve_http(&settings, state).await;

    if let Some(handle) = monitor_handle {
        handle.abort();
        let _ = handle.await;
    }

    if !worker.shutdown(settings.server.graceful_shutdown).await {
        warn!(
            target = "trendline::serve",
            "Background tasks were still running at shutdown"
        );
    }

    result
}

async fn run_recompute(settings: config::Settings) -> Result<(), AppError> {
    let service = build_service(&settings).await?;
    let report = service.recalculate_all_users().await;

    info!(
        target = "trendline::recompute",
        users_processed = report.users_processed,
        outcome = ?report.outcome,
        invalidation = ?report.invalidation,
        "Recompute command finished"
    );

    match (&report.outcome, &report.invalidation) {
        (RecomputeOutcome::Completed, InvalidationStatus::Completed { .. }) => Ok(()),
        (RecomputeOutcome::Aborted { user_id }, _) => Err(AppError::unexpected(format!(
            "recompute aborted at user {user_id} after {} users",
            report.users_processed
        ))),
        (RecomputeOutcome::UserListUnavailable, _) => Err(AppError::unexpected(
            "recompute could not list users",
        )),
        (_, _) => Err(AppError::unexpected(
            "recompute finished but cache invalidation failed",
        )),
    }
}

async fn build_service(settings: &config::Settings) -> Result<RecommendationService, AppError> {
    let (events, store) = init_repositories(settings).await?;
    let cache = init_cache(&settings.cache).await?;
    Ok(RecommendationService::new(
        events,
        store,
        cache,
        CacheConfig::from(&settings.cache),
    ))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<dyn EventStore>, Arc<dyn RecommendationStore>), AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        info!(
            target = "trendline::serve",
            "No database url configured; using the in-process store"
        );
        let repositories = Arc::new(MemoryRepositories::new());
        return Ok((repositories.clone(), repositories));
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    Ok((repositories.clone(), repositories))
}

async fn init_cache(cache: &config::CacheSettings) -> Result<Arc<dyn KvCache>, AppError> {
    match &cache.backend {
        CacheBackendSettings::Memory => Ok(Arc::new(MemoryCache::new(cache.memory_capacity))),
        CacheBackendSettings::Redis { url } => {
            let redis = RedisCache::connect(url)
                .await
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            Ok(Arc::new(redis))
        }
    }
}

fn spawn_recompute_monitor(schedule: Schedule, tasks: TaskQueue) -> tokio::task::JoinHandle<()> {
    let worker = WorkerBuilder::new("scheduled-recompute-worker")
        .data(RecomputeScheduleContext { tasks })
        .backend(CronStream::new(schedule))
        .build_fn(process_scheduled_recompute);

    let monitor = Monitor::new().register(worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "recompute monitor stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "trendline::serve",
        addr = %settings.server.addr,
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "trendline::serve", "Shutdown signal received");
}
