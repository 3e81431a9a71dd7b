use actix_middleware::{
    BucketStore, CorrelationIdMiddleware, InMemoryBucketStore, RateLimiter, RedisBucketStore,
};
use actix_web::{web, App, HttpResponse, HttpServer};
use chrono::Utc;
use idempotency_gate::{
    IdempotencyGate, IdempotencyStore, InMemoryIdempotencyStore, PgIdempotencyStore,
};
use recipe_service::config::IdempotencyStoreKind;
use recipe_service::db::{
    self, PgInteractionLedger, PgPopularitySource, PgRecipeCorpus, PgUserRecipeRepository,
};
use recipe_service::jobs::{IdempotencyCleanupJob, PopularityRefreshJob};
use recipe_service::services::{
    CurationService, PopularityBoard, ScoringEngine, SearchService, Taxonomy,
};
use recipe_service::{configure_extractors, configure_routes, AppState, Config};
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct HealthState {
    db_pool: sqlx::PgPool,
    redis_manager: Option<Arc<Mutex<ConnectionManager>>>,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "lowercase")]
enum ComponentStatus {
    Healthy,
    Unhealthy,
}

#[derive(Serialize)]
struct ComponentCheck {
    status: ComponentStatus,
    message: String,
    latency_ms: u64,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    checks: HashMap<String, ComponentCheck>,
    timestamp: String,
}

impl HealthState {
    async fn check_postgres(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.db_pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn check_redis(manager: &Mutex<ConnectionManager>) -> Result<(), String> {
        let mut conn = manager.lock().await;
        let pong: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| e.to_string())?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(format!("unexpected PING response: {}", pong))
        }
    }
}

fn component(name: &str, result: Result<(), String>, started: Instant) -> ComponentCheck {
    let latency_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(()) => ComponentCheck {
            status: ComponentStatus::Healthy,
            message: format!("{} reachable", name),
            latency_ms,
        },
        Err(e) => ComponentCheck {
            status: ComponentStatus::Unhealthy,
            message: format!("{} check failed: {}", name, e),
            latency_ms,
        },
    }
}

async fn health_summary(state: web::Data<HealthState>) -> HttpResponse {
    match state.check_postgres().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "recipe-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "error": format!("PostgreSQL connection failed: {}", e),
            "service": "recipe-service"
        })),
    }
}

async fn readiness_summary(state: web::Data<HealthState>) -> HttpResponse {
    let mut checks = HashMap::new();

    let started = Instant::now();
    let pg = state.check_postgres().await;
    checks.insert("postgresql".to_string(), component("PostgreSQL", pg, started));

    if let Some(manager) = &state.redis_manager {
        let started = Instant::now();
        let redis = HealthState::check_redis(manager).await;
        checks.insert("redis".to_string(), component("Redis", redis, started));
    }

    let ready = checks
        .values()
        .all(|c| matches!(c.status, ComponentStatus::Healthy));
    let response = ReadinessResponse {
        ready,
        checks,
        timestamp: Utc::now().to_rfc3339(),
    };

    if ready {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"alive": true}))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into());

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn other_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

/// Recipe Service
///
/// Personalized recipe search plus the idempotent, rate-limited mutation
/// endpoints around it.
///
/// # Routes
///
/// - `/api/v1/recipes/*` - search, lookup, save toggle, history events
/// - `/api/v1/me/*` - saved list, history feed, user recipe authoring
/// - `/api/v1/curation/*` - review of submitted user recipes
/// - `/api/v1/shared/{slug}` - share links, anonymous readers allowed
#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.app.json_logs);

    tracing::info!("Starting recipe-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    let db_pool = match db::create_pool(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database pool creation failed: {:#}", e);
            eprintln!("ERROR: Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    db::MIGRATOR
        .run(&db_pool)
        .await
        .map_err(|e| other_error("Failed to run migrations", e))?;
    tracing::info!("Database migrations applied");

    // Redis buckets are shared across instances; in-memory ones are per process.
    let rate_config = config.rate_limit_config();
    let (bucket_store, redis_manager) = match &config.redis.url {
        Some(url) => {
            let client =
                redis::Client::open(url.as_str()).map_err(|e| other_error("Invalid REDIS_URL", e))?;
            let manager = ConnectionManager::new(client)
                .await
                .map_err(|e| other_error("Failed to connect to Redis", e))?;
            let store = RedisBucketStore::new(manager.clone(), rate_config)
                .map_err(|e| other_error("Invalid rate limit policy", e))?;
            tracing::info!("Rate limit buckets stored in Redis");
            let store: Arc<dyn BucketStore> = Arc::new(store);
            (store, Some(Arc::new(Mutex::new(manager))))
        }
        None => {
            let store = InMemoryBucketStore::new(&rate_config)
                .map_err(|e| other_error("Invalid rate limit policy", e))?;
            tracing::warn!("REDIS_URL not set; rate limit buckets are per-process");
            let store: Arc<dyn BucketStore> = Arc::new(store);
            (store, None)
        }
    };
    let limiter = Arc::new(RateLimiter::new(bucket_store, rate_config));

    let idempotency_store: Arc<dyn IdempotencyStore> = match config.idempotency.store {
        IdempotencyStoreKind::Postgres => Arc::new(PgIdempotencyStore::new(db_pool.clone())),
        IdempotencyStoreKind::Memory => {
            tracing::warn!("Idempotency records kept in memory; replays do not survive restarts");
            Arc::new(InMemoryIdempotencyStore::new())
        }
    };
    let gate = IdempotencyGate::with_config(idempotency_store, config.idempotency.gate_config());

    let corpus = Arc::new(PgRecipeCorpus::new(db_pool.clone()));
    let ledger = Arc::new(PgInteractionLedger::new(db_pool.clone()));
    let taxonomy = Arc::new(Taxonomy::default());
    let popularity = PopularityBoard::new();

    let search = Arc::new(SearchService::new(
        corpus.clone(),
        ledger.clone(),
        popularity.clone(),
        ScoringEngine::new(config.ranking.scoring_params()),
        config.ranking.candidate_limit,
    ));
    let curation = Arc::new(CurationService::new(
        Arc::new(PgUserRecipeRepository::new(db_pool.clone())),
        taxonomy.clone(),
    ));

    let state = AppState {
        corpus,
        ledger,
        search,
        curation,
        gate: gate.clone(),
        taxonomy,
    };

    let popularity_job = PopularityRefreshJob::new(
        Arc::new(PgPopularitySource::new(db_pool.clone())),
        popularity,
        config.popularity.refresh_interval(),
        config.popularity.window_days,
    );
    let cleanup_job = IdempotencyCleanupJob::new(
        gate,
        limiter.clone(),
        Duration::from_secs(config.idempotency.cleanup_interval_secs),
    );

    let health_state = web::Data::new(HealthState {
        db_pool: db_pool.clone(),
        redis_manager,
    });
    let app_state = web::Data::new(state);

    let http_bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server at {}", http_bind_address);

    let server = HttpServer::new(move || {
        let limiter = limiter.clone();
        App::new()
            .wrap(CorrelationIdMiddleware)
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(configure_extractors)
            .app_data(app_state.clone())
            .app_data(health_state.clone())
            .route(
                "/metrics",
                web::get().to(recipe_service::metrics::serve_metrics),
            )
            .route("/api/v1/health", web::get().to(health_summary))
            .route("/api/v1/health/ready", web::get().to(readiness_summary))
            .route("/api/v1/health/live", web::get().to(liveness_check))
            .configure(move |cfg| configure_routes(cfg, limiter))
    })
    .bind(&http_bind_address)?
    .workers(config.app.workers)
    .run();

    let server_handle = server.handle();

    let mut tasks: JoinSet<io::Result<()>> = JoinSet::new();

    tasks.spawn(async move {
        tracing::info!("HTTP server is running");
        server.await
    });

    tasks.spawn(async move {
        popularity_job.run().await;
        Ok(())
    });

    tasks.spawn(async move {
        cleanup_job.run().await;
        Ok(())
    });

    let mut first_error: Option<io::Error> = None;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = tasks.join_next() => {
                match result {
                    Some(Ok(Ok(_))) => {
                        tracing::info!("Task completed; stopping service");
                        server_handle.stop(true).await;
                        tasks.shutdown().await;
                        break;
                    }
                    Some(Ok(Err(e))) => {
                        tracing::error!("Task returned error: {}", e);
                        first_error.get_or_insert(e);
                        server_handle.stop(true).await;
                        tasks.shutdown().await;
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!("Task join error: {}", e);
                        first_error.get_or_insert(other_error("task join", e));
                        server_handle.stop(true).await;
                        tasks.shutdown().await;
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                server_handle.stop(true).await;
                tasks.shutdown().await;
                break;
            }
        }
    }

    db_pool.close().await;
    tracing::info!("Recipe-service shutting down");

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
