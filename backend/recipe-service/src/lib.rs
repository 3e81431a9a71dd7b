/// Recipe Service Library
///
/// Personalized recipe search and the replay-safe mutation endpoints around
/// it (saves, history, user recipes, curation).
///
/// # Modules
///
/// - `handlers`: HTTP request handlers and route table
/// - `models`: recipes, user recipes, saved recipes, history events
/// - `services`: filter compiler, scoring, sequencing, ledger, curation
/// - `db`: PostgreSQL implementations of the service contracts
/// - `jobs`: popularity refresh and idempotency cleanup
/// - `error`: error types and problem-details rendering
/// - `config`: configuration management
/// - `metrics`: Prometheus collectors
use actix_middleware::{EndpointClass, RateLimitMiddleware, RateLimiter, RequesterIdentity};
use actix_web::web;
use idempotency_gate::IdempotencyGate;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};

use services::{CurationService, InteractionLedger, RecipeCorpus, SearchService, Taxonomy};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub corpus: Arc<dyn RecipeCorpus>,
    pub ledger: Arc<dyn InteractionLedger>,
    pub search: Arc<SearchService>,
    pub curation: Arc<CurationService>,
    pub gate: IdempotencyGate,
    pub taxonomy: Arc<Taxonomy>,
}

/// Register the `/api/v1` routes.
///
/// Identity wraps the whole API scope; rate limiting wraps each resource
/// with its endpoint class so that it runs after identity is known. Requests
/// identity rejects are charged to the client address one layer further out.
pub fn configure_routes(cfg: &mut web::ServiceConfig, limiter: Arc<RateLimiter>) {
    let read = || RateLimitMiddleware::new(limiter.clone(), EndpointClass::Read);
    let heavy = || RateLimitMiddleware::new(limiter.clone(), EndpointClass::HeavyWrite);

    cfg.service(
        web::scope("/api/v1/shared")
            .wrap(read())
            .wrap(RequesterIdentity::optional())
            .route("/{slug}", web::get().to(handlers::get_shared_recipe)),
    )
    .service(
        web::scope("/api/v1")
            .wrap(RequesterIdentity::required())
            .wrap(RateLimitMiddleware::unidentified(limiter.clone()))
            .service(
                web::resource("/recipes/search")
                    .wrap(read())
                    .route(web::get().to(handlers::search_recipes)),
            )
            .service(
                web::resource("/recipes/{id}")
                    .wrap(read())
                    .route(web::get().to(handlers::get_recipe)),
            )
            .service(
                web::resource("/recipes/{id}/save")
                    .wrap(read())
                    .route(web::put().to(handlers::toggle_save))
                    .route(web::get().to(handlers::get_membership)),
            )
            .service(
                web::resource("/recipes/{id}/history")
                    .wrap(read())
                    .route(web::post().to(handlers::record_history)),
            )
            .service(
                web::resource("/me/saved")
                    .wrap(read())
                    .route(web::get().to(handlers::list_saved)),
            )
            .service(
                web::resource("/me/history")
                    .wrap(read())
                    .route(web::get().to(handlers::list_history)),
            )
            .service(
                web::resource("/me/recipes")
                    .wrap(heavy())
                    .route(web::post().to(handlers::create_user_recipe)),
            )
            .service(
                web::resource("/me/recipes/{id}")
                    .wrap(heavy())
                    .route(web::patch().to(handlers::edit_user_recipe)),
            )
            .service(
                web::resource("/me/recipes/{id}/submit")
                    .wrap(heavy())
                    .route(web::post().to(handlers::submit_user_recipe)),
            )
            .service(
                web::resource("/me/recipes/{id}/share")
                    .wrap(read())
                    .route(web::post().to(handlers::share_user_recipe)),
            )
            .service(
                web::resource("/curation/{id}/review")
                    .wrap(read())
                    .route(web::post().to(handlers::review_user_recipe)),
            ),
    );
}

/// Extractor configuration routing malformed input through problem details.
pub fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(error::json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(error::query_error_handler))
        .app_data(web::PathConfig::default().error_handler(error::path_error_handler));
}
