pub mod auth;
pub mod handlers;
pub mod response;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::core::connection::DbHandle;
use crate::error::AppResult;

#[derive(Clone)]
pub struct AppState {
    pub db: DbHandle,
    pub config: Arc<Config>,
}

/// Two disjoint route tables keyed by the `/__/` prefix convention: the
/// fixed metadata/utility endpoints, then the generic per-table CRUD
/// routes. Static segments win over captures, so a request can never match
/// both.
pub fn router(state: AppState) -> Router {
    let metadata = Router::new()
        .route("/__/tables", get(handlers::list_tables))
        .route("/__/tables/{table}", get(handlers::table_schema))
        .route("/__/tables/{table}/foreign-keys", get(handlers::foreign_keys))
        .route("/__/db", get(handlers::db_info))
        .route("/__/health", get(handlers::health))
        .route("/__/version", get(handlers::version))
        .route("/__/exec", post(handlers::exec));

    let data = Router::new()
        .route("/{table}", get(handlers::get_all).post(handlers::create))
        .route(
            "/{table}/{id}",
            get(handlers::get_one)
                .patch(handlers::update_one)
                .delete(handlers::delete_one),
        );

    metadata
        .merge(data)
        .layer(middleware::from_fn_with_state(state.clone(), auth::basic_auth))
        .with_state(state)
}

pub async fn serve(config: Config) -> AppResult<()> {
    let db = DbHandle::spawn(config.db_path.clone());
    let state = AppState {
        db,
        config: Arc::new(config),
    };

    if state.config.auth.is_some() {
        tracing::info!("Basic Authentication enabled");
    }

    let app = router(state.clone());
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on port {}", state.config.port);
    axum::serve(listener, app).await?;
    Ok(())
}
