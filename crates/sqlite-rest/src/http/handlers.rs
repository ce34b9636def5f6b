use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use crate::core::exec::{is_query_safe, QueryKind, ResultShape};
use crate::core::types::{parse_body, QuerySpec};
use crate::error::{AppError, AppResult};
use crate::http::response::json_ok;
use crate::http::AppState;

type HandlerResult = Result<Response, AppError>;

// --- generic CRUD ---

pub async fn get_all(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> HandlerResult {
    let spec = QuerySpec::from_params(&params)?;
    let (limit, offset) = (spec.limit, spec.offset);
    let rows = state.db.fetch_all(table, spec).await?;
    Ok(json_ok(&json!({
        "status": "success",
        "total_rows": rows.len(),
        "data": rows,
        "limit": limit,
        "offset": offset,
    })))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> HandlerResult {
    let id = parse_id(&id)?;
    let columns = params
        .get("columns")
        .filter(|s| !s.is_empty())
        .map(|s| s.split(',').map(|c| c.trim().to_string()).collect::<Vec<_>>());
    let row = state.db.fetch_one(table, id, columns).await?;
    Ok(json_ok(&json!({ "status": "success", "data": row })))
}

pub async fn create(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: String,
) -> HandlerResult {
    let body = parse_body(&body)?;
    let id = state.db.insert(table, body).await?;
    Ok(json_ok(&json!({ "status": "success", "id": id })))
}

pub async fn update_one(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    body: String,
) -> HandlerResult {
    let id = parse_id(&id)?;
    let body = parse_body(&body)?;
    state.db.update(table, id, body).await?;
    Ok(json_ok(&json!({ "status": "success", "id": id })))
}

pub async fn delete_one(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> HandlerResult {
    let id = parse_id(&id)?;
    state.db.delete(table, id).await?;
    Ok(json_ok(&json!({ "status": "success", "id": id })))
}

// --- metadata ---

pub async fn list_tables(State(state): State<AppState>) -> HandlerResult {
    let tables = state.db.tables().await?;
    Ok(json_ok(&json!({
        "status": "success",
        "tables": tables,
        "count": tables.len(),
    })))
}

pub async fn table_schema(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> HandlerResult {
    let schema = state.db.table_schema(table.clone()).await?;
    Ok(json_ok(&json!({
        "status": "success",
        "table": table,
        "schema": schema,
    })))
}

pub async fn foreign_keys(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> HandlerResult {
    let foreign_keys = state.db.foreign_keys(table.clone()).await?;
    Ok(json_ok(&json!({
        "status": "success",
        "table": table,
        "foreign_keys": foreign_keys,
    })))
}

pub async fn db_info(State(state): State<AppState>) -> HandlerResult {
    let info = state.db.db_info().await?;
    Ok(json_ok(&json!({
        "status": "success",
        "sqlite_version": info.sqlite_version,
        "table_count": info.tables.len(),
        "tables": info.tables,
        "database_size": info.database_size,
        "database_path": state.config.db_path.display().to_string(),
    })))
}

pub async fn health(State(state): State<AppState>) -> HandlerResult {
    state.db.ping().await?;
    Ok(json_ok(&json!({
        "status": "success",
        "message": "API is healthy",
    })))
}

pub async fn version() -> Response {
    json_ok(&json!({
        "status": "success",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// --- raw SQL ---

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    #[serde(default)]
    pub query: String,
}

pub async fn exec(State(state): State<AppState>, body: String) -> HandlerResult {
    let payload: ExecRequest = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;
    if payload.query.is_empty() {
        return Err(AppError::BadRequest("Missing query parameter".into()));
    }

    // The deny-list gate runs before anything is sent to the engine.
    if !is_query_safe(&payload.query, &state.config.dangerous_ops) {
        return Err(AppError::Forbidden(
            "Query contains dangerous operations that are not allowed".into(),
        ));
    }

    let kind = QueryKind::classify(&payload.query);
    let response = match kind {
        // SHOW TABLES never executes literal SQL; it reads the catalog.
        QueryKind::ShowTables => {
            let tables = state.db.tables().await?;
            let rows: Vec<_> = tables.iter().map(|t| json!({ "table_name": t })).collect();
            json!({
                "status": "success",
                "type": kind.as_str(),
                "tables": tables,
                "rows": rows,
                "count": rows.len(),
            })
        }
        kind if kind.result_shape() == ResultShape::Rows => {
            let rows = state.db.exec_rows(payload.query).await?;
            json!({
                "status": "success",
                "type": kind.as_str(),
                "rows": rows,
                "count": rows.len(),
            })
        }
        kind => {
            let rows_affected = state.db.exec_count(payload.query).await?;
            json!({
                "status": "success",
                "type": kind.as_str(),
                "rows_affected": rows_affected,
            })
        }
    };
    Ok(json_ok(&response))
}

fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse::<i64>()
        .map_err(|e| AppError::BadRequest(format!("Invalid ID format: {e}")))
}
