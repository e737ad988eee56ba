//! HTTP handlers for the record and column endpoints

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use records_common::error::{Error, Result};
use records_common::types::ApiError;

use crate::batch::{body_records, pair_ids, split_ids, BatchOutcome};
use crate::definition::DefinitionService;
use crate::params::QueryParams;
use crate::policy::Operation;
use crate::reflection::{ReflectedColumn, ReflectedTable};
use crate::service::RecordService;

/// Shared REST API state
pub struct RestState {
    pub records: RecordService,
    pub definitions: DefinitionService,
}

impl RestState {
    #[must_use]
    pub fn new(records: RecordService, definitions: DefinitionService) -> Self {
        Self {
            records,
            definitions,
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Render an error as `ApiError` JSON with its status
#[must_use]
pub fn error_response(error: &Error) -> HttpResponse {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(ApiError::from(error))
}

fn failure(state: &RestState, operation: &str, table: &str, failed: &Error) -> HttpResponse {
    log_failure(state, operation, table, failed);
    error_response(failed)
}

fn log_failure(state: &RestState, operation: &str, table: &str, failed: &Error) {
    let dialect = state.records.db().dialect();
    if failed.status_code() >= 500 {
        error!(operation, table, %dialect, error = %failed, "Request failed");
    } else if failed.is_integrity_failure() {
        warn!(operation, table, %dialect, error = %failed, "Constraint violated");
    } else {
        debug!(operation, table, %dialect, error = %failed, "Request rejected");
    }
}

fn batch_response(state: &RestState, operation: Operation, table: &str, outcome: BatchOutcome) -> HttpResponse {
    for failed in outcome.errors() {
        log_failure(state, operation.as_str(), table, failed);
    }
    let (status, body) = outcome.into_response();
    HttpResponse::build(status).json(body)
}

fn parse_body(body: &[u8]) -> Result<Value> {
    if body.is_empty() {
        return Err(Error::InvalidInput("Missing request body".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

fn query_params(req: &HttpRequest) -> QueryParams {
    QueryParams::parse(req.query_string())
}

// ============================================================================
// Record Handlers
// ============================================================================

/// GET /records/{table} - List records
pub async fn list_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let table = path.into_inner();
    match state.records.list(&table, &query_params(&req)).await {
        Ok(document) => HttpResponse::Ok().json(document),
        Err(e) => failure(&state, "list", &table, &e),
    }
}

/// GET /records/{table}/{ids} - Read one or more records
pub async fn read_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let (table, ids) = path.into_inner();
    let params = query_params(&req);
    let ids = split_ids(&ids);

    let mut outcome = BatchOutcome::new();
    for id in &ids {
        let read = state.records.read(&table, id, &params).await.and_then(|record| {
            record
                .map(Value::Object)
                .ok_or_else(|| Error::RecordNotFound(format!("{table}/{id}")))
        });
        outcome.push(read);
    }
    single_or_batch(&state, Operation::Read, &table, outcome)
}

/// POST /records/{table} - Create one record, or one per array element
pub async fn create_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<String>,
    body: web::Bytes,
    req: HttpRequest,
) -> HttpResponse {
    let table = path.into_inner();
    let params = query_params(&req);
    let (records, many) = match parse_body(&body).and_then(body_records) {
        Ok(parsed) => parsed,
        Err(e) => return failure(&state, "create", &table, &e),
    };

    let mut outcome = BatchOutcome::new();
    for record in records {
        let created = state.records.create(&table, record, &params).await;
        if !many {
            return match created {
                Ok(id) => HttpResponse::Ok().json(id),
                Err(e) => failure(&state, "create", &table, &e),
            };
        }
        outcome.push(created);
    }
    batch_response(&state, Operation::Create, &table, outcome)
}

/// PUT /records/{table}/{ids} - Update records
pub async fn update_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
    req: HttpRequest,
) -> HttpResponse {
    modify(state, path, body, req, Operation::Update).await
}

/// PATCH /records/{table}/{ids} - Increment numeric fields of records
pub async fn increment_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
    req: HttpRequest,
) -> HttpResponse {
    modify(state, path, body, req, Operation::Increment).await
}

async fn modify(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
    req: HttpRequest,
    operation: Operation,
) -> HttpResponse {
    let (table, ids) = path.into_inner();
    let params = query_params(&req);
    let ids = split_ids(&ids);
    let pairs = match parse_body(&body).and_then(|body| pair_ids(&ids, body)) {
        Ok(pairs) => pairs,
        Err(e) => return failure(&state, operation.as_str(), &table, &e),
    };

    let mut outcome = BatchOutcome::new();
    for (id, record) in pairs {
        let modified = match operation {
            Operation::Increment => state.records.increment(&table, &id, record, &params).await,
            _ => state.records.update(&table, &id, record, &params).await,
        };
        outcome.push(modified.map(Value::from));
    }
    single_or_batch(&state, operation, &table, outcome)
}

/// DELETE /records/{table}/{ids} - Delete records
pub async fn delete_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let (table, ids) = path.into_inner();
    let params = query_params(&req);
    let ids = split_ids(&ids);

    let mut outcome = BatchOutcome::new();
    for id in &ids {
        let deleted = state.records.delete(&table, id, &params).await;
        outcome.push(deleted.map(Value::from));
    }
    single_or_batch(&state, Operation::Delete, &table, outcome)
}

fn single_or_batch(
    state: &RestState,
    operation: Operation,
    table: &str,
    outcome: BatchOutcome,
) -> HttpResponse {
    match outcome.into_single() {
        Ok(Ok(value)) => HttpResponse::Ok().json(value),
        Ok(Err(e)) => failure(state, operation.as_str(), table, &e),
        Err(outcome) => batch_response(state, operation, table, outcome),
    }
}

// ============================================================================
// Column Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct Rename {
    name: String,
}

fn parse_rename(body: &[u8]) -> Result<String> {
    let rename: Rename = serde_json::from_value(parse_body(body)?)?;
    if rename.name.trim().is_empty() {
        return Err(Error::InvalidInput("New name must not be empty".to_string()));
    }
    Ok(rename.name)
}

fn definition_response(state: &RestState, operation: &str, table: &str, result: Result<()>) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::Ok().json(true),
        Err(e) => failure(state, operation, table, &e),
    }
}

/// GET /columns - Every reflected table
pub async fn read_database_handler(state: web::Data<Arc<RestState>>) -> HttpResponse {
    match state.definitions.read_database().await {
        Ok(database) => HttpResponse::Ok().json(database),
        Err(e) => failure(&state, "read_database", "", &e),
    }
}

/// GET /columns/{table} - One reflected table
pub async fn read_table_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<String>,
) -> HttpResponse {
    let table = path.into_inner();
    match state.definitions.read_table(&table).await {
        Ok(reflected) => HttpResponse::Ok().json(reflected.as_ref()),
        Err(e) => failure(&state, "read_table", &table, &e),
    }
}

/// GET /columns/{table}/{column} - One reflected column
pub async fn read_column_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (table, column) = path.into_inner();
    match state.definitions.read_column(&table, &column).await {
        Ok(reflected) => HttpResponse::Ok().json(reflected),
        Err(e) => failure(&state, "read_column", &table, &e),
    }
}

/// POST /columns - Create a table
pub async fn create_table_handler(state: web::Data<Arc<RestState>>, body: web::Bytes) -> HttpResponse {
    let table: ReflectedTable = match parse_body(&body).and_then(|body| Ok(serde_json::from_value(body)?)) {
        Ok(table) => table,
        Err(e) => return failure(&state, "create_table", "", &e),
    };
    let result = state.definitions.create_table(&table).await;
    definition_response(&state, "create_table", table.name(), result)
}

/// PUT /columns/{table} - Rename a table
pub async fn rename_table_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    let table = path.into_inner();
    let result = match parse_rename(&body) {
        Ok(name) => state.definitions.rename_table(&table, &name).await,
        Err(e) => Err(e),
    };
    definition_response(&state, "rename_table", &table, result)
}

/// DELETE /columns/{table} - Drop a table or view
pub async fn remove_table_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<String>,
) -> HttpResponse {
    let table = path.into_inner();
    let result = state.definitions.remove_table(&table).await;
    definition_response(&state, "remove_table", &table, result)
}

/// POST /columns/{table} - Add a column
pub async fn add_column_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    let table = path.into_inner();
    let result = match parse_body(&body)
        .and_then(|body| Ok(serde_json::from_value::<ReflectedColumn>(body)?))
    {
        Ok(column) => state.definitions.add_column(&table, &column).await,
        Err(e) => Err(e),
    };
    definition_response(&state, "add_column", &table, result)
}

/// PUT /columns/{table}/{column} - Rename a column
pub async fn rename_column_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
) -> HttpResponse {
    let (table, column) = path.into_inner();
    let result = match parse_rename(&body) {
        Ok(name) => state.definitions.rename_column(&table, &column, &name).await,
        Err(e) => Err(e),
    };
    definition_response(&state, "rename_column", &table, result)
}

/// DELETE /columns/{table}/{column} - Drop a column
pub async fn remove_column_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (table, column) = path.into_inner();
    let result = state.definitions.remove_column(&table, &column).await;
    definition_response(&state, "remove_column", &table, result)
}

/// Unmatched paths
pub async fn not_found_handler(req: HttpRequest) -> HttpResponse {
    error_response(&Error::RouteNotFound(req.path().to_string()))
}

/// Health check
pub async fn health_handler() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "records",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
