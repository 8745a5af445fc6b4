//! # HTTP API
//! Axum routes around the aggregation engine. Authentication is an
//! `X-API-KEY` header resolved through the account directory.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::aggregate::{Aggregator, ClientContext, Submission};
use crate::airports::{AirportTable, ChainedResolver, DynResolver};
use crate::category::Category;
use crate::config::{StoreBackend, StoreConfig};
use crate::directory::{key_fingerprint, DynDirectory, InMemoryDirectory, User};
use crate::error::{DirectoryError, StoreError, SubmissionError};
use crate::store::{DynStore, InMemorySnapshotStore, JsonlSnapshotStore};
use crate::summary::{category_sum, SumError};

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Registered routes, served by `GET /routes`.
pub const ROUTES: &[(&str, &str)] = &[
    ("/health", "GET"),
    ("/routes", "GET"),
    ("/create_user", "POST"),
    ("/create_client", "POST"),
    ("/associate_user_to_client", "POST"),
    ("/add_energy_data", "POST"),
    ("/get_client_data", "GET"),
    ("/get_category_sum", "GET"),
];

#[derive(Clone)]
pub struct AppState {
    pub directory: DynDirectory,
    pub store: DynStore,
    pub aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn new(directory: DynDirectory, store: DynStore, resolver: DynResolver) -> Self {
        Self {
            directory,
            store,
            aggregator: Arc::new(Aggregator::new(resolver)),
        }
    }

    /// In-memory directory and store, built-in airport table, no remote lookup.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryDirectory::new()),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(ChainedResolver::table_only(AirportTable::default_seed())),
        )
    }

    /// Store backend from config; the directory is always in-memory.
    pub fn from_config(cfg: &StoreConfig, resolver: DynResolver) -> Self {
        let store: DynStore = match cfg.backend {
            StoreBackend::Memory => Arc::new(InMemorySnapshotStore::new()),
            StoreBackend::Jsonl => Arc::new(JsonlSnapshotStore::new(cfg.path.clone())),
        };
        info!(target: "api", store = store.name(), resolver = resolver.name(), "app state ready");
        Self::new(Arc::new(InMemoryDirectory::new()), store, resolver)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/routes", get(list_routes))
        .route("/create_user", post(create_user))
        .route("/create_client", post(create_client))
        .route("/associate_user_to_client", post(associate_user_to_client))
        .route("/add_energy_data", post(add_energy_data))
        .route("/get_client_data", get(get_client_data))
        .route("/get_category_sum", get(get_category_sum))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/* ----------------------------
Errors
---------------------------- */

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("user is not associated with any client")]
    NotAssociated,
    #[error("user is not authorized to view data for client '{0}'")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{}", .0.body_text())]
    InvalidJson(#[from] JsonRejection),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Sum(#[from] SumError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingApiKey | ApiError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ApiError::NotAssociated | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) | ApiError::Submission(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidJson(e) => e.status(),
            ApiError::Directory(e) => match e {
                DirectoryError::EmailTaken(_)
                | DirectoryError::ClientExists(_)
                | DirectoryError::AlreadyAssociated { .. } => StatusCode::CONFLICT,
                DirectoryError::ClientNotFound(_) | DirectoryError::UserNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                DirectoryError::EmptyField(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::Sum(SumError::InvertedRange { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Sum(SumError::NoData(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Store(e) => {
                error!(target: "api", error = %e, "snapshot store failure");
                "snapshot store unavailable".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    let key = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(ApiError::MissingApiKey)?;
    match state.directory.resolve_actor(key).await {
        Some(u) => Ok(u),
        None => {
            warn!(target: "api", key = %key_fingerprint(key), "unknown API key");
            Err(ApiError::InvalidApiKey)
        }
    }
}

fn required(v: Option<String>, field: &str) -> ApiResult<String> {
    v.filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("missing '{field}'")))
}

fn year_param(q: &HashMap<String, String>, field: &str) -> ApiResult<i32> {
    let raw = q
        .get(field)
        .ok_or_else(|| ApiError::BadRequest(format!("missing '{field}'")))?;
    raw.trim()
        .parse::<i32>()
        .map_err(|_| ApiError::BadRequest(format!("'{field}' must be an integer year")))
}

/* ----------------------------
Accounts
---------------------------- */

#[derive(Deserialize)]
struct CreateUserReq {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserReq>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let username = required(body.username, "username")?;
    let email = required(body.email, "email")?;
    let user = state.directory.create_user(&username, &email).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "user created", "user": user })),
    ))
}

#[derive(Deserialize)]
struct CreateClientReq {
    #[serde(default)]
    name: Option<String>,
}

async fn create_client(
    State(state): State<AppState>,
    body: Result<Json<CreateClientReq>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let name = required(body.name, "name")?;
    let client = state.directory.create_client(&name).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "client created", "client": { "name": client.name } })),
    ))
}

#[derive(Deserialize)]
struct AssociateReq {
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

async fn associate_user_to_client(
    State(state): State<AppState>,
    body: Result<Json<AssociateReq>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let client_name = required(body.client_name, "client_name")?;
    let username = required(body.username, "username")?;
    state.directory.associate(&client_name, &username).await?;
    Ok(Json(json!({
        "message": format!("user {username} associated with client {client_name}")
    })))
}

/* ----------------------------
Submissions
---------------------------- */

async fn add_energy_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let user = authenticate(&state, &headers).await?;
    let client = state
        .directory
        .client_by_user(&user.api_key)
        .await
        .ok_or(ApiError::NotAssociated)?;

    let submission = Submission::from_json(&body)?;
    let ctx = ClientContext {
        client_name: client.name,
        username: user.username,
        authorized_user_keys: client.authorized_user_keys,
    };

    let agg = state.aggregator.aggregate(&ctx, &submission).await;
    if let Err(e) = state.store.append(&agg.snapshot).await {
        counter!("snapshot_store_errors_total").increment(1);
        return Err(e.into());
    }

    let report = agg.report;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("new snapshot created for client {}", ctx.client_name),
            "client": ctx.client_name,
            "username": ctx.username,
            "created_at": agg.snapshot.created_at,
            "year": report.year,
            "totals": report.totals,
            "discarded": report.discarded,
            "note": report.note,
        })),
    ))
}

/* ----------------------------
Reads
---------------------------- */

async fn get_client_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    let name = required(q.get("name").cloned(), "name")?;

    let Some(snapshot) = state.store.latest_for(&name, &user.api_key).await? else {
        return Err(match state.directory.client(&name).await {
            None => ApiError::NotFound(format!("client '{name}' not found")),
            Some(c) if c.authorized_user_keys.contains(&user.api_key) => {
                ApiError::NotFound(format!("no data for client '{name}'"))
            }
            Some(_) => ApiError::Forbidden(name),
        });
    };

    let users = state
        .directory
        .users_by_keys(&snapshot.authorized_user_keys)
        .await
        .into_iter()
        .map(|u| json!({ "username": u.username, "email": u.email }))
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "client": snapshot.client_name,
        "created_at": snapshot.created_at,
        "username": snapshot.username,
        "year": snapshot.year,
        "data": snapshot.data,
        "users": users,
    })))
}

async fn get_category_sum(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    if state.directory.client_by_user(&user.api_key).await.is_none() {
        return Err(ApiError::NotAssociated);
    }

    let category = required(q.get("category").cloned(), "category")?
        .parse::<Category>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let start_year = year_param(&q, "start_year")?;
    let end_year = year_param(&q, "end_year")?;

    // newest snapshot the caller can see, across all of their clients
    let snapshot = state
        .store
        .latest_for_actor(&user.api_key)
        .await?
        .ok_or_else(|| ApiError::NotFound("no data found".into()))?;

    let sum = category_sum(&snapshot, category, start_year, end_year)?;
    let mut body = json!(sum);
    body["client"] = json!(snapshot.client_name);
    Ok(Json(body))
}

async fn list_routes() -> Json<Value> {
    let routes = ROUTES
        .iter()
        .map(|(path, method)| format!("{path} {method}"))
        .collect::<Vec<_>>();
    Json(json!({ "routes": routes }))
}
