//! Router and handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use anchorindex_core::Encoding;
use anchorindex_processors::supply::format_units;
use anchorindex_processors::{AssociationIndexer, DidResolver, GeneratorStatsEngine, SupplyTracker};

use crate::error::ApiError;
use crate::service::{AnchorService, HashCheck, VerifyRequest};

/// Shared handler state. Optional parts are absent when their processor is disabled.
#[derive(Clone)]
pub struct AppState {
    pub anchors: Arc<AnchorService>,
    pub supply: Option<Arc<SupplyTracker>>,
    pub generators: Option<Arc<GeneratorStatsEngine>>,
    pub associations: Option<Arc<AssociationIndexer>>,
    pub did: Option<Arc<DidResolver>>,
    /// Bearer secret required on `POST /hash`.
    pub api_secret: Option<String>,
}

impl AppState {
    pub fn new(anchors: Arc<AnchorService>) -> Self {
        Self {
            anchors,
            supply: None,
            generators: None,
            associations: None,
            did: None,
            api_secret: None,
        }
    }

    pub fn supply(mut self, supply: Arc<SupplyTracker>) -> Self {
        self.supply = Some(supply);
        self
    }

    pub fn generators(mut self, generators: Arc<GeneratorStatsEngine>) -> Self {
        self.generators = Some(generators);
        self
    }

    pub fn associations(mut self, associations: Arc<AssociationIndexer>) -> Self {
        self.associations = Some(associations);
        self
    }

    pub fn did(mut self, did: Arc<DidResolver>) -> Self {
        self.did = Some(did);
        self
    }

    pub fn api_secret(mut self, secret: impl Into<String>) -> Self {
        self.api_secret = Some(secret.into());
        self
    }
}

pub fn router(state: AppState) -> Router {
    let submit = post(submit_hash).route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_secret,
    ));

    Router::new()
        .route("/hash", submit)
        .route("/hash/verify", post(verify_hashes))
        .route("/hash/:hash", get(get_hash))
        .route("/hash/:hash/encoding/:encoding", get(get_hash_encoded))
        .route("/supply/circulating", get(circulating_supply))
        .route("/generators", get(generator_stats))
        .route("/associations/:address", get(associations_of))
        .route("/did/:address", get(resolve_did))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Auth ────────────────────────────────────────────────────────────────────

async fn require_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(secret) = state.api_secret.as_deref() else {
        return Ok(next.run(request).await);
    };
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented != Some(secret) {
        warn!(path = %request.uri().path(), "rejected request without valid secret");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

// ─── Anchoring ───────────────────────────────────────────────────────────────

fn parse_encoding(encoding: Option<&str>) -> Result<Encoding, ApiError> {
    match encoding {
        None => Ok(Encoding::Hex),
        Some(raw) => raw
            .parse()
            .map_err(|e: anchorindex_core::CodecError| ApiError::BadRequest(e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    hash: String,
    encoding: Option<String>,
}

async fn submit_hash(
    State(state): State<AppState>,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let encoding = parse_encoding(body.encoding.as_deref())?;
    let result = state.anchors.submit(&body.hash, encoding).await?;
    let status = if result.submitted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "chainpoint": result.chainpoint }))).into_response())
}

async fn lookup(state: &AppState, hash: &str, encoding: Encoding, check: HashCheck) -> Result<Response, ApiError> {
    match state.anchors.lookup(hash, encoding, check).await? {
        Some(chainpoint) => Ok(Json(json!({ "chainpoint": chainpoint })).into_response()),
        None => Ok((StatusCode::NOT_FOUND, Json(json!({ "chainpoint": null }))).into_response()),
    }
}

async fn get_hash(State(state): State<AppState>, Path(hash): Path<String>) -> Result<Response, ApiError> {
    lookup(&state, &hash, Encoding::Hex, HashCheck::Sha256).await
}

async fn get_hash_encoded(
    State(state): State<AppState>,
    Path((hash, encoding)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let encoding = parse_encoding(Some(&encoding))?;
    lookup(&state, &hash, encoding, HashCheck::Any).await
}

#[derive(Debug, Deserialize)]
struct EncodingQuery {
    encoding: Option<String>,
}

async fn verify_hashes(
    State(state): State<AppState>,
    Query(query): Query<EncodingQuery>,
    request: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = request?;
    let encoding = parse_encoding(query.encoding.as_deref())?;
    let result = state.anchors.verify(&request, encoding).await?;
    Ok(Json(result).into_response())
}

// ─── Chain statistics ────────────────────────────────────────────────────────

fn disabled(feature: &str) -> ApiError {
    ApiError::NotFound(format!("{feature} is not enabled"))
}

async fn circulating_supply(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let supply = state.supply.as_ref().ok_or_else(|| disabled("supply tracking"))?;
    let amount = supply
        .circulating_supply()
        .await
        .map_err(|e| ApiError::Internal(format!("failed to get circulating supply: {e}")))?;
    let formatted = format_units(amount);

    if params.get("output").map(String::as_str) == Some("raw") {
        return Ok(formatted.into_response());
    }
    Ok(Json(json!({ "circulatingSupply": formatted })).into_response())
}

async fn generator_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let generators = state.generators.as_ref().ok_or_else(|| disabled("generator stats"))?;
    Ok(Json(generators.stats().await).into_response())
}

// ─── Identity ────────────────────────────────────────────────────────────────

async fn associations_of(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    let associations = state.associations.as_ref().ok_or_else(|| disabled("association indexing"))?;
    Ok(Json(associations.associations_of(&address).await?).into_response())
}

async fn resolve_did(State(state): State<AppState>, Path(address): Path<String>) -> Result<Response, ApiError> {
    let did = state.did.as_ref().ok_or_else(|| disabled("DID resolution"))?;
    match did.resolve(&address).await? {
        Some(document) => Ok(Json(document).into_response()),
        None => Err(ApiError::NotFound(format!("no DID document for '{address}'"))),
    }
}
