use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::{log_query_error, ErrorCode, QueryError};
use crate::query::{SearchRequest, SearchResponse};

const MIDI_CONTENT_TYPE: &str = "audio/midi";

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    ctx: Arc<AppContext>,
}

impl HttpState {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Run `job` against the context on the blocking pool; chunk and source
    /// file reads are synchronous.
    async fn blocking<T, F>(&self, job: F) -> Result<T, HttpServerError>
    where
        T: Send + 'static,
        F: FnOnce(&AppContext) -> Result<T, QueryError> + Send + 'static,
    {
        let ctx = Arc::clone(&self.ctx);
        tokio::task::spawn_blocking(move || job(&ctx))
            .await
            .map_err(|err| HttpServerError::Internal(format!("worker task failed: {}", err)))?
            .map_err(HttpServerError::from)
    }
}

/// `?start=` of a search request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub start: usize,
}

/// `?offset=` of an excerpt request, in ticks.
#[derive(Debug, Default, Deserialize)]
pub struct ExcerptQuery {
    #[serde(default)]
    pub offset: u32,
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum HttpServerError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<QueryError> for HttpServerError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::FileNotFound { .. } => Self::NotFound(err.message()),
            err if err.is_client_error() => Self::BadRequest(err.message()),
            err => {
                log_query_error(&err, "HTTP handler");
                Self::Internal(err.message())
            }
        }
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health endpoint response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub chunks: usize,
    pub files: usize,
}

/// Build the Axum router with all handlers.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/file/:id", get(file))
        .route("/file/:id/excerpt", get(file_excerpt))
        .with_state(state)
}

/// Run the HTTP server loop.
pub async fn run_http_server(ctx: Arc<AppContext>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding HTTP listener on {}", addr))?;
    log::info!("[HTTP] Listening on {}", addr);
    let router = build_router(HttpState::new(ctx));
    axum::serve(listener, router)
        .await
        .context("serving HTTP router")?;
    Ok(())
}

pub async fn health(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        chunks: state.ctx.engine().chunks().len(),
        files: state.ctx.files().len(),
    })
}

pub async fn search(
    State(state): State<HttpState>,
    Query(page): Query<PageQuery>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, HttpServerError> {
    let response = state
        .blocking(move |ctx| ctx.search(&request, page.start))
        .await?;
    Ok(Json(response))
}

pub async fn file(
    State(state): State<HttpState>,
    Path(file_id): Path<u32>,
) -> Result<Response, HttpServerError> {
    let bytes = state.blocking(move |ctx| ctx.file_bytes(file_id)).await?;
    Ok(midi_response(bytes, format!("{}.mid", file_id)))
}

pub async fn file_excerpt(
    State(state): State<HttpState>,
    Path(file_id): Path<u32>,
    Query(query): Query<ExcerptQuery>,
) -> Result<Response, HttpServerError> {
    let bytes = state
        .blocking(move |ctx| ctx.excerpt(file_id, query.offset))
        .await?;
    Ok(midi_response(
        bytes,
        format!("{}-{}.mid", file_id, query.offset),
    ))
}

fn midi_response(bytes: Vec<u8>, filename: String) -> Response {
    (
        [
            (CONTENT_TYPE, MIDI_CONTENT_TYPE.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}
