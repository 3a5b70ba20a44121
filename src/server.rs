//! HTTP API server: axum router and request handlers.
//!
//! Handlers never touch the crossing themselves. Each one queues a
//! [`ControlRequest`] for the control loop and awaits its reply, so every
//! mutation happens on the loop, between frames.

use crate::control::ControlRequest;
use crate::crosswalk::CrosswalkStatus;
use crate::handler::{CommandRequest, CommandResponse, ResponseStatus, StatusBody};
use crate::phase::Phase;
use crate::sequence::SequenceAction;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Json, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State`
/// extractor. The sender is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Queue feeding the control loop
    pub requests: mpsc::Sender<ControlRequest>,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(get_led, get_status, post_phase, post_sequence),
    components(schemas(
        CrosswalkStatus,
        StatusBody,
        ResponseStatus,
        Phase,
        PhaseRequest,
        SequenceAction,
        SequenceRequest,
    )),
    tags(
        (name = "lights", description = "Indicator control endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "Crosswalk API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for a simulated pedestrian crossing"
    )
)]
pub struct ApiDoc;

// ── Request/Response types ───────────────────────────────────────────

#[derive(Deserialize, utoipa::ToSchema)]
pub struct PhaseRequest {
    /// Named preset to apply
    #[schema(example = "go")]
    phase: Phase,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct SequenceRequest {
    /// Start or stop the timed sequence
    #[schema(example = "start")]
    action: SequenceAction,
}

impl IntoResponse for CommandResponse {
    fn into_response(self) -> Response {
        (self.code, Json(self.body)).into_response()
    }
}

fn loop_gone() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Control loop gone".to_string(),
    )
}

/// Queue a request and wait for the control loop to answer it.
async fn submit<T>(
    state: &AppState,
    request: ControlRequest,
    reply: oneshot::Receiver<T>,
) -> Result<T, (StatusCode, String)> {
    state.requests.send(request).await.map_err(|_| loop_gone())?;
    reply.await.map_err(|_| loop_gone())
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(
                    utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
                        .validator_url("none"),
                ),
        )
        .route("/led", get(get_led))
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/phase", post(post_phase))
        .route("/api/v1/sequence", post(post_sequence))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the listening socket. The crossing is reachable once this returns.
pub async fn bind(port: u16) -> io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Connected! Listening on http://{}", listener.local_addr()?);
    Ok(listener)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /led — set one light
#[utoipa::path(
    get,
    path = "/led",
    tag = "lights",
    params(CommandRequest),
    responses(
        (status = 200, description = "Command applied", body = StatusBody),
        (status = 400, description = "Missing channel or state", body = StatusBody),
        (status = 500, description = "Output could not be set", body = StatusBody)
    )
)]
async fn get_led(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<CommandResponse, (StatusCode, String)> {
    let request = match query {
        Ok(Query(pairs)) => {
            CommandRequest::from_query(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        }
        Err(rejection) => {
            tracing::warn!("Unreadable query: {}", rejection);
            return Ok(CommandResponse::error(StatusCode::BAD_REQUEST));
        }
    };

    let (reply, rx) = oneshot::channel();
    submit(&state, ControlRequest::Command { request, reply }, rx).await
}

/// GET /api/v1/status — current lights and figure
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current crossing status", body = CrosswalkStatus)
    )
)]
async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<CrosswalkStatus>, (StatusCode, String)> {
    let (reply, rx) = oneshot::channel();
    submit(&state, ControlRequest::Status { reply }, rx)
        .await
        .map(Json)
}

/// POST /api/v1/phase — apply a named phase
#[utoipa::path(
    post,
    path = "/api/v1/phase",
    tag = "lights",
    request_body = PhaseRequest,
    responses(
        (status = 200, description = "Phase applied", body = StatusBody),
        (status = 500, description = "Output could not be set", body = StatusBody)
    )
)]
async fn post_phase(
    State(state): State<AppState>,
    Json(req): Json<PhaseRequest>,
) -> Result<CommandResponse, (StatusCode, String)> {
    let (reply, rx) = oneshot::channel();
    submit(
        &state,
        ControlRequest::Phase {
            phase: req.phase,
            reply,
        },
        rx,
    )
    .await
}

/// POST /api/v1/sequence — start or stop the timed sequence
#[utoipa::path(
    post,
    path = "/api/v1/sequence",
    tag = "lights",
    request_body = SequenceRequest,
    responses(
        (status = 200, description = "Sequence started or stopped", body = StatusBody),
        (status = 500, description = "Output could not be set", body = StatusBody)
    )
)]
async fn post_sequence(
    State(state): State<AppState>,
    Json(req): Json<SequenceRequest>,
) -> Result<CommandResponse, (StatusCode, String)> {
    let (reply, rx) = oneshot::channel();
    submit(
        &state,
        ControlRequest::Sequence {
            action: req.action,
            reply,
        },
        rx,
    )
    .await
}
