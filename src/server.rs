//! REST API for the support desk frontend.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use crate::error::{KnowledgeError, MailboxError, PipelineError};
use crate::mailbox::{Ticket, TicketSource};
use crate::pipeline::SupportPipeline;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SupportPipeline>,
    pub mailbox: Arc<dyn TicketSource>,
}

/// Error returned by a handler, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        error!(error = %e, "Query processing failed");
        Self::Internal(e.to_string())
    }
}

impl From<MailboxError> for ApiError {
    fn from(e: MailboxError) -> Self {
        error!(error = %e, "Mailbox fetch failed");
        Self::Internal(e.to_string())
    }
}

impl From<KnowledgeError> for ApiError {
    fn from(e: KnowledgeError) -> Self {
        match e {
            KnowledgeError::InvalidName(_) => Self::BadRequest(e.to_string()),
            KnowledgeError::Io(_) => {
                error!(error = %e, "Knowledge document write failed");
                Self::Internal(e.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub ticket_id: u64,
    pub content: String,
    pub recipient: String,
}

#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    pub message: String,
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveDocumentRequest {
    pub name: String,
    pub content: String,
}

/// Build the API router.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/health-check", get(health))
        .route("/api/emails", get(list_emails))
        .route("/api/emails/send", post(send_email))
        .route("/api/emails/generate-response", post(generate_response))
        .route("/api/knowledge", get(list_knowledge).post(save_knowledge))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// CORS for the listed origins, with credentials. Methods and headers are
/// mirrored from the preflight request.
///
/// A `*` entry is dropped: a wildcard cannot be combined with credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            if origin.trim() == "*" {
                warn!("Ignoring wildcard CORS origin, credentials require explicit origins");
                return None;
            }
            match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "OK" }))
}

// ── Emails ──────────────────────────────────────────────────────────────

/// GET /api/emails
///
/// Zero or one ticket: the newest mailbox message.
async fn list_emails(State(state): State<AppState>) -> Result<Json<Vec<Ticket>>, ApiError> {
    let ticket = state.mailbox.fetch_latest_ticket().await?;
    Ok(Json(ticket.into_iter().collect()))
}

/// POST /api/emails/send
///
/// Drafts a reply for the ticket. Nothing is sent over SMTP.
async fn send_email(
    State(state): State<AppState>,
    Json(req): Json<SendEmailRequest>,
) -> Result<Json<SendEmailResponse>, ApiError> {
    info!(ticket_id = req.ticket_id, recipient = %req.recipient, "Reply requested");
    let subject = format!("Re: Ticket #{}", req.ticket_id);
    let reply = state.pipeline.process_query(&subject, &req.content).await?;
    Ok(Json(SendEmailResponse {
        message: "Email processed successfully".to_string(),
        response: reply.text,
    }))
}

/// POST /api/emails/generate-response
async fn generate_response(
    State(state): State<AppState>,
    Json(ticket): Json<Ticket>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Some(content) = ticket.latest_content() else {
        return Err(ApiError::BadRequest("Ticket has no messages".to_string()));
    };
    let reply = state.pipeline.process_query(&ticket.title, content).await?;
    Ok(Json(GenerateResponse { response: reply.text }))
}

// ── Knowledge ───────────────────────────────────────────────────────────

async fn list_knowledge(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipeline.knowledge().names().await)
}

async fn save_knowledge(
    State(state): State<AppState>,
    Json(req): Json<SaveDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .pipeline
        .knowledge()
        .save_document(&req.name, &req.content)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Document saved", "name": req.name })),
    ))
}
