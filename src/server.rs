//! HTTP surface: routing, request/response DTOs, handlers.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, FromRef, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{self, AuthUser, JwtAuth};
use crate::error::ApiError;
use crate::ingest::IngestPipeline;
use crate::models::{new_id, SessionRecord};
use crate::responder::{Responder, SourceInfo};
use crate::retrieve::Retriever;
use crate::store::DataStore;

/// Max accepted upload size.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Token keys.
    pub auth: Arc<JwtAuth>,
    /// Record collections.
    pub store: Arc<dyn DataStore>,
    /// Upload pipeline.
    pub ingest: Arc<IngestPipeline>,
    /// Query-time retrieval.
    pub retriever: Arc<Retriever>,
    /// Answer generation.
    pub responder: Arc<Responder>,
}

impl FromRef<AppState> for Arc<JwtAuth> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.auth)
    }
}

/// Builds the full route tree over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/sessions", post(create_session).get(list_sessions))
        .route(
            "/documents/upload",
            post(upload_document).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/chat/query", post(chat_query))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    user_id: String,
    email: String,
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let user = auth::register(state.store.as_ref(), &request.email, &request.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.user_id,
            email: user.email,
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = auth::login(
        state.store.as_ref(),
        &state.auth,
        &request.email,
        &request.password,
    )
    .await?;
    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
        expires_in: state.auth.ttl_secs(),
    }))
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<SessionRecord> for SessionResponse {
    fn from(session: SessionRecord) -> Self {
        Self {
            session_id: session.session_id,
            name: session.name,
            created_at: session.created_at,
        }
    }
}

async fn create_session(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("session name is required".to_string()));
    }
    let session = SessionRecord {
        session_id: new_id(),
        user_id: caller.user_id,
        name,
        created_at: Utc::now(),
    };
    state
        .store
        .create_session(&session)
        .await
        .map_err(ApiError::upstream)?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn list_sessions(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let sessions = state
        .store
        .list_sessions(&caller.user_id)
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    document_id: String,
    file_name: String,
    object_key: String,
    pages: u32,
    chunks_indexed: usize,
}

async fn upload_document(
    State(state): State<AppState>,
    caller: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut session_id: Option<String> = None;
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::Validation(format!("malformed multipart body: {err}")))?
    {
        let name = field.name().map(|name| name.to_string());
        match name.as_deref() {
            Some("sessionId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::Validation(format!("unreadable sessionId: {err}")))?;
                session_id = Some(text.trim().to_string());
            }
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| "upload.pdf".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::Validation(format!("unreadable file field: {err}")))?;
                upload = Some((file_name, data));
            }
            _ => {}
        }
    }

    let session_id = session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("sessionId field is required".to_string()))?;
    let (file_name, data) =
        upload.ok_or_else(|| ApiError::Validation("file field is required".to_string()))?;
    if !file_name.to_lowercase().ends_with(".pdf") {
        return Err(ApiError::Validation(
            "only PDF files are supported".to_string(),
        ));
    }

    require_session(state.store.as_ref(), &session_id, &caller.user_id).await?;

    let outcome = state
        .ingest
        .ingest_upload(data, &caller.user_id, &session_id, &file_name)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document_id: outcome.document.document_id,
            file_name: outcome.document.file_name,
            object_key: outcome.document.object_key,
            pages: outcome.document.pages,
            chunks_indexed: outcome.chunks_indexed,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    session_id: String,
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    sources: Vec<SourceInfo>,
}

async fn chat_query(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::Validation("message must not be empty".to_string()));
    }
    require_session(state.store.as_ref(), &request.session_id, &caller.user_id).await?;

    let retrieved = state
        .retriever
        .retrieve(message, &caller.user_id, &request.session_id)
        .await?;
    let reply = state
        .responder
        .respond(&caller.user_id, &request.session_id, message, &retrieved)
        .await?;
    Ok(Json(ChatResponse {
        reply: reply.reply,
        sources: reply.sources,
    }))
}

/// Ownership check shared by the protected session-scoped routes. A session
/// that exists but belongs to someone else is indistinguishable from one that
/// does not exist.
async fn require_session(
    store: &dyn DataStore,
    session_id: &str,
    user_id: &str,
) -> Result<(), ApiError> {
    store
        .find_session(session_id, user_id)
        .await
        .map_err(ApiError::upstream)?
        .map(|_| ())
        .ok_or_else(|| {
            ApiError::NotFound("session not found or not owned by caller".to_string())
        })
}
