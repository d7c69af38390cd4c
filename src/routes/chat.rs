use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chat::{sanitize_query, ChatError};
use crate::models::{AppState, ChatRequest, ChatResponse, HistoryResponse};
use crate::types::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/chat/{session_id}/history", get(get_history))
        .route("/api/chat/{session_id}", delete(clear_chat))
        .with_state(state)
}

/// POST /api/chat - run one research turn
///
/// The session lock is released while the pipeline runs; the controller's
/// awaiting-response state is what turns away a second query.
pub async fn post_chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    let start = Instant::now();

    // Rejected before a session is created or adopted.
    if sanitize_query(&request.message).is_empty() {
        return AppError::InvalidRequest(ChatError::EmptyQuery.to_string()).into_response();
    }

    let (session_id, session) = state.sessions.get_or_create(request.session_id).await;
    info!(session_id = %session_id, mode = %request.mode, "Received chat request");

    let turn = {
        let mut conversation = session.lock().await;
        conversation.ensure_greeting();
        conversation.begin_turn(&request.message, request.mode)
    };
    let turn = match turn {
        Ok(turn) => turn,
        Err(ChatError::EmptyQuery) => {
            return AppError::InvalidRequest(ChatError::EmptyQuery.to_string()).into_response()
        }
        Err(ChatError::Busy) => {
            warn!(session_id = %session_id, "Chat request rejected, session busy");
            return AppError::Conflict(ChatError::Busy.to_string()).into_response();
        }
    };

    // Spawned so the turn completes, and the session leaves its busy state,
    // even if the client goes away mid-request.
    let mode = turn.mode();
    let pipeline = Arc::clone(&state.pipeline);
    let conversation = Arc::clone(&session);
    let task = tokio::spawn(async move {
        let result = pipeline.run(turn.query(), turn.mode()).await;
        let reply = conversation.lock().await.complete_turn(turn, result).cloned();
        reply
    });

    let reply = match task.await {
        Ok(reply) => reply,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Research task failed");
            return AppError::Internal("Research task failed".to_string()).into_response();
        }
    };
    let Some(reply) = reply else {
        return AppError::Conflict("Conversation was cleared before the response arrived".to_string())
            .into_response();
    };

    let response_time = start.elapsed().as_millis() as u64;
    info!(session_id = %session_id, response_time, "Chat response sent");

    Json(ChatResponse {
        session_id,
        content: reply.content,
        images: reply.images,
        mode,
        response_time,
    })
    .into_response()
}

/// GET /api/chat/{session_id}/history
async fn get_history(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Response {
    let Some(session) = state.sessions.get(&session_id).await else {
        return AppError::NotFound(format!("Unknown session {}", session_id)).into_response();
    };

    let mut conversation = session.lock().await;
    conversation.ensure_greeting();
    Json(HistoryResponse {
        session_id,
        messages: conversation.history().to_vec(),
    })
    .into_response()
}

/// DELETE /api/chat/{session_id} - discard the history
async fn clear_chat(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Response {
    match state.sessions.get(&session_id).await {
        Some(session) => {
            session.lock().await.clear();
            StatusCode::NO_CONTENT.into_response()
        }
        None => AppError::NotFound(format!("Unknown session {}", session_id)).into_response(),
    }
}
