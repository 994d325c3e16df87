use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use agora_types::api::{Claims, MarkReadResponse, SendMessageRequest};
use agora_types::paging::{Page, PageQuery};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::{AppState, run_db};

const MESSAGE_MAX: usize = 4_000;

/// Inbox: one entry per conversation partner, most recent first.
pub async fn list_dialogs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = query.window();
    let member_id = claims.sub;
    let (dialogs, count) = run_db(&state, move |db| Ok(db.dialogs(member_id, window)?)).await?;

    Ok(Json(Page::new(dialogs, count, window)))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = claims.sub;
    if req.recipient == sender {
        return Err(ApiError::validation("You cannot send a message to yourself"));
    }
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::validation("Message content cannot be empty"));
    }
    if content.chars().count() > MESSAGE_MAX {
        return Err(ApiError::validation(format!(
            "Message must be at most {MESSAGE_MAX} characters"
        )));
    }

    let recipient = req.recipient;
    let message = run_db(&state, move |db| {
        if !db.member_exists(recipient)? {
            return Err(ApiError::NotFound("Member"));
        }
        let id = Uuid::new_v4();
        db.insert_message(id, sender, recipient, &content, Utc::now())?;
        db.get_message(id)?.ok_or(ApiError::NotFound("Message"))
    })
    .await?;

    debug!("Message {} from {} to {}", message.id, sender, recipient);
    Ok((StatusCode::CREATED, Json(message)))
}

/// Messages exchanged with one member, newest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = query.window();
    let me = claims.sub;
    let (messages, count) = run_db(&state, move |db| {
        if !db.member_exists(member_id)? {
            return Err(ApiError::NotFound("Member"));
        }
        Ok(db.conversation(me, member_id, window)?)
    })
    .await?;

    Ok(Json(Page::new(messages, count, window)))
}

/// Mark everything `member_id` sent to the caller as read.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let updated = run_db(&state, move |db| {
        if !db.member_exists(member_id)? {
            return Err(ApiError::NotFound("Member"));
        }
        Ok(db.mark_read(me, member_id)?)
    })
    .await?;

    Ok(Json(MarkReadResponse { updated }))
}
