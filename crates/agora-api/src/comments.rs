use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use agora_types::api::{Claims, CreateCommentRequest};
use agora_types::paging::{Page, PageQuery};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::permissions::ensure_owner;
use crate::{AppState, run_db};

const COMMENT_MAX: usize = 2_000;

/// Comments on a post, newest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = query.window();
    let (comments, count) = run_db(&state, move |db| {
        if db.post_author(post_id)?.is_none() {
            return Err(ApiError::NotFound("Post"));
        }
        Ok(db.list_comments(post_id, window)?)
    })
    .await?;

    Ok(Json(Page::new(comments, count, window)))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::validation("Comment content cannot be empty"));
    }
    if content.chars().count() > COMMENT_MAX {
        return Err(ApiError::validation(format!(
            "Comment must be at most {COMMENT_MAX} characters"
        )));
    }

    let author_id = claims.sub;
    let comment = run_db(&state, move |db| {
        if db.post_author(post_id)?.is_none() {
            return Err(ApiError::NotFound("Post"));
        }
        let id = Uuid::new_v4();
        db.insert_comment(id, author_id, post_id, &content, Utc::now())?;
        db.get_comment(id)?.ok_or(ApiError::NotFound("Comment"))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub;
    run_db(&state, move |db| {
        let comment = db
            .get_comment(comment_id)?
            .filter(|c| c.post_id == post_id)
            .ok_or(ApiError::NotFound("Comment"))?;
        ensure_owner(actor, comment.author.id, "comment")?;
        db.delete_comment(comment_id)?;
        Ok(())
    })
    .await?;

    info!("Member {} deleted comment {}", claims.username, comment_id);
    Ok(StatusCode::NO_CONTENT)
}
