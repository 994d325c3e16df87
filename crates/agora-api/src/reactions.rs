use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use agora_types::api::{Claims, RepostRequest};

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::{AppState, relationships, run_db};

pub async fn like_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let member = claims.sub;
    let like = run_db(&state, move |db| relationships::like_post(db, member, post_id, Utc::now())).await?;

    debug!("{} liked post {}", claims.username, post_id);
    Ok((StatusCode::CREATED, Json(like)))
}

pub async fn unlike_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let member = claims.sub;
    let like = run_db(&state, move |db| relationships::unlike_post(db, member, post_id)).await?;

    debug!("{} unliked post {}", claims.username, post_id);
    Ok(Json(like))
}

/// The body is optional; a bare POST reposts with empty text.
pub async fn repost_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<RepostRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let content = body
        .and_then(|Json(req)| req.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    let member = claims.sub;
    let repost = run_db(&state, move |db| {
        relationships::repost(db, member, post_id, &content, Utc::now())
    })
    .await?;

    debug!("{} reposted {} as {}", claims.username, post_id, repost.post.id);
    Ok((StatusCode::CREATED, Json(repost)))
}
