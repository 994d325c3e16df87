use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use agora_types::api::Claims;
use agora_types::models::SubscriptionSide;
use agora_types::paging::{Page, PageWindow};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::{AppState, relationships, run_db};

#[derive(Debug, Deserialize)]
pub struct SubscriptionListQuery {
    #[serde(rename = "type", default)]
    pub side: SubscriptionSide,
    pub member_id: Option<Uuid>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

/// Who a member follows (`type=following`, the default) or who follows them.
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SubscriptionListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let member_id = query.member_id.unwrap_or(claims.sub);
    let window = PageWindow::new(query.limit, query.offset);
    let side = query.side;

    let (rows, count) = run_db(&state, move |db| {
        if !db.member_exists(member_id)? {
            return Err(ApiError::NotFound("Member"));
        }
        Ok(db.list_subscriptions(member_id, side, window)?)
    })
    .await?;

    Ok(Json(Page::new(rows, count, window)))
}

/// Follow a member. Replies with the resulting relationship.
pub async fn follow(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let follower = claims.sub;
    let relationship = run_db(&state, move |db| {
        relationships::follow(db, follower, member_id, Utc::now())?;
        relationships::relationship(db, follower, member_id)
    })
    .await?;

    info!("{} followed {}", claims.username, member_id);
    Ok((StatusCode::CREATED, Json(relationship)))
}

pub async fn unfollow(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let follower = claims.sub;
    run_db(&state, move |db| relationships::unfollow(db, follower, member_id)).await?;

    info!("{} unfollowed {}", claims.username, member_id);
    Ok(StatusCode::NO_CONTENT)
}
