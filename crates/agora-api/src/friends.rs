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

use agora_types::api::{Claims, FriendRequestResponse, MemberResponse, SendFriendRequest};
use agora_types::models::{Decision, RequestDirection};
use agora_types::paging::{Page, PageWindow};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::{AppState, relationships, run_db};

#[derive(Debug, Deserialize)]
pub struct FriendListQuery {
    pub member_id: Option<Uuid>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    #[serde(rename = "type")]
    pub direction: Option<RequestDirection>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

/// Accepted friends of `member_id`, or of the caller.
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<FriendListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let member_id = query.member_id.unwrap_or(claims.sub);
    let window = PageWindow::new(query.limit, query.offset);

    let (rows, count) = run_db(&state, move |db| {
        if !db.member_exists(member_id)? {
            return Err(ApiError::NotFound("Member"));
        }
        Ok(db.list_friends(member_id, window)?)
    })
    .await?;

    Ok(Json(Page::new(rows, count, window).map(MemberResponse::from)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RequestListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let direction = query.direction.unwrap_or(RequestDirection::Incoming);
    let window = PageWindow::new(query.limit, query.offset);
    let member_id = claims.sub;

    let (rows, count) = run_db(&state, move |db| {
        Ok(db.list_friend_requests(member_id, direction, window)?)
    })
    .await?;

    Ok(Json(Page::new(rows, count, window).map(FriendRequestResponse::from)))
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendFriendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let from = claims.sub;
    let detail = run_db(&state, move |db| {
        relationships::send_friend_request(db, from, req.to_member, Utc::now())
    })
    .await?;

    info!("{} sent a friend request to {}", claims.username, detail.to_member.username);
    Ok((StatusCode::CREATED, Json(FriendRequestResponse::from(detail))))
}

pub async fn accept_request(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    respond(state, path, claims, Decision::Accept).await
}

pub async fn reject_request(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    respond(state, path, claims, Decision::Reject).await
}

async fn respond(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    decision: Decision,
) -> Result<Json<FriendRequestResponse>, ApiError> {
    let actor = claims.sub;
    let detail = run_db(&state, move |db| {
        relationships::resolve_friend_request(db, actor, request_id, decision, Utc::now())
    })
    .await?;

    info!(
        "{} {} friend request {}",
        claims.username, detail.request.status, request_id
    );
    Ok(Json(FriendRequestResponse::from(detail)))
}
