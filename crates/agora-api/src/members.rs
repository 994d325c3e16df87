use axum::{
    Extension,
    extract::State,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use agora_db::models::{MemberChanges, MemberWrite};
use agora_types::api::{Claims, MemberResponse, PresenceResponse, UpdateMemberRequest};
use agora_types::models::MemberOrdering;
use agora_types::paging::{Page, PageWindow};

use crate::auth::{validate_email, validate_username};
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::permissions::ensure_owner;
use crate::{AppState, relationships, run_db};

#[derive(Debug, Deserialize)]
pub struct MemberListQuery {
    #[serde(default)]
    pub ordering: MemberOrdering,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

pub async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<MemberListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = PageWindow::new(query.limit, query.offset);
    let (rows, count) = run_db(&state, move |db| Ok(db.list_members(query.ordering, window)?)).await?;

    Ok(Json(Page::new(rows, count, window).map(MemberResponse::from)))
}

pub async fn search_members(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let term = query.q.trim().to_string();
    if term.is_empty() {
        return Err(ApiError::validation("Search query parameter 'q' is required"));
    }

    let window = PageWindow::new(query.limit, query.offset);
    let (rows, count) = run_db(&state, move |db| Ok(db.search_members(&term, window)?)).await?;

    Ok(Json(Page::new(rows, count, window).map(MemberResponse::from)))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let member = fetch_member(&state, claims.sub).await?;
    Ok(Json(member))
}

pub async fn get_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let member = fetch_member(&state, member_id).await?;
    Ok(Json(member))
}

/// PUT/PATCH /members/{id}: partial profile update, own profile only.
pub async fn update_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(username) = &req.username {
        validate_username(username)?;
    }
    if let Some(email) = &req.email {
        validate_email(email)?;
    }

    let actor = claims.sub;
    let member = run_db(&state, move |db| {
        if !db.member_exists(member_id)? {
            return Err(ApiError::NotFound("Member"));
        }
        ensure_owner(actor, member_id, "profile")?;

        let changes = MemberChanges {
            username: req.username.as_deref(),
            email: req.email.as_deref(),
            first_name: req.first_name.as_deref().map(str::trim),
            last_name: req.last_name.as_deref().map(str::trim),
            avatar_url: req
                .avatar_url
                .as_deref()
                .map(|url| Some(url.trim()).filter(|u| !u.is_empty())),
            bio: req.bio.as_deref(),
        };
        match db.update_member(member_id, &changes)? {
            MemberWrite::Done => {}
            MemberWrite::UsernameTaken => return Err(ApiError::validation("Username already exists")),
            MemberWrite::EmailTaken => return Err(ApiError::validation("Email already exists")),
        }

        let row = db.get_member(member_id)?.ok_or(ApiError::NotFound("Member"))?;
        Ok(MemberResponse::from(row))
    })
    .await?;

    info!("Member {} updated their profile", member.username);
    Ok(Json(member))
}

/// Online state derived from the member's latest login/logout event.
pub async fn presence(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let presence = run_db(&state, move |db| {
        let row = db.get_member(member_id)?.ok_or(ApiError::NotFound("Member"))?;
        Ok(row.presence())
    })
    .await?;

    Ok(Json(PresenceResponse {
        member_id,
        is_online: presence.online,
        last_seen: presence.last_seen,
    }))
}

pub async fn relationship(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub;
    let relationship = run_db(&state, move |db| relationships::relationship(db, viewer, member_id)).await?;
    Ok(Json(relationship))
}

async fn fetch_member(state: &AppState, member_id: Uuid) -> Result<MemberResponse, ApiError> {
    run_db(state, move |db| {
        let row = db.get_member(member_id)?.ok_or(ApiError::NotFound("Member"))?;
        Ok(MemberResponse::from(row))
    })
    .await
}
