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

use agora_db::models::{NewPost, PostChanges};
use agora_types::api::{Claims, CreatePostRequest, UpdatePostRequest};
use agora_types::paging::{Page, PageWindow};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::permissions::ensure_owner;
use crate::{AppState, feed, run_db};

const CONTENT_MAX: usize = 10_000;

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    pub author: Option<Uuid>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

/// GET /posts: the caller's feed, or one author's posts with `?author=`.
pub async fn list_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PostListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = PageWindow::new(query.limit, query.offset);
    let viewer = claims.sub;

    let page = run_db(&state, move |db| match query.author {
        Some(author) => {
            if !db.member_exists(author)? {
                return Err(ApiError::NotFound("Member"));
            }
            let (posts, count) = db.posts_by_authors(viewer, &[author], window)?;
            Ok(Page::new(posts, count, window))
        }
        None => feed::assemble(db, viewer, window),
    })
    .await?;

    Ok(Json(page))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = validate_content(&req.content)?.to_string();
    let image_url = media_url(req.image_url.as_deref(), "image_url")?.map(str::to_string);
    let video_url = media_url(req.video_url.as_deref(), "video_url")?.map(str::to_string);

    let author_id = claims.sub;
    let post = run_db(&state, move |db| {
        let id = Uuid::new_v4();
        db.insert_post(&NewPost {
            id,
            author_id,
            content: &content,
            image_url: image_url.as_deref(),
            video_url: video_url.as_deref(),
            created_at: Utc::now(),
        })?;
        db.get_post(author_id, id)?.ok_or(ApiError::NotFound("Post"))
    })
    .await?;

    info!("Member {} created post {}", claims.username, post.id);
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub;
    let post = run_db(&state, move |db| {
        db.get_post(viewer, post_id)?.ok_or(ApiError::NotFound("Post"))
    })
    .await?;

    Ok(Json(post))
}

/// Partial edit. An empty media URL removes that attachment.
pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req
        .content
        .as_deref()
        .map(validate_content)
        .transpose()?
        .map(str::to_string);
    let image_url = req
        .image_url
        .as_deref()
        .map(|url| media_url(Some(url), "image_url").map(|u| u.map(str::to_string)))
        .transpose()?;
    let video_url = req
        .video_url
        .as_deref()
        .map(|url| media_url(Some(url), "video_url").map(|u| u.map(str::to_string)))
        .transpose()?;

    let actor = claims.sub;
    let post = run_db(&state, move |db| {
        let author = db.post_author(post_id)?.ok_or(ApiError::NotFound("Post"))?;
        ensure_owner(actor, author, "post")?;

        let changes = PostChanges {
            content: content.as_deref(),
            image_url: image_url.as_ref().map(|u| u.as_deref()),
            video_url: video_url.as_ref().map(|u| u.as_deref()),
        };
        db.update_post(post_id, &changes, Utc::now())?;
        db.get_post(actor, post_id)?.ok_or(ApiError::NotFound("Post"))
    })
    .await?;

    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub;
    run_db(&state, move |db| {
        let author = db.post_author(post_id)?.ok_or(ApiError::NotFound("Post"))?;
        ensure_owner(actor, author, "post")?;
        if !db.delete_post(post_id)? {
            return Err(ApiError::NotFound("Post"));
        }
        Ok(())
    })
    .await?;

    info!("Member {} deleted post {}", claims.username, post_id);
    Ok(StatusCode::NO_CONTENT)
}

fn validate_content(content: &str) -> Result<&str, ApiError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Post content cannot be empty"));
    }
    if trimmed.chars().count() > CONTENT_MAX {
        return Err(ApiError::validation(format!(
            "Post content must be at most {CONTENT_MAX} characters"
        )));
    }
    Ok(trimmed)
}

/// Blank means "no media"; anything else must be an http(s) URL.
fn media_url<'a>(url: Option<&'a str>, field: &str) -> Result<Option<&'a str>, ApiError> {
    match url.map(str::trim) {
        None | Some("") => Ok(None),
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(Some(url)),
        Some(_) => Err(ApiError::validation(format!("{field} must be an http(s) URL"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_content_is_rejected() {
        assert!(validate_content("   ").is_err());
        assert_eq!(validate_content("  hello ").unwrap(), "hello");
    }

    #[test]
    fn content_limit_counts_characters() {
        let at_limit = "é".repeat(CONTENT_MAX);
        assert!(at_limit.len() > CONTENT_MAX);
        assert!(validate_content(&at_limit).is_ok());

        let over = "é".repeat(CONTENT_MAX + 1);
        assert!(validate_content(&over).is_err());
    }

    #[test]
    fn media_urls() {
        assert_eq!(media_url(None, "image_url").unwrap(), None);
        assert_eq!(media_url(Some(" "), "image_url").unwrap(), None);
        assert_eq!(
            media_url(Some("https://cdn.example/a.png"), "image_url").unwrap(),
            Some("https://cdn.example/a.png")
        );
        let err = media_url(Some("ftp://x"), "video_url").unwrap_err();
        assert_eq!(err.to_string(), "video_url must be an http(s) URL");
    }
}
