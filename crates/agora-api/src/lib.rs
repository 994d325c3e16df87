pub mod auth;
pub mod comments;
pub mod error;
pub mod extract;
pub mod feed;
pub mod friends;
pub mod members;
pub mod messages;
pub mod middleware;
pub mod permissions;
pub mod posts;
pub mod reactions;
pub mod relationships;
pub mod subscriptions;

use std::sync::Arc;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use chrono::Duration;
use tracing::error;

use agora_db::Database;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: impl Into<String>) -> Self {
        Self {
            db,
            jwt_secret: jwt_secret.into(),
            access_ttl: Duration::minutes(60),
            refresh_ttl: Duration::days(30),
        }
    }
}

/// Run blocking database work off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
}

/// All REST routes. Cross-cutting layers (CORS, tracing) are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        // Members
        .route("/members", get(members::list_members))
        .route("/members/search", get(members::search_members))
        .route("/members/me", get(members::me))
        .route(
            "/members/{member_id}",
            get(members::get_member)
                .put(members::update_member)
                .patch(members::update_member),
        )
        .route("/members/{member_id}/presence", get(members::presence))
        .route("/members/{member_id}/relationship", get(members::relationship))
        // Posts
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route(
            "/posts/{post_id}",
            get(posts::get_post)
                .put(posts::update_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/{post_id}/like", post(reactions::like_post))
        .route("/posts/{post_id}/unlike", post(reactions::unlike_post))
        .route("/posts/{post_id}/repost", post(reactions::repost_post))
        .route(
            "/posts/{post_id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/posts/{post_id}/comments/{comment_id}",
            axum::routing::delete(comments::delete_comment),
        )
        // Friends
        .route("/friends", get(friends::list_friends))
        .route(
            "/friends/requests",
            get(friends::list_requests).post(friends::send_request),
        )
        .route("/friends/requests/{request_id}/accept", post(friends::accept_request))
        .route("/friends/requests/{request_id}/reject", post(friends::reject_request))
        // Subscriptions
        .route("/subscriptions", get(subscriptions::list_subscriptions))
        .route(
            "/subscriptions/{member_id}",
            post(subscriptions::follow).delete(subscriptions::unfollow),
        )
        // Messages
        .route(
            "/messages",
            get(messages::list_dialogs).post(messages::send_message),
        )
        .route("/messages/{member_id}", get(messages::get_conversation))
        .route("/messages/{member_id}/read", post(messages::mark_read))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
