//! Relationship engine: derives friendship and follow state and gates the
//! mutations that depend on it. Every function runs inside `run_db`, so it
//! talks to the database synchronously.
//!
//! Duplicate rows are refused by the store itself (`INSERT OR IGNORE` on a
//! unique key, conditional `UPDATE` on pending requests); the checks here
//! only pick the right error message.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use agora_db::Database;
use agora_db::models::{FriendRequestDetail, NewRepost};
use agora_types::api::{LikeResponse, PendingRequest, RelationshipResponse, RepostResponse};
use agora_types::models::{Decision, RequestDirection};

use crate::error::ApiError;

// -- Friend requests --

pub fn send_friend_request(
    db: &Database,
    from: Uuid,
    to: Uuid,
    now: DateTime<Utc>,
) -> Result<FriendRequestDetail, ApiError> {
    if from == to {
        return Err(ApiError::validation("You cannot send a friend request to yourself"));
    }
    if !db.member_exists(to)? {
        return Err(ApiError::NotFound("Member"));
    }
    if db.are_friends(from, to)? {
        return Err(ApiError::conflict("You are already friends"));
    }
    if let Some(pending) = db.pending_request_between(from, to)? {
        return Err(if pending.from_member_id == from {
            ApiError::conflict("Friend request already sent")
        } else {
            ApiError::conflict("This member has already sent you a friend request")
        });
    }

    let id = Uuid::new_v4();
    if !db.insert_friend_request(id, from, to, now)? {
        return Err(ApiError::conflict("Friend request already pending"));
    }
    debug!("Friend request {} opened: {} -> {}", id, from, to);

    db.get_friend_request_detail(id)?
        .ok_or(ApiError::NotFound("Friend request"))
}

/// Accept or reject a request. Only its recipient may decide, and only while
/// it is still pending.
pub fn resolve_friend_request(
    db: &Database,
    actor: Uuid,
    request_id: Uuid,
    decision: Decision,
    now: DateTime<Utc>,
) -> Result<FriendRequestDetail, ApiError> {
    let request = db
        .get_friend_request(request_id)?
        .ok_or(ApiError::NotFound("Friend request"))?;

    if request.to_member_id != actor {
        return Err(ApiError::Forbidden(
            "Only the recipient can respond to a friend request".into(),
        ));
    }

    let next = request
        .status
        .resolve(decision)
        .map_err(|done| ApiError::conflict(format!("Friend request already {}", done.0)))?;

    if !db.resolve_friend_request(request_id, next, now)? {
        // Someone resolved it between our read and the update
        let current = db
            .get_friend_request(request_id)?
            .map(|r| r.status)
            .unwrap_or(next);
        return Err(ApiError::conflict(format!("Friend request already {current}")));
    }
    debug!("Friend request {} {}", request_id, next);

    db.get_friend_request_detail(request_id)?
        .ok_or(ApiError::NotFound("Friend request"))
}

// -- Follows --

pub fn follow(db: &Database, follower: Uuid, following: Uuid, now: DateTime<Utc>) -> Result<(), ApiError> {
    if follower == following {
        return Err(ApiError::validation("You cannot subscribe to yourself"));
    }
    if !db.member_exists(following)? {
        return Err(ApiError::NotFound("Member"));
    }
    if !db.insert_subscription(follower, following, now)? {
        return Err(ApiError::conflict("Already subscribed to this member"));
    }
    Ok(())
}

pub fn unfollow(db: &Database, follower: Uuid, following: Uuid) -> Result<(), ApiError> {
    if !db.member_exists(following)? {
        return Err(ApiError::NotFound("Member"));
    }
    if !db.delete_subscription(follower, following)? {
        return Err(ApiError::conflict("Not subscribed to this member"));
    }
    Ok(())
}

// -- Likes --

pub fn like_post(db: &Database, member: Uuid, post_id: Uuid, now: DateTime<Utc>) -> Result<LikeResponse, ApiError> {
    ensure_post(db, post_id)?;
    if !db.insert_like(member, post_id, now)? {
        return Err(ApiError::conflict("Post already liked"));
    }
    Ok(LikeResponse {
        post_id,
        liked: true,
        likes_count: db.likes_count(post_id)?,
    })
}

pub fn unlike_post(db: &Database, member: Uuid, post_id: Uuid) -> Result<LikeResponse, ApiError> {
    ensure_post(db, post_id)?;
    if !db.delete_like(member, post_id)? {
        return Err(ApiError::conflict("Post not liked"));
    }
    Ok(LikeResponse {
        post_id,
        liked: false,
        likes_count: db.likes_count(post_id)?,
    })
}

// -- Reposts --

/// Record the repost and give the member an independent copy of the post:
/// same media, their own text.
pub fn repost(
    db: &Database,
    member: Uuid,
    original_post_id: Uuid,
    content: &str,
    now: DateTime<Utc>,
) -> Result<RepostResponse, ApiError> {
    ensure_post(db, original_post_id)?;

    let repost = NewRepost {
        id: Uuid::new_v4(),
        member_id: member,
        original_post_id,
        post_id: Uuid::new_v4(),
        content,
        created_at: now,
    };
    if !db.create_repost(&repost)? {
        return Err(ApiError::conflict("Post already reposted"));
    }

    let post = db
        .get_post(member, repost.post_id)?
        .ok_or(ApiError::NotFound("Post"))?;

    Ok(RepostResponse {
        id: repost.id,
        original_post_id,
        created_at: now,
        post,
    })
}

// -- Derived state --

/// How `viewer` relates to `other`.
pub fn relationship(db: &Database, viewer: Uuid, other: Uuid) -> Result<RelationshipResponse, ApiError> {
    if !db.member_exists(other)? {
        return Err(ApiError::NotFound("Member"));
    }

    let pending_request = db
        .pending_request_between(viewer, other)?
        .map(|r| PendingRequest {
            id: r.id,
            direction: if r.from_member_id == viewer {
                RequestDirection::Outgoing
            } else {
                RequestDirection::Incoming
            },
        });

    let viewer_friends: HashSet<Uuid> = db.friend_ids(viewer)?.into_iter().collect();
    let mutual_friends_count = db
        .friend_ids(other)?
        .into_iter()
        .filter(|id| viewer_friends.contains(id))
        .count() as u64;

    Ok(RelationshipResponse {
        member_id: other,
        is_friend: db.are_friends(viewer, other)?,
        pending_request,
        is_following: db.is_following(viewer, other)?,
        is_followed_by: db.is_following(other, viewer)?,
        mutual_friends_count,
    })
}

fn ensure_post(db: &Database, post_id: Uuid) -> Result<Uuid, ApiError> {
    db.post_author(post_id)?.ok_or(ApiError::NotFound("Post"))
}
