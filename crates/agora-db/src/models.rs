//! Database row types for tables whose stored shape differs from the API
//! shape. Simple rows (posts, comments, messages) map straight into the
//! `agora-types` responses inside the query functions.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use agora_types::api::{FriendRequestResponse, MemberResponse, MemberSummary};
use agora_types::models::{FriendRequestStatus, Presence, PresenceKind};

/// A member together with the relationship counts and latest presence event
/// computed by the member query.
#[derive(Debug)]
pub struct MemberRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub bio: String,
    pub date_joined: DateTime<Utc>,
    pub friends_count: u64,
    pub followers_count: u64,
    pub following_count: u64,
    pub latest_presence: Option<(PresenceKind, DateTime<Utc>)>,
}

impl MemberRow {
    pub fn presence(&self) -> Presence {
        Presence::derive(self.latest_presence, self.date_joined)
    }
}

impl From<MemberRow> for MemberResponse {
    fn from(row: MemberRow) -> Self {
        let presence = row.presence();
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            avatar_url: row.avatar_url,
            bio: row.bio,
            date_joined: row.date_joined,
            last_seen: presence.last_seen,
            is_online: presence.online,
            friends_count: row.friends_count,
            followers_count: row.followers_count,
            following_count: row.following_count,
        }
    }
}

/// Only what login needs.
#[derive(Debug)]
pub struct CredentialsRow {
    pub id: Uuid,
    pub username: String,
    pub password: String,
}

pub struct NewMember<'a> {
    pub id: Uuid,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub date_joined: DateTime<Utc>,
}

/// Profile fields to overwrite; `None` leaves the column untouched.
#[derive(Default)]
pub struct MemberChanges<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    /// `Some(None)` clears the avatar.
    pub avatar_url: Option<Option<&'a str>>,
    pub bio: Option<&'a str>,
}

/// Result of a write that can collide with the unique member columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberWrite {
    Done,
    UsernameTaken,
    EmailTaken,
}

pub struct NewPost<'a> {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: &'a str,
    pub image_url: Option<&'a str>,
    pub video_url: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct PostChanges<'a> {
    pub content: Option<&'a str>,
    pub image_url: Option<Option<&'a str>>,
    pub video_url: Option<Option<&'a str>>,
}

pub struct NewRepost<'a> {
    pub id: Uuid,
    pub member_id: Uuid,
    pub original_post_id: Uuid,
    /// Id of the post materialized for the reposting member.
    pub post_id: Uuid,
    pub content: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct FriendRequestRow {
    pub id: Uuid,
    pub from_member_id: Uuid,
    pub to_member_id: Uuid,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Friend request joined with both members, ready to serialize.
#[derive(Debug)]
pub struct FriendRequestDetail {
    pub request: FriendRequestRow,
    pub from_member: MemberSummary,
    pub to_member: MemberSummary,
}

impl From<FriendRequestDetail> for FriendRequestResponse {
    fn from(detail: FriendRequestDetail) -> Self {
        Self {
            id: detail.request.id,
            from_member: detail.from_member,
            to_member: detail.to_member,
            status: detail.request.status,
            created_at: detail.request.created_at,
            responded_at: detail.request.responded_at,
        }
    }
}
