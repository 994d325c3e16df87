use std::collections::HashSet;

use uuid::Uuid;

use agora_db::Database;
use agora_types::api::PostResponse;
use agora_types::paging::{Page, PageWindow};

use crate::error::ApiError;

/// Members whose posts appear in `member`'s feed: accepted friends, members
/// they follow, and themselves.
pub fn visible_authors(db: &Database, member: Uuid) -> Result<Vec<Uuid>, ApiError> {
    let mut authors: HashSet<Uuid> = HashSet::new();
    authors.insert(member);
    authors.extend(db.friend_ids(member)?);
    authors.extend(db.following_ids(member)?);
    Ok(authors.into_iter().collect())
}

/// One page of the feed, most recent first.
pub fn assemble(db: &Database, member: Uuid, window: PageWindow) -> Result<Page<PostResponse>, ApiError> {
    let authors = visible_authors(db, member)?;
    let (posts, count) = db.posts_by_authors(member, &authors, window)?;
    Ok(Page::new(posts, count, window))
}
