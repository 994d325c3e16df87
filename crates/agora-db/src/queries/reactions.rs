use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use uuid::Uuid;

use agora_types::api::CommentResponse;
use agora_types::paging::PageWindow;

use super::posts::insert_post_row;
use super::{OptionalExt, bounds, summary_at, summary_columns};
use crate::Database;
use crate::models::{NewPost, NewRepost};

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentResponse> {
    Ok(CommentResponse {
        id: row.get(0)?,
        post_id: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        author: summary_at(row, 4)?,
    })
}

fn comment_select() -> String {
    format!(
        "SELECT c.id, c.post_id, c.content, c.created_at, {}
         FROM comments c
         JOIN members a ON a.id = c.author_id",
        summary_columns("a")
    )
}

impl Database {
    // -- Likes --

    /// Insert a like. Returns false when the member already likes the post;
    /// the (member, post) primary key makes this safe under races.
    pub fn insert_like(&self, member_id: Uuid, post_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO likes (member_id, post_id, created_at) VALUES (?1, ?2, ?3)",
                params![member_id, post_id, at],
            )?;
            Ok(inserted == 1)
        })
    }

    /// Remove a like. Returns false when there was nothing to remove.
    pub fn delete_like(&self, member_id: Uuid, post_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM likes WHERE member_id = ?1 AND post_id = ?2",
                params![member_id, post_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn likes_count(&self, post_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM likes WHERE post_id = ?1", [post_id], |r| r.get(0))?;
            Ok(count as u64)
        })
    }

    // -- Comments --

    pub fn insert_comment(
        &self,
        id: Uuid,
        author_id: Uuid,
        post_id: Uuid,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (id, author_id, post_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, author_id, post_id, content, at],
            )?;
            Ok(())
        })
    }

    pub fn get_comment(&self, id: Uuid) -> Result<Option<CommentResponse>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE c.id = ?1", comment_select());
            conn.query_row(&sql, [id], comment_from_row).optional()
        })
    }

    /// Comments on a post, newest first.
    pub fn list_comments(&self, post_id: Uuid, window: PageWindow) -> Result<(Vec<CommentResponse>, u64)> {
        let (limit, offset) = bounds(window);
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE c.post_id = ?1 ORDER BY c.created_at DESC, c.rowid DESC LIMIT ?2 OFFSET ?3",
                comment_select()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![post_id, limit, offset], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM comments WHERE post_id = ?1", [post_id], |r| r.get(0))?;
            Ok((rows, count as u64))
        })
    }

    pub fn delete_comment(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    // -- Reposts --

    /// Record the (member, post) repost row and materialize the member's copy
    /// of the post in one transaction. Returns false, writing nothing, when
    /// the member already reposted it.
    pub fn create_repost(&self, repost: &NewRepost<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO reposts (id, member_id, post_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![repost.id, repost.member_id, repost.original_post_id, repost.created_at],
            )?;
            if inserted == 0 {
                return Ok(false);
            }

            let (image_url, video_url): (Option<String>, Option<String>) = tx.query_row(
                "SELECT image_url, video_url FROM posts WHERE id = ?1",
                [repost.original_post_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            insert_post_row(
                &tx,
                &NewPost {
                    id: repost.post_id,
                    author_id: repost.member_id,
                    content: repost.content,
                    image_url: image_url.as_deref(),
                    video_url: video_url.as_deref(),
                    created_at: repost.created_at,
                },
            )?;

            tx.commit()?;
            Ok(true)
        })
    }
}
