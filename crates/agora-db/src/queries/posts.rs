use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use agora_types::api::PostResponse;
use agora_types::paging::PageWindow;

use super::{OptionalExt, bounds, count_at, placeholders, summary_at};
use crate::Database;
use crate::models::{NewPost, PostChanges};

/// Post columns with author, reaction counts and whether the viewer (`?1`)
/// liked it. Posts are aliased `p`, authors `a`.
const POST_SELECT: &str = "
    SELECT p.id, a.id, a.username, a.first_name, a.last_name, a.avatar_url,
           p.content, p.image_url, p.video_url, p.created_at, p.updated_at,
           (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
           (SELECT COUNT(*) FROM reposts r WHERE r.post_id = p.id),
           EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.member_id = ?1)
    FROM posts p
    JOIN members a ON a.id = p.author_id";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostResponse> {
    Ok(PostResponse {
        id: row.get(0)?,
        author: summary_at(row, 1)?,
        content: row.get(6)?,
        image_url: row.get(7)?,
        video_url: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        likes_count: count_at(row, 11)?,
        comments_count: count_at(row, 12)?,
        reposts_count: count_at(row, 13)?,
        is_liked_by_user: row.get(14)?,
    })
}

pub(super) fn query_post(conn: &Connection, viewer: Uuid, id: Uuid) -> Result<Option<PostResponse>> {
    let sql = format!("{POST_SELECT} WHERE p.id = ?2");
    conn.query_row(&sql, params![viewer, id], post_from_row).optional()
}

pub(super) fn insert_post_row(conn: &Connection, post: &NewPost<'_>) -> Result<()> {
    conn.execute(
        "INSERT INTO posts (id, author_id, content, image_url, video_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            post.id,
            post.author_id,
            post.content,
            post.image_url,
            post.video_url,
            post.created_at,
        ],
    )?;
    Ok(())
}

impl Database {
    // -- Posts --

    pub fn insert_post(&self, post: &NewPost<'_>) -> Result<()> {
        self.with_conn_mut(|conn| insert_post_row(conn, post))
    }

    /// Fetch one post as seen by `viewer`.
    pub fn get_post(&self, viewer: Uuid, id: Uuid) -> Result<Option<PostResponse>> {
        self.with_conn(|conn| query_post(conn, viewer, id))
    }

    pub fn post_author(&self, id: Uuid) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT author_id FROM posts WHERE id = ?1", [id], |row| row.get(0))
                .optional()
        })
    }

    /// Posts written by any of `authors`, newest first. Ties on `created_at`
    /// fall back to insertion order.
    pub fn posts_by_authors(
        &self,
        viewer: Uuid,
        authors: &[Uuid],
        window: PageWindow,
    ) -> Result<(Vec<PostResponse>, u64)> {
        if authors.is_empty() {
            return Ok((vec![], 0));
        }

        let (limit, offset) = bounds(window);
        self.with_conn(|conn| {
            let authors_in = placeholders(2, authors.len());
            let limit_idx = authors.len() + 2;
            let sql = format!(
                "{POST_SELECT}
                 WHERE p.author_id IN ({authors_in})
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT ?{} OFFSET ?{}",
                limit_idx,
                limit_idx + 1
            );

            let mut values: Vec<&dyn ToSql> = Vec::with_capacity(authors.len() + 3);
            values.push(&viewer);
            values.extend(authors.iter().map(|id| id as &dyn ToSql));
            values.push(&limit);
            values.push(&offset);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(values.as_slice(), post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count_sql = format!(
                "SELECT COUNT(*) FROM posts WHERE author_id IN ({})",
                placeholders(1, authors.len())
            );
            let author_values: Vec<&dyn ToSql> = authors.iter().map(|id| id as &dyn ToSql).collect();
            let count: i64 = conn.query_row(&count_sql, author_values.as_slice(), |r| r.get(0))?;

            Ok((rows, count as u64))
        })
    }

    pub fn update_post(&self, id: Uuid, changes: &PostChanges<'_>, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(content) = changes.content {
                tx.execute("UPDATE posts SET content = ?1 WHERE id = ?2", params![content, id])?;
            }
            if let Some(image_url) = changes.image_url {
                tx.execute("UPDATE posts SET image_url = ?1 WHERE id = ?2", params![image_url, id])?;
            }
            if let Some(video_url) = changes.video_url {
                tx.execute("UPDATE posts SET video_url = ?1 WHERE id = ?2", params![video_url, id])?;
            }
            tx.execute("UPDATE posts SET updated_at = ?1 WHERE id = ?2", params![at, id])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Delete a post; likes, comments and repost rows go with it.
    pub fn delete_post(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }
}
