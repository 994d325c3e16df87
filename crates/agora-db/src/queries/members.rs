use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use agora_types::models::{MemberOrdering, PresenceKind};
use agora_types::paging::PageWindow;

use super::{OptionalExt, bounds, count_at, parse_column};
use crate::Database;
use crate::models::{CredentialsRow, MemberChanges, MemberRow, MemberWrite, NewMember};

/// Member columns plus derived counts and the latest presence event, for the
/// members table aliased as `m`.
pub(super) const MEMBER_COLUMNS: &str = "
    m.id, m.username, m.email, m.first_name, m.last_name, m.avatar_url, m.bio, m.date_joined,
    (SELECT COUNT(*) FROM friend_requests f
        WHERE f.status = 'accepted' AND (f.from_member_id = m.id OR f.to_member_id = m.id)),
    (SELECT COUNT(*) FROM subscriptions s WHERE s.following_id = m.id),
    (SELECT COUNT(*) FROM subscriptions s WHERE s.follower_id = m.id),
    (SELECT e.kind FROM presence_events e WHERE e.member_id = m.id
        ORDER BY e.occurred_at DESC, e.rowid DESC LIMIT 1),
    (SELECT e.occurred_at FROM presence_events e WHERE e.member_id = m.id
        ORDER BY e.occurred_at DESC, e.rowid DESC LIMIT 1)";

pub(super) fn member_from_row(row: &Row<'_>) -> rusqlite::Result<MemberRow> {
    let kind: Option<String> = row.get(11)?;
    let latest_presence = match kind {
        Some(_) => Some((
            parse_column::<PresenceKind>(row, 11)?,
            row.get::<_, DateTime<Utc>>(12)?,
        )),
        None => None,
    };

    Ok(MemberRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        avatar_url: row.get(5)?,
        bio: row.get(6)?,
        date_joined: row.get(7)?,
        friends_count: count_at(row, 8)?,
        followers_count: count_at(row, 9)?,
        following_count: count_at(row, 10)?,
        latest_presence,
    })
}

impl Database {
    // -- Members --

    /// Insert a member unless the username or email is already taken.
    pub fn create_member(&self, member: &NewMember<'_>) -> Result<MemberWrite> {
        self.with_conn_mut(|conn| {
            if username_taken(conn, member.username, None)? {
                return Ok(MemberWrite::UsernameTaken);
            }
            if email_taken(conn, member.email, None)? {
                return Ok(MemberWrite::EmailTaken);
            }

            conn.execute(
                "INSERT INTO members (id, username, email, password, first_name, last_name, date_joined)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    member.id,
                    member.username,
                    member.email,
                    member.password_hash,
                    member.first_name,
                    member.last_name,
                    member.date_joined,
                ],
            )?;
            Ok(MemberWrite::Done)
        })
    }

    pub fn get_member(&self, id: Uuid) -> Result<Option<MemberRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MEMBER_COLUMNS} FROM members m WHERE m.id = ?1");
            conn.query_row(&sql, [id], member_from_row).optional()
        })
    }

    pub fn member_exists(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM members WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_credentials(&self, username: &str) -> Result<Option<CredentialsRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password FROM members WHERE username = ?1",
                [username],
                |row| {
                    Ok(CredentialsRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn list_members(
        &self,
        ordering: MemberOrdering,
        window: PageWindow,
    ) -> Result<(Vec<MemberRow>, u64)> {
        let (limit, offset) = bounds(window);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMBER_COLUMNS} FROM members m ORDER BY {} LIMIT ?1 OFFSET ?2",
                ordering.order_by()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit, offset], member_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row("SELECT COUNT(*) FROM members", [], |r| r.get(0))?;
            Ok((rows, count as u64))
        })
    }

    /// Case-insensitive substring match on username, first and last name.
    pub fn search_members(&self, query: &str, window: PageWindow) -> Result<(Vec<MemberRow>, u64)> {
        const MATCH: &str = "instr(lower(m.username), lower(?1)) > 0
            OR instr(lower(m.first_name), lower(?1)) > 0
            OR instr(lower(m.last_name), lower(?1)) > 0";

        let (limit, offset) = bounds(window);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMBER_COLUMNS} FROM members m WHERE {MATCH}
                 ORDER BY m.username ASC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![query, limit, offset], member_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM members m WHERE {MATCH}"),
                [query],
                |r| r.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }

    pub fn update_member(&self, id: Uuid, changes: &MemberChanges<'_>) -> Result<MemberWrite> {
        self.with_conn_mut(|conn| {
            if let Some(username) = changes.username {
                if username_taken(conn, username, Some(id))? {
                    return Ok(MemberWrite::UsernameTaken);
                }
            }
            if let Some(email) = changes.email {
                if email_taken(conn, email, Some(id))? {
                    return Ok(MemberWrite::EmailTaken);
                }
            }

            let tx = conn.transaction()?;
            if let Some(username) = changes.username {
                tx.execute("UPDATE members SET username = ?1 WHERE id = ?2", params![username, id])?;
            }
            if let Some(email) = changes.email {
                tx.execute("UPDATE members SET email = ?1 WHERE id = ?2", params![email, id])?;
            }
            if let Some(first_name) = changes.first_name {
                tx.execute("UPDATE members SET first_name = ?1 WHERE id = ?2", params![first_name, id])?;
            }
            if let Some(last_name) = changes.last_name {
                tx.execute("UPDATE members SET last_name = ?1 WHERE id = ?2", params![last_name, id])?;
            }
            if let Some(avatar_url) = changes.avatar_url {
                tx.execute("UPDATE members SET avatar_url = ?1 WHERE id = ?2", params![avatar_url, id])?;
            }
            if let Some(bio) = changes.bio {
                tx.execute("UPDATE members SET bio = ?1 WHERE id = ?2", params![bio, id])?;
            }
            tx.commit()?;
            Ok(MemberWrite::Done)
        })
    }

    // -- Presence --

    pub fn record_presence(&self, member_id: Uuid, kind: PresenceKind, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO presence_events (member_id, kind, occurred_at) VALUES (?1, ?2, ?3)",
                params![member_id, kind.as_str(), at],
            )?;
            Ok(())
        })
    }
}

fn username_taken(conn: &Connection, username: &str, except: Option<Uuid>) -> Result<bool> {
    let found: Option<Uuid> = conn
        .query_row("SELECT id FROM members WHERE username = ?1", [username], |r| r.get(0))
        .optional()?;
    Ok(matches!(found, Some(owner) if Some(owner) != except))
}

fn email_taken(conn: &Connection, email: &str, except: Option<Uuid>) -> Result<bool> {
    let found: Option<Uuid> = conn
        .query_row("SELECT id FROM members WHERE email = ?1", [email], |r| r.get(0))
        .optional()?;
    Ok(matches!(found, Some(owner) if Some(owner) != except))
}
