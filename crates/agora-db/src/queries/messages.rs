use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use uuid::Uuid;

use agora_types::api::{DialogResponse, MessageResponse};
use agora_types::paging::PageWindow;

use super::{OptionalExt, bounds, count_at, summary_at, summary_columns};
use crate::Database;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, created_at, is_read";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageResponse> {
    Ok(MessageResponse {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        is_read: row.get(5)?,
    })
}

impl Database {
    // -- Messages --

    pub fn insert_message(
        &self,
        id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, sender_id, receiver_id, content, at],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<MessageResponse>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
            conn.query_row(&sql, [id], message_from_row).optional()
        })
    }

    /// Messages exchanged between two members in either direction, newest
    /// first.
    pub fn conversation(&self, a: Uuid, b: Uuid, window: PageWindow) -> Result<(Vec<MessageResponse>, u64)> {
        const BETWEEN: &str = "(sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)";

        let (limit, offset) = bounds(window);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {BETWEEN}
                 ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![a, b, limit, offset], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM messages WHERE {BETWEEN}"),
                params![a, b],
                |r| r.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }

    /// One row per conversation partner: the latest message either way and
    /// the partner's unread messages, most recently active first.
    pub fn dialogs(&self, member_id: Uuid, window: PageWindow) -> Result<(Vec<DialogResponse>, u64)> {
        let (limit, offset) = bounds(window);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.id, c.sender_id, c.receiver_id, c.content, c.created_at, c.is_read,
                        c.unread, {}
                 FROM (
                     SELECT t.*,
                            ROW_NUMBER() OVER (
                                PARTITION BY t.partner_id ORDER BY t.created_at DESC, t.rid DESC
                            ) AS rn,
                            SUM(CASE WHEN t.receiver_id = ?1 AND t.is_read = 0 THEN 1 ELSE 0 END) OVER (
                                PARTITION BY t.partner_id
                            ) AS unread
                     FROM (
                         SELECT msg.rowid AS rid, msg.id, msg.sender_id, msg.receiver_id,
                                msg.content, msg.created_at, msg.is_read,
                                CASE WHEN msg.sender_id = ?1 THEN msg.receiver_id ELSE msg.sender_id END
                                    AS partner_id
                         FROM messages msg
                         WHERE msg.sender_id = ?1 OR msg.receiver_id = ?1
                     ) t
                 ) c
                 JOIN members p ON p.id = c.partner_id
                 WHERE c.rn = 1
                 ORDER BY c.created_at DESC, c.rid DESC
                 LIMIT ?2 OFFSET ?3",
                summary_columns("p")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![member_id, limit, offset], |row| {
                    Ok(DialogResponse {
                        last_message: message_from_row(row)?,
                        unread_count: count_at(row, 6)?,
                        member: summary_at(row, 7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END)
                 FROM messages WHERE sender_id = ?1 OR receiver_id = ?1",
                [member_id],
                |r| r.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }

    /// Mark everything `sender_id` sent to `receiver_id` as read. Returns the
    /// number of messages that changed.
    pub fn mark_read(&self, receiver_id: Uuid, sender_id: Uuid) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1 WHERE receiver_id = ?1 AND sender_id = ?2 AND is_read = 0",
                params![receiver_id, sender_id],
            )?;
            Ok(updated as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, member};

    fn send(db: &Database, from: Uuid, to: Uuid, text: &str, minute: i64) -> Uuid {
        let id = Uuid::new_v4();
        db.insert_message(id, from, to, text, at(minute)).unwrap();
        id
    }

    #[test]
    fn conversation_includes_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let alice = member(&db, "alice");
        let bob = member(&db, "bob");
        let carol = member(&db, "carol");

        send(&db, alice, bob, "hi bob", 1);
        let reply = send(&db, bob, alice, "hi alice", 2);
        send(&db, carol, alice, "unrelated", 3);

        let (messages, count) = db.conversation(alice, bob, PageWindow::default()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(messages[0].id, reply);
        assert_eq!(messages[1].content, "hi bob");
    }

    #[test]
    fn dialogs_group_by_partner_with_unread_counts() {
        let db = Database::open_in_memory().unwrap();
        let alice = member(&db, "alice");
        let bob = member(&db, "bob");
        let carol = member(&db, "carol");

        send(&db, bob, alice, "one", 1);
        send(&db, bob, alice, "two", 2);
        send(&db, alice, carol, "hey carol", 3);
        let latest_bob = send(&db, alice, bob, "answer", 4);

        let (dialogs, count) = db.dialogs(alice, PageWindow::default()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(dialogs.len(), 2);

        assert_eq!(dialogs[0].member.id, bob);
        assert_eq!(dialogs[0].last_message.id, latest_bob);
        assert_eq!(dialogs[0].unread_count, 2);

        assert_eq!(dialogs[1].member.id, carol);
        assert_eq!(dialogs[1].unread_count, 0);

        assert_eq!(db.mark_read(alice, bob).unwrap(), 2);
        assert_eq!(db.mark_read(alice, bob).unwrap(), 0);
        let (dialogs, _) = db.dialogs(alice, PageWindow::default()).unwrap();
        assert_eq!(dialogs[0].unread_count, 0);
    }
}
