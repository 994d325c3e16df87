use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use agora_types::api::SubscriptionResponse;
use agora_types::models::{FriendRequestStatus, RequestDirection, SubscriptionSide};
use agora_types::paging::PageWindow;

use super::members::{MEMBER_COLUMNS, member_from_row};
use super::{OptionalExt, bounds, parse_column, summary_at, summary_columns};
use crate::Database;
use crate::models::{FriendRequestDetail, FriendRequestRow, MemberRow};

const REQUEST_COLUMNS: &str =
    "r.id, r.from_member_id, r.to_member_id, r.status, r.created_at, r.responded_at";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        id: row.get(0)?,
        from_member_id: row.get(1)?,
        to_member_id: row.get(2)?,
        status: parse_column::<FriendRequestStatus>(row, 3)?,
        created_at: row.get(4)?,
        responded_at: row.get(5)?,
    })
}

fn request_detail_from_row(row: &Row<'_>) -> rusqlite::Result<FriendRequestDetail> {
    Ok(FriendRequestDetail {
        request: request_from_row(row)?,
        from_member: summary_at(row, 6)?,
        to_member: summary_at(row, 11)?,
    })
}

fn request_detail_select() -> String {
    format!(
        "SELECT {REQUEST_COLUMNS}, {}, {}
         FROM friend_requests r
         JOIN members fm ON fm.id = r.from_member_id
         JOIN members tm ON tm.id = r.to_member_id",
        summary_columns("fm"),
        summary_columns("tm")
    )
}

fn query_friend_ids(conn: &Connection, member_id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT CASE WHEN from_member_id = ?1 THEN to_member_id ELSE from_member_id END
         FROM friend_requests
         WHERE status = 'accepted' AND (from_member_id = ?1 OR to_member_id = ?1)",
    )?;
    let ids = stmt
        .query_map([member_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<Uuid>, _>>()?;
    Ok(ids)
}

impl Database {
    // -- Friend requests --

    /// Open a pending request. Returns false when a pending request already
    /// exists between the two members in either direction.
    pub fn insert_friend_request(
        &self,
        id: Uuid,
        from_member_id: Uuid,
        to_member_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO friend_requests (id, from_member_id, to_member_id, status, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
                params![id, from_member_id, to_member_id, at],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_friend_request(&self, id: Uuid) -> Result<Option<FriendRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {REQUEST_COLUMNS} FROM friend_requests r WHERE r.id = ?1");
            conn.query_row(&sql, [id], request_from_row).optional()
        })
    }

    pub fn get_friend_request_detail(&self, id: Uuid) -> Result<Option<FriendRequestDetail>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE r.id = ?1", request_detail_select());
            conn.query_row(&sql, [id], request_detail_from_row).optional()
        })
    }

    /// The pending request between two members, whichever of them sent it.
    pub fn pending_request_between(&self, a: Uuid, b: Uuid) -> Result<Option<FriendRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friend_requests r
                 WHERE r.status = 'pending'
                   AND ((r.from_member_id = ?1 AND r.to_member_id = ?2)
                     OR (r.from_member_id = ?2 AND r.to_member_id = ?1))"
            );
            conn.query_row(&sql, params![a, b], request_from_row).optional()
        })
    }

    /// Move a pending request to `status`. Returns false when the request is
    /// no longer pending, so two concurrent resolutions cannot both win.
    pub fn resolve_friend_request(
        &self,
        id: Uuid,
        status: FriendRequestStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE friend_requests SET status = ?1, responded_at = ?2
                 WHERE id = ?3 AND status = 'pending'",
                params![status.as_str(), at, id],
            )?;
            Ok(updated == 1)
        })
    }

    /// Requests received (incoming) or sent (outgoing) by a member, newest
    /// first.
    pub fn list_friend_requests(
        &self,
        member_id: Uuid,
        direction: RequestDirection,
        window: PageWindow,
    ) -> Result<(Vec<FriendRequestDetail>, u64)> {
        let column = match direction {
            RequestDirection::Incoming => "to_member_id",
            RequestDirection::Outgoing => "from_member_id",
        };
        let (limit, offset) = bounds(window);

        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE r.{column} = ?1
                 ORDER BY r.created_at DESC, r.rowid DESC LIMIT ?2 OFFSET ?3",
                request_detail_select()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![member_id, limit, offset], request_detail_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM friend_requests WHERE {column} = ?1"),
                [member_id],
                |r| r.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }

    // -- Friendship --

    /// Friendship is symmetric: an accepted request in either direction.
    pub fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM friend_requests
                     WHERE status = 'accepted'
                       AND ((from_member_id = ?1 AND to_member_id = ?2)
                         OR (from_member_id = ?2 AND to_member_id = ?1))
                     LIMIT 1",
                    params![a, b],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn friend_ids(&self, member_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_friend_ids(conn, member_id))
    }

    pub fn list_friends(&self, member_id: Uuid, window: PageWindow) -> Result<(Vec<MemberRow>, u64)> {
        let (limit, offset) = bounds(window);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMBER_COLUMNS}
                 FROM friend_requests r
                 JOIN members m
                   ON m.id = CASE WHEN r.from_member_id = ?1 THEN r.to_member_id ELSE r.from_member_id END
                 WHERE r.status = 'accepted' AND (r.from_member_id = ?1 OR r.to_member_id = ?1)
                 ORDER BY m.username ASC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![member_id, limit, offset], member_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count = query_friend_ids(conn, member_id)?.len() as u64;
            Ok((rows, count))
        })
    }

    // -- Subscriptions --

    /// Follow a member. Returns false when the follow edge already exists.
    pub fn insert_subscription(&self, follower_id: Uuid, following_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO subscriptions (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
                params![follower_id, following_id, at],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn delete_subscription(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM subscriptions WHERE follower_id = ?1 AND following_id = ?2",
                params![follower_id, following_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM subscriptions WHERE follower_id = ?1 AND following_id = ?2",
                    params![follower_id, following_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn following_ids(&self, member_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT following_id FROM subscriptions WHERE follower_id = ?1")?;
            let ids = stmt
                .query_map([member_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<Uuid>, _>>()?;
            Ok(ids)
        })
    }

    /// Follow edges on one side of a member, newest first.
    pub fn list_subscriptions(
        &self,
        member_id: Uuid,
        side: SubscriptionSide,
        window: PageWindow,
    ) -> Result<(Vec<SubscriptionResponse>, u64)> {
        let column = match side {
            SubscriptionSide::Following => "follower_id",
            SubscriptionSide::Followers => "following_id",
        };
        let (limit, offset) = bounds(window);

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT s.created_at, {}, {}
                 FROM subscriptions s
                 JOIN members fr ON fr.id = s.follower_id
                 JOIN members fg ON fg.id = s.following_id
                 WHERE s.{column} = ?1
                 ORDER BY s.created_at DESC, s.rowid DESC
                 LIMIT ?2 OFFSET ?3",
                summary_columns("fr"),
                summary_columns("fg")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![member_id, limit, offset], |row| {
                    Ok(SubscriptionResponse {
                        created_at: row.get(0)?,
                        follower: summary_at(row, 1)?,
                        following: summary_at(row, 6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM subscriptions WHERE {column} = ?1"),
                [member_id],
                |r| r.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, member};

    #[test]
    fn only_one_pending_request_per_pair() {
        let db = Database::open_in_memory().unwrap();
        let alice = member(&db, "alice");
        let bob = member(&db, "bob");

        let first = Uuid::new_v4();
        assert!(db.insert_friend_request(first, alice, bob, at(1)).unwrap());
        assert!(!db.insert_friend_request(Uuid::new_v4(), alice, bob, at(2)).unwrap());
        assert!(!db.insert_friend_request(Uuid::new_v4(), bob, alice, at(2)).unwrap());

        // A resolved request no longer blocks a new one
        assert!(db.resolve_friend_request(first, FriendRequestStatus::Rejected, at(3)).unwrap());
        assert!(db.insert_friend_request(Uuid::new_v4(), bob, alice, at(4)).unwrap());
    }

    #[test]
    fn resolution_happens_once() {
        let db = Database::open_in_memory().unwrap();
        let alice = member(&db, "alice");
        let bob = member(&db, "bob");
        let id = Uuid::new_v4();
        db.insert_friend_request(id, alice, bob, at(1)).unwrap();

        assert!(db.resolve_friend_request(id, FriendRequestStatus::Accepted, at(2)).unwrap());
        assert!(!db.resolve_friend_request(id, FriendRequestStatus::Rejected, at(3)).unwrap());

        let row = db.get_friend_request(id).unwrap().unwrap();
        assert_eq!(row.status, FriendRequestStatus::Accepted);
        assert_eq!(row.responded_at, Some(at(2)));
    }

    #[test]
    fn friendship_is_symmetric() {
        let db = Database::open_in_memory().unwrap();
        let alice = member(&db, "alice");
        let bob = member(&db, "bob");
        let carol = member(&db, "carol");
        let id = Uuid::new_v4();
        db.insert_friend_request(id, alice, bob, at(1)).unwrap();

        assert!(!db.are_friends(alice, bob).unwrap());
        db.resolve_friend_request(id, FriendRequestStatus::Accepted, at(2)).unwrap();

        assert!(db.are_friends(alice, bob).unwrap());
        assert!(db.are_friends(bob, alice).unwrap());
        assert!(!db.are_friends(alice, carol).unwrap());
        assert_eq!(db.friend_ids(bob).unwrap(), vec![alice]);

        let (friends, count) = db.list_friends(alice, PageWindow::default()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(friends[0].id, bob);
        assert_eq!(friends[0].friends_count, 1);
    }

    #[test]
    fn follow_edges_are_directional_and_unique() {
        let db = Database::open_in_memory().unwrap();
        let alice = member(&db, "alice");
        let bob = member(&db, "bob");

        assert!(db.insert_subscription(alice, bob, at(1)).unwrap());
        assert!(!db.insert_subscription(alice, bob, at(2)).unwrap());

        assert!(db.is_following(alice, bob).unwrap());
        assert!(!db.is_following(bob, alice).unwrap());
        assert_eq!(db.following_ids(alice).unwrap(), vec![bob]);
        assert!(db.following_ids(bob).unwrap().is_empty());

        let (followers, count) = db
            .list_subscriptions(bob, SubscriptionSide::Followers, PageWindow::default())
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(followers[0].follower.id, alice);

        assert!(db.delete_subscription(alice, bob).unwrap());
        assert!(!db.delete_subscription(alice, bob).unwrap());
    }

    #[test]
    fn incoming_and_outgoing_lists() {
        let db = Database::open_in_memory().unwrap();
        let alice = member(&db, "alice");
        let bob = member(&db, "bob");
        let carol = member(&db, "carol");
        db.insert_friend_request(Uuid::new_v4(), alice, bob, at(1)).unwrap();
        db.insert_friend_request(Uuid::new_v4(), carol, bob, at(2)).unwrap();

        let (incoming, count) = db
            .list_friend_requests(bob, RequestDirection::Incoming, PageWindow::default())
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(incoming[0].from_member.username, "carol");
        assert_eq!(incoming[1].from_member.username, "alice");

        let (outgoing, _) = db
            .list_friend_requests(alice, RequestDirection::Outgoing, PageWindow::default())
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].to_member.id, bob);
    }
}
