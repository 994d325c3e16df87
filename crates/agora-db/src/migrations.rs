use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE members (
                id          BLOB PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                first_name  TEXT NOT NULL DEFAULT '',
                last_name   TEXT NOT NULL DEFAULT '',
                avatar_url  TEXT,
                bio         TEXT NOT NULL DEFAULT '',
                date_joined TEXT NOT NULL
            );

            CREATE INDEX idx_members_date_joined ON members(date_joined);

            CREATE TABLE posts (
                id          BLOB PRIMARY KEY,
                author_id   BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                image_url   TEXT,
                video_url   TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_posts_author ON posts(author_id, created_at);
            CREATE INDEX idx_posts_created ON posts(created_at);

            CREATE TABLE likes (
                member_id   BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                post_id     BLOB NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (member_id, post_id)
            );

            CREATE INDEX idx_likes_post ON likes(post_id);

            CREATE TABLE comments (
                id          BLOB PRIMARY KEY,
                author_id   BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                post_id     BLOB NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);

            CREATE TABLE reposts (
                id          BLOB PRIMARY KEY,
                member_id   BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                post_id     BLOB NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                UNIQUE (member_id, post_id)
            );

            CREATE INDEX idx_reposts_post ON reposts(post_id);

            CREATE TABLE friend_requests (
                id              BLOB PRIMARY KEY,
                from_member_id  BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                to_member_id    BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                status          TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at      TEXT NOT NULL,
                responded_at    TEXT,
                CHECK (from_member_id <> to_member_id)
            );

            -- At most one open request per unordered pair
            CREATE UNIQUE INDEX idx_friend_requests_pending_pair
                ON friend_requests(min(from_member_id, to_member_id), max(from_member_id, to_member_id))
                WHERE status = 'pending';

            CREATE INDEX idx_friend_requests_to ON friend_requests(to_member_id, status);
            CREATE INDEX idx_friend_requests_from ON friend_requests(from_member_id, status);

            CREATE TABLE subscriptions (
                follower_id     BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                following_id    BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL,
                PRIMARY KEY (follower_id, following_id),
                CHECK (follower_id <> following_id)
            );

            CREATE INDEX idx_subscriptions_following ON subscriptions(following_id);

            CREATE TABLE messages (
                id          BLOB PRIMARY KEY,
                sender_id   BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                receiver_id BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                is_read     INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_receiver ON messages(receiver_id, is_read);
            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);

            CREATE TABLE presence_events (
                member_id   BLOB NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                kind        TEXT NOT NULL CHECK (kind IN ('login', 'logout')),
                occurred_at TEXT NOT NULL
            );

            CREATE INDEX idx_presence_member ON presence_events(member_id, occurred_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
