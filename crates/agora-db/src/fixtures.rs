//! Seed helpers shared by the unit tests here and the API crate's tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::Database;
use crate::models::{MemberWrite, NewMember, NewPost};

pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn member(db: &Database, username: &str) -> Uuid {
    let id = Uuid::new_v4();
    let email = format!("{username}@example.com");
    let outcome = db
        .create_member(&NewMember {
            id,
            username,
            email: &email,
            password_hash: "hash",
            first_name: "",
            last_name: "",
            date_joined: at(0),
        })
        .unwrap();
    assert_eq!(outcome, MemberWrite::Done);
    id
}

pub fn post(db: &Database, author: Uuid, content: &str, minute: i64) -> Uuid {
    let id = Uuid::new_v4();
    db.insert_post(&NewPost {
        id,
        author_id: author,
        content,
        image_url: None,
        video_url: None,
        created_at: at(minute),
    })
    .unwrap();
    id
}
