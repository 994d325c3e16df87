use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use agora_api::{AppStateInner, router};
use agora_db::Database;

fn app() -> Router {
    let db = Database::open_in_memory().unwrap();
    router(Arc::new(AppStateInner::new(db, "test-secret")))
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Registers a member and returns (id, access token).
async fn register(app: &Router, username: &str) -> (String, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "correct-horse-battery",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["member"]["id"].as_str().unwrap().to_string(),
        body["access"].as_str().unwrap().to_string(),
    )
}

async fn create_post(app: &Router, token: &str, content: &str) -> String {
    let (status, body) = call(app, Method::POST, "/posts", Some(token), Some(json!({ "content": content }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn feed_contents(app: &Router, token: &str) -> Vec<String> {
    let (status, body) = call(app, Method::GET, "/posts", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["content"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_is_public_and_everything_else_needs_a_token() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = call(&app, Method::GET, "/posts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Authentication credentials were not provided");

    let (status, _) = call(&app, Method::GET, "/members/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_refresh_and_presence() {
    let app = app();
    let (id, _) = register(&app, "alice").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid credentials");

    let (status, login) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "correct-horse-battery" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let access = login["access"].as_str().unwrap().to_string();
    let refresh = login["refresh"].as_str().unwrap().to_string();

    let presence_uri = format!("/members/{id}/presence");
    let (_, presence) = call(&app, Method::GET, &presence_uri, Some(&access), None).await;
    assert_eq!(presence["is_online"], true);

    // A refresh token is not a bearer credential, and vice versa
    let (status, _) = call(&app, Method::GET, "/members/me", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::POST, "/auth/refresh", None, Some(json!({ "refresh": access }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, Method::POST, "/auth/refresh", None, Some(json!({ "refresh": refresh }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access"].is_string());

    let (status, body) = call(&app, Method::POST, "/auth/logout", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"], "Successfully logged out");

    let (_, presence) = call(&app, Method::GET, &presence_uri, Some(&access), None).await;
    assert_eq!(presence["is_online"], false);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = app();
    register(&app, "alice").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "username": "alice",
            "email": "other@example.com",
            "password": "correct-horse-battery",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Username already exists");
}

#[tokio::test]
async fn liking_twice_is_a_conflict() {
    let app = app();
    let (_, alice) = register(&app, "alice").await;
    let (_, bob) = register(&app, "bob").await;
    let post = create_post(&app, &alice, "like me").await;

    let like_uri = format!("/posts/{post}/like");
    let (status, body) = call(&app, Method::POST, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["likes_count"], 1);

    let (status, body) = call(&app, Method::POST, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Post already liked");

    let (status, body) = call(&app, Method::POST, &format!("/posts/{post}/unlike"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["likes_count"], 0);

    let (status, _) = call(&app, Method::POST, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = call(&app, Method::GET, &format!("/posts/{post}"), Some(&bob), None).await;
    assert_eq!(body["is_liked_by_user"], true);
    let (_, body) = call(&app, Method::GET, &format!("/posts/{post}"), Some(&alice), None).await;
    assert_eq!(body["is_liked_by_user"], false);
}

#[tokio::test]
async fn hello_reaches_a_follower_only_after_following() {
    let app = app();
    let (a_id, a) = register(&app, "anna").await;
    let (_, b) = register(&app, "boris").await;

    create_post(&app, &b, "older from boris").await;
    create_post(&app, &a, "hello").await;

    assert_eq!(feed_contents(&app, &b).await, vec!["older from boris"]);

    let (status, body) = call(&app, Method::POST, &format!("/subscriptions/{a_id}"), Some(&b), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_following"], true);

    assert_eq!(feed_contents(&app, &b).await, vec!["hello", "older from boris"]);
    // Following is one-way
    assert_eq!(feed_contents(&app, &a).await, vec!["hello"]);

    let (status, _) = call(&app, Method::DELETE, &format!("/subscriptions/{a_id}"), Some(&b), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(feed_contents(&app, &b).await, vec!["older from boris"]);
}

#[tokio::test]
async fn friend_request_can_only_be_accepted_once() {
    let app = app();
    let (alice_id, alice) = register(&app, "alice").await;
    let (bob_id, bob) = register(&app, "bob").await;

    let (status, request) = call(
        &app,
        Method::POST,
        "/friends/requests",
        Some(&alice),
        Some(json!({ "to_member": bob_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "pending");
    let accept_uri = format!("/friends/requests/{}/accept", request["id"].as_str().unwrap());

    let (_, incoming) = call(&app, Method::GET, "/friends/requests", Some(&bob), None).await;
    assert_eq!(incoming["count"], 1);

    // The sender cannot accept their own request
    let (status, _) = call(&app, Method::POST, &accept_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::POST, &accept_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");

    let (status, body) = call(&app, Method::POST, &accept_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Friend request already accepted");

    let (_, friends) = call(&app, Method::GET, "/friends", Some(&alice), None).await;
    assert_eq!(friends["count"], 1);
    assert_eq!(friends["results"][0]["id"], bob_id.as_str());

    let (_, relationship) = call(&app, Method::GET, &format!("/members/{alice_id}/relationship"), Some(&bob), None).await;
    assert_eq!(relationship["is_friend"], true);
    assert!(relationship["pending_request"].is_null());
}

#[tokio::test]
async fn reposting_twice_is_rejected() {
    let app = app();
    let (_, alice) = register(&app, "alice").await;
    let (bob_id, bob) = register(&app, "bob").await;
    let post = create_post(&app, &alice, "worth sharing").await;

    let repost_uri = format!("/posts/{post}/repost");
    let (status, body) = call(&app, Method::POST, &repost_uri, Some(&bob), Some(json!({ "content": "look" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["original_post_id"], post.as_str());
    assert_eq!(body["post"]["author"]["id"], bob_id.as_str());
    assert_eq!(body["post"]["content"], "look");

    let (status, body) = call(&app, Method::POST, &repost_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Post already reposted");

    let (_, original) = call(&app, Method::GET, &format!("/posts/{post}"), Some(&alice), None).await;
    assert_eq!(original["reposts_count"], 1);
}

#[tokio::test]
async fn only_the_author_may_edit_or_delete() {
    let app = app();
    let (_, alice) = register(&app, "alice").await;
    let (_, bob) = register(&app, "bob").await;
    let post = create_post(&app, &alice, "draft").await;
    let post_uri = format!("/posts/{post}");

    let (status, body) = call(&app, Method::PATCH, &post_uri, Some(&bob), Some(json!({ "content": "mine now" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "You can only modify your own post");

    let (status, body) = call(&app, Method::PATCH, &post_uri, Some(&alice), Some(json!({ "content": "final" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "final");

    let (status, _) = call(&app, Method::DELETE, &post_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &post_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, Method::GET, &post_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Post not found");
}

#[tokio::test]
async fn comments_are_listed_and_owner_deleted() {
    let app = app();
    let (_, alice) = register(&app, "alice").await;
    let (_, bob) = register(&app, "bob").await;
    let post = create_post(&app, &alice, "discuss").await;
    let comments_uri = format!("/posts/{post}/comments");

    let (status, _) = call(&app, Method::POST, &comments_uri, Some(&bob), Some(json!({ "content": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, comment) = call(&app, Method::POST, &comments_uri, Some(&bob), Some(json!({ "content": "first" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_uri = format!("{comments_uri}/{}", comment["id"].as_str().unwrap());

    let (_, listed) = call(&app, Method::GET, &comments_uri, Some(&alice), None).await;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["results"][0]["content"], "first");

    let (status, _) = call(&app, Method::DELETE, &comment_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &comment_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, post) = call(&app, Method::GET, &format!("/posts/{post}"), Some(&alice), None).await;
    assert_eq!(post["comments_count"], 0);
}

#[tokio::test]
async fn messages_dialogs_and_read_marks() {
    let app = app();
    let (alice_id, alice) = register(&app, "alice").await;
    let (bob_id, bob) = register(&app, "bob").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/messages",
        Some(&alice),
        Some(json!({ "recipient": alice_id, "content": "note to self" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    for text in ["hi bob", "are you there?"] {
        let (status, _) = call(
            &app,
            Method::POST,
            "/messages",
            Some(&alice),
            Some(json!({ "recipient": bob_id, "content": text })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, dialogs) = call(&app, Method::GET, "/messages", Some(&bob), None).await;
    assert_eq!(dialogs["count"], 1);
    assert_eq!(dialogs["results"][0]["member"]["id"], alice_id.as_str());
    assert_eq!(dialogs["results"][0]["last_message"]["content"], "are you there?");
    assert_eq!(dialogs["results"][0]["unread_count"], 2);

    let (_, conversation) = call(&app, Method::GET, &format!("/messages/{alice_id}"), Some(&bob), None).await;
    assert_eq!(conversation["results"][0]["content"], "are you there?");

    let (_, marked) = call(&app, Method::POST, &format!("/messages/{alice_id}/read"), Some(&bob), None).await;
    assert_eq!(marked["updated"], 2);

    let (_, dialogs) = call(&app, Method::GET, "/messages", Some(&bob), None).await;
    assert_eq!(dialogs["results"][0]["unread_count"], 0);
}

#[tokio::test]
async fn member_search_and_profile_updates() {
    let app = app();
    let (alice_id, alice) = register(&app, "alice").await;
    let (bob_id, _) = register(&app, "bob").await;

    let (status, body) = call(&app, Method::GET, "/members/search", Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Search query parameter 'q' is required");

    let (_, found) = call(&app, Method::GET, "/members/search?q=BO", Some(&alice), None).await;
    assert_eq!(found["count"], 1);
    assert_eq!(found["results"][0]["id"], bob_id.as_str());

    let (status, _) = call(
        &app,
        Method::PATCH,
        &format!("/members/{bob_id}"),
        Some(&alice),
        Some(json!({ "bio": "hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, me) = call(
        &app,
        Method::PATCH,
        &format!("/members/{alice_id}"),
        Some(&alice),
        Some(json!({ "bio": "hello there", "first_name": "Alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["bio"], "hello there");
    assert_eq!(me["first_name"], "Alice");

    let (status, _) = call(&app, Method::GET, &format!("/members/{}", uuid::Uuid::new_v4()), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        Method::PATCH,
        &format!("/members/{alice_id}"),
        Some(&alice),
        Some(json!({ "username": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Username already exists");

    let (status, me) = call(
        &app,
        Method::PATCH,
        &format!("/members/{alice_id}"),
        Some(&alice),
        Some(json!({ "username": "alicia" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alicia");

    let (_, listed) = call(&app, Method::GET, "/members?ordering=username", Some(&alice), None).await;
    assert_eq!(listed["results"][0]["username"], "alicia");
    assert_eq!(listed["results"][1]["username"], "bob");
}

#[tokio::test]
async fn malformed_input_is_a_bad_request_with_detail() {
    let app = app();
    let (_, alice) = register(&app, "alice").await;

    let cases = [
        (Method::POST, "/posts", Some(json!({}))),
        (Method::POST, "/posts", Some(json!({ "content": "hi", "mood": "happy" }))),
        (Method::POST, "/friends/requests", Some(json!({ "to_member": "nope" }))),
        (Method::GET, "/members/not-a-uuid", None),
        (Method::GET, "/members?ordering=shoe_size", None),
        (Method::GET, "/posts?limit=lots", None),
    ];
    for (method, uri, body) in cases {
        let (status, reply) = call(&app, method.clone(), uri, Some(&alice), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}: {reply}");
        assert!(reply["detail"].is_string(), "{method} {uri}: {reply}");
    }

    // Public routes too
    let (status, reply) = call(&app, Method::POST, "/auth/register", None, Some(json!({ "username": "bob" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply["detail"].is_string());
}

#[tokio::test]
async fn huge_offsets_return_an_empty_page() {
    let app = app();
    let (_, alice) = register(&app, "alice").await;
    let post = create_post(&app, &alice, "only post").await;

    for uri in [
        format!("/posts?offset={}", u64::MAX),
        format!("/posts/{post}/comments?offset={}", u64::MAX),
        format!("/members?offset={}", u64::MAX),
    ] {
        let (status, page) = call(&app, Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK, "{uri}: {page}");
        assert_eq!(page["offset"], i64::MAX);
        assert_eq!(page["results"].as_array().unwrap().len(), 0);
        assert!(page["next_offset"].is_null());
    }
}
