#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests for the room HTTP API.
//!
//! Each test spawns a real server with `TestRoomServer` and talks to it over
//! HTTP, authenticating with the issued bearer token or the session cookie.

use reqwest::{header, Client, Response, StatusCode};
use room_test_utils::TestRoomServer;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;

struct Member {
    room_code: String,
    token: String,
}

async fn create_room(client: &Client, server: &TestRoomServer, name: &str) -> (Member, Value) {
    let response = client
        .post(format!("{}/api/v1/rooms", server.url()))
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    let member = Member {
        room_code: body["roomCode"].as_str().unwrap().to_string(),
        token: body["token"].as_str().unwrap().to_string(),
    };
    (member, body)
}

async fn join_room(client: &Client, server: &TestRoomServer, code: &str, name: &str) -> Response {
    client
        .post(format!("{}/api/v1/rooms/{}/join", server.url(), code))
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap()
}

async fn join_member(client: &Client, server: &TestRoomServer, code: &str, name: &str) -> Member {
    let response = join_room(client, server, code, name).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    Member {
        room_code: body["roomCode"].as_str().unwrap().to_string(),
        token: body["token"].as_str().unwrap().to_string(),
    }
}

fn room_url(server: &TestRoomServer, member: &Member, suffix: &str) -> String {
    format!("{}/api/v1/rooms/{}{}", server.url(), member.room_code, suffix)
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_create_room_returns_session_and_cookie(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/v1/rooms", server.url()))
        .json(&json!({ "name": "Alice" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("Set-Cookie header");
    assert!(cookie.starts_with("room_token="));
    assert!(cookie.contains("HttpOnly"));

    let body: Value = response.json().await?;
    let code = body["roomCode"].as_str().unwrap();
    assert_eq!(code.len(), 6);
    assert_eq!(body["room"]["code"], code);
    assert_eq!(body["room"]["users"][0]["name"], "Alice");
    assert!(body["expiresAt"].is_string());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_create_room_rejects_bad_body(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/v1/rooms", server.url()))
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/api/v1/rooms", server.url()))
        .json(&json!({ "name": "" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_cookie_authenticates_like_bearer(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;

    let response = client
        .get(format!("{}/api/v1/me", server.url()))
        .header(header::COOKIE, format!("theme=dark; room_token={}", alice.token))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["roomCode"], alice.room_code);
    assert_eq!(body["state"], "active");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_protected_routes_require_session(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;

    let response = client.get(room_url(&server, &alice, "")).send().await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let response = client
        .get(room_url(&server, &alice, ""))
        .bearer_auth("not.a.token")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(room_url(&server, &alice, "/events"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_token_for_other_room_is_forbidden(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;
    let (olga, _) = create_room(&client, &server, "Olga").await;

    let response = client
        .get(room_url(&server, &olga, ""))
        .bearer_auth(&alice.token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_join_unknown_room_returns_404(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();

    let response = join_room(&client, &server, "zzzzzz", "Bob").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_join_full_room_returns_409(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn_with_vars(
        pool,
        HashMap::from([("ROOM_MEMBER_CAP".to_string(), "2".to_string())]),
    )
    .await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;

    join_member(&client, &server, &alice.room_code, "Bob").await;

    let response = join_room(&client, &server, &alice.room_code, "Carol").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "ROOM_FULL");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_content_queue_over_http(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;

    let response = client
        .post(room_url(&server, &alice, "/contents"))
        .bearer_auth(&alice.token)
        .json(&json!({ "contentId": "vid123", "contentType": "youtube" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["contents"][0]["contentId"], "vid123");
    assert_eq!(body["contents"][0]["author"]["name"], "Alice");
    let content_uuid = body["contents"][0]["uuid"].as_str().unwrap().to_string();

    let response = client
        .post(room_url(&server, &alice, "/contents"))
        .bearer_auth(&alice.token)
        .json(&json!({ "contentId": "x", "contentType": "vimeo" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .delete(room_url(&server, &alice, &format!("/contents/{}", content_uuid)))
        .bearer_auth(&alice.token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["contents"].as_array().map(Vec::len), Some(0));

    let response = client
        .delete(room_url(&server, &alice, "/contents/not-a-uuid"))
        .bearer_auth(&alice.token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_playing_and_heartbeat_over_http(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;

    let response = client
        .put(room_url(&server, &alice, "/playing"))
        .bearer_auth(&alice.token)
        .json(&json!({ "playing": true }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = client
        .get(room_url(&server, &alice, "/playing"))
        .bearer_auth(&alice.token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["playing"], true);

    let response = client
        .post(room_url(&server, &alice, "/heartbeat"))
        .bearer_auth(&alice.token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = client
        .get(format!("{}/api/v1/listeners/active", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["count"], 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_leave_clears_cookie_and_ends_session(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;
    let bob = join_member(&client, &server, &alice.room_code, "Bob").await;

    let response = client
        .post(format!("{}/api/v1/rooms/leave", server.url()))
        .bearer_auth(&alice.token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.contains("Max-Age=0"));

    let body: Value = response.json().await?;
    assert_eq!(body["left"], true);
    assert_eq!(body["roomDeleted"], false);

    let response = client
        .get(room_url(&server, &alice, ""))
        .bearer_auth(&alice.token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "SESSION_EXPIRED");

    let response = client
        .post(format!("{}/api/v1/rooms/leave", server.url()))
        .bearer_auth(&bob.token)
        .send()
        .await?;
    let body: Value = response.json().await?;
    assert_eq!(body["roomDeleted"], true);

    let response = client
        .post(format!("{}/api/v1/rooms/leave", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_joining_another_room_leaves_the_previous_one(
    pool: PgPool,
) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;
    let bob = join_member(&client, &server, &alice.room_code, "Bob").await;
    let (olga, _) = create_room(&client, &server, "Olga").await;

    let response = client
        .post(format!("{}/api/v1/rooms/{}/join", server.url(), olga.room_code))
        .bearer_auth(&bob.token)
        .json(&json!({ "name": "Bob" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = client
        .get(room_url(&server, &alice, ""))
        .bearer_auth(&alice.token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["users"].as_array().map(Vec::len), Some(1));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rejected_create_keeps_current_session(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;

    let response = client
        .post(format!("{}/api/v1/rooms", server.url()))
        .bearer_auth(&alice.token)
        .json(&json!({ "name": "   " }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Alice was the only member; a leave would have deleted the room
    let response = client
        .get(room_url(&server, &alice, ""))
        .bearer_auth(&alice.token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["users"][0]["name"], "Alice");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rejected_join_keeps_current_session(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;
    let (olga, _) = create_room(&client, &server, "Olga").await;

    let response = client
        .post(format!("{}/api/v1/rooms/{}/join", server.url(), olga.room_code))
        .bearer_auth(&alice.token)
        .json(&json!({ "name": "" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/api/v1/rooms/bad%20code!/join", server.url()))
        .header(header::COOKIE, format!("room_token={}", alice.token))
        .json(&json!({ "name": "Alice" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .post(format!("{}/api/v1/rooms/{}/join", server.url(), olga.room_code))
        .bearer_auth(&alice.token)
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .get(room_url(&server, &alice, ""))
        .bearer_auth(&alice.token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_event_stream_starts_with_snapshot(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn(pool).await?;
    let client = Client::new();
    let (alice, _) = create_room(&client, &server, "Alice").await;

    let mut response = client
        .get(room_url(&server, &alice, "/events"))
        .bearer_auth(&alice.token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream")));

    let first = read_sse_frame(&mut response).await;
    assert!(first.contains("event: room"));
    assert!(first.contains(&alice.room_code));

    let response = client
        .post(room_url(&server, &alice, "/reactions"))
        .bearer_auth(&alice.token)
        .json(&json!({ "emoji": "🔥", "x": 0.2, "y": 0.8 }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    Ok(())
}

/// Read chunks until one complete SSE frame has arrived.
async fn read_sse_frame(response: &mut Response) -> String {
    let mut buffer = String::new();
    while !buffer.contains("\n\n") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
            .await
            .expect("timed out waiting for SSE data")
            .expect("SSE read failed")
            .expect("SSE stream ended");
        buffer.push_str(&String::from_utf8_lossy(&chunk));
    }
    buffer
}
