use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use nexus_server::{auth, config::Config, db, routes, storage::UploadStore};
use nexus_shared::DEFAULT_AVATAR;

const TEST_SECRET: &str = "test-secret";
const BOUNDARY: &str = "nexus-test-boundary";

/// Build the full router backed by a fresh database and upload
/// directory inside a temp dir. The TempDir must stay alive for the
/// duration of the test.
async fn test_app() -> (Router, TempDir) {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("test.db");
    let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let pool = db::create_pool(&database_url).await.unwrap();
    db::migrate(&pool).await.unwrap();

    let upload_dir = tmp.path().join("uploads");
    let config = Config {
        database_url,
        jwt_secret: TEST_SECRET.to_string(),
        token_expires_in: 3600,
        port: 0,
        upload_dir: upload_dir.display().to_string(),
        public_url: "http://localhost:3000".to_string(),
    };

    let uploads = UploadStore::new(&upload_dir, &config.public_url)
        .await
        .unwrap();

    (routes::create_router(pool, config, uploads), tmp)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, body)
}

fn json_request(method: &str, path: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    builder.body(Body::from(body.to_string())).unwrap()
}

fn bare_request(method: &str, path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    builder.body(Body::empty()).unwrap()
}

fn multipart_body(
    text_fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in text_fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    if let Some((name, filename, bytes)) = file {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(method: &str, path: &str, token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    builder.body(Body::from(body)).unwrap()
}

/// Register `<name>` with `<name>@example.com` and return the auth
/// response body.
async fn register(app: &Router, username: &str) -> Value {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/auth/register",
            None,
            &json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "pw1",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "register failed: {:?}", body);
    body
}

async fn create_post(app: &Router, token: &str, content: &str) -> Value {
    let body = multipart_body(&[("content", content)], None);
    let (status, post) = send(app, multipart_request("POST", "/posts", Some(token), body)).await;

    assert_eq!(status, StatusCode::CREATED, "create post failed: {:?}", post);
    post
}

#[tokio::test]
async fn register_returns_account_with_token() {
    let (app, _tmp) = test_app().await;

    let body = register(&app, "alice").await;

    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["avatar"], DEFAULT_AVATAR);
    assert!(body.get("password").is_none());
    assert!(body.get("password_hash").is_none());

    // The token must decode back to the same account
    let token = body["token"].as_str().unwrap();
    let claims = auth::verify_token(token, TEST_SECRET).unwrap();
    assert_eq!(claims.sub.to_string(), body["id"].as_str().unwrap());
    assert_eq!(claims.username, "alice");
}

#[tokio::test]
async fn register_rejects_duplicates_and_bad_input() {
    let (app, _tmp) = test_app().await;

    register(&app, "alice").await;

    // Same username again
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            None,
            &json!({"username": "alice", "email": "other@example.com", "password": "pw1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Username"));

    // Same email, different username
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            None,
            &json!({"username": "alice2", "email": "alice@example.com", "password": "pw1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Email"));

    // Missing field
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            None,
            &json!({"username": "", "email": "x@example.com", "password": "pw1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Email that is not an email
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            None,
            &json!({"username": "carol", "email": "not-an-email", "password": "pw1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_round_trip() {
    let (app, _tmp) = test_app().await;

    let registered = register(&app, "alice").await;

    // Wrong password
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            None,
            &json!({"username": "alice", "password": "wrong"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Unknown user
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            None,
            &json!({"username": "nobody", "password": "pw1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct credentials
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            None,
            &json!({"username": "alice", "password": "pw1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], registered["id"]);

    let claims = auth::verify_token(body["token"].as_str().unwrap(), TEST_SECRET).unwrap();
    assert_eq!(claims.sub.to_string(), registered["id"].as_str().unwrap());
}

#[tokio::test]
async fn feed_is_newest_first_and_filterable_by_author() {
    let (app, _tmp) = test_app().await;

    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let alice_token = alice["token"].as_str().unwrap();
    let bob_token = bob["token"].as_str().unwrap();

    create_post(&app, alice_token, "first").await;
    create_post(&app, alice_token, "second").await;
    create_post(&app, bob_token, "third").await;

    // Feed is public and newest first
    let (status, feed) = send(&app, bare_request("GET", "/posts", None)).await;
    assert_eq!(status, StatusCode::OK);

    let contents: Vec<&str> = feed
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["third", "second", "first"]);

    assert_eq!(feed[0]["author"]["username"], "bob");
    assert_eq!(feed[2]["author"]["username"], "alice");

    // Restricted to one author
    let alice_id = alice["id"].as_str().unwrap();
    let (status, feed) = send(
        &app,
        bare_request("GET", &format!("/posts?userId={}", alice_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 2);
    assert!(feed
        .iter()
        .all(|p| p["author"]["username"] == "alice"));
}

#[tokio::test]
async fn like_toggles_membership() {
    let (app, _tmp) = test_app().await;

    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let alice_token = alice["token"].as_str().unwrap();
    let bob_token = bob["token"].as_str().unwrap();
    let bob_id = bob["id"].as_str().unwrap();

    let post = create_post(&app, alice_token, "hello world").await;
    let post_id = post["id"].as_str().unwrap();
    assert_eq!(post["likes"].as_array().unwrap().len(), 0);

    let like_path = format!("/posts/{}/like", post_id);

    // First like adds bob
    let (status, view) = send(&app, bare_request("PUT", &like_path, Some(bob_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["likes"], json!([bob_id]));

    // Second like removes him
    let (status, view) = send(&app, bare_request("PUT", &like_path, Some(bob_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["likes"].as_array().unwrap().len(), 0);

    // Third brings him back
    let (_, view) = send(&app, bare_request("PUT", &like_path, Some(bob_token))).await;
    assert_eq!(view["likes"], json!([bob_id]));

    // A second user joins the set without duplicating bob
    let (_, view) = send(&app, bare_request("PUT", &like_path, Some(alice_token))).await;
    let likes = view["likes"].as_array().unwrap();
    assert_eq!(likes.len(), 2);

    // Missing post and missing token
    let (status, _) = send(
        &app,
        bare_request(
            "PUT",
            &format!("/posts/{}/like", uuid::Uuid::new_v4()),
            Some(bob_token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, bare_request("PUT", &like_path, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn comments_append_in_order() {
    let (app, _tmp) = test_app().await;

    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let alice_token = alice["token"].as_str().unwrap();
    let bob_token = bob["token"].as_str().unwrap();

    let post = create_post(&app, alice_token, "discuss").await;
    let comment_path = format!("/posts/{}/comment", post["id"].as_str().unwrap());

    let (status, view) = send(
        &app,
        json_request("POST", &comment_path, Some(bob_token), &json!({"text": "one"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["comments"].as_array().unwrap().len(), 1);

    let (_, view) = send(
        &app,
        json_request(
            "POST",
            &comment_path,
            Some(alice_token),
            &json!({"text": "two"}),
        ),
    )
    .await;

    let comments = view["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["text"], "one");
    assert_eq!(comments[0]["author"]["username"], "bob");
    assert_eq!(comments[1]["text"], "two");
    assert_eq!(comments[1]["author"]["username"], "alice");

    // Blank text
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &comment_path,
            Some(bob_token),
            &json!({"text": "   "}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Missing post
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/posts/{}/comment", uuid::Uuid::new_v4()),
            Some(bob_token),
            &json!({"text": "hi"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // No token
    let (status, _) = send(
        &app,
        json_request("POST", &comment_path, None, &json!({"text": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn delete_is_author_only() {
    let (app, _tmp) = test_app().await;

    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let alice_token = alice["token"].as_str().unwrap();
    let bob_token = bob["token"].as_str().unwrap();

    let post = create_post(&app, alice_token, "mine").await;
    let post_path = format!("/posts/{}", post["id"].as_str().unwrap());

    // Someone else cannot delete it
    let (status, _) = send(&app, bare_request("DELETE", &post_path, Some(bob_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, feed) = send(&app, bare_request("GET", "/posts", None)).await;
    assert_eq!(feed.as_array().unwrap().len(), 1, "post must survive a forbidden delete");

    // No token at all
    let (status, _) = send(&app, bare_request("DELETE", &post_path, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The author can
    let (status, body) = send(&app, bare_request("DELETE", &post_path, Some(alice_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("deleted"));

    let (_, feed) = send(&app, bare_request("GET", "/posts", None)).await;
    assert_eq!(feed.as_array().unwrap().len(), 0);

    // Gone means gone
    let (status, _) = send(&app, bare_request("DELETE", &post_path, Some(alice_token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_post_requires_content_or_image() {
    let (app, _tmp) = test_app().await;

    let alice = register(&app, "alice").await;
    let token = alice["token"].as_str().unwrap();

    // Whitespace only, no image
    let body = multipart_body(&[("content", "   ")], None);
    let (status, _) = send(&app, multipart_request("POST", "/posts", Some(token), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No fields at all
    let body = multipart_body(&[], None);
    let (status, _) = send(&app, multipart_request("POST", "/posts", Some(token), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No token
    let body = multipart_body(&[("content", "hi")], None);
    let (status, _) = send(&app, multipart_request("POST", "/posts", None, body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn image_post_is_stored_and_served() {
    let (app, _tmp) = test_app().await;

    let alice = register(&app, "alice").await;
    let token = alice["token"].as_str().unwrap();

    let image_bytes = b"\x89PNG fake image data";
    let body = multipart_body(&[("content", "")], Some(("image", "photo.PNG", image_bytes)));
    let (status, post) = send(&app, multipart_request("POST", "/posts", Some(token), body)).await;

    // An image alone is a valid post
    assert_eq!(status, StatusCode::CREATED);

    let image_url = post["image"].as_str().unwrap();
    assert!(image_url.contains("/uploads/"));
    assert!(image_url.ends_with(".png"));

    // The stored file is served back at its public path
    let name = image_url.rsplit('/').next().unwrap();
    let response = app
        .clone()
        .oneshot(bare_request("GET", &format!("/uploads/{}", name), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let served = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&served[..], image_bytes);
}

#[tokio::test]
async fn avatar_upload_updates_profile() {
    let (app, _tmp) = test_app().await;

    let alice = register(&app, "alice").await;
    let token = alice["token"].as_str().unwrap();

    let body = multipart_body(&[], Some(("avatar", "me.jpg", b"jpeg bytes".as_slice())));
    let (status, user) = send(
        &app,
        multipart_request("PUT", "/auth/avatar", Some(token), body),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let avatar = user["avatar"].as_str().unwrap();
    assert_ne!(avatar, DEFAULT_AVATAR);
    assert!(avatar.ends_with(".jpg"));

    // Visible on the profile afterwards
    let (_, me) = send(&app, bare_request("GET", "/auth/me", Some(token))).await;
    assert_eq!(me["avatar"], avatar);

    // No file field
    let body = multipart_body(&[("note", "no file here")], None);
    let (status, _) = send(
        &app,
        multipart_request("PUT", "/auth/avatar", Some(token), body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No token
    let body = multipart_body(&[], Some(("avatar", "me.jpg", b"jpeg bytes".as_slice())));
    let (status, _) = send(&app, multipart_request("PUT", "/auth/avatar", None, body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn search_matches_case_insensitive_substring() {
    let (app, _tmp) = test_app().await;

    register(&app, "alice").await;
    register(&app, "alina").await;
    register(&app, "bob").await;

    let (status, results) = send(&app, bare_request("GET", "/auth/search?q=al", None)).await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alice", "alina"]);

    // Results carry only the summary fields
    assert!(results[0].get("email").is_none());
    assert!(results[0].get("password_hash").is_none());

    // Case-insensitive
    let (_, results) = send(&app, bare_request("GET", "/auth/search?q=ALI", None)).await;
    assert_eq!(results.as_array().unwrap().len(), 2);

    // No match
    let (_, results) = send(&app, bare_request("GET", "/auth/search?q=zeke", None)).await;
    assert_eq!(results.as_array().unwrap().len(), 0);

    // LIKE wildcards are matched literally, not as patterns
    let (_, results) = send(&app, bare_request("GET", "/auth/search?q=%25", None)).await;
    assert_eq!(results.as_array().unwrap().len(), 0);

    // Blank and absent queries return nothing
    let (_, results) = send(&app, bare_request("GET", "/auth/search?q=", None)).await;
    assert_eq!(results.as_array().unwrap().len(), 0);

    let (_, results) = send(&app, bare_request("GET", "/auth/search", None)).await;
    assert_eq!(results.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn me_requires_valid_token() {
    let (app, _tmp) = test_app().await;

    let alice = register(&app, "alice").await;

    let (status, _) = send(&app, bare_request("GET", "/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, bare_request("GET", "/auth/me", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, me) = send(
        &app,
        bare_request("GET", "/auth/me", Some(alice["token"].as_str().unwrap())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn health_check_works() {
    let (app, _tmp) = test_app().await;

    let response = app
        .clone()
        .oneshot(bare_request("GET", "/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
