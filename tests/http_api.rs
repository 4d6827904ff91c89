use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use photo_store::{
    auth::TokenCodec,
    db,
    routes::routes::routes,
    state::AppState,
    storage::{AccessMethod, BucketPolicy, LocalObjectStore, signing::UrlSigner},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BASE_URL: &str = "http://photos.test";
const SIGNING_SECRET: &str = "http-signing-secret";
const JWT_SECRET: &[u8] = b"http-jwt-secret";
const BOUNDARY: &str = "photo-store-boundary";

struct TestApp {
    _dir: TempDir,
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(db::connect_in_memory().await.unwrap());
        let objects = Arc::new(LocalObjectStore::new(dir.path(), BASE_URL, SIGNING_SECRET));
        let tokens = Arc::new(TokenCodec::new(JWT_SECRET));
        let state = AppState::new(pool, objects, tokens, BucketPolicy::default());
        Self {
            _dir: dir,
            router: routes(state, 1024 * 1024),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    async fn post_json(&self, uri: &str, cookie: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        let (status, _, body) = self.send(request).await;
        (status, parse(&body))
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> (StatusCode, Bytes) {
        let mut builder = Request::get(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let (status, _, body) = self.send(builder.body(Body::empty()).unwrap()).await;
        (status, body)
    }

    /// Sign up and log in; returns the `token=...` cookie pair.
    async fn login(&self, username: &str) -> String {
        let creds = json!({ "username": username, "password": "correct horse" });
        let (status, _) = self.post_json("/user/signup", None, creds.clone()).await;
        assert_eq!(status, StatusCode::CREATED);

        let request = Request::post("/user/authenticate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(creds.to_string()))
            .unwrap();
        let (status, headers, _) = self.send(request).await;
        assert_eq!(status, StatusCode::OK);
        let set_cookie = headers
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn upload(&self, cookie: &str, data: &[u8], is_public: bool) -> (StatusCode, Value) {
        self.upload_ordered(cookie, data, is_public, true).await
    }

    /// Multipart upload with the `IsPublic` field before or after the file.
    async fn upload_ordered(
        &self,
        cookie: &str,
        data: &[u8],
        is_public: bool,
        flag_first: bool,
    ) -> (StatusCode, Value) {
        let flag = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"IsPublic\"\r\n\r\n{is_public}\r\n"
        );
        let mut file = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"uploadFile\"; filename=\"photo.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .into_bytes();
        file.extend_from_slice(data);
        file.extend_from_slice(b"\r\n");

        let mut body = Vec::new();
        if flag_first {
            body.extend_from_slice(flag.as_bytes());
            body.extend_from_slice(&file);
        } else {
            body.extend_from_slice(&file);
            body.extend_from_slice(flag.as_bytes());
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::post("/photo/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, parse(&body))
    }
}

fn parse(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

/// `/objects/...` path and query of a signed URL.
fn local_part(url: &str) -> &str {
    url.strip_prefix(BASE_URL).unwrap()
}

#[tokio::test]
async fn health_endpoints_answer() {
    let app = TestApp::new().await;
    assert_eq!(app.get("/healthz", None).await.0, StatusCode::OK);
    let (status, body) = app.get("/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["status"], "ok");
}

#[tokio::test]
async fn signup_and_authenticate_status_codes() {
    let app = TestApp::new().await;
    let creds = json!({ "username": "alice", "password": "pw" });

    assert_eq!(
        app.post_json("/user/signup", None, creds.clone()).await.0,
        StatusCode::CREATED
    );
    assert_eq!(
        app.post_json("/user/signup", None, creds.clone()).await.0,
        StatusCode::CONFLICT
    );
    assert_eq!(
        app.post_json("/user/signup", None, json!({ "username": "bob" }))
            .await
            .0,
        StatusCode::BAD_REQUEST
    );

    let wrong = json!({ "username": "alice", "password": "nope" });
    assert_eq!(
        app.post_json("/user/authenticate", None, wrong).await.0,
        StatusCode::UNAUTHORIZED
    );
    let unknown = json!({ "username": "carol", "password": "pw" });
    assert_eq!(
        app.post_json("/user/authenticate", None, unknown).await.0,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.post_json("/user/authenticate", None, creds).await.0,
        StatusCode::OK
    );
}

#[tokio::test]
async fn protected_routes_classify_token_failures() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/feed/home", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(parse(&body)["status"], 401);

    assert_eq!(
        app.get("/feed/home", Some("token=not-a-jwt")).await.0,
        StatusCode::BAD_REQUEST
    );

    let foreign = TokenCodec::new(b"another-secret")
        .issue("alice", std::time::Duration::from_secs(60))
        .unwrap();
    assert_eq!(
        app.get("/feed/home", Some(&format!("token={}", foreign.token)))
            .await
            .0,
        StatusCode::UNAUTHORIZED
    );

    let cookie = app.login("alice").await;
    let (status, body) = app.get("/feed/home", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!([]));
}

#[tokio::test]
async fn refresh_is_refused_early_and_logout_expires_cookie() {
    let app = TestApp::new().await;
    let cookie = app.login("alice").await;

    let (status, _) = app.post_json("/user/refresh", Some(&cookie), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::post("/user/logout")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("token=;"));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn private_photo_is_hidden_like_a_missing_one() {
    let app = TestApp::new().await;
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;

    let (status, body) = app.upload(&alice, b"jpeg bytes", false).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["PhotoID"].as_str().unwrap().to_string();

    let (anon_status, anon_body) = app.get(&format!("/photo/{id}"), None).await;
    let (bob_status, bob_body) = app.get(&format!("/photo/{id}"), Some(&bob)).await;
    let (missing_status, missing_body) = app.get("/photo/does-not-exist", Some(&bob)).await;
    assert_eq!(anon_status, StatusCode::BAD_REQUEST);
    assert_eq!(bob_status, anon_status);
    assert_eq!(missing_status, anon_status);
    assert_eq!(bob_body, missing_body);
    assert_eq!(anon_body, missing_body);

    let (status, body) = app.get(&format!("/photo/{id}"), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    let details = parse(&body);
    assert_eq!(details["PhotoID"], id.as_str());
    assert_eq!(details["Username"], "alice");
    assert_eq!(details["IsOwnedByAPIUser"], true);
    assert_eq!(details["IsPublic"], false);

    let (status, body) = app.get("/feed/public", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!([]));
}

#[tokio::test]
async fn signed_url_serves_bytes_and_rejects_tampering() {
    let app = TestApp::new().await;
    let alice = app.login("alice").await;
    let (_, body) = app.upload(&alice, b"the actual photo", true).await;
    let id = body["PhotoID"].as_str().unwrap().to_string();

    let (_, feed) = app.get("/feed/public", None).await;
    let feed = parse(&feed);
    assert_eq!(feed[0]["PhotoID"], id.as_str());
    let url = feed[0]["ImageURL"].as_str().unwrap().to_string();

    let (status, bytes) = app.get(local_part(&url), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], b"the actual photo");

    let (path, query) = local_part(&url).split_once('?').unwrap();
    let tampered = format!("{path}?{}", query.replace("signature=", "signature=AAAA"));
    assert_eq!(app.get(&tampered, None).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.get(path, None).await.0, StatusCode::FORBIDDEN);

    let bucket_and_key = path.strip_prefix("/objects/").unwrap();
    let (bucket, key) = bucket_and_key.split_once('/').unwrap();
    let past = chrono::Utc::now().timestamp() - 10;
    let signature = UrlSigner::new(SIGNING_SECRET)
        .sign(AccessMethod::Get, bucket, key, past)
        .unwrap();
    let expired = format!("{path}?expires={past}&signature={signature}");
    assert_eq!(app.get(&expired, None).await.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn permission_changes_move_photo_between_feeds() {
    let app = TestApp::new().await;
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;
    let (_, body) = app.upload(&alice, b"going public", false).await;
    let id = body["PhotoID"].as_str().unwrap().to_string();

    let (status, _) = app
        .post_json(
            "/photo/edit/permissions",
            Some(&bob),
            json!({ "PhotoID": id, "IsPublic": true }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json("/photo/edit/permissions", Some(&alice), json!({ "IsPublic": true }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post_json(
            "/photo/edit/permissions",
            Some(&alice),
            json!({ "PhotoID": id, "IsPublic": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert!(body.get("warning").is_none());

    let (_, feed) = app.get("/feed/public", None).await;
    assert_eq!(parse(&feed)[0]["PhotoID"], id.as_str());

    let (status, body) = app
        .post_json(
            "/photo/edit/permissions",
            Some(&alice),
            json!({ "PhotoID": id, "IsPublic": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], false);
}

#[tokio::test]
async fn delete_requires_ownership() {
    let app = TestApp::new().await;
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;
    let (_, body) = app.upload(&alice, b"temporary", true).await;
    let id = body["PhotoID"].as_str().unwrap().to_string();

    let (status, _) = app
        .post_json("/photo/delete", Some(&bob), json!({ "PhotoID": id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json("/photo/delete", Some(&alice), json!({ "PhotoID": id }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, feed) = app.get("/feed/public", None).await;
    assert_eq!(parse(&feed), json!([]));
    let (status, _) = app
        .post_json("/photo/delete", Some(&alice), json!({ "PhotoID": id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_with_file_before_flag_is_buffered_and_stored() {
    let app = TestApp::new().await;
    let alice = app.login("alice").await;

    let (status, body) = app
        .upload_ordered(&alice, b"file came first", false, false)
        .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["PhotoID"].as_str().unwrap().to_string();

    let (status, body) = app.get(&format!("/photo/{id}"), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    let details = parse(&body);
    assert_eq!(details["IsPublic"], false);
    let url = details["ImageURL"].as_str().unwrap().to_string();
    assert!(local_part(&url).starts_with("/objects/owner-"));

    let (status, bytes) = app.get(local_part(&url), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], b"file came first");

    let (_, feed) = app.get("/feed/public", None).await;
    assert_eq!(parse(&feed), json!([]));
}

#[tokio::test]
async fn upload_without_flag_is_rejected() {
    let app = TestApp::new().await;
    let alice = app.login("alice").await;

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"uploadFile\"; filename=\"a.jpg\"\r\n\r\nbytes\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::post("/photo/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::COOKIE, &alice)
        .body(Body::from(body))
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, home) = app.get("/feed/home", Some(&alice)).await;
    assert_eq!(parse(&home), json!([]));
}
