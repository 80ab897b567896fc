//! End-to-end tests for the snippet HTTP API against a real listener.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use snipvault_server::{
    clock::ManualClock,
    router,
    store::{Cipher, EncryptionKey, Store},
    AppState, DisplayZone, SnippetService,
};
use tokio::net::TcpListener;

const T0: i64 = 1_700_000_000;

struct TestServer {
    base_url: String,
    clock: Arc<ManualClock>,
    store: Store,
    _dir: tempfile::TempDir,
}

async fn start_test_server() -> TestServer {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = Store::open(&dir.path().join("snipvault.db")).expect("open store");
    let cipher = Arc::new(Cipher::new(&EncryptionKey::generate()));
    let clock = Arc::new(ManualClock::new(T0));
    let service = SnippetService::new(cipher, store.clone()).with_clock(clock.clone());

    let state = AppState {
        service,
        default_ttl_secs: 86_400,
        display: DisplayZone::default(),
    };
    let app = router(state, None);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        clock,
        store,
        _dir: dir,
    }
}

async fn post_snippet(server: &TestServer, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/snippets", server.base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get_snippet(server: &TestServer, id: &str) -> (u16, Value) {
    let resp = reqwest::get(format!("{}/api/snippets/{id}", server.base_url))
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn create_and_retrieve_round_trip() {
    let server = start_test_server().await;

    let (status, created) =
        post_snippet(&server, json!({"text": "hello world", "expiration_seconds": 5})).await;
    assert_eq!(status, 200);
    assert_eq!(created["timezone"], "EST");
    // T0 + 5s in New York standard time.
    assert_eq!(created["expiration_time"], "2023-11-14T17:13:25-05:00");

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = get_snippet(&server, id).await;
    assert_eq!(status, 200);
    assert_eq!(fetched["text"], "hello world");
    assert_eq!(fetched["expiration_time"], created["expiration_time"]);
    assert_eq!(fetched["timezone"], "EST");
}

#[tokio::test]
async fn missing_expiration_defaults_to_a_day() {
    let server = start_test_server().await;
    let (status, created) = post_snippet(&server, json!({"text": "later"})).await;
    assert_eq!(status, 200);
    assert_eq!(created["expiration_time"], "2023-11-15T17:13:20-05:00");
}

#[tokio::test]
async fn expiration_accepts_numeric_strings_and_truncates_floats() {
    let server = start_test_server().await;

    let (status, created) =
        post_snippet(&server, json!({"text": "a", "expiration_seconds": "300"})).await;
    assert_eq!(status, 200);
    assert_eq!(created["expiration_time"], "2023-11-14T17:18:20-05:00");

    let (status, created) =
        post_snippet(&server, json!({"text": "b", "expiration_seconds": 5.7})).await;
    assert_eq!(status, 200);
    assert_eq!(created["expiration_time"], "2023-11-14T17:13:25-05:00");

    let (status, _) = post_snippet(&server, json!({"text": "c", "expiration_seconds": 0.5})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn expired_snippet_is_404_and_removed() {
    let server = start_test_server().await;
    let (_, created) =
        post_snippet(&server, json!({"text": "hello world", "expiration_seconds": 5})).await;
    let id = created["id"].as_str().unwrap().to_owned();

    server.clock.advance(6);
    let (status, body) = get_snippet(&server, &id).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "snippet not found");
    assert!(server.store.lookup(&id).unwrap().is_none());
}

#[tokio::test]
async fn unknown_id_is_404() {
    let server = start_test_server().await;
    let (status, body) = get_snippet(&server, "AAAAAAAAAAAAAAAA").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "snippet not found");
}

#[tokio::test]
async fn invalid_input_is_400() {
    let server = start_test_server().await;

    for body in [
        json!({"text": "", "expiration_seconds": 100}),
        json!({"expiration_seconds": 100}),
        json!({"text": "x", "expiration_seconds": 0}),
        json!({"text": "x", "expiration_seconds": 999_999}),
        json!({"text": "x", "expiration_seconds": "soon"}),
    ] {
        let (status, resp) = post_snippet(&server, body.clone()).await;
        assert_eq!(status, 400, "body {body} should be rejected");
        assert!(resp["error"].is_string());
    }
    assert!(server.store.is_empty().unwrap());
}

#[tokio::test]
async fn non_json_body_is_400() {
    let server = start_test_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/snippets", server.base_url))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn index_health_and_fallback() {
    let server = start_test_server().await;

    let resp = reqwest::get(format!("{}/", server.base_url)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp.text().await.unwrap().contains("snipvault"));

    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"status": "ok"}));

    let resp = reqwest::get(format!("{}/nope", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    assert_eq!(resp.json::<Value>().await.unwrap()["error"], "not found");
}
