mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

use common::{chapter_url, fast_config, service, FakeSite, BASE_URL};
use manga_scraper::server::{create_router, AppState};
use manga_scraper::services::{AlertConfig, AlertEngine, HttpWebhookSender};

const TOKEN: &str = "s3cret";

struct Harness {
    app: Router,
    site: Arc<FakeSite>,
    _dir: TempDir,
}

fn harness(admin_token: Option<&str>) -> Harness {
    let dir = tempdir().unwrap();
    let site = FakeSite::new();
    let download = service(dir.path(), site.clone(), None, fast_config(dir.path()));
    let alerts = Arc::new(AlertEngine::new(
        download.store().clone(),
        AlertConfig::default(),
        Arc::new(HttpWebhookSender::new().unwrap()),
    ));
    let state = AppState::new(download, alerts, admin_token.map(str::to_string));
    Harness {
        app: create_router(state),
        site,
        _dir: dir,
    }
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_ping() {
    let h = harness(None);
    let (status, _) = call(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_submit_and_poll_until_done() {
    let h = harness(None);
    h.site.chapter(
        &chapter_url("solo", "chapter-1"),
        &["https://cdn.toongod.org/solo/1/01.jpg"],
    );

    let request = json!({
        "base_url": BASE_URL,
        "manga": { "id": "solo", "title": "Solo" },
        "chapter": { "id": "chapter-1", "title": "Chapter 1" },
    });
    let (status, body) = call(&h.app, post_json("/api/scraper/tasks", request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], false);
    let task_id = body["data"]["task_id"].as_str().unwrap().to_string();

    let uri = format!("/api/scraper/tasks/{}", task_id);
    let mut last = Value::Null;
    for _ in 0..200 {
        let (status, body) = call(&h.app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        last = body["data"].clone();
        if last["status"] == "success" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(last["status"], "success");
    assert_eq!(last["persisted"], true);
    assert_eq!(last["report"]["success_count"], 1);

    let (status, body) = call(&h.app, get("/api/scraper/tasks?status=success")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_submit_rejects_unknown_provider() {
    let h = harness(None);
    let request = json!({
        "base_url": "https://mirror.test",
        "site_hint": "nope",
        "manga": { "id": "solo" },
        "chapter": { "id": "chapter-1" },
    });
    let (status, body) = call(&h.app, post_json("/api/scraper/tasks", request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
    assert_eq!(body["data"]["code"], "SCRAPER_PROVIDER_UNAVAILABLE");
}

#[tokio::test]
async fn test_unknown_task_is_404() {
    let h = harness(None);
    let (status, body) = call(&h.app, get("/api/scraper/tasks/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["code"], "SCRAPER_TASK_NOT_FOUND");
}

#[tokio::test]
async fn test_list_rejects_unknown_status() {
    let h = harness(None);
    let (status, _) = call(&h.app, get("/api/scraper/tasks?status=sleeping")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_lists_providers() {
    let h = harness(None);
    let (status, body) = call(&h.app, get("/api/scraper/providers")).await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["toongod", "mangaforfree", "generic"]);
}

#[tokio::test]
async fn test_search_passes_through_to_provider() {
    let h = harness(None);
    h.site.page(
        &format!("{}/?s=solo&post_type=wp-manga", BASE_URL),
        r#"<div class="page-item-detail">
             <h3 class="h5 post-title"><a href="https://toongod.org/webtoon/solo/">Solo</a></h3>
           </div>"#,
    );

    let (status, body) = call(
        &h.app,
        post_json("/api/scraper/search", json!({ "base_url": BASE_URL, "keyword": "solo" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], "solo");
    assert_eq!(body["data"][0]["title"], "Solo");

    let (status, _) = call(
        &h.app,
        post_json("/api/scraper/search", json!({ "base_url": BASE_URL, "keyword": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_state_upload_and_lookup() {
    let h = harness(None);
    let far_future = chrono::Utc::now().timestamp() + 30 * 86_400;
    let upload = json!({
        "provider": "toongod",
        "storage_state": {
            "cookies": [
                { "name": "cf_clearance", "value": "abc", "domain": ".toongod.org", "expires": far_future }
            ]
        }
    });
    let (status, body) = call(&h.app, post_json("/api/scraper/state", upload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cookies"], 1);

    let (status, body) = call(&h.app, get("/api/scraper/state/toongod")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["exists"], true);

    let (status, _) = call(
        &h.app,
        post_json("/api/scraper/state", json!({ "provider": "nope", "storage_state": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_need_configured_token() {
    let h = harness(None);
    let (status, _) = call(&h.app, admin_get("/api/scraper/admin/health", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_routes_check_bearer_token() {
    let h = harness(Some(TOKEN));

    let (status, _) = call(&h.app, admin_get("/api/scraper/admin/health", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&h.app, admin_get("/api/scraper/admin/health", Some("wrong"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&h.app, admin_get("/api/scraper/admin/health", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["queue"]["backlog"], 0);
    assert_eq!(body["data"]["alerts_enabled"], true);
    assert_eq!(body["data"]["webhook_enabled"], false);

    let (status, body) = call(
        &h.app,
        admin_get("/api/scraper/admin/metrics?hours=6", Some(TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hours"], 6);

    let (status, body) = call(
        &h.app,
        admin_get("/api/scraper/admin/alerts?page=1&page_size=5", Some(TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["context"]["per_page"], 5);
    assert_eq!(body["context"]["total"], 0);

    let (status, body) = call(
        &h.app,
        admin_get(
            &format!("/api/scraper/admin/alerts?page={}", usize::MAX),
            Some(TOKEN),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = call(
        &h.app,
        admin_get("/api/scraper/admin/alerts?severity=loud", Some(TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_test_reports_skip_when_unconfigured() {
    let h = harness(Some(TOKEN));
    let request = Request::builder()
        .method("POST")
        .uri("/api/scraper/admin/alerts/test")
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "skipped");
    assert_eq!(body["data"]["configured"], false);
}
