//! HTTP viewer tests.
//!
//! Each test binds the viewer router on an ephemeral port over an in-memory
//! attachment store and drives it with `reqwest`, the way a browser would.

use publish_report::server::{router, AppState};
use publish_report_core::identifier::AttachmentPath;
use publish_report_core::models::{Environment, ItemKey, RunScope};
use publish_report_core::store::memory::InMemoryAttachmentStore;
use publish_report_core::ATTACHMENT_TYPE;
use serde_json::Value;
use std::sync::Arc;

fn env() -> Environment {
    Environment {
        project_id: "proj".to_string(),
        name: "nightly".to_string(),
        scope: RunScope::Build { build_id: 8 },
    }
}

fn path(record: &str, name: &str) -> AttachmentPath {
    AttachmentPath {
        timeline_id: "tl".to_string(),
        record_id: record.to_string(),
        category: "build".to_string(),
        attachment_type: ATTACHMENT_TYPE.to_string(),
        name: name.to_string(),
    }
}

fn seeded() -> Arc<InMemoryAttachmentStore> {
    let store = InMemoryAttachmentStore::new();
    store.insert(None, path("job-1", "Unit.html"), b"<h1>unit</h1>".to_vec());
    store.insert(None, path("job-2", "E2E.html"), b"<h1>e2e</h1>".to_vec());
    Arc::new(store)
}

/// Load the session, serve it, and return the base URL.
async fn serve(store: Arc<InMemoryAttachmentStore>) -> String {
    let state = AppState::new(store, env());
    state.load().await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    base
}

#[tokio::test]
async fn index_renders_first_report() {
    let base = serve(seeded()).await;
    let page = reqwest::get(format!("{}/", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(page.contains("<h1>nightly</h1>"));
    assert!(page.contains("srcdoc=\"&lt;h1&gt;unit&lt;/h1&gt;\""));
    assert!(page.contains(">Unit</button>"));
    assert!(page.contains(">E2E</button>"));
    assert!(page.contains(">Download</a>"));
}

#[tokio::test]
async fn selecting_a_tab_fetches_once() {
    let store = seeded();
    let base = serve(store.clone()).await;
    let client = reqwest::Client::new();
    let e2e = ItemKey::derive("job-2", "E2E.html");

    for _ in 0..2 {
        let page = client
            .post(format!("{}/tabs/{}", base, e2e))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(page.contains("srcdoc=\"&lt;h1&gt;e2e&lt;/h1&gt;\""));
    }
    assert_eq!(store.content_calls(), 2);

    let view: Value = client
        .get(format!("{}/api/view", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["tabs"][1]["selected"], true);
    assert_eq!(view["pane"]["kind"], "document");
}

#[tokio::test]
async fn report_endpoint_returns_document() {
    let store = seeded();
    let base = serve(store.clone()).await;
    let e2e = ItemKey::derive("job-2", "E2E.html");

    let resp = reqwest::get(format!("{}/reports/{}", base, e2e)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "<h1>e2e</h1>");

    let again = reqwest::get(format!("{}/reports/{}", base, e2e))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(again, "<h1>e2e</h1>");
    assert_eq!(store.content_calls(), 2);
}

#[tokio::test]
async fn unknown_key_is_not_found() {
    let base = serve(seeded()).await;
    let resp = reqwest::get(format!("{}/reports/bm9wZQ", base)).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn fetch_failure_is_shown_and_retried() {
    let store = seeded();
    store.fail_content(Some("attachment service unavailable"));
    let base = serve(store.clone()).await;

    let page = reqwest::get(format!("{}/", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("class=\"message error\""));
    assert!(page.contains("attachment service unavailable"));

    store.fail_content(None);
    let unit = ItemKey::derive("job-1", "Unit.html");
    let page = reqwest::Client::new()
        .post(format!("{}/tabs/{}", base, unit))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("srcdoc=\"&lt;h1&gt;unit&lt;/h1&gt;\""));
}

#[tokio::test]
async fn empty_run_shows_message_and_health() {
    let base = serve(Arc::new(InMemoryAttachmentStore::new())).await;

    let page = reqwest::get(format!("{}/", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("<div class=\"message warning\">no report found</div>"));

    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["state"], "empty");
}
