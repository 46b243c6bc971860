use folio_backend::host::MemoryHost;
use folio_backend::{
    Backend, BackendConfig, BackendError, ErrorPayload, ErrorResponse, HostedBackend,
    PersistOptions, ProxyBackend, ProxyRequest, RetryConfig, dispatch,
};
use folio_model::{Collection, Entry, Field, MediaFile, PersistedFile, WorkflowStatus};
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn posts() -> Collection {
    Collection::folder("posts", "_posts", vec![Field::string("title")])
}

fn client(server: &MockServer) -> ProxyBackend {
    let mut config = BackendConfig::new("proxy", "");
    config.proxy_url = Some(format!("{}/api/v1/", server.uri()));
    ProxyBackend::new(&config).unwrap()
}

fn memory_backend(host: &Arc<MemoryHost>) -> HostedBackend {
    let config = BackendConfig::new("test-repo", "").with_retry(RetryConfig::no_retry());
    HostedBackend::new("test-repo", &config, host.clone()).unwrap()
}

// ── Client ──────────────────────────────────────────────────────

#[test]
fn client_needs_a_url() {
    let err = ProxyBackend::new(&BackendConfig::new("proxy", "")).err().unwrap();
    assert!(matches!(err, BackendError::Validation(_)));
}

#[tokio::test]
async fn client_posts_actions_to_the_endpoint() {
    let server = MockServer::start().await;
    let mut entry = Entry::new("posts", json!({ "title": "Hello" }));
    entry.path = "_posts/hello.md".to_string();
    entry.slug = "hello".to_string();

    Mock::given(method("POST"))
        .and(path("/api/v1"))
        .and(body_partial_json(json!({
            "action": "listEntries",
            "params": { "collection": { "name": "posts" } },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![entry.clone()]))
        .expect(1)
        .mount(&server)
        .await;

    let backend = client(&server);
    assert_eq!(backend.name(), "proxy");
    let listed: Vec<Entry> = backend.list_entries(&posts()).try_collect().await.unwrap();
    assert_eq!(listed, vec![entry]);
}

#[tokio::test]
async fn unit_results_accept_null() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "action": "updateUnpublishedEntryStatus",
            "params": { "path": "_posts/a.md", "status": "pending_review" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .update_unpublished_entry_status("_posts/a.md", WorkflowStatus::PendingReview)
        .await
        .unwrap();
}

#[tokio::test]
async fn error_bodies_keep_their_details() {
    let server = MockServer::start().await;
    let body = ErrorResponse {
        error: ErrorPayload {
            kind: "conflict".to_string(),
            message: "stale".to_string(),
            path: Some("_posts/a.md".to_string()),
            expected: Some("h1".to_string()),
            actual: Some("h2".to_string()),
            ..Default::default()
        },
    };
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(409).set_body_json(&body))
        .mount(&server)
        .await;

    let err = client(&server).delete_media("_posts/a.md").await.unwrap_err();
    match err {
        BackendError::Conflict {
            path,
            expected,
            actual,
        } => {
            assert_eq!(path, "_posts/a.md");
            assert_eq!(expected.as_deref(), Some("h1"));
            assert_eq!(actual.as_deref(), Some("h2"));
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn opaque_server_errors_are_network_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client(&server).read_media("a.png").await.unwrap_err();
    assert!(matches!(err, BackendError::Network(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn cancelled_saves_never_reach_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json("h1"))
        .expect(0)
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    token.cancel();
    let mut entry = Entry::new("posts", json!({ "title": "Hello" }));
    entry.path = "_posts/hello.md".to_string();
    let err = client(&server)
        .persist_entry(
            &entry,
            vec![PersistedFile::new("_posts/hello.md", "---\ntitle: Hello\n---\n")],
            PersistOptions::new_entry().with_cancel(token),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Cancelled));
}

// ── Server side ─────────────────────────────────────────────────

#[tokio::test]
async fn dispatch_runs_requests_against_a_backend() {
    let host = Arc::new(
        MemoryHost::default().with_files([("_posts/hello.md", "---\ntitle: Hello\n---\n")]),
    );
    let backend = memory_backend(&host);

    let request: ProxyRequest = serde_json::from_value(json!({
        "action": "listEntries",
        "params": { "collection": posts() },
    }))
    .unwrap();
    let result = dispatch(&backend, request).await.unwrap();
    let entries: Vec<Entry> = serde_json::from_value(result).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].get_str("/title"), Some("Hello"));
}

#[tokio::test]
async fn dispatch_returns_null_for_unit_operations() {
    let host = Arc::new(MemoryHost::default());
    let backend = memory_backend(&host);
    backend
        .persist_media(MediaFile::new("a.png", vec![1, 2, 3]))
        .await
        .unwrap();

    let result = dispatch(
        &backend,
        ProxyRequest::DeleteMedia {
            path: "static/media/a.png".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(result, Value::Null);
    assert_eq!(host.file("static/media/a.png").await, None);
}

#[tokio::test]
async fn dispatch_surfaces_backend_errors() {
    let host = Arc::new(MemoryHost::default());
    let backend = memory_backend(&host);
    let err = dispatch(
        &backend,
        ProxyRequest::PublishUnpublishedEntry {
            path: "_posts/a.md".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BackendError::Unsupported(_)));
    assert_eq!(err.http_status(), 501);
}
