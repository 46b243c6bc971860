use folio_backend::host::gateway::{self, GatewayTokens};
use folio_backend::host::{
    AzureHost, BitbucketHost, GitHubHost, GitLabHost, StaticToken, TokenSource, content_hash,
};
use folio_backend::{
    BackendConfig, BackendError, Credentials, HostApi, RetryConfig, SaveOrchestrator, SavePlan,
};
use folio_model::{CommitRequest, PersistedFile, WorkflowStatus};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token() -> Arc<dyn TokenSource> {
    Arc::new(StaticToken::new("secret"))
}

fn quick_retries() -> RetryConfig {
    RetryConfig::new(3)
        .with_initial_delay(Duration::from_millis(1))
        .without_jitter()
}

fn create_a() -> SavePlan {
    SavePlan::new("main", "Create a")
        .with_writes(vec![PersistedFile::new("a.md", "a")])
        .new_entry(true)
}

fn config(name: &str, repo: &str, server: &MockServer) -> BackendConfig {
    BackendConfig::new(name, repo)
        .with_api_root(server.uri())
        .with_retry(RetryConfig::no_retry())
}

// ── GitHub ──────────────────────────────────────────────────────

async fn github() -> (MockServer, GitHubHost) {
    let server = MockServer::start().await;
    let host = GitHubHost::new(&config("github", "owner/site", &server), token()).unwrap();
    (server, host)
}

async fn mount_github_head(server: &MockServer, sha: &str) {
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": { "sha": sha } })))
        .mount(server)
        .await;
}

#[test]
fn github_repo_must_have_owner_and_name() {
    let config = BackendConfig::new("github", "site");
    assert!(matches!(
        GitHubHost::new(&config, token()).err(),
        Some(BackendError::Validation(_))
    ));
}

#[tokio::test]
async fn github_commit_builds_blobs_tree_commit_and_ref() {
    let (server, host) = github().await;
    mount_github_head(&server, "head1").await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/commits/head1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tree": { "sha": "tree1" } })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/owner/site/git/blobs"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "blob1" })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/owner/site/git/trees"))
        .and(body_partial_json(json!({ "base_tree": "tree1" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "tree2" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/owner/site/git/commits"))
        .and(body_partial_json(json!({ "tree": "tree2", "parents": ["head1"] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "commit2" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/repos/owner/site/git/refs/heads/main"))
        .and(body_partial_json(json!({ "sha": "commit2", "force": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let request = CommitRequest::new("main", "Update posts")
        .write("_posts/a.md", "a", None)
        .write("_posts/b.md", "b", Some("old".to_string()))
        .delete("_posts/c.md", Some("c1".to_string()));
    let outcome = host.commit(&request).await.unwrap();

    assert_eq!(outcome.revision, "commit2");
    assert_eq!(outcome.hashes.len(), 2);
    assert_eq!(outcome.hashes["_posts/a.md"], "blob1");
}

#[tokio::test]
async fn github_moved_ref_is_a_conflict() {
    let (server, host) = github().await;
    mount_github_head(&server, "head1").await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/commits/head1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tree": { "sha": "tree1" } })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/repos/owner/site/git/(blobs|trees|commits)$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "x" })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/repos/owner/site/git/refs/heads/main"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Update is not a fast forward" })),
        )
        .mount(&server)
        .await;

    let request = CommitRequest::new("main", "m").write("a.md", "a", None);
    match host.commit(&request).await {
        Err(BackendError::Conflict { path, expected, .. }) => {
            assert_eq!(path, "refs/heads/main");
            assert_eq!(expected.as_deref(), Some("head1"));
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn github_commit_builds_on_the_given_parent() {
    let (server, host) = github().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": { "sha": "head2" } })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/commits/pinned"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tree": { "sha": "tree-pinned" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/owner/site/git/blobs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "blob1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/owner/site/git/trees"))
        .and(body_partial_json(json!({ "base_tree": "tree-pinned" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "tree2" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/owner/site/git/commits"))
        .and(body_partial_json(json!({ "parents": ["pinned"] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "commit2" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/repos/owner/site/git/refs/heads/main"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Update is not a fast forward" })),
        )
        .mount(&server)
        .await;

    let request = CommitRequest::new("main", "m")
        .with_parent("pinned")
        .write("a.md", "a", None);
    match host.commit(&request).await {
        Err(BackendError::Conflict { path, expected, .. }) => {
            assert_eq!(path, "refs/heads/main");
            assert_eq!(expected.as_deref(), Some("pinned"));
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn github_save_commits_on_the_head_it_resolved() {
    let (server, host) = github().await;
    // The branch moves after the save has read it.
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": { "sha": "head1" } })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_github_head(&server, "head2").await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/commits/head1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tree": { "sha": "tree1" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/repos/owner/site/git/(blobs|trees)$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "x" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/owner/site/git/commits"))
        .and(body_partial_json(json!({ "parents": ["head1"] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "commit2" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/repos/owner/site/git/refs/heads/main"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Update is not a fast forward" })),
        )
        .mount(&server)
        .await;

    let orchestrator = SaveOrchestrator::new(Arc::new(host), RetryConfig::no_retry());
    let err = orchestrator
        .save(create_a(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Conflict { .. }));
}

#[tokio::test]
async fn github_reads_base64_contents() {
    let (server, host) = github().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/contents/_posts/a.md"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "blob-a",
            "content": "aGVs\nbG8=\n",
            "size": 5,
        })))
        .mount(&server)
        .await;

    let file = host.read_file("main", "_posts/a.md").await.unwrap();
    assert_eq!(file.content, b"hello".to_vec());
    assert_eq!(file.content_hash.as_deref(), Some("blob-a"));
    assert_eq!(
        host.file_hash("main", "_posts/a.md").await.unwrap().as_deref(),
        Some("blob-a")
    );
}

#[tokio::test]
async fn github_missing_file_has_no_hash() {
    let (server, host) = github().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/contents/_posts/none.md"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(host.file_hash("main", "_posts/none.md").await.unwrap(), None);
    assert!(
        host.read_file("main", "_posts/none.md")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn github_pull_requests_carry_status_labels() {
    let (server, host) = github().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/pulls"))
        .and(query_param("state", "open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "number": 7,
                "head": { "ref": "cms/posts/_posts/a.md", "sha": "s7" },
                "labels": [{ "name": "folio/pending_review" }],
            },
            {
                "number": 8,
                "head": { "ref": "feature/unrelated", "sha": "s8" },
                "labels": [],
            },
        ])))
        .mount(&server)
        .await;

    let requests = host.list_change_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].id, "7");
    assert_eq!(requests[0].collection, "posts");
    assert_eq!(requests[0].entry_path, "_posts/a.md");
    assert_eq!(requests[0].status, WorkflowStatus::PendingReview);
}

#[tokio::test]
async fn github_rate_limit_is_reported() {
    let (server, host) = github().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/ref/heads/main"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("retry-after", "30"),
        )
        .mount(&server)
        .await;

    let err = host.branch_head("main").await.unwrap_err();
    assert!(matches!(
        err,
        BackendError::RateLimited {
            retry_after_secs: Some(30)
        }
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unavailable_host_is_refused_not_ambiguous() {
    let (server, host) = github().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = host.branch_head("main").await.unwrap_err();
    assert!(matches!(err, BackendError::Unavailable(_)));
    assert!(err.is_refused());
    assert!(err.is_retryable());
    assert!(!BackendError::Network("reset".into()).is_refused());
}

#[tokio::test]
async fn github_rejected_token_is_auth_error() {
    let (server, host) = github().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/site/git/ref/heads/main"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .mount(&server)
        .await;

    let err = host.branch_head("main").await.unwrap_err();
    assert!(matches!(err, BackendError::Auth(_)));
}

// ── GitLab ──────────────────────────────────────────────────────

#[tokio::test]
async fn gitlab_commit_uses_actions_and_reads_blob_ids() {
    let server = MockServer::start().await;
    let host = GitLabHost::new(&config("gitlab", "group/site", &server), token()).unwrap();
    Mock::given(method("POST"))
        .and(path_regex(r"/repository/commits$"))
        .and(body_partial_json(json!({
            "branch": "main",
            "actions": [
                { "action": "create", "file_path": "a.md" },
                { "action": "delete", "file_path": "b.md" },
            ],
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "c1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path_regex(r"/repository/files/a\.md$"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-gitlab-blob-id", "blob-a"))
        .mount(&server)
        .await;

    let request = CommitRequest::new("main", "m")
        .write("a.md", "a", None)
        .delete("b.md", Some("b0".to_string()));
    let outcome = host.commit(&request).await.unwrap();
    assert_eq!(outcome.revision, "c1");
    assert_eq!(outcome.hashes["a.md"], "blob-a");
}

#[tokio::test]
async fn gitlab_commit_survives_a_failed_blob_id_lookup() {
    let server = MockServer::start().await;
    let host = GitLabHost::new(&config("gitlab", "group/site", &server), token()).unwrap();
    // Absent while resolving, unreachable once committed.
    Mock::given(method("HEAD"))
        .and(path_regex(r"/repository/files/a\.md$"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path_regex(r"/repository/files/a\.md$"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/repository/commits$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "c1" })))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = SaveOrchestrator::new(Arc::new(host), quick_retries());
    let base_hash = orchestrator
        .save(create_a(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(base_hash.get("a.md"), Some(content_hash(b"a").as_str()));
}

#[tokio::test]
async fn gitlab_ambiguous_commit_failure_is_not_resent() {
    let server = MockServer::start().await;
    let host = GitLabHost::new(&config("gitlab", "group/site", &server), token()).unwrap();
    Mock::given(method("POST"))
        .and(path_regex(r"/repository/commits$"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = SaveOrchestrator::new(Arc::new(host), quick_retries());
    let err = orchestrator
        .save(create_a(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Network(_)));
}

#[tokio::test]
async fn gitlab_refused_commit_is_resent() {
    let server = MockServer::start().await;
    let host = GitLabHost::new(&config("gitlab", "group/site", &server), token()).unwrap();
    Mock::given(method("POST"))
        .and(path_regex(r"/repository/commits$"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/repository/commits$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "c1" })))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = SaveOrchestrator::new(Arc::new(host), quick_retries());
    orchestrator
        .save(create_a(), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn gitlab_stale_create_is_a_conflict() {
    let server = MockServer::start().await;
    let host = GitLabHost::new(&config("gitlab", "group/site", &server), token()).unwrap();
    Mock::given(method("POST"))
        .and(path_regex(r"/repository/commits$"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "message": "A file with this name already exists" })),
        )
        .mount(&server)
        .await;

    let request = CommitRequest::new("main", "m").write("a.md", "a", None);
    let err = host.commit(&request).await.unwrap_err();
    assert!(matches!(err, BackendError::Conflict { .. }));
}

#[tokio::test]
async fn gitlab_tree_listing_follows_pages() {
    let server = MockServer::start().await;
    let host = GitLabHost::new(&config("gitlab", "group/site", &server), token()).unwrap();
    Mock::given(method("GET"))
        .and(path_regex(r"/repository/tree$"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "2")
                .set_body_json(json!([
                    { "path": "_posts/a.md", "type": "blob", "id": "h-a" },
                    { "path": "_posts/drafts", "type": "tree", "id": "t1" },
                ])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/repository/tree$"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "")
                .set_body_json(json!([{ "path": "_posts/b.md", "type": "blob", "id": "h-b" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let files = host.list_files("main", "_posts", 1).await.unwrap();
    let listed: Vec<(&str, Option<&str>)> = files
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_deref()))
        .collect();
    assert_eq!(
        listed,
        vec![("_posts/a.md", Some("h-a")), ("_posts/b.md", Some("h-b"))]
    );
}

#[tokio::test]
async fn gitlab_branch_comparison_decides_fast_forward() {
    let server = MockServer::start().await;
    let host = GitLabHost::new(&config("gitlab", "group/site", &server), token()).unwrap();
    Mock::given(method("GET"))
        .and(path_regex(r"/repository/compare$"))
        .and(query_param("from", "cms/posts/a.md"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "commits": [] })))
        .mount(&server)
        .await;

    assert!(host.is_fast_forward("main", "cms/posts/a.md").await.unwrap());
}

// ── Bitbucket ───────────────────────────────────────────────────

#[tokio::test]
async fn bitbucket_hashes_raw_content() {
    let server = MockServer::start().await;
    let host = BitbucketHost::new(&config("bitbucket", "team/site", &server), token()).unwrap();
    Mock::given(method("GET"))
        .and(path("/repositories/team/site/src/main/_posts/a.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let file = host.read_file("main", "_posts/a.md").await.unwrap();
    assert_eq!(file.content, b"hello".to_vec());
    assert_eq!(file.content_hash, Some(content_hash(b"hello")));
}

#[tokio::test]
async fn bitbucket_commit_posts_to_src() {
    let server = MockServer::start().await;
    let host = BitbucketHost::new(&config("bitbucket", "team/site", &server), token()).unwrap();
    Mock::given(method("GET"))
        .and(path("/repositories/team/site/refs/branches/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "target": { "hash": "h1" } })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repositories/team/site/src"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let request = CommitRequest::new("main", "m").write("a.md", "a", None);
    let outcome = host.commit(&request).await.unwrap();
    assert_eq!(outcome.hashes["a.md"], content_hash(b"a"));
}

// ── Azure DevOps ────────────────────────────────────────────────

#[test]
fn azure_repo_needs_organization_project_and_name() {
    let config = BackendConfig::new("azure", "org/site");
    assert!(AzureHost::new(&config, token()).is_err());
}

#[tokio::test]
async fn azure_moved_branch_rejects_the_push() {
    let server = MockServer::start().await;
    let host = AzureHost::new(&config("azure", "org/proj/site", &server), token()).unwrap();
    Mock::given(method("GET"))
        .and(path("/org/proj/_apis/git/repositories/site/refs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "value": [{ "objectId": "h1" }] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/org/proj/_apis/git/repositories/site/pushes"))
        .and(body_partial_json(json!({
            "refUpdates": [{ "name": "refs/heads/main", "oldObjectId": "h1" }],
        })))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let request = CommitRequest::new("main", "m").write("a.md", "a", None);
    match host.commit(&request).await {
        Err(BackendError::Conflict { path, expected, .. }) => {
            assert_eq!(path, "refs/heads/main");
            assert_eq!(expected.as_deref(), Some("h1"));
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
}

// ── Git gateway ─────────────────────────────────────────────────

#[tokio::test]
async fn gateway_picks_the_enabled_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "gitlab_enabled": true, "roles": [] })),
        )
        .mount(&server)
        .await;

    let mut config = BackendConfig::new("git-gateway", "");
    config.gateway_url = Some(format!("{}/", server.uri()));
    let host = gateway::connect(&config, &Credentials::token("jwt"))
        .await
        .unwrap();
    assert_eq!(host.provider_name(), "GitLab");
}

#[tokio::test]
async fn gateway_without_providers_is_unsupported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let mut config = BackendConfig::new("git-gateway", "");
    config.gateway_url = Some(server.uri());
    let err = gateway::connect(&config, &Credentials::token("jwt"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BackendError::Unsupported(_)));
}

#[tokio::test]
async fn gateway_refreshes_a_rejected_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/settings"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/settings"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "github_enabled": true })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = Credentials::token("stale").with_refresh_token("refresh-1");
    let tokens: Arc<dyn TokenSource> = Arc::new(
        GatewayTokens::new(
            &credentials,
            Some(format!("{}/identity", server.uri())),
            Duration::from_secs(5),
        )
        .unwrap(),
    );
    let settings = gateway::fetch_settings(&server.uri(), tokens.clone(), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(settings.github_enabled);
    assert_eq!(tokens.token().await.unwrap(), "fresh");
}

#[test]
fn gateway_needs_a_token() {
    let err = GatewayTokens::new(&Credentials::default(), None, Duration::from_secs(5))
        .err()
        .unwrap();
    assert!(matches!(err, BackendError::Auth(_)));
}
