//! Graph delta client tests against a local mock server.

use changewatch_delta::{DeltaFeed, FeedChangeType, FeedError, GraphDeltaClient, SyncCursor};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DELTA_PATH: &str = "/me/drive/root:/tracked:/delta";

async fn client_for(server: &MockServer) -> GraphDeltaClient {
    let client = GraphDeltaClient::new("tracked", None).with_base_url(server.uri());
    client.set_access_token("test-token").await;
    client
}

#[tokio::test]
async fn first_fetch_returns_snapshot_and_cursor() {
    let server = MockServer::start().await;
    let delta_link = format!("{}/delta-next?token=t1", server.uri());
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "root-id", "name": "tracked" },
                { "id": "1", "name": "a.csv", "changeType": "created" }
            ],
            "@odata.deltaLink": delta_link
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let page = client.fetch(None).await.unwrap();

    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.entries[1].change_type, Some(FeedChangeType::Created));
    assert_eq!(page.next_cursor.as_str(), delta_link);
}

#[tokio::test]
async fn fetch_with_cursor_hits_cursor_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/delta-next"))
        .and(query_param("token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [],
            "@odata.deltaLink": format!("{}/delta-next?token=t2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let cursor = SyncCursor::new(format!("{}/delta-next?token=t1", server.uri()));
    let page = client.fetch(Some(&cursor)).await.unwrap();

    assert!(page.entries.is_empty());
    assert!(page.next_cursor.as_str().ends_with("token=t2"));
}

#[tokio::test]
async fn next_links_are_followed_until_delta_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "1", "name": "a.csv" }],
            "@odata.nextLink": format!("{}/page-2", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "2", "name": "b.csv" }],
            "@odata.deltaLink": format!("{}/delta-next?token=t1", server.uri())
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let page = client.fetch(None).await.unwrap();

    let ids: Vec<&str> = page.entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn unauthorized_is_reported_distinctly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.fetch(None).await.unwrap_err();

    assert!(matches!(err, FeedError::Unauthorized { status: 401 }));
    assert!(err.requires_reauth());
}

#[tokio::test]
async fn throttling_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.fetch(None).await.unwrap_err();

    match err {
        FeedError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(std::time::Duration::from_secs(7)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_retry_after_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1e20"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.fetch(None).await.unwrap_err();

    match err {
        FeedError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(std::time::Duration::from_secs(300)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_delta_link_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.fetch(None).await.unwrap_err();

    assert!(matches!(err, FeedError::Malformed { .. }), "{err:?}");
    assert!(!err.requires_reauth());
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.fetch(None).await.unwrap_err();

    assert!(matches!(err, FeedError::Malformed { .. }), "{err:?}");
}

#[tokio::test]
async fn upload_puts_file_content() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/me/drive/root:/tracked/a.csv:/content"))
        .and(header("content-type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.upload("a.csv", b"x,y\n1,2\n".to_vec()).await.unwrap();
}
