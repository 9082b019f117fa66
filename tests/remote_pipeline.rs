//! End-to-end remote tracking against a mock delta feed.

use std::sync::Arc;
use std::time::Duration;

use changewatch::changes::{ChangeKind, ChangeLog, ChangeSink, ChangeSource};
use changewatch::config::{Config, NotifierBackend};
use changewatch::remote::{self, RecordFile};
use changewatch::TaskSupervisor;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DELTA_PATH: &str = "/me/drive/root:/one-drive-tracker:/delta";

struct Env {
    _dir: tempfile::TempDir,
    config: Config,
    log: Arc<ChangeLog>,
}

fn env(server: &MockServer, baseline: bool) -> Env {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.config_path = dir.path().join("config.toml");
    config.remote.enabled = true;
    config.remote.graph_base_url = server.uri();
    config.remote.access_token = Some("test-token".into());
    config.remote.baseline_on_first_run = baseline;
    config.notifier.backend = NotifierBackend::None;
    let log = Arc::new(ChangeLog::new(config.change_log_path()));
    Env {
        _dir: dir,
        config,
        log,
    }
}

impl Env {
    fn sink(&self) -> ChangeSink {
        ChangeSink::new(Arc::clone(&self.log), None)
    }
}

#[tokio::test]
async fn create_then_delete_in_one_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "root", "name": "one-drive-tracker" },
                { "id": "1", "name": "a.csv", "changeType": "created" },
                { "id": "1", "name": "a.csv", "changeType": "deleted",
                  "deleted": { "state": "softDeleted" } }
            ],
            "@odata.deltaLink": format!("{}/delta-next?token=t1", server.uri())
        })))
        .mount(&server)
        .await;

    let env = env(&server, false);
    let tracker = remote::connect(&env.config, env.sink()).await.unwrap();
    let summary = tracker.run_pass().await.unwrap();

    assert_eq!(summary.emitted, 2);
    assert_eq!(summary.skipped, 1);
    let records = env.log.load().await.unwrap();
    let got: Vec<(ChangeKind, &str, ChangeSource)> = records
        .iter()
        .map(|r| (r.kind, r.subject.as_str(), r.source))
        .collect();
    assert_eq!(
        got,
        vec![
            (ChangeKind::Created, "a.csv", ChangeSource::Remote),
            (ChangeKind::Deleted, "a.csv", ChangeSource::Remote),
        ]
    );

    let state = RecordFile::new(env.config.record_file_path())
        .load()
        .await
        .unwrap()
        .unwrap();
    assert!(state.record.is_empty());
    assert!(state.cursor.unwrap().as_str().ends_with("token=t1"));
}

#[tokio::test]
async fn baseline_then_incremental_pass() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "1", "name": "a.csv" },
                { "id": "2", "name": "b.csv" }
            ],
            "@odata.deltaLink": format!("{}/delta-next?token=t1", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/delta-next"))
        .and(query_param("token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "1", "name": "a.csv" },
                { "id": "2", "deleted": { "state": "deleted" } },
                { "id": "3", "name": "c.csv" }
            ],
            "@odata.deltaLink": format!("{}/delta-next?token=t2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let env = env(&server, true);
    let tracker = remote::connect(&env.config, env.sink()).await.unwrap();

    let first = tracker.run_pass().await.unwrap();
    assert!(first.baseline);
    assert!(env.log.load().await.unwrap().is_empty());

    let second = tracker.run_pass().await.unwrap();
    assert_eq!(second.emitted, 3);
    let got: Vec<(ChangeKind, String)> = env
        .log
        .load()
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.kind, r.subject))
        .collect();
    assert_eq!(
        got,
        vec![
            (ChangeKind::Updated, "a.csv".to_string()),
            (ChangeKind::Deleted, "b.csv".to_string()),
            (ChangeKind::Created, "c.csv".to_string()),
        ]
    );
    let record = tracker.context().record().await;
    assert_eq!(record.len(), 2);
    assert_eq!(record.get("3"), Some("c.csv"));
}

#[tokio::test]
async fn server_error_leaves_state_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "1", "name": "a.csv" }],
            "@odata.deltaLink": format!("{}/delta-next?token=t1", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/delta-next"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let env = env(&server, true);
    let tracker = remote::connect(&env.config, env.sink()).await.unwrap();
    tracker.run_pass().await.unwrap();
    let before = tracker.context().snapshot().await;

    let err = tracker.run_pass().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(tracker.context().snapshot().await, before);

    // A fresh context reloads the same committed state.
    let reloaded = RecordFile::new(env.config.record_file_path())
        .load()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded, before);
    assert!(env.log.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_token_asks_for_reauth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let env = env(&server, true);
    let tracker = remote::connect(&env.config, env.sink()).await.unwrap();
    let err = tracker.run_pass().await.unwrap_err();

    assert!(err.requires_reauth());
    assert!(tracker.context().cursor().await.is_none());
}

#[tokio::test]
async fn supervisor_drives_repeated_passes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DELTA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "1", "name": "a.csv" }],
            "@odata.deltaLink": format!("{}/delta-next?token=t1", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/delta-next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [],
            "@odata.deltaLink": format!("{}/delta-next?token=t1", server.uri())
        })))
        .mount(&server)
        .await;

    let env = env(&server, true);
    let tracker = remote::connect(&env.config, env.sink()).await.unwrap();
    let supervisor = TaskSupervisor::new(Duration::from_millis(20), Duration::from_secs(2));
    assert!(supervisor.start("remote", Arc::new(tracker)));

    let mut passes = 0;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        passes = supervisor.status("remote").unwrap().stats.passes;
        if passes >= 3 {
            break;
        }
    }
    assert!(passes >= 3, "only {passes} passes ran");
    assert_eq!(supervisor.status("remote").unwrap().stats.failures, 0);
    assert!(supervisor.stop_all().await);
}
