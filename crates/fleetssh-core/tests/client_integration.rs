mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{MockFactory, MockFleet, config};
use fleetssh_core::*;

async fn client(fleet: &Arc<MockFleet>, config: ClientConfig) -> ParallelClient {
    ParallelClient::new(config, Arc::new(MockFactory(Arc::clone(fleet))))
        .await
        .unwrap()
}

fn host_set<T>(results: &FleetResults<T>) -> BTreeSet<String> {
    results.hosts().map(str::to_string).collect()
}

fn expected(hosts: &[&str]) -> BTreeSet<String> {
    hosts.iter().map(|h| (*h).to_string()).collect()
}

#[tokio::test]
async fn test_connect_covers_every_host() {
    let fleet = Arc::new(MockFleet::new().unreachable(&["db-1"]));
    let config = config(&["web-1", "db-1", "web-2:2222"]).with_connect_on_construct(false);
    let mut client = client(&fleet, config).await;

    let results = client.connect(false).await.unwrap();

    assert_eq!(host_set(&results), expected(&["web-1", "db-1", "web-2"]));
    assert_eq!(
        results.get("web-1").and_then(HostOutcome::ok).unwrap().message,
        "Connected to host."
    );
    let record = results.get("db-1").and_then(HostOutcome::err).unwrap();
    assert_eq!(record.error, "Cannot connect to host. connection failed: connection refused");
    assert_eq!(client.bad_hosts().map(|(h, _)| h).collect::<Vec<_>>(), vec!["db-1"]);
    assert_eq!(client.live_hosts().collect::<Vec<_>>(), vec!["web-1", "web-2"]);
}

#[tokio::test]
async fn test_bad_host_is_never_retried_by_operations() {
    let fleet = Arc::new(MockFleet::new().unreachable(&["db-1"]));
    let client = client(&fleet, config(&["web-1", "db-1"])).await;
    let cached = client.bad_hosts().next().unwrap().1.clone();

    let run = client.run("uptime", None, None).await;
    let mkdir = client.mkdir("/srv/app").await;
    let rm = client.delete_file("/srv/app/old").await;
    let rmdir = client.delete_dir("/srv/app", true, None).await;
    let dir = tempfile::tempdir().unwrap();
    let put = client.put(dir.path(), "/srv", None, false).await.unwrap();

    assert_eq!(run.get("db-1").and_then(HostOutcome::err), Some(&cached));
    assert_eq!(mkdir.get("db-1").and_then(HostOutcome::err), Some(&cached));
    assert_eq!(rm.get("db-1").and_then(HostOutcome::err), Some(&cached));
    assert_eq!(rmdir.get("db-1").and_then(HostOutcome::err), Some(&cached));
    assert_eq!(put.get("db-1").and_then(HostOutcome::err), Some(&cached));

    assert_eq!(fleet.connects("db-1"), 1);
    assert!(fleet.calls_for("db-1").is_empty());
    assert_eq!(fleet.calls_for("web-1").len(), 5);
}

#[tokio::test]
async fn test_exit_status_flags() {
    let fleet = Arc::new(MockFleet::new());
    let client = client(&fleet, config(&["web-1"])).await;

    let ok = client.run("exit 0", None, None).await;
    let ok = ok.get("web-1").and_then(HostOutcome::ok).unwrap();
    assert_eq!((ok.return_code, ok.succeeded, ok.failed), (0, true, false));

    let bad = client.run("exit 7", None, None).await;
    let bad = bad.get("web-1").and_then(HostOutcome::ok).unwrap();
    assert_eq!((bad.return_code, bad.succeeded, bad.failed), (7, false, true));

    let results = client.run("exit 7", None, None).await;
    assert_eq!(result_status(&results, false), ResultStatus::Failed);
}

#[tokio::test]
async fn test_cwd_rewrites_command() {
    let fleet = Arc::new(MockFleet::new());
    let client = client(&fleet, config(&["web-1"])).await;

    let with_cwd = client.run("ls -la", None, Some("/tmp")).await;
    let spelled_out = client.run("cd /tmp && ls -la", None, None).await;
    client.run("ls -la", None, Some("")).await;

    assert_eq!(with_cwd, spelled_out);
    assert_eq!(
        fleet.calls_for("web-1"),
        vec!["run cd /tmp && ls -la", "run cd /tmp && ls -la", "run ls -la"]
    );
}

#[tokio::test]
async fn test_structured_output() {
    let fleet = Arc::new(MockFleet::new());
    let client = client(&fleet, config(&["web-1", "web-2"])).await;

    let results = client.run("facts", None, None).await;
    let record = results.get("web-2").and_then(HostOutcome::ok).unwrap();
    assert_eq!(
        record.stdout.as_structured(),
        Some(&json!({"host": "web-2", "cpus": 4}))
    );

    let results = client.run("hostname", None, None).await;
    let record = results.get("web-1").and_then(HostOutcome::ok).unwrap();
    assert_eq!(record.stdout.as_text(), Some("web-1\n"));
}

#[tokio::test]
async fn test_put_missing_local_path() {
    let fleet = Arc::new(MockFleet::new());
    let config = config(&["web-1", "web-2"]).with_connect_on_construct(false);
    let client = client(&fleet, config).await;

    let result = client
        .put("/definitely/not/here.tar", "/srv", None, false)
        .await;

    assert!(matches!(result, Err(CoreError::LocalPathNotFound(_))));
    assert_eq!(fleet.total_connects(), 0);
    assert!(fleet.calls().is_empty());
}

#[tokio::test]
async fn test_put_file_and_dir() {
    let fleet = Arc::new(MockFleet::new());
    let client = client(&fleet, config(&["web-1"])).await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("app.conf");
    std::fs::write(&file, "x=1").unwrap();

    let results = client.put(&file, "/etc/app.conf", Some(0o640), false).await.unwrap();
    assert!(matches!(
        results.get("web-1").and_then(HostOutcome::ok),
        Some(Upload::File(f)) if f.mode == Some(0o640)
    ));

    let results = client.put(dir.path(), "/srv", None, false).await.unwrap();
    assert!(matches!(
        results.get("web-1").and_then(HostOutcome::ok),
        Some(Upload::Dir(files)) if files.len() == 1
    ));
}

#[tokio::test]
async fn test_concurrency_bound() {
    let fleet = Arc::new(MockFleet::new().delay(Duration::from_millis(15)));
    let hosts: Vec<String> = (0..9).map(|i| format!("node-{i}")).collect();
    let names: Vec<&str> = hosts.iter().map(String::as_str).collect();
    let client = client(&fleet, config(&names).with_concurrency(2)).await;

    let results = client.run("sleep", None, None).await;

    assert_eq!(results.len(), 9);
    assert_eq!(results.error_hosts().count(), 0);
    assert_eq!(fleet.calls().len(), 9);
    assert!(fleet.peak() <= 2, "peak {} exceeded bound", fleet.peak());
}

#[tokio::test]
async fn test_error_record_shape_is_uniform() {
    let fleet = Arc::new(MockFleet::new().broken(&["web-1"]));
    let client = client(&fleet, config(&["web-1"])).await;
    let dir = tempfile::tempdir().unwrap();

    let values = vec![
        serde_json::to_value(client.run("uptime", None, None).await).unwrap(),
        serde_json::to_value(client.put(dir.path(), "/srv", None, false).await.unwrap()).unwrap(),
        serde_json::to_value(client.mkdir("/srv/x").await).unwrap(),
        serde_json::to_value(client.delete_file("/srv/x/y").await).unwrap(),
        serde_json::to_value(client.delete_dir("/srv/x", false, None).await).unwrap(),
    ];

    for value in values {
        let record = value["web-1"].as_object().unwrap();
        let keys: BTreeSet<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            BTreeSet::from(["error", "traceback", "failed", "succeeded", "return_code"])
        );
        assert_eq!(record["failed"], true);
        assert_eq!(record["succeeded"], false);
        assert_eq!(record["return_code"], 255);
    }
}

#[tokio::test]
async fn test_failure_messages() {
    let fleet = Arc::new(MockFleet::new().broken(&["web-1"]));
    let client = client(&fleet, config(&["web-1"])).await;

    let error = |results: serde_json::Value| results["web-1"]["error"].as_str().unwrap().to_string();

    assert_eq!(
        error(serde_json::to_value(client.run("uptime", None, Some("/srv")).await).unwrap()),
        "Failed executing command cd /srv && uptime on host web-1"
    );
    assert_eq!(
        error(serde_json::to_value(client.mkdir("/srv/x").await).unwrap()),
        "Failed \"mkdir /srv/x\" on host web-1."
    );
    assert_eq!(
        error(serde_json::to_value(client.delete_file("/srv/y").await).unwrap()),
        "Failed deleting file /srv/y on host web-1."
    );
    assert_eq!(
        error(serde_json::to_value(client.delete_dir("/srv", true, None).await).unwrap()),
        "Failed deleting dir /srv on host web-1."
    );

    let results = client.mkdir("/srv/x").await;
    let record = results.get("web-1").and_then(HostOutcome::err).unwrap();
    assert!(record.traceback.contains("channel closed by peer"));
}

#[tokio::test]
async fn test_results_never_omit_hosts() {
    let fleet = Arc::new(MockFleet::new().unreachable(&["b", "d"]).broken(&["c"]));
    let hosts = ["a", "b", "c", "d", "e"];
    let client = client(&fleet, config(&hosts).with_concurrency(3)).await;

    assert_eq!(host_set(&client.run("true", None, None).await), expected(&hosts));
    assert_eq!(host_set(&client.mkdir("/x").await), expected(&hosts));
    assert_eq!(host_set(&client.delete_file("/x/y").await), expected(&hosts));
    assert_eq!(host_set(&client.delete_dir("/x", true, None).await), expected(&hosts));

    let results = client.mkdir("/x").await;
    assert_eq!(results.error_hosts().collect::<Vec<_>>(), vec!["b", "c", "d"]);
}

#[tokio::test]
async fn test_raise_on_connect_error() {
    let fleet = Arc::new(MockFleet::new().unreachable(&["db-1"]));
    let result = ParallelClient::new(
        config(&["db-1"]).with_raise_on_connect_error(true),
        Arc::new(MockFactory(Arc::clone(&fleet))),
    )
    .await;

    match result {
        Err(CoreError::Connect { host, .. }) => assert_eq!(host, "db-1"),
        other => panic!("expected connect error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_raise_keeps_successful_sessions() {
    let fleet = Arc::new(MockFleet::new().unreachable(&["db-1"]));
    let config = config(&["web-1", "db-1"])
        .with_connect_on_construct(false)
        .with_concurrency(1);
    let mut client = client(&fleet, config).await;

    let result = client.connect(true).await;

    assert!(matches!(result, Err(CoreError::Connect { ref host, .. }) if host == "db-1"));
    // the raised failure is returned, not cached
    assert_eq!(client.bad_hosts().count(), 0);
    assert_eq!(client.live_hosts().collect::<Vec<_>>(), vec!["web-1"]);

    let results = client.run("uptime", None, None).await;
    assert!(results.get("web-1").unwrap().ok().is_some());
    assert_eq!(
        results.get("db-1").and_then(HostOutcome::err).unwrap().error,
        NOT_CONNECTED
    );
}

#[tokio::test]
async fn test_raise_aborts_remaining_attempts() {
    let fleet = Arc::new(MockFleet::new().unreachable(&["db-1"]));
    let config = config(&["db-1", "web-1", "web-2"])
        .with_connect_on_construct(false)
        .with_concurrency(1);
    let mut client = client(&fleet, config).await;

    let result = client.connect(true).await;

    assert!(matches!(result, Err(CoreError::Connect { ref host, .. }) if host == "db-1"));
    assert_eq!(fleet.connects("db-1"), 1);
    assert_eq!(fleet.connects("web-1"), 0);
    assert_eq!(fleet.connects("web-2"), 0);
    assert_eq!(client.live_hosts().count(), 0);

    let results = client.run("uptime", None, None).await;
    assert_eq!(results.len(), 3);
    assert_eq!(
        results.get("web-1").and_then(HostOutcome::err).unwrap().error,
        NOT_CONNECTED
    );
}

#[tokio::test]
async fn test_reconnect_clears_bad_host() {
    let fleet = Arc::new(MockFleet::new().unreachable(&["db-1"]));
    let mut client = client(&fleet, config(&["web-1", "db-1"])).await;
    assert_eq!(client.bad_hosts().count(), 1);

    fleet.make_reachable("db-1");
    let results = client.connect(false).await.unwrap();

    assert_eq!(results.error_hosts().count(), 0);
    assert_eq!(client.bad_hosts().count(), 0);
    assert_eq!(fleet.connects("db-1"), 2);
    // live session reused
    assert_eq!(fleet.connects("web-1"), 1);
}

#[tokio::test]
async fn test_close_releases_every_session() {
    let fleet = Arc::new(MockFleet::new().unreachable(&["db-1"]));
    let mut client = client(&fleet, config(&["web-1", "web-2", "db-1"])).await;

    client.close().await;

    assert_eq!(fleet.closed(), vec!["web-1", "web-2"]);
    assert_eq!(client.live_hosts().count(), 0);

    let results = client.run("uptime", None, None).await;
    assert_eq!(
        results.get("web-1").and_then(HostOutcome::err).unwrap().error,
        NOT_CONNECTED
    );
    assert!(results.get("db-1").unwrap().is_err());

    assert!(matches!(
        client.connect(false).await,
        Err(CoreError::ConfigError(_))
    ));
    assert!(client.bad_hosts().all(|(h, _)| h == "db-1"));
}

#[tokio::test]
async fn test_configuration_errors() {
    let fleet = Arc::new(MockFleet::new());
    let factory: Arc<dyn TransportFactory> = Arc::new(MockFactory(Arc::clone(&fleet)));

    let empty: [&str; 0] = [];
    assert!(matches!(
        ParallelClient::new(config(&empty), Arc::clone(&factory)).await,
        Err(CoreError::NoHosts)
    ));
    assert!(matches!(
        ParallelClient::new(config(&["a", "a:2222"]), Arc::clone(&factory)).await,
        Err(CoreError::DuplicateHost(h)) if h == "a"
    ));
    assert!(matches!(
        ParallelClient::new(config(&["a:notaport"]), Arc::clone(&factory)).await,
        Err(CoreError::InvalidHost { .. })
    ));
    assert!(matches!(
        ParallelClient::new(config(&["a"]).with_concurrency(0), Arc::clone(&factory)).await,
        Err(CoreError::ConfigError(_))
    ));
    assert_eq!(fleet.total_connects(), 0);
}

#[tokio::test]
async fn test_summaries() {
    let fleet = Arc::new(MockFleet::new().unreachable(&["db-1"]));
    let client = client(&fleet, config(&["web-1", "db-1:2200"])).await;

    let summaries = client.summaries();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].state, HostState::Connected);
    assert_eq!(summaries[0].transport, Some("mock"));
    assert_eq!(summaries[1].state, HostState::Bad);
    assert_eq!(summaries[1].port, 2200);
}
