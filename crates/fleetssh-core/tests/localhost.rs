//! End-to-end against `localhost` through the default factory

use std::sync::Arc;

use serde_json::json;

use fleetssh_core::*;

async fn local_client() -> ParallelClient {
    ParallelClient::new(
        ClientConfig::new(["localhost"]),
        Arc::new(DefaultTransportFactory),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_run_on_localhost() {
    let client = local_client().await;

    let results = client.run("echo '{\"ok\": true}'", None, None).await;
    let record = results.get("localhost").and_then(HostOutcome::ok).unwrap();
    assert!(record.succeeded);
    assert_eq!(record.stdout.as_structured(), Some(&json!({"ok": true})));

    let results = client.run("echo oops >&2; exit 3", None, None).await;
    let record = results.get("localhost").and_then(HostOutcome::ok).unwrap();
    assert_eq!(record.return_code, 3);
    assert_eq!(record.stderr.as_text(), Some("oops\n"));
}

#[tokio::test]
async fn test_run_with_cwd_on_localhost() {
    let dir = tempfile::tempdir().unwrap();
    let client = local_client().await;

    let cwd = dir.path().to_str().unwrap();
    let results = client.run("pwd", None, Some(cwd)).await;
    let record = results.get("localhost").and_then(HostOutcome::ok).unwrap();

    let printed = record.stdout.as_text().unwrap().trim().to_string();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(std::path::Path::new(&printed).canonicalize().unwrap(), expected);
}

#[tokio::test]
async fn test_file_operations_on_localhost() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let file = src.path().join("motd");
    std::fs::write(&file, "hello").unwrap();

    let mut client = local_client().await;

    let target_dir = dst.path().join("etc");
    let target_dir = target_dir.to_str().unwrap();
    let results = client.mkdir(target_dir).await;
    assert!(matches!(results.get("localhost"), Some(HostOutcome::Ok(()))));

    let target = format!("{target_dir}/motd");
    let results = client.put(&file, &target, Some(0o600), false).await.unwrap();
    assert!(matches!(
        results.get("localhost").and_then(HostOutcome::ok),
        Some(Upload::File(f)) if f.size == Some(5) && f.mode == Some(0o600)
    ));
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");

    let results = client.delete_file(&target).await;
    assert_eq!(results.get("localhost").and_then(HostOutcome::ok), Some(&true));

    let results = client.delete_dir(target_dir, false, None).await;
    assert_eq!(results.get("localhost").and_then(HostOutcome::ok), Some(&true));
    assert!(!dst.path().join("etc").exists());

    client.close().await;
}

#[tokio::test]
async fn test_failed_operation_on_localhost() {
    let client = local_client().await;

    let results = client.delete_file("/nonexistent/fleetssh/file").await;
    let record = results.get("localhost").and_then(HostOutcome::err).unwrap();
    assert_eq!(
        record.error,
        "Failed deleting file /nonexistent/fleetssh/file on host localhost."
    );
    assert!(!record.traceback.is_empty());
}
