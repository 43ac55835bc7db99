//! End-to-end tests: JSON-line intake feeding a dispatcher that runs a real
//! child process per task.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use codebot::executor::CommandExecutor;
use codebot::intake::feed_jobs;
use codebot_core::DispatcherConfig;
use codebot_dispatcher::Dispatcher;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn dispatcher_with_script(script: &str, config: DispatcherConfig) -> Dispatcher {
    let executor = CommandExecutor::new(
        "sh",
        vec!["-c".to_string(), script.to_string()],
        Duration::from_secs(10),
    );
    Dispatcher::new(Arc::new(executor), config)
}

fn read_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jobs_run_through_command_executor() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("runs.log");
    let script = format!(
        r#"echo "$CODEBOT_KEY $CODEBOT_ATTEMPT $CODEBOT_REQUESTER" >> '{}'"#,
        log.display()
    );
    let dispatcher = dispatcher_with_script(
        &script,
        DispatcherConfig {
            workers: 2,
            queue_size: 8,
            max_attempts: 1,
            ..Default::default()
        },
    );

    let input = concat!(
        r#"{"repo":"owner/api","number":1,"requester":"alice"}"#,
        "\n",
        r#"{"repo":"owner/web","number":2,"requester":"bob"}"#,
        "\n",
    );
    let summary = feed_jobs(
        input.as_bytes(),
        &dispatcher,
        &CancellationToken::new(),
        Duration::from_millis(10),
    )
    .await
    .unwrap();
    assert_eq!(summary.accepted, 2);

    dispatcher
        .shutdown_timeout(Duration::from_secs(10))
        .await
        .unwrap();

    let mut lines = read_lines(&log);
    lines.sort();
    assert_eq!(lines, vec!["owner/api#1 1 alice", "owner/web#2 1 bob"]);
    assert_eq!(dispatcher.stats().succeeded, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_command_is_retried_with_backoff() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("attempts.log");
    // 第一次失败，第二次成功
    let script = format!(
        r#"echo "$CODEBOT_ATTEMPT" >> '{}'; test "$CODEBOT_ATTEMPT" -ge 2"#,
        log.display()
    );
    let dispatcher = dispatcher_with_script(
        &script,
        DispatcherConfig {
            workers: 1,
            queue_size: 4,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(20),
            ..Default::default()
        },
    );

    dispatcher
        .enqueue(codebot_core::Task::new("owner/repo", 3))
        .unwrap();

    let succeeded = codebot_testing_utils::wait_until(Duration::from_secs(10), || {
        dispatcher.stats().succeeded == 1
    })
    .await;
    assert!(succeeded);

    dispatcher
        .shutdown_timeout(Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(read_lines(&log), vec!["1", "2"]);
    let stats = dispatcher.stats();
    assert_eq!(stats.failed_attempts, 1);
    assert_eq!(stats.retries_scheduled, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_issue_commands_do_not_overlap() {
    let dir = TempDir::new().unwrap();
    let lock = dir.path().join("issue.lock");
    let log = dir.path().join("overlap.log");
    // 同一issue的两个执行如果重叠，mkdir会失败并记录
    let script = format!(
        r#"if mkdir '{lock}' 2>/dev/null; then sleep 0.05; rmdir '{lock}'; else echo overlap >> '{log}'; fi"#,
        lock = lock.display(),
        log = log.display()
    );
    let dispatcher = dispatcher_with_script(
        &script,
        DispatcherConfig {
            workers: 4,
            queue_size: 8,
            max_attempts: 1,
            ..Default::default()
        },
    );

    for i in 0..4 {
        dispatcher
            .enqueue(codebot_core::Task::new("owner/repo", 42).with_prompt(format!("run {i}")))
            .unwrap();
    }
    dispatcher
        .shutdown_timeout(Duration::from_secs(10))
        .await
        .unwrap();

    assert!(read_lines(&log).is_empty());
    assert_eq!(dispatcher.stats().succeeded, 4);
}
