use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use codebot_core::config::ExecutorSettings;
use codebot_core::{DispatchError, DispatchResult, ExecutionContext, Task, TaskExecutor};
use tokio::process::Command;
use tracing::{info, warn};

/// stderr 截断长度，避免把整段构建日志塞进错误信息
const MAX_STDERR_CHARS: usize = 2000;

/// 外部命令执行器
///
/// 每次执行启动一个子进程，任务字段通过 `CODEBOT_*` 环境变量传入。
/// 非零退出码、超时和执行上下文取消都会作为执行错误返回，子进程在后两种
/// 情况下被终止。
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: String,
    args: Vec<String>,
    working_dir: Option<String>,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
            timeout,
        }
    }

    pub fn from_settings(settings: &ExecutorSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
            working_dir: settings.working_dir.clone(),
            timeout: settings.timeout(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn build_command(&self, task: &Task) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .env("CODEBOT_REPO", &task.repo)
            .env("CODEBOT_NUMBER", task.number.to_string())
            .env("CODEBOT_KEY", task.key())
            .env("CODEBOT_BRANCH", &task.branch)
            .env("CODEBOT_TITLE", &task.title)
            .env("CODEBOT_PROMPT", &task.prompt)
            .env("CODEBOT_REQUESTER", &task.requester)
            .env("CODEBOT_ATTEMPT", task.attempt.to_string())
            .env("CODEBOT_TASK_ID", task.id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(&self, ctx: &ExecutionContext, task: &Task) -> DispatchResult<()> {
        let key = task.key();
        let start_time = Instant::now();

        let child = self
            .build_command(task)
            .spawn()
            .map_err(|e| DispatchError::execution(format!("启动命令 {} 失败: {e}", self.command)))?;

        // 丢弃 wait_with_output 的future会触发 kill_on_drop
        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| DispatchError::execution(format!("等待进程结束失败: {e}")))?,
            _ = tokio::time::sleep(self.timeout) => {
                warn!("任务 {} 执行超时({:?})，终止子进程", key, self.timeout);
                return Err(DispatchError::execution(format!(
                    "执行超时: {}s",
                    self.timeout.as_secs()
                )));
            }
            _ = ctx.cancelled() => {
                warn!("任务 {} 的执行上下文已取消，终止子进程", key);
                return Err(DispatchError::execution("执行被取消"));
            }
        };

        let duration = start_time.elapsed();
        if output.status.success() {
            info!(
                "命令执行完成: key={}, attempt={}, duration={}ms",
                key,
                task.attempt,
                duration.as_millis()
            );
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("命令执行失败，退出码: {:?}", output.status.code())
        } else {
            format!(
                "命令执行失败，退出码: {:?}: {}",
                output.status.code(),
                truncate(stderr, MAX_STDERR_CHARS)
            )
        };
        Err(DispatchError::execution(message))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn sh(script: &str, timeout: Duration) -> CommandExecutor {
        CommandExecutor::new("sh", vec!["-c".to_string(), script.to_string()], timeout)
    }

    #[tokio::test]
    async fn test_command_success_sees_task_env() {
        let executor = sh(
            r#"test "$CODEBOT_KEY" = "owner/repo#7" && test "$CODEBOT_ATTEMPT" = "1" && test "$CODEBOT_PROMPT" = "fix it""#,
            Duration::from_secs(5),
        );
        let task = Task::new("owner/repo", 7).with_prompt("fix it");

        let result = executor.execute(&ExecutionContext::detached(), &task).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn test_command_failure_carries_stderr() {
        let executor = sh("echo 'no such branch' >&2; exit 3", Duration::from_secs(5));
        let task = Task::new("owner/repo", 1);

        let err = executor
            .execute(&ExecutionContext::detached(), &task)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, DispatchError::TaskExecution(_)));
        assert!(message.contains("no such branch"), "{message}");
        assert!(message.contains('3'), "{message}");
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let executor = sh("sleep 5", Duration::from_millis(100));
        let started = Instant::now();

        let err = executor
            .execute(&ExecutionContext::detached(), &Task::new("owner/repo", 1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("超时"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_command_cancelled_by_context() {
        let executor = sh("sleep 5", Duration::from_secs(30));
        let token = CancellationToken::new();
        let ctx = ExecutionContext::new(0, token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let started = Instant::now();
        let err = executor
            .execute(&ctx, &Task::new("owner/repo", 1))
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(err.to_string().contains("取消"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_binary_is_execution_error() {
        let executor = CommandExecutor::new(
            "/nonexistent/codebot-agent",
            Vec::new(),
            Duration::from_secs(1),
        );
        let err = executor
            .execute(&ExecutionContext::detached(), &Task::new("owner/repo", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TaskExecution(_)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("分发器错误", 2), "分发");
        assert_eq!(truncate("short", 100), "short");
    }
}
