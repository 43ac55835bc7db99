//! 任务输入
//!
//! 每行一个JSON对象，字段与 [`Task`] 一致，至少需要 `repo` 和 `number`。
//! 空行和以 `#` 开头的行被忽略。

use std::time::Duration;

use anyhow::{Context, Result};
use codebot_core::{DispatchError, Task};
use codebot_dispatcher::Dispatcher;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 队列已满时再次提交前的等待时间
pub const DEFAULT_FULL_QUEUE_PAUSE: Duration = Duration::from_millis(500);

/// 一次输入过程的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntakeSummary {
    pub accepted: u64,
    pub invalid: u64,
    /// 因队列已满而等待的次数
    pub full_waits: u64,
    /// 分发器已关闭，剩余输入未读取
    pub closed: bool,
}

/// 解析一行输入，空行与注释返回 `None`
pub fn parse_job_line(line: &str) -> Result<Option<Task>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut task: Task = serde_json::from_str(line).context("解析任务失败")?;
    if task.repo.trim().is_empty() {
        return Err(anyhow::anyhow!("任务缺少 repo"));
    }
    // 尝试次数由分发器管理
    task.attempt = 1;
    Ok(Some(task))
}

/// 从 `reader` 逐行读取任务并提交给分发器
///
/// 读到EOF、`stop` 被取消或分发器返回 [`DispatchError::QueueClosed`] 时结束。
/// 队列已满时等待 `full_pause` 后重新提交同一个任务。
pub async fn feed_jobs<R>(
    reader: R,
    dispatcher: &Dispatcher,
    stop: &CancellationToken,
    full_pause: Duration,
) -> Result<IntakeSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IntakeSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    'intake: loop {
        let line = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                debug!("收到停止信号，停止读取任务");
                break;
            }
            line = lines.next_line() => line.context("读取任务输入失败")?,
        };
        let Some(line) = line else {
            debug!("任务输入已结束");
            break;
        };
        line_no += 1;

        let task = match parse_job_line(&line) {
            Ok(Some(task)) => task,
            Ok(None) => continue,
            Err(e) => {
                warn!("跳过第 {} 行无效任务: {:#}", line_no, e);
                summary.invalid += 1;
                continue;
            }
        };

        loop {
            match dispatcher.enqueue(task.clone()) {
                Ok(()) => {
                    summary.accepted += 1;
                    break;
                }
                Err(DispatchError::QueueFull) => {
                    summary.full_waits += 1;
                    debug!("任务队列已满，{}ms 后重新提交 {}", full_pause.as_millis(), task.key());
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => break 'intake,
                        _ = tokio::time::sleep(full_pause) => {}
                    }
                }
                Err(DispatchError::QueueClosed) => {
                    info!("分发器已关闭，停止读取任务");
                    summary.closed = true;
                    break 'intake;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(summary)
}
