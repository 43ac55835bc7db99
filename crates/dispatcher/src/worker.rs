use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use codebot_core::{DispatchError, ExecutionContext, QueueItem, TaskExecutor};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::key_lock::KeyLockManager;
use crate::queue::TaskQueue;
use crate::retry_service::RetryScheduler;
use crate::stats::{DispatchCounters, DispatchEvent};

/// 单个Worker持有的共享资源
pub(crate) struct Worker {
    pub(crate) index: usize,
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) key_locks: Arc<KeyLockManager>,
    pub(crate) executor: Arc<dyn TaskExecutor>,
    pub(crate) retry: RetryScheduler,
    pub(crate) counters: Arc<DispatchCounters>,
    pub(crate) cancel: CancellationToken,
    /// 仍在运行的Worker数量，退出时递减
    pub(crate) live: Arc<AtomicUsize>,
}

impl Worker {
    /// 消费循环：队列关闭且取空，或执行上下文被取消时退出
    pub(crate) async fn run(self) {
        debug!("Worker {} 启动", self.index);

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Worker {} 收到取消信号", self.index);
                    break;
                }
                item = self.queue.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            self.process(item).await;
        }

        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!("Worker {} 退出", self.index);
    }

    async fn process(&self, mut item: QueueItem) {
        let key = item.key();

        // 同键任务在这里排队，其余Worker继续消费其他键
        let guard = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!("执行上下文已取消，放弃任务 {} 的第 {} 次尝试", key, item.attempt);
                self.counters.record(DispatchEvent::Cancelled);
                return;
            }
            guard = self.key_locks.acquire(&key) => guard,
        };

        let ctx = ExecutionContext::new(self.index, self.cancel.clone());
        let attempt = item.attempt;
        let task = item.stamp_attempt();
        info!(
            "开始执行任务: key={}, attempt={}, task_id={}, worker={}",
            key, attempt, task.id, self.index
        );

        let started = Instant::now();
        let result = AssertUnwindSafe(self.executor.execute(&ctx, task))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(DispatchError::ExecutorPanicked(panic_message(panic))));
        let elapsed = started.elapsed();

        guard.release();

        match result {
            Ok(()) => {
                info!(
                    "任务执行成功: key={}, attempt={}, duration={}ms",
                    key,
                    attempt,
                    elapsed.as_millis()
                );
                self.counters.record(DispatchEvent::Succeeded);
            }
            Err(e) => {
                warn!(
                    "任务执行失败: key={}, attempt={}, duration={}ms, error={}",
                    key,
                    attempt,
                    elapsed.as_millis(),
                    e
                );
                self.counters.record(DispatchEvent::FailedAttempt);
                self.retry.handle_retry(item, &e);
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(42_u8)), "未知panic");
    }
}
