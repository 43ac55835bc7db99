use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codebot_core::{
    normalize_config, DispatchError, DispatchResult, DispatcherConfig, QueueItem, Task,
    TaskExecutor,
};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::key_lock::KeyLockManager;
use crate::queue::{Admission, TaskQueue};
use crate::retry_service::{BackoffPolicy, RetryScheduler};
use crate::stats::{DispatchCounters, DispatchEvent, DispatcherStats};
use crate::worker::Worker;

/// 分发器生命周期状态
///
/// `Open → Draining → Closed`，不会回到 `Open`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// 接受新任务
    Open,
    /// 已拒绝新任务，Worker继续消费已排队的任务，新的重试不再入队
    Draining,
    /// 所有Worker已退出，或关闭等待被取消
    Closed,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DispatcherState::Open,
            1 => DispatcherState::Draining,
            _ => DispatcherState::Closed,
        }
    }
}

/// 任务分发器
///
/// 组合有界队列、键锁管理器、Worker池和重试调度器。每个被触发的事件对应一个
/// 任务；总并发受Worker数量约束，同一个 `repo#number` 的任务不会同时执行，
/// 执行失败按指数退避重新入队直到用尽尝试次数。
///
/// 必须在 Tokio 运行时中创建。未调用 [`Dispatcher::shutdown`] 就被丢弃时，
/// Worker任务会被中止。
pub struct Dispatcher {
    config: DispatcherConfig,
    queue: Arc<TaskQueue>,
    key_locks: Arc<KeyLockManager>,
    counters: Arc<DispatchCounters>,
    retry: RetryScheduler,
    /// 关闭开始时触发，唤醒待执行的重试定时器
    closing: CancellationToken,
    /// Worker范围的执行上下文，只在关闭等待被取消时触发
    cancel: CancellationToken,
    workers: Mutex<JoinSet<()>>,
    live_workers: Arc<AtomicUsize>,
    state: AtomicU8,
}

impl Dispatcher {
    /// 归一化配置并启动Worker
    pub fn new(executor: Arc<dyn TaskExecutor>, config: DispatcherConfig) -> Self {
        let config = normalize_config(config);
        let queue = Arc::new(TaskQueue::new(config.queue_size));
        let key_locks = Arc::new(KeyLockManager::new());
        let counters = Arc::new(DispatchCounters::default());
        let closing = CancellationToken::new();
        let cancel = CancellationToken::new();
        let retry = RetryScheduler::new(
            &config,
            Arc::clone(&queue),
            closing.clone(),
            Arc::clone(&counters),
        );

        let live_workers = Arc::new(AtomicUsize::new(config.workers));
        let mut workers = JoinSet::new();
        for index in 0..config.workers {
            let worker = Worker {
                index,
                queue: Arc::clone(&queue),
                key_locks: Arc::clone(&key_locks),
                executor: Arc::clone(&executor),
                retry: retry.clone(),
                counters: Arc::clone(&counters),
                cancel: cancel.clone(),
                live: Arc::clone(&live_workers),
            };
            workers.spawn(worker.run());
        }

        info!(
            "任务分发器已启动: executor={}, workers={}, queue_size={}, max_attempts={}, initial_backoff={:?}, max_backoff={:?}, multiplier={}",
            executor.name(),
            config.workers,
            config.queue_size,
            config.max_attempts,
            config.initial_backoff,
            config.max_backoff,
            config.backoff_multiplier
        );

        Self {
            config,
            queue,
            key_locks,
            counters,
            retry,
            closing,
            cancel,
            workers: Mutex::new(workers),
            live_workers,
            state: AtomicU8::new(DispatcherState::Open as u8),
        }
    }

    /// 提交任务
    ///
    /// 非阻塞：队列已满返回 [`DispatchError::QueueFull`]，调用方应提示稍后重试；
    /// 关闭开始后返回 [`DispatchError::QueueClosed`]。成功返回后任务归分发器所有。
    pub fn enqueue(&self, task: Task) -> DispatchResult<()> {
        let key = task.key();

        match self.queue.try_admit(QueueItem::first(task)) {
            Admission::Admitted => {
                debug!("任务已入队: key={}", key);
                self.counters.record(DispatchEvent::Admitted);
                Ok(())
            }
            Admission::Full(_) => {
                warn!(
                    "任务队列已满({})，拒绝任务: key={}",
                    self.queue.capacity(),
                    key
                );
                self.counters.record(DispatchEvent::RejectedFull);
                Err(DispatchError::QueueFull)
            }
            Admission::Closed(_) => {
                debug!("分发器已关闭，拒绝任务: key={}", key);
                self.counters.record(DispatchEvent::RejectedClosed);
                Err(DispatchError::QueueClosed)
            }
        }
    }

    /// 优雅关闭
    ///
    /// 立即拒绝新任务与待执行的重试，然后等待Worker取完已排队的任务并退出。
    /// `ctx` 被取消时停止等待：Worker的执行上下文随之取消，不再取新任务，
    /// 返回 [`DispatchError::ShutdownInterrupted`]。可重复调用。
    pub async fn shutdown(&self, ctx: &CancellationToken) -> DispatchResult<()> {
        // 先进入 Draining 再关闭队列，保证观察到 QueueClosed 时状态已不是 Open
        if self.transition(DispatcherState::Open, DispatcherState::Draining) {
            self.queue.close();
            info!("开始关闭任务分发器，排队任务数: {}", self.queue.len());
            self.closing.cancel();
        }

        // 并发的另一次关闭可能正持有Worker集合，等待锁同样受 ctx 约束
        let mut workers = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(self.interrupt()),
            workers = self.workers.lock() => workers,
        };
        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(self.interrupt()),
                joined = workers.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!("Worker异常退出: {}", e),
                    None => break,
                },
            }
        }

        self.set_state(DispatcherState::Closed);
        info!("任务分发器已关闭: {:?}", self.stats());
        Ok(())
    }

    /// 关闭等待被取消：取消Worker的执行上下文，未被取走的排队任务随之丢弃
    fn interrupt(&self) -> DispatchError {
        let in_flight = self.live_workers.load(Ordering::SeqCst);
        warn!(
            "关闭等待被取消，取消 {} 个Worker的执行上下文，丢弃 {} 个排队任务",
            in_flight,
            self.queue.len()
        );
        self.cancel.cancel();
        self.set_state(DispatcherState::Closed);
        DispatchError::ShutdownInterrupted { in_flight }
    }

    /// 带超时的优雅关闭
    pub async fn shutdown_timeout(&self, grace: Duration) -> DispatchResult<()> {
        let ctx = CancellationToken::new();
        let timer = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                ctx.cancel();
            })
        };

        let result = self.shutdown(&ctx).await;
        timer.abort();
        result
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: DispatcherState, to: DispatcherState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot(self.queue.len())
    }

    /// 归一化之后的配置
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn backoff_policy(&self) -> &BackoffPolicy {
        self.retry.policy()
    }

    /// 当前有持有者或等待者的键数量
    pub fn active_keys(&self) -> usize {
        self.key_locks.active_keys()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("queued", &self.queue.len())
            .finish()
    }
}
