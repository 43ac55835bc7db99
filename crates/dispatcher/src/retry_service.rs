use std::sync::Arc;
use std::time::Duration;

use codebot_core::{DispatchError, DispatcherConfig, QueueItem};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::queue::{Admission, TaskQueue};
use crate::stats::{DispatchCounters, DispatchEvent};

/// 指数退避策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// 第一次重试前的等待时间
    pub initial: Duration,
    /// 退避上限
    pub max: Duration,
    /// 指数退避倍数
    pub multiplier: f64,
}

impl BackoffPolicy {
    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self {
            initial: config.initial_backoff,
            max: config.max_backoff,
            multiplier: config.backoff_multiplier,
        }
    }

    /// 第 `attempt` 次执行失败后的等待时间
    ///
    /// `initial * multiplier^(attempt-1)`，不超过 `max`。`attempt` 为 0 时按 1 处理。
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial.min(self.max);
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential = self.initial.as_secs_f64() * self.multiplier.powi(exponent);

        // 先在浮点域封顶，避免溢出的无穷大进入 Duration
        let capped = exponential.min(self.max.as_secs_f64());
        if capped.is_nan() || capped <= 0.0 {
            return self.initial.min(self.max);
        }
        Duration::from_secs_f64(capped)
    }
}

/// 重试调度结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 已安排在 `delay` 之后以 `next_attempt` 重新入队
    Scheduled { next_attempt: u32, delay: Duration },
    /// 尝试次数用尽，任务被永久丢弃
    Exhausted,
}

/// 重新入队结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAdmission {
    Admitted,
    /// 分发器已开始关闭，任务被静默放弃
    Abandoned,
    /// 队列已满，任务被丢弃并记录错误
    Rejected,
}

/// 重试调度器
///
/// 对所有执行错误一视同仁：未达最大尝试次数就按退避时间重新走一遍有界队列，
/// 而不是在Worker内部循环。重新入队和首次入队共用同一个关闭检查，关闭总是
/// 优先于待执行的重试。
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: BackoffPolicy,
    max_attempts: u32,
    queue: Arc<TaskQueue>,
    closing: CancellationToken,
    counters: Arc<DispatchCounters>,
}

impl RetryScheduler {
    pub(crate) fn new(
        config: &DispatcherConfig,
        queue: Arc<TaskQueue>,
        closing: CancellationToken,
        counters: Arc<DispatchCounters>,
    ) -> Self {
        Self {
            policy: BackoffPolicy::from_config(config),
            max_attempts: config.max_attempts,
            queue,
            closing,
            counters,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        self.policy.delay_for(attempt)
    }

    /// 处理一次执行失败，决定是否重试
    ///
    /// 需要在 Tokio 运行时中调用：重试通过一个延时任务重新入队。
    pub fn handle_retry(&self, mut item: QueueItem, err: &DispatchError) -> RetryDecision {
        let key = item.key();

        if item.attempt >= self.max_attempts {
            error!(
                "任务 {} 已达到最大尝试次数 {}，不再重试，最后错误: {}",
                key, self.max_attempts, err
            );
            self.counters.record(DispatchEvent::DroppedExhausted);
            return RetryDecision::Exhausted;
        }

        let delay = self.backoff_duration(item.attempt);
        item.attempt += 1;
        let next_attempt = item.attempt;

        info!(
            "任务 {} 执行失败，{}ms 后进行第 {} 次尝试: {}",
            key,
            delay.as_millis(),
            next_attempt,
            err
        );
        self.counters.record(DispatchEvent::RetryScheduled);

        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    scheduler.enqueue_retry(item);
                }
                _ = scheduler.closing.cancelled() => {
                    debug!("分发器正在关闭，放弃任务 {} 的第 {} 次尝试", item.key(), item.attempt);
                    scheduler.counters.record(DispatchEvent::RetryAbandoned);
                }
            }
        });

        RetryDecision::Scheduled {
            next_attempt,
            delay,
        }
    }

    /// 重新入队
    pub fn enqueue_retry(&self, item: QueueItem) -> RetryAdmission {
        match self.queue.try_admit(item) {
            Admission::Admitted => {
                debug!("重试任务已重新入队");
                RetryAdmission::Admitted
            }
            Admission::Closed(item) => {
                debug!(
                    "分发器已关闭，放弃任务 {} 的第 {} 次尝试",
                    item.key(),
                    item.attempt
                );
                self.counters.record(DispatchEvent::RetryAbandoned);
                RetryAdmission::Abandoned
            }
            Admission::Full(item) => {
                error!(
                    "任务队列已满，任务 {} 的第 {} 次尝试无法重新入队，任务被丢弃",
                    item.key(),
                    item.attempt
                );
                self.counters.record(DispatchEvent::RetryRejected);
                RetryAdmission::Rejected
            }
        }
    }
}
