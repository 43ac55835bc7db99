use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 分发器计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// 成功入队的任务数
    pub admitted: u64,
    /// 因队列已满被拒绝的入队请求
    pub rejected_full: u64,
    /// 因分发器关闭被拒绝的入队请求
    pub rejected_closed: u64,
    /// 执行成功的任务数
    pub succeeded: u64,
    /// 失败的执行次数（每次尝试计一次）
    pub failed_attempts: u64,
    /// 已安排的重试次数
    pub retries_scheduled: u64,
    /// 用尽尝试次数后被丢弃的任务数
    pub dropped_exhausted: u64,
    /// 因关闭而放弃的重试
    pub retries_abandoned: u64,
    /// 因队列已满未能重新入队的重试
    pub retries_rejected: u64,
    /// 因执行上下文被取消而未执行的任务
    pub cancelled: u64,
    /// 当前排队数
    pub queued: usize,
}

impl DispatcherStats {
    /// 已经有最终结果的任务数
    pub fn settled(&self) -> u64 {
        self.succeeded
            + self.dropped_exhausted
            + self.retries_abandoned
            + self.retries_rejected
            + self.cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchEvent {
    Admitted,
    RejectedFull,
    RejectedClosed,
    Succeeded,
    FailedAttempt,
    RetryScheduled,
    DroppedExhausted,
    RetryAbandoned,
    RetryRejected,
    Cancelled,
}

impl DispatchEvent {
    fn as_str(self) -> &'static str {
        match self {
            DispatchEvent::Admitted => "admitted",
            DispatchEvent::RejectedFull => "rejected_full",
            DispatchEvent::RejectedClosed => "rejected_closed",
            DispatchEvent::Succeeded => "succeeded",
            DispatchEvent::FailedAttempt => "failed_attempt",
            DispatchEvent::RetryScheduled => "retry_scheduled",
            DispatchEvent::DroppedExhausted => "dropped_exhausted",
            DispatchEvent::RetryAbandoned => "retry_abandoned",
            DispatchEvent::RetryRejected => "retry_rejected",
            DispatchEvent::Cancelled => "cancelled",
        }
    }
}

/// 分发器内部计数器，同时上报到 `metrics` 门面
#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    admitted: AtomicU64,
    rejected_full: AtomicU64,
    rejected_closed: AtomicU64,
    succeeded: AtomicU64,
    failed_attempts: AtomicU64,
    retries_scheduled: AtomicU64,
    dropped_exhausted: AtomicU64,
    retries_abandoned: AtomicU64,
    retries_rejected: AtomicU64,
    cancelled: AtomicU64,
}

impl DispatchCounters {
    pub(crate) fn record(&self, event: DispatchEvent) {
        let counter = match event {
            DispatchEvent::Admitted => &self.admitted,
            DispatchEvent::RejectedFull => &self.rejected_full,
            DispatchEvent::RejectedClosed => &self.rejected_closed,
            DispatchEvent::Succeeded => &self.succeeded,
            DispatchEvent::FailedAttempt => &self.failed_attempts,
            DispatchEvent::RetryScheduled => &self.retries_scheduled,
            DispatchEvent::DroppedExhausted => &self.dropped_exhausted,
            DispatchEvent::RetryAbandoned => &self.retries_abandoned,
            DispatchEvent::RetryRejected => &self.retries_rejected,
            DispatchEvent::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("codebot_dispatch_events_total", "event" => event.as_str()).increment(1);
    }

    pub(crate) fn snapshot(&self, queued: usize) -> DispatcherStats {
        DispatcherStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_closed: self.rejected_closed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            dropped_exhausted: self.dropped_exhausted.load(Ordering::Relaxed),
            retries_abandoned: self.retries_abandoned.load(Ordering::Relaxed),
            retries_rejected: self.retries_rejected.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            queued,
        }
    }
}
