//! 任务分发器
//!
//! 每个被触发的事件对应一个任务，分发器负责：
//! - 用有界队列限制积压并显式返回背压错误
//! - 用固定数量的Worker限制总并发
//! - 用惰性创建、引用计数的键锁保证同一 `repo#number` 的任务串行执行
//! - 按指数退避重试失败的任务，直到用尽尝试次数
//! - 支持不丢失、不重复的优雅关闭

pub mod dispatcher;
pub mod key_lock;
pub mod queue;
pub mod retry_service;
pub mod stats;
mod worker;

pub use codebot_core::{
    normalize_config, DispatchError, DispatchResult, DispatcherConfig, ExecutionContext, Task,
    TaskExecutor,
};
pub use dispatcher::{Dispatcher, DispatcherState};
pub use key_lock::{KeyLockGuard, KeyLockManager};
pub use queue::{Admission, TaskQueue};
pub use retry_service::{BackoffPolicy, RetryAdmission, RetryDecision, RetryScheduler};
pub use stats::DispatcherStats;
