//! 任务执行器接口定义
//!
//! 分发器只通过一个方法与外部协作者交互：`execute(ctx, task)`。克隆仓库、
//! 调用代码生成服务、提交与创建 PR、更新状态评论等都在执行器内部完成，
//! 分发器对这些细节一无所知。
//!
//! 执行器返回的任何错误都被统一视为“可重试”，受最大尝试次数约束。
//! 如果需要区分永久性错误，应在执行器内部处理并返回 `Ok(())`。
//!
//! ## 实现自定义执行器
//!
//! ```rust
//! use async_trait::async_trait;
//! use codebot_core::models::Task;
//! use codebot_core::traits::{ExecutionContext, TaskExecutor};
//! use codebot_core::DispatchResult;
//!
//! pub struct EchoExecutor;
//!
//! #[async_trait]
//! impl TaskExecutor for EchoExecutor {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn execute(&self, ctx: &ExecutionContext, task: &Task) -> DispatchResult<()> {
//!         if ctx.is_cancelled() {
//!             return Ok(());
//!         }
//!         println!("处理 {} (第{}次)", task.key(), task.attempt);
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{models::Task, DispatchResult};

/// 任务执行上下文
///
/// 由Worker创建并传入执行器。取消令牌只会在关闭等待本身被取消或超时时触发，
/// 执行器应在长耗时步骤之间检查它并尽快返回。
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    worker_index: usize,
    cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(worker_index: usize, cancel: CancellationToken) -> Self {
        Self {
            worker_index,
            cancel,
        }
    }

    /// 不会被取消的上下文，便于在分发器之外直接调用执行器
    pub fn detached() -> Self {
        Self::new(0, CancellationToken::new())
    }

    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 等待取消信号
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// 任务执行器
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// 执行器名称，用于日志
    fn name(&self) -> &str;

    /// 执行一次任务
    async fn execute(&self, ctx: &ExecutionContext, task: &Task) -> DispatchResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execution_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = ExecutionContext::new(2, token.clone());

        assert_eq!(ctx.worker_index(), 2);
        assert!(!ctx.is_cancelled());

        token.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_detached_context_is_not_cancelled() {
        assert!(!ExecutionContext::detached().is_cancelled());
    }
}
