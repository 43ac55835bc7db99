use thiserror::Error;

/// 分发器错误类型定义
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("任务队列已满")]
    QueueFull,

    #[error("任务队列已关闭")]
    QueueClosed,

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("任务执行器崩溃: {0}")]
    ExecutorPanicked(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("关闭等待被取消，仍有 {in_flight} 个Worker未退出")]
    ShutdownInterrupted { in_flight: usize },

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::TaskExecution(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 入队阶段同步返回的错误
    pub fn is_admission_error(&self) -> bool {
        matches!(self, DispatchError::QueueFull | DispatchError::QueueClosed)
    }

    /// 调用方稍后重新提交即可能成功
    pub fn is_retryable_admission(&self) -> bool {
        matches!(self, DispatchError::QueueFull)
    }

    pub fn user_message(&self) -> &str {
        match self {
            DispatchError::QueueFull => "任务繁忙，请稍后重试",
            DispatchError::QueueClosed => "服务正在关闭，暂不接受新任务",
            DispatchError::Configuration(_) => "分发器配置有误",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Internal(format!("序列化错误: {err}"))
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        DispatchError::Internal(err.to_string())
    }
}
