//! 代码生成机器人的核心类型
//!
//! 分发器与外部协作者共享的错误类型、任务模型、执行器接口和配置模型。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::{normalize_config, AppConfig, DispatcherConfig};
pub use errors::*;
pub use models::{QueueItem, Task};
pub use traits::{ExecutionContext, TaskExecutor};
