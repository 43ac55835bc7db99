//! 配置管理
//!
//! - **dispatcher**: 分发器运行时配置及零值归一化
//! - **models**: 配置文件数据模型，通过 `config` crate 从 TOML 文件和
//!   `CODEBOT_` 前缀的环境变量加载

pub mod dispatcher;
pub mod models;

pub use dispatcher::{normalize_config, DispatcherConfig};
pub use models::{
    AppConfig, DispatcherSettings, ExecutorSettings, ObservabilityConfig, ShutdownSettings,
};
