pub mod app_config;
pub mod dispatcher_executor;
pub mod observability;

pub use app_config::AppConfig;
pub use dispatcher_executor::{DispatcherSettings, ExecutorSettings, ShutdownSettings};
pub use observability::ObservabilityConfig;
