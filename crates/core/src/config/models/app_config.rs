use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    dispatcher_executor::{DispatcherSettings, ExecutorSettings, ShutdownSettings},
    observability::ObservabilityConfig,
};

/// 默认配置文件搜索路径
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/codebot.toml",
    "codebot.toml",
    "/etc/codebot/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dispatcher: DispatcherSettings,
    pub executor: ExecutorSettings,
    pub shutdown: ShutdownSettings,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: CODEBOT_, nesting: `__`),
    ///    e.g. `CODEBOT_DISPATCHER__WORKERS=8`
    ///
    /// # Arguments
    ///
    /// * `config_path` - Config file path, if None use default paths
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("CODEBOT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.dispatcher
            .validate()
            .context("Dispatcher配置验证失败")?;

        self.executor.validate().context("执行器配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE: &str = r#"
[dispatcher]
workers = 2
queue_size = 8
max_attempts = 4
initial_backoff_ms = 250
max_backoff_ms = 2000
backoff_multiplier = 2.0

[executor]
command = "./bin/generate-pr"
args = ["--verbose"]
timeout_seconds = 600

[shutdown]
grace_period_seconds = 5

[observability]
log_level = "debug"
log_format = "json"
"#;

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.dispatcher.workers, 2);
        assert_eq!(config.dispatcher.max_attempts, 4);
        assert_eq!(config.executor.command, "./bin/generate-pr");
        assert_eq!(config.executor.args, vec!["--verbose".to_string()]);
        assert_eq!(config.shutdown.grace_period(), Duration::from_secs(5));
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_from_toml_defaults_missing_sections() {
        let config = AppConfig::from_toml("[executor]\ncommand = \"run\"\n").unwrap();

        assert_eq!(config.dispatcher, DispatcherSettings::default());
        assert_eq!(config.shutdown.grace_period_seconds, 30);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.executor.timeout_seconds, 1800);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert!(AppConfig::from_toml("").is_err());

        let bad_format = "[executor]\ncommand = \"run\"\n[observability]\nlog_format = \"xml\"\n";
        assert!(AppConfig::from_toml(bad_format).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();

        assert_eq!(config.dispatcher.queue_size, 8);
        assert_eq!(config.executor.timeout_seconds, 600);
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load(Some("/nonexistent/codebot.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let serialized = config.to_toml().unwrap();

        assert_eq!(AppConfig::from_toml(&serialized).unwrap(), config);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = AppConfig::from_toml(include_str!("../../../../../config/codebot.toml")).unwrap();
        let runtime = config.dispatcher.to_dispatcher_config();

        assert_eq!(runtime.workers, 4);
        assert_eq!(runtime.initial_backoff, Duration::from_secs(15));
        assert_eq!(runtime.max_backoff, Duration::from_secs(300));
    }
}
