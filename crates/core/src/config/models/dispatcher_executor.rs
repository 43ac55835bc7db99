use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DispatcherConfig;

/// 分发器配置段，0 表示使用默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    pub workers: usize,
    pub queue_size: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl DispatcherSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 0.0 {
            return Err(anyhow::anyhow!(
                "退避倍数必须是非负数: {}",
                self.backoff_multiplier
            ));
        }

        if self.max_backoff_ms != 0 && self.max_backoff_ms < self.initial_backoff_ms {
            return Err(anyhow::anyhow!(
                "最大退避({}ms)不能小于初始退避({}ms)",
                self.max_backoff_ms,
                self.initial_backoff_ms
            ));
        }

        Ok(())
    }

    /// 转换为运行时配置（未归一化）
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.workers,
            queue_size: self.queue_size,
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// 命令执行器配置段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// 每个任务执行的外部命令
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    /// 单次执行超时（秒）
    pub timeout_seconds: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            working_dir: None,
            timeout_seconds: 1800,
        }
    }
}

impl ExecutorSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.command.trim().is_empty() {
            return Err(anyhow::anyhow!("执行命令不能为空"));
        }

        if self.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("执行超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// 优雅关闭配置段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    /// 等待执行中任务完成的时间（秒），超时后取消执行上下文
    pub grace_period_seconds: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_period_seconds: 30,
        }
    }
}

impl ShutdownSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_settings_conversion() {
        let settings = DispatcherSettings {
            workers: 3,
            queue_size: 8,
            max_attempts: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 4000,
            backoff_multiplier: 2.0,
        };

        let config = settings.to_dispatcher_config();
        assert_eq!(config.workers, 3);
        assert_eq!(config.queue_size, 8);
        assert_eq!(config.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.max_backoff, Duration::from_secs(4));
    }

    #[test]
    fn test_dispatcher_settings_validation() {
        assert!(DispatcherSettings::default().validate().is_ok());

        let negative = DispatcherSettings {
            backoff_multiplier: -2.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let inverted = DispatcherSettings {
            initial_backoff_ms: 1000,
            max_backoff_ms: 10,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_executor_settings_validation() {
        assert!(ExecutorSettings::default().validate().is_err());

        let settings = ExecutorSettings {
            command: "./generate.sh".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_ok());

        let no_timeout = ExecutorSettings {
            timeout_seconds: 0,
            ..settings
        };
        assert!(no_timeout.validate().is_err());
    }
}
