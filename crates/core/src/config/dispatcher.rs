use std::time::Duration;

/// 默认Worker数量
pub const DEFAULT_WORKERS: usize = 4;
/// 默认队列容量
pub const DEFAULT_QUEUE_SIZE: usize = 16;
/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// 默认初始退避
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(15);
/// 默认最大退避
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
/// 默认退避倍数
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// 分发器运行时配置
///
/// 零值字段在构造分发器时被替换为默认值，之后不再变化。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DispatcherConfig {
    /// 并发Worker数量
    pub workers: usize,
    /// 有界队列容量
    pub queue_size: usize,
    /// 单个任务的最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 第一次重试前的等待时间
    pub initial_backoff: Duration,
    /// 退避上限
    pub max_backoff: Duration,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
}

impl DispatcherConfig {
    /// 把零值字段替换为默认值
    ///
    /// 额外规则：倍数非有限或不大于0时取默认值；倍数在 (0, 1) 之间时取 1，
    /// 保证退避时间单调不减；最大退避小于初始退避时提升到初始退避。
    pub fn normalize(mut self) -> Self {
        if self.workers == 0 {
            self.workers = DEFAULT_WORKERS;
        }
        if self.queue_size == 0 {
            self.queue_size = DEFAULT_QUEUE_SIZE;
        }
        if self.max_attempts == 0 {
            self.max_attempts = DEFAULT_MAX_ATTEMPTS;
        }
        if self.initial_backoff.is_zero() {
            self.initial_backoff = DEFAULT_INITIAL_BACKOFF;
        }
        if self.max_backoff.is_zero() {
            self.max_backoff = DEFAULT_MAX_BACKOFF;
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            self.backoff_multiplier = DEFAULT_BACKOFF_MULTIPLIER;
        } else if self.backoff_multiplier < 1.0 {
            self.backoff_multiplier = 1.0;
        }
        if self.max_backoff < self.initial_backoff {
            self.max_backoff = self.initial_backoff;
        }
        self
    }
}

/// 归一化配置
pub fn normalize_config(config: DispatcherConfig) -> DispatcherConfig {
    config.normalize()
}
