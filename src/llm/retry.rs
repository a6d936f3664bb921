//! 重试策略：最大尝试次数、指数退避、可重试错误判定
//!
//! 策略是显式值对象，由 ModelGateway 在每次调用时使用；退避状态只存在于单次调用内部。

use std::time::Duration;

use crate::config::RetrySection;
use crate::llm::LlmError;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 第一次重试前的等待
    pub initial_delay: Duration,
    /// 单次等待上限
    pub max_delay: Duration,
    /// 每次重试等待的倍数
    pub backoff_factor: f64,
    /// 判断错误是否值得重试
    pub retryable: fn(&LlmError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
            retryable: LlmError::is_transient,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetrySection) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            backoff_factor: cfg.backoff_factor.max(1.0),
            retryable: LlmError::is_transient,
        }
    }

    /// 不重试：只尝试一次
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 测试用：不等待
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_retryable(mut self, retryable: fn(&LlmError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// 第 attempt 次失败（从 1 开始）后的等待时长：initial * factor^(attempt-1)，不超过 max_delay
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// 第 attempt 次失败后是否继续
    pub fn should_retry(&self, err: &LlmError, attempt: u32) -> bool {
        attempt < self.max_attempts && (self.retryable)(err)
    }
}
