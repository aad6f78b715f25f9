//! 链路配置

use crate::error::DriverError;
use std::time::Duration;

/// 链路配置
///
/// 控制命令队列、信用池、握手与 IO 线程的行为。
///
/// # Example
///
/// ```
/// use botlink_driver::LinkConfig;
///
/// // 默认配置：单信用（严格停等），队列容量 64
/// let config = LinkConfig::default();
/// assert_eq!(config.credit_capacity, 1);
///
/// // 固件输入缓冲区较大时可以放宽信用
/// let config = LinkConfig {
///     credit_capacity: 4,
///     ..LinkConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    /// 命令队列容量（有界 FIFO）
    pub queue_capacity: usize,
    /// 同时在途（未确认）的命令数上限
    pub credit_capacity: usize,
    /// 发送线程等待信用的单次超时（毫秒），超时后重新检查运行标志
    pub credit_wait_ms: u64,
    /// 队列为空时发送线程的退避时间（微秒）
    pub idle_backoff_us: u64,
    /// 监听线程单次读取超时（毫秒）
    pub read_timeout_ms: u64,
    /// 每次握手尝试等待应答的时间（毫秒）
    pub handshake_retry_interval_ms: u64,
    /// 握手最大尝试次数
    pub handshake_max_attempts: u32,
    /// 入队阻塞的最长时间（毫秒）
    pub send_timeout_ms: u64,
    /// 同一条命令因写失败而重连的最大次数
    pub max_write_retries: u32,
    /// 连续丢弃多少字节后报告失步
    pub desync_threshold: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            credit_capacity: 1,
            credit_wait_ms: 10,
            idle_backoff_us: 500,
            read_timeout_ms: 2,
            handshake_retry_interval_ms: 1000,
            handshake_max_attempts: 5,
            send_timeout_ms: 1000,
            max_write_retries: 3,
            desync_threshold: botlink_protocol::DEFAULT_DESYNC_THRESHOLD,
        }
    }
}

impl LinkConfig {
    /// 检查配置是否可用
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.queue_capacity == 0 {
            return Err(DriverError::InvalidConfig(
                "queue_capacity must be positive".to_string(),
            ));
        }
        if self.credit_capacity == 0 {
            return Err(DriverError::InvalidConfig(
                "credit_capacity must be positive".to_string(),
            ));
        }
        if self.handshake_max_attempts == 0 {
            return Err(DriverError::InvalidConfig(
                "handshake_max_attempts must be positive".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "read_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn credit_wait(&self) -> Duration {
        Duration::from_millis(self.credit_wait_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_micros(self.idle_backoff_us)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn handshake_retry_interval(&self) -> Duration {
        Duration::from_millis(self.handshake_retry_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.credit_capacity, 1);
        assert_eq!(config.idle_backoff(), Duration::from_micros(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = LinkConfig {
            credit_capacity: 0,
            ..LinkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DriverError::InvalidConfig(_))
        ));

        let config = LinkConfig {
            handshake_max_attempts: 0,
            ..LinkConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
