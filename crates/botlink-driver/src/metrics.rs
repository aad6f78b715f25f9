//! 链路性能指标模块
//!
//! 原子计数器，用于监控串口链路的健康状态。
//! 所有计数器都使用 `Ordering::Relaxed`，可以在任何线程读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 链路实时指标
///
/// # 使用示例
///
/// ```rust
/// use botlink_driver::LinkMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = LinkMetrics::default();
/// metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.commands_sent, 1);
/// ```
#[derive(Debug, Default)]
pub struct LinkMetrics {
    /// 成功写入的命令数（含握手外的所有消息）
    pub commands_sent: AtomicU64,

    /// 写入的总字节数
    pub bytes_written: AtomicU64,

    /// 收到并归还信用的 RECEIVED 数
    pub acks_received: AtomicU64,

    /// 信用池已满时收到的多余 RECEIVED
    pub spurious_acks: AtomicU64,

    /// 发送线程等待信用超时的次数
    ///
    /// 持续增长说明固件确认变慢或丢失。
    pub credit_waits: AtomicU64,

    /// 解码器丢弃的字节数
    pub decode_discards: AtomicU64,

    /// 解码出的固件消息数
    pub messages_received: AtomicU64,

    /// 写入失败次数
    pub write_errors: AtomicU64,

    /// 读取失败次数（不含超时）
    pub read_errors: AtomicU64,

    /// 成功重新握手的次数
    pub reconnects: AtomicU64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> LinkMetricsSnapshot {
        LinkMetricsSnapshot {
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
            spurious_acks: self.spurious_acks.load(Ordering::Relaxed),
            credit_waits: self.credit_waits.load(Ordering::Relaxed),
            decode_discards: self.decode_discards.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.commands_sent.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
        self.acks_received.store(0, Ordering::Relaxed);
        self.spurious_acks.store(0, Ordering::Relaxed);
        self.credit_waits.store(0, Ordering::Relaxed);
        self.decode_discards.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
        self.write_errors.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
        self.reconnects.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkMetricsSnapshot {
    pub commands_sent: u64,
    pub bytes_written: u64,
    pub acks_received: u64,
    pub spurious_acks: u64,
    pub credit_waits: u64,
    pub decode_discards: u64,
    pub messages_received: u64,
    pub write_errors: u64,
    pub read_errors: u64,
    pub reconnects: u64,
}

impl LinkMetricsSnapshot {
    /// 已发送但尚未确认的命令数（估算）
    pub fn unacknowledged(&self) -> u64 {
        self.commands_sent.saturating_sub(self.acks_received)
    }
}

impl std::fmt::Display for LinkMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sent={} bytes={} acks={} credit_waits={} discards={} write_errors={} read_errors={} reconnects={}",
            self.commands_sent,
            self.bytes_written,
            self.acks_received,
            self.credit_waits,
            self.decode_discards,
            self.write_errors,
            self.read_errors,
            self.reconnects
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = LinkMetrics::new();
        metrics.commands_sent.fetch_add(3, Ordering::Relaxed);
        metrics.acks_received.fetch_add(2, Ordering::Relaxed);
        metrics.decode_discards.fetch_add(5, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.commands_sent, 3);
        assert_eq!(snapshot.unacknowledged(), 1);
        assert_eq!(snapshot.decode_discards, 5);

        metrics.reset();
        assert_eq!(metrics.snapshot(), LinkMetricsSnapshot::default());
    }

    #[test]
    fn test_display() {
        let snapshot = LinkMetricsSnapshot {
            commands_sent: 7,
            ..Default::default()
        };
        assert!(snapshot.to_string().starts_with("sent=7 "));
    }
}
