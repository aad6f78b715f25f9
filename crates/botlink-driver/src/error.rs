//! 驱动层错误类型定义

use botlink_protocol::ProtocolError;
use botlink_serial::SerialError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 串口传输错误
    #[error("Serial transport error: {0}")]
    Serial(#[from] SerialError),

    /// 协议编码/解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 命令通道已关闭（链路已关闭）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 链路丢失且重新握手失败
    #[error("Connection lost")]
    ConnectionLost,

    /// 握手失败
    #[error("Handshake failed after {attempts} attempts")]
    HandshakeFailed { attempts: u32 },

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 配置无效
    #[error("Invalid link config: {0}")]
    InvalidConfig(String),
}
