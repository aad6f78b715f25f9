//! 驱动层模块
//!
//! 本模块提供主机与微控制器之间的可靠命令链路，包括：
//! - 命令队列（有界 FIFO）
//! - 信用流控：未确认命令数不超过固件输入缓冲区所能容纳的数量
//! - 发送线程与监听线程（共享一个互斥的串口传输）
//! - HELLO 握手与写失败后的自动重连
//! - 原子计数器指标
//!
//! # 使用场景
//!
//! 需要直接发送原始命令时使用 [`Link`]。
//! 大多数用户应该使用 `botlink-client` 提供的按百分比运动的执行器。

mod config;
pub mod credit;
mod error;
pub mod handshake;
mod link;
pub mod metrics;
pub mod pipeline;
pub mod state;

pub use config::LinkConfig;
pub use credit::CreditPool;
pub use error::DriverError;
pub use handshake::{HandshakeReply, handshake};
pub use link::Link;
pub use metrics::{LinkMetrics, LinkMetricsSnapshot};
pub use pipeline::{Outbound, SharedTransport, rx_loop, tx_loop};
pub use state::{AtomicConnectionState, ConnectionState, LinkContext, LinkEvent};
