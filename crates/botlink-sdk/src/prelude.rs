//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use botlink_sdk::prelude::*;
//! ```

// 客户端层（推荐使用）
pub use botlink_client::prelude::*;

// 整机装配
pub use crate::config::{ConfigError, RobotConfig};
pub use crate::robot::{Robot, RobotBuilder, RobotError};

// 驱动层（高级用户使用）
pub use botlink_driver::{ConnectionState, DriverError, Link, LinkConfig, LinkEvent};

// 传输与协议
pub use botlink_protocol::{Message, ProtocolError};
pub use botlink_serial::{SerialError, SerialTransport};
