//! botlink SDK - 业余机器人执行器 Rust SDK
//!
//! 主机把"移动这个关节到 N%"的意图变为平滑的步进序列，
//! 经由串口以流控方式发给微控制器固件。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 单字节操作码 + 小端定长参数的帧编解码
//! - **串口层** (`serial`): 字节流传输抽象，真实串口与模拟固件
//! - **驱动层** (`driver`): 命令队列、信用流控、握手与重连、IO 线程
//! - **客户端层** (`client`): 百分比运动、轨迹规划、执行器状态机
//!
//! # 快速开始
//!
//! ```no_run
//! use botlink_sdk::prelude::*;
//! use std::time::Duration;
//!
//! botlink_sdk::init_logging();
//!
//! let config = RobotConfig::load("robot.toml").unwrap();
//! let robot = Robot::from_config(config).unwrap();
//! robot.move_absolute(0, 75.0).unwrap();
//! robot.wait_idle(Duration::from_secs(5));
//! robot.reset().unwrap();
//! ```

pub use botlink_client as client;
pub use botlink_driver as driver;
pub use botlink_protocol as protocol;
pub use botlink_serial as serial;

pub mod config;
pub mod logging;
pub mod prelude;
pub mod robot;

pub use config::{ConfigError, RobotConfig};
pub use logging::{init_logging, init_logging_with};
pub use robot::{Robot, RobotBuilder, RobotError};

// 常用类型
pub use botlink_client::{
    ActuatorBank, ActuatorConfig, ActuatorEvent, ClientError, MoveExecutor, MoveMode, MoveRequest,
};
pub use botlink_driver::{DriverError, Link, LinkConfig};
pub use botlink_protocol::ProtocolError;
pub use botlink_serial::SerialError;
