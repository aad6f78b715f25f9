//! 客户端错误类型

use crate::control::PlanError;
use botlink_driver::DriverError;
use botlink_protocol::ProtocolError;
use thiserror::Error;

/// 执行器与执行器组的错误
#[derive(Error, Debug)]
pub enum ClientError {
    /// 严格模式下目标超出量程（原始单位）
    #[error("Target {requested} outside range [{min}, {max}]")]
    OutOfRange { requested: i32, min: i32, max: i32 },

    /// 严格模式下绝对百分比超出 [0, 100]
    #[error("Percent {percent} outside [0, 100]")]
    PercentOutOfRange { percent: f64 },

    #[error("Planning error: {0}")]
    Planning(#[from] PlanError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid actuator config: {0}")]
    InvalidConfig(String),

    /// 直连执行器没有配置引脚
    #[error("Actuator '{actuator}' has no pin configured")]
    MissingPin { actuator: String },

    #[error("Unknown actuator id {0}")]
    UnknownActuator(u8),

    /// 外部 PWM 驱动返回的错误
    #[error("Actuation failed: {0}")]
    Actuation(String),

    /// 执行器工作线程已退出
    #[error("Executor worker stopped")]
    ExecutorStopped,
}
