//! 客户端接口模块
//!
//! 本模块把百分比表示的运动意图变为执行器上的平滑运动，包括：
//! - 执行器配置与百分比/原始单位换算
//! - 缓动轨迹规划
//! - 每个执行器一个运动状态机（抢占、取消、等待空闲）
//! - 串口/PWM 两种位置输出
//! - 电源与错误事件
//!
//! # 使用场景
//!
//! 这是大多数用户应该使用的模块。
//! 如果需要直接发送原始命令，可以使用 `botlink-driver` 的 `Link`。

pub mod actuator;
pub mod bank;
pub mod control;
mod error;
pub mod events;
pub mod sink;

pub use actuator::ActuatorConfig;
pub use bank::{ActuatorBank, MoveRequest};
pub use control::{
    MoveExecutor, MoveKind, MoveMode, MoveState, PlanError, Trajectory, TrajectoryPlanner,
    TrajectoryStep, executor, planner,
};
pub use error::ClientError;
pub use events::{ActuatorEvent, ChannelEventSink, EventSink, NullEventSink};
pub use sink::{PositionSink, PwmDriver, PwmSink, SerialSink};

/// 常用类型
pub mod prelude {
    pub use crate::{
        ActuatorBank, ActuatorConfig, ActuatorEvent, ChannelEventSink, ClientError, EventSink,
        MoveExecutor, MoveKind, MoveMode, MoveRequest, MoveState, NullEventSink, PositionSink,
        PwmDriver, PwmSink, SerialSink, TrajectoryPlanner,
    };
}
