//! 运动控制模块
//!
//! - [`planner`]：两点之间的缓动轨迹规划（纯函数）
//! - [`executor`]：单个执行器的运动状态机，带抢占与取消

pub mod executor;
pub mod planner;

pub use executor::{MoveExecutor, MoveKind, MoveMode, MoveState};
pub use planner::{PlanError, Trajectory, TrajectoryPlanner, TrajectoryStep, plan};
