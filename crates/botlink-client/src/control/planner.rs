//! Trajectory Planner - 轨迹规划器
//!
//! 在两个原始位置之间生成缓动的步进序列。
//!
//! # 算法
//!
//! - `buffer == 0`：直接跳到目标，单步 `[(new, default_hold)]`
//! - `buffer > 0`：从 `old` 出发。剩余距离大于 `buffer` 时步长按 `delta`
//!   几何增长（上限 `buffer`，加速段）；进入 `buffer` 范围后步长按 `delta`
//!   几何衰减（下限 1，减速段），直到到达 `new`
//!
//! 每步移动 `round(increment)` 个原始单位，且不越过目标。
//!
//! # 性质
//!
//! - 首步等于 `old`（`buffer > 0` 时），末步等于 `new`
//! - 相邻两步之差不超过 `buffer`
//! - 单调趋近 `new`
//!
//! # 示例
//!
//! ```rust
//! use botlink_client::control::{TrajectoryPlanner, plan};
//! use std::time::Duration;
//!
//! let trajectory = plan(0, 100, 20, 2.0, Duration::from_millis(500)).unwrap();
//! assert_eq!(trajectory.first().position, 0);
//! assert_eq!(trajectory.last().position, 100);
//!
//! let jump = TrajectoryPlanner::default().plan(40, 90, 0, 1.5).unwrap();
//! assert_eq!(jump.positions().collect::<Vec<_>>(), vec![90]);
//! ```

use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

/// 规划错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// 步数超过安全上限（例如 `delta <= 1` 导致无法收敛）
    #[error("Trajectory did not converge within {steps} steps")]
    NonConvergent { steps: usize },
}

/// 轨迹中的一步：原始位置与到下一步之前的保持时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectoryStep {
    pub position: i32,
    pub hold: Duration,
}

impl TrajectoryStep {
    pub fn new(position: i32, hold: Duration) -> Self {
        Self { position, hold }
    }
}

/// 非空、有限的步进序列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trajectory {
    first: TrajectoryStep,
    rest: VecDeque<TrajectoryStep>,
}

impl Trajectory {
    fn single(step: TrajectoryStep) -> Self {
        Self {
            first: step,
            rest: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    /// 恒为 `false`：轨迹至少包含一步
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> &TrajectoryStep {
        &self.first
    }

    pub fn last(&self) -> &TrajectoryStep {
        self.rest.back().unwrap_or(&self.first)
    }

    pub fn steps(&self) -> impl Iterator<Item = &TrajectoryStep> {
        std::iter::once(&self.first).chain(self.rest.iter())
    }

    pub fn positions(&self) -> impl Iterator<Item = i32> + '_ {
        self.steps().map(|s| s.position)
    }

    /// 全部保持时间之和
    pub fn total_hold(&self) -> Duration {
        self.steps().map(|s| s.hold).sum()
    }

    /// 拆分为首步与剩余步进队列（执行器同步下发首步，其余交给工作线程）
    pub fn split_first(self) -> (TrajectoryStep, VecDeque<TrajectoryStep>) {
        (self.first, self.rest)
    }
}

/// 轨迹规划器
///
/// 保存保持时间与步数上限；规划本身是纯函数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrajectoryPlanner {
    /// 中间步的保持时间
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub step_hold: Duration,
    /// 末步（以及 `buffer == 0` 跳变）的保持时间
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub settle_hold: Duration,
    /// 步数安全上限
    pub max_steps: usize,
}

/// 默认步数上限
pub const DEFAULT_MAX_STEPS: usize = 1000;

impl Default for TrajectoryPlanner {
    fn default() -> Self {
        Self {
            step_hold: Duration::from_millis(100),
            settle_hold: Duration::from_millis(500),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl TrajectoryPlanner {
    pub fn new(step_hold: Duration, settle_hold: Duration) -> Self {
        Self {
            step_hold,
            settle_hold,
            ..Self::default()
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// 规划从 `old` 到 `new` 的轨迹
    ///
    /// # 错误
    ///
    /// 步数超过 `max_steps` 时返回 [`PlanError::NonConvergent`]，不返回部分序列。
    pub fn plan(
        &self,
        old: i32,
        new: i32,
        buffer: u32,
        delta: f64,
    ) -> Result<Trajectory, PlanError> {
        if buffer == 0 || old == new {
            return Ok(Trajectory::single(TrajectoryStep::new(
                new,
                self.settle_hold,
            )));
        }

        let buffer = i64::from(buffer);
        let target = i64::from(new);
        let direction: i64 = if target > i64::from(old) { 1 } else { -1 };

        let first = TrajectoryStep::new(old, self.step_hold);
        let mut rest = VecDeque::new();

        let mut current = i64::from(old);
        let mut increment: f64 = 1.0;
        let mut iterations = 1usize;

        while current != target {
            if iterations >= self.max_steps {
                return Err(PlanError::NonConvergent {
                    steps: self.max_steps,
                });
            }
            iterations += 1;

            let remaining = (target - current).abs();
            if remaining > buffer {
                // 加速段
                increment = (increment * delta).min(buffer as f64);
            } else {
                // 减速段
                increment = (increment / delta).max(1.0);
            }

            // NaN 与亚单位步长都取整为 0：位置停滞，最终触发步数上限
            let step = if increment.is_finite() {
                (increment.round() as i64).clamp(0, remaining.min(buffer))
            } else {
                0
            };
            if step == 0 {
                continue;
            }

            current += direction * step;
            let hold = if current == target {
                self.settle_hold
            } else {
                self.step_hold
            };
            rest.push_back(TrajectoryStep::new(current as i32, hold));
        }

        Ok(Trajectory { first, rest })
    }
}

/// 以给定的默认保持时间规划轨迹
///
/// `default_hold` 用于跳变步与末步，中间步使用 [`TrajectoryPlanner`] 的默认值。
pub fn plan(
    old: i32,
    new: i32,
    buffer: u32,
    delta: f64,
    default_hold: Duration,
) -> Result<Trajectory, PlanError> {
    TrajectoryPlanner {
        settle_hold: default_hold,
        ..TrajectoryPlanner::default()
    }
    .plan(old, new, buffer, delta)
}

#[cfg(feature = "serde")]
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: Duration = Duration::from_millis(500);

    #[test]
    fn test_zero_buffer_is_single_jump() {
        let trajectory = plan(100, 100, 0, 1.5, HOLD).unwrap();
        assert_eq!(
            trajectory.steps().copied().collect::<Vec<_>>(),
            vec![TrajectoryStep::new(100, HOLD)]
        );

        let trajectory = plan(0, 180, 0, 1.5, HOLD).unwrap();
        assert_eq!(trajectory.positions().collect::<Vec<_>>(), vec![180]);
    }

    #[test]
    fn test_eased_trajectory_shape() {
        let trajectory = TrajectoryPlanner::default().plan(0, 100, 20, 2.0).unwrap();
        let positions: Vec<i32> = trajectory.positions().collect();
        // 加速 2, 4, 8, 16；巡航 20；减速 10
        assert_eq!(positions[0], 0);
        assert_eq!(&positions[1..5], &[2, 6, 14, 30]);
        assert_eq!(*positions.last().unwrap(), 100);
        for pair in positions.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!(pair[1] - pair[0] <= 20);
        }
    }

    #[test]
    fn test_descending_trajectory() {
        let trajectory = TrajectoryPlanner::default().plan(200, 50, 30, 1.5).unwrap();
        let positions: Vec<i32> = trajectory.positions().collect();
        assert_eq!(positions[0], 200);
        assert_eq!(*positions.last().unwrap(), 50);
        for pair in positions.windows(2) {
            assert!(pair[1] < pair[0]);
            assert!(pair[0] - pair[1] <= 30);
        }
    }

    #[test]
    fn test_holds() {
        let planner = TrajectoryPlanner::new(Duration::from_millis(10), Duration::from_millis(80));
        let trajectory = planner.plan(0, 50, 10, 2.0).unwrap();
        assert_eq!(trajectory.first().hold, Duration::from_millis(10));
        assert_eq!(trajectory.last().hold, Duration::from_millis(80));
        assert!(
            trajectory
                .steps()
                .take(trajectory.len() - 1)
                .all(|s| s.hold == Duration::from_millis(10))
        );
    }

    #[test]
    fn test_small_distance_inside_buffer() {
        let trajectory = TrajectoryPlanner::default().plan(10, 13, 50, 2.0).unwrap();
        assert_eq!(trajectory.positions().collect::<Vec<_>>(), vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_shrinking_delta_does_not_converge() {
        let err = TrajectoryPlanner::default().plan(0, 500, 10, 0.5).unwrap_err();
        assert_eq!(
            err,
            PlanError::NonConvergent {
                steps: DEFAULT_MAX_STEPS
            }
        );
    }

    #[test]
    fn test_nan_delta_does_not_converge() {
        assert!(TrajectoryPlanner::default().plan(0, 500, 10, f64::NAN).is_err());
    }

    #[test]
    fn test_step_cap_is_enforced() {
        let planner = TrajectoryPlanner::default().with_max_steps(5);
        assert_eq!(
            planner.plan(0, 1000, 1, 2.0),
            Err(PlanError::NonConvergent { steps: 5 })
        );
        assert!(planner.plan(0, 3, 1, 2.0).is_ok());
    }
}
