//! 轨迹规划属性测试

use botlink_client::{PlanError, TrajectoryPlanner};
use botlink_client::planner::plan;
use proptest::prelude::*;
use std::time::Duration;

fn planner() -> TrajectoryPlanner {
    TrajectoryPlanner::default().with_max_steps(20_000)
}

proptest! {
    /// 首步为起点，末步为终点，步长不超过 buffer，单调趋近终点
    #[test]
    fn eased_trajectory_properties(
        old in -5000i32..5000,
        new in -5000i32..5000,
        buffer in 1u32..200,
        delta in 1.05f64..4.0,
    ) {
        let trajectory = planner().plan(old, new, buffer, delta).unwrap();
        let positions: Vec<i32> = trajectory.positions().collect();

        prop_assert_eq!(positions[0], old);
        prop_assert_eq!(*positions.last().unwrap(), new);
        prop_assert!(positions.len() <= (new - old).unsigned_abs() as usize + 1);

        for pair in positions.windows(2) {
            let step = pair[1] - pair[0];
            prop_assert!(step.unsigned_abs() <= buffer);
            prop_assert!(step.signum() == (new - old).signum());
        }
    }

    /// buffer 为 0 时直接跳到终点
    #[test]
    fn zero_buffer_jumps(old in any::<i16>(), new in any::<i16>(), hold_ms in 0u64..2000) {
        let hold = Duration::from_millis(hold_ms);
        let trajectory = plan(old.into(), new.into(), 0, 1.5, hold).unwrap();
        prop_assert_eq!(trajectory.len(), 1);
        prop_assert_eq!(trajectory.first().position, i32::from(new));
        prop_assert_eq!(trajectory.first().hold, hold);
    }

    /// 中间步使用 step_hold，末步使用 settle_hold
    #[test]
    fn hold_times(old in 0i32..500, new in 600i32..1200, buffer in 1u32..100) {
        let planner = TrajectoryPlanner::new(Duration::from_millis(7), Duration::from_millis(90));
        let trajectory = planner.plan(old, new, buffer, 1.5).unwrap();
        let holds: Vec<Duration> = trajectory.steps().map(|s| s.hold).collect();

        prop_assert_eq!(*holds.last().unwrap(), Duration::from_millis(90));
        prop_assert!(holds[..holds.len() - 1].iter().all(|h| *h == Duration::from_millis(7)));
    }

    /// delta 不大于 1 时长距离运动不收敛，且不返回部分序列
    #[test]
    fn shrinking_delta_is_rejected(distance in 2000i32..5000, delta in 0.1f64..0.49) {
        let result = TrajectoryPlanner::default().plan(0, distance, 50, delta);
        prop_assert_eq!(result, Err(PlanError::NonConvergent { steps: 1000 }));
    }
}
