//! 串口执行器端到端测试
//!
//! 执行器 → SerialSink → Link → MockDevice。

use botlink_client::prelude::*;
use botlink_driver::{Link, LinkConfig};
use botlink_serial::{MockDevice, MockHandle};
use std::sync::Arc;
use std::time::Duration;

fn link() -> (Arc<Link>, MockHandle) {
    let (device, handle) = MockDevice::new();
    let config = LinkConfig {
        handshake_retry_interval_ms: 20,
        ..LinkConfig::default()
    };
    (Arc::new(Link::connect(device, config).unwrap()), handle)
}

fn fast_planner() -> TrajectoryPlanner {
    TrajectoryPlanner::new(Duration::from_millis(2), Duration::from_millis(5))
}

fn serial_executor(link: &Arc<Link>, config: ActuatorConfig) -> MoveExecutor {
    MoveExecutor::with_planner(
        config,
        fast_planner(),
        SerialSink::new(link.clone()),
        Arc::new(NullEventSink),
    )
    .unwrap()
}

#[test]
fn test_percent_moves_reach_firmware() {
    let (link, handle) = link();
    let executor = serial_executor(&link, ActuatorConfig::new(2, "pan", 0, 200));

    for percent in [10.0, 50.0, 100.0] {
        executor.move_absolute(percent, MoveMode::Clamp).unwrap();
        assert!(executor.wait_idle(Duration::from_secs(1)));
    }
    executor.move_relative(-40.0, MoveMode::Clamp).unwrap();
    assert!(executor.wait_idle(Duration::from_secs(1)));

    assert!(link.wait_drained(Duration::from_secs(1)));
    assert_eq!(handle.servo_positions(2), vec![20, 100, 200, 120]);
}

#[test]
fn test_eased_move_keeps_single_credit() {
    let (link, handle) = link();
    handle.set_ack_delay(Duration::from_millis(1));
    let config = ActuatorConfig::new(5, "tilt", 1000, 2000)
        .with_start_percent(0.0)
        .with_easing(50, 1.5);
    let executor = serial_executor(&link, config);

    executor.move_absolute(100.0, MoveMode::Clamp).unwrap();
    assert!(executor.wait_idle(Duration::from_secs(5)));
    assert!(link.wait_drained(Duration::from_secs(1)));

    let positions = handle.servo_positions(5);
    assert_eq!(positions.first(), Some(&1000));
    assert_eq!(positions.last(), Some(&2000));
    assert!(positions.windows(2).all(|w| w[1] > w[0] && w[1] - w[0] <= 50));
    assert_eq!(handle.max_outstanding(), 1);
}

#[test]
fn test_bank_shares_one_link() {
    let (link, handle) = link();
    let (events, event_rx) = ChannelEventSink::new();
    let events: Arc<dyn EventSink> = Arc::new(events);

    let mut bank = ActuatorBank::new();
    for (id, name) in [(0u8, "base"), (1, "elbow")] {
        let config = ActuatorConfig::new(id, name, 0, 1000).power_gated(id == 1);
        bank.insert(
            MoveExecutor::with_planner(
                config,
                fast_planner(),
                SerialSink::new(link.clone()),
                events.clone(),
            )
            .unwrap(),
        )
        .unwrap();
    }

    bank.dispatch(&MoveRequest::absolute(0, 25.0)).unwrap();
    bank.dispatch(&MoveRequest::absolute(1, 75.0)).unwrap();
    assert!(bank.dispatch(&MoveRequest::relative(1, 40.0).strict()).is_err());
    bank.reset_all().unwrap();
    assert!(bank.wait_idle(Duration::from_secs(1)));
    assert!(link.wait_drained(Duration::from_secs(1)));

    assert_eq!(handle.servo_positions(0), vec![250, 500]);
    assert_eq!(handle.servo_positions(1), vec![750, 500]);

    let events: Vec<ActuatorEvent> = event_rx.try_iter().collect();
    assert!(events.contains(&ActuatorEvent::PowerRelease { actuator: 1 }));
    assert!(!events.contains(&ActuatorEvent::PowerAcquire { actuator: 0 }));
    assert!(events.iter().any(|e| matches!(e, ActuatorEvent::Error { actuator: 1, .. })));
}

#[test]
fn test_lost_link_surfaces_as_driver_error() {
    let (link, handle) = link();
    let (events, event_rx) = ChannelEventSink::new();
    let executor = MoveExecutor::with_planner(
        ActuatorConfig::new(0, "pan", 0, 200),
        fast_planner(),
        SerialSink::new(link.clone()),
        Arc::new(events),
    )
    .unwrap();

    handle.unplug();
    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while link.is_healthy() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }

    assert!(matches!(
        executor.move_absolute(80.0, MoveMode::Clamp),
        Err(ClientError::Driver(_))
    ));
    assert_eq!(executor.state(), MoveState::Idle);
    assert!(
        event_rx
            .try_iter()
            .any(|e| matches!(e, ActuatorEvent::Error { actuator: 0, .. }))
    );
}
