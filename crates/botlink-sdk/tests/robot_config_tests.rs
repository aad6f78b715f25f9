//! 从 TOML 文件装配整机并驱动模拟固件

use botlink_sdk::prelude::*;
use botlink_serial::MockDevice;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"
[link]
port = "/dev/null-robot"
handshake_retry_interval_ms = 50

[planner]
step_hold = 1
settle_hold = 5

[[actuator]]
id = 0
name = "base"
range_min = 1000
range_max = 2000
start_percent = 0.0

[[actuator]]
id = 1
name = "shoulder"
range_min = 0
range_max = 400
buffer = 40
delta = 2.0
power_gated = true
"#;

fn load() -> RobotConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    RobotConfig::load(file.path()).unwrap()
}

#[test]
fn test_robot_from_file_drives_firmware() {
    let (device, handle) = MockDevice::new();
    let (events, event_rx) = ChannelEventSink::new();
    let robot = Robot::builder(load())
        .events(Arc::new(events))
        .connect(device)
        .unwrap();

    robot.move_absolute(0, 50.0).unwrap();
    robot.move_absolute(1, 100.0).unwrap();
    assert!(robot.wait_idle(Duration::from_secs(5)));
    robot.reset().unwrap();
    assert!(robot.wait_idle(Duration::from_secs(5)));
    assert!(robot.link().unwrap().wait_drained(Duration::from_secs(1)));

    assert_eq!(handle.servo_positions(0), vec![1500, 1000]);

    let shoulder = handle.servo_positions(1);
    assert_eq!(shoulder.first(), Some(&200));
    assert!(shoulder.contains(&400));
    assert_eq!(shoulder.last(), Some(&200));
    assert!(shoulder.windows(2).all(|w| (w[1] - w[0]).abs() <= 40));
    assert_eq!(handle.max_outstanding(), 1);

    let events: Vec<ActuatorEvent> = event_rx.try_iter().filter(|e| e.actuator() == 1).collect();
    let acquires = events
        .iter()
        .filter(|e| **e == ActuatorEvent::PowerAcquire { actuator: 1 })
        .count();
    assert_eq!(acquires, 2);
    assert_eq!(
        events.last(),
        Some(&ActuatorEvent::PowerRelease { actuator: 1 })
    );
}

#[test]
fn test_strict_request_is_rejected_without_traffic() {
    let (device, handle) = MockDevice::new();
    let robot = Robot::new(device, load()).unwrap();

    assert!(matches!(
        robot.move_strict(0, 140.0),
        Err(RobotError::Client(ClientError::PercentOutOfRange { .. }))
    ));
    assert!(matches!(
        robot.move_absolute(7, 10.0),
        Err(RobotError::Client(ClientError::UnknownActuator(7)))
    ));
    assert_eq!(handle.command_count(), 0);
}

#[test]
fn test_requests_from_upstream_channel() {
    let (device, handle) = MockDevice::new();
    let robot = Robot::new(device, load()).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    for percent in [10.0, 20.0, 30.0] {
        tx.send(MoveRequest::absolute(0, percent)).unwrap();
    }
    drop(tx);

    robot.bank().serve(&rx);
    assert!(robot.wait_idle(Duration::from_secs(1)));
    assert!(robot.link().unwrap().wait_drained(Duration::from_secs(1)));
    assert_eq!(handle.servo_positions(0), vec![1100, 1200, 1300]);
}
