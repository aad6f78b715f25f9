//! 位置输出
//!
//! 执行器把每一步的原始位置交给 [`PositionSink`]：
//! - [`SerialSink`]：编码为 SERVO 命令，经由 [`Link`] 的命令队列发给固件
//! - [`PwmSink`]：直连引脚，调用外部 [`PwmDriver`]

use crate::actuator::ActuatorConfig;
use crate::error::ClientError;
use botlink_driver::Link;
use botlink_protocol::narrow_i16;
use std::sync::Arc;
use tracing::trace;

/// 位置输出接口
pub trait PositionSink: Send + Sync {
    /// 输出一步原始位置
    fn dispatch(&self, actuator: &ActuatorConfig, raw: i32) -> Result<(), ClientError>;
}

impl<S: PositionSink + ?Sized> PositionSink for Arc<S> {
    fn dispatch(&self, actuator: &ActuatorConfig, raw: i32) -> Result<(), ClientError> {
        (**self).dispatch(actuator, raw)
    }
}

/// 经由串口固件输出
#[derive(Debug, Clone)]
pub struct SerialSink {
    link: Arc<Link>,
}

impl SerialSink {
    pub fn new(link: Arc<Link>) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }
}

impl PositionSink for SerialSink {
    fn dispatch(&self, actuator: &ActuatorConfig, raw: i32) -> Result<(), ClientError> {
        let id = actuator.wire_id()?;
        let position = narrow_i16("position", raw)?;
        trace!("Servo {} -> {}", id, position);
        self.link.servo(id, position)?;
        Ok(())
    }
}

/// GPIO/PWM 厂商接口
pub trait PwmDriver: Send + Sync {
    /// 在引脚上输出对应原始位置的 PWM
    fn write(&self, pin: u8, raw: i32) -> Result<(), String>;
}

/// 直连引脚输出
#[derive(Clone)]
pub struct PwmSink {
    driver: Arc<dyn PwmDriver>,
}

impl std::fmt::Debug for PwmSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PwmSink").finish_non_exhaustive()
    }
}

impl PwmSink {
    pub fn new(driver: Arc<dyn PwmDriver>) -> Self {
        Self { driver }
    }
}

impl PositionSink for PwmSink {
    fn dispatch(&self, actuator: &ActuatorConfig, raw: i32) -> Result<(), ClientError> {
        let pin = actuator.pin.ok_or_else(|| ClientError::MissingPin {
            actuator: actuator.name.clone(),
        })?;
        trace!("PWM pin {} -> {}", pin, raw);
        self.driver.write(pin, raw).map_err(ClientError::Actuation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botlink_driver::LinkConfig;
    use botlink_serial::MockDevice;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingPwm {
        writes: Mutex<Vec<(u8, i32)>>,
    }

    impl PwmDriver for RecordingPwm {
        fn write(&self, pin: u8, raw: i32) -> Result<(), String> {
            if raw < 0 {
                return Err("negative pulse".to_string());
            }
            self.writes.lock().push((pin, raw));
            Ok(())
        }
    }

    #[test]
    fn test_pwm_sink_uses_pin() {
        let driver = Arc::new(RecordingPwm::default());
        let sink = PwmSink::new(driver.clone());
        let config = ActuatorConfig::new(3, "claw", 0, 180).direct(9);

        sink.dispatch(&config, 90).unwrap();
        assert_eq!(*driver.writes.lock(), vec![(9, 90)]);

        assert!(matches!(
            sink.dispatch(&config, -1),
            Err(ClientError::Actuation(_))
        ));
    }

    #[test]
    fn test_pwm_sink_requires_pin() {
        let sink = PwmSink::new(Arc::new(RecordingPwm::default()));
        let config = ActuatorConfig::new(3, "claw", 0, 180);
        assert!(matches!(
            sink.dispatch(&config, 10),
            Err(ClientError::MissingPin { .. })
        ));
    }

    #[test]
    fn test_serial_sink_sends_servo_command() {
        let (device, handle) = MockDevice::new();
        let link = Arc::new(Link::connect(device, LinkConfig::default()).unwrap());
        let sink = SerialSink::new(link.clone());
        let config = ActuatorConfig::new(4, "pan", 0, 1000);

        sink.dispatch(&config, 750).unwrap();
        assert!(link.wait_drained(Duration::from_secs(1)));
        assert_eq!(handle.servo_positions(4), vec![750]);

        assert!(matches!(
            sink.dispatch(&config, 40_000),
            Err(ClientError::Protocol(_))
        ));
    }
}
