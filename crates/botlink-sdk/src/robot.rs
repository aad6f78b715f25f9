//! 整机装配
//!
//! 根据 [`RobotConfig`] 建立串口链路，并为每个执行器创建运动执行器。

use crate::config::{ConfigError, RobotConfig};
use botlink_client::{
    ActuatorBank, ClientError, EventSink, MoveExecutor, MoveMode, MoveRequest, NullEventSink,
    PwmDriver, PwmSink, SerialSink,
};
use botlink_driver::{DriverError, Link, LinkMetricsSnapshot};
use botlink_serial::{SerialError, SerialTransport};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// 装配与运行错误
#[derive(Error, Debug)]
pub enum RobotError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// 有串口执行器但配置中没有 `link.port`
    #[error("No serial port configured")]
    MissingPort,

    /// 串口执行器没有可用的链路
    #[error("Actuator '{actuator}' needs a serial link")]
    NoLink { actuator: String },

    /// 直连执行器没有 PWM 驱动
    #[error("Actuator '{actuator}' needs a PWM driver")]
    MissingPwmDriver { actuator: String },
}

/// Robot 构建器
pub struct RobotBuilder {
    config: RobotConfig,
    events: Arc<dyn EventSink>,
    pwm: Option<Arc<dyn PwmDriver>>,
}

impl RobotBuilder {
    pub fn new(config: RobotConfig) -> Self {
        Self {
            config,
            events: Arc::new(NullEventSink),
            pwm: None,
        }
    }

    /// 电源/错误事件的去向（默认丢弃）
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// 直连执行器使用的 PWM 驱动
    pub fn pwm_driver(mut self, driver: Arc<dyn PwmDriver>) -> Self {
        self.pwm = Some(driver);
        self
    }

    /// 在给定的传输上握手并装配
    pub fn connect(
        self,
        transport: impl SerialTransport + Send + 'static,
    ) -> Result<Robot, RobotError> {
        self.config.validate()?;
        let link = Link::connect(transport, self.config.link.settings.clone())?;
        self.assemble(Some(Arc::new(link)))
    }

    /// 打开配置中的串口并装配
    ///
    /// 没有串口执行器时不打开串口。
    #[cfg(feature = "serialport")]
    pub fn open(self) -> Result<Robot, RobotError> {
        use botlink_serial::{SerialPortConfig, SerialPortTransport};

        self.config.validate()?;
        if !self.config.needs_link() {
            return self.assemble(None);
        }

        let port = self.config.link.port.clone().ok_or(RobotError::MissingPort)?;
        let transport =
            SerialPortTransport::with_config(SerialPortConfig::new(port).baud(self.config.link.baud))?;
        self.connect(transport)
    }

    /// 只装配直连执行器（不建立串口链路）
    pub fn build_direct(self) -> Result<Robot, RobotError> {
        self.config.validate()?;
        self.assemble(None)
    }

    fn assemble(self, link: Option<Arc<Link>>) -> Result<Robot, RobotError> {
        let mut bank = ActuatorBank::new();
        for actuator in &self.config.actuators {
            let executor = if actuator.uses_serial {
                let link = link.as_ref().ok_or_else(|| RobotError::NoLink {
                    actuator: actuator.name.clone(),
                })?;
                MoveExecutor::with_planner(
                    actuator.clone(),
                    self.config.planner,
                    SerialSink::new(link.clone()),
                    self.events.clone(),
                )?
            } else {
                let driver = self.pwm.as_ref().ok_or_else(|| RobotError::MissingPwmDriver {
                    actuator: actuator.name.clone(),
                })?;
                MoveExecutor::with_planner(
                    actuator.clone(),
                    self.config.planner,
                    PwmSink::new(driver.clone()),
                    self.events.clone(),
                )?
            };
            bank.insert(executor)?;
        }

        info!(
            "Robot assembled: {} actuators, link {}",
            bank.len(),
            if link.is_some() { "up" } else { "none" }
        );

        Ok(Robot {
            config: self.config,
            bank,
            link,
        })
    }
}

/// 一台机器人：一条链路加一组执行器
///
/// # 示例
///
/// ```no_run
/// use botlink_sdk::prelude::*;
///
/// let config = RobotConfig::load("robot.toml").unwrap();
/// let robot = Robot::from_config(config).unwrap();
/// robot.move_absolute(0, 25.0).unwrap();
/// ```
pub struct Robot {
    config: RobotConfig,
    // 执行器先于链路释放
    bank: ActuatorBank,
    link: Option<Arc<Link>>,
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("bank", &self.bank)
            .field("link", &self.link)
            .finish()
    }
}

impl Robot {
    pub fn builder(config: RobotConfig) -> RobotBuilder {
        RobotBuilder::new(config)
    }

    /// 在给定的传输上装配（事件丢弃、无 PWM 驱动）
    pub fn new(
        transport: impl SerialTransport + Send + 'static,
        config: RobotConfig,
    ) -> Result<Self, RobotError> {
        RobotBuilder::new(config).connect(transport)
    }

    /// 打开配置中的串口并装配
    #[cfg(feature = "serialport")]
    pub fn from_config(config: RobotConfig) -> Result<Self, RobotError> {
        RobotBuilder::new(config).open()
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn bank(&self) -> &ActuatorBank {
        &self.bank
    }

    pub fn link(&self) -> Option<&Arc<Link>> {
        self.link.as_ref()
    }

    pub fn actuator(&self, name: &str) -> Option<&Arc<MoveExecutor>> {
        self.bank.find(name)
    }

    pub fn dispatch(&self, request: &MoveRequest) -> Result<(), RobotError> {
        Ok(self.bank.dispatch(request)?)
    }

    pub fn move_absolute(&self, actuator: u8, percent: f64) -> Result<(), RobotError> {
        self.dispatch(&MoveRequest::absolute(actuator, percent))
    }

    pub fn move_relative(&self, actuator: u8, percent: f64) -> Result<(), RobotError> {
        self.dispatch(&MoveRequest::relative(actuator, percent))
    }

    /// 严格模式的绝对运动（越界即拒绝）
    pub fn move_strict(&self, actuator: u8, percent: f64) -> Result<(), RobotError> {
        self.dispatch(&MoveRequest {
            mode: MoveMode::Strict,
            ..MoveRequest::absolute(actuator, percent)
        })
    }

    /// 全部回到起始位置
    pub fn reset(&self) -> Result<(), RobotError> {
        Ok(self.bank.reset_all()?)
    }

    /// 取消所有执行器的剩余步骤，并向固件发送 STOP
    pub fn stop(&self) -> Result<(), RobotError> {
        self.bank.stop_all();
        if let Some(link) = &self.link {
            link.stop()?;
        }
        Ok(())
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.bank.wait_idle(timeout)
    }

    /// 读取固件引脚
    pub fn read_pin(&self, pin: u8, timeout: Duration) -> Result<i16, RobotError> {
        let link = self.link.as_ref().ok_or_else(|| RobotError::NoLink {
            actuator: format!("pin {}", pin),
        })?;
        Ok(link.read_pin(pin, timeout)?)
    }

    pub fn metrics(&self) -> Option<LinkMetricsSnapshot> {
        self.link.as_ref().map(|link| link.metrics())
    }

    /// 链路与所有执行器线程是否正常
    pub fn is_healthy(&self) -> bool {
        self.link.as_ref().is_none_or(|link| link.is_healthy())
            && self.bank.iter().all(|e| e.is_healthy())
    }

    /// 停止运动并关闭链路
    pub fn shutdown(&self) {
        self.bank.stop_all();
        if let Some(link) = &self.link {
            link.shutdown();
        }
        info!("Robot shut down");
    }
}
