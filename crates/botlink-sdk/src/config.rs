//! 机器人配置文件（TOML）
//!
//! ```toml
//! [link]
//! port = "/dev/ttyACM0"
//! baud = 115200
//! credit_capacity = 1
//!
//! [planner]
//! step_hold = 100     # 毫秒
//! settle_hold = 500   # 毫秒
//!
//! [[actuator]]
//! id = 0
//! name = "pan"
//! range_min = 0
//! range_max = 180
//! buffer = 10
//! delta = 1.5
//! power_gated = true
//! ```
//!
//! `[link]` 中除 `port`/`baud` 外的字段即 [`LinkConfig`] 的字段，省略时使用默认值。

use botlink_client::{ActuatorConfig, ClientError, TrajectoryPlanner};
use botlink_driver::{DriverError, LinkConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// 默认波特率
pub const DEFAULT_BAUD: u32 = 115_200;

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid actuator: {0}")]
    Client(#[from] ClientError),

    #[error("Invalid link settings: {0}")]
    Link(#[from] DriverError),
}

/// `[link]` 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSection {
    /// 串口设备路径；只有直连执行器时可省略
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(flatten)]
    pub settings: LinkConfig,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            port: None,
            baud: DEFAULT_BAUD,
            settings: LinkConfig::default(),
        }
    }
}

/// 整机配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotConfig {
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub planner: TrajectoryPlanner,
    #[serde(default, rename = "actuator")]
    pub actuators: Vec<ActuatorConfig>,
}

impl RobotConfig {
    /// 从 TOML 文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// 解析 TOML 字符串并校验
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 检查链路设置、每个执行器与 ID 唯一性
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link.settings.validate()?;

        let mut ids = HashSet::new();
        for actuator in &self.actuators {
            actuator.validate()?;
            if !ids.insert(actuator.id) {
                return Err(ClientError::InvalidConfig(format!(
                    "duplicate actuator id {}",
                    actuator.id
                ))
                .into());
            }
        }
        Ok(())
    }

    /// 是否有执行器经由串口驱动
    pub fn needs_link(&self) -> bool {
        self.actuators.iter().any(|a| a.uses_serial)
    }

    pub fn actuator(&self, name: &str) -> Option<&ActuatorConfig> {
        self.actuators.iter().find(|a| a.name == name)
    }

    /// 序列化为 TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
