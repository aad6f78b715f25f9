//! 执行器配置
//!
//! 百分比与原始单位之间的换算、量程检查与配置校验。

use crate::error::ClientError;
use botlink_protocol::{ProtocolError, narrow_i16};

/// 默认缓动系数
pub const DEFAULT_DELTA: f64 = 1.5;

/// 单个执行器（舵机/电机）的静态配置
///
/// `range_min`/`range_max` 为原始单位（通常是脉宽或固件定义的位置值），
/// 运动请求以百分比表示：`0% -> range_min`，`100% -> range_max`。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActuatorConfig {
    /// 设备内唯一的执行器 ID
    pub id: u8,
    pub name: String,
    /// 直连执行器的 PWM 引脚
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub pin: Option<u8>,
    pub range_min: i32,
    pub range_max: i32,
    /// 起始（home）位置，0-100
    #[cfg_attr(feature = "serde", serde(default = "default_start_percent"))]
    pub start_percent: f64,
    /// 缓动区间（原始单位），0 表示直接跳到目标
    #[cfg_attr(feature = "serde", serde(default))]
    pub buffer: u32,
    /// 步长几何变化系数，必须大于 1
    #[cfg_attr(feature = "serde", serde(default = "default_delta"))]
    pub delta: f64,
    /// 通过串口固件驱动；否则通过 `pin` 直连
    #[cfg_attr(feature = "serde", serde(default = "default_uses_serial"))]
    pub uses_serial: bool,
    /// 运动前请求电源，回到起始位置后释放
    #[cfg_attr(feature = "serde", serde(default))]
    pub power_gated: bool,
}

#[cfg(feature = "serde")]
fn default_start_percent() -> f64 {
    50.0
}

#[cfg(feature = "serde")]
fn default_delta() -> f64 {
    DEFAULT_DELTA
}

#[cfg(feature = "serde")]
fn default_uses_serial() -> bool {
    true
}

impl ActuatorConfig {
    /// 串口执行器，起始位置 50%，不缓动
    pub fn new(id: u8, name: impl Into<String>, range_min: i32, range_max: i32) -> Self {
        Self {
            id,
            name: name.into(),
            pin: None,
            range_min,
            range_max,
            start_percent: 50.0,
            buffer: 0,
            delta: DEFAULT_DELTA,
            uses_serial: true,
            power_gated: false,
        }
    }

    pub fn with_start_percent(mut self, start_percent: f64) -> Self {
        self.start_percent = start_percent;
        self
    }

    /// 启用缓动
    pub fn with_easing(mut self, buffer: u32, delta: f64) -> Self {
        self.buffer = buffer;
        self.delta = delta;
        self
    }

    /// 改为直连 PWM 引脚
    pub fn direct(mut self, pin: u8) -> Self {
        self.pin = Some(pin);
        self.uses_serial = false;
        self
    }

    pub fn power_gated(mut self, power_gated: bool) -> Self {
        self.power_gated = power_gated;
        self
    }

    /// 校验配置
    ///
    /// # 错误
    /// - `ClientError::InvalidConfig`: 量程、起始位置或缓动参数无效
    /// - `ClientError::MissingPin`: 直连执行器没有引脚
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.range_min >= self.range_max {
            return Err(self.invalid(format!(
                "range_min ({}) must be below range_max ({})",
                self.range_min, self.range_max
            )));
        }
        if !self.start_percent.is_finite() || !(0.0..=100.0).contains(&self.start_percent) {
            return Err(self.invalid(format!(
                "start_percent {} outside [0, 100]",
                self.start_percent
            )));
        }
        if self.buffer > 0 && !(self.delta.is_finite() && self.delta > 1.0) {
            return Err(self.invalid(format!("delta {} must be greater than 1", self.delta)));
        }
        if self.uses_serial {
            self.wire_id()?;
            narrow_i16("range_min", self.range_min)?;
            narrow_i16("range_max", self.range_max)?;
        } else if self.pin.is_none() {
            return Err(ClientError::MissingPin {
                actuator: self.name.clone(),
            });
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> ClientError {
        ClientError::InvalidConfig(format!("{} (id {}): {}", self.name, self.id, reason))
    }

    /// 量程跨度（原始单位），以 i64 计算，极端量程不溢出
    pub fn span(&self) -> i64 {
        i64::from(self.range_max) - i64::from(self.range_min)
    }

    /// 百分比对应的原始位置偏移（相对 `range_min`）
    pub fn offset(&self, percent: f64) -> i64 {
        (percent / 100.0 * self.span() as f64).round() as i64
    }

    /// 从 `raw` 偏移 `percent` 个量程百分比，结果饱和到 i32
    pub fn shift(&self, raw: i32, percent: f64) -> i32 {
        let shifted = i64::from(raw).saturating_add(self.offset(percent));
        shifted.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// 百分比 → 原始位置
    pub fn translate(&self, percent: f64) -> i32 {
        self.shift(self.range_min, percent)
    }

    /// 原始位置 → 百分比
    pub fn percent_of(&self, raw: i32) -> f64 {
        (i64::from(raw) - i64::from(self.range_min)) as f64 / self.span() as f64 * 100.0
    }

    /// 起始位置（原始单位）
    pub fn home_raw(&self) -> i32 {
        self.translate(self.start_percent)
    }

    pub fn contains(&self, raw: i32) -> bool {
        (self.range_min..=self.range_max).contains(&raw)
    }

    pub fn clamp(&self, raw: i32) -> i32 {
        raw.clamp(self.range_min, self.range_max)
    }

    /// 线上使用的有符号 ID
    pub fn wire_id(&self) -> Result<i8, ProtocolError> {
        i8::try_from(self.id).map_err(|_| ProtocolError::ValueOutOfRange {
            field: "id",
            value: i64::from(self.id),
        })
    }
}
