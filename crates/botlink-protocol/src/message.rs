//! 消息类型定义
//!
//! 每个操作码对应一个带类型负载的变体。LED 与 PIN_READ 在固件中是
//! "同一操作码、不同负载形状"，这里拆成显式的变体，由调用方决定形状。

use crate::opcode::Opcode;
use smallvec::SmallVec;

/// LED 索引列表
///
/// 栈上预留 16 个位置，足以覆盖常见的灯环（8/12/16 颗）。
pub type LedIndices = SmallVec<[u8; 16]>;

/// 协议消息
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Message {
    /// 握手请求
    Hello,
    /// 握手应答：固件已处于连接状态
    AlreadyConnected,
    /// 绝对位置
    Servo { id: i8, position: i16 },
    /// 相对位置
    ServoRelative { id: i8, delta: i16 },
    /// 单颗 LED 亮度（标量负载）
    LedSingle { index: u8, intensity: i16 },
    /// 多颗 LED 颜色（RGB 负载）
    LedColor {
        indices: LedIndices,
        r: u8,
        g: u8,
        b: u8,
    },
    /// 数字引脚输出
    Pin { pin: u8, high: bool },
    /// 引脚读取请求（主机 → 固件）
    PinRead { pin: u8 },
    /// 引脚读取应答（固件 → 主机）
    PinValue { value: i16 },
    /// 确认
    Received,
    /// 错误码
    Error { code: i16 },
    /// 停止
    Stop,
}

impl Message {
    /// 消息对应的操作码
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Hello => Opcode::Hello,
            Message::AlreadyConnected => Opcode::AlreadyConnected,
            Message::Servo { .. } => Opcode::Servo,
            Message::ServoRelative { .. } => Opcode::ServoRelative,
            Message::LedSingle { .. } | Message::LedColor { .. } => Opcode::Led,
            Message::Pin { .. } => Opcode::Pin,
            Message::PinRead { .. } | Message::PinValue { .. } => Opcode::PinRead,
            Message::Received => Opcode::Received,
            Message::Error { .. } => Opcode::Error,
            Message::Stop => Opcode::Stop,
        }
    }

    /// 目标标识（舵机 id、引脚号或首个 LED 索引）
    pub fn target(&self) -> Option<i16> {
        match self {
            Message::Servo { id, .. } | Message::ServoRelative { id, .. } => Some(*id as i16),
            Message::LedSingle { index, .. } => Some(*index as i16),
            Message::LedColor { indices, .. } => indices.first().map(|&i| i as i16),
            Message::Pin { pin, .. } | Message::PinRead { pin } => Some(*pin as i16),
            _ => None,
        }
    }

    /// 编码后的总字节数（含操作码）
    pub fn wire_len(&self) -> usize {
        1 + match self {
            Message::Hello
            | Message::AlreadyConnected
            | Message::Received
            | Message::Stop => 0,
            Message::Servo { .. } | Message::ServoRelative { .. } => 3,
            Message::LedSingle { .. } => 1 + 1 + 2,
            Message::LedColor { indices, .. } => 1 + indices.len() + 3,
            Message::Pin { .. } => 2,
            Message::PinRead { .. } => 1,
            Message::PinValue { .. } | Message::Error { .. } => 2,
        }
    }

    /// 创建 RGB LED 消息
    pub fn led_color(indices: impl IntoIterator<Item = u8>, rgb: (u8, u8, u8)) -> Self {
        Message::LedColor {
            indices: indices.into_iter().collect(),
            r: rgb.0,
            g: rgb.1,
            b: rgb.2,
        }
    }

    /// 是否为需要固件确认的命令
    ///
    /// 握手与确认本身不占用信用。
    pub fn consumes_credit(&self) -> bool {
        !matches!(
            self,
            Message::Hello | Message::AlreadyConnected | Message::Received
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_opcode() {
        assert_eq!(
            Message::Servo {
                id: 3,
                position: 1500
            }
            .opcode(),
            Opcode::Servo
        );
        assert_eq!(Message::PinValue { value: 12 }.opcode(), Opcode::PinRead);
        assert_eq!(Message::PinRead { pin: 4 }.opcode(), Opcode::PinRead);
        assert_eq!(
            Message::led_color([1, 2], (0, 0, 0)).opcode(),
            Opcode::Led
        );
    }

    #[test]
    fn test_message_wire_len() {
        assert_eq!(Message::Hello.wire_len(), 1);
        assert_eq!(
            Message::Servo {
                id: 1,
                position: 0
            }
            .wire_len(),
            4
        );
        assert_eq!(
            Message::LedSingle {
                index: 0,
                intensity: 10
            }
            .wire_len(),
            5
        );
        assert_eq!(Message::led_color(0..9, (1, 2, 3)).wire_len(), 1 + 1 + 9 + 3);
        assert_eq!(Message::Pin { pin: 13, high: true }.wire_len(), 3);
        assert_eq!(Message::PinRead { pin: 2 }.wire_len(), 2);
        assert_eq!(Message::Error { code: -1 }.wire_len(), 3);
    }

    #[test]
    fn test_message_target() {
        assert_eq!(
            Message::Servo {
                id: -4,
                position: 0
            }
            .target(),
            Some(-4)
        );
        assert_eq!(Message::led_color([7, 8], (0, 0, 0)).target(), Some(7));
        assert_eq!(Message::Stop.target(), None);
    }

    #[test]
    fn test_consumes_credit() {
        assert!(Message::Stop.consumes_credit());
        assert!(Message::PinRead { pin: 1 }.consumes_credit());
        assert!(!Message::Hello.consumes_credit());
        assert!(!Message::Received.consumes_credit());
    }
}
