//! 操作码定义
//!
//! 每条消息的第一个字节。数值与固件 `Order.h` 中的枚举保持一致，
//! 修改任何一个值都会破坏与现有固件的兼容性。

use crate::ProtocolError;

/// 协议操作码
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Opcode {
    /// 握手请求
    Hello = 0,
    /// 绝对位置（原始单位）
    Servo = 1,
    /// 相对位置（原始单位增量）
    ServoRelative = 2,
    /// 握手应答：会话已存在
    AlreadyConnected = 3,
    /// 错误码
    Error = 4,
    /// 确认（流控信用）
    Received = 5,
    /// 停止
    Stop = 6,
    /// LED 控制
    Led = 7,
    /// 数字引脚输出
    Pin = 8,
    /// 引脚读取（请求/应答负载不同）
    PinRead = 9,
}

impl Opcode {
    /// 所有操作码（按字节值排序）
    pub const ALL: [Opcode; 10] = [
        Opcode::Hello,
        Opcode::Servo,
        Opcode::ServoRelative,
        Opcode::AlreadyConnected,
        Opcode::Error,
        Opcode::Received,
        Opcode::Stop,
        Opcode::Led,
        Opcode::Pin,
        Opcode::PinRead,
    ];

    /// 从线上字节解析
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        <Opcode as num_enum::TryFromPrimitive>::try_from_primitive(byte)
            .map_err(|_| ProtocolError::UnknownOpcode { byte })
    }

    /// 转换为线上字节
    pub fn as_byte(self) -> u8 {
        self.into()
    }

    /// 是否为握手应答（HELLO 或 ALREADY_CONNECTED）
    pub fn is_handshake_reply(self) -> bool {
        matches!(self, Opcode::Hello | Opcode::AlreadyConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values_match_firmware() {
        assert_eq!(Opcode::Hello.as_byte(), 0);
        assert_eq!(Opcode::Servo.as_byte(), 1);
        assert_eq!(Opcode::ServoRelative.as_byte(), 2);
        assert_eq!(Opcode::AlreadyConnected.as_byte(), 3);
        assert_eq!(Opcode::Error.as_byte(), 4);
        assert_eq!(Opcode::Received.as_byte(), 5);
        assert_eq!(Opcode::Stop.as_byte(), 6);
        assert_eq!(Opcode::Led.as_byte(), 7);
        assert_eq!(Opcode::Pin.as_byte(), 8);
        assert_eq!(Opcode::PinRead.as_byte(), 9);
    }

    #[test]
    fn test_opcode_from_byte_roundtrip() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::from_byte(opcode.as_byte()), Ok(opcode));
        }
    }

    #[test]
    fn test_opcode_unknown() {
        assert_eq!(
            Opcode::from_byte(10),
            Err(ProtocolError::UnknownOpcode { byte: 10 })
        );
        assert_eq!(
            Opcode::from_byte(0xFF),
            Err(ProtocolError::UnknownOpcode { byte: 0xFF })
        );
    }

    #[test]
    fn test_handshake_reply() {
        assert!(Opcode::Hello.is_handshake_reply());
        assert!(Opcode::AlreadyConnected.is_handshake_reply());
        assert!(!Opcode::Received.is_handshake_reply());
    }
}
