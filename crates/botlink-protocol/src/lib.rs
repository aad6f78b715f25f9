//! # Botlink Protocol
//!
//! 主机与微控制器之间串口协议的定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `opcode`: 操作码定义
//! - `message`: 带类型负载的消息
//! - `codec`: 编码与增量解码
//!
//! ## 字节序
//!
//! 协议使用小端字节序（与 Arduino 固件的 `write_i16` 一致）。
//! 协议没有长度前缀，也没有校验和：每个操作码对应一个固定的负载形状。

pub mod codec;
pub mod message;
pub mod opcode;

// 重新导出常用类型
pub use codec::*;
pub use message::*;
pub use opcode::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty buffer")]
    Empty,

    #[error("Unknown opcode: 0x{byte:02X}")]
    UnknownOpcode { byte: u8 },

    #[error("Truncated {opcode:?} message: need {needed} bytes, got {available}")]
    Truncated {
        opcode: Opcode,
        needed: usize,
        available: usize,
    },

    #[error("Value out of range for field {field}: {value}")]
    ValueOutOfRange { field: &'static str, value: i64 },

    #[error("Invalid value for field {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

/// 小端字节序转 i16
pub fn bytes_to_i16_le(bytes: [u8; 2]) -> i16 {
    i16::from_le_bytes(bytes)
}

/// i16 转小端字节序
pub fn i16_to_bytes_le(value: i16) -> [u8; 2] {
    value.to_le_bytes()
}

/// 将 i32 收窄为线上 i16 字段
///
/// 超出 i16 范围时返回 `ValueOutOfRange`，不做截断。
pub fn narrow_i16(field: &'static str, value: i32) -> Result<i16, ProtocolError> {
    i16::try_from(value).map_err(|_| ProtocolError::ValueOutOfRange {
        field,
        value: value as i64,
    })
}
