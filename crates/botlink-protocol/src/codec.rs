//! 帧编解码
//!
//! 编码：`Message` → 字节（操作码 + 固定形状负载，小端）。
//!
//! 解码：先读一个字节作为操作码，再按该操作码的固定形状读取负载。
//! 协议没有长度前缀和校验和，未知操作码字节会被丢弃，从下一个字节继续
//! 尝试同步。负载中间的字节损坏会导致流失步，这是该帧格式的固有弱点。

use crate::message::{LedIndices, Message};
use crate::opcode::Opcode;
use crate::{ProtocolError, bytes_to_i16_le};
use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;
use tracing::{trace, warn};

/// 解码方向
///
/// PIN_READ 的请求与应答共用一个操作码但负载不同，必须知道字节流的来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// 主机 → 固件（PIN_READ 负载为 1 字节引脚号）
    FromHost,
    /// 固件 → 主机（PIN_READ 负载为 2 字节读数）
    #[default]
    FromDevice,
}

/// LED 负载形状
///
/// 线上没有区分标量和 RGB 的标记，解码时只能由配置决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LedShape {
    /// 3 字节 RGB
    #[default]
    Color,
    /// 2 字节标量亮度
    Scalar,
}

/// 解码选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    pub direction: Direction,
    pub led_shape: LedShape,
}

impl DecodeOptions {
    /// 解码主机发出的字节流（固件侧视角，用于测试和模拟固件）
    pub fn from_host() -> Self {
        Self {
            direction: Direction::FromHost,
            led_shape: LedShape::Color,
        }
    }

    /// 解码固件发出的字节流（主机侧监听线程使用）
    pub fn from_device() -> Self {
        Self::default()
    }

    pub fn with_led_shape(mut self, led_shape: LedShape) -> Self {
        self.led_shape = led_shape;
        self
    }
}

impl Message {
    /// 追加编码到缓冲区
    ///
    /// # 错误
    /// - `ValueOutOfRange`: LED 数量超过 255
    /// - `InvalidValue`: RGB LED 消息没有索引
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.reserve(self.wire_len());
        buf.put_u8(self.opcode().as_byte());

        match self {
            Message::Hello | Message::AlreadyConnected | Message::Received | Message::Stop => {},
            Message::Servo { id, position } => {
                buf.put_i8(*id);
                buf.put_i16_le(*position);
            },
            Message::ServoRelative { id, delta } => {
                buf.put_i8(*id);
                buf.put_i16_le(*delta);
            },
            Message::LedSingle { index, intensity } => {
                buf.put_u8(1);
                buf.put_u8(*index);
                buf.put_i16_le(*intensity);
            },
            Message::LedColor { indices, r, g, b } => {
                if indices.is_empty() {
                    return Err(ProtocolError::InvalidValue {
                        field: "led_indices",
                        reason: "at least one LED index is required".to_string(),
                    });
                }
                let count = u8::try_from(indices.len()).map_err(|_| {
                    ProtocolError::ValueOutOfRange {
                        field: "led_count",
                        value: indices.len() as i64,
                    }
                })?;
                buf.put_u8(count);
                buf.put_slice(indices);
                buf.put_u8(*r);
                buf.put_u8(*g);
                buf.put_u8(*b);
            },
            Message::Pin { pin, high } => {
                buf.put_u8(*pin);
                buf.put_u8(u8::from(*high));
            },
            Message::PinRead { pin } => buf.put_u8(*pin),
            Message::PinValue { value } => buf.put_i16_le(*value),
            Message::Error { code } => buf.put_i16_le(*code),
        }

        Ok(())
    }

    /// 编码为独立的字节块
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// 编码单条消息
pub fn encode(message: &Message) -> Result<Bytes, ProtocolError> {
    message.encode()
}

/// 解码一条完整消息
///
/// 返回消息和消耗的字节数。
///
/// # 错误
/// - `Empty`: 缓冲区为空
/// - `UnknownOpcode`: 首字节不是已知操作码
/// - `Truncated`: 负载不完整（流式场景下表示需要更多字节）
pub fn decode(buf: &[u8], options: DecodeOptions) -> Result<(Message, usize), ProtocolError> {
    let (&first, payload) = buf.split_first().ok_or(ProtocolError::Empty)?;
    let opcode = Opcode::from_byte(first)?;

    let need = |needed: usize| -> Result<(), ProtocolError> {
        if payload.len() < needed {
            Err(ProtocolError::Truncated {
                opcode,
                needed,
                available: payload.len(),
            })
        } else {
            Ok(())
        }
    };
    let i16_at = |offset: usize| bytes_to_i16_le([payload[offset], payload[offset + 1]]);

    let (message, payload_len) = match opcode {
        Opcode::Hello => (Message::Hello, 0),
        Opcode::AlreadyConnected => (Message::AlreadyConnected, 0),
        Opcode::Received => (Message::Received, 0),
        Opcode::Stop => (Message::Stop, 0),
        Opcode::Servo => {
            need(3)?;
            let message = Message::Servo {
                id: payload[0] as i8,
                position: i16_at(1),
            };
            (message, 3)
        },
        Opcode::ServoRelative => {
            need(3)?;
            let message = Message::ServoRelative {
                id: payload[0] as i8,
                delta: i16_at(1),
            };
            (message, 3)
        },
        Opcode::Error => {
            need(2)?;
            (Message::Error { code: i16_at(0) }, 2)
        },
        Opcode::Pin => {
            need(2)?;
            let message = Message::Pin {
                pin: payload[0],
                high: payload[1] != 0,
            };
            (message, 2)
        },
        Opcode::PinRead => match options.direction {
            Direction::FromHost => {
                need(1)?;
                (Message::PinRead { pin: payload[0] }, 1)
            },
            Direction::FromDevice => {
                need(2)?;
                (Message::PinValue { value: i16_at(0) }, 2)
            },
        },
        Opcode::Led => {
            need(1)?;
            let count = payload[0] as usize;
            let tail = match options.led_shape {
                LedShape::Color => 3,
                LedShape::Scalar => 2,
            };
            need(1 + count + tail)?;
            let indices = &payload[1..1 + count];
            let rest = &payload[1 + count..];
            let message = match options.led_shape {
                LedShape::Color => Message::LedColor {
                    indices: LedIndices::from_slice(indices),
                    r: rest[0],
                    g: rest[1],
                    b: rest[2],
                },
                // 标量形状只有在单颗 LED 时才能映射到 `LedSingle`
                LedShape::Scalar if count == 1 => Message::LedSingle {
                    index: indices[0],
                    intensity: bytes_to_i16_le([rest[0], rest[1]]),
                },
                LedShape::Scalar => {
                    return Err(ProtocolError::InvalidValue {
                        field: "led_count",
                        reason: format!("scalar LED payload expects 1 index, got {count}"),
                    });
                },
            };
            (message, 1 + count + tail)
        },
    };

    Ok((message, 1 + payload_len))
}

/// 增量解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// 一条完整消息
    Message(Message),
    /// 消息尚未完整，需要更多字节
    Pending,
    /// 字节被丢弃（未知操作码或非法负载）
    Discarded(u8),
}

/// 默认的连续丢弃告警阈值
pub const DEFAULT_DESYNC_THRESHOLD: u32 = 16;

/// 增量帧解码器
///
/// 监听线程每次读到一个字节就调用一次 [`FrameDecoder::push`]。
///
/// ```
/// use botlink_protocol::{DecodeEvent, DecodeOptions, FrameDecoder, Message};
///
/// let mut decoder = FrameDecoder::new(DecodeOptions::from_host());
/// assert_eq!(decoder.push(1), DecodeEvent::Pending);
/// assert_eq!(decoder.push(5), DecodeEvent::Pending);
/// assert_eq!(decoder.push(0xD2), DecodeEvent::Pending);
/// assert_eq!(
///     decoder.push(0x04),
///     DecodeEvent::Message(Message::Servo { id: 5, position: 1234 })
/// );
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    options: DecodeOptions,
    buf: SmallVec<[u8; 32]>,
    consecutive_discards: u32,
    desync_threshold: u32,
    total_discards: u64,
}

impl FrameDecoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self {
            options,
            buf: SmallVec::new(),
            consecutive_discards: 0,
            desync_threshold: DEFAULT_DESYNC_THRESHOLD,
            total_discards: 0,
        }
    }

    /// 设置连续丢弃告警阈值
    pub fn with_desync_threshold(mut self, threshold: u32) -> Self {
        self.desync_threshold = threshold.max(1);
        self
    }

    /// 输入一个字节
    pub fn push(&mut self, byte: u8) -> DecodeEvent {
        if self.buf.is_empty() && Opcode::from_byte(byte).is_err() {
            return self.discard(byte);
        }

        self.buf.push(byte);
        match decode(&self.buf, self.options) {
            Ok((message, consumed)) => {
                debug_assert_eq!(consumed, self.buf.len());
                self.buf.clear();
                self.consecutive_discards = 0;
                trace!("Decoded {:?}", message);
                DecodeEvent::Message(message)
            },
            Err(ProtocolError::Truncated { .. }) => DecodeEvent::Pending,
            Err(e) => {
                warn!("Dropping malformed {:?} message: {}", self.buf.first(), e);
                let opcode = self.buf[0];
                self.buf.clear();
                self.discard(opcode)
            },
        }
    }

    /// 批量输入，返回解码出的所有完整消息
    pub fn push_slice(&mut self, bytes: &[u8]) -> Vec<Message> {
        bytes
            .iter()
            .filter_map(|&b| match self.push(b) {
                DecodeEvent::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// 清空未完成的消息
    pub fn reset(&mut self) {
        self.buf.clear();
        self.consecutive_discards = 0;
    }

    /// 是否有未完成的消息
    pub fn is_mid_message(&self) -> bool {
        !self.buf.is_empty()
    }

    /// 累计丢弃字节数
    pub fn total_discards(&self) -> u64 {
        self.total_discards
    }

    /// 当前连续丢弃字节数
    pub fn consecutive_discards(&self) -> u32 {
        self.consecutive_discards
    }

    /// 连续丢弃是否已达到告警阈值（疑似失步）
    pub fn is_desynced(&self) -> bool {
        self.consecutive_discards >= self.desync_threshold
    }

    fn discard(&mut self, byte: u8) -> DecodeEvent {
        self.consecutive_discards = self.consecutive_discards.saturating_add(1);
        self.total_discards += 1;
        if self.consecutive_discards == self.desync_threshold {
            warn!(
                "{} consecutive unknown bytes, stream is probably out of sync",
                self.consecutive_discards
            );
        } else {
            trace!("Discarding unknown byte 0x{:02X}", byte);
        }
        DecodeEvent::Discarded(byte)
    }
}
