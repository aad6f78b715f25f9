//! HELLO 握手
//!
//! 主机写入 HELLO，固件回复 HELLO（首次连接）或 ALREADY_CONNECTED（已连接）。
//! 每次尝试等待 `handshake_retry_interval`，最多尝试 `handshake_max_attempts` 次。

use crate::config::LinkConfig;
use crate::error::DriverError;
use botlink_protocol::{DecodeEvent, DecodeOptions, FrameDecoder, Message, Opcode};
use botlink_serial::{SerialError, SerialTransport};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 握手结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeReply {
    /// 固件刚建立连接
    Hello,
    /// 固件此前已处于连接状态
    AlreadyConnected,
}

/// 在传输上执行握手
///
/// 调用方需独占传输（初始连接时在 IO 线程启动之前，重连时持有传输锁）。
/// 握手期间读到的其他消息被丢弃；完成后恢复配置中的读超时。
pub fn handshake<T: SerialTransport + ?Sized>(
    transport: &mut T,
    config: &LinkConfig,
) -> Result<HandshakeReply, DriverError> {
    let attempts = config.handshake_max_attempts.max(1);
    let interval = config.handshake_retry_interval();

    if let Err(e) = transport.clear_input() {
        debug!("Failed to clear input before handshake: {}", e);
    }

    let result = run_attempts(transport, attempts, interval);
    transport.set_read_timeout(config.read_timeout());
    result
}

fn run_attempts<T: SerialTransport + ?Sized>(
    transport: &mut T,
    attempts: u32,
    interval: Duration,
) -> Result<HandshakeReply, DriverError> {
    for attempt in 1..=attempts {
        debug!("Handshake attempt {}/{}", attempt, attempts);

        if let Err(e) = transport.write_all(&[Opcode::Hello.as_byte()]) {
            warn!("Handshake attempt {} failed to write HELLO: {}", attempt, e);
            spin_sleep::sleep(interval);
            continue;
        }

        let mut decoder = FrameDecoder::new(DecodeOptions::from_device());
        let deadline = Instant::now() + interval;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match transport.read_byte_timeout(deadline - now) {
                Ok(byte) => match decoder.push(byte) {
                    DecodeEvent::Message(Message::Hello) => {
                        info!("Handshake complete: device connected");
                        return Ok(HandshakeReply::Hello);
                    },
                    DecodeEvent::Message(Message::AlreadyConnected) => {
                        info!("Handshake complete: device already connected");
                        return Ok(HandshakeReply::AlreadyConnected);
                    },
                    DecodeEvent::Message(other) => {
                        trace!("Ignoring {:?} during handshake", other);
                    },
                    DecodeEvent::Pending | DecodeEvent::Discarded(_) => {},
                },
                Err(SerialError::Timeout) => {},
                Err(e) if e.is_fatal() => {
                    warn!("Handshake attempt {} read failed: {}", attempt, e);
                    spin_sleep::sleep(deadline.saturating_duration_since(Instant::now()));
                    break;
                },
                Err(e) => debug!("Handshake read error: {}", e),
            }
        }
    }
    Err(DriverError::HandshakeFailed { attempts })
}
