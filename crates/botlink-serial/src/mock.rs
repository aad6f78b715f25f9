//! 固件模拟器（测试用）
//!
//! `MockDevice` 实现 [`SerialTransport`]，在内存中模拟微控制器固件：
//!
//! - HELLO 握手：未连接时回复 HELLO，已连接时回复 ALREADY_CONNECTED
//! - 每条占用信用的命令回复一个 RECEIVED（可延迟、可手动放行）
//! - PIN_READ 先回复读数，再回复 RECEIVED
//! - 统计未确认命令数（outstanding）及其峰值，用于验证流控
//! - 故障注入：写失败（同时模拟固件复位）、静默、注入垃圾字节
//!
//! 测试通过 [`MockHandle`] 观察和操控设备状态。

use crate::{SerialError, SerialTransport};
use botlink_protocol::{DecodeEvent, DecodeOptions, FrameDecoder, Message};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct OutByte {
    byte: u8,
    ready_at: Instant,
    /// RECEIVED 字节：被主机读走时 outstanding 减一
    is_ack: bool,
}

#[derive(Debug)]
struct DeviceState {
    decoder: FrameDecoder,
    connected: bool,
    received: Vec<Message>,
    output: VecDeque<OutByte>,
    /// 未自动放行的确认（auto_ack 关闭时）
    held_acks: usize,
    outstanding: usize,
    max_outstanding: usize,
    hello_count: usize,
    ack_delay: Duration,
    auto_ack: bool,
    silent: bool,
    fail_writes: usize,
    failed_writes: usize,
    unplugged: bool,
    pin_values: HashMap<u8, i16>,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            decoder: FrameDecoder::new(DecodeOptions::from_host()),
            connected: false,
            received: Vec::new(),
            output: VecDeque::new(),
            held_acks: 0,
            outstanding: 0,
            max_outstanding: 0,
            hello_count: 0,
            ack_delay: Duration::ZERO,
            auto_ack: true,
            silent: false,
            fail_writes: 0,
            failed_writes: 0,
            unplugged: false,
            pin_values: HashMap::new(),
        }
    }

    fn push_reply(&mut self, message: &Message, delay: Duration, is_ack: bool) {
        let Ok(bytes) = message.encode() else {
            return;
        };
        let ready_at = Instant::now() + delay;
        for byte in bytes.iter() {
            self.output.push_back(OutByte {
                byte: *byte,
                ready_at,
                is_ack,
            });
        }
    }

    fn push_ack(&mut self, delay: Duration) {
        self.push_reply(&Message::Received, delay, true);
    }

    fn handle(&mut self, message: Message) {
        trace!("mock firmware got {:?}", message);
        match &message {
            Message::Hello => {
                self.hello_count += 1;
                if !self.silent {
                    let reply = if self.connected {
                        Message::AlreadyConnected
                    } else {
                        Message::Hello
                    };
                    self.push_reply(&reply, Duration::ZERO, false);
                }
                self.connected = true;
            },
            Message::AlreadyConnected => self.connected = true,
            other if other.consumes_credit() => {
                self.outstanding += 1;
                self.max_outstanding = self.max_outstanding.max(self.outstanding);
                if let Message::PinRead { pin } = other
                    && !self.silent
                {
                    let value = self.pin_values.get(pin).copied().unwrap_or(0);
                    self.push_reply(&Message::PinValue { value }, self.ack_delay, false);
                }
                if self.silent {
                    // 静默固件永远不确认
                } else if self.auto_ack {
                    self.push_ack(self.ack_delay);
                } else {
                    self.held_acks += 1;
                }
            },
            _ => {},
        }
        self.received.push(message);
    }

    /// 模拟固件复位：丢弃所有状态
    fn reset_firmware(&mut self) {
        self.connected = false;
        self.output.clear();
        self.held_acks = 0;
        self.outstanding = 0;
        self.decoder.reset();
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<DeviceState>,
    readable: Condvar,
}

/// 模拟设备（传输端）
#[derive(Debug)]
pub struct MockDevice {
    shared: Arc<Shared>,
    read_timeout: Duration,
}

/// 模拟设备的控制句柄（测试端）
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockDevice {
    /// 创建模拟设备及其控制句柄
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Shared {
            state: Mutex::new(DeviceState::new()),
            readable: Condvar::new(),
        });
        (
            Self {
                shared: shared.clone(),
                read_timeout: Duration::from_millis(2),
            },
            MockHandle { shared },
        )
    }
}

impl SerialTransport for MockDevice {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let mut state = self.shared.state.lock();
        if state.unplugged {
            return Err(SerialError::Disconnected);
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            state.failed_writes += 1;
            state.reset_firmware();
            return Err(SerialError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }

        for &byte in bytes {
            if let DecodeEvent::Message(message) = state.decoder.push(byte) {
                state.handle(message);
            }
        }
        drop(state);
        self.shared.readable.notify_all();
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, SerialError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.unplugged {
                return Err(SerialError::Disconnected);
            }
            let now = Instant::now();
            let wake = match state.output.front() {
                Some(front) if front.ready_at <= now => {
                    let out = *front;
                    state.output.pop_front();
                    if out.is_ack {
                        state.outstanding = state.outstanding.saturating_sub(1);
                    }
                    return Ok(out.byte);
                },
                Some(front) => front.ready_at.min(deadline),
                None => deadline,
            };
            if now >= deadline {
                return Err(SerialError::Timeout);
            }
            self.shared.readable.wait_until(&mut state, wake);
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        let mut state = self.shared.state.lock();
        let dropped_acks = state.output.iter().filter(|b| b.is_ack).count();
        state.output.clear();
        state.outstanding = state.outstanding.saturating_sub(dropped_acks);
        Ok(())
    }
}

impl MockHandle {
    fn update<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        let result = f(&mut self.shared.state.lock());
        self.shared.readable.notify_all();
        result
    }

    /// 固件收到的全部消息（按到达顺序）
    pub fn received(&self) -> Vec<Message> {
        self.shared.state.lock().received.clone()
    }

    /// 指定舵机收到的绝对位置序列
    pub fn servo_positions(&self, id: i8) -> Vec<i16> {
        self.shared
            .state
            .lock()
            .received
            .iter()
            .filter_map(|m| match m {
                Message::Servo { id: sid, position } if *sid == id => Some(*position),
                _ => None,
            })
            .collect()
    }

    /// 收到的占用信用的命令数
    pub fn command_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .received
            .iter()
            .filter(|m| m.consumes_credit())
            .count()
    }

    /// 等待直到固件收到至少 `count` 条命令
    pub fn wait_for_commands(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.command_count() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.command_count() >= count
    }

    pub fn clear_received(&self) {
        self.update(|s| s.received.clear());
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    pub fn hello_count(&self) -> usize {
        self.shared.state.lock().hello_count
    }

    /// 当前未被主机读走确认的命令数
    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().outstanding
    }

    /// 运行期间观察到的未确认命令数峰值
    pub fn max_outstanding(&self) -> usize {
        self.shared.state.lock().max_outstanding
    }

    pub fn failed_writes(&self) -> usize {
        self.shared.state.lock().failed_writes
    }

    pub fn set_ack_delay(&self, delay: Duration) {
        self.update(|s| s.ack_delay = delay);
    }

    /// 关闭后确认被扣留，需调用 [`release_acks`](Self::release_acks) 放行
    pub fn set_auto_ack(&self, enabled: bool) {
        self.update(|s| s.auto_ack = enabled);
    }

    /// 放行最多 `count` 个被扣留的确认，返回实际放行数
    pub fn release_acks(&self, count: usize) -> usize {
        self.update(|s| {
            let n = count.min(s.held_acks);
            for _ in 0..n {
                s.push_ack(Duration::ZERO);
            }
            s.held_acks -= n;
            n
        })
    }

    pub fn held_acks(&self) -> usize {
        self.shared.state.lock().held_acks
    }

    /// 静默：不回复握手，也不确认命令
    pub fn set_silent(&self, silent: bool) {
        self.update(|s| s.silent = silent);
    }

    /// 接下来的 `count` 次写入失败（每次失败都模拟固件复位）
    pub fn fail_writes(&self, count: usize) {
        self.update(|s| s.fail_writes = count);
    }

    /// 拔出设备：读写均返回 `Disconnected`
    pub fn unplug(&self) {
        self.update(|s| s.unplugged = true);
    }

    pub fn set_pin_value(&self, pin: u8, value: i16) {
        self.update(|s| {
            s.pin_values.insert(pin, value);
        });
    }

    /// 替换固件的解码选项（例如按标量形状解析 LED）
    pub fn set_decode_options(&self, options: DecodeOptions) {
        self.update(|s| s.decoder = FrameDecoder::new(options));
    }

    /// 向主机注入原始字节（用于测试重同步）
    pub fn inject(&self, bytes: &[u8]) {
        self.update(|s| {
            let now = Instant::now();
            for &byte in bytes {
                s.output.push_back(OutByte {
                    byte,
                    ready_at: now,
                    is_ack: false,
                });
            }
        });
    }

    /// 以固件身份主动发送一条消息
    pub fn send(&self, message: &Message) {
        self.update(|s| s.push_reply(message, Duration::ZERO, false));
    }
}
