//! Pipeline IO 循环模块
//!
//! 发送线程（`tx_loop`）与监听线程（`rx_loop`）共享同一个串口传输，
//! 传输由 `parking_lot::Mutex` 互斥；两者通过 [`CreditPool`](crate::CreditPool)
//! 协调：每写一条命令消耗一个信用，每收到一个 RECEIVED 归还一个。

use crate::config::LinkConfig;
use crate::error::DriverError;
use crate::handshake::handshake;
use crate::state::{ConnectionState, LinkContext, LinkEvent};
use botlink_protocol::{DecodeEvent, DecodeOptions, FrameDecoder, Message};
use botlink_serial::{SerialError, SerialTransport};
use bytes::Bytes;
use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, trace, warn};

/// 线程间共享的串口传输
pub type SharedTransport = Arc<Mutex<Box<dyn SerialTransport + Send>>>;

/// 已编码、等待写入的命令
///
/// 编码在入队时完成，发送线程不会遇到编码错误。
#[derive(Debug, Clone)]
pub struct Outbound {
    pub message: Message,
    pub bytes: Bytes,
}

impl Outbound {
    pub fn new(message: Message) -> Result<Self, DriverError> {
        let bytes = message.encode()?;
        Ok(Self { message, bytes })
    }
}

#[cfg(feature = "realtime")]
fn raise_thread_priority(name: &str) {
    use thread_priority::*;

    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(_) => info!("{} thread priority set to MAX (realtime)", name),
        Err(e) => warn!(
            "Failed to set {} thread priority: {}. \
            On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
            name, e
        ),
    }
}

/// 发送线程循环
///
/// 1. 等待信用（带超时，超时后重新检查运行标志）
/// 2. 取队首命令；队列为空时归还信用并短暂退避
/// 3. 持有传输锁写入；写失败时重新握手并重试同一条命令
///
/// 监听线程读失败时置位 `needs_rehandshake`，发送线程在下一次取信用前
/// 重新握手并重置信用。
///
/// 重新握手失败时链路停止：状态置为 Disconnected，发布
/// [`LinkEvent::ConnectionFailed`]，运行标志置为 false。
pub fn tx_loop(
    transport: SharedTransport,
    cmd_rx: Receiver<Outbound>,
    ctx: Arc<LinkContext>,
    config: LinkConfig,
) {
    #[cfg(feature = "realtime")]
    raise_thread_priority("TX");

    let credit_wait = config.credit_wait();
    let idle_backoff = config.idle_backoff();

    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !ctx.is_running.load(Ordering::Acquire) {
            trace!("TX thread: is_running flag is false, exiting");
            break;
        }

        if ctx.needs_rehandshake.load(Ordering::Acquire) {
            match reconnect(&transport, &ctx, &config) {
                // 旧会话的确认不会再到达
                Ok(()) => ctx.credits.reset(0),
                Err(e) => {
                    error!("TX thread: link stopped after read failure: {}", e);
                    stop_link(&ctx, e.to_string());
                    break;
                },
            }
            continue;
        }

        if !ctx.credits.acquire_timeout(credit_wait) {
            if !cmd_rx.is_empty() {
                ctx.metrics.credit_waits.fetch_add(1, Ordering::Relaxed);
                trace!("TX thread: waiting for RECEIVED ({} queued)", cmd_rx.len());
            }
            continue;
        }

        let outbound = match cmd_rx.try_recv() {
            Ok(outbound) => outbound,
            Err(TryRecvError::Empty) => {
                ctx.credits.release();
                spin_sleep::sleep(idle_backoff);
                continue;
            },
            Err(TryRecvError::Disconnected) => {
                ctx.credits.release();
                trace!("TX thread: command channel disconnected");
                break;
            },
        };

        if let Err(e) = deliver(&transport, &outbound, &ctx, &config) {
            error!("TX thread: link stopped: {}", e);
            stop_link(&ctx, e.to_string());
            break;
        }
    }

    trace!("TX thread: loop exited");
}

/// 写入一条命令，写失败时重新握手并重试
fn deliver(
    transport: &SharedTransport,
    outbound: &Outbound,
    ctx: &LinkContext,
    config: &LinkConfig,
) -> Result<(), DriverError> {
    let mut retries = 0u32;
    loop {
        let result = transport.lock().write_all(&outbound.bytes);
        match result {
            Ok(()) => {
                ctx.metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
                ctx.metrics
                    .bytes_written
                    .fetch_add(outbound.bytes.len() as u64, Ordering::Relaxed);
                debug!("TX: {:?}", outbound.message);
                if !outbound.message.consumes_credit() {
                    ctx.credits.release();
                }
                return Ok(());
            },
            Err(e) => {
                ctx.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
                error!("Connection lost while writing {:?}: {}", outbound.message, e);
                if retries >= config.max_write_retries {
                    return Err(DriverError::ConnectionLost);
                }
                retries += 1;

                ctx.set_connection_state(ConnectionState::Handshaking);
                ctx.publish(LinkEvent::ConnectionLost {
                    reason: e.to_string(),
                });
                reconnect(transport, ctx, config)?;
                // 旧会话的确认不会再到达；保留本条命令占用的信用
                ctx.credits.reset(1);
            },
        }
    }
}

/// 重新握手（持有传输锁，监听线程在此期间不读取）
fn reconnect(
    transport: &SharedTransport,
    ctx: &LinkContext,
    config: &LinkConfig,
) -> Result<(), DriverError> {
    let mut guard = transport.lock();
    handshake(&mut **guard, config)?;
    ctx.session.fetch_add(1, Ordering::AcqRel);
    ctx.needs_rehandshake.store(false, Ordering::Release);
    drop(guard);

    ctx.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
    ctx.set_connection_state(ConnectionState::Connected);
    ctx.publish(LinkEvent::Reconnected);
    info!("Link re-established after handshake");
    Ok(())
}

/// 停止链路（不可恢复）
fn stop_link(ctx: &LinkContext, reason: String) {
    ctx.set_connection_state(ConnectionState::Disconnected);
    // Release: All writes before this are visible to threads that see the false value
    ctx.is_running.store(false, Ordering::Release);
    ctx.publish(LinkEvent::ConnectionFailed { reason });
}

/// 监听线程循环
///
/// 每次持锁读取一个字节（短超时，读完公平释放锁以免发送线程饥饿），
/// 送入增量解码器：
///
/// - RECEIVED：归还一个信用
/// - PIN_READ 读数：放入应答槽
/// - ERROR：记录告警
///
/// 所有解码出的消息都会转发给订阅者。
pub fn rx_loop(transport: SharedTransport, ctx: Arc<LinkContext>, config: LinkConfig) {
    #[cfg(feature = "realtime")]
    raise_thread_priority("RX");

    let read_timeout = config.read_timeout();
    let mut decoder = FrameDecoder::new(DecodeOptions::from_device())
        .with_desync_threshold(config.desync_threshold);
    let mut session = ctx.session.load(Ordering::Acquire);

    loop {
        if !ctx.is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let (result, current) = {
            let mut guard = transport.lock();
            let current = ctx.session.load(Ordering::Acquire);
            let result = guard.read_byte_timeout(read_timeout);
            MutexGuard::unlock_fair(guard);
            (result, current)
        };

        // 重新握手后丢弃半帧
        if current != session {
            decoder.reset();
            session = current;
        }

        match result {
            Ok(byte) => match decoder.push(byte) {
                DecodeEvent::Message(message) => handle_message(&ctx, message),
                DecodeEvent::Pending => {},
                DecodeEvent::Discarded(byte) => {
                    ctx.metrics.decode_discards.fetch_add(1, Ordering::Relaxed);
                    trace!("RX: discarded byte 0x{:02X}", byte);
                },
            },
            Err(SerialError::Timeout) => {},
            Err(e) if e.is_fatal() => {
                ctx.metrics.read_errors.fetch_add(1, Ordering::Relaxed);
                if ctx.connection_state() == ConnectionState::Handshaking {
                    // 发送线程正在恢复，由它决定链路去留
                    debug!("RX: read failed during handshake: {}", e);
                } else {
                    error!("Connection lost while reading: {}", e);
                    ctx.set_connection_state(ConnectionState::Handshaking);
                    ctx.needs_rehandshake.store(true, Ordering::Release);
                    ctx.publish(LinkEvent::ConnectionLost {
                        reason: e.to_string(),
                    });
                }
                spin_sleep::sleep(read_timeout);
            },
            Err(e) => {
                ctx.metrics.read_errors.fetch_add(1, Ordering::Relaxed);
                warn!("RX thread: read error: {}", e);
            },
        }
    }

    trace!("RX thread: loop exited");
}

fn handle_message(ctx: &LinkContext, message: Message) {
    ctx.metrics.messages_received.fetch_add(1, Ordering::Relaxed);
    match &message {
        Message::Received => {
            if ctx.credits.release() {
                ctx.metrics.acks_received.fetch_add(1, Ordering::Relaxed);
            } else {
                ctx.metrics.spurious_acks.fetch_add(1, Ordering::Relaxed);
                debug!("RX: RECEIVED with no command in flight");
            }
        },
        Message::PinValue { value } => {
            if !ctx.deliver_pin_value(*value) {
                warn!("RX: pin reply slot full, dropping value {}", value);
            }
        },
        Message::Error { code } => warn!("Device reported error code {}", code),
        Message::Hello | Message::AlreadyConnected => {
            debug!("RX: late handshake reply {:?}", message)
        },
        other => trace!("RX: {:?}", other),
    }
    ctx.publish(LinkEvent::Message(message));
}
