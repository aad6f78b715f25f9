//! 连接状态与线程间共享上下文

use crate::credit::CreditPool;
use crate::metrics::LinkMetrics;
use arc_swap::ArcSwap;
use botlink_protocol::Message;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use tracing::trace;

/// 连接状态
///
/// - **Disconnected**: 未连接，或重新握手失败后链路已停止
/// - **Handshaking**: 正在（重新）握手，写失败后进入
/// - **Connected**: 握手完成，可以发送命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Handshaking = 1,
    Connected = 2,
}

impl ConnectionState {
    /// 从 u8 转换，无效值视为 Disconnected
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Handshaking,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// 连接状态（原子版本，用于线程间共享）
#[derive(Debug)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: ConnectionState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

/// 链路事件（发布给订阅者）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// 固件发来的消息（包括 RECEIVED）
    Message(Message),
    /// 写入失败，开始重新握手
    ConnectionLost { reason: String },
    /// 重新握手成功
    Reconnected,
    /// 重新握手失败，链路已停止
    ConnectionFailed { reason: String },
}

/// 订阅者事件队列容量；满时丢弃新事件
pub const SUBSCRIBER_CAPACITY: usize = 256;

/// 引脚读数应答槽容量
pub(crate) const PIN_REPLY_CAPACITY: usize = 4;

/// 发送线程、监听线程与 `Link` 共享的上下文
#[derive(Debug)]
pub struct LinkContext {
    /// 运行标志（线程生命周期联动）
    pub is_running: AtomicBool,
    pub state: AtomicConnectionState,
    pub credits: CreditPool,
    pub metrics: LinkMetrics,
    /// 每次（重新）握手成功后递增，监听线程据此重置解码器
    pub session: AtomicU64,
    /// 监听线程读失败后置位，由发送线程重新握手
    pub needs_rehandshake: AtomicBool,
    subscribers: ArcSwap<Vec<Sender<LinkEvent>>>,
    pin_reply_tx: Sender<i16>,
}

impl LinkContext {
    pub fn new(credit_capacity: usize) -> (Self, Receiver<i16>) {
        let (pin_reply_tx, pin_reply_rx) = crossbeam_channel::bounded(PIN_REPLY_CAPACITY);
        (
            Self {
                is_running: AtomicBool::new(true),
                state: AtomicConnectionState::new(ConnectionState::Disconnected),
                credits: CreditPool::new(credit_capacity),
                metrics: LinkMetrics::new(),
                session: AtomicU64::new(0),
                needs_rehandshake: AtomicBool::new(false),
                subscribers: ArcSwap::from_pointee(Vec::new()),
                pin_reply_tx,
            },
            pin_reply_rx,
        )
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.get(Ordering::Acquire)
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        self.state.set(state, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 注册新的订阅者
    pub fn subscribe(&self) -> Receiver<LinkEvent> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_CAPACITY);
        self.subscribers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(tx.clone());
            next
        });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load().len()
    }

    /// 向所有订阅者发布事件，并移除已断开的订阅者
    pub fn publish(&self, event: LinkEvent) {
        let subscribers = self.subscribers.load();
        let mut closed = Vec::new();
        for tx in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => {},
                Err(TrySendError::Full(_)) => trace!("Subscriber queue full, dropping event"),
                Err(TrySendError::Disconnected(_)) => closed.push(tx.clone()),
            }
        }
        if !closed.is_empty() {
            self.subscribers.rcu(|current| {
                current
                    .iter()
                    .filter(|s| !closed.iter().any(|c| c.same_channel(s)))
                    .cloned()
                    .collect::<Vec<_>>()
            });
        }
    }

    /// 放入引脚读数应答
    pub(crate) fn deliver_pin_value(&self, value: i16) -> bool {
        self.pin_reply_tx.try_send(value).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_roundtrip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Handshaking,
            ConnectionState::Connected,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ConnectionState::from_u8(200), ConnectionState::Disconnected);
    }

    #[test]
    fn test_atomic_connection_state() {
        let state = AtomicConnectionState::default();
        assert_eq!(state.get(Ordering::Relaxed), ConnectionState::Disconnected);
        state.set(ConnectionState::Connected, Ordering::Relaxed);
        assert!(state.get(Ordering::Relaxed).is_connected());
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let (ctx, _pin_rx) = LinkContext::new(1);
        let a = ctx.subscribe();
        let b = ctx.subscribe();
        ctx.publish(LinkEvent::Reconnected);
        assert_eq!(a.try_recv().unwrap(), LinkEvent::Reconnected);
        assert_eq!(b.try_recv().unwrap(), LinkEvent::Reconnected);
    }

    #[test]
    fn test_publish_prunes_closed_subscribers() {
        let (ctx, _pin_rx) = LinkContext::new(1);
        let kept = ctx.subscribe();
        drop(ctx.subscribe());
        assert_eq!(ctx.subscriber_count(), 2);

        ctx.publish(LinkEvent::Message(Message::Received));
        assert_eq!(ctx.subscriber_count(), 1);
        assert_eq!(
            kept.try_recv().unwrap(),
            LinkEvent::Message(Message::Received)
        );
    }

    #[test]
    fn test_pin_reply_slot_is_bounded() {
        let (ctx, pin_rx) = LinkContext::new(1);
        for value in 0..PIN_REPLY_CAPACITY as i16 {
            assert!(ctx.deliver_pin_value(value));
        }
        assert!(!ctx.deliver_pin_value(99));
        assert_eq!(pin_rx.try_recv().unwrap(), 0);
    }
}
