//! 执行器事件
//!
//! 电源请求/释放与错误通过 [`EventSink`] 发布给上层（例如电源管理）。

use crossbeam_channel::{Receiver, Sender, unbounded};

/// 执行器发布的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorEvent {
    /// 受电源管理的执行器即将运动
    PowerAcquire { actuator: u8 },
    /// 受电源管理的执行器已回到起始位置
    PowerRelease { actuator: u8 },
    /// 运动完成（末步保持时间结束）
    MoveCompleted { actuator: u8, position: i32 },
    /// 运动请求失败或中途出错
    Error { actuator: u8, message: String },
}

impl ActuatorEvent {
    pub fn actuator(&self) -> u8 {
        match self {
            Self::PowerAcquire { actuator }
            | Self::PowerRelease { actuator }
            | Self::MoveCompleted { actuator, .. }
            | Self::Error { actuator, .. } => *actuator,
        }
    }
}

/// 事件发布接口
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ActuatorEvent);
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: ActuatorEvent) {}
}

/// 通过无界通道转发事件
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: Sender<ActuatorEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, Receiver<ActuatorEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: ActuatorEvent) {
        // 接收端已关闭时静默丢弃
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards() {
        let (sink, rx) = ChannelEventSink::new();
        sink.publish(ActuatorEvent::PowerAcquire { actuator: 4 });
        assert_eq!(rx.try_recv(), Ok(ActuatorEvent::PowerAcquire { actuator: 4 }));
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelEventSink::new();
        drop(rx);
        sink.publish(ActuatorEvent::PowerRelease { actuator: 1 });
    }

    #[test]
    fn test_event_actuator() {
        let event = ActuatorEvent::Error {
            actuator: 9,
            message: "x".into(),
        };
        assert_eq!(event.actuator(), 9);
    }
}
