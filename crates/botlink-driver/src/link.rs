//! Link API 模块
//!
//! 对外的 `Link` 结构体，封装命令队列、信用池与两条 IO 线程。

use crate::config::LinkConfig;
use crate::error::DriverError;
use crate::handshake::{HandshakeReply, handshake};
use crate::metrics::LinkMetricsSnapshot;
use crate::pipeline::{Outbound, SharedTransport, rx_loop, tx_loop};
use crate::state::{ConnectionState, LinkContext, LinkEvent};
use botlink_protocol::Message;
use botlink_serial::SerialTransport;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // Watchdog thread joins the target thread
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 与一块微控制器之间的命令链路
///
/// - 所有命令经过同一个有界 FIFO 队列，按入队顺序写入
/// - 同时在途的未确认命令数不超过 `credit_capacity`
/// - 写失败时自动重新握手并重试；重试失败后链路停止
///
/// 多个执行器通过 `Arc<Link>` 共享同一条链路（共享同一个信用池）。
///
/// # 示例
///
/// ```no_run
/// use botlink_driver::{Link, LinkConfig};
/// use botlink_serial::SerialPortTransport;
///
/// let port = SerialPortTransport::open("/dev/ttyACM0", 115_200).unwrap();
/// let link = Link::connect(port, LinkConfig::default()).unwrap();
/// link.servo(0, 1500).unwrap();
/// ```
pub struct Link {
    cmd_tx: Sender<Outbound>,
    ctx: Arc<LinkContext>,
    config: LinkConfig,
    tx_thread: Mutex<Option<JoinHandle<()>>>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    pin_reply_rx: Receiver<i16>,
    /// 串行化 `read_pin`，保证应答与请求一一对应
    pin_read_gate: Mutex<()>,
    handshake_reply: HandshakeReply,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("state", &self.connection_state())
            .field("queued", &self.cmd_tx.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Link {
    /// 握手并启动发送/监听线程
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 配置无效
    /// - `DriverError::HandshakeFailed`: 固件在限定次数内没有应答
    /// - `DriverError::IoThread`: 无法创建线程
    pub fn connect(
        transport: impl SerialTransport + Send + 'static,
        config: LinkConfig,
    ) -> Result<Self, DriverError> {
        config.validate()?;

        let (ctx, pin_reply_rx) = LinkContext::new(config.credit_capacity);
        let ctx = Arc::new(ctx);

        let mut transport: Box<dyn SerialTransport + Send> = Box::new(transport);
        ctx.set_connection_state(ConnectionState::Handshaking);
        let handshake_reply = match handshake(&mut *transport, &config) {
            Ok(reply) => reply,
            Err(e) => {
                ctx.set_connection_state(ConnectionState::Disconnected);
                return Err(e);
            },
        };
        ctx.set_connection_state(ConnectionState::Connected);

        let transport: SharedTransport = Arc::new(Mutex::new(transport));
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded::<Outbound>(config.queue_capacity);

        let rx_thread = {
            let (transport, ctx, config) = (transport.clone(), ctx.clone(), config.clone());
            std::thread::Builder::new()
                .name("botlink-rx".to_string())
                .spawn(move || rx_loop(transport, ctx, config))
                .map_err(|e| DriverError::IoThread(e.to_string()))?
        };

        let tx_thread = {
            let (ctx_tx, config_tx) = (ctx.clone(), config.clone());
            match std::thread::Builder::new()
                .name("botlink-tx".to_string())
                .spawn(move || tx_loop(transport, cmd_rx, ctx_tx, config_tx))
            {
                Ok(handle) => handle,
                Err(e) => {
                    ctx.is_running.store(false, Ordering::Release);
                    let _ = rx_thread.join_timeout(JOIN_TIMEOUT);
                    return Err(DriverError::IoThread(e.to_string()));
                },
            }
        };

        info!(
            "Link connected (credits: {}, queue: {})",
            config.credit_capacity, config.queue_capacity
        );

        Ok(Self {
            cmd_tx,
            ctx,
            config,
            tx_thread: Mutex::new(Some(tx_thread)),
            rx_thread: Mutex::new(Some(rx_thread)),
            pin_reply_rx,
            pin_read_gate: Mutex::new(()),
            handshake_reply,
        })
    }

    /// 入队一条消息（FIFO）
    ///
    /// 队列满时最多阻塞 `send_timeout_ms`。
    pub fn send(&self, message: Message) -> Result<(), DriverError> {
        self.ensure_open()?;
        let outbound = Outbound::new(message)?;
        match self.cmd_tx.send_timeout(outbound, self.config.send_timeout()) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(DriverError::Timeout),
            Err(SendTimeoutError::Disconnected(_)) => Err(DriverError::ChannelClosed),
        }
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.ctx.is_running() {
            return Ok(());
        }
        match self.ctx.connection_state() {
            ConnectionState::Disconnected if self.tx_thread.lock().is_some() => {
                Err(DriverError::ConnectionLost)
            },
            _ => Err(DriverError::ChannelClosed),
        }
    }

    /// 舵机绝对位置（原始单位）
    pub fn servo(&self, id: i8, position: i16) -> Result<(), DriverError> {
        self.send(Message::Servo { id, position })
    }

    /// 舵机相对位置（原始单位）
    pub fn servo_relative(&self, id: i8, delta: i16) -> Result<(), DriverError> {
        self.send(Message::ServoRelative { id, delta })
    }

    /// 单颗 LED 亮度
    pub fn set_led(&self, index: u8, intensity: i16) -> Result<(), DriverError> {
        self.send(Message::LedSingle { index, intensity })
    }

    /// 多颗 LED 颜色
    pub fn set_led_color(
        &self,
        indices: impl IntoIterator<Item = u8>,
        rgb: (u8, u8, u8),
    ) -> Result<(), DriverError> {
        self.send(Message::led_color(indices, rgb))
    }

    /// 数字引脚输出
    pub fn write_pin(&self, pin: u8, high: bool) -> Result<(), DriverError> {
        self.send(Message::Pin { pin, high })
    }

    /// 读取引脚（模拟量）
    ///
    /// 请求与其他命令一样排队；`timeout` 覆盖排队与等待应答的总时间。
    pub fn read_pin(&self, pin: u8, timeout: Duration) -> Result<i16, DriverError> {
        let deadline = Instant::now() + timeout;
        let _gate = self.pin_read_gate.lock();

        // 丢弃此前超时请求迟到的应答
        while self.pin_reply_rx.try_recv().is_ok() {}

        self.send(Message::PinRead { pin })?;
        self.pin_reply_rx
            .recv_deadline(deadline)
            .map_err(|_| DriverError::Timeout)
    }

    /// 请求固件停止
    pub fn stop(&self) -> Result<(), DriverError> {
        self.send(Message::Stop)
    }

    /// 订阅链路事件（固件消息与连接状态变化）
    pub fn subscribe(&self) -> Receiver<LinkEvent> {
        self.ctx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.ctx.connection_state()
    }

    /// 初次握手时固件的应答
    pub fn handshake_reply(&self) -> HandshakeReply {
        self.handshake_reply
    }

    pub fn metrics(&self) -> LinkMetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.ctx.metrics.reset();
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// 队列中尚未写出的命令数
    pub fn queued(&self) -> usize {
        self.cmd_tx.len()
    }

    /// 已写出但未确认的命令数
    pub fn in_flight(&self) -> usize {
        self.ctx.credits.in_flight()
    }

    /// 等待队列清空且所有命令都被确认
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.cmd_tx.is_empty() && self.in_flight() == 0 {
                return true;
            }
            if Instant::now() >= deadline || !self.ctx.is_running() {
                return false;
            }
            spin_sleep::sleep(Duration::from_micros(500));
        }
    }

    /// 检查线程健康状态
    ///
    /// # 返回
    /// - `(rx_alive, tx_alive)`
    pub fn check_health(&self) -> (bool, bool) {
        let rx_alive = self
            .rx_thread
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false);
        let tx_alive = self
            .tx_thread
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false);
        (rx_alive, tx_alive)
    }

    /// 两条线程都在运行且已连接
    pub fn is_healthy(&self) -> bool {
        let (rx_alive, tx_alive) = self.check_health();
        rx_alive && tx_alive && self.connection_state().is_connected()
    }

    /// 停止 IO 线程（幂等）
    ///
    /// 队列中尚未写出的命令被丢弃。
    pub fn shutdown(&self) {
        // Release: All writes before this are visible to threads that see the false value
        self.ctx.is_running.store(false, Ordering::Release);

        let rx_handle = self.rx_thread.lock().take();
        if let Some(handle) = rx_handle
            && let Err(_e) = handle.join_timeout(JOIN_TIMEOUT)
        {
            error!(
                "RX thread panicked or failed to shut down within {:?}",
                JOIN_TIMEOUT
            );
        }

        let tx_handle = self.tx_thread.lock().take();
        if let Some(handle) = tx_handle
            && let Err(_e) = handle.join_timeout(JOIN_TIMEOUT)
        {
            error!(
                "TX thread panicked or failed to shut down within {:?}",
                JOIN_TIMEOUT
            );
        }

        if self.connection_state() != ConnectionState::Disconnected {
            self.ctx.set_connection_state(ConnectionState::Disconnected);
            info!("Link shut down");
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botlink_serial::MockDevice;

    fn fast_config() -> LinkConfig {
        LinkConfig {
            handshake_retry_interval_ms: 20,
            handshake_max_attempts: 2,
            ..LinkConfig::default()
        }
    }

    #[test]
    fn test_connect_and_drop() {
        let (device, handle) = MockDevice::new();
        let link = Link::connect(device, fast_config()).unwrap();
        assert_eq!(link.connection_state(), ConnectionState::Connected);
        assert_eq!(link.handshake_reply(), HandshakeReply::Hello);
        assert!(link.is_healthy());
        assert!(handle.is_connected());
        drop(link);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (device, _handle) = MockDevice::new();
        let config = LinkConfig {
            queue_capacity: 0,
            ..fast_config()
        };
        assert!(matches!(
            Link::connect(device, config),
            Err(DriverError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let (device, _handle) = MockDevice::new();
        let link = Link::connect(device, fast_config()).unwrap();
        link.shutdown();
        assert!(!link.is_healthy());
        assert!(matches!(link.stop(), Err(DriverError::ChannelClosed)));
        // 幂等
        link.shutdown();
    }

    #[test]
    fn test_encode_error_is_reported_to_caller() {
        let (device, _handle) = MockDevice::new();
        let link = Link::connect(device, fast_config()).unwrap();
        let result = link.set_led_color(std::iter::empty::<u8>(), (1, 2, 3));
        assert!(matches!(result, Err(DriverError::Protocol(_))));
    }
}
