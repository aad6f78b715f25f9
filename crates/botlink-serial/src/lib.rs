//! # Botlink Serial Transport Layer
//!
//! 串口字节流抽象层。协议层只关心字节，物理参数（波特率、校验位）
//! 由具体适配器在打开时配置。

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serialport")]
pub mod port;

#[cfg(feature = "serialport")]
pub use port::{DEFAULT_BAUD, SerialPortConfig, SerialPortTransport, available_ports};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockDevice, MockHandle};

/// 串口层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] SerialDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Device disconnected")]
    Disconnected,
}

impl SerialError {
    /// 是否为链路丢失类错误（需要重新握手）
    ///
    /// 超时不是故障：读取端在没有数据时会周期性超时。
    pub fn is_fatal(&self) -> bool {
        match self {
            SerialError::Timeout => false,
            SerialError::Disconnected => true,
            SerialError::Device(e) => e.is_fatal(),
            SerialError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    InvalidConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct SerialDeviceError {
    pub kind: SerialDeviceErrorKind,
    pub message: String,
}

impl SerialDeviceError {
    pub fn new(kind: SerialDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            SerialDeviceErrorKind::NoDevice
                | SerialDeviceErrorKind::AccessDenied
                | SerialDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for SerialDeviceError {
    fn from(message: String) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for SerialDeviceError {
    fn from(message: &str) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

/// 全双工字节流
///
/// 写入整段字节；按字节读取，读取超时返回 [`SerialError::Timeout`]。
pub trait SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError>;
    fn read_byte(&mut self) -> Result<u8, SerialError>;
    fn set_read_timeout(&mut self, _timeout: Duration) {}
    fn read_byte_timeout(&mut self, timeout: Duration) -> Result<u8, SerialError> {
        self.set_read_timeout(timeout);
        self.read_byte()
    }
    fn try_read_byte(&mut self) -> Result<Option<u8>, SerialError> {
        match self.read_byte_timeout(Duration::ZERO) {
            Ok(byte) => Ok(Some(byte)),
            Err(SerialError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
    /// 丢弃输入缓冲区中尚未读取的字节
    fn clear_input(&mut self) -> Result<(), SerialError> {
        Ok(())
    }
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        (**self).write_all(bytes)
    }

    fn read_byte(&mut self) -> Result<u8, SerialError> {
        (**self).read_byte()
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        (**self).set_read_timeout(timeout)
    }

    fn read_byte_timeout(&mut self, timeout: Duration) -> Result<u8, SerialError> {
        (**self).read_byte_timeout(timeout)
    }

    fn try_read_byte(&mut self) -> Result<Option<u8>, SerialError> {
        (**self).try_read_byte()
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        (**self).clear_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct BufferTransport {
        input: VecDeque<u8>,
        output: Vec<u8>,
    }

    impl SerialTransport for BufferTransport {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
            self.output.extend_from_slice(bytes);
            Ok(())
        }

        fn read_byte(&mut self) -> Result<u8, SerialError> {
            self.input.pop_front().ok_or(SerialError::Timeout)
        }
    }

    #[test]
    fn test_try_read_byte_maps_timeout_to_none() {
        let mut transport = BufferTransport {
            input: VecDeque::from(vec![0x05]),
            output: Vec::new(),
        };
        assert_eq!(transport.try_read_byte().unwrap(), Some(0x05));
        assert_eq!(transport.try_read_byte().unwrap(), None);
    }

    #[test]
    fn test_boxed_transport_forwards() {
        let mut boxed: Box<dyn SerialTransport + Send> = Box::new(BufferTransport {
            input: VecDeque::from(vec![0x00]),
            output: Vec::new(),
        });
        boxed.write_all(&[0x01, 0x02]).unwrap();
        assert_eq!(boxed.read_byte().unwrap(), 0x00);
        assert!(matches!(boxed.read_byte(), Err(SerialError::Timeout)));
    }

    #[test]
    fn test_is_fatal() {
        assert!(!SerialError::Timeout.is_fatal());
        assert!(SerialError::Disconnected.is_fatal());
        assert!(
            SerialError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_fatal()
        );
        assert!(
            !SerialError::Io(std::io::Error::from(std::io::ErrorKind::Interrupted)).is_fatal()
        );
        assert!(
            SerialError::Device(SerialDeviceError::new(
                SerialDeviceErrorKind::NoDevice,
                "unplugged"
            ))
            .is_fatal()
        );
        assert!(!SerialError::Device("glitch".into()).is_fatal());
    }

    #[test]
    fn test_device_error_display() {
        let e = SerialDeviceError::new(SerialDeviceErrorKind::AccessDenied, "/dev/ttyACM0");
        assert_eq!(format!("{}", e), "AccessDenied: /dev/ttyACM0");
    }
}
