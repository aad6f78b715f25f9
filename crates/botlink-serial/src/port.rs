//! serialport 串口适配器
//!
//! 面向 Arduino 类微控制器的 USB 串口（8N1，无流控）。
//!
//! ## 限制
//!
//! - 未启用 libudev，端口枚举只返回设备路径
//! - **权限要求**：Linux 下通常需要 `dialout` 组权限

use crate::{SerialDeviceError, SerialDeviceErrorKind, SerialError, SerialTransport};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info, trace};

/// 固件默认波特率
pub const DEFAULT_BAUD: u32 = 115_200;

/// 打开串口的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortConfig {
    pub path: String,
    pub baud: u32,
    /// 初始读超时
    pub read_timeout: Duration,
}

impl SerialPortConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud: DEFAULT_BAUD,
            read_timeout: Duration::from_millis(2),
        }
    }

    pub fn baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }
}

/// 基于 `serialport` crate 的传输
pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,
    path: String,
    read_timeout: Duration,
}

impl std::fmt::Debug for SerialPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortTransport")
            .field("path", &self.path)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl SerialPortTransport {
    /// 以默认参数打开串口
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use botlink_serial::SerialPortTransport;
    ///
    /// let port = SerialPortTransport::open("/dev/ttyACM0", 115_200).unwrap();
    /// ```
    pub fn open(path: impl Into<String>, baud: u32) -> Result<Self, SerialError> {
        Self::with_config(SerialPortConfig::new(path).baud(baud))
    }

    pub fn with_config(config: SerialPortConfig) -> Result<Self, SerialError> {
        if config.baud == 0 {
            return Err(SerialDeviceError::new(
                SerialDeviceErrorKind::InvalidConfig,
                "baud rate must be positive",
            )
            .into());
        }

        let port = serialport::new(config.path.as_str(), config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| map_open_error(&config.path, e))?;

        info!(
            "Opened serial port {} at {} baud",
            config.path, config.baud
        );

        Ok(Self {
            port,
            path: config.path,
            read_timeout: config.read_timeout,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn map_open_error(path: &str, e: serialport::Error) -> SerialError {
    let kind = match e.kind() {
        serialport::ErrorKind::NoDevice => SerialDeviceErrorKind::NoDevice,
        serialport::ErrorKind::InvalidInput => SerialDeviceErrorKind::InvalidConfig,
        serialport::ErrorKind::Io(ErrorKind::NotFound) => SerialDeviceErrorKind::NotFound,
        serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
            SerialDeviceErrorKind::AccessDenied
        },
        serialport::ErrorKind::Io(_) => SerialDeviceErrorKind::Backend,
        _ => SerialDeviceErrorKind::Unknown,
    };
    SerialDeviceError::new(kind, format!("Failed to open '{}': {}", path, e)).into()
}

fn map_io_error(e: std::io::Error) -> SerialError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => SerialError::Timeout,
        _ => SerialError::Io(e),
    }
}

impl SerialTransport for SerialPortTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(bytes).map_err(SerialError::Io)?;
        self.port.flush().map_err(SerialError::Io)?;
        trace!("serial tx {} bytes", bytes.len());
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, SerialError> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            // 非阻塞端口在无数据时返回 0
            Ok(_) => Err(SerialError::Timeout),
            Err(e) => Err(map_io_error(e)),
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        if timeout == self.read_timeout {
            return;
        }
        match self.port.set_timeout(timeout) {
            Ok(()) => self.read_timeout = timeout,
            Err(e) => debug!("Failed to set read timeout on {}: {}", self.path, e),
        }
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.port.clear(ClearBuffer::Input).map_err(|e| {
            SerialError::Device(SerialDeviceError::new(
                SerialDeviceErrorKind::Backend,
                e.to_string(),
            ))
        })
    }
}

/// 列出系统中可用的串口路径
pub fn available_ports() -> Result<Vec<String>, SerialError> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|e| {
            SerialError::Device(SerialDeviceError::new(
                SerialDeviceErrorKind::Backend,
                e.to_string(),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SerialPortConfig::new("/dev/ttyUSB0");
        assert_eq!(config.baud, DEFAULT_BAUD);
        assert_eq!(config.baud(9600).baud, 9600);
    }

    #[test]
    fn test_zero_baud_rejected() {
        let err = SerialPortTransport::with_config(SerialPortConfig::new("/dev/null").baud(0))
            .unwrap_err();
        match err {
            SerialError::Device(e) => assert_eq!(e.kind, SerialDeviceErrorKind::InvalidConfig),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_open_missing_device_fails() {
        let result = SerialPortTransport::open("/dev/botlink-does-not-exist", DEFAULT_BAUD);
        assert!(matches!(result, Err(SerialError::Device(_))));
    }

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let e = map_io_error(std::io::Error::from(ErrorKind::TimedOut));
        assert!(matches!(e, SerialError::Timeout));
        let e = map_io_error(std::io::Error::from(ErrorKind::BrokenPipe));
        assert!(e.is_fatal());
    }
}
