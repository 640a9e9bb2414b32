//! 驱动层错误类型定义

use ch340_protocol::{LineParameters, ProtocolError};
use ch340_usb::UsbError;
use thiserror::Error;

/// 两步寄存器编程中失败的那一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStage {
    /// 波特率字（0x1312）
    BaudWord,
    /// 线路控制字节（0x2518）
    LineControl,
}

impl std::fmt::Display for ProgramStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramStage::BaudWord => write!(f, "baud word"),
            ProgramStage::LineControl => write!(f, "line control"),
        }
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 参数无效（波特率为 0 或无法编码），在任何 I/O 之前拒绝
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] ProtocolError),

    /// 控制传输或等待超时
    #[error("Operation timeout")]
    Timeout,

    /// 设备返回的字节数不足
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// 底层传输失败（包括设备移除）
    #[error("Transport failure: {0}")]
    TransportFailure(#[source] UsbError),

    /// 波特率/帧格式的两步编程中途失败，设备配置状态未知
    #[error("Configuration indeterminate: {stage} write failed: {source}")]
    ConfigurationIndeterminate {
        stage: ProgramStage,
        #[source]
        source: Box<DriverError>,
    },

    /// 会话未打开
    #[error("Session not open")]
    NotOpen,

    /// 会话已打开
    #[error("Session already open")]
    AlreadyOpen,

    /// 状态监听线程已退出（设备已移除或会话已关闭）
    #[error("Status listener stopped")]
    ListenerStopped,

    /// 状态监听线程创建失败
    #[error("Failed to spawn status listener: {0}")]
    Spawn(#[from] std::io::Error),

    /// 设置线路参数失败，影子状态已恢复到之前的参数
    #[error("Line parameters rolled back to {restored}: {source}")]
    RolledBack {
        restored: LineParameters,
        #[source]
        source: Box<DriverError>,
    },
}

impl From<UsbError> for DriverError {
    fn from(err: UsbError) -> Self {
        match err {
            UsbError::Timeout => DriverError::Timeout,
            UsbError::ShortRead { expected, actual } => DriverError::ShortRead { expected, actual },
            other => DriverError::TransportFailure(other),
        }
    }
}

impl DriverError {
    /// 是否表示设备已不可用（需要重新挂载）
    pub fn is_fatal(&self) -> bool {
        match self {
            DriverError::TransportFailure(e) => e.is_fatal(),
            DriverError::ListenerStopped => true,
            DriverError::ConfigurationIndeterminate { source, .. }
            | DriverError::RolledBack { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}
