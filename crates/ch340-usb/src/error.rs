//! USB 传输错误类型

use thiserror::Error;

/// USB 传输错误类型
#[derive(Error, Debug)]
pub enum UsbError {
    /// 控制传输或状态端点读取超时
    #[error("USB transfer timed out")]
    Timeout,

    /// 设备返回的字节数少于请求值
    #[error("Short read from device: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// 底层传输错误（来自 rusb）
    #[error("USB transport error: {0}")]
    Transport(#[source] rusb::Error),

    /// 设备未找到
    #[error("Device not found")]
    DeviceNotFound,

    /// 接口上没有中断 IN 端点
    #[error("Interrupt IN endpoint not found")]
    EndpointNotFound,
}

impl From<rusb::Error> for UsbError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Timeout => UsbError::Timeout,
            other => UsbError::Transport(other),
        }
    }
}

impl UsbError {
    /// 检查是否为超时错误
    pub fn is_timeout(&self) -> bool {
        matches!(self, UsbError::Timeout)
    }

    /// 是否为致命错误（设备已移除或不可访问），此后不应再发起任何传输
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UsbError::DeviceNotFound
                | UsbError::Transport(
                    rusb::Error::NoDevice | rusb::Error::NotFound | rusb::Error::Access
                )
        )
    }
}
