//! 会话配置
//!
//! [`SessionConfig`] 是纯数据（POD），可以从配置文件反序列化；运行时组件
//! （传输、事件回调）由 [`crate::SessionBuilder`] 另行注入。

use ch340_protocol::{DEFAULT_CONTROL_TIMEOUT, LineParameters, STATUS_FRAME_LEN};
use std::time::Duration;

/// 会话配置
///
/// # Example
///
/// ```
/// use ch340_driver::SessionConfig;
///
/// let config = SessionConfig {
///     control_timeout_ms: 500,
///     ..Default::default()
/// };
/// assert_eq!(config.status_poll_ms, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// 每次控制传输的超时（毫秒）
    pub control_timeout_ms: u64,
    /// 状态端点单次阻塞读取的最长等待（毫秒），到期后检查取消标志
    pub status_poll_ms: u64,
    /// 状态端点读缓冲区大小（至少 4 字节）
    pub status_buffer_len: usize,
    /// 关闭时等待监听线程退出的上限（毫秒）
    pub join_timeout_ms: u64,
    /// 非致命端点错误后的退避时间（毫秒）
    pub error_backoff_ms: u64,
    /// 挂载时写入设备的线路参数
    pub default_line: LineParameters,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            control_timeout_ms: DEFAULT_CONTROL_TIMEOUT.as_millis() as u64,
            status_poll_ms: 100,
            status_buffer_len: 8,
            join_timeout_ms: 2000,
            error_backoff_ms: 10,
            default_line: LineParameters::default(),
        }
    }
}

impl SessionConfig {
    /// 实际使用的控制传输超时（至少 1ms）
    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms.max(1))
    }

    /// 实际使用的轮询超时（至少 1ms；0 在 libusb 中表示无限等待）
    pub fn status_poll(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// 实际使用的读缓冲区大小（不小于一帧）
    pub fn status_buffer_len(&self) -> usize {
        self.status_buffer_len.max(STATUS_FRAME_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.control_timeout(), Duration::from_millis(1000));
        assert_eq!(config.status_poll(), Duration::from_millis(100));
        assert_eq!(config.join_timeout(), Duration::from_secs(2));
        assert_eq!(config.default_line, LineParameters::default());
    }

    #[test]
    fn test_status_poll_floor() {
        let config = SessionConfig {
            status_poll_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.status_poll(), Duration::from_millis(1));

        let config = SessionConfig {
            control_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.control_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_status_buffer_len_floor() {
        let config = SessionConfig {
            status_buffer_len: 1,
            ..Default::default()
        };
        assert_eq!(config.status_buffer_len(), STATUS_FRAME_LEN);
    }
}
