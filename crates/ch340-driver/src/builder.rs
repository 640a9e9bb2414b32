//! Builder 模式实现
//!
//! 提供链式构造并挂载 [`Session`] 的便捷方式。

use crate::config::SessionConfig;
use crate::error::DriverError;
use crate::events::{EventHooks, LineEvents};
use crate::session::Session;
use ch340_protocol::LineParameters;
use ch340_usb::UsbTransport;
use std::sync::Arc;
use std::time::Duration;

/// Session Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use ch340_driver::{ChannelEvents, SessionBuilder};
/// use ch340_protocol::{DataBits, LineParameters, Parity, StopBits};
/// use ch340_usb::Ch340Device;
/// use std::sync::Arc;
///
/// let (events, rx) = ChannelEvents::new(64);
/// let session = SessionBuilder::new()
///     .line_parameters(LineParameters::new(115_200, DataBits::Eight, Parity::None, StopBits::One))
///     .events(Arc::new(events))
///     .attach(Ch340Device::open_first().unwrap())
///     .unwrap();
/// session.open(session.line_parameters()).unwrap();
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    hooks: EventHooks,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换整个配置
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn control_timeout(mut self, timeout: Duration) -> Self {
        self.config.control_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// 挂载时写入的线路参数
    pub fn line_parameters(mut self, line: LineParameters) -> Self {
        self.config.default_line = line;
        self
    }

    /// 添加事件回调（可多次调用）
    pub fn events(mut self, callback: Arc<dyn LineEvents>) -> Self {
        self.hooks.add_callback(callback);
        self
    }

    /// 挂载到传输上；任何一步寄存器编程失败都会中止挂载
    pub fn attach<T: UsbTransport + 'static>(self, transport: T) -> Result<Session, DriverError> {
        Session::attach(Arc::new(transport), self.config, self.hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_settings() {
        let builder = SessionBuilder::new()
            .control_timeout(Duration::from_millis(250))
            .line_parameters(LineParameters::default().with_baud_rate(57_600));
        assert_eq!(builder.config.control_timeout_ms, 250);
        assert_eq!(builder.config.default_line.baud_rate, 57_600);
        assert!(builder.hooks.is_empty());
    }
}
