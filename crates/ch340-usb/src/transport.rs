//! 控制传输抽象
//!
//! [`UsbTransport`] 是驱动层与 USB 之间唯一的接缝：同步的厂商控制请求，
//! 加上对状态通知端点的带超时阻塞读取。真实设备由 [`crate::Ch340Device`]
//! 实现，测试中由脚本化的 mock 实现。

use crate::UsbError;
use bytes::Bytes;
use ch340_protocol::VendorRequest;
use std::sync::Arc;
use std::time::Duration;

/// 厂商控制请求传输
///
/// 所有方法均为阻塞调用，在完成或超时前不返回；实现必须是 `Sync`，
/// 因为状态监听线程与控制面线程会并发使用同一个传输。
pub trait UsbTransport: Send + Sync {
    /// 无数据阶段的 OUT 请求
    fn control_out(
        &self,
        request: VendorRequest,
        value: u16,
        index: u16,
        timeout: Duration,
    ) -> Result<(), UsbError>;

    /// IN 请求；返回字节数少于 `len` 时失败并返回 `UsbError::ShortRead`
    fn control_in(
        &self,
        request: VendorRequest,
        value: u16,
        index: u16,
        len: usize,
        timeout: Duration,
    ) -> Result<Bytes, UsbError>;

    /// 从状态通知端点读取一帧
    ///
    /// 超时返回 `UsbError::Timeout`（非致命，调用方应重新等待）。
    fn read_status(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, UsbError>;

    /// 总线复位后的传输层恢复（清除端点 Halt 等）
    fn resume(&self) -> Result<(), UsbError> {
        Ok(())
    }
}

impl<T: UsbTransport + ?Sized> UsbTransport for Arc<T> {
    fn control_out(
        &self,
        request: VendorRequest,
        value: u16,
        index: u16,
        timeout: Duration,
    ) -> Result<(), UsbError> {
        (**self).control_out(request, value, index, timeout)
    }

    fn control_in(
        &self,
        request: VendorRequest,
        value: u16,
        index: u16,
        len: usize,
        timeout: Duration,
    ) -> Result<Bytes, UsbError> {
        (**self).control_in(request, value, index, len, timeout)
    }

    fn read_status(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, UsbError> {
        (**self).read_status(buf, timeout)
    }

    fn resume(&self) -> Result<(), UsbError> {
        (**self).resume()
    }
}

/// 校验 IN 请求的返回长度
pub fn check_length(expected: usize, actual: usize) -> Result<(), UsbError> {
    if actual < expected {
        return Err(UsbError::ShortRead { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 只记录调用次数的传输
    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    impl UsbTransport for CountingTransport {
        fn control_out(
            &self,
            _request: VendorRequest,
            _value: u16,
            _index: u16,
            _timeout: Duration,
        ) -> Result<(), UsbError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn control_in(
            &self,
            _request: VendorRequest,
            _value: u16,
            _index: u16,
            len: usize,
            _timeout: Duration,
        ) -> Result<Bytes, UsbError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(Bytes::from(vec![0u8; len]))
        }

        fn read_status(&self, _buf: &mut [u8], _timeout: Duration) -> Result<usize, UsbError> {
            Err(UsbError::Timeout)
        }
    }

    #[test]
    fn test_arc_forwards_calls() {
        let inner = Arc::new(CountingTransport::default());
        let shared: Arc<dyn UsbTransport> = inner.clone();

        shared
            .control_out(VendorRequest::SerialInit, 0, 0, Duration::from_millis(10))
            .unwrap();
        let data = shared
            .control_in(VendorRequest::ReadVersion, 0, 0, 2, Duration::from_millis(10))
            .unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(inner.calls.load(Ordering::Relaxed), 2);

        // 默认 resume 为空操作
        assert!(shared.resume().is_ok());
        let mut buf = [0u8; 4];
        assert!(shared.read_status(&mut buf, Duration::ZERO).unwrap_err().is_timeout());
    }

    #[test]
    fn test_check_length() {
        assert!(check_length(2, 2).is_ok());
        assert!(check_length(2, 8).is_ok());
        assert!(matches!(
            check_length(2, 1),
            Err(UsbError::ShortRead {
                expected: 2,
                actual: 1
            })
        ));
    }
}
