//! 脚本化的 mock 传输
//!
//! 记录所有控制请求，按寄存器对模拟设备应答；状态端点由 crossbeam channel
//! 驱动，发送端被丢弃时视为设备移除。

#![allow(dead_code)]

use bytes::Bytes;
use ch340_protocol::{REG_PAIR_BREAK, REG_PAIR_STATUS, VendorRequest};
use ch340_usb::{UsbError, UsbTransport};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Out {
        request: VendorRequest,
        value: u16,
        index: u16,
    },
    In {
        request: VendorRequest,
        value: u16,
        len: usize,
    },
}

pub fn write_reg(pair: u16, data: u16) -> Call {
    Call::Out {
        request: VendorRequest::WriteRegister,
        value: pair,
        index: data,
    }
}

pub fn handshake(wire: u16) -> Call {
    Call::Out {
        request: VendorRequest::ModemControl,
        value: wire,
        index: 0,
    }
}

pub fn read_reg(pair: u16) -> Call {
    Call::In {
        request: VendorRequest::ReadRegister,
        value: pair,
        len: 2,
    }
}

struct Failure {
    request: VendorRequest,
    value: Option<u16>,
    remaining: usize,
}

pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Vec<Failure>>,
    pub status_reg: Mutex<[u8; 2]>,
    pub break_reg: Mutex<[u8; 2]>,
    pub version: u8,
    frames: Receiver<Vec<u8>>,
    pub resumes: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, Sender<Vec<u8>>) {
        let (tx, rx) = unbounded();
        let mock = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            status_reg: Mutex::new([0xFF, 0xEE]),
            break_reg: Mutex::new([0x01, 0xC3]),
            version: 0x31,
            frames: rx,
            resumes: AtomicUsize::new(0),
        });
        (mock, tx)
    }

    /// 让后续 `times` 次匹配的请求以超时失败
    pub fn fail(&self, request: VendorRequest, value: Option<u16>, times: usize) {
        self.failures.lock().push(Failure {
            request,
            value,
            remaining: times,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn check_failure(&self, request: VendorRequest, value: u16) -> Result<(), UsbError> {
        let mut failures = self.failures.lock();
        for failure in failures.iter_mut() {
            if failure.remaining > 0
                && failure.request == request
                && failure.value.is_none_or(|v| v == value)
            {
                failure.remaining -= 1;
                return Err(UsbError::Timeout);
            }
        }
        Ok(())
    }
}

impl UsbTransport for MockTransport {
    fn control_out(
        &self,
        request: VendorRequest,
        value: u16,
        index: u16,
        _timeout: Duration,
    ) -> Result<(), UsbError> {
        self.calls.lock().push(Call::Out {
            request,
            value,
            index,
        });
        self.check_failure(request, value)?;
        if request == VendorRequest::WriteRegister && value == REG_PAIR_BREAK {
            *self.break_reg.lock() = index.to_le_bytes();
        }
        Ok(())
    }

    fn control_in(
        &self,
        request: VendorRequest,
        value: u16,
        _index: u16,
        len: usize,
        _timeout: Duration,
    ) -> Result<Bytes, UsbError> {
        self.calls.lock().push(Call::In {
            request,
            value,
            len,
        });
        self.check_failure(request, value)?;
        let data = match (request, value) {
            (VendorRequest::ReadVersion, _) => vec![self.version, 0x00],
            (VendorRequest::ReadRegister, REG_PAIR_STATUS) => self.status_reg.lock().to_vec(),
            (VendorRequest::ReadRegister, REG_PAIR_BREAK) => self.break_reg.lock().to_vec(),
            _ => vec![0; len],
        };
        Ok(Bytes::from(data))
    }

    fn read_status(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, UsbError> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            },
            Err(RecvTimeoutError::Timeout) => Err(UsbError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(UsbError::DeviceNotFound),
        }
    }

    fn resume(&self) -> Result<(), UsbError> {
        self.resumes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// 构造一个状态帧；`status` 为逻辑意义的 CTS/DSR/RI/DCD 位
pub fn status_frame(status: u8, coalesced: bool) -> Vec<u8> {
    let flags = if coalesced { 0x04 } else { 0x00 };
    vec![0x08, flags, !status, 0xEE]
}
