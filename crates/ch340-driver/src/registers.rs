//! 寄存器协议
//!
//! 每个操作是一到两次厂商控制传输，负载固定且很小。本模块不持有任何
//! 状态锁，调用方负责在传输成功后更新影子状态。

use crate::error::{DriverError, ProgramStage};
use crate::metrics::StatusMetrics;
use bytes::Bytes;
use ch340_protocol::{
    BaudWord, BreakRegister, ChipVersion, LineControl, ModemControl, ModemStatus, REG_PAIR_BAUD,
    REG_PAIR_BREAK, REG_PAIR_LCR, REG_PAIR_LEN, REG_PAIR_STATUS, VERSION_LEN, VendorRequest,
};
use ch340_usb::UsbTransport;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{error, trace};

/// 寄存器协议
pub struct RegisterProtocol {
    transport: Arc<dyn UsbTransport>,
    timeout: Duration,
    metrics: Arc<StatusMetrics>,
}

impl RegisterProtocol {
    pub fn new(
        transport: Arc<dyn UsbTransport>,
        timeout: Duration,
        metrics: Arc<StatusMetrics>,
    ) -> Self {
        Self {
            transport,
            timeout,
            metrics,
        }
    }

    fn write(&self, request: VendorRequest, value: u16, index: u16) -> Result<(), DriverError> {
        self.metrics.control_transfers.fetch_add(1, Ordering::Relaxed);
        trace!(
            "{:?}: value=0x{:04x} index=0x{:04x}",
            request, value, index
        );
        self.transport
            .control_out(request, value, index, self.timeout)
            .map_err(|e| {
                self.metrics.control_failures.fetch_add(1, Ordering::Relaxed);
                error!("{:?} (value=0x{:04x}) failed: {}", request, value, e);
                DriverError::from(e)
            })
    }

    fn read(
        &self,
        request: VendorRequest,
        value: u16,
        index: u16,
        len: usize,
    ) -> Result<Bytes, DriverError> {
        self.metrics.control_transfers.fetch_add(1, Ordering::Relaxed);
        let data = self
            .transport
            .control_in(request, value, index, len, self.timeout)
            .map_err(|e| {
                self.metrics.control_failures.fetch_add(1, Ordering::Relaxed);
                error!("{:?} (value=0x{:04x}) failed: {}", request, value, e);
                DriverError::from(e)
            })?;
        trace!("{:?}: value=0x{:04x} -> [{}]", request, value, hex::encode(&data));
        Ok(data)
    }

    /// 读取芯片版本
    pub fn query_version(&self) -> Result<ChipVersion, DriverError> {
        let data = self.read(VendorRequest::ReadVersion, 0, 0, VERSION_LEN)?;
        Ok(ChipVersion::from_bytes(&data)?)
    }

    /// 串口模式初始化
    pub fn initialize_serial_mode(&self) -> Result<(), DriverError> {
        self.write(VendorRequest::SerialInit, 0, 0)
    }

    /// 依次写入波特率字与线路控制字节
    ///
    /// 两次写入之间不是原子的：任何一步失败都返回
    /// `DriverError::ConfigurationIndeterminate`，由调用方决定是否重新同步。
    pub fn program_baud_and_frame(
        &self,
        word: BaudWord,
        line_control: LineControl,
    ) -> Result<(), DriverError> {
        self.write(VendorRequest::WriteRegister, REG_PAIR_BAUD, word.raw())
            .map_err(|e| DriverError::ConfigurationIndeterminate {
                stage: ProgramStage::BaudWord,
                source: Box::new(e),
            })?;
        self.write(
            VendorRequest::WriteRegister,
            REG_PAIR_LCR,
            u16::from(line_control.raw()),
        )
        .map_err(|e| DriverError::ConfigurationIndeterminate {
            stage: ProgramStage::LineControl,
            source: Box::new(e),
        })
    }

    /// 写入 DTR/RTS（线路上取反）
    pub fn program_handshake(&self, control: ModemControl) -> Result<(), DriverError> {
        self.write(VendorRequest::ModemControl, control.wire_value(), 0)
    }

    /// 同步读取 Modem 状态寄存器
    pub fn read_status_register(&self) -> Result<ModemStatus, DriverError> {
        let data = self.read(VendorRequest::ReadRegister, REG_PAIR_STATUS, 0, REG_PAIR_LEN)?;
        Ok(ModemStatus::from_wire(data[0]))
    }

    pub fn read_break_register(&self) -> Result<BreakRegister, DriverError> {
        let data = self.read(VendorRequest::ReadRegister, REG_PAIR_BREAK, 0, REG_PAIR_LEN)?;
        Ok(BreakRegister::from_bytes([data[0], data[1]]))
    }

    pub fn write_break_register(&self, reg: BreakRegister) -> Result<(), DriverError> {
        self.write(VendorRequest::WriteRegister, REG_PAIR_BREAK, reg.to_le_word())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ch340_usb::UsbError;
    use parking_lot::Mutex;

    /// 记录所有请求，按寄存器对返回固定数据
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(VendorRequest, u16, u16)>>,
        fail_value: Option<u16>,
        short: bool,
    }

    impl UsbTransport for RecordingTransport {
        fn control_out(
            &self,
            request: VendorRequest,
            value: u16,
            index: u16,
            _timeout: Duration,
        ) -> Result<(), UsbError> {
            if self.fail_value == Some(value) {
                return Err(UsbError::Timeout);
            }
            self.calls.lock().push((request, value, index));
            Ok(())
        }

        fn control_in(
            &self,
            request: VendorRequest,
            value: u16,
            index: u16,
            len: usize,
            _timeout: Duration,
        ) -> Result<Bytes, UsbError> {
            self.calls.lock().push((request, value, index));
            if self.short {
                return Err(UsbError::ShortRead {
                    expected: len,
                    actual: 1,
                });
            }
            let data = match (request, value) {
                (VendorRequest::ReadVersion, _) => vec![0x31, 0x00],
                (VendorRequest::ReadRegister, REG_PAIR_STATUS) => vec![!0x08, 0xEE],
                (VendorRequest::ReadRegister, REG_PAIR_BREAK) => vec![0x01, 0xC3],
                _ => vec![0; len],
            };
            Ok(Bytes::from(data))
        }

        fn read_status(&self, _buf: &mut [u8], _timeout: Duration) -> Result<usize, UsbError> {
            Err(UsbError::Timeout)
        }
    }

    fn protocol(transport: RecordingTransport) -> (RegisterProtocol, Arc<RecordingTransport>) {
        let transport = Arc::new(transport);
        let proto = RegisterProtocol::new(
            transport.clone(),
            Duration::from_millis(100),
            Arc::new(StatusMetrics::new()),
        );
        (proto, transport)
    }

    #[test]
    fn test_program_baud_and_frame_order() {
        let (proto, transport) = protocol(RecordingTransport::default());
        proto
            .program_baud_and_frame(BaudWord::from_raw(0xB282), LineControl::default_8n1())
            .unwrap();
        assert_eq!(
            *transport.calls.lock(),
            vec![
                (VendorRequest::WriteRegister, 0x1312, 0xB282),
                (VendorRequest::WriteRegister, 0x2518, 0x00C3),
            ]
        );
    }

    #[test]
    fn test_second_write_failure_is_indeterminate() {
        let (proto, transport) = protocol(RecordingTransport {
            fail_value: Some(REG_PAIR_LCR),
            ..Default::default()
        });
        let err = proto
            .program_baud_and_frame(BaudWord::from_raw(0xB282), LineControl::default_8n1())
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::ConfigurationIndeterminate {
                stage: ProgramStage::LineControl,
                ..
            }
        ));
        // 第一次写入已经生效
        assert_eq!(transport.calls.lock().len(), 1);
        assert_eq!(proto.metrics.snapshot().control_failures, 1);
    }

    #[test]
    fn test_handshake_is_inverted() {
        let (proto, transport) = protocol(RecordingTransport::default());
        proto.program_handshake(ModemControl::both(true)).unwrap();
        assert_eq!(
            transport.calls.lock()[0],
            (VendorRequest::ModemControl, 0x9F, 0)
        );
    }

    #[test]
    fn test_reads() {
        let (proto, _) = protocol(RecordingTransport::default());
        assert_eq!(proto.query_version().unwrap(), ChipVersion(0x31));
        let status = proto.read_status_register().unwrap();
        assert_eq!(status.bits(), 0x08);
        let reg = proto.read_break_register().unwrap();
        assert_eq!(reg, BreakRegister::from_bytes([0x01, 0xC3]));
    }

    #[test]
    fn test_short_read_maps_to_driver_error() {
        let (proto, _) = protocol(RecordingTransport {
            short: true,
            ..Default::default()
        });
        assert!(matches!(
            proto.read_status_register(),
            Err(DriverError::ShortRead {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_write_break_register() {
        let (proto, transport) = protocol(RecordingTransport::default());
        let reg = BreakRegister::from_bytes([0x01, 0xC3]).with_break(true);
        proto.write_break_register(reg).unwrap();
        assert_eq!(
            transport.calls.lock()[0],
            (VendorRequest::WriteRegister, 0x1805, 0x8300)
        );
    }
}
