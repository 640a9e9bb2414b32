//! CH340 设备操作
//!
//! 基于 rusb 的设备扫描、接口声明与厂商控制传输。

use bytes::Bytes;
use ch340_protocol::{VendorRequest, is_ch340_device};
use rusb::{DeviceHandle, Direction, GlobalContext, Recipient, RequestType, TransferType};
use std::time::Duration;
use tracing::{debug, error, trace};

use crate::error::UsbError;
use crate::transport::{UsbTransport, check_length};

/// 设备过滤条件
///
/// 所有字段均为可选；未设置的字段不参与匹配。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub bus: Option<u8>,
    pub address: Option<u8>,
    /// 序列号匹配区分大小写
    pub serial_number: Option<String>,
}

impl DeviceFilter {
    fn matches_location(&self, bus: u8, address: u8) -> bool {
        self.bus.is_none_or(|b| b == bus) && self.address.is_none_or(|a| a == address)
    }
}

/// 扫描得到的设备信息（不持有句柄）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub bus: u8,
    pub address: u8,
    pub serial_number: Option<String>,
}

/// CH340 设备句柄
pub struct Ch340Device {
    handle: DeviceHandle<GlobalContext>,
    interface_number: u8,
    status_endpoint: u8,
    /// 记录是否已经 claim 了接口（用于正确的资源清理）
    interface_claimed: bool,
    info: DeviceInfo,
}

impl Ch340Device {
    /// 扫描所有 CH340 设备
    pub fn scan() -> Result<Vec<DeviceInfo>, UsbError> {
        let mut found = Vec::new();
        for device in rusb::devices()?.iter() {
            let desc = match device.device_descriptor() {
                Ok(desc) => desc,
                Err(_) => continue,
            };
            if !is_ch340_device(desc.vendor_id(), desc.product_id()) {
                continue;
            }
            let serial_number = device
                .open()
                .ok()
                .and_then(|handle| read_serial(&handle, &desc));
            found.push(DeviceInfo {
                bus: device.bus_number(),
                address: device.address(),
                serial_number,
            });
        }
        Ok(found)
    }

    /// 打开第一个找到的设备
    pub fn open_first() -> Result<Self, UsbError> {
        Self::open_with_filter(&DeviceFilter::default())
    }

    /// 打开第一个匹配过滤条件的设备，并声明接口 0
    pub fn open_with_filter(filter: &DeviceFilter) -> Result<Self, UsbError> {
        for device in rusb::devices()?.iter() {
            let desc = match device.device_descriptor() {
                Ok(desc) => desc,
                Err(_) => continue,
            };
            if !is_ch340_device(desc.vendor_id(), desc.product_id())
                || !filter.matches_location(device.bus_number(), device.address())
            {
                continue;
            }

            let handle = match device.open() {
                Ok(handle) => handle,
                Err(e) => {
                    debug!(
                        "Skipping CH340 at {:03}:{:03}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                },
            };

            let serial_number = read_serial(&handle, &desc);
            if let Some(wanted) = filter.serial_number.as_deref()
                && serial_number.as_deref() != Some(wanted)
            {
                continue;
            }

            let config_desc = device.active_config_descriptor()?;
            let status_endpoint = config_desc
                .interfaces()
                .next()
                .and_then(|iface| iface.descriptors().next())
                .and_then(|iface| Self::find_interrupt_in(&iface))
                .ok_or(UsbError::EndpointNotFound)?;

            let mut dev = Ch340Device {
                handle,
                interface_number: 0,
                status_endpoint,
                interface_claimed: false,
                info: DeviceInfo {
                    bus: device.bus_number(),
                    address: device.address(),
                    serial_number,
                },
            };
            dev.prepare_interface()?;
            debug!(
                "Opened CH340 at {:03}:{:03}, status endpoint 0x{:02x}",
                dev.info.bus, dev.info.address, dev.status_endpoint
            );
            return Ok(dev);
        }

        Err(UsbError::DeviceNotFound)
    }

    /// 查找中断 IN 端点（状态通知通道）
    fn find_interrupt_in(interface: &rusb::InterfaceDescriptor) -> Option<u8> {
        interface
            .endpoint_descriptors()
            .find(|ep| {
                ep.transfer_type() == TransferType::Interrupt && ep.direction() == Direction::In
            })
            .map(|ep| ep.address())
    }

    /// Detach 内核驱动并声明接口
    fn prepare_interface(&mut self) -> Result<(), UsbError> {
        if self.interface_claimed {
            return Ok(());
        }

        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            if self.handle.kernel_driver_active(self.interface_number).unwrap_or(false) {
                self.handle.detach_kernel_driver(self.interface_number)?;
            }
        }

        self.handle.claim_interface(self.interface_number)?;
        self.interface_claimed = true;
        Ok(())
    }

    /// 设备信息
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// 状态通知端点地址
    pub fn status_endpoint(&self) -> u8 {
        self.status_endpoint
    }

    fn request_type(direction: Direction) -> u8 {
        rusb::request_type(direction, RequestType::Vendor, Recipient::Device)
    }
}

fn read_serial(
    handle: &DeviceHandle<GlobalContext>,
    desc: &rusb::DeviceDescriptor,
) -> Option<String> {
    match desc.serial_number_string_index() {
        Some(idx) if idx != 0 => handle.read_string_descriptor_ascii(idx).ok(),
        _ => None,
    }
}

impl UsbTransport for Ch340Device {
    fn control_out(
        &self,
        request: VendorRequest,
        value: u16,
        index: u16,
        timeout: Duration,
    ) -> Result<(), UsbError> {
        trace!(
            "control out: req=0x{:02x} value=0x{:04x} index=0x{:04x}",
            u8::from(request),
            value,
            index
        );
        self.handle
            .write_control(
                Self::request_type(Direction::Out),
                request.into(),
                value,
                index,
                &[],
                timeout,
            )
            .map_err(|e| {
                error!("Control out {:?} failed: {}", request, e);
                UsbError::from(e)
            })?;
        Ok(())
    }

    fn control_in(
        &self,
        request: VendorRequest,
        value: u16,
        index: u16,
        len: usize,
        timeout: Duration,
    ) -> Result<Bytes, UsbError> {
        let mut buf = vec![0u8; len];
        let actual = self
            .handle
            .read_control(
                Self::request_type(Direction::In),
                request.into(),
                value,
                index,
                &mut buf,
                timeout,
            )
            .map_err(|e| {
                error!("Control in {:?} failed: {}", request, e);
                UsbError::from(e)
            })?;
        trace!(
            "control in: req=0x{:02x} value=0x{:04x} -> [{}]",
            u8::from(request),
            value,
            hex::encode(&buf[..actual])
        );
        check_length(len, actual)?;
        Ok(Bytes::from(buf))
    }

    fn read_status(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, UsbError> {
        let n = self.handle.read_interrupt(self.status_endpoint, buf, timeout)?;
        trace!("status endpoint: [{}]", hex::encode(&buf[..n]));
        Ok(n)
    }

    /// 清除状态端点的 Halt 状态与 Data Toggle
    fn resume(&self) -> Result<(), UsbError> {
        self.handle.clear_halt(self.status_endpoint)?;
        std::thread::sleep(Duration::from_millis(10));
        Ok(())
    }
}

impl Drop for Ch340Device {
    fn drop(&mut self) {
        if self.interface_claimed {
            // 设备可能已断开，忽略错误
            let _ = self.handle.release_interface(self.interface_number);
            self.interface_claimed = false;
            trace!("[Release] USB Interface released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_location() {
        let any = DeviceFilter::default();
        assert!(any.matches_location(1, 7));

        let filter = DeviceFilter {
            bus: Some(1),
            address: None,
            serial_number: None,
        };
        assert!(filter.matches_location(1, 9));
        assert!(!filter.matches_location(2, 9));

        let exact = DeviceFilter {
            bus: Some(3),
            address: Some(4),
            serial_number: None,
        };
        assert!(exact.matches_location(3, 4));
        assert!(!exact.matches_location(3, 5));
    }

    #[test]
    fn test_request_type_is_vendor_device() {
        assert_eq!(Ch340Device::request_type(Direction::Out), 0x40);
        assert_eq!(Ch340Device::request_type(Direction::In), 0xC0);
    }

    // 注意：scan() 与实际 USB 传输需要硬件，放在集成测试中
}
