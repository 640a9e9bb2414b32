//! # CH340 USB
//!
//! CH340 的控制传输层：[`UsbTransport`] 抽象与基于 rusb 的 [`Ch340Device`]。

pub mod device;
pub mod error;
pub mod transport;

pub use device::{Ch340Device, DeviceFilter, DeviceInfo};
pub use error::UsbError;
pub use transport::{UsbTransport, check_length};
