//! 协议常量定义
//!
//! 厂商控制请求码、寄存器地址、时钟参数与 USB 设备标识。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::time::Duration;

// ============================================================================
// USB 设备标识
// ============================================================================

/// WCH 厂商 ID
pub const CH340_VENDOR_ID: u16 = 0x1a86;
/// CH340 串口模式产品 ID
pub const CH340_PRODUCT_ID: u16 = 0x7523;

/// 是否为受支持的 CH340 设备
pub fn is_ch340_device(vendor_id: u16, product_id: u16) -> bool {
    matches!((vendor_id, product_id), (CH340_VENDOR_ID, CH340_PRODUCT_ID))
}

// ============================================================================
// Vendor Control Requests
// ============================================================================

/// 厂商控制请求码
///
/// 所有请求均为 `Vendor | Device` 类型，方向由请求本身决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum VendorRequest {
    /// 读取芯片版本（IN，2 字节）
    ReadVersion = 0x5F,
    /// 写寄存器对（OUT，数据编码在 wIndex 中）
    WriteRegister = 0x9A,
    /// 读寄存器对（IN，N 字节）
    ReadRegister = 0x95,
    /// 串口模式初始化（OUT）
    SerialInit = 0xA1,
    /// 握手线控制（OUT，wValue 为取反后的控制位）
    ModemControl = 0xA4,
}

impl VendorRequest {
    /// 是否为设备到主机方向的请求
    pub fn is_in(self) -> bool {
        matches!(self, Self::ReadVersion | Self::ReadRegister)
    }
}

// ============================================================================
// 寄存器
// ============================================================================

/// Break 寄存器
pub const REG_BREAK: u8 = 0x05;
/// 线路控制寄存器（LCR）
pub const REG_LCR: u8 = 0x18;

/// 波特率字寄存器对（预分频 0x12 / 除数 0x13）
pub const REG_PAIR_BAUD: u16 = 0x1312;
/// 线路控制寄存器对（0x18 / 0x25）
pub const REG_PAIR_LCR: u16 = 0x2518;
/// Modem 状态寄存器对
pub const REG_PAIR_STATUS: u16 = 0x0706;
/// Break 寄存器对：低字节为 Break 寄存器，高字节为 LCR 影子
///
/// 取值为 `REG_LCR << 8 | REG_BREAK`（`0x1805`），而不是按地址顺序排列的 `0x0502`。
pub const REG_PAIR_BREAK: u16 = ((REG_LCR as u16) << 8) | REG_BREAK as u16;

/// 寄存器对读取长度
pub const REG_PAIR_LEN: usize = 2;
/// 版本查询返回长度
pub const VERSION_LEN: usize = 2;

/// 芯片版本（ReadVersion 返回的第一个字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChipVersion(pub u8);

impl ChipVersion {
    /// 从 ReadVersion 的应答解析；不足 2 字节时返回 `InvalidLength`
    pub fn from_bytes(data: &[u8]) -> Result<Self, crate::ProtocolError> {
        if data.len() < VERSION_LEN {
            return Err(crate::ProtocolError::InvalidLength {
                expected: VERSION_LEN,
                actual: data.len(),
            });
        }
        Ok(Self(data[0]))
    }
}

impl std::fmt::Display for ChipVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Break 寄存器中低有效的 "no break" 位
pub const NBREAK_BITS: u8 = 0x01;

// ============================================================================
// 波特率时钟
// ============================================================================

/// 芯片内部波特率基准频率
pub const BAUD_BASE_FACTOR: u32 = 6_000_000;
/// 指数除数的最高级别
pub const BAUD_BASE_DIVMAX: u8 = 3;
/// 每降一级除数右移的位数（÷8）
pub const BAUD_DIVISOR_SHIFT: u32 = 3;
/// 倍频候选所需的最小分辨率（缩减后因子必须大于此值）
pub const BAUD_X2_MIN_FACTOR: u32 = 8;
/// 写入寄存器的因子上限（`256 - factor`）
pub const BAUD_MAX_STORED_FACTOR: u32 = 0xFE;

/// 默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// 控制传输超时（参考实现：1000ms）
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

// ============================================================================
// 状态通知帧
// ============================================================================

/// 状态通知帧固定长度
pub const STATUS_FRAME_LEN: usize = 4;
/// byte1：自上次通知以来发生了多次状态变化
pub const STATUS_MULTIPLE_EVENTS: u8 = 0x04;
/// 状态字节中的 Modem 位掩码（CTS/DSR/RI/DCD）
pub const MODEM_STATUS_MASK: u8 = 0x0F;
