//! 线路参数与线路控制寄存器（LCR）
//!
//! 主机侧以 [`LineParameters`] 描述期望的帧格式，编码到设备时转换为
//! [`LineControl`] 位域。RX/TX 使能位在编码时总是强制置位。

use crate::ProtocolError;
use crate::constants::DEFAULT_BAUD_RATE;
use bilge::prelude::*;

/// 数据位数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    /// 位数
    pub fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }

    /// LCR 中的 CS 字段（0..=3）
    fn wire_value(self) -> u8 {
        self.bits() - 5
    }
}

impl TryFrom<u8> for DataBits {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            _ => Err(ProtocolError::InvalidValue {
                field: "DataBits".to_string(),
                value,
            }),
        }
    }
}

/// 校验模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    /// 校验位恒为 1
    Mark,
    /// 校验位恒为 0
    Space,
}

/// 停止位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            _ => Err(ProtocolError::InvalidValue {
                field: "StopBits".to_string(),
                value,
            }),
        }
    }
}

/// 主机请求的线路参数
///
/// `baud_rate == 0` 是 "挂断" 哨兵值（等价于 termios 的 B0）：
/// 不重新编程波特率/帧格式，只放下 DTR/RTS。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LineParameters {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for LineParameters {
    /// 9600 8N1
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl LineParameters {
    pub fn new(baud_rate: u32, data_bits: DataBits, parity: Parity, stop_bits: StopBits) -> Self {
        Self {
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        }
    }

    /// 替换波特率，其余字段保持不变
    pub fn with_baud_rate(self, baud_rate: u32) -> Self {
        Self { baud_rate, ..self }
    }

    /// 是否为挂断哨兵（baud 0）
    pub fn is_hangup(&self) -> bool {
        self.baud_rate == 0
    }

    /// 编码对应的线路控制字节
    pub fn line_control(&self) -> LineControl {
        LineControl::from_parameters(self)
    }
}

impl std::fmt::Display for LineParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits.bits(),
            parity,
            stop
        )
    }
}

/// 线路控制寄存器（LCR, 0x18）
///
/// - Bit 0-1: 字符长度（CS5..CS8）
/// - Bit 2: 2 停止位
/// - Bit 3: 校验使能
/// - Bit 4: 偶校验（与 Bit 5 组合时为 Space）
/// - Bit 5: Mark/Space 模式
/// - Bit 6: TX 使能
/// - Bit 7: RX 使能
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineControl {
    pub char_size: u2,
    pub two_stop_bits: bool,
    pub parity_enable: bool,
    pub parity_even: bool,
    pub mark_space: bool,
    pub enable_tx: bool,
    pub enable_rx: bool,
}

impl LineControl {
    /// 从原始字节构造
    pub fn from_raw(byte: u8) -> Self {
        LineControl::from(u8::new(byte))
    }

    /// 原始字节
    pub fn raw(self) -> u8 {
        u8::from(self).value()
    }

    /// 8N1，RX/TX 使能（部分芯片无法修改初始 LCR，挂载时总是写入该值）
    pub fn default_8n1() -> Self {
        Self::from_parameters(&LineParameters::default())
    }

    /// 由线路参数构建 LCR；RX/TX 使能位总是置位
    pub fn from_parameters(params: &LineParameters) -> Self {
        let mut lcr = LineControl::from(u8::new(0));
        lcr.set_enable_rx(true);
        lcr.set_enable_tx(true);
        lcr.set_char_size(u2::new(params.data_bits.wire_value()));

        match params.parity {
            Parity::None => {},
            Parity::Odd => lcr.set_parity_enable(true),
            Parity::Even => {
                lcr.set_parity_enable(true);
                lcr.set_parity_even(true);
            },
            // Mark = 奇校验 + 固定极性
            Parity::Mark => {
                lcr.set_parity_enable(true);
                lcr.set_mark_space(true);
            },
            // Space = 偶校验 + 固定极性
            Parity::Space => {
                lcr.set_parity_enable(true);
                lcr.set_parity_even(true);
                lcr.set_mark_space(true);
            },
        }

        if params.stop_bits == StopBits::Two {
            lcr.set_two_stop_bits(true);
        }

        lcr
    }

    /// 是否处于已配置状态（RX 与 TX 均使能）
    pub fn is_configured(self) -> bool {
        self.enable_rx() && self.enable_tx()
    }
}
