//! 波特率编码器
//!
//! 芯片的位时钟由固定基准频率（6 MHz）经过 3 级指数除数（每级 ÷8）
//! 和 8 位因子分频得到，并可选择 ×2 倍频。编码器分别计算不倍频和倍频两个
//! 候选，选择与请求波特率偏差更小的一个（偏差相同时保留不倍频候选）。
//!
//! 纯计算，不涉及任何 I/O；编码失败时调用方不得应用任何部分状态。

use crate::ProtocolError;
use crate::constants::*;
use bilge::prelude::*;

/// 波特率寄存器字（写入寄存器对 0x1312）
///
/// - Bit 0-1: 除数级别
/// - Bit 2: ×2 倍频
/// - Bit 3-6: 保留
/// - Bit 7: 立即发送（关闭芯片内部 32 字节聚包缓冲）
/// - Bit 8-15: 取反后的分频因子（`256 - factor`）
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaudWord {
    pub divisor: u2,
    pub clock_x2: bool,
    pub reserved: u4,
    pub immediate_flush: bool,
    pub factor: u8,
}

impl BaudWord {
    /// 从原始 16 位值构造
    pub fn from_raw(word: u16) -> Self {
        BaudWord::from(u16::new(word))
    }

    /// 原始 16 位值
    pub fn raw(self) -> u16 {
        u16::from(self).value()
    }

    /// 由寄存器字反推芯片实际产生的波特率
    pub fn achieved_rate(self) -> u32 {
        let factor = 0x100 - u32::from(self.factor());
        let levels = u32::from(BAUD_BASE_DIVMAX) - u32::from(self.divisor().value());
        let divider = 1u64 << (BAUD_DIVISOR_SHIFT * levels);
        let base = base_clock(self.clock_x2());
        div_round_closest(base, u64::from(factor) * divider) as u32
    }
}

/// 编码结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudEncoding {
    /// 请求的波特率
    pub requested: u32,
    /// 缩减后的分频因子（未取反）
    pub factor: u32,
    /// 除数级别（0..=3）
    pub divisor: u8,
    /// 是否启用 ×2 倍频
    pub clock_x2: bool,
    /// 实际产生的波特率
    pub achieved: u32,
}

impl BaudEncoding {
    /// 实际波特率与请求值之差的绝对值
    pub fn deviation(&self) -> u32 {
        self.achieved.abs_diff(self.requested)
    }

    /// 打包为寄存器字（总是置位立即发送位）
    pub fn word(&self) -> BaudWord {
        let mut word = BaudWord::from(u16::new(0));
        word.set_divisor(u2::new(self.divisor));
        word.set_clock_x2(self.clock_x2);
        word.set_immediate_flush(true);
        // encode_baud 已保证 2 <= factor <= 256
        word.set_factor((0x100 - self.factor) as u8);
        word
    }
}

/// 单个候选（倍频或不倍频）
#[derive(Debug, Clone, Copy)]
struct Candidate {
    factor: u32,
    divisor: u8,
    achieved: u32,
    deviation: u32,
}

fn base_clock(clock_x2: bool) -> u64 {
    if clock_x2 {
        u64::from(BAUD_BASE_FACTOR) * 2
    } else {
        u64::from(BAUD_BASE_FACTOR)
    }
}

/// 四舍五入整数除法
fn div_round_closest(n: u64, d: u64) -> u64 {
    (n + d / 2) / d
}

/// 计算一个候选：从最高除数级别开始，因子超过 8 位时右移 3 位并降一级
fn candidate(baud: u32, clock_x2: bool) -> Candidate {
    let base = base_clock(clock_x2);
    let mut factor = div_round_closest(base, u64::from(baud));
    let mut divisor = BAUD_BASE_DIVMAX;
    let mut divider: u64 = 1;

    while factor > 0xFF && divisor > 0 {
        factor >>= BAUD_DIVISOR_SHIFT;
        divisor -= 1;
        divider <<= BAUD_DIVISOR_SHIFT;
    }

    let achieved = if factor == 0 {
        0
    } else {
        div_round_closest(base, factor * divider)
    };
    let achieved = u32::try_from(achieved).unwrap_or(u32::MAX);

    Candidate {
        factor: u32::try_from(factor).unwrap_or(u32::MAX),
        divisor,
        achieved,
        deviation: achieved.abs_diff(baud),
    }
}

/// 将请求的波特率编码为芯片的因子/除数/倍频组合
///
/// # 错误
/// - `ProtocolError::InvalidBaudRate`: 波特率为 0
/// - `ProtocolError::UnrepresentableBaudRate`: 没有候选能落入寄存器范围
pub fn encode_baud(baud: u32) -> Result<BaudEncoding, ProtocolError> {
    if baud == 0 {
        return Err(ProtocolError::InvalidBaudRate { baud });
    }

    let mut best = candidate(baud, false);
    let mut clock_x2 = false;

    let x2 = candidate(baud, true);
    if x2.factor > BAUD_X2_MIN_FACTOR && x2.deviation < best.deviation {
        best = x2;
        clock_x2 = true;
    }

    // 写入值为 256 - factor，必须落在 0..=0xFE
    if best.factor < 0x100 - BAUD_MAX_STORED_FACTOR || best.factor > 0x100 {
        return Err(ProtocolError::UnrepresentableBaudRate { baud });
    }

    Ok(BaudEncoding {
        requested: baud,
        factor: best.factor,
        divisor: best.divisor,
        clock_x2,
        achieved: best.achieved,
    })
}
