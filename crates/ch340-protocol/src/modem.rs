//! Modem 控制/状态位与状态通知帧
//!
//! 线路上的控制位和状态位均为低有效（取反），本模块在编解码边界处还原为
//! 逻辑意义，上层始终只看到非取反的值。

use crate::ProtocolError;
use crate::constants::*;
use crate::line::LineControl;
use bilge::prelude::*;

/// 主机驱动的输出握手线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModemControl {
    pub dtr: bool,
    pub rts: bool,
}

impl ModemControl {
    /// 线路上 DTR 所在位
    pub const WIRE_DTR: u8 = 1 << 5;
    /// 线路上 RTS 所在位
    pub const WIRE_RTS: u8 = 1 << 6;

    pub fn new(dtr: bool, rts: bool) -> Self {
        Self { dtr, rts }
    }

    /// DTR 与 RTS 同时置位/清除
    pub fn both(on: bool) -> Self {
        Self { dtr: on, rts: on }
    }

    /// 逻辑位（未取反）
    pub fn bits(self) -> u8 {
        (if self.dtr { Self::WIRE_DTR } else { 0 }) | (if self.rts { Self::WIRE_RTS } else { 0 })
    }

    /// ModemControl 请求的 wValue（按位取反）
    pub fn wire_value(self) -> u16 {
        u16::from(!self.bits())
    }

    /// 先置位后清除（TIOCMSET 语义）
    pub fn update(self, set: ModemControl, clear: ModemControl) -> Self {
        let mut next = self;
        if set.dtr {
            next.dtr = true;
        }
        if set.rts {
            next.rts = true;
        }
        if clear.dtr {
            next.dtr = false;
        }
        if clear.rts {
            next.rts = false;
        }
        next
    }
}

/// 设备驱动的输入状态线（逻辑意义）
///
/// - Bit 0: CTS
/// - Bit 1: DSR
/// - Bit 2: RI
/// - Bit 3: DCD
/// - Bit 4-7: 保留
///
/// 也用作 "变化掩码"：XOR 两个状态即得发生变化的信号。
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModemStatus {
    pub cts: bool,
    pub dsr: bool,
    pub ri: bool,
    pub dcd: bool,
    pub reserved: u4,
}

impl ModemStatus {
    /// 从逻辑字节构造（保留位被清零）
    pub fn from_bits(bits: u8) -> Self {
        ModemStatus::from(u8::new(bits & MODEM_STATUS_MASK))
    }

    /// 从线路字节解码：取反并屏蔽到 4 个状态位
    pub fn from_wire(raw: u8) -> Self {
        Self::from_bits(!raw)
    }

    /// 逻辑字节
    pub fn bits(self) -> u8 {
        u8::from(self).value() & MODEM_STATUS_MASK
    }

    /// 所有状态位
    pub fn all() -> Self {
        Self::from_bits(MODEM_STATUS_MASK)
    }

    /// 无任何状态位
    pub fn empty() -> Self {
        Self::from_bits(0)
    }

    pub fn is_empty(self) -> bool {
        self.bits() == 0
    }

    /// 与另一状态的差异
    pub fn delta(self, previous: ModemStatus) -> Self {
        Self::from_bits(self.bits() ^ previous.bits())
    }

    /// 是否与掩码有交集
    pub fn intersects(self, mask: ModemStatus) -> bool {
        self.bits() & mask.bits() != 0
    }
}

/// 状态通知帧（中断端点，固定 4 字节）
///
/// - byte0: 保留（通常为 0x08）
/// - byte1: 标志位，bit2 表示自上次通知以来合并了多次变化
/// - byte2: 取反后的 Modem 状态
/// - byte3: 保留（通常为 0xEE）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFrame {
    pub flags: u8,
    pub status: ModemStatus,
}

impl StatusFrame {
    /// 解析状态通知帧；长度不足 4 字节时返回 `InvalidLength`
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < STATUS_FRAME_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: STATUS_FRAME_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            flags: data[1],
            status: ModemStatus::from_wire(data[2]),
        })
    }

    /// 是否合并了多次状态变化
    pub fn multiple_events(&self) -> bool {
        self.flags & STATUS_MULTIPLE_EVENTS != 0
    }
}

/// Break 寄存器对（0x1805）的内容
///
/// 低字节为 Break 寄存器（bit0 低有效 "no break"），高字节为 LCR 影子。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakRegister {
    pub break_bits: u8,
    pub line_control: u8,
}

impl BreakRegister {
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            break_bits: bytes[0],
            line_control: bytes[1],
        }
    }

    /// 进入 Break：清除 NBREAK 与 TX 使能；退出 Break：两者均置位
    pub fn with_break(self, enabled: bool) -> Self {
        let mut lcr = LineControl::from_raw(self.line_control);
        lcr.set_enable_tx(!enabled);
        let break_bits = if enabled {
            self.break_bits & !NBREAK_BITS
        } else {
            self.break_bits | NBREAK_BITS
        };
        Self {
            break_bits,
            line_control: lcr.raw(),
        }
    }

    /// 写回时的小端 16 位值
    pub fn to_le_word(self) -> u16 {
        u16::from_le_bytes([self.break_bits, self.line_control])
    }

    /// 是否处于 Break 状态
    pub fn is_break(self) -> bool {
        self.break_bits & NBREAK_BITS == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modem_control_wire_inverted() {
        assert_eq!(ModemControl::both(true).bits(), 0x60);
        assert_eq!(ModemControl::both(true).wire_value(), 0x9F);
        assert_eq!(ModemControl::default().wire_value(), 0xFF);
        assert_eq!(ModemControl::new(true, false).wire_value(), 0xDF);
    }

    #[test]
    fn test_modem_control_update_clear_wins() {
        let current = ModemControl::new(false, true);
        let next = current.update(ModemControl::new(true, false), ModemControl::new(false, true));
        assert_eq!(next, ModemControl::new(true, false));

        let both = ModemControl::default().update(ModemControl::both(true), ModemControl::both(true));
        assert_eq!(both, ModemControl::default());
    }

    #[test]
    fn test_status_from_wire_inverts() {
        // 全部高电平 -> 无信号
        assert!(ModemStatus::from_wire(0xFF).is_empty());
        // 全部低电平 -> 所有信号有效，保留位被屏蔽
        assert_eq!(ModemStatus::from_wire(0x00), ModemStatus::all());

        let status = ModemStatus::from_wire(!0x09);
        assert!(status.cts());
        assert!(!status.dsr());
        assert!(!status.ri());
        assert!(status.dcd());
    }

    #[test]
    fn test_status_delta() {
        let before = ModemStatus::from_bits(0x01);
        let after = ModemStatus::from_bits(0x09);
        let delta = after.delta(before);
        assert!(delta.dcd());
        assert!(!delta.cts());
        assert!(after.delta(after).is_empty());
    }

    #[test]
    fn test_status_frame_parse() {
        let frame = StatusFrame::parse(&[0x08, 0x7D | 0x04, 0x94 | 0x0E, 0xEE]).unwrap();
        assert!(frame.multiple_events());
        // 0x9E 取反低 4 位 = 0x01 -> 仅 CTS
        assert_eq!(frame.status.bits(), 0x01);
    }

    #[test]
    fn test_status_frame_short() {
        assert!(matches!(
            StatusFrame::parse(&[0x08, 0x7D, 0x94]),
            Err(ProtocolError::InvalidLength {
                expected: 4,
                actual: 3
            })
        ));
        // 超长帧只看前 4 字节
        assert!(StatusFrame::parse(&[0, 0, 0xFF, 0, 0xAA]).is_ok());
    }

    #[test]
    fn test_break_register_toggle() {
        let reg = BreakRegister::from_bytes([0x01, 0xC3]);
        assert!(!reg.is_break());

        let on = reg.with_break(true);
        assert_eq!(on.break_bits, 0x00);
        assert_eq!(on.line_control, 0x83);
        assert!(on.is_break());
        assert_eq!(on.to_le_word(), 0x8300);

        let off = on.with_break(false);
        assert_eq!(off, reg);
        assert_eq!(off.to_le_word(), 0xC301);
    }
}
