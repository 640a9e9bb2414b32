//! # CH340 Protocol
//!
//! CH340 USB-UART 桥接芯片的厂商控制面协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 请求码、寄存器地址、时钟参数
//! - `baud`: 波特率编码器（因子/除数/倍频）
//! - `line`: 线路参数与线路控制寄存器（LCR）
//! - `modem`: Modem 控制/状态位、状态通知帧、Break 寄存器
//!
//! ## 位序
//!
//! 所有位域均在本 crate 内完成打包/解包，上层只接触带命名字段的结构体。
//! 线路上的控制位与状态位为取反逻辑，解码边界处即还原为逻辑意义。

pub mod baud;
pub mod constants;
pub mod line;
pub mod modem;

// 重新导出常用类型
pub use baud::*;
pub use constants::*;
pub use line::*;
pub use modem::*;

use thiserror::Error;

/// 协议编解码错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid baud rate: {baud}")]
    InvalidBaudRate { baud: u32 },

    #[error("Baud rate {baud} cannot be represented by the divisor/prescaler encoding")]
    UnrepresentableBaudRate { baud: u32 },

    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnrepresentableBaudRate { baud: 1 };
        assert!(err.to_string().contains("cannot be represented"));
        assert!(err.to_string().contains('1'));

        let err = ProtocolError::InvalidLength {
            expected: 4,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Invalid frame length: expected 4, got 2");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_line_parameters_serde() {
        let params = LineParameters::new(115_200, DataBits::Seven, Parity::Even, StopBits::Two);
        let json = serde_json::to_string(&params).unwrap();
        let back: LineParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);

        // 缺省字段回落到 9600 8N1
        let partial: LineParameters = serde_json::from_str(r#"{"baud_rate":57600}"#).unwrap();
        assert_eq!(partial, LineParameters::default().with_baud_rate(57_600));
    }
}
