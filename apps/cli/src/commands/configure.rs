//! 线路参数命令

use crate::context::CliContext;
use anyhow::Result;
use ch340_protocol::{DataBits, LineParameters, Parity, StopBits, encode_baud};
use clap::{Args, ValueEnum};

/// 命令行上的校验模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ParityArg {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Even => Parity::Even,
            ParityArg::Mark => Parity::Mark,
            ParityArg::Space => Parity::Space,
        }
    }
}

/// 线路参数命令参数
///
/// 未给出的字段沿用配置文件中的默认线路参数。
#[derive(Args, Debug)]
pub struct ConfigureCommand {
    /// 波特率（0 = 挂断）
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// 数据位（5-8）
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(5..=8))]
    pub data_bits: Option<u8>,

    /// 校验模式
    #[arg(short, long, value_enum)]
    pub parity: Option<ParityArg>,

    /// 停止位（1-2）
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub stop_bits: Option<u8>,
}

impl ConfigureCommand {
    /// 与基准参数合并
    pub fn resolve(&self, base: LineParameters) -> Result<LineParameters> {
        let mut params = base;
        if let Some(baud) = self.baud {
            params.baud_rate = baud;
        }
        if let Some(bits) = self.data_bits {
            params.data_bits = DataBits::try_from(bits)?;
        }
        if let Some(parity) = self.parity {
            params.parity = parity.into();
        }
        if let Some(stop) = self.stop_bits {
            params.stop_bits = StopBits::try_from(stop)?;
        }
        Ok(params)
    }

    pub fn execute(&self, ctx: &CliContext) -> Result<()> {
        let params = self.resolve(ctx.config.session.default_line)?;

        if !params.is_hangup() {
            let encoding = encode_baud(params.baud_rate)?;
            println!(
                "波特率编码: factor={} divisor={} x2={} -> 实际 {} (偏差 {})",
                encoding.factor,
                encoding.divisor,
                encoding.clock_x2,
                encoding.achieved,
                encoding.deviation()
            );
        }

        let session = ctx.attach()?;
        let previous = session.line_parameters();
        session.set_line_parameters(params, Some(previous))?;

        if params.is_hangup() {
            println!("✅ 已挂断（DTR/RTS 放下）");
        } else {
            println!("✅ 线路参数: {} -> {}", previous, session.line_parameters());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_overrides_only_given_fields() {
        let cmd = ConfigureCommand {
            baud: Some(115_200),
            data_bits: Some(7),
            parity: Some(ParityArg::Even),
            stop_bits: None,
        };
        let params = cmd.resolve(LineParameters::default()).unwrap();
        assert_eq!(params.to_string(), "115200 7E1");
    }

    #[test]
    fn test_resolve_defaults() {
        let cmd = ConfigureCommand {
            baud: None,
            data_bits: None,
            parity: None,
            stop_bits: None,
        };
        let base = LineParameters::default().with_baud_rate(57_600);
        assert_eq!(cmd.resolve(base).unwrap(), base);
    }

    #[test]
    fn test_resolve_rejects_bad_data_bits() {
        let cmd = ConfigureCommand {
            baud: None,
            data_bits: Some(9),
            parity: None,
            stop_bits: None,
        };
        assert!(cmd.resolve(LineParameters::default()).is_err());
    }

    #[test]
    fn test_parity_arg_mapping() {
        assert_eq!(Parity::from(ParityArg::Mark), Parity::Mark);
        assert_eq!(Parity::from(ParityArg::None), Parity::None);
    }
}
