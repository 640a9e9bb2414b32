//! 配置管理命令

use crate::config::CliConfig;
use crate::context::CliContext;
use anyhow::Result;
use clap::Subcommand;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示生效的配置（文件 + 命令行覆盖）
    Show,

    /// 显示配置文件路径
    Path,

    /// 修改配置文件
    Set {
        /// 默认波特率
        #[arg(long)]
        baud: Option<u32>,

        /// 控制传输超时（毫秒）
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        control_timeout_ms: Option<u64>,

        /// 状态端点轮询超时（毫秒）
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        status_poll_ms: Option<u64>,

        /// 默认设备序列号
        #[arg(long)]
        device_serial: Option<String>,
    },
}

impl ConfigCommand {
    pub fn execute(self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                print!("{}", ctx.config.to_toml()?);
                Ok(())
            },
            ConfigCommand::Path => {
                println!("{}", ctx.config_path.display());
                Ok(())
            },
            ConfigCommand::Set {
                baud,
                control_timeout_ms,
                status_poll_ms,
                device_serial,
            } => {
                // 只修改文件中的值，不写入本次的命令行覆盖
                let mut config = CliConfig::load_from(&ctx.config_path)?;
                if let Some(baud) = baud {
                    // 提前拒绝无法编码的波特率
                    ch340_protocol::encode_baud(baud)?;
                    config.session.default_line.baud_rate = baud;
                }
                if let Some(ms) = control_timeout_ms {
                    config.session.control_timeout_ms = ms;
                }
                if let Some(ms) = status_poll_ms {
                    config.session.status_poll_ms = ms;
                }
                if device_serial.is_some() {
                    config.device.serial = device_serial;
                }
                config.save_to(&ctx.config_path)?;
                println!("✅ 配置已保存到 {}", ctx.config_path.display());
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Harness {
        #[command(subcommand)]
        command: ConfigCommand,
    }

    #[test]
    fn test_set_rejects_zero_timeouts() {
        assert!(Harness::try_parse_from(["ch340-cli", "set", "--status-poll-ms", "0"]).is_err());
        assert!(
            Harness::try_parse_from(["ch340-cli", "set", "--control-timeout-ms", "0"]).is_err()
        );
    }

    #[test]
    fn test_set_accepts_positive_poll() {
        let parsed = Harness::try_parse_from(["ch340-cli", "set", "--status-poll-ms", "20"]).unwrap();
        assert!(matches!(
            parsed.command,
            ConfigCommand::Set {
                status_poll_ms: Some(20),
                ..
            }
        ));
    }
}
