//! # CH340 CLI
//!
//! CH340 USB-UART 桥接芯片的控制面命令行工具。
//!
//! 每条命令都是一次性的：打开设备 -> 挂载会话 -> 执行 -> 释放。
//!
//! ```bash
//! # 查看芯片版本、线路参数与握手线
//! ch340-cli info
//!
//! # 设置 115200 7E2
//! ch340-cli configure --baud 115200 --data-bits 7 --parity even --stop-bits 2
//!
//! # 拉高 DTR，放下 RTS
//! ch340-cli lines --dtr on --rts off
//!
//! # 监听 Modem 状态变化（Ctrl+C 退出）
//! ch340-cli monitor
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod context;

use commands::{BreakCommand, ConfigCommand, ConfigureCommand, LinesCommand, MonitorCommand};
use context::CliContext;

/// CH340 CLI - USB 串口桥控制工具
#[derive(Parser, Debug)]
#[command(name = "ch340-cli")]
#[command(about = "Control-plane tool for CH340 USB-UART bridges", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/ch340/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// USB 总线号（覆盖配置）
    #[arg(long, global = true)]
    bus: Option<u8>,

    /// USB 设备地址（覆盖配置）
    #[arg(long, global = true)]
    address: Option<u8>,

    /// 设备序列号（覆盖配置）
    #[arg(long, global = true)]
    serial: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 列出已连接的 CH340 设备
    Scan,

    /// 显示芯片版本、线路参数与握手线状态
    Info,

    /// 设置波特率与帧格式
    Configure {
        #[command(flatten)]
        args: ConfigureCommand,
    },

    /// 设置 DTR/RTS（挂载时先放下，未给出的线为 off）
    Lines {
        #[command(flatten)]
        args: LinesCommand,
    },

    /// 发送 Break
    Break {
        #[command(flatten)]
        args: BreakCommand,
    },

    /// 监听 Modem 状态变化
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ch340_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let ctx = CliContext::load(cli.config.as_deref(), cli.bus, cli.address, cli.serial)?;

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&ctx),
        Commands::Scan => commands::info::scan(),
        Commands::Info => commands::info::execute(&ctx),
        Commands::Configure { args } => args.execute(&ctx),
        Commands::Lines { args } => args.execute(&ctx),
        Commands::Break { args } => args.execute(&ctx),
        Commands::Monitor { args } => args.execute(&ctx),
    }
}
