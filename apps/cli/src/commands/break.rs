//! Break 命令

use crate::context::CliContext;
use anyhow::Result;
use clap::Args;
use std::thread;
use std::time::Duration;

/// Break 命令参数
#[derive(Args, Debug)]
pub struct BreakCommand {
    /// Break 持续时间（毫秒）
    #[arg(short, long, default_value_t = 250)]
    pub duration_ms: u64,
}

impl BreakCommand {
    pub fn execute(&self, ctx: &CliContext) -> Result<()> {
        let session = ctx.attach()?;

        println!("⏸️  Break {} ms...", self.duration_ms);
        session.set_break(true)?;
        thread::sleep(Duration::from_millis(self.duration_ms));
        session.set_break(false)?;
        println!("✅ Break 结束");
        Ok(())
    }
}
