//! 握手线命令

use crate::commands::info::on_off;
use crate::context::CliContext;
use anyhow::Result;
use ch340_protocol::ModemControl;
use clap::{Args, ValueEnum};

/// 开关值
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

/// 握手线命令参数
///
/// 挂载会先放下 DTR/RTS，因此未给出的线最终为 off。
#[derive(Args, Debug)]
pub struct LinesCommand {
    /// DTR
    #[arg(long, value_enum)]
    pub dtr: Option<Switch>,

    /// RTS
    #[arg(long, value_enum)]
    pub rts: Option<Switch>,
}

impl LinesCommand {
    /// 转换为（置位, 清除）掩码
    pub fn masks(&self) -> (ModemControl, ModemControl) {
        let set = ModemControl::new(self.dtr == Some(Switch::On), self.rts == Some(Switch::On));
        let clear = ModemControl::new(self.dtr == Some(Switch::Off), self.rts == Some(Switch::Off));
        (set, clear)
    }

    pub fn execute(&self, ctx: &CliContext) -> Result<()> {
        let session = ctx.attach()?;
        let (set, clear) = self.masks();
        if set != ModemControl::default() || clear != ModemControl::default() {
            session.update_control_lines(set, clear)?;
        }

        let lines = session.get_control_lines();
        println!(
            "DTR={} RTS={}",
            on_off(lines.control.dtr),
            on_off(lines.control.rts)
        );
        Ok(())
    }
}
