//! 设备查询命令

use crate::context::CliContext;
use anyhow::{Context, Result};
use ch340_driver::{ModemLines, Session};
use ch340_usb::Ch340Device;

/// 列出已连接的 CH340 设备
pub fn scan() -> Result<()> {
    let devices = Ch340Device::scan().context("扫描 USB 设备失败")?;
    if devices.is_empty() {
        println!("未发现 CH340 设备");
        return Ok(());
    }

    for device in devices {
        println!(
            "bus {:03} address {:03}  serial {}",
            device.bus,
            device.address,
            device.serial_number.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// 显示芯片版本、线路参数与握手线状态
///
/// 挂载会重新写入配置中的默认线路参数并放下 DTR/RTS，因此显示的是
/// 挂载后的状态。输入状态通过打开线路时读取的状态寄存器获得。
pub fn execute(ctx: &CliContext) -> Result<()> {
    let session = ctx.attach()?;
    let lines = read_lines(&session)?;
    let status = lines.status;

    println!("芯片版本:  {}", session.chip_version());
    println!("线路参数:  {}（配置默认值）", session.line_parameters());
    println!(
        "输出握手:  DTR={} RTS={}（挂载后）",
        on_off(lines.control.dtr),
        on_off(lines.control.rts)
    );
    println!(
        "输入状态:  CTS={} DSR={} RI={} DCD={}",
        on_off(status.cts()),
        on_off(status.dsr()),
        on_off(status.ri()),
        on_off(status.dcd())
    );
    Ok(())
}

/// 短暂打开线路以读取状态寄存器，返回当前握手线
pub(crate) fn read_lines(session: &Session) -> Result<ModemLines> {
    session.open(session.line_parameters())?;
    let lines = session.get_control_lines();
    session.close()?;
    Ok(lines)
}

pub(crate) fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}
