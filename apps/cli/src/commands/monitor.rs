//! Modem 状态监听命令
//!
//! 打开会话、拉高 DTR/RTS，然后打印状态端点上报的每次信号变化，
//! 直到收到 Ctrl+C 或达到指定事件数。

use crate::commands::info::on_off;
use crate::context::CliContext;
use anyhow::{Context, Result};
use ch340_driver::{ChannelEvents, LineEvent, ListenerState};
use ch340_protocol::ModemStatus;
use clap::Args;
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 事件 channel 容量
const EVENT_CAPACITY: usize = 64;

/// 监听命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 收到 N 个事件后退出（默认一直运行）
    #[arg(short, long)]
    pub count: Option<usize>,

    /// 不拉高 DTR/RTS
    #[arg(long)]
    pub no_assert: bool,
}

impl MonitorCommand {
    pub fn execute(&self, ctx: &CliContext) -> Result<()> {
        let running = Arc::new(AtomicBool::new(true));
        let running_handler = running.clone();
        ctrlc::set_handler(move || {
            running_handler.store(false, Ordering::SeqCst);
        })
        .context("设置信号处理器失败")?;

        let (events, receiver) = ChannelEvents::new(EVENT_CAPACITY);
        let session = ctx.attach_with(Some(Arc::new(events)))?;
        session.open(session.line_parameters())?;
        if !self.no_assert {
            session.dtr_rts(true)?;
        }

        let lines = session.get_control_lines();
        println!("📡 监听中（Ctrl+C 退出）: {}", format_status(lines.status));

        let mut seen = 0usize;
        while running.load(Ordering::SeqCst) {
            if self.count.is_some_and(|count| seen >= count) {
                break;
            }
            // 设备拔出等致命错误后监听线程自行退出
            if session.listener_state() == ListenerState::Cancelled {
                tracing::warn!("Status listener stopped, leaving monitor");
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(200)) {
                Ok(LineEvent::Carrier(present)) => {
                    println!("载波 {}", if present { "出现" } else { "消失" });
                },
                Ok(LineEvent::Status { status, changed }) => {
                    seen += 1;
                    println!("{}  (变化: {})", format_status(status), format_changed(changed));
                },
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let counters = session.signal_counters();
        let metrics = session.metrics();
        let state = session.close()?;
        println!(
            "计数: CTS={} DSR={} RI={} DCD={}",
            counters.cts, counters.dsr, counters.ri, counters.dcd
        );
        println!(
            "帧: {} (短帧 {}, 合并 {}), 端点错误 {}",
            metrics.frames_received,
            metrics.short_frames,
            metrics.coalesced_frames,
            metrics.endpoint_errors
        );
        tracing::info!("Status listener finished in state {:?}", state);
        Ok(())
    }
}

fn format_status(status: ModemStatus) -> String {
    format!(
        "CTS={} DSR={} RI={} DCD={}",
        on_off(status.cts()),
        on_off(status.dsr()),
        on_off(status.ri()),
        on_off(status.dcd())
    )
}

fn format_changed(changed: ModemStatus) -> String {
    let names: Vec<&str> = [
        (changed.cts(), "CTS"),
        (changed.dsr(), "DSR"),
        (changed.ri(), "RI"),
        (changed.dcd(), "DCD"),
    ]
    .into_iter()
    .filter_map(|(hit, name)| hit.then_some(name))
    .collect();
    names.join(",")
}
