//! 一次性命令的运行上下文

use crate::config::CliConfig;
use anyhow::{Context, Result};
use ch340_driver::{LineEvents, Session, SessionBuilder};
use ch340_usb::Ch340Device;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 已解析的配置（文件 + 命令行覆盖）
pub struct CliContext {
    pub config: CliConfig,
    pub config_path: PathBuf,
}

impl CliContext {
    pub fn load(
        explicit: Option<&Path>,
        bus: Option<u8>,
        address: Option<u8>,
        serial: Option<String>,
    ) -> Result<Self> {
        let (mut config, config_path) = CliConfig::load(explicit)?;
        config.device.override_with(bus, address, serial);
        Ok(Self {
            config,
            config_path,
        })
    }

    /// 打开设备并挂载会话
    pub fn attach(&self) -> Result<Session> {
        self.attach_with(None)
    }

    /// 打开设备并挂载会话，附带事件回调
    pub fn attach_with(&self, events: Option<Arc<dyn LineEvents>>) -> Result<Session> {
        let filter = self.config.device.filter();
        println!("🔌 打开 CH340 设备...");
        let device = Ch340Device::open_with_filter(&filter).context("无法打开 CH340 设备")?;
        let info = device.info().clone();
        tracing::info!(
            "Opened CH340 at bus {} address {}",
            info.bus,
            info.address
        );

        let mut builder = SessionBuilder::new().config(self.config.session.clone());
        if let Some(events) = events {
            builder = builder.events(events);
        }
        builder.attach(device).context("会话初始化失败")
    }
}
