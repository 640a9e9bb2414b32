//! CLI 配置文件
//!
//! 默认位置为 `<config_dir>/ch340/config.toml`，也可以用 `--config` 指定。
//! 文件不存在时使用默认配置。
//!
//! ```toml
//! [session]
//! control_timeout_ms = 500
//!
//! [session.default_line]
//! baud_rate = 115200
//! parity = "Even"
//!
//! [device]
//! bus = 1
//! serial = "A9XQ3B"
//! ```

use anyhow::{Context, Result};
use ch340_driver::SessionConfig;
use ch340_usb::DeviceFilter;
use std::fs;
use std::path::{Path, PathBuf};

/// 设备选择
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    pub bus: Option<u8>,
    pub address: Option<u8>,
    pub serial: Option<String>,
}

impl DeviceSection {
    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter {
            bus: self.bus,
            address: self.address,
            serial_number: self.serial.clone(),
        }
    }

    /// 命令行参数覆盖文件中的值
    pub fn override_with(&mut self, bus: Option<u8>, address: Option<u8>, serial: Option<String>) {
        if bus.is_some() {
            self.bus = bus;
        }
        if address.is_some() {
            self.address = address;
        }
        if serial.is_some() {
            self.serial = serial;
        }
    }
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub session: SessionConfig,
    pub device: DeviceSection,
}

/// 默认配置文件路径
pub fn default_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("ch340");
    path.push("config.toml");
    Ok(path)
}

impl CliConfig {
    /// 从指定文件加载；文件不存在时返回默认配置
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 加载 `--config` 指定的文件，否则加载默认位置
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => default_path()?,
        };
        Ok((Self::load_from(&path)?, path))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置失败")
    }

    /// 保存配置（自动创建父目录）
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("创建配置目录失败")?;
        }
        let content = format!("# CH340 CLI Configuration\n\n{}", self.to_toml()?);
        fs::write(path, content).with_context(|| format!("写入配置文件失败: {}", path.display()))
    }
}
