//! # CH340 Driver
//!
//! CH340 USB-UART 桥接芯片的控制面驱动：寄存器协议、Modem 状态跟踪、
//! 状态通知监听线程与会话生命周期。
//!
//! ## 数据流
//!
//! ```text
//! LineParameters -> encode_baud -> RegisterProtocol -> UsbTransport -> 设备
//! 设备 -> 状态端点 -> StatusListener -> ModemTracker -> 等待者 / LineEvents
//! ```
//!
//! ## 并发
//!
//! 状态锁只在 [`ModemTracker`] 内部使用，任何方法都不会在持有它时发起
//! 控制传输。控制面操作另由 [`Session`] 的控制面锁串行化。

pub mod builder;
pub mod config;
pub mod error;
pub mod events;
pub mod listener;
pub mod metrics;
pub mod registers;
pub mod session;
pub mod tracker;

pub use builder::SessionBuilder;
pub use config::SessionConfig;
pub use error::{DriverError, ProgramStage};
pub use events::{ChannelEvents, EventHooks, LineEvent, LineEvents};
pub use listener::{ListenerState, StatusListener};
pub use metrics::{MetricsSnapshot, StatusMetrics};
pub use registers::RegisterProtocol;
pub use session::Session;
pub use tracker::{ModemLines, ModemTracker, SignalCounters};
