//! 命令定义和实现

pub mod r#break;
pub mod config;
pub mod configure;
pub mod info;
pub mod lines;
pub mod monitor;

pub use r#break::BreakCommand;
pub use config::ConfigCommand;
pub use configure::ConfigureCommand;
pub use lines::LinesCommand;
pub use monitor::MonitorCommand;
