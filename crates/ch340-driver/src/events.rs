//! 线路事件回调
//!
//! 状态监听线程在检测到信号变化时触发回调。回调在监听线程上同步执行，
//! 必须立即返回；需要耗时处理时使用 [`ChannelEvents`] 转发到其他线程。

use ch340_protocol::ModemStatus;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;

/// 线路事件回调 Trait
pub trait LineEvents: Send + Sync {
    /// DCD 发生变化（载波出现/消失）
    fn on_carrier_change(&self, present: bool) {
        let _ = present;
    }

    /// 任一输入信号发生变化
    fn on_status_change(&self, status: ModemStatus, changed: ModemStatus) {
        let _ = (status, changed);
    }
}

/// 通过 channel 转发的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    Carrier(bool),
    Status {
        status: ModemStatus,
        changed: ModemStatus,
    },
}

/// 将事件转发到 `crossbeam-channel`
///
/// 使用 `try_send`，channel 满时丢弃事件而不阻塞监听线程。
pub struct ChannelEvents {
    sender: Sender<LineEvent>,
}

impl ChannelEvents {
    /// 创建回调及其接收端
    pub fn new(capacity: usize) -> (Self, Receiver<LineEvent>) {
        let (sender, receiver) = bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl LineEvents for ChannelEvents {
    fn on_carrier_change(&self, present: bool) {
        let _ = self.sender.try_send(LineEvent::Carrier(present));
    }

    fn on_status_change(&self, status: ModemStatus, changed: ModemStatus) {
        let _ = self.sender.try_send(LineEvent::Status { status, changed });
    }
}

/// 回调列表
#[derive(Default, Clone)]
pub struct EventHooks {
    callbacks: Vec<Arc<dyn LineEvents>>,
}

impl EventHooks {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Arc<dyn LineEvents>) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// 分发一次状态更新；只有 DCD 变化时才触发载波回调
    pub fn dispatch(&self, status: ModemStatus, changed: ModemStatus) {
        if changed.is_empty() {
            return;
        }
        for callback in &self.callbacks {
            callback.on_status_change(status, changed);
            if changed.dcd() {
                callback.on_carrier_change(status.dcd());
            }
        }
    }
}
