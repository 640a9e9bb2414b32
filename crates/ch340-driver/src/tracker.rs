//! Modem 状态跟踪器
//!
//! 控制位、状态位、线路控制影子与信号计数器作为一个整体由同一把
//! `parking_lot::Mutex` 保护。所有方法在返回前释放锁，只拷贝值进出，
//! 因此调用方不可能在持有状态锁期间发起控制传输。

use crate::error::DriverError;
use ch340_protocol::{
    DEFAULT_BAUD_RATE, LineControl, ModemControl, ModemStatus,
};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// 每个输入信号的变化次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalCounters {
    pub cts: u32,
    pub dsr: u32,
    pub ri: u32,
    pub dcd: u32,
}

impl SignalCounters {
    fn record(&mut self, changed: ModemStatus) {
        if changed.cts() {
            self.cts = self.cts.wrapping_add(1);
        }
        if changed.dsr() {
            self.dsr = self.dsr.wrapping_add(1);
        }
        if changed.ri() {
            self.ri = self.ri.wrapping_add(1);
        }
        if changed.dcd() {
            self.dcd = self.dcd.wrapping_add(1);
        }
    }

    /// 与之前的快照相比，掩码内哪些信号的计数发生了变化
    pub fn advanced_since(&self, earlier: &SignalCounters, mask: ModemStatus) -> ModemStatus {
        let mut bits = 0u8;
        if mask.cts() && self.cts != earlier.cts {
            bits |= 0x01;
        }
        if mask.dsr() && self.dsr != earlier.dsr {
            bits |= 0x02;
        }
        if mask.ri() && self.ri != earlier.ri {
            bits |= 0x04;
        }
        if mask.dcd() && self.dcd != earlier.dcd {
            bits |= 0x08;
        }
        ModemStatus::from_bits(bits)
    }
}

/// 控制线与状态线的组合视图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemLines {
    pub control: ModemControl,
    pub status: ModemStatus,
}

#[derive(Debug)]
struct ModemState {
    control: ModemControl,
    status: ModemStatus,
    line_control: LineControl,
    baud_rate: u32,
    counters: SignalCounters,
    /// 当前负责更新状态的监听线程代号
    listener: Option<u64>,
    next_listener: u64,
}

/// Modem 状态跟踪器
#[derive(Debug)]
pub struct ModemTracker {
    state: Mutex<ModemState>,
    changed: Condvar,
}

impl Default for ModemTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ModemTracker {
    /// 初始状态：控制线全部放下，无输入信号，9600 8N1
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ModemState {
                control: ModemControl::default(),
                status: ModemStatus::empty(),
                line_control: LineControl::default_8n1(),
                baud_rate: DEFAULT_BAUD_RATE,
                counters: SignalCounters::default(),
                listener: None,
                next_listener: 0,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn set_control(&self, control: ModemControl) {
        self.state.lock().control = control;
    }

    pub fn get_control(&self) -> ModemControl {
        self.state.lock().control
    }

    pub fn status(&self) -> ModemStatus {
        self.state.lock().status
    }

    pub fn lines(&self) -> ModemLines {
        let state = self.state.lock();
        ModemLines {
            control: state.control,
            status: state.status,
        }
    }

    /// 应用线路上的原始状态字节，返回 (新状态, 变化掩码)
    pub fn apply_status(&self, raw: u8) -> (ModemStatus, ModemStatus) {
        self.apply(ModemStatus::from_wire(raw))
    }

    /// 应用已解码的状态；取反、比较、存储与计数在同一临界区内完成
    pub fn apply(&self, status: ModemStatus) -> (ModemStatus, ModemStatus) {
        let changed = {
            let mut state = self.state.lock();
            let changed = status.delta(state.status);
            state.status = status;
            state.counters.record(changed);
            changed
        };
        if !changed.is_empty() {
            debug!("Modem status {:?}, changed {:?}", status, changed);
            self.changed.notify_all();
        }
        (status, changed)
    }

    /// 直接写入初始状态，不计数也不唤醒等待者
    pub fn seed_status(&self, status: ModemStatus) {
        self.state.lock().status = status;
    }

    pub fn counters(&self) -> SignalCounters {
        self.state.lock().counters
    }

    pub fn is_carrier_present(&self) -> bool {
        self.state.lock().status.dcd()
    }

    /// 最近一次成功写入设备的 (波特率, LCR)
    pub fn line_shadow(&self) -> (u32, LineControl) {
        let state = self.state.lock();
        (state.baud_rate, state.line_control)
    }

    pub fn set_line_shadow(&self, baud_rate: u32, line_control: LineControl) {
        let mut state = self.state.lock();
        state.baud_rate = baud_rate;
        state.line_control = line_control;
    }

    /// 登记新的监听线程，返回其代号；之前的线程随之失去所有权
    pub fn begin_listening(&self) -> u64 {
        let mut state = self.state.lock();
        let generation = state.next_listener;
        state.next_listener = state.next_listener.wrapping_add(1);
        state.listener = Some(generation);
        generation
    }

    /// 监听线程退出；只有仍持有所有权时才清除标记并唤醒等待者
    pub fn end_listening(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.listener != Some(generation) {
            return;
        }
        state.listener = None;
        drop(state);
        self.changed.notify_all();
    }

    pub fn is_listening(&self) -> bool {
        self.state.lock().listener.is_some()
    }

    /// 阻塞等待掩码内任一信号发生变化，返回发生变化的信号
    ///
    /// `timeout` 超出 `Instant` 可表示的范围（如 `Duration::MAX`）时不设期限。
    ///
    /// # 错误
    /// - `DriverError::ListenerStopped`: 没有监听线程，或等待期间线程退出
    /// - `DriverError::Timeout`: 超时前没有变化
    pub fn wait_for_change(
        &self,
        mask: ModemStatus,
        timeout: Duration,
    ) -> Result<ModemStatus, DriverError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        let start = state.counters;

        loop {
            if state.listener.is_none() {
                return Err(DriverError::ListenerStopped);
            }
            let advanced = state.counters.advanced_since(&start, mask);
            if !advanced.is_empty() {
                return Ok(advanced);
            }
            let Some(deadline) = deadline else {
                self.changed.wait(&mut state);
                continue;
            };
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                let advanced = state.counters.advanced_since(&start, mask);
                if !advanced.is_empty() {
                    return Ok(advanced);
                }
                return Err(DriverError::Timeout);
            }
        }
    }
}
