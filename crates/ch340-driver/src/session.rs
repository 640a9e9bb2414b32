//! 会话生命周期
//!
//! 一个 [`Session`] 对应一次设备挂载：挂载时创建并完成初始配置，
//! 之后可以多次打开/关闭线路，控制位在打开/关闭之间保持不变。
//!
//! 线程模型：
//! - 控制面操作（打开、关闭、设置线路参数、握手线、Break、复位恢复）
//!   由控制面锁串行化，控制传输期间只持有这把锁
//! - 状态监听线程只接触 [`ModemTracker`]，与控制面锁互不相干

use crate::builder::SessionBuilder;
use crate::config::SessionConfig;
use crate::error::DriverError;
use crate::events::EventHooks;
use crate::listener::{ListenerContext, ListenerState, StatusListener};
use crate::metrics::{MetricsSnapshot, StatusMetrics};
use crate::registers::RegisterProtocol;
use crate::tracker::{ModemLines, ModemTracker, SignalCounters};
use arc_swap::ArcSwap;
use ch340_protocol::{ChipVersion, LineParameters, ModemControl, ModemStatus, encode_baud};
use ch340_usb::UsbTransport;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// CH340 会话
pub struct Session {
    registers: RegisterProtocol,
    transport: Arc<dyn UsbTransport>,
    tracker: Arc<ModemTracker>,
    metrics: Arc<StatusMetrics>,
    hooks: Arc<EventHooks>,
    config: SessionConfig,
    /// 最近一次应用的线路参数
    line: ArcSwap<LineParameters>,
    version: AtomicU8,
    /// 控制面锁；打开状态下持有监听线程
    control: Mutex<Option<StatusListener>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// 挂载：读取版本、初始化串口模式、写入默认线路参数与握手线
    pub(crate) fn attach(
        transport: Arc<dyn UsbTransport>,
        config: SessionConfig,
        hooks: EventHooks,
    ) -> Result<Self, DriverError> {
        let metrics = Arc::new(StatusMetrics::new());
        let registers =
            RegisterProtocol::new(transport.clone(), config.control_timeout(), metrics.clone());
        let tracker = Arc::new(ModemTracker::new());

        let line = config.default_line;
        let encoding = encode_baud(line.baud_rate)?;
        let lcr = line.line_control();

        let version = registers.query_version()?;
        registers.initialize_serial_mode()?;
        registers.program_baud_and_frame(encoding.word(), lcr)?;
        registers.program_handshake(tracker.get_control())?;
        tracker.set_line_shadow(line.baud_rate, lcr);

        info!(
            "CH340 attached: chip version {}, line {} (achieved {} Bd)",
            version, line, encoding.achieved
        );

        Ok(Self {
            registers,
            transport,
            tracker,
            metrics,
            hooks: Arc::new(hooks),
            line: ArcSwap::from_pointee(line),
            version: AtomicU8::new(version.0),
            config,
            control: Mutex::new(None),
        })
    }

    fn listener_context(&self) -> ListenerContext {
        ListenerContext {
            transport: self.transport.clone(),
            tracker: self.tracker.clone(),
            metrics: self.metrics.clone(),
            hooks: self.hooks.clone(),
        }
    }

    /// 启动监听线程并同步读取一次状态；读取失败时取消线程
    fn arm(&self) -> Result<StatusListener, DriverError> {
        let listener = StatusListener::spawn(self.listener_context(), &self.config)?;
        match self.registers.read_status_register() {
            Ok(status) => {
                self.tracker.seed_status(status);
                debug!("Initial modem status {:?}", status);
                Ok(listener)
            },
            Err(e) => {
                listener.cancel();
                Err(e)
            },
        }
    }

    /// 打开线路
    ///
    /// 参数与当前生效的参数相同时不重新编程。
    pub fn open(&self, params: LineParameters) -> Result<(), DriverError> {
        let mut control = self.control.lock();
        if control.is_some() {
            return Err(DriverError::AlreadyOpen);
        }

        self.apply_line(params, None)?;
        *control = Some(self.arm()?);
        info!("Session opened ({})", self.line_parameters());
        Ok(())
    }

    /// 关闭线路，返回监听线程的最终状态（正常为 Cancelled）
    pub fn close(&self) -> Result<ListenerState, DriverError> {
        let mut control = self.control.lock();
        let listener = control.take().ok_or(DriverError::NotOpen)?;
        let state = listener.cancel();
        info!("Session closed (listener {:?})", state);
        Ok(state)
    }

    pub fn is_open(&self) -> bool {
        self.control.lock().is_some()
    }

    pub fn listener_state(&self) -> ListenerState {
        self.control
            .lock()
            .as_ref()
            .map_or(ListenerState::Idle, StatusListener::state)
    }

    /// 设置线路参数
    ///
    /// - 与 `old`（未提供时为当前参数）完全相同时不发起任何传输
    /// - 波特率为 0 表示挂断：不重新编程，只放下 DTR/RTS
    /// - 编程失败且提供了 `old` 时，重新写入 `old` 并返回 `RolledBack`
    pub fn set_line_parameters(
        &self,
        new: LineParameters,
        old: Option<LineParameters>,
    ) -> Result<(), DriverError> {
        let _control = self.control.lock();
        self.apply_line(new, old)
    }

    /// 调用方必须持有控制面锁
    fn apply_line(
        &self,
        new: LineParameters,
        old: Option<LineParameters>,
    ) -> Result<(), DriverError> {
        let current = **self.line.load();
        let reference = old.unwrap_or(current);
        if new == reference {
            trace!("Line parameters unchanged ({}), skipping reprogram", new);
            return Ok(());
        }

        let mut effective = new;
        let mut outcome = Ok(());
        if !new.is_hangup() {
            let encoding = encode_baud(new.baud_rate)?;
            let lcr = new.line_control();
            match self.registers.program_baud_and_frame(encoding.word(), lcr) {
                Ok(()) => {
                    self.tracker.set_line_shadow(new.baud_rate, lcr);
                    debug!(
                        "Line set to {} (factor {}, divisor {}, x2 {}, achieved {} Bd)",
                        new, encoding.factor, encoding.divisor, encoding.clock_x2, encoding.achieved
                    );
                },
                Err(err) => {
                    let (err, restored) = self.roll_back(err, old, current);
                    effective = restored;
                    outcome = Err(err);
                },
            }
        }
        self.line.store(Arc::new(effective));

        let control = self.tracker.get_control();
        let desired = if effective.is_hangup() {
            ModemControl::both(false)
        } else if reference.is_hangup() {
            ModemControl::both(true)
        } else {
            control
        };
        let handshake = self.program_control(desired);

        outcome.and(handshake)
    }

    /// 两步编程失败后的恢复；返回要上报的错误与此后生效的参数
    fn roll_back(
        &self,
        err: DriverError,
        old: Option<LineParameters>,
        current: LineParameters,
    ) -> (DriverError, LineParameters) {
        let Some(prior) = old else {
            warn!("Line reprogram failed with no prior parameters: {}", err);
            return (err, current);
        };

        warn!("Line reprogram failed ({}), re-syncing to {}", err, prior);
        if !prior.is_hangup() {
            let lcr = prior.line_control();
            let resync = encode_baud(prior.baud_rate)
                .map_err(DriverError::from)
                .and_then(|encoding| self.registers.program_baud_and_frame(encoding.word(), lcr));
            if let Err(resync_err) = resync {
                error!("Re-sync to {} failed: {}", prior, resync_err);
                return (err, current);
            }
            self.tracker.set_line_shadow(prior.baud_rate, lcr);
        }

        (
            DriverError::RolledBack {
                restored: prior,
                source: Box::new(err),
            },
            prior,
        )
    }

    /// 写入握手线并在成功后更新影子
    fn program_control(&self, control: ModemControl) -> Result<(), DriverError> {
        self.registers.program_handshake(control)?;
        self.tracker.set_control(control);
        trace!("Control lines: dtr={} rts={}", control.dtr, control.rts);
        Ok(())
    }

    /// 设置 DTR/RTS
    pub fn set_control_lines(&self, dtr: bool, rts: bool) -> Result<(), DriverError> {
        let _control = self.control.lock();
        self.program_control(ModemControl::new(dtr, rts))
    }

    /// 按掩码置位/清除控制线（清除优先），返回新的控制位
    pub fn update_control_lines(
        &self,
        set: ModemControl,
        clear: ModemControl,
    ) -> Result<ModemControl, DriverError> {
        let _control = self.control.lock();
        let next = self.tracker.get_control().update(set, clear);
        self.program_control(next)?;
        Ok(next)
    }

    /// 同时拉高/放下 DTR 与 RTS
    pub fn dtr_rts(&self, on: bool) -> Result<(), DriverError> {
        self.set_control_lines(on, on)
    }

    pub fn get_control_lines(&self) -> ModemLines {
        self.tracker.lines()
    }

    /// 等待掩码内任一输入信号变化
    pub fn wait_for_signal_change(
        &self,
        mask: ModemStatus,
        timeout: Duration,
    ) -> Result<ModemStatus, DriverError> {
        self.tracker.wait_for_change(mask, timeout)
    }

    pub fn is_carrier_present(&self) -> bool {
        self.tracker.is_carrier_present()
    }

    /// 进入/退出 Break（读-改-写 Break 寄存器对）
    pub fn set_break(&self, enabled: bool) -> Result<(), DriverError> {
        let _control = self.control.lock();
        let reg = self.registers.read_break_register()?;
        let next = reg.with_break(enabled);
        self.registers.write_break_register(next)?;
        debug!("Break {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    /// 总线复位后恢复
    ///
    /// 重新执行挂载时的寄存器协议（使用影子中的波特率与 LCR）。之前处于
    /// 打开状态时，无论寄存器协议是否成功，都重新启动监听线程并重新读取
    /// 状态；最后总是执行传输层恢复。返回第一个错误。
    ///
    /// 监听线程无法创建时会话变为关闭状态。
    pub fn resume_after_reset(&self) -> Result<(), DriverError> {
        let mut control = self.control.lock();

        let configured = self.reprogram_from_shadow();
        if let Err(e) = &configured {
            error!("Reconfiguration after reset failed: {}", e);
        }

        let rearmed = self.rearm(&mut control);
        if let Err(e) = &rearmed {
            error!("Re-arming status listener after reset failed: {}", e);
        }

        let resumed = self.transport.resume().map_err(DriverError::from);
        configured.and(rearmed).and(resumed)
    }

    fn reprogram_from_shadow(&self) -> Result<(), DriverError> {
        let (baud_rate, lcr) = self.tracker.line_shadow();
        let encoding = encode_baud(baud_rate)?;

        let version = self.registers.query_version()?;
        self.version.store(version.0, Ordering::Relaxed);
        self.registers.initialize_serial_mode()?;
        self.registers.program_baud_and_frame(encoding.word(), lcr)?;
        self.registers.program_handshake(self.tracker.get_control())?;
        info!("Session reconfigured after reset");
        Ok(())
    }

    /// 替换监听线程并重新读取状态；未打开时什么也不做
    ///
    /// 与 `arm` 不同，状态读取失败时保留新线程，会话仍处于打开状态。
    fn rearm(&self, control: &mut Option<StatusListener>) -> Result<(), DriverError> {
        let Some(previous) = control.take() else {
            return Ok(());
        };
        let state = previous.cancel();
        debug!("Previous status listener ended in {:?}", state);

        *control = Some(StatusListener::spawn(self.listener_context(), &self.config)?);
        let status = self.registers.read_status_register()?;
        self.tracker.seed_status(status);
        debug!("Modem status after reset {:?}", status);
        Ok(())
    }

    pub fn chip_version(&self) -> ChipVersion {
        ChipVersion(self.version.load(Ordering::Relaxed))
    }

    pub fn line_parameters(&self) -> LineParameters {
        **self.line.load()
    }

    pub fn signal_counters(&self) -> SignalCounters {
        self.tracker.counters()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
