//! 状态通知监听线程
//!
//! 后台线程循环执行：等待状态帧 -> 解码 -> 更新跟踪器 -> 通知等待者，
//! 每次迭代开始时检查取消标志。端点报告设备移除时线程立即退出，
//! 不再重新等待。
//!
//! ```text
//! Idle -> Armed -> Decoding -> Armed -> ... -> Cancelled
//! ```

use crate::config::SessionConfig;
use crate::error::DriverError;
use crate::events::EventHooks;
use crate::metrics::StatusMetrics;
use crate::tracker::ModemTracker;
use ch340_protocol::StatusFrame;
use ch340_usb::UsbTransport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 监听线程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Idle = 0,
    Armed = 1,
    Decoding = 2,
    Cancelled = 3,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Armed,
            2 => Self::Decoding,
            3 => Self::Cancelled,
            _ => Self::Idle,
        }
    }
}

/// 带超时的 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 监听线程共享的组件
#[derive(Clone)]
pub struct ListenerContext {
    pub transport: Arc<dyn UsbTransport>,
    pub tracker: Arc<ModemTracker>,
    pub metrics: Arc<StatusMetrics>,
    pub hooks: Arc<EventHooks>,
}

/// 运行中的监听线程句柄
pub struct StatusListener {
    is_running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl StatusListener {
    /// 启动监听线程；返回时线程已处于 Armed（或已因错误退出）
    pub fn spawn(ctx: ListenerContext, config: &SessionConfig) -> Result<Self, DriverError> {
        let is_running = Arc::new(AtomicBool::new(true));
        let state = Arc::new(AtomicU8::new(ListenerState::Idle as u8));

        let generation = ctx.tracker.begin_listening();
        state.store(ListenerState::Armed as u8, Ordering::Release);

        let handle = {
            let is_running = is_running.clone();
            let state = state.clone();
            let tracker = ctx.tracker.clone();
            let poll = config.status_poll();
            let backoff = config.error_backoff();
            let buf_len = config.status_buffer_len();
            std::thread::Builder::new()
                .name("ch340-status".into())
                .spawn(move || {
                    status_loop(ctx, generation, is_running, state, poll, backoff, buf_len)
                })
                .inspect_err(|_| tracker.end_listening(generation))?
        };

        debug!("Status listener armed");
        Ok(Self {
            is_running,
            state,
            handle: Some(handle),
            join_timeout: config.join_timeout(),
        })
    }

    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 线程是否仍在运行（未被取消，也未因致命错误退出）
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 取消并等待线程退出，返回最终状态
    pub fn cancel(mut self) -> ListenerState {
        self.shutdown();
        self.state()
    }

    fn shutdown(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && let Err(_e) = handle.join_timeout(self.join_timeout)
        {
            error!(
                "Status listener panicked or failed to shut down within {:?}",
                self.join_timeout
            );
        }
    }
}

impl Drop for StatusListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 监听线程主循环
fn status_loop(
    ctx: ListenerContext,
    generation: u64,
    is_running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    poll: Duration,
    backoff: Duration,
    buf_len: usize,
) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => info!("Status thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "Failed to set status thread priority: {}. \
                On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                e
            ),
        }
    }

    let mut buf = vec![0u8; buf_len];

    loop {
        // Acquire: 看到 false 时必须同时看到关闭方之前的所有写入
        if !is_running.load(Ordering::Acquire) {
            trace!("Status thread: cancelled, exiting");
            break;
        }

        match ctx.transport.read_status(&mut buf, poll) {
            Ok(len) => {
                state.store(ListenerState::Decoding as u8, Ordering::Release);
                handle_frame(&ctx, &buf[..len]);
                state.store(ListenerState::Armed as u8, Ordering::Release);
            },
            Err(e) if e.is_timeout() => {
                ctx.metrics.endpoint_timeouts.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) if e.is_fatal() => {
                ctx.metrics.endpoint_errors.fetch_add(1, Ordering::Relaxed);
                error!("Status endpoint gone ({}), stopping listener", e);
                is_running.store(false, Ordering::Release);
                break;
            },
            Err(e) => {
                ctx.metrics.endpoint_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Status endpoint error: {}, re-arming", e);
                std::thread::sleep(backoff);
            },
        }
    }

    ctx.tracker.end_listening(generation);
    state.store(ListenerState::Cancelled as u8, Ordering::Release);
    info!("Status listener cancelled");
}

/// 解码一帧并更新状态；过短的帧直接丢弃
fn handle_frame(ctx: &ListenerContext, data: &[u8]) {
    ctx.metrics.frames_received.fetch_add(1, Ordering::Relaxed);

    let frame = match StatusFrame::parse(data) {
        Ok(frame) => frame,
        Err(e) => {
            ctx.metrics.short_frames.fetch_add(1, Ordering::Relaxed);
            trace!("Dropping status frame [{}]: {}", hex::encode(data), e);
            return;
        },
    };

    if frame.multiple_events() {
        ctx.metrics.coalesced_frames.fetch_add(1, Ordering::Relaxed);
        debug!("Status frame reports coalesced events");
    }

    let (status, changed) = ctx.tracker.apply(frame.status);
    if !changed.is_empty() {
        ctx.metrics.status_changes.fetch_add(1, Ordering::Relaxed);
        ctx.hooks.dispatch(status, changed);
    }
}
