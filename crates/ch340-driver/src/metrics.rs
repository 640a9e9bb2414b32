//! 状态通道与控制面指标
//!
//! 所有计数器都使用原子操作，可以在任何线程读取，不会与状态锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 会话运行指标
#[derive(Debug, Default)]
pub struct StatusMetrics {
    /// 状态端点收到的总帧数（包括过短帧）
    pub frames_received: AtomicU64,
    /// 长度不足 4 字节被丢弃的帧数
    pub short_frames: AtomicU64,
    /// 标记了 "多次变化已合并" 的帧数
    pub coalesced_frames: AtomicU64,
    /// 至少有一个信号发生变化的帧数
    pub status_changes: AtomicU64,
    /// 状态端点读取超时次数（正常现象，无变化时会超时）
    pub endpoint_timeouts: AtomicU64,
    /// 状态端点错误次数
    pub endpoint_errors: AtomicU64,
    /// 发出的控制传输数
    pub control_transfers: AtomicU64,
    /// 失败的控制传输数
    pub control_failures: AtomicU64,
}

impl StatusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            short_frames: self.short_frames.load(Ordering::Relaxed),
            coalesced_frames: self.coalesced_frames.load(Ordering::Relaxed),
            status_changes: self.status_changes.load(Ordering::Relaxed),
            endpoint_timeouts: self.endpoint_timeouts.load(Ordering::Relaxed),
            endpoint_errors: self.endpoint_errors.load(Ordering::Relaxed),
            control_transfers: self.control_transfers.load(Ordering::Relaxed),
            control_failures: self.control_failures.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.frames_received.store(0, Ordering::Relaxed);
        self.short_frames.store(0, Ordering::Relaxed);
        self.coalesced_frames.store(0, Ordering::Relaxed);
        self.status_changes.store(0, Ordering::Relaxed);
        self.endpoint_timeouts.store(0, Ordering::Relaxed);
        self.endpoint_errors.store(0, Ordering::Relaxed);
        self.control_transfers.store(0, Ordering::Relaxed);
        self.control_failures.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub short_frames: u64,
    pub coalesced_frames: u64,
    pub status_changes: u64,
    pub endpoint_timeouts: u64,
    pub endpoint_errors: u64,
    pub control_transfers: u64,
    pub control_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = StatusMetrics::new();
        metrics.frames_received.fetch_add(3, Ordering::Relaxed);
        metrics.short_frames.fetch_add(1, Ordering::Relaxed);
        metrics.control_transfers.fetch_add(5, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.frames_received, 3);
        assert_eq!(snap.short_frames, 1);
        assert_eq!(snap.control_transfers, 5);
        assert_eq!(snap.endpoint_errors, 0);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
