//! 后台清理任务
//!
//! 定期回收过期设备和超过保留时间的文件。存活判断本身在查询时惰性完成，
//! 这里只负责释放内存；每次只在单个组件的锁内操作，不会阻塞请求处理太久。

use crate::coordinator::Coordinator;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub devices_reaped: usize,
    pub files_purged: usize,
}

/// 执行一次清理
pub fn sweep_once(coordinator: &Coordinator) -> SweepReport {
    let report = SweepReport {
        devices_reaped: coordinator.registry().reap_expired(),
        files_purged: coordinator.store().purge_expired(),
    };
    if report.devices_reaped > 0 || report.files_purged > 0 {
        debug!(
            "Sweep reaped {} device(s), purged {} file(s)",
            report.devices_reaped, report.files_purged
        );
    }
    report
}

/// 启动清理任务，`cancel` 被取消后退出
pub fn spawn_reaper(
    coordinator: Arc<Coordinator>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即完成
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    sweep_once(&coordinator);
                }
            }
        }
        info!("Reaper stopped");
    })
}
