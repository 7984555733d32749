//! Core Service - 协调器、API 服务器和清理任务的生命周期

use anyhow::{Context, Result};
use lanshare_core::validate::format_size;
use lanshare_core::{ApiServer, Coordinator, ServerSettings, net, sweep};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run_service(settings: ServerSettings) -> Result<()> {
    let coordinator = Arc::new(Coordinator::new(&settings));

    let cancel = CancellationToken::new();
    let reaper = sweep::spawn_reaper(
        coordinator.clone(),
        settings.reap_interval(),
        cancel.clone(),
    );

    let mut server = ApiServer::new(coordinator.clone());
    let addr = SocketAddr::new(settings.bind_addr, settings.port);
    let local_addr = server
        .start(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("服务名称: {}", settings.server_name);
    tracing::info!(
        "局域网地址: http://{}:{}",
        net::local_ip(),
        local_addr.port()
    );
    tracing::info!(
        "存活窗口 {}s, 文件保留 {}h, 单文件上限 {}, 存储预算 {}",
        settings.liveness_window_secs,
        settings.file_max_age_hours,
        format_size(settings.max_file_size),
        format_size(settings.max_total_bytes)
    );
    if settings.legacy_anonymous_access {
        tracing::warn!("{}", anonymous_access_notice(&settings));
    } else {
        tracing::info!("{}", anonymous_access_notice(&settings));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("收到退出信号，正在关闭...");
    cancel.cancel();
    server.stop().await;
    let _ = reaper.await;

    let stats = coordinator.stats();
    tracing::info!(
        "已退出，丢弃 {} 个未下载文件 ({})",
        stats.files,
        format_size(stats.stored_bytes)
    );
    Ok(())
}

/// 匿名访问策略的启动提示
fn anonymous_access_notice(settings: &ServerSettings) -> &'static str {
    if settings.legacy_anonymous_access {
        "匿名请求可以看到所有文件 (legacy_anonymous_access)"
    } else {
        "匿名请求只能看到未指定目标的文件，旧网页客户端需要 --legacy-anonymous-access"
    }
}
