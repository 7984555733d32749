//! lanshare Daemon
//!
//! 局域网文件中转服务进程，负责：
//! - 加载配置并应用命令行覆盖
//! - 启动 HTTP API 服务
//! - 运行后台清理任务
//! - 收到 Ctrl-C 后优雅退出

mod service;

use anyhow::Result;
use clap::Parser;
use lanshare_core::config::ConfigError;
use lanshare_core::{LogLevel, ServerSettings};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lanshare-daemon", version, about = "局域网文件中转服务")]
struct Args {
    /// 配置文件路径 (默认: <config_dir>/lanshare/server.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// 监听地址
    #[arg(long)]
    bind: Option<IpAddr>,
    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,
    /// 日志级别 (error, warn, info, debug, trace)
    #[arg(short, long)]
    log_level: Option<LogLevel>,
    /// 允许匿名请求看到并下载所有文件（旧网页客户端）
    #[arg(long)]
    legacy_anonymous_access: bool,
    /// 将生效的配置写回配置文件
    #[arg(long)]
    save_config: bool,
}

impl Args {
    /// 加载配置并应用命令行覆盖
    ///
    /// 配置文件错误随设置一起返回，等日志初始化之后再报告。
    fn settings(&self) -> (ServerSettings, Option<ConfigError>) {
        let path = self.config.clone().unwrap_or_else(ServerSettings::config_path);
        let (mut settings, load_error) = match ServerSettings::try_load_from(&path) {
            Ok(settings) => (settings, None),
            Err(e) => (ServerSettings::default(), Some(e)),
        };
        if let Some(bind) = self.bind {
            settings.bind_addr = bind;
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(level) = self.log_level {
            settings.log_level = level;
        }
        if self.legacy_anonymous_access {
            settings.legacy_anonymous_access = true;
        }
        (settings, load_error)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (settings, load_error) = args.settings();

    // 桥接 log crate（lanshare-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    // 初始化日志
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.directive())),
        )
        .try_init();

    if let Some(e) = load_error {
        tracing::warn!("{}, using defaults", e);
    }

    if args.save_config {
        let path = args.config.clone().unwrap_or_else(ServerSettings::config_path);
        settings.save_to(&path)?;
        tracing::info!("Settings saved to {:?}", path);
    }

    tracing::info!("lanshare daemon starting...");
    service::run_service(settings).await
}
