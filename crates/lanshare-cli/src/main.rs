//! lanshare CLI
//!
//! 命令行客户端，通过 HTTP API 与 lanshare 服务通信

mod client;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use client::{ApiClient, Heartbeat};
use lanshare_core::validate::format_size;
use std::path::PathBuf;
use std::time::Duration;

/// 客户端心跳间隔，与网页客户端一致
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "lanshare", version, about = "局域网文件中转 - 命令行客户端")]
struct Cli {
    /// 服务地址
    #[arg(short, long, env = "LANSHARE_SERVER", default_value = "http://127.0.0.1:8000")]
    server: String,
    /// 本机设备 ID (默认使用 join 保存的 ID)
    #[arg(short, long, global = true)]
    device: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 注册本机并持续发送心跳
    Join {
        /// 设备名称 (默认由服务端推断)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// 列出在线设备
    Devices,
    /// 上传文件
    Send {
        /// 要发送的文件路径
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// 目标设备 ID (不指定则所有设备可见)
        #[arg(short, long)]
        to: Option<String>,
    },
    /// 列出可下载的文件
    Files,
    /// 下载文件（下载后服务端即删除）
    Get {
        file_id: String,
        /// 保存目录 (默认: ~/Downloads)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 删除文件
    Delete { file_id: String },
    /// 查看服务状态
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = ApiClient::new(&cli.server);
    let device = cli.device.clone().or_else(client::load_device_id);

    match cli.command {
        Commands::Join { name } => join(&api, name.as_deref()).await?,
        Commands::Devices => {
            let resp = api.devices(device.as_deref()).await?;
            if resp.devices.is_empty() {
                println!("   没有其他在线设备");
            }
            for (i, dev) in resp.devices.iter().enumerate() {
                println!("   [{}] {} ({}) id={}", i, dev.name, dev.ip, dev.id);
            }
        }
        Commands::Send { files, to } => {
            println!("📤 上传 {} 个文件", files.len());
            if let Some(target) = &to {
                println!("   目标设备: {}", target);
            }
            let resp = api.upload(&files, to.as_deref()).await?;
            println!("✅ {}", resp.message);
            for file in &resp.files {
                println!("   {} ({}) id={}", file.name, format_size(file.size), file.file_id);
            }
        }
        Commands::Files => {
            let resp = api.files(device.as_deref()).await?;
            if resp.files.is_empty() {
                println!("   没有可下载的文件");
            }
            for file in &resp.files {
                let scope = if file.target_device.is_some() { "定向" } else { "公开" };
                println!(
                    "   {} ({}, {}) [{}] id={}",
                    file.original_name,
                    format_size(file.size),
                    file.timestamp.format("%Y-%m-%d %H:%M"),
                    scope,
                    file.id
                );
            }
        }
        Commands::Get { file_id, output } => {
            let dir = output
                .or_else(dirs::download_dir)
                .unwrap_or_else(|| PathBuf::from("."));
            let path = api.download(&file_id, device.as_deref(), &dir).await?;
            println!("📥 已保存到: {}", path.display());
        }
        Commands::Delete { file_id } => {
            api.delete(&file_id).await?;
            println!("🗑️  已删除");
        }
        Commands::Info => {
            let info = api.info().await?;
            println!("状态: {} ({} v{})", info.status, info.server_name, info.version);
            println!("在线设备: {}", info.devices_count);
            println!("文件: {} ({})", info.files_count, format_size(info.stored_bytes));
        }
    }

    Ok(())
}

/// 注册并保持在线，服务端遗忘设备后自动重新注册
async fn join(api: &ApiClient, name: Option<&str>) -> Result<()> {
    let mut device_id = register(api, name).await?;
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("⏹️  停止心跳");
                return Ok(());
            }
            _ = ticker.tick() => {
                match api.heartbeat(&device_id).await {
                    Ok(Heartbeat::Alive) => {}
                    Ok(Heartbeat::Expired) => {
                        println!("⚠️  设备已过期，重新注册");
                        device_id = register(api, name).await?;
                    }
                    Err(e) => eprintln!("❌ 心跳失败: {}", e),
                }
            }
        }
    }
}

async fn register(api: &ApiClient, name: Option<&str>) -> Result<String> {
    let resp = api.register(name).await?;
    if resp.status != "registered" {
        bail!("unexpected register status: {}", resp.status);
    }
    let id = resp.device_id.to_string();
    client::save_device_id(&id)?;
    println!("✅ 已注册，设备 ID: {}", id);
    Ok(id)
}
