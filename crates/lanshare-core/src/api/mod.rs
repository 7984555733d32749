//! HTTP API 服务器
//!
//! 将协调器的操作一对一映射到现有网页客户端使用的 REST 接口：
//!
//! | 方法 | 路径 | 操作 |
//! |---|---|---|
//! | POST | `/api/register-device` | 注册设备 |
//! | POST | `/api/heartbeat/:device_id` | 心跳 |
//! | GET | `/api/devices` | 设备列表 |
//! | POST | `/api/upload` | 上传 (multipart) |
//! | GET | `/api/files` | 文件列表 |
//! | GET | `/api/download/:file_id` | 下载（下载后即删除） |
//! | DELETE | `/api/delete/:file_id` | 删除 |
//! | GET | `/api/info` | 服务状态 |

mod handlers;
pub mod wire;

use crate::coordinator::Coordinator;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// multipart 边界和字段头的额外空间
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// 构建路由
///
/// 请求体上限按整个存储预算计算，一次可以上传多个文件。单个文件的大小
/// 在读取字段时检查。
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    let body_limit = usize::try_from(coordinator.store().max_total_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/register-device", post(handlers::register_device))
        .route("/api/heartbeat/:device_id", post(handlers::heartbeat))
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/upload", post(handlers::upload_files))
        .route("/api/files", get(handlers::list_files))
        .route("/api/download/:file_id", get(handlers::download_file))
        .route("/api/delete/:file_id", delete(handlers::delete_file))
        .route("/api/info", get(handlers::server_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(coordinator)
}

/// API 服务器
pub struct ApiServer {
    coordinator: Arc<Coordinator>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            shutdown: CancellationToken::new(),
            task: None,
        }
    }

    /// 绑定地址并在后台开始服务，返回实际监听地址（端口可为 0）
    pub async fn start(&mut self, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let app = router(self.coordinator.clone());
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        info!("API server listening on {}", local_addr);

        let shutdown = self.shutdown.clone();
        self.task = Some(tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                error!("API server error: {}", e);
            }
        }));

        Ok(local_addr)
    }

    /// 停止接受新连接并等待进行中的请求完成
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("API server stopped");
    }
}
