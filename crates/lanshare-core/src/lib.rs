//! lanshare Core Library
//!
//! 局域网文件中转服务的核心：设备注册与心跳存活、一次性消费的文件存储，
//! 以及映射到网页客户端 REST 接口的 HTTP 层。
//!
//! # 模块
//!
//! - **registry**: 设备注册表，心跳与存活窗口
//! - **store**: 文件存储，下载即删除，目标设备限制
//! - **sweep**: 后台清理过期设备和文件
//! - **api**: axum HTTP 服务器
//! - **config**: 服务配置 (TOML)
//!
//! # 使用示例
//!
//! ```ignore
//! use lanshare_core::{ApiServer, Coordinator, ServerSettings};
//!
//! let settings = ServerSettings::load();
//! let coordinator = Arc::new(Coordinator::new(&settings));
//!
//! let cancel = CancellationToken::new();
//! lanshare_core::sweep::spawn_reaper(coordinator.clone(), settings.reap_interval(), cancel);
//!
//! let mut server = ApiServer::new(coordinator);
//! server.start(SocketAddr::new(settings.bind_addr, settings.port)).await?;
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod net;
pub mod registry;
pub mod store;
pub mod sweep;
pub mod validate;

pub use api::ApiServer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServerSettings;
pub use coordinator::{Coordinator, Stats};
pub use error::{Error, Result};
pub use logging::LogLevel;
pub use registry::{Device, DeviceId, DeviceRegistry};
pub use store::{FileId, FileMeta, FileStore, Requester, TargetPolicy};
