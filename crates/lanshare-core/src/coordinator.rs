//! 协调器：进程内唯一的注册表和文件存储的所有者
//!
//! 由二进制程序构造一次，以 `Arc<Coordinator>` 传给 HTTP 层和清理任务。

use crate::clock::{Clock, SystemClock};
use crate::config::ServerSettings;
use crate::error::Result;
use crate::registry::{DeviceId, DeviceRegistry};
use crate::store::{FileId, FileMeta, FileStore, Requester};
use crate::validate::UploadLimits;
use bytes::Bytes;
use log::debug;
use std::sync::Arc;

pub struct Coordinator {
    registry: DeviceRegistry,
    store: FileStore,
    limits: UploadLimits,
    server_name: String,
}

/// 服务状态计数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub devices: usize,
    pub files: usize,
    pub stored_bytes: u64,
}

impl Coordinator {
    pub fn new(settings: &ServerSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &ServerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: DeviceRegistry::new(clock.clone(), settings.liveness_window()),
            store: FileStore::new(
                clock,
                settings.file_max_age(),
                settings.max_total_bytes,
                settings.target_policy(),
            ),
            limits: settings.upload_limits(),
            server_name: settings.server_name.clone(),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// 对照注册表解析请求方
    ///
    /// 未知或已过期的设备 ID 不能匹配任何定向文件，也不享有匿名访问的兼容策略。
    pub fn requester(&self, device_id: Option<DeviceId>) -> Requester {
        match device_id {
            None => Requester::Anonymous,
            Some(id) if self.registry.get(&id).is_some() => Requester::Device(id),
            Some(id) => {
                debug!("Requester {} is not an active device", id);
                Requester::Unrecognized
            }
        }
    }

    /// 列出请求方可见的文件
    pub fn list_files(&self, device_id: Option<DeviceId>) -> Vec<FileMeta> {
        self.store.list(self.requester(device_id))
    }

    /// 以请求方身份领取文件，见 [`FileStore::get_for_download`]
    pub fn claim_file(
        &self,
        id: &FileId,
        device_id: Option<DeviceId>,
    ) -> Result<(FileMeta, Bytes)> {
        self.store.get_for_download(id, self.requester(device_id))
    }

    pub fn stats(&self) -> Stats {
        Stats {
            devices: self.registry.active_count(),
            files: self.store.len(),
            stored_bytes: self.store.stored_bytes(),
        }
    }
}
