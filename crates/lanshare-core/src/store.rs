//! 文件存储
//!
//! 保存上传的文件内容和元数据，执行一次性消费语义和目标设备限制。
//!
//! # 状态机
//!
//! ```text
//! available --[download]--> gone
//! available --[delete]----> gone
//! available --[age > max_age]--> gone
//! ```
//!
//! 状态翻转在一次加锁内完成（`HashMap::remove`），因此同一文件的并发下载/删除
//! 只有一个能成功。文件内容是引用计数的 [`Bytes`]，锁释放后再发送给客户端。

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::registry::DeviceId;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// 文件默认保留时间
pub const DEFAULT_FILE_MAX_AGE: Duration = Duration::hours(48);

/// 默认存储预算 (8 GiB)
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 8 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for FileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// 文件元数据（不含内容）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub id: FileId,
    /// 客户端提供的文件名，仅用于显示
    pub original_name: String,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    pub target_device_id: Option<DeviceId>,
}

impl FileMeta {
    /// 根据扩展名猜测 MIME 类型
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.original_name)
            .first_or_octet_stream()
            .to_string()
    }
}

/// 目标设备限制策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetPolicy {
    /// 匿名请求（未携带设备 ID）可以看到并下载所有文件
    pub legacy_anonymous_access: bool,
}

impl TargetPolicy {
    fn permits(&self, meta: &FileMeta, requester: Requester) -> bool {
        match (meta.target_device_id, requester) {
            (None, _) => true,
            (Some(target), Requester::Device(id)) => target == id,
            (Some(_), Requester::Anonymous) => self.legacy_anonymous_access,
            (Some(_), Requester::Unrecognized) => false,
        }
    }
}

/// 列表和下载的请求方身份
///
/// 由 [`crate::Coordinator::requester`] 对照注册表解析得到：只有存活设备才能
/// 匹配定向文件的目标。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    /// 未携带设备 ID
    Anonymous,
    /// 存活设备
    Device(DeviceId),
    /// 携带了未知或已过期的设备 ID，只能访问未定向的文件
    Unrecognized,
}

struct StoredFile {
    meta: FileMeta,
    content: Bytes,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    files: HashMap<FileId, StoredFile>,
    stored_bytes: u64,
    next_seq: u64,
}

impl Inner {
    fn remove(&mut self, id: &FileId) -> Option<StoredFile> {
        let file = self.files.remove(id)?;
        self.stored_bytes -= file.meta.size;
        Some(file)
    }
}

pub struct FileStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    max_total_bytes: u64,
    policy: TargetPolicy,
}

impl FileStore {
    pub fn new(
        clock: Arc<dyn Clock>,
        max_age: Duration,
        max_total_bytes: u64,
        policy: TargetPolicy,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            max_age,
            max_total_bytes,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, meta: &FileMeta, now: DateTime<Utc>) -> bool {
        now - meta.timestamp > self.max_age
    }

    /// 存入单个文件
    pub fn put(
        &self,
        original_name: impl Into<String>,
        content: Bytes,
        target: Option<DeviceId>,
    ) -> Result<FileMeta> {
        let mut stored = self.put_batch(vec![(original_name.into(), content)], target)?;
        Ok(stored.remove(0))
    }

    /// 原子地存入一批文件：要么全部存入，要么一个都不存
    pub fn put_batch(
        &self,
        items: Vec<(String, Bytes)>,
        target: Option<DeviceId>,
    ) -> Result<Vec<FileMeta>> {
        let requested: u64 = items.iter().map(|(_, c)| c.len() as u64).sum();
        let now = self.clock.now();

        let mut inner = self.lock();
        let available = self.max_total_bytes.saturating_sub(inner.stored_bytes);
        if requested > available {
            return Err(Error::StorageExhausted {
                requested,
                available,
            });
        }

        let mut stored = Vec::with_capacity(items.len());
        for (original_name, content) in items {
            let meta = FileMeta {
                id: FileId::generate(),
                original_name,
                size: content.len() as u64,
                timestamp: now,
                target_device_id: target,
            };
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.stored_bytes += meta.size;
            info!(
                "File stored: {} ({} bytes) id={} target={:?}",
                meta.original_name, meta.size, meta.id, meta.target_device_id
            );
            inner.files.insert(
                meta.id,
                StoredFile {
                    meta: meta.clone(),
                    content,
                    seq,
                },
            );
            stored.push(meta);
        }
        Ok(stored)
    }

    /// 列出请求方可见的文件，按上传时间升序
    pub fn list(&self, requester: Requester) -> Vec<FileMeta> {
        let now = self.clock.now();
        let inner = self.lock();

        let mut visible: Vec<&StoredFile> = inner
            .files
            .values()
            .filter(|f| {
                !self.is_expired(&f.meta, now) && self.policy.permits(&f.meta, requester)
            })
            .collect();
        visible.sort_by_key(|f| (f.meta.timestamp, f.seq));
        visible.into_iter().map(|f| f.meta.clone()).collect()
    }

    /// 领取文件用于下载
    ///
    /// 检查与状态翻转在同一临界区内完成：成功返回后该 ID 永久失效。
    /// 请求方无权访问（目标设备不符）时返回 [`Error::NotFound`]，且不消费该文件。
    pub fn get_for_download(
        &self,
        id: &FileId,
        requester: Requester,
    ) -> Result<(FileMeta, Bytes)> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let file = inner.files.get(id).ok_or(Error::NotFound)?;
        if self.is_expired(&file.meta, now) {
            inner.remove(id);
            return Err(Error::NotFound);
        }
        if !self.policy.permits(&file.meta, requester) {
            debug!("Download of {} refused for requester {:?}", id, requester);
            return Err(Error::NotFound);
        }

        let file = inner.remove(id).ok_or(Error::NotFound)?;
        info!("File claimed for download: {} id={}", file.meta.original_name, id);
        Ok((file.meta, file.content))
    }

    /// 显式删除
    pub fn delete(&self, id: &FileId) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let file = inner.remove(id).ok_or(Error::NotFound)?;
        if self.is_expired(&file.meta, now) {
            return Err(Error::NotFound);
        }
        info!("File deleted: {} id={}", file.meta.original_name, id);
        Ok(())
    }

    /// 移除超过保留时间的文件，返回移除数量
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let expired: Vec<FileId> = inner
            .files
            .values()
            .filter(|f| self.is_expired(&f.meta, now))
            .map(|f| f.meta.id)
            .collect();
        for id in &expired {
            inner.remove(id);
        }
        expired.len()
    }

    /// 可用文件数量，不含等待清理的过期文件
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock()
            .files
            .values()
            .filter(|f| !self.is_expired(&f.meta, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_bytes
    }

    /// 占用的字节数，包括等待清理的过期文件
    pub fn stored_bytes(&self) -> u64 {
        self.lock().stored_bytes
    }
}
