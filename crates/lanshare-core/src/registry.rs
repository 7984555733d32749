//! 设备注册表
//!
//! 记录当前在线的设备（名称、网络地址、最后心跳时间），回答存活和列表查询。
//!
//! # 存活判定
//!
//! 设备存活当且仅当 `now - last_seen <= liveness_window`。判定在查询时惰性计算，
//! 过期记录由心跳或 [`crate::sweep`] 回收。过期设备永远不会出现在列表中。

use crate::clock::Clock;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// 默认存活窗口：客户端心跳间隔 60s 的 2.5 倍，容忍一次丢失的心跳
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::seconds(150);

/// 服务端分配的设备 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DeviceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// 设备记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    /// 注册请求的来源地址（不信任客户端上报的地址）
    pub address: IpAddr,
    pub last_seen: DateTime<Utc>,
}

struct Entry {
    device: Device,
    /// 注册顺序
    seq: u64,
}

#[derive(Default)]
struct Inner {
    devices: HashMap<DeviceId, Entry>,
    next_seq: u64,
}

pub struct DeviceRegistry {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl DeviceRegistry {
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_alive(&self, device: &Device, now: DateTime<Utc>) -> bool {
        now - device.last_seen <= self.window
    }

    /// 注册新设备，总是成功
    pub fn register(&self, name: impl Into<String>, address: IpAddr) -> DeviceId {
        let now = self.clock.now();
        let device = Device {
            id: DeviceId::generate(),
            name: name.into(),
            address,
            last_seen: now,
        };
        let id = device.id;

        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        info!("Device registered: {} ({}) id={}", device.name, address, id);
        inner.devices.insert(id, Entry { device, seq });
        id
    }

    /// 刷新设备的 `last_seen`
    ///
    /// 已过期的设备返回 [`Error::NotFound`] 并移除其记录，客户端需要重新注册。
    pub fn heartbeat(&self, id: &DeviceId) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let alive = match inner.devices.get(id) {
            Some(entry) => self.is_alive(&entry.device, now),
            None => return Err(Error::NotFound),
        };

        if !alive {
            inner.devices.remove(id);
            debug!("Heartbeat from expired device {}, record dropped", id);
            return Err(Error::NotFound);
        }

        if let Some(entry) = inner.devices.get_mut(id) {
            entry.device.last_seen = now;
        }
        Ok(())
    }

    /// 按注册顺序返回所有存活设备
    pub fn list_active(&self) -> Vec<Device> {
        self.collect_active(|_| true)
    }

    /// 同 [`list_active`](Self::list_active)，但排除请求方自身
    pub fn list_active_except(&self, requester: &DeviceId) -> Vec<Device> {
        self.collect_active(|d| d.id != *requester)
    }

    fn collect_active(&self, keep: impl Fn(&Device) -> bool) -> Vec<Device> {
        let now = self.clock.now();
        let inner = self.lock();

        let mut entries: Vec<&Entry> = inner
            .devices
            .values()
            .filter(|e| self.is_alive(&e.device, now) && keep(&e.device))
            .collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.device.clone()).collect()
    }

    /// 查找存活设备
    pub fn get(&self, id: &DeviceId) -> Option<Device> {
        let now = self.clock.now();
        self.lock()
            .devices
            .get(id)
            .filter(|e| self.is_alive(&e.device, now))
            .map(|e| e.device.clone())
    }

    pub fn active_count(&self) -> usize {
        let now = self.clock.now();
        self.lock()
            .devices
            .values()
            .filter(|e| self.is_alive(&e.device, now))
            .count()
    }

    /// 移除所有过期记录，返回移除数量
    pub fn reap_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let before = inner.devices.len();
        inner
            .devices
            .retain(|_, e| now - e.device.last_seen <= self.window);
        before - inner.devices.len()
    }
}

/// 根据 User-Agent 推断设备名称
pub fn infer_device_name(user_agent: &str) -> &'static str {
    // 顺序有意义: iPad/iPhone 的 UA 同样包含 "Mac"
    const RULES: &[(&str, &str)] = &[
        ("Android", "Android"),
        ("iPhone", "iPhone"),
        ("iPad", "iPad"),
        ("Windows", "Windows PC"),
        ("Mac", "Mac"),
        ("Linux", "Linux PC"),
    ];

    RULES
        .iter()
        .find(|(needle, _)| user_agent.contains(needle))
        .map(|(_, name)| *name)
        .unwrap_or("Unknown Device")
}
