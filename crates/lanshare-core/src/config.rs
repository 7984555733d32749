//! 服务配置和持久化
//!
//! 配置文件位于 `<config_dir>/lanshare/server.toml`，缺失或无法解析时使用默认值。

use crate::logging::LogLevel;
use crate::store::{DEFAULT_MAX_TOTAL_BYTES, TargetPolicy};
use crate::validate::{DEFAULT_MAX_FILE_SIZE, UploadLimits};
use chrono::Duration;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// 服务设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// 监听地址（局域网内其他设备需要能访问，默认所有接口）
    pub bind_addr: IpAddr,
    pub port: u16,
    /// 服务名称（在 CLI 和日志中显示）
    pub server_name: String,
    /// 设备存活窗口，应大于客户端心跳间隔 (60s)
    pub liveness_window_secs: u64,
    /// 后台清理间隔
    pub reap_interval_secs: u64,
    /// 文件保留时间
    pub file_max_age_hours: u64,
    /// 单个文件上限
    pub max_file_size: u64,
    /// 存储总预算
    pub max_total_bytes: u64,
    /// 允许的扩展名，空表示全部允许
    pub allowed_extensions: Vec<String>,
    /// 匿名请求可见所有文件（兼容旧网页客户端）
    pub legacy_anonymous_access: bool,
    pub log_level: LogLevel,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            port: 8000,
            server_name: get_default_server_name(),
            liveness_window_secs: 150,
            reap_interval_secs: 60,
            file_max_age_hours: 48,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            allowed_extensions: Vec::new(),
            legacy_anonymous_access: false,
            log_level: LogLevel::Info,
        }
    }
}

impl ServerSettings {
    /// 获取默认配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lanshare");
        config_dir.join("server.toml")
    }

    /// 从默认路径加载
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// 加载设置（如果文件不存在或无法解析则使用默认值）
    pub fn load_from(path: &Path) -> Self {
        Self::try_load_from(path).unwrap_or_else(|e| {
            warn!("{}, using defaults", e);
            Self::default()
        })
    }

    /// 加载设置，文件不存在时返回默认值，读取或解析失败时返回错误
    pub fn try_load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// 保存设置
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::seconds(clamp_i64(self.liveness_window_secs))
    }

    pub fn file_max_age(&self) -> Duration {
        Duration::hours(clamp_i64(self.file_max_age_hours))
    }

    pub fn reap_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reap_interval_secs.max(1))
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_file_size: self.max_file_size,
            allowed_extensions: self
                .allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
        }
    }

    pub fn target_policy(&self) -> TargetPolicy {
        TargetPolicy {
            legacy_anonymous_access: self.legacy_anonymous_access,
        }
    }
}

// 超大配置值截断到 chrono 可表示的范围内
fn clamp_i64(v: u64) -> i64 {
    v.min(i32::MAX as u64) as i64
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// 配置文件错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// 获取默认服务名称（主机名）
fn get_default_server_name() -> String {
    hostname::get()
        .map(|h| format!("lanshare on {}", h.to_string_lossy()))
        .unwrap_or_else(|_| "lanshare".to_string())
}
