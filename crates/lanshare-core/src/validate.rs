//! 上传校验与文件名处理

use crate::error::{Error, Result};
use crate::registry::DeviceId;
use std::path::Path;

/// 单个文件默认上限 (2 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_size: u64,
    /// 允许的扩展名（含点，小写），为空表示不限制
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: Vec::new(),
        }
    }
}

/// 上传前校验单个文件
pub fn validate_upload(filename: &str, size: u64, limits: &UploadLimits) -> Result<()> {
    if size > limits.max_file_size {
        return Err(Error::InvalidInput(format!(
            "File too large. Max size: {:.1}GB",
            limits.max_file_size as f64 / (1024.0 * 1024.0 * 1024.0)
        )));
    }

    if !limits.allowed_extensions.is_empty() {
        let ext = Path::new(filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if !limits.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            return Err(Error::InvalidInput(format!(
                "File type not allowed. Allowed: {}",
                limits.allowed_extensions.join(", ")
            )));
        }
    }

    Ok(())
}

/// 解析客户端传入的设备引用（上传目标或请求方）
///
/// 缺省或空字符串表示没有设备，格式错误返回 [`Error::InvalidInput`]。
pub fn parse_device_ref(raw: Option<&str>) -> Result<Option<DeviceId>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidInput(format!("Invalid device id: {}", s))),
    }
}

/// 去除路径成分和控制字符，用于 `Content-Disposition`
pub fn safe_filename(filename: &str) -> String {
    // 同时处理 Windows 风格分隔符
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .replace("..", "");

    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        "unnamed_file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// 人类可读的文件大小
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}
