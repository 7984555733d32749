//! HTTP API 的 JSON 消息格式
//!
//! 字段名与现有网页客户端保持一致（`device_id`、`files`、`status` 等），
//! CLI 直接复用这些类型反序列化响应。

use crate::registry::{Device, DeviceId};
use crate::store::{FileId, FileMeta};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 注册请求
///
/// `ip` 字段仅为兼容旧客户端而接受，服务端始终使用连接的来源地址。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub device_id: DeviceId,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceView {
    pub id: DeviceId,
    pub name: String,
    pub ip: String,
    pub last_seen: DateTime<Utc>,
}

impl From<Device> for DeviceView {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            name: device.name,
            ip: device.address.to_string(),
            last_seen: device.last_seen,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: FileId,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub files: Vec<UploadedFile>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileView {
    pub id: FileId,
    pub original_name: String,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    pub target_device: Option<DeviceId>,
    pub mime_type: String,
}

impl From<FileMeta> for FileView {
    fn from(meta: FileMeta) -> Self {
        let mime_type = meta.mime_type();
        Self {
            id: meta.id,
            original_name: meta.original_name,
            size: meta.size,
            timestamp: meta.timestamp,
            target_device: meta.target_device_id,
            mime_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<FileView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub status: String,
    pub server_name: String,
    pub files_count: usize,
    pub devices_count: usize,
    pub stored_bytes: u64,
    pub version: String,
}

/// 错误响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// 可选的请求方设备 ID（查询参数）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequesterQuery {
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub target_device: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_device_view_field_names() {
        let device = Device {
            id: "00000000-0000-4000-8000-00000000000a".parse().unwrap(),
            name: "Android".to_string(),
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)),
            last_seen: Utc::now(),
        };

        let json = serde_json::to_value(DeviceView::from(device)).unwrap();
        assert_eq!(json["id"], "00000000-0000-4000-8000-00000000000a");
        assert_eq!(json["name"], "Android");
        assert_eq!(json["ip"], "192.168.1.7");
        assert!(json["last_seen"].is_string());
    }

    #[test]
    fn test_register_request_tolerates_missing_fields() {
        let req: RegisterRequest = serde_json::from_str("{}").unwrap();
        assert!(req.name.is_none());

        let req: RegisterRequest =
            serde_json::from_str(r#"{"name":"Mac","ip":"auto"}"#).unwrap();
        assert_eq!(req.name.as_deref(), Some("Mac"));
        assert_eq!(req.ip.as_deref(), Some("auto"));
    }

    #[test]
    fn test_file_view_untargeted_is_null() {
        let view = FileView {
            id: "00000000-0000-4000-8000-0000000000f1".parse().unwrap(),
            original_name: "report.pdf".to_string(),
            size: 3,
            timestamp: Utc::now(),
            target_device: None,
            mime_type: "application/pdf".to_string(),
        };
        let json = serde_json::to_value(view).unwrap();
        assert!(json["target_device"].is_null());
        assert_eq!(json["original_name"], "report.pdf");
    }
}
