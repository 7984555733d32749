//! 路由处理器
//!
//! 每个处理器只做请求解析和响应序列化，状态变更全部委托给 [`Coordinator`]。

use super::wire::{
    DeviceView, DevicesResponse, ErrorBody, FileView, FilesResponse, InfoResponse,
    RegisterRequest, RegisterResponse, RequesterQuery, StatusResponse, UploadQuery,
    UploadResponse, UploadedFile,
};
use crate::coordinator::Coordinator;
use crate::error::Error;
use crate::registry::{DeviceId, infer_device_name};
use crate::store::FileId;
use crate::validate::{UploadLimits, parse_device_ref, safe_filename, validate_upload};
use axum::{
    Json,
    extract::{ConnectInfo, Multipart, Path, Query, State, multipart::Field},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

pub(crate) type AppState = Arc<Coordinator>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::StorageExhausted { .. } => StatusCode::INSUFFICIENT_STORAGE,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// 文件路由的错误，`NotFound` 响应为 `{"detail":"File not found"}`
pub(crate) struct FileError(Error);

impl From<Error> for FileError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for FileError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::NotFound => (
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    detail: "File not found".to_string(),
                }),
            )
                .into_response(),
            other => other.into_response(),
        }
    }
}

pub(crate) async fn register_device(
    State(coordinator): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Option<Json<RegisterRequest>>,
) -> Json<RegisterResponse> {
    let requested = body
        .and_then(|Json(req)| req.name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    let name = requested.unwrap_or_else(|| {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        infer_device_name(user_agent).to_string()
    });

    let device_id = coordinator
        .registry()
        .register(name, peer.ip().to_canonical());

    Json(RegisterResponse {
        device_id,
        status: "registered".to_string(),
    })
}

pub(crate) async fn heartbeat(
    State(coordinator): State<AppState>,
    Path(raw_id): Path<String>,
) -> Response {
    let result = raw_id
        .parse::<DeviceId>()
        .map_err(|_| Error::NotFound)
        .and_then(|id| coordinator.registry().heartbeat(&id));

    match result {
        Ok(()) => Json(StatusResponse::new("ok")).into_response(),
        Err(_) => {
            debug!("Heartbeat for unknown device {}", raw_id);
            (
                StatusCode::NOT_FOUND,
                Json(StatusResponse::new("device_not_found")),
            )
                .into_response()
        }
    }
}

pub(crate) async fn list_devices(
    State(coordinator): State<AppState>,
    Query(query): Query<RequesterQuery>,
) -> Result<Json<DevicesResponse>, Error> {
    let registry = coordinator.registry();
    let devices = match parse_device_ref(query.device_id.as_deref())? {
        Some(requester) => registry.list_active_except(&requester),
        None => registry.list_active(),
    };

    Ok(Json(DevicesResponse {
        devices: devices.into_iter().map(DeviceView::from).collect(),
    }))
}

pub(crate) async fn upload_files(
    State(coordinator): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, Error> {
    let limits = coordinator.limits();
    let mut target_raw = query.target_device;
    let mut items = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("files") | Some("file") => {
                let name = field.file_name().unwrap_or("unnamed_file").to_string();
                let content = read_file_field(&mut field, &name, limits).await?;
                items.push((name, content));
            }
            Some("target_device") => {
                target_raw = Some(field.text().await.map_err(multipart_error)?);
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    if items.is_empty() {
        return Err(Error::InvalidInput("No files uploaded".to_string()));
    }

    let target = parse_device_ref(target_raw.as_deref())?;
    let stored = coordinator.store().put_batch(items, target).inspect_err(|e| {
        warn!("Upload rejected: {}", e);
    })?;

    let files: Vec<UploadedFile> = stored
        .into_iter()
        .map(|meta| UploadedFile {
            file_id: meta.id,
            name: meta.original_name,
            size: meta.size,
        })
        .collect();

    info!("Uploaded {} file(s), target={:?}", files.len(), target);
    Ok(Json(UploadResponse {
        status: "success".to_string(),
        message: format!("Uploaded {} file(s)", files.len()),
        files,
    }))
}

/// 读取单个文件字段，超出大小限制时立即中止
async fn read_file_field(
    field: &mut Field<'_>,
    name: &str,
    limits: &UploadLimits,
) -> Result<Bytes, Error> {
    validate_upload(name, 0, limits)?;

    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        buf.extend_from_slice(&chunk);
        validate_upload(name, buf.len() as u64, limits)?;
    }
    Ok(buf.freeze())
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> Error {
    Error::InvalidInput(format!("Invalid multipart body: {}", e))
}

pub(crate) async fn list_files(
    State(coordinator): State<AppState>,
    Query(query): Query<RequesterQuery>,
) -> Result<Json<FilesResponse>, Error> {
    let requester = parse_device_ref(query.device_id.as_deref())?;
    let files = coordinator.list_files(requester);

    Ok(Json(FilesResponse {
        files: files.into_iter().map(FileView::from).collect(),
    }))
}

pub(crate) async fn download_file(
    State(coordinator): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<RequesterQuery>,
) -> Result<Response, FileError> {
    let id: FileId = raw_id.parse().map_err(|_| Error::NotFound)?;
    let requester = parse_device_ref(query.device_id.as_deref())?;

    // 领取后记录已消失，内容在锁外发送
    let (meta, content) = coordinator.claim_file(&id, requester)?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        safe_filename(&meta.original_name)
    );
    let disposition = HeaderValue::from_bytes(disposition.as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}

pub(crate) async fn delete_file(
    State(coordinator): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<StatusResponse>, FileError> {
    let id: FileId = raw_id.parse().map_err(|_| Error::NotFound)?;
    coordinator.store().delete(&id)?;
    Ok(Json(StatusResponse::new("deleted")))
}

pub(crate) async fn server_info(State(coordinator): State<AppState>) -> Json<InfoResponse> {
    let stats = coordinator.stats();
    Json(InfoResponse {
        status: "running".to_string(),
        server_name: coordinator.server_name().to_string(),
        files_count: stats.files,
        devices_count: stats.devices,
        stored_bytes: stats.stored_bytes,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn detail(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        (status, body.detail)
    }

    #[tokio::test]
    async fn test_not_found_detail_depends_on_route() {
        let (status, body) = detail(Error::NotFound.into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not found");

        let (status, body) = detail(FileError::from(Error::NotFound).into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "File not found");
    }

    #[tokio::test]
    async fn test_file_error_keeps_other_statuses() {
        let err = FileError::from(Error::InvalidInput("Invalid device id: x".to_string()));
        let (status, body) = detail(err.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid device id: x");
    }
}
