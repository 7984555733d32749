//! HTTP Client - 与 lanshare 服务通信

use anyhow::{Context, Result, bail};
use lanshare_core::api::wire::{
    DevicesResponse, ErrorBody, FilesResponse, InfoResponse, RegisterResponse, StatusResponse,
    UploadResponse,
};
use lanshare_core::validate::safe_filename;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode, header};
use std::path::{Path, PathBuf};

/// 保存本机设备 ID 的位置，供后续命令默认使用
pub fn device_id_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("lanshare")
        .join("device_id")
}

pub fn load_device_id() -> Option<String> {
    std::fs::read_to_string(device_id_path())
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn save_device_id(id: &str) -> Result<()> {
    let path = device_id_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, id)?;
    Ok(())
}

pub struct ApiClient {
    base: String,
    http: Client,
}

/// 心跳结果
pub enum Heartbeat {
    Alive,
    /// 服务端已不认识该设备，需要重新注册
    Expired,
}

impl ApiClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Response> {
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                eprintln!("❌ 无法连接到服务: {}", self.base);
                eprintln!("   请确保 lanshare-daemon 正在运行");
                return Err(e.into());
            }
        };
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let detail = resp
            .json::<ErrorBody>()
            .await
            .map(|b| b.detail)
            .unwrap_or_else(|_| status.to_string());
        bail!("{} ({})", detail, status)
    }

    pub async fn register(&self, name: Option<&str>) -> Result<RegisterResponse> {
        let body = serde_json::json!({ "name": name });
        let resp = self
            .send(self.http.post(self.url("/api/register-device")).json(&body))
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn heartbeat(&self, device_id: &str) -> Result<Heartbeat> {
        let resp = self
            .http
            .post(self.url(&format!("/api/heartbeat/{}", device_id)))
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(Heartbeat::Expired),
            s if s.is_success() => {
                let _: StatusResponse = resp.json().await?;
                Ok(Heartbeat::Alive)
            }
            s => bail!("heartbeat failed ({})", s),
        }
    }

    pub async fn devices(&self, requester: Option<&str>) -> Result<DevicesResponse> {
        let mut req = self.http.get(self.url("/api/devices"));
        if let Some(id) = requester {
            req = req.query(&[("device_id", id)]);
        }
        Ok(self.send(req).await?.json().await?)
    }

    pub async fn upload(&self, files: &[PathBuf], target: Option<&str>) -> Result<UploadResponse> {
        let mut form = Form::new();
        for path in files {
            let content = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {:?}", path))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unnamed_file".to_string());
            form = form.part("files", Part::bytes(content).file_name(name));
        }
        if let Some(target) = target {
            form = form.text("target_device", target.to_string());
        }

        let resp = self
            .send(self.http.post(self.url("/api/upload")).multipart(form))
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn files(&self, requester: Option<&str>) -> Result<FilesResponse> {
        let mut req = self.http.get(self.url("/api/files"));
        if let Some(id) = requester {
            req = req.query(&[("device_id", id)]);
        }
        Ok(self.send(req).await?.json().await?)
    }

    /// 下载文件到目录，返回保存路径
    pub async fn download(
        &self,
        file_id: &str,
        requester: Option<&str>,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let mut req = self.http.get(self.url(&format!("/api/download/{}", file_id)));
        if let Some(id) = requester {
            req = req.query(&[("device_id", id)]);
        }
        let resp = self.send(req).await?;

        let name = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
            .and_then(disposition_filename)
            .unwrap_or_else(|| file_id.to_string());
        let content = resp.bytes().await?;

        tokio::fs::create_dir_all(output_dir).await?;
        let path = unique_path(output_dir, &safe_filename(&name));
        tokio::fs::write(&path, &content).await?;
        Ok(path)
    }

    pub async fn delete(&self, file_id: &str) -> Result<()> {
        let req = self.http.delete(self.url(&format!("/api/delete/{}", file_id)));
        let _: StatusResponse = self.send(req).await?.json().await?;
        Ok(())
    }

    pub async fn info(&self) -> Result<InfoResponse> {
        Ok(self.send(self.http.get(self.url("/api/info"))).await?.json().await?)
    }
}

/// 从 `attachment; filename="..."` 中取出文件名
fn disposition_filename(value: &str) -> Option<String> {
    let (_, rest) = value.split_once("filename=")?;
    let name = rest.trim().trim_matches('"');
    (!name.is_empty()).then(|| name.to_string())
}

/// 避免覆盖已有文件: `a.txt` -> `a (1).txt`
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|i| dir.join(format!("{} ({}){}", stem, i, ext)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename("attachment; filename=\"report.pdf\""),
            Some("report.pdf".to_string())
        );
        assert_eq!(disposition_filename("attachment"), None);
        assert_eq!(disposition_filename("attachment; filename=\"\""), None);
    }

    #[test]
    fn test_unique_path() {
        let dir = std::env::temp_dir().join(format!("lanshare-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), b"x").unwrap();
        std::fs::write(dir.join("a (1).txt"), b"x").unwrap();

        assert_eq!(unique_path(&dir, "a.txt"), dir.join("a (2).txt"));
        assert_eq!(unique_path(&dir, "b.txt"), dir.join("b.txt"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
