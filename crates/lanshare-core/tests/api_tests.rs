//! HTTP API 集成测试
//!
//! 在 127.0.0.1 随机端口启动服务器，用 reqwest 按网页客户端的方式调用。

use futures_util::future::join_all;
use lanshare_core::api::wire::{
    DevicesResponse, ErrorBody, FilesResponse, InfoResponse, RegisterResponse, StatusResponse,
    UploadResponse,
};
use lanshare_core::{ApiServer, Coordinator, ManualClock, ServerSettings};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;

struct TestServer {
    server: ApiServer,
    base: String,
    client: Client,
    clock: Arc<ManualClock>,
}

impl TestServer {
    async fn start(settings: ServerSettings) -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let coordinator = Arc::new(Coordinator::with_clock(&settings, clock.clone()));
        let mut server = ApiServer::new(coordinator);
        let addr = server
            .start(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();

        Self {
            server,
            base: format!("http://{}", addr),
            client: Client::new(),
            clock,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn register(&self, name: &str) -> String {
        let resp: RegisterResponse = self
            .client
            .post(self.url("/api/register-device"))
            .json(&serde_json::json!({ "name": name, "ip": "auto" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp.status, "registered");
        resp.device_id.to_string()
    }

    async fn upload(&self, files: &[(&str, Vec<u8>)], target: Option<&str>) -> reqwest::Response {
        let mut form = Form::new();
        for (name, content) in files {
            form = form.part(
                "files",
                Part::bytes(content.clone()).file_name(name.to_string()),
            );
        }
        if let Some(target) = target {
            form = form.text("target_device", target.to_string());
        }
        self.client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    async fn files(&self, device_id: Option<&str>) -> FilesResponse {
        let mut req = self.client.get(self.url("/api/files"));
        if let Some(id) = device_id {
            req = req.query(&[("device_id", id)]);
        }
        req.send().await.unwrap().json().await.unwrap()
    }
}

#[tokio::test]
async fn test_register_and_list_devices() {
    let ts = TestServer::start(ServerSettings::default()).await;
    let a = ts.register("Linux PC").await;
    let b = ts.register("Android").await;

    let all: DevicesResponse = ts
        .client
        .get(ts.url("/api/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<String> = all.devices.iter().map(|d| d.id.to_string()).collect();
    assert_eq!(ids, vec![a.clone(), b.clone()]);
    // 地址取自连接来源，而不是客户端上报的 "auto"
    assert_eq!(all.devices[0].ip, "127.0.0.1");

    let others: DevicesResponse = ts
        .client
        .get(ts.url("/api/devices"))
        .query(&[("device_id", a.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(others.devices.len(), 1);
    assert_eq!(others.devices[0].id.to_string(), b);
}

#[tokio::test]
async fn test_register_infers_name_from_user_agent() {
    let ts = TestServer::start(ServerSettings::default()).await;
    let resp = ts
        .client
        .post(ts.url("/api/register-device"))
        .header("User-Agent", "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)")
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let devices: DevicesResponse = ts
        .client
        .get(ts.url("/api/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(devices.devices[0].name, "iPad");
}

#[tokio::test]
async fn test_heartbeat_and_expiry() {
    let ts = TestServer::start(ServerSettings::default()).await;
    let a = ts.register("Mac").await;

    let resp = ts
        .client
        .post(ts.url(&format!("/api/heartbeat/{}", a)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: StatusResponse = resp.json().await.unwrap();
    assert_eq!(body.status, "ok");

    ts.clock.advance(chrono::Duration::seconds(151));

    let resp = ts
        .client
        .post(ts.url(&format!("/api/heartbeat/{}", a)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: StatusResponse = resp.json().await.unwrap();
    assert_eq!(body.status, "device_not_found");

    let resp = ts
        .client
        .post(ts.url("/api/heartbeat/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_download_consumes_file() {
    let ts = TestServer::start(ServerSettings::default()).await;
    let b = ts.register("Android").await;
    let payload = vec![42u8; 500_000];

    let resp = ts.upload(&[("report.pdf", payload.clone())], None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let upload: UploadResponse = resp.json().await.unwrap();
    assert_eq!(upload.status, "success");
    assert_eq!(upload.message, "Uploaded 1 file(s)");
    assert_eq!(upload.files[0].size, 500_000);
    let file_id = upload.files[0].file_id.to_string();

    let listed = ts.files(Some(&b)).await;
    assert_eq!(listed.files.len(), 1);
    assert_eq!(listed.files[0].original_name, "report.pdf");
    assert_eq!(listed.files[0].mime_type, "application/pdf");

    let resp = ts
        .client
        .get(ts.url(&format!("/api/download/{}", file_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"report.pdf\""
    );
    assert_eq!(resp.bytes().await.unwrap().len(), 500_000);

    assert!(ts.files(Some(&b)).await.files.is_empty());

    let resp = ts
        .client
        .get(ts.url(&format!("/api/download/{}", file_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.detail, "File not found");
}

#[tokio::test]
async fn test_targeted_upload() {
    let ts = TestServer::start(ServerSettings::default()).await;
    let a = ts.register("Mac").await;
    let b = ts.register("iPhone").await;

    let upload: UploadResponse = ts
        .upload(&[("secret.txt", b"shh".to_vec())], Some(&b))
        .await
        .json()
        .await
        .unwrap();
    let file_id = upload.files[0].file_id.to_string();

    assert!(ts.files(Some(&a)).await.files.is_empty());
    assert!(ts.files(None).await.files.is_empty());
    let for_b = ts.files(Some(&b)).await;
    assert_eq!(for_b.files[0].target_device.map(|d| d.to_string()), Some(b.clone()));

    let denied = ts
        .client
        .get(ts.url(&format!("/api/download/{}", file_id)))
        .query(&[("device_id", a.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::NOT_FOUND);

    let granted = ts
        .client
        .get(ts.url(&format!("/api/download/{}", file_id)))
        .query(&[("device_id", b.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(granted.status(), StatusCode::OK);
    assert_eq!(&granted.bytes().await.unwrap()[..], b"shh");
}

#[tokio::test]
async fn test_legacy_anonymous_access() {
    let settings = ServerSettings {
        legacy_anonymous_access: true,
        ..Default::default()
    };
    let ts = TestServer::start(settings).await;
    let b = ts.register("iPhone").await;

    ts.upload(&[("photo.jpg", vec![1, 2, 3])], Some(&b)).await;
    let anonymous = ts.files(None).await;
    assert_eq!(anonymous.files.len(), 1);

    let resp = ts
        .client
        .get(ts.url(&format!("/api/download/{}", anonymous.files[0].id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_rejections() {
    let settings = ServerSettings {
        allowed_extensions: vec![".pdf".to_string()],
        max_total_bytes: 8,
        ..Default::default()
    };
    let ts = TestServer::start(settings).await;

    let resp = ts.upload(&[("run.sh", b"echo".to_vec())], None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = ts
        .upload(&[("a.pdf", b"1234".to_vec())], Some("../../etc/passwd"))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = ts
        .upload(&[("a.pdf", b"12345".to_vec()), ("b.pdf", b"12345".to_vec())], None)
        .await;
    assert_eq!(resp.status(), StatusCode::INSUFFICIENT_STORAGE);

    // 失败的上传不留下任何记录
    let info: InfoResponse = ts
        .client
        .get(ts.url("/api/info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info.files_count, 0);
    assert_eq!(info.stored_bytes, 0);

    // 没有文件字段
    let resp = ts
        .client
        .post(ts.url("/api/upload"))
        .multipart(Form::new().text("note", "hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_of_files_each_under_size_limit() {
    let settings = ServerSettings {
        max_file_size: 1024 * 1024,
        ..Default::default()
    };
    let ts = TestServer::start(settings).await;

    let chunk = vec![3u8; 900 * 1024];
    let resp = ts
        .upload(
            &[
                ("a.bin", chunk.clone()),
                ("b.bin", chunk.clone()),
                ("c.bin", chunk.clone()),
            ],
            None,
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let upload: UploadResponse = resp.json().await.unwrap();
    assert_eq!(upload.files.len(), 3);
    assert_eq!(upload.message, "Uploaded 3 file(s)");

    // 单个文件仍受大小限制
    let resp = ts
        .upload(&[("big.bin", vec![0u8; 1024 * 1024 + 1])], None)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = resp.json().await.unwrap();
    assert!(body.detail.starts_with("File too large"));
    assert_eq!(ts.files(None).await.files.len(), 3);
}

#[tokio::test]
async fn test_expired_target_cannot_download() {
    let ts = TestServer::start(ServerSettings::default()).await;
    let b = ts.register("iPhone").await;

    let upload: UploadResponse = ts
        .upload(&[("for-b.txt", b"b".to_vec())], Some(&b))
        .await
        .json()
        .await
        .unwrap();
    let file_id = upload.files[0].file_id.to_string();

    ts.clock.advance(chrono::Duration::seconds(200));

    assert!(ts.files(Some(&b)).await.files.is_empty());
    let resp = ts
        .client
        .get(ts.url(&format!("/api/download/{}", file_id)))
        .query(&[("device_id", b.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = resp.json().await.unwrap();
    assert_eq!(body.detail, "File not found");
}

#[tokio::test]
async fn test_multi_file_upload_and_delete() {
    let ts = TestServer::start(ServerSettings::default()).await;

    let upload: UploadResponse = ts
        .upload(&[("a.txt", b"a".to_vec()), ("empty.txt", Vec::new())], None)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(upload.files.len(), 2);
    assert_eq!(upload.files[1].size, 0);

    let id = upload.files[0].file_id.to_string();
    let resp = ts
        .client
        .delete(ts.url(&format!("/api/delete/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: StatusResponse = resp.json().await.unwrap();
    assert_eq!(body.status, "deleted");

    let resp = ts
        .client
        .delete(ts.url(&format!("/api/delete/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let remaining = ts.files(None).await;
    assert_eq!(remaining.files.len(), 1);
    assert_eq!(remaining.files[0].original_name, "empty.txt");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_downloads_serve_once() {
    let ts = TestServer::start(ServerSettings::default()).await;
    let upload: UploadResponse = ts
        .upload(&[("race.bin", vec![9u8; 64 * 1024])], None)
        .await
        .json()
        .await
        .unwrap();
    let url = ts.url(&format!("/api/download/{}", upload.files[0].file_id));

    let requests = (0..16).map(|_| {
        let client = ts.client.clone();
        let url = url.clone();
        async move {
            let resp = client.get(&url).send().await.unwrap();
            let status = resp.status();
            let len = resp.bytes().await.unwrap().len();
            (status, len)
        }
    });
    let results = join_all(requests).await;

    let ok: Vec<_> = results.iter().filter(|(s, _)| *s == StatusCode::OK).collect();
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].1, 64 * 1024);
    assert_eq!(
        results
            .iter()
            .filter(|(s, _)| *s == StatusCode::NOT_FOUND)
            .count(),
        15
    );
}

#[tokio::test]
async fn test_server_info() {
    let mut ts = TestServer::start(ServerSettings::default()).await;
    ts.register("Mac").await;
    ts.upload(&[("a.txt", b"abc".to_vec())], None).await;

    let info: InfoResponse = ts
        .client
        .get(ts.url("/api/info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info.status, "running");
    assert_eq!(info.devices_count, 1);
    assert_eq!(info.files_count, 1);
    assert_eq!(info.stored_bytes, 3);

    ts.server.stop().await;
}
