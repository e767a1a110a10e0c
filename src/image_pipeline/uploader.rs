//! # 上传模块
//!
//! ## 设计思路
//!
//! 每次上传只发一个 `multipart/form-data` POST，字段名固定为 `image`，携带文件名与 MIME。
//! 只要服务端给出响应（任意状态码）就视为上传完成，响应体原样返回，不做解释。
//! 连接失败 / 超时映射为 `Network` / `Timeout`，由控制器决定如何呈现；这里不做重试。
//!
//! ## 实现思路
//!
//! - 上传地址由构造方显式传入并在构造时解析，非法地址尽早失败。
//! - 复用型 `reqwest::Client`，连接超时与总超时来自 `UploadConfig`。
//! - 不跟随重定向：3xx 本身就是一次完整响应。
//! - 日志中的 URL 去掉 query / fragment。

use std::time::Duration;

use reqwest::multipart::{Form, Part};

use super::source::UploadArtifact;
use super::{ImageError, UPLOAD_FIELD_NAME, UploadConfig};

/// 服务端响应（不解释内容）。
#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadResponse {
    pub status: u16,
    pub body: String,
}

impl UploadResponse {
    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 上传客户端。
pub struct Uploader {
    client: reqwest::Client,
    url: reqwest::Url,
    config: UploadConfig,
}

impl Uploader {
    pub fn new(config: &UploadConfig) -> Result<Self, ImageError> {
        let url = reqwest::Url::parse(config.upload_url.trim())
            .map_err(|e| ImageError::InvalidFormat(format!("上传地址无效：{}", e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ImageError::InvalidFormat(format!(
                "上传地址仅支持 http/https：{}",
                url.scheme()
            )));
        }

        let client = build_http_client(config)?;

        Ok(Self {
            client,
            url,
            config: config.clone(),
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.url
    }

    /// 发送一次上传请求。
    pub async fn upload(&self, artifact: &UploadArtifact) -> Result<UploadResponse, ImageError> {
        let target = redact_url_for_log(self.url.as_str());
        log::info!(
            "📤 开始上传 - {} ({}，{} bytes) -> {}",
            artifact.file_name,
            artifact.mime_type,
            artifact.bytes.len(),
            target
        );

        let part = Part::bytes(artifact.bytes.to_vec())
            .file_name(artifact.file_name.clone())
            .mime_str(&artifact.mime_type)
            .map_err(|e| ImageError::InvalidFormat(format!("无效的 MIME 类型 {}：{}", artifact.mime_type, e)))?;
        let form = Form::new().part(UPLOAD_FIELD_NAME, part);

        let response = self
            .client
            .post(self.url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_reqwest_error(e))?;

        if (200..300).contains(&status) {
            log::info!("✅ 上传完成 - status={} body={}B", status, body.len());
        } else {
            log::warn!("⚠️ 上传已送达但服务端返回 status={}，按完成处理", status);
        }

        Ok(UploadResponse { status, body })
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> ImageError {
        let err_msg = sanitize_error_message_with_redacted_url(&e.to_string(), self.url.as_str());

        if e.is_timeout() {
            ImageError::Timeout(format!("上传超时（{}秒）", self.config.upload_timeout))
        } else if e.is_connect() {
            ImageError::Network(format!("无法连接：{}", err_msg))
        } else {
            ImageError::Network(format!("请求失败：{}", err_msg))
        }
    }
}

fn build_http_client(config: &UploadConfig) -> Result<reqwest::Client, ImageError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upload_timeout))
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ImageError::Network(format!("无法创建 HTTP 客户端：{}", e)))
}

pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = parsed.path();

    format!("{}://{}{}{}", parsed.scheme(), host, port, path)
}

fn sanitize_error_message_with_redacted_url(error_msg: &str, url: &str) -> String {
    let redacted = redact_url_for_log(url);
    error_msg.replace(url, &redacted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::test_support::{read_request, respond};
    use bytes::Bytes;
    use std::net::TcpListener;
    use std::thread;

    fn artifact() -> UploadArtifact {
        UploadArtifact {
            file_name: "cat.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\nfake"),
        }
    }

    #[tokio::test]
    async fn sends_single_image_field_with_filename_and_type() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");
            let request = read_request(&mut stream);
            respond(&mut stream, "200 OK", "stored");
            request
        });

        let uploader = Uploader::new(&UploadConfig::new(format!("http://127.0.0.1:{}/upload", addr.port())))
            .expect("uploader init failed");
        let response = uploader.upload(&artifact()).await.expect("upload failed");
        let request = server.join().expect("server thread failed");

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "stored");
        assert!(request.starts_with("POST /upload "));

        let lower = request.to_lowercase();
        assert!(lower.contains("content-type: multipart/form-data"));
        assert!(lower.contains("name=\"image\""));
        assert!(lower.contains("filename=\"cat.png\""));
        assert!(lower.contains("content-type: image/png"));
        assert_eq!(lower.matches("content-disposition").count(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_still_a_response() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");
            let _ = read_request(&mut stream);
            respond(&mut stream, "500 Internal Server Error", "boom");
        });

        let uploader = Uploader::new(&UploadConfig::new(format!("http://127.0.0.1:{}/", addr.port())))
            .expect("uploader init failed");
        let response = uploader.upload(&artifact()).await.expect("upload should complete");
        server.join().expect("server thread failed");

        assert_eq!(response.status, 500);
        assert_eq!(response.body, "boom");
        assert!(!response.is_success_status());
    }

    #[tokio::test]
    async fn refused_connection_maps_to_network_error() {
        // 绑定后立即释放，拿到一个大概率无人监听的端口
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
            listener.local_addr().expect("read local addr failed").port()
        };

        let uploader = Uploader::new(&UploadConfig::new(format!("http://127.0.0.1:{}/", port)))
            .expect("uploader init failed");
        let result = uploader.upload(&artifact()).await;

        assert!(matches!(result, Err(ImageError::Network(_))));
    }

    #[test]
    fn rejects_invalid_or_non_http_urls() {
        assert!(matches!(
            Uploader::new(&UploadConfig::new("not a url")),
            Err(ImageError::InvalidFormat(_))
        ));
        assert!(matches!(
            Uploader::new(&UploadConfig::new("ftp://example.com/up")),
            Err(ImageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        let redacted = redact_url_for_log("https://example.com:8443/upload?token=abc123#hash");

        assert_eq!(redacted, "https://example.com:8443/upload");
    }
}
