//! Delivery of rendered images.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use crate::error::Result;

/// Multipart field name the image is sent under.
pub const FORM_FIELD: &str = "file";

/// File name reported for the image.
pub const FILE_NAME: &str = "thermal.jpg";

/// Destination for rendered thermal images.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// A short name for logging.
    fn name(&self) -> &'static str;

    /// Send one JPEG image and return the HTTP status the endpoint answered
    /// with.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint could not be reached in time.
    async fn upload(&self, jpeg: Vec<u8>) -> Result<u16>;
}

/// Posts images as `multipart/form-data`.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
}

impl HttpUploader {
    /// Create an uploader for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ImageUploader for HttpUploader {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn upload(&self, jpeg: Vec<u8>) -> Result<u16> {
        let size = jpeg.len();
        let part = Part::bytes(jpeg)
            .file_name(FILE_NAME)
            .mime_str("image/jpeg")?;
        let form = Form::new().part(FORM_FIELD, part);

        debug!(url = %self.url, size, "uploading image");
        let response = self.client.post(&self.url).multipart(form).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Uploader that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunUploader;

#[async_trait]
impl ImageUploader for DryRunUploader {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn upload(&self, jpeg: Vec<u8>) -> Result<u16> {
        info!(size = jpeg.len(), "dry run: image not uploaded");
        Ok(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::serve_once;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_http_upload_multipart() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 201 Created"));

        let uploader =
            HttpUploader::new(format!("http://{addr}/api/upload"), Duration::from_secs(5))
                .unwrap();
        let status = uploader.upload(b"not really a jpeg".to_vec()).await.unwrap();
        assert_eq!(status, 201);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/upload"));
        assert!(request.to_ascii_lowercase().contains("multipart/form-data"));
        assert!(request.contains(r#"name="file"; filename="thermal.jpg""#));
        assert!(request.contains("image/jpeg"));
        assert!(request.contains("not really a jpeg"));
    }

    #[tokio::test]
    async fn test_http_upload_reports_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 500 Internal Server Error"));

        let uploader = HttpUploader::new(format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
        assert_eq!(uploader.upload(vec![0xFF, 0xD8]).await.unwrap(), 500);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_upload_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let uploader = HttpUploader::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();
        assert!(uploader.upload(vec![1, 2, 3]).await.is_err());
    }

    #[tokio::test]
    async fn test_dry_run_uploader() {
        assert_eq!(DryRunUploader.upload(vec![1]).await.unwrap(), 200);
        assert_eq!(DryRunUploader.name(), "dry-run");
    }
}
