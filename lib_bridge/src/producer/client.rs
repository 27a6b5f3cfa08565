//! # Bridge HTTP Client
//!
//! A thin asynchronous client around `reqwest` for the four calls the
//! producer makes. Every call carries its own fixed timeout and is tried
//! exactly once; callers decide what a failure means.
//!
//! Success is the status code alone, except for the upload, whose answer
//! names the stored file. Other 200 bodies are parsed when they can be.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Url, multipart};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::relay::image::WireFormat;
use crate::wire::{
    RECEIVE_IMAGE_PATH, ReceiveImageRequest, StatusResponse, SYSTEM_STATS_PATH, UPDATE_IMAGE_PATH,
    UPLOAD_IMAGE_PATH, UpdateImageRequest, UploadResponse,
};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);
pub const UPDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// File name the secondary branch uploads under, before the extension.
pub const UPLOAD_FILE_STEM: &str = "blender_camera";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_timeout())
    }
}

#[derive(Debug, Clone)]
pub struct BridgeClient {
    inner: reqwest::Client,
    base_url: Url,
}

impl BridgeClient {
    /// `base_url` must be absolute, e.g. `http://127.0.0.1:8188`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(inner: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        // Url::join drops the last segment unless the base ends with '/'.
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            inner,
            base_url: Url::parse(&base)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /system_stats`, the liveness probe. The body is host specific,
    /// so it is returned untyped, and only if it is JSON.
    pub async fn system_stats(&self) -> Result<Option<serde_json::Value>, ClientError> {
        let req = self.request(Method::GET, SYSTEM_STATS_PATH, PROBE_TIMEOUT)?;
        self.execute_status(req).await
    }

    /// `POST /blender/receive_image`
    pub async fn receive_image(
        &self,
        node_id: &str,
        image_data: String,
        format: WireFormat,
    ) -> Result<Option<StatusResponse>, ClientError> {
        let body = ReceiveImageRequest {
            node_id: Some(node_id.to_string()),
            image_data: Some(image_data),
            format: Some(format.tag().to_string()),
        };
        self.post_json(RECEIVE_IMAGE_PATH, &body, RECEIVE_TIMEOUT).await
    }

    /// `POST /upload/image` with the encoded bytes as field `image`.
    pub async fn upload_image(&self, bytes: Vec<u8>, format: WireFormat) -> Result<UploadResponse, ClientError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(format!("{UPLOAD_FILE_STEM}.{}", format.extension()))
            .mime_str(format.mime())?;
        let form = multipart::Form::new().part("image", part);
        let req = self
            .request(Method::POST, UPLOAD_IMAGE_PATH, UPLOAD_TIMEOUT)?
            .multipart(form);
        self.execute(req).await
    }

    /// `POST /blender/update_image`
    pub async fn update_image(&self, node_id: &str, image_path: &str) -> Result<Option<StatusResponse>, ClientError> {
        let body = UpdateImageRequest {
            node_id: Some(node_id.to_string()),
            image_path: Some(image_path.to_string()),
        };
        self.post_json(UPDATE_IMAGE_PATH, &body, UPDATE_TIMEOUT).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, timeout: Duration) -> Result<Option<T>, ClientError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let req = self.request(Method::POST, path, timeout)?.json(body);
        self.execute_status(req).await
    }

    fn request(&self, method: Method, path: &str, timeout: Duration) -> Result<RequestBuilder, ClientError> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        Ok(self.inner.request(method, url).timeout(timeout))
    }

    /// Sends once. Anything but 200 is an error carrying the body text.
    async fn send_ok(&self, req: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = req.send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// A 200 whose body must decode as `T`.
    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        Ok(self.send_ok(req).await?.json::<T>().await?)
    }

    /// A 200 is success whatever the body holds.
    async fn execute_status<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Option<T>, ClientError> {
        let response = self.send_ok(req).await?;
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let client = BridgeClient::new("http://127.0.0.1:8188/comfy").unwrap();
        let url = client.base_url().join("blender/receive_image").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8188/comfy/blender/receive_image");
    }

    #[test]
    fn test_relative_base_url_is_rejected() {
        assert!(matches!(BridgeClient::new("not a url"), Err(ClientError::Url(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = BridgeClient::new(&format!("http://{addr}")).unwrap();
        let err = client.system_stats().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_plain_text_ok_is_success() {
        use axum::{Router, routing::get, routing::post};

        let app = Router::new()
            .route(SYSTEM_STATS_PATH, get(|| async { "ok" }))
            .route(RECEIVE_IMAGE_PATH, post(|| async { "ok" }))
            .route(UPLOAD_IMAGE_PATH, post(|| async { "ok" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = BridgeClient::new(&format!("http://{addr}")).unwrap();
        assert_eq!(client.system_stats().await.unwrap(), None);
        let reply = client
            .receive_image("n1", "AAAA".to_string(), WireFormat::Png)
            .await
            .unwrap();
        assert!(reply.is_none());
        // The upload answer must name the stored file.
        assert!(matches!(
            client.upload_image(vec![1, 2, 3], WireFormat::Png).await,
            Err(ClientError::Transport(_))
        ));
    }
}
