//! HTTP client for the chunk-upload API.
//!
//! Async client using `reqwest` with optional Bearer token authentication.
//! Every response is an [`ApiResponse`] envelope; only code 200 counts as
//! success, whatever the HTTP status.

use std::time::Duration;

use chunkflow_protocol::constants::{
    API_UNAUTHORIZED, CHUNK_API_BASE, ENDPOINT_CANCEL, ENDPOINT_CHECK, ENDPOINT_CLEANUP,
    ENDPOINT_INIT, ENDPOINT_MERGE, ENDPOINT_PROGRESS, ENDPOINT_UPLOAD, FIELD_CHUNK,
    FIELD_CHUNK_INDEX, FIELD_CHUNK_MD5, FIELD_UPLOAD_ID,
};
use chunkflow_protocol::{ApiResponse, ChunkUploadInfo, InitUploadRequest};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::debug;

use crate::error::ServiceError;
use crate::service::{ChunkUpload, ServiceFuture, UploadService};

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Connection settings for [`HttpUploadService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServiceConfig {
    /// Server root; the chunk API lives under `<base_url>/upload/chunk`.
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for HttpServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Chunk-upload API client.
pub struct HttpUploadService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUploadService {
    /// Builds a client for `config`.
    pub fn new(config: &HttpServiceConfig) -> Result<Self, ServiceError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config.auth_token.as_deref().filter(|t| !t.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| ServiceError::InvalidToken)?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: format!("{}{CHUNK_API_BASE}", config.base_url.trim_end_matches('/')),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Sends a request and unwraps the response envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, ServiceError> {
        let resp = request.send().await?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Unauthorized(body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        let envelope: ApiResponse<T> = serde_json::from_slice(&body)?;
        match envelope.into_result() {
            Ok(data) => Ok(data),
            Err((API_UNAUTHORIZED, message)) => Err(ServiceError::Unauthorized(message)),
            Err((code, message)) => Err(ServiceError::Api { code, message }),
        }
    }

    /// Like [`send`](Self::send) but requires the envelope to carry data.
    async fn send_for_data<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        self.send(request).await?.ok_or(ServiceError::MissingData)
    }

    async fn post_init(&self, request: &InitUploadRequest) -> Result<ChunkUploadInfo, ServiceError> {
        debug!(file = %request.file_name, size = request.file_size, chunks = request.total_chunks, "init upload");
        let req = self
            .http
            .post(self.url(ENDPOINT_INIT))
            .query(&request.query_pairs());
        self.send_for_data(req).await
    }

    async fn post_chunk(&self, chunk: ChunkUpload) -> Result<(), ServiceError> {
        let ChunkUpload {
            upload_id,
            index,
            data,
            md5,
        } = chunk;

        let part = Part::bytes(data)
            .file_name(format!("chunk-{index}"))
            .mime_str("application/octet-stream")?;
        let mut form = Form::new()
            .text(FIELD_UPLOAD_ID, upload_id)
            .text(FIELD_CHUNK_INDEX, index.to_string())
            .part(FIELD_CHUNK, part);
        if let Some(md5) = md5 {
            form = form.text(FIELD_CHUNK_MD5, md5);
        }

        let req = self.http.post(self.url(ENDPOINT_UPLOAD)).multipart(form);
        self.send::<IgnoredAny>(req).await?;
        Ok(())
    }

    async fn get_check(&self, upload_id: &str, index: usize) -> Result<bool, ServiceError> {
        let req = self
            .http
            .get(self.url(ENDPOINT_CHECK))
            .query(&[("uploadId", upload_id.to_string()), ("chunkIndex", index.to_string())]);
        self.send_for_data(req).await
    }

    async fn post_merge(&self, upload_id: &str) -> Result<String, ServiceError> {
        let req = self
            .http
            .post(self.url(ENDPOINT_MERGE))
            .query(&[("uploadId", upload_id)]);
        self.send_for_data(req).await
    }

    async fn post_cancel(&self, upload_id: &str) -> Result<(), ServiceError> {
        let req = self
            .http
            .post(self.url(ENDPOINT_CANCEL))
            .query(&[("uploadId", upload_id)]);
        self.send::<IgnoredAny>(req).await?;
        Ok(())
    }

    async fn get_progress(&self, upload_id: &str) -> Result<ChunkUploadInfo, ServiceError> {
        let req = self
            .http
            .get(self.url(ENDPOINT_PROGRESS))
            .query(&[("uploadId", upload_id)]);
        self.send_for_data(req).await
    }

    /// Purges expired partial uploads on the server and returns how many
    /// were removed. Usually restricted to administrators.
    pub async fn cleanup_expired(&self) -> Result<u32, ServiceError> {
        let req = self.http.post(self.url(ENDPOINT_CLEANUP));
        Ok(self.send::<u32>(req).await?.unwrap_or(0))
    }
}

impl UploadService for HttpUploadService {
    fn init<'a>(&'a self, request: &'a InitUploadRequest) -> ServiceFuture<'a, ChunkUploadInfo> {
        Box::pin(self.post_init(request))
    }

    fn upload_chunk(&self, chunk: ChunkUpload) -> ServiceFuture<'_, ()> {
        Box::pin(self.post_chunk(chunk))
    }

    fn exists<'a>(&'a self, upload_id: &'a str, index: usize) -> ServiceFuture<'a, bool> {
        Box::pin(self.get_check(upload_id, index))
    }

    fn merge<'a>(&'a self, upload_id: &'a str) -> ServiceFuture<'a, String> {
        Box::pin(self.post_merge(upload_id))
    }

    fn cancel<'a>(&'a self, upload_id: &'a str) -> ServiceFuture<'a, ()> {
        Box::pin(self.post_cancel(upload_id))
    }

    fn progress<'a>(&'a self, upload_id: &'a str) -> ServiceFuture<'a, ChunkUploadInfo> {
        Box::pin(self.get_progress(upload_id))
    }
}
