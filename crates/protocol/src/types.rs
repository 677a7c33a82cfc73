use serde::{Deserialize, Serialize};

/// Server-side state of an upload, carried as an integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum UploadStatus {
    Uploading,
    Completed,
    Cancelled,
    /// A code this client does not know about.
    Other(i32),
}

impl From<i32> for UploadStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Uploading,
            1 => Self::Completed,
            2 => Self::Cancelled,
            other => Self::Other(other),
        }
    }
}

impl From<UploadStatus> for i32 {
    fn from(status: UploadStatus) -> Self {
        match status {
            UploadStatus::Uploading => 0,
            UploadStatus::Completed => 1,
            UploadStatus::Cancelled => 2,
            UploadStatus::Other(code) => code,
        }
    }
}

impl UploadStatus {
    /// Returns true if the server still accepts chunks for this upload.
    pub fn accepts_chunks(self) -> bool {
        self == Self::Uploading
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uploading => f.write_str("uploading"),
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Other(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// Descriptor of an upload as the server sees it.
///
/// Returned by init and by the progress query. Only `upload_id` is always
/// present; the server omits fields it has not computed yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadInfo {
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UploadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl ChunkUploadInfo {
    /// Server-reported progress in percent, derived from the chunk counts
    /// when the server did not send it.
    pub fn percentage(&self) -> f64 {
        if let Some(p) = self.progress {
            return p;
        }
        match (self.uploaded_chunks, self.total_chunks) {
            (Some(done), Some(total)) if total > 0 => f64::from(done) * 100.0 / f64::from(total),
            _ => 0.0,
        }
    }
}

/// Parameters of the init call, sent as query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_hash: Option<String>,
    pub user_id: i64,
}

impl InitUploadRequest {
    /// Returns the request as ordered query pairs.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("fileName", self.file_name.clone()),
            ("fileSize", self.file_size.to_string()),
            ("totalChunks", self.total_chunks.to_string()),
        ];
        if let Some(md5) = &self.md5_hash {
            pairs.push(("md5Hash", md5.clone()));
        }
        pairs.push(("userId", self.user_id.to_string()));
        pairs
    }
}
