use serde::{Deserialize, Serialize};

use crate::constants::API_SUCCESS;

/// Envelope wrapping every response of the chunk-upload service.
///
/// A response is successful only when `code` equals [`API_SUCCESS`]; the HTTP
/// status alone says nothing about the outcome of the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful response carrying `data`.
    pub fn success(data: T) -> Self {
        Self {
            code: API_SUCCESS,
            message: "success".into(),
            data: Some(data),
            timestamp: None,
        }
    }

    /// Creates an error response without data.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            timestamp: None,
        }
    }

    /// Whether the service reported success.
    pub fn is_success(&self) -> bool {
        self.code == API_SUCCESS
    }

    /// Splits the envelope into its data on success, or `(code, message)`.
    pub fn into_result(self) -> Result<Option<T>, (i32, String)> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err((self.code, self.message))
        }
    }
}
