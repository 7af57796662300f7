//! Salesforce Analytics REST API layer.
//!
//! Typed clients for the External Data ingestion endpoints and the dataset
//! catalog. All requests authenticate with a bearer token held as a
//! `SecretString`; log lines carry only HTTP method, path, and status code.

pub mod datasets;
pub mod insights;

use serde::{Deserialize, Serialize};

use crate::error::UploadError;

pub use datasets::{DatasetCatalogClient, DatasetSummary};
pub use insights::{CreateJobRequest, InsightsExternalDataClient, JobStatusInfo};

/// Salesforce REST API version used in every endpoint path.
pub const API_VERSION: &str = "v60.0";

// ─────────────────────────────────────────────────────────────────────────────
// Shared API Types
// ─────────────────────────────────────────────────────────────────────────────

/// Conflict-resolution operation applied when the dataset already exists.
///
/// Serialized with the PascalCase values the External Data API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operation {
    /// Append rows to the existing dataset.
    Append,
    /// Replace the dataset contents.
    #[default]
    Overwrite,
    /// Insert or update rows based on the dataset's unique identifier.
    Upsert,
    /// Delete the rows named in the upload.
    Delete,
}

/// Remote processing status of an external data job.
///
/// Set by the remote system and only ever observed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Parts are still being received.
    Pending,
    /// The server is ingesting the uploaded parts.
    Processing,
    /// Ingestion finished cleanly.
    Completed,
    /// Ingestion finished but the server flagged issues.
    CompletedWithWarnings,
    /// Ingestion failed; the status message carries the cause.
    Failed,
}

impl JobStatus {
    /// True once the remote job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithWarnings | JobStatus::Failed
        )
    }
}

/// Acknowledgement returned by sobject create endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SobjectCreateResult {
    /// Remote-assigned record id.
    pub id: String,
    /// Whether the create was accepted.
    pub success: bool,
    /// Error entries when `success` is false.
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Salesforce API error response entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SalesforceError {
    message: String,
    error_code: String,
}

/// Maps a non-2xx response to the matching [`UploadError`].
pub(crate) async fn error_from_response(response: reqwest::Response) -> UploadError {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return UploadError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return UploadError::NotFound("Salesforce record or endpoint not found".to_string());
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("unable to read error body"));

    if let Ok(errors) = serde_json::from_str::<Vec<SalesforceError>>(&body) {
        if let Some(first) = errors.first() {
            if first.error_code == "REQUEST_LIMIT_EXCEEDED" {
                return UploadError::RateLimited {
                    retry_after_secs: None,
                };
            }
            return UploadError::Api(format!("[{}] {}", first.error_code, first.message));
        }
    }

    UploadError::Api(format!(
        "HTTP {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error")
    ))
}

/// Redacts a record id for logging (shows the first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    if id.len() > 8 {
        format!("{}...", &id[..8])
    } else {
        id.to_string()
    }
}
