//! Salesforce Analytics External Data ingestion client.
//!
//! This module provides functionality to:
//! - Create `InsightsExternalData` jobs (Append, Overwrite, Upsert, Delete)
//! - Upload numbered data parts as base64 payloads
//! - Signal `Process` to begin server-side ingestion
//! - Read job status
//!
//! # Security
//!
//! - Part payloads are never logged
//! - Auth headers and tokens are never logged
//! - Only HTTP method, path, and status codes are logged

use std::sync::Arc;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::UploadError;
use crate::salesforce::{
    error_from_response, redact_id, JobStatus, Operation, SobjectCreateResult, API_VERSION,
};

/// File name recorded on the job; the server only uses it as a label.
const UPLOAD_FILE_NAME: &str = "datasetUpload";

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for creating an external data job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateJobRequest {
    /// Display label of the target dataset.
    pub edgemart_label: String,
    /// API name of the target dataset.
    pub edgemart_alias: String,
    /// Label recorded for the uploaded file.
    pub file_name: String,
    /// Upload format; always "Csv" for this client.
    pub format: String,
    /// What to do when the dataset already exists.
    pub operation: Operation,
    /// Notification policy; this client never requests email notifications.
    pub notification_sent: String,
    /// Analytics app (container) holding the dataset.
    /// IMPORTANT: Skips serialization when None because the API rejects
    /// explicit null container values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edgemart_container: Option<String>,
    /// Base64-encoded metadata description of the upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_json: Option<String>,
}

impl CreateJobRequest {
    /// Creates a job request for `dataset_name` with the given operation.
    ///
    /// The dataset name is used as both label and alias, matching how the
    /// dataset appears in Analytics Studio and in the REST catalog.
    pub fn new(dataset_name: &str, operation: Operation) -> Self {
        Self {
            edgemart_label: dataset_name.to_string(),
            edgemart_alias: dataset_name.to_string(),
            file_name: UPLOAD_FILE_NAME.to_string(),
            format: "Csv".to_string(),
            operation,
            notification_sent: "Never".to_string(),
            edgemart_container: None,
            metadata_json: None,
        }
    }
}

/// Status fields read back from an external data job record.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusInfo {
    /// Current processing status.
    #[serde(rename = "Status")]
    pub status: JobStatus,
    /// Server-provided detail, populated for failures and warnings.
    #[serde(rename = "StatusMessage", default)]
    pub status_message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for uploading one numbered part.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreatePartRequest<'a> {
    data_file: &'a str,
    insights_external_data_id: &'a str,
    part_number: u32,
}

/// Request body that flips the job into processing.
#[derive(Debug, Serialize)]
struct ProcessRequest {
    #[serde(rename = "Action")]
    action: &'static str,
}

// ─────────────────────────────────────────────────────────────────────────────
// InsightsExternalDataClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the External Data ingestion endpoints.
#[derive(Clone)]
pub struct InsightsExternalDataClient {
    /// Shared HTTP client.
    client: Arc<Client>,
    /// Base instance URL (e.g., "https://na1.salesforce.com").
    base_url: Url,
    /// Access token for authentication.
    access_token: SecretString,
}

impl InsightsExternalDataClient {
    /// Creates a new ingestion client.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `base_url` - Salesforce instance URL
    /// * `access_token` - OAuth access token
    pub fn new(client: Arc<Client>, base_url: Url, access_token: SecretString) -> Self {
        Self {
            client,
            base_url,
            access_token,
        }
    }

    /// Creates a new external data job.
    ///
    /// # Returns
    ///
    /// The remote-assigned job id.
    ///
    /// # Errors
    ///
    /// - `UploadError::Api` - API error or rejected create
    /// - `UploadError::RateLimited` - Rate limit exceeded
    /// - `UploadError::ConnectionFailed` - Network error
    /// - `UploadError::Parse` - Malformed response body
    pub async fn create_job(&self, req: &CreateJobRequest) -> Result<String, UploadError> {
        let url = self.sobject_url("InsightsExternalData")?;

        info!(
            "[INSIGHTS] POST /sobjects/InsightsExternalData (creating {:?} job for {})",
            req.operation, req.edgemart_alias
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(req)
            .send()
            .await
            .map_err(|e| UploadError::ConnectionFailed(format!("job creation failed: {}", e)))?;

        let status = response.status();
        info!(
            "[INSIGHTS] POST /sobjects/InsightsExternalData -> {}",
            status.as_u16()
        );

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let result: SobjectCreateResult = response
            .json()
            .await
            .map_err(|e| UploadError::Parse(format!("job creation response: {}", e)))?;

        if !result.success {
            return Err(UploadError::Api(format!(
                "job creation rejected: {:?}",
                result.errors
            )));
        }

        Ok(result.id)
    }

    /// Uploads one base64-encoded part for `job_id`.
    ///
    /// Part numbers are 1-indexed and must match the chunk plan sequence; the
    /// server reassembles parts by number, not arrival order.
    ///
    /// # Returns
    ///
    /// The remote-assigned part id.
    ///
    /// # Errors
    ///
    /// - `UploadError::Api` - API error or rejected part
    /// - `UploadError::RateLimited` - Rate limit exceeded
    /// - `UploadError::ConnectionFailed` - Network error
    /// - `UploadError::Parse` - Malformed response body
    pub async fn upload_part(
        &self,
        job_id: &str,
        part_number: u32,
        data: &str,
    ) -> Result<String, UploadError> {
        let url = self.sobject_url("InsightsExternalDataPart")?;

        let body = CreatePartRequest {
            data_file: data,
            insights_external_data_id: job_id,
            part_number,
        };

        info!(
            "[INSIGHTS] POST /sobjects/InsightsExternalDataPart (job {}, part {})",
            redact_id(job_id),
            part_number
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                UploadError::ConnectionFailed(format!("part {} upload failed: {}", part_number, e))
            })?;

        let status = response.status();
        info!(
            "[INSIGHTS] POST /sobjects/InsightsExternalDataPart -> {} (part {})",
            status.as_u16(),
            part_number
        );

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let result: SobjectCreateResult = response
            .json()
            .await
            .map_err(|e| UploadError::Parse(format!("part {} response: {}", part_number, e)))?;

        if !result.success {
            return Err(UploadError::Api(format!(
                "part {} rejected: {:?}",
                part_number, result.errors
            )));
        }

        Ok(result.id)
    }

    /// Signals the server to begin processing the uploaded parts.
    ///
    /// # Errors
    ///
    /// - `UploadError::Api` - API error
    /// - `UploadError::ConnectionFailed` - Network error
    pub async fn start_processing(&self, job_id: &str) -> Result<(), UploadError> {
        let url = self.record_url("InsightsExternalData", job_id)?;

        info!(
            "[INSIGHTS] PATCH /sobjects/InsightsExternalData/{} (processing)",
            redact_id(job_id)
        );

        let response = self
            .client
            .patch(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&ProcessRequest { action: "Process" })
            .send()
            .await
            .map_err(|e| UploadError::ConnectionFailed(format!("process request failed: {}", e)))?;

        let status = response.status();
        info!(
            "[INSIGHTS] PATCH /sobjects/InsightsExternalData/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(())
    }

    /// Reads the current status of an external data job.
    ///
    /// Returns the record as observed, including `Failed`; interpreting a
    /// terminal status is the caller's concern.
    ///
    /// # Errors
    ///
    /// - `UploadError::NotFound` - Job not found
    /// - `UploadError::Api` - API error
    /// - `UploadError::ConnectionFailed` - Network error
    /// - `UploadError::Parse` - Malformed response body
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusInfo, UploadError> {
        let url = self.record_url("InsightsExternalData", job_id)?;

        info!(
            "[INSIGHTS] GET /sobjects/InsightsExternalData/{} (status)",
            redact_id(job_id)
        );

        let response = self
            .client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| UploadError::ConnectionFailed(format!("status read failed: {}", e)))?;

        let status = response.status();
        info!(
            "[INSIGHTS] GET /sobjects/InsightsExternalData/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| UploadError::Parse(format!("job status response: {}", e)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Builders
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds an sobject collection URL: /services/data/vXX.X/sobjects/{name}
    fn sobject_url(&self, sobject: &str) -> Result<Url, UploadError> {
        let path = format!("/services/data/{}/sobjects/{}", API_VERSION, sobject);
        self.base_url
            .join(&path)
            .map_err(|e| UploadError::Internal(format!("failed to build sobject URL: {}", e)))
    }

    /// Builds a record URL: /services/data/vXX.X/sobjects/{name}/{id}
    fn record_url(&self, sobject: &str, id: &str) -> Result<Url, UploadError> {
        let path = format!("/services/data/{}/sobjects/{}/{}", API_VERSION, sobject, id);
        self.base_url
            .join(&path)
            .map_err(|e| UploadError::Internal(format!("failed to build record URL: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JOB_ID: &str = "0Fb5e000000TesTCAS";

    fn create_test_client(mock_url: &str) -> InsightsExternalDataClient {
        let client = Arc::new(Client::new());
        let base_url = Url::parse(mock_url).unwrap();
        InsightsExternalDataClient::new(client, base_url, SecretString::new("test_token".into()))
    }

    fn job_path() -> String {
        format!(
            "/services/data/{}/sobjects/InsightsExternalData",
            API_VERSION
        )
    }

    fn part_path() -> String {
        format!(
            "/services/data/{}/sobjects/InsightsExternalDataPart",
            API_VERSION
        )
    }

    fn record_path(id: &str) -> String {
        format!(
            "/services/data/{}/sobjects/InsightsExternalData/{}",
            API_VERSION, id
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Create Job Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_job_sends_expected_body_and_returns_id() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        let expected_request = serde_json::json!({
            "EdgemartLabel": "opportunities",
            "EdgemartAlias": "opportunities",
            "FileName": "datasetUpload",
            "Format": "Csv",
            "Operation": "Overwrite",
            "NotificationSent": "Never"
        });

        Mock::given(method("POST"))
            .and(path(job_path()))
            .and(header("Authorization", "Bearer test_token"))
            .and(body_json(&expected_request))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": JOB_ID,
                "success": true,
                "errors": []
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let req = CreateJobRequest::new("opportunities", Operation::Overwrite);
        let job_id = client.create_job(&req).await.unwrap();

        assert_eq!(job_id, JOB_ID);
    }

    #[tokio::test]
    async fn create_job_includes_container_and_metadata_when_set() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        let expected_request = serde_json::json!({
            "EdgemartLabel": "opportunities",
            "EdgemartAlias": "opportunities",
            "FileName": "datasetUpload",
            "Format": "Csv",
            "Operation": "Upsert",
            "NotificationSent": "Never",
            "EdgemartContainer": "SharedApp",
            "MetadataJson": "eyJmaWxlRm9ybWF0Ijp7fX0="
        });

        Mock::given(method("POST"))
            .and(path(job_path()))
            .and(body_json(&expected_request))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": JOB_ID,
                "success": true
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut req = CreateJobRequest::new("opportunities", Operation::Upsert);
        req.edgemart_container = Some("SharedApp".to_string());
        req.metadata_json = Some("eyJmaWxlRm9ybWF0Ijp7fX0=".to_string());

        assert!(client.create_job(&req).await.is_ok());
    }

    #[tokio::test]
    async fn create_job_rejected_when_success_false() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path(job_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "",
                "success": false,
                "errors": ["DUPLICATE_VALUE"]
            })))
            .mount(&mock_server)
            .await;

        let req = CreateJobRequest::new("opportunities", Operation::Overwrite);
        let err = client.create_job(&req).await.unwrap_err();

        match err {
            UploadError::Api(msg) => assert!(msg.contains("DUPLICATE_VALUE")),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Upload Part Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn upload_part_sends_numbered_payload() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        let expected_request = serde_json::json!({
            "DataFile": "SGVsbG8=",
            "InsightsExternalDataId": JOB_ID,
            "PartNumber": 3
        });

        Mock::given(method("POST"))
            .and(path(part_path()))
            .and(header("Authorization", "Bearer test_token"))
            .and(body_json(&expected_request))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "0Fc5e000000PartCAS",
                "success": true
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let part_id = client.upload_part(JOB_ID, 3, "SGVsbG8=").await.unwrap();
        assert_eq!(part_id, "0Fc5e000000PartCAS");
    }

    #[tokio::test]
    async fn upload_part_surfaces_api_error() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        let error_response = serde_json::json!([{
            "errorCode": "STORAGE_LIMIT_EXCEEDED",
            "message": "Data storage limit exceeded"
        }]);

        Mock::given(method("POST"))
            .and(path(part_path()))
            .respond_with(ResponseTemplate::new(400).set_body_json(&error_response))
            .mount(&mock_server)
            .await;

        let err = client.upload_part(JOB_ID, 1, "SGVsbG8=").await.unwrap_err();
        match err {
            UploadError::Api(msg) => {
                assert!(msg.contains("STORAGE_LIMIT_EXCEEDED"));
                assert!(msg.contains("Data storage limit exceeded"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Process / Status Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_processing_patches_action() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("PATCH"))
            .and(path(record_path(JOB_ID)))
            .and(body_json(serde_json::json!({ "Action": "Process" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        assert!(client.start_processing(JOB_ID).await.is_ok());
    }

    #[tokio::test]
    async fn job_status_parses_status_and_message() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(record_path(JOB_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Id": JOB_ID,
                "Status": "CompletedWithWarnings",
                "StatusMessage": "3 rows skipped"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let info = client.job_status(JOB_ID).await.unwrap();
        assert_eq!(info.status, JobStatus::CompletedWithWarnings);
        assert_eq!(info.status_message.as_deref(), Some("3 rows skipped"));
    }

    #[tokio::test]
    async fn job_status_returns_failed_without_erroring() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(record_path(JOB_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Status": "Failed",
                "StatusMessage": "Invalid delimiter"
            })))
            .mount(&mock_server)
            .await;

        // Observing Failed is not an error; the poller decides what it means.
        let info = client.job_status(JOB_ID).await.unwrap();
        assert_eq!(info.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn job_status_malformed_body_is_parse_error() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(record_path(JOB_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Status": "NotARealStatus"
            })))
            .mount(&mock_server)
            .await;

        let err = client.job_status(JOB_ID).await.unwrap_err();
        assert!(matches!(err, UploadError::Parse(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Error Handling Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn rate_limited_with_retry_after() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path(job_path()))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "60"))
            .mount(&mock_server)
            .await;

        let req = CreateJobRequest::new("opportunities", Operation::Overwrite);
        let err = client.create_job(&req).await.unwrap_err();

        match err {
            UploadError::RateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, Some(60));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_job_is_not_found() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(record_path("0Fb000000000000AAA")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let err = client.job_status("0Fb000000000000AAA").await.unwrap_err();
        assert!(matches!(err, UploadError::NotFound(_)));
    }

    #[tokio::test]
    async fn request_limit_exceeded_maps_to_rate_limited() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        let error_response = serde_json::json!([{
            "errorCode": "REQUEST_LIMIT_EXCEEDED",
            "message": "TotalRequests Limit exceeded."
        }]);

        Mock::given(method("POST"))
            .and(path(part_path()))
            .respond_with(ResponseTemplate::new(403).set_body_json(&error_response))
            .mount(&mock_server)
            .await;

        let err = client.upload_part(JOB_ID, 1, "SGVsbG8=").await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::RateLimited {
                retry_after_secs: None
            }
        ));
    }
}
