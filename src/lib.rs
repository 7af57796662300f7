//! Chunked Salesforce Analytics external data uploads with job status polling.
//!
//! This crate implements the "upload a local file as a dataset job" capability
//! used by CLI tooling:
//!
//! - Create an `InsightsExternalData` job
//! - Split the source file into bounded-size parts (gzip + base64 byte blocks,
//!   or record-aware CSV chunks) and upload them with serial or paced-parallel
//!   dispatch
//! - Signal `Process` and poll the job until it reaches a terminal status, or
//!   detach immediately in fire-and-forget mode
//!
//! # Security
//!
//! - Access tokens are held as `SecretString` and never logged
//! - Raw upload payloads are never logged; log lines carry only HTTP method,
//!   path, and status code, with record ids redacted to a prefix

pub mod error;
pub mod progress;
pub mod retry;
pub mod salesforce;
pub mod streaming;
pub mod upload;

pub use error::UploadError;
pub use progress::ProgressCounter;
pub use salesforce::datasets::{DatasetCatalogClient, DatasetSummary};
pub use salesforce::insights::{CreateJobRequest, InsightsExternalDataClient, JobStatusInfo};
pub use salesforce::{JobStatus, Operation};
pub use upload::{
    ChunkMode, CompletionMode, ConcurrencyMode, DatasetUploader, PollPolicy, UploadOutcome,
    UploadRequest,
};
