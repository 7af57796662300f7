//! Dataset upload orchestration.
//!
//! One invocation drives the full job lifecycle: create the external data
//! job, split the source into parts, upload the parts serially or in parallel
//! with paced dispatch, signal `Process`, then either poll to a terminal
//! status or detach. Scratch artifacts live in a per-invocation temp
//! directory that is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::stream::FuturesUnordered;
use futures_util::{pin_mut, Stream, StreamExt, TryStreamExt};
use tempfile::TempDir;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::UploadError;
use crate::progress::{ProgressCounter, ProgressFn};
use crate::retry::{retry_with_budget, Attempt, Outcome};
use crate::salesforce::insights::{CreateJobRequest, InsightsExternalDataClient, JobStatusInfo};
use crate::salesforce::{redact_id, JobStatus, Operation};
use crate::streaming::byte_chunker::{self, ChunkPlan, EncodedPart, PART_BYTE_LIMIT};
use crate::streaming::csv_chunker;

/// Default delay inserted before each part dispatch.
pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

/// Default fixed interval between job status reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default status read budget (~50 minutes at the default interval).
pub const DEFAULT_POLL_ATTEMPTS: u32 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// How part requests are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// One in-flight request; part N+1 waits for part N's response.
    Serial,
    /// All parts dispatched without waiting for responses, each dispatch
    /// preceded by the pacing delay. Completion order is unconstrained.
    Parallel,
}

/// How the source file is split into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    /// Gzip the source, then upload fixed-size blocks of the compressed
    /// stream, base64-encoded.
    Bytes { limit: u64 },
    /// Split the source CSV on record boundaries into files sized near
    /// `target_chunk_bytes`.
    Rows { target_chunk_bytes: u64 },
}

impl Default for ChunkMode {
    fn default() -> Self {
        ChunkMode::Bytes {
            limit: PART_BYTE_LIMIT,
        }
    }
}

/// Budgeted fixed-interval polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of status reads.
    pub max_attempts: u32,
    /// Fixed delay between reads.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Whether the upload waits for remote processing to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Poll the job until a terminal status or the attempt budget runs out.
    Wait(PollPolicy),
    /// Return as soon as processing starts; the caller checks status later.
    FireAndForget,
}

impl Default for CompletionMode {
    fn default() -> Self {
        CompletionMode::Wait(PollPolicy::default())
    }
}

/// One dataset upload request.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Dataset name, used as both label and API alias.
    pub dataset_name: String,
    /// Local source file.
    pub source: PathBuf,
    /// Analytics app (container) holding the dataset.
    pub app: Option<String>,
    /// Conflict-resolution operation when the dataset exists.
    pub operation: Operation,
    /// Local JSON file describing the upload, sent base64-encoded.
    pub metadata_json: Option<PathBuf>,
    /// Splitting strategy.
    pub chunking: ChunkMode,
    /// Dispatch strategy for part uploads.
    pub concurrency: ConcurrencyMode,
    /// Delay before each part dispatch.
    pub pacing: Duration,
    /// Wait for processing or detach after the `Process` signal.
    pub completion: CompletionMode,
}

impl UploadRequest {
    /// Creates a request with default chunking, parallel dispatch, default
    /// pacing, and synchronous completion.
    pub fn new(dataset_name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            source: source.into(),
            app: None,
            operation: Operation::default(),
            metadata_json: None,
            chunking: ChunkMode::default(),
            concurrency: ConcurrencyMode::Parallel,
            pacing: DEFAULT_PACING,
            completion: CompletionMode::default(),
        }
    }

    /// Sets the Analytics app (container).
    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Sets the conflict-resolution operation.
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Sets the metadata description file.
    pub fn metadata_json(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_json = Some(path.into());
        self
    }

    /// Sets the splitting strategy.
    pub fn chunking(mut self, chunking: ChunkMode) -> Self {
        self.chunking = chunking;
        self
    }

    /// Sets the dispatch strategy.
    pub fn concurrency(mut self, concurrency: ConcurrencyMode) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the delay before each part dispatch.
    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Sets the completion mode.
    pub fn completion(mut self, completion: CompletionMode) -> Self {
        self.completion = completion;
        self
    }
}

/// Result of one upload invocation.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// Synchronous completion: the final observed job record.
    Finished {
        job_id: String,
        status: JobStatus,
        status_message: Option<String>,
        total_parts: u32,
    },
    /// Fire-and-forget: processing has started, status unobserved.
    Started { job_id: String, total_parts: u32 },
}

impl UploadOutcome {
    /// The remote job id, whichever way the upload finished.
    pub fn job_id(&self) -> &str {
        match self {
            UploadOutcome::Finished { job_id, .. } => job_id,
            UploadOutcome::Started { job_id, .. } => job_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DatasetUploader
// ─────────────────────────────────────────────────────────────────────────────

/// Drives dataset uploads end to end.
pub struct DatasetUploader {
    client: InsightsExternalDataClient,
    scratch_root: Option<PathBuf>,
    reporter: Option<Arc<ProgressFn>>,
}

impl DatasetUploader {
    /// Creates an uploader over the given ingestion client.
    pub fn new(client: InsightsExternalDataClient) -> Self {
        Self {
            client,
            scratch_root: None,
            reporter: None,
        }
    }

    /// Places per-invocation scratch directories under `dir` instead of the
    /// system temp directory.
    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self
    }

    /// Registers a callback receiving `(completed, total)` after each part.
    pub fn progress_reporter(
        mut self,
        reporter: impl Fn(u64, u64) + Send + Sync + 'static,
    ) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Uploads `request.source` as a dataset job.
    ///
    /// In synchronous mode the returned outcome carries the final observed
    /// job status; in fire-and-forget mode it carries only the job id.
    ///
    /// # Errors
    ///
    /// - `UploadError::Config` - empty dataset name or non-positive size policy
    /// - `UploadError::Io` / `UploadError::CsvChunk` - source or scratch failure
    /// - `UploadError::Api` / `UploadError::ConnectionFailed` /
    ///   `UploadError::RateLimited` - any endpoint call rejected
    /// - `UploadError::JobFailed` - remote processing ended in `Failed`
    /// - `UploadError::PollTimeout` - status read budget exhausted
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadOutcome, UploadError> {
        validate_request(request)?;

        let scratch = match &self.scratch_root {
            Some(root) => TempDir::new_in(root),
            None => TempDir::new(),
        }?;

        let result = self.run(request, scratch.path()).await;

        // Scratch removal must never mask the upload result.
        if let Err(err) = scratch.close() {
            warn!("[UPLOAD] failed to remove scratch directory: {}", err);
        }

        result
    }

    async fn run(
        &self,
        request: &UploadRequest,
        scratch: &Path,
    ) -> Result<UploadOutcome, UploadError> {
        let job_request = build_create_request(request).await?;
        let job_id = self.client.create_job(&job_request).await?;
        info!(
            "[UPLOAD] created job {} for dataset {}",
            redact_id(&job_id),
            request.dataset_name
        );

        let total_parts = match request.chunking {
            ChunkMode::Bytes { limit } => {
                let compressed =
                    byte_chunker::compress_to_scratch(&request.source, scratch).await?;
                let compressed_len = tokio::fs::metadata(&compressed).await?.len();
                let plan = ChunkPlan::for_length(compressed_len, limit)?;
                let total = plan.total_parts();
                info!(
                    "[UPLOAD] job {}: {} bytes compressed into {} part(s)",
                    redact_id(&job_id),
                    compressed_len,
                    total
                );
                let parts = byte_chunker::encoded_parts(compressed, &plan);
                self.upload_parts(&job_id, parts, request, self.new_progress(total))
                    .await?;
                total
            }
            ChunkMode::Rows { target_chunk_bytes } => {
                let split =
                    csv_chunker::split_file(&request.source, scratch, target_chunk_bytes).await?;
                let total = split.chunk_paths.len() as u32;
                info!(
                    "[UPLOAD] job {}: {} row(s) split into {} part(s)",
                    redact_id(&job_id),
                    split.total_rows,
                    total
                );
                let parts = futures_util::stream::iter(split.chunk_paths.into_iter().enumerate())
                    .then(|(index, path)| async move {
                        let bytes = tokio::fs::read(&path).await?;
                        Ok::<EncodedPart, UploadError>(EncodedPart {
                            part_number: index as u32 + 1,
                            data: BASE64.encode(&bytes),
                        })
                    });
                self.upload_parts(&job_id, parts, request, self.new_progress(total))
                    .await?;
                total
            }
        };

        self.client.start_processing(&job_id).await?;

        match request.completion {
            CompletionMode::FireAndForget => {
                info!(
                    "[UPLOAD] job {} processing started; not waiting for completion",
                    redact_id(&job_id)
                );
                Ok(UploadOutcome::Started {
                    job_id,
                    total_parts,
                })
            }
            CompletionMode::Wait(policy) => {
                let final_status = self.wait_for_completion(&job_id, policy).await?;
                Ok(UploadOutcome::Finished {
                    job_id,
                    status: final_status.status,
                    status_message: final_status.status_message,
                    total_parts,
                })
            }
        }
    }

    fn new_progress(&self, total_parts: u32) -> Arc<ProgressCounter> {
        Arc::new(match &self.reporter {
            Some(reporter) => ProgressCounter::with_reporter(total_parts as u64, reporter.clone()),
            None => ProgressCounter::new(total_parts as u64),
        })
    }

    /// Uploads every part in plan order, honoring the concurrency mode.
    async fn upload_parts<S>(
        &self,
        job_id: &str,
        parts: S,
        request: &UploadRequest,
        progress: Arc<ProgressCounter>,
    ) -> Result<(), UploadError>
    where
        S: Stream<Item = Result<EncodedPart, UploadError>>,
    {
        pin_mut!(parts);

        match request.concurrency {
            ConcurrencyMode::Serial => {
                while let Some(part) = parts.try_next().await? {
                    sleep(request.pacing).await;
                    self.client
                        .upload_part(job_id, part.part_number, &part.data)
                        .await?;
                    progress.record_completed();
                }
            }
            ConcurrencyMode::Parallel => {
                let mut in_flight = FuturesUnordered::new();
                while let Some(part) = parts.try_next().await? {
                    sleep(request.pacing).await;
                    let client = self.client.clone();
                    let job_id = job_id.to_string();
                    let progress = progress.clone();
                    in_flight.push(tokio::spawn(async move {
                        client
                            .upload_part(&job_id, part.part_number, &part.data)
                            .await?;
                        progress.record_completed();
                        Ok::<(), UploadError>(())
                    }));
                }
                // The first settled failure aborts the submission; parts
                // already in flight are not cancelled.
                while let Some(settled) = in_flight.next().await {
                    settled.map_err(|e| {
                        UploadError::Internal(format!("part upload task failed: {}", e))
                    })??;
                }
            }
        }

        Ok(())
    }

    /// Polls the job until a terminal status or the attempt budget runs out.
    async fn wait_for_completion(
        &self,
        job_id: &str,
        policy: PollPolicy,
    ) -> Result<JobStatusInfo, UploadError> {
        let client = &self.client;

        let outcome = retry_with_budget(policy.max_attempts, policy.interval, |attempt| {
            async move {
                match client.job_status(job_id).await {
                    Ok(info) => match info.status {
                        JobStatus::Completed | JobStatus::CompletedWithWarnings => {
                            Ok(Attempt::Done(info))
                        }
                        JobStatus::Failed => Err(UploadError::JobFailed {
                            job_id: job_id.to_string(),
                            message: info
                                .status_message
                                .unwrap_or_else(|| "no status message".to_string()),
                        }),
                        JobStatus::Pending | JobStatus::Processing => {
                            info!(
                                "[UPLOAD] job {} not finished (attempt {}, status {:?})",
                                redact_id(job_id),
                                attempt,
                                info.status
                            );
                            Ok(Attempt::Retry)
                        }
                    },
                    // A failed status read counts against the same attempt
                    // budget as a non-terminal status.
                    Err(err) => {
                        warn!(
                            "[UPLOAD] job {} status read failed (attempt {}): {}",
                            redact_id(job_id),
                            attempt,
                            err
                        );
                        Ok(Attempt::Retry)
                    }
                }
            }
        })
        .await;

        match outcome {
            Outcome::Success(info) => {
                if info.status == JobStatus::CompletedWithWarnings {
                    warn!(
                        "[UPLOAD] job {} completed with warnings: {}",
                        redact_id(job_id),
                        info.status_message.as_deref().unwrap_or("(no message)")
                    );
                }
                Ok(info)
            }
            Outcome::Failed(err) => Err(err),
            Outcome::TimedOut { attempts } => Err(UploadError::PollTimeout {
                job_id: job_id.to_string(),
                attempts,
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn validate_request(request: &UploadRequest) -> Result<(), UploadError> {
    if request.dataset_name.trim().is_empty() {
        return Err(UploadError::Config(
            "dataset name must not be empty".to_string(),
        ));
    }
    match request.chunking {
        ChunkMode::Bytes { limit } if limit == 0 => Err(UploadError::Config(
            "chunk byte limit must be greater than zero".to_string(),
        )),
        ChunkMode::Rows { target_chunk_bytes } if target_chunk_bytes == 0 => {
            Err(UploadError::Config(
                "target chunk byte size must be greater than zero".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

async fn build_create_request(request: &UploadRequest) -> Result<CreateJobRequest, UploadError> {
    let mut job = CreateJobRequest::new(&request.dataset_name, request.operation);
    job.edgemart_container = request.app.clone();
    if let Some(path) = &request.metadata_json {
        let bytes = tokio::fs::read(path).await?;
        job.metadata_json = Some(BASE64.encode(&bytes));
    }
    Ok(job)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
