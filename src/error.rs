use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum UploadError {
    // ── Configuration / local files ───────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV chunk error: {0}")]
    CsvChunk(String),

    // ── Network / API ─────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Salesforce error: {0}")]
    Api(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Malformed response: {0}")]
    Parse(String),

    // ── Job lifecycle ─────────────────────────────────────────────────────────
    #[error("Dataset job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Dataset job {job_id} not terminal after {attempts} status reads")]
    PollTimeout { job_id: String, attempts: u32 },

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}
