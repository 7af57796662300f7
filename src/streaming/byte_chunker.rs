//! Byte-mode chunking: gzip the source, cut the compressed stream into
//! fixed-size blocks, and base64-encode each block for transmission.

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::stream::Stream;
use tokio::io::AsyncReadExt;

use crate::error::UploadError;

/// Maximum raw bytes per part, per the External Data Part document limit.
pub const PART_BYTE_LIMIT: u64 = 10_000_000;

/// Name of the compressed scratch copy of the source file.
const COMPRESSED_FILE_NAME: &str = "upload.csv.gz";

// ─────────────────────────────────────────────────────────────────────────────
// ChunkPlan
// ─────────────────────────────────────────────────────────────────────────────

/// One planned part: a 1-indexed sequence number and a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub sequence: u32,
    /// Start offset, inclusive.
    pub start: u64,
    /// End offset, exclusive.
    pub end: u64,
}

impl ChunkSpec {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// An ordered, non-overlapping cover of a byte stream.
///
/// Chunks are sized to `chunk_bytes` with the last chunk permitted to be
/// smaller; concatenating the ranges reproduces the stream exactly.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total_bytes: u64,
    chunks: Vec<ChunkSpec>,
}

impl ChunkPlan {
    /// Plans chunks for a stream of `total_bytes` at `chunk_bytes` per part.
    ///
    /// A stream no larger than one limit yields exactly one chunk (an empty
    /// stream plans one empty chunk rather than none).
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Config` if `chunk_bytes` is zero.
    pub fn for_length(total_bytes: u64, chunk_bytes: u64) -> Result<Self, UploadError> {
        if chunk_bytes == 0 {
            return Err(UploadError::Config(
                "chunk byte limit must be greater than zero".to_string(),
            ));
        }

        let count = if total_bytes == 0 {
            1
        } else {
            total_bytes.div_ceil(chunk_bytes)
        };

        let mut chunks = Vec::with_capacity(count as usize);
        for index in 0..count {
            let start = index * chunk_bytes;
            let end = (start + chunk_bytes).min(total_bytes);
            chunks.push(ChunkSpec {
                sequence: index as u32 + 1,
                start,
                end,
            });
        }

        Ok(Self { total_bytes, chunks })
    }

    pub fn total_parts(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn chunks(&self) -> &[ChunkSpec] {
        &self.chunks
    }

    /// Bytes covered by all chunks together; always equals the stream length.
    pub fn covered_bytes(&self) -> u64 {
        self.chunks.iter().map(ChunkSpec::len).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compression
// ─────────────────────────────────────────────────────────────────────────────

/// Gzips `source` into the scratch directory and returns the compressed path.
///
/// Compression is blocking work and runs on the blocking pool.
///
/// # Errors
///
/// Returns `UploadError::Io` if the source cannot be read or the scratch
/// file cannot be written.
pub async fn compress_to_scratch(
    source: &Path,
    scratch_dir: &Path,
) -> Result<PathBuf, UploadError> {
    let source = source.to_owned();
    let dest = scratch_dir.join(COMPRESSED_FILE_NAME);
    let out = dest.clone();

    tokio::task::spawn_blocking(move || -> Result<(), UploadError> {
        let mut input = std::fs::File::open(&source)?;
        let output = std::fs::File::create(&out)?;
        let mut encoder = GzEncoder::new(std::io::BufWriter::new(output), Compression::default());
        std::io::copy(&mut input, &mut encoder)?;
        encoder.finish()?.flush()?;
        Ok(())
    })
    .await
    .map_err(|e| UploadError::Internal(format!("compression task failed: {}", e)))??;

    Ok(dest)
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoded part stream
// ─────────────────────────────────────────────────────────────────────────────

/// One part payload ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedPart {
    /// 1-indexed part number matching the chunk plan sequence.
    pub part_number: u32,
    /// Base64-encoded chunk contents.
    pub data: String,
}

/// Streams the file at `path` as base64-encoded parts following `plan`.
///
/// Chunks are read sequentially, one plan entry per item, so at most one raw
/// chunk is buffered at a time.
pub fn encoded_parts(
    path: PathBuf,
    plan: &ChunkPlan,
) -> impl Stream<Item = Result<EncodedPart, UploadError>> {
    let sizes: Vec<u64> = plan.chunks().iter().map(ChunkSpec::len).collect();

    futures_util::stream::try_unfold(
        (None::<tokio::fs::File>, path, sizes.into_iter().enumerate()),
        |(file, path, mut sizes)| async move {
            let Some((index, len)) = sizes.next() else {
                return Ok(None);
            };

            let mut file = match file {
                Some(file) => file,
                None => tokio::fs::File::open(&path).await?,
            };

            let mut buf = vec![0u8; len as usize];
            file.read_exact(&mut buf).await?;

            let part = EncodedPart {
                part_number: index as u32 + 1,
                data: BASE64.encode(&buf),
            };
            Ok(Some((part, (Some(file), path, sizes))))
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
