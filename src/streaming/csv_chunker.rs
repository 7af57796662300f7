//! Record-aware row-mode chunking that never corrupts records.
//!
//! Uses the `csv` crate to properly handle embedded commas and newlines within
//! quoted fields. The source is split into a derived number of chunk files so
//! that each lands near a target byte size, always on a record boundary. The
//! header row is written only to the first chunk: parts are concatenated by
//! the server, so a repeated header would be ingested as data.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{ByteRecord, ReaderBuilder, Terminator, WriterBuilder};

use crate::error::UploadError;

/// Result of splitting a CSV file into row-mode chunks.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    /// Paths to the generated chunk files, in part order.
    pub chunk_paths: Vec<PathBuf>,
    /// Total data rows processed (excluding the header).
    pub total_rows: u64,
    /// Data rows in each chunk (parallel to `chunk_paths`).
    pub rows_per_chunk: Vec<u64>,
}

/// Splits a CSV file into chunk files of a derived row count.
///
/// The row count per chunk comes from the source size and the target bytes
/// per chunk: `chunk_rows = ceil(total_rows / ceil(file_size / target))`. A
/// source that fits one target-sized chunk produces exactly one chunk file; a
/// record is never split across two chunks.
///
/// # Arguments
///
/// * `source` - Path to the source CSV file
/// * `scratch_dir` - Directory where chunk files will be created
/// * `target_chunk_bytes` - Nominal byte size of one chunk
///
/// # Errors
///
/// Returns `UploadError::Config` if `target_chunk_bytes` is zero,
/// `UploadError::Io` if the source cannot be read, and
/// `UploadError::CsvChunk` if the source is not valid CSV or chunk files
/// cannot be written.
pub async fn split_file(
    source: &Path,
    scratch_dir: &Path,
    target_chunk_bytes: u64,
) -> Result<ChunkResult, UploadError> {
    if target_chunk_bytes == 0 {
        return Err(UploadError::Config(
            "target chunk byte size must be greater than zero".to_string(),
        ));
    }

    let source = source.to_owned();
    let scratch_dir = scratch_dir.to_owned();

    tokio::task::spawn_blocking(move || split_file_blocking(&source, &scratch_dir, target_chunk_bytes))
        .await
        .map_err(|e| UploadError::Internal(format!("chunking task failed: {}", e)))?
}

fn split_file_blocking(
    source: &Path,
    scratch_dir: &Path,
    target_chunk_bytes: u64,
) -> Result<ChunkResult, UploadError> {
    let file_size = std::fs::metadata(source)?.len();
    let total_rows = count_records(source)?;

    if total_rows == 0 {
        return Ok(ChunkResult {
            chunk_paths: Vec::new(),
            total_rows: 0,
            rows_per_chunk: Vec::new(),
        });
    }

    let part_budget = file_size.div_ceil(target_chunk_bytes).max(1);
    let chunk_rows = total_rows.div_ceil(part_budget);

    let file = File::open(source)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file));

    let headers = reader
        .byte_headers()
        .map_err(|e| UploadError::CsvChunk(format!("failed to read CSV headers: {}", e)))?
        .clone();
    let header_bytes = serialize_record(&headers)?;

    let mut chunk_paths: Vec<PathBuf> = Vec::new();
    let mut rows_per_chunk: Vec<u64> = Vec::new();
    let mut writer: Option<BufWriter<File>> = None;
    let mut current_chunk_rows: u64 = 0;
    let mut record_buf: Vec<u8> = Vec::with_capacity(4096);

    for result in reader.byte_records() {
        let record = result
            .map_err(|e| UploadError::CsvChunk(format!("failed to read CSV record: {}", e)))?;

        if writer.is_none() || current_chunk_rows >= chunk_rows {
            if let Some(mut finished) = writer.take() {
                finished
                    .flush()
                    .map_err(|e| UploadError::CsvChunk(format!("failed to flush chunk: {}", e)))?;
                rows_per_chunk.push(current_chunk_rows);
            }

            let chunk_path = scratch_dir.join(format!("part_{:04}.csv", chunk_paths.len() + 1));
            let mut new_writer = BufWriter::new(File::create(&chunk_path).map_err(|e| {
                UploadError::CsvChunk(format!("failed to create chunk file: {}", e))
            })?);

            // Header goes to the first chunk only; the server concatenates
            // parts, so later chunks must start on a data record.
            if chunk_paths.is_empty() {
                new_writer.write_all(&header_bytes).map_err(|e| {
                    UploadError::CsvChunk(format!("failed to write chunk header: {}", e))
                })?;
            }

            chunk_paths.push(chunk_path);
            writer = Some(new_writer);
            current_chunk_rows = 0;
        }

        record_buf.clear();
        serialize_record_into(&record, &mut record_buf)?;
        if let Some(ref mut w) = writer {
            w.write_all(&record_buf)
                .map_err(|e| UploadError::CsvChunk(format!("failed to write to chunk: {}", e)))?;
            current_chunk_rows += 1;
        }
    }

    if let Some(mut finished) = writer.take() {
        finished
            .flush()
            .map_err(|e| UploadError::CsvChunk(format!("failed to flush chunk: {}", e)))?;
        rows_per_chunk.push(current_chunk_rows);
    }

    Ok(ChunkResult {
        chunk_paths,
        total_rows,
        rows_per_chunk,
    })
}

/// Counts data records (excluding the header) in one pass.
fn count_records(source: &Path) -> Result<u64, UploadError> {
    let file = File::open(source)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file));

    let headers = reader
        .byte_headers()
        .map_err(|e| UploadError::CsvChunk(format!("failed to read CSV headers: {}", e)))?;
    if headers.is_empty() {
        return Err(UploadError::CsvChunk(
            "CSV file has no header row".to_string(),
        ));
    }

    let mut total: u64 = 0;
    for result in reader.byte_records() {
        result.map_err(|e| UploadError::CsvChunk(format!("failed to read CSV record: {}", e)))?;
        total += 1;
    }
    Ok(total)
}

/// Serializes a ByteRecord to bytes using CRLF terminator.
fn serialize_record(record: &ByteRecord) -> Result<Vec<u8>, UploadError> {
    let mut buf = Vec::with_capacity(record.len() * 32);
    serialize_record_into(record, &mut buf)?;
    Ok(buf)
}

/// Serializes a ByteRecord into an existing buffer using CRLF terminator.
fn serialize_record_into(record: &ByteRecord, buf: &mut Vec<u8>) -> Result<(), UploadError> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::CRLF)
        .from_writer(buf);

    writer
        .write_byte_record(record)
        .map_err(|e| UploadError::CsvChunk(format!("failed to serialize record: {}", e)))?;
    writer
        .flush()
        .map_err(|e| UploadError::CsvChunk(format!("failed to flush writer: {}", e)))?;

    Ok(())
}
