// Tail-reading the sampler's output file with a bounded retry.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::SamplerError;
use crate::models::RawSample;
use crate::parser;

/// Only the end of the output file is read; the newest records live there.
pub const TAIL_BYTES: u64 = 50_000;

/// Last `TAIL_BYTES` of `path`.
pub async fn read_tail(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(TAIL_BYTES)))
        .await?;
    let mut buf = Vec::with_capacity(len.min(TAIL_BYTES) as usize);
    file.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Single attempt: newest complete record in `path`.
pub async fn read_latest(path: &Path) -> anyhow::Result<RawSample> {
    let buf = read_tail(path).await?;
    Ok(parser::decode_latest(&buf)?)
}

/// Reads the newest record, retrying up to `attempts` times with `backoff` between tries
/// (the file may not exist or hold a complete record yet right after a spawn).
pub async fn read_with_retry(
    path: &Path,
    attempts: u32,
    backoff: Duration,
) -> Result<RawSample, SamplerError> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match read_latest(path).await {
            Ok(sample) => return Ok(sample),
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    attempt,
                    path = %path.display(),
                    operation = "read_sample",
                    "sample not ready"
                );
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(SamplerError::NoSample {
        path: path.to_path_buf(),
        attempts,
    })
}
