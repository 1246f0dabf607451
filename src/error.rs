// Error taxonomy for the acquisition pipeline.
// Fatal sampler errors end the run; everything else costs at most one tick.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error(
        "failed to launch sampler `{program}`: {source} (powermetrics needs root; run with sudo)"
    )]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "sampler exited with {status} before producing a sample (permission denied? run with sudo): {stderr}"
    )]
    PrivilegeDenied { status: ExitStatus, stderr: String },

    #[error("sampler restarted {failures} times in a row without producing a sample; giving up")]
    RestartStorm { failures: u32 },

    #[error("no complete sample in {path:?} after {attempts} attempts")]
    NoSample { path: PathBuf, attempts: u32 },

    #[error("sampler I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SamplerError {
    /// Fatal errors abort the polling loop; the rest skip the current tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SamplerError::Spawn { .. }
                | SamplerError::PrivilegeDenied { .. }
                | SamplerError::RestartStorm { .. }
        )
    }

    /// Short subsystem tag for log fields and exit messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SamplerError::Spawn { .. } | SamplerError::PrivilegeDenied { .. } => "privilege",
            SamplerError::RestartStorm { .. } => "restart-storm",
            SamplerError::NoSample { .. } => "no-sample",
            SamplerError::Io(_) => "io",
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("record is not a valid plist sample: {0}")]
    Decode(#[from] plist::Error),

    #[error("output contains no sample record")]
    EmptyRecord,
}
