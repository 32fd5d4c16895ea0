// Error taxonomy for a search run.
//
// Every variant is fatal for a single pipeline run: nothing here is retried
// and there is no partial-success mode. The binary logs the diagnostic and
// exits non-zero.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The run configuration is unusable, e.g. the batch byte budget is
    /// smaller than a single query. Detected before any dispatch.
    #[error("configuration error: {0}")]
    Config(String),

    /// The index archive is malformed: truncated stream, inconsistent
    /// geometry, or a bit array whose length is not a multiple of 64.
    #[error("corrupt index archive: {0}")]
    CorruptIndex(String),

    /// The named accelerator artifact was not found at any candidate
    /// location. There is no fallback execution path.
    #[error("accelerator artifact not found: {0}")]
    MissingArtifact(PathBuf),

    /// The artifact was loaded but a required entry point is absent.
    #[error("symbol resolution failed: {0}")]
    SymbolResolution(String),

    /// The selected device lacks a required memory-model capability.
    #[error("device capability missing: {0}")]
    DeviceCapability(String),

    /// A dispatched probe kernel reported failure.
    #[error("probe kernel failed: {0}")]
    Probe(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
