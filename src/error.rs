use thiserror::Error;

use crate::fetch::{FetchError, FetchExhausted};
use crate::normalize::NormalizeError;
use crate::snapshot::SnapshotError;
use crate::store::StoreError;

/// Fatal run failures. Each one aborts the run at the stage that raised it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("build stats api client")]
    Client(#[from] FetchError),

    #[error(transparent)]
    FetchExhausted(#[from] FetchExhausted),

    #[error("normalize game log")]
    Normalization(#[from] NormalizeError),

    #[error("open database")]
    Open(#[source] StoreError),

    #[error("read stored games")]
    StorageRead(#[source] StoreError),

    #[error("replace stored games")]
    StorageWrite(#[source] StoreError),

    #[error("csv snapshot")]
    Snapshot(#[from] SnapshotError),

    #[error("write last-updated marker")]
    Marker(#[source] std::io::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
