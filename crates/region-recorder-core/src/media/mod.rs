mod artifact;
pub mod backend;
pub mod export;
mod handle;
pub(crate) mod pipeline;
mod worker;

pub use {
    artifact::{Blob, BlobRegistry, RecordingArtifact},
    handle::{WorkerCommand, WorkerHandle},
    worker::{MediaWorker, PREVIEW_FILENAME},
};
