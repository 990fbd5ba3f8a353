use std::path::PathBuf;

use thiserror::Error;

use crate::tagging::domain::archive::ArchiveError;
use crate::tagging::domain::identity::TagId;

/// Failure of a single image. Never aborts the rest of a batch.
#[derive(Error, Debug)]
pub enum TaggingError {
    #[error("anonymous pool has {available} unused identities but {required} faces are unmatched")]
    PoolUndersized { required: usize, available: usize },
    #[error("anonymous pool still below {required} identities after {attempts} creation attempts")]
    PoolDidNotConverge { required: usize, attempts: usize },
    #[error("tag {tag_id} matched by more than one detection")]
    ConflictingMatch { tag_id: TagId },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error>,
    },
    #[error("face detection failed: {0}")]
    Detection(#[source] Box<dyn std::error::Error>),
}
