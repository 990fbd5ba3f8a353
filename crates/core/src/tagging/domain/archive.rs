use thiserror::Error;

use crate::tagging::domain::face_position::{ImageId, StoredFacePosition};
use crate::tagging::domain::identity::{Identity, NewIdentity, TagId};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{operation} failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("stored face position for image {image_id}, tag {tag_id} has invalid {field} {value}")]
    InvalidRecord {
        image_id: ImageId,
        tag_id: TagId,
        field: &'static str,
        value: i64,
    },
    #[error("more than one archive image matches {path}")]
    AmbiguousImage { path: String },
}

/// Lookup of archive images by path, id range or upload date.
pub trait ImageCatalog {
    /// Finds the image stored at `path`, or failing that one whose bare
    /// file name is `file_name`.
    fn image_id(&self, path: &str, file_name: &str) -> Result<Option<ImageId>, ArchiveError>;

    /// Archive paths of images with `start <= id <= end`.
    fn image_paths_by_id(&self, start: ImageId, end: ImageId) -> Result<Vec<String>, ArchiveError>;

    /// Archive paths of images made available between `start` and `end`
    /// inclusive.
    fn image_paths_by_date(&self, start: &str, end: &str) -> Result<Vec<String>, ArchiveError>;
}

/// Named and anonymous identities.
pub trait IdentityStore {
    /// All anonymous identities, ascending by id.
    fn anonymous_identities(&self) -> Result<Vec<Identity>, ArchiveError>;

    fn create_identities(&mut self, identities: &[NewIdentity]) -> Result<(), ArchiveError>;

    fn url_name(&self, tag_id: TagId) -> Result<Option<String>, ArchiveError>;
}

/// Per-image face positions and their image-to-identity associations.
pub trait FacePositionStore {
    /// Positions recorded for `image_id`, ordered by top then left.
    fn face_positions(&self, image_id: ImageId) -> Result<Vec<StoredFacePosition>, ArchiveError>;

    /// Inserts `new` positions (with their image-tag associations) and
    /// overwrites `updated` positions by key, committing both together.
    fn save_face_positions(
        &mut self,
        new: &[StoredFacePosition],
        updated: &[StoredFacePosition],
    ) -> Result<(), ArchiveError>;
}

/// Everything a tagging run needs from the archive, opened once by the
/// caller and handed to each image in turn.
pub trait FaceArchive: ImageCatalog + IdentityStore + FacePositionStore {}

impl<T: ImageCatalog + IdentityStore + FacePositionStore> FaceArchive for T {}
