use std::path::PathBuf;

use crate::shared::frame::Frame;
use crate::tagging::domain::face_position::ImageId;
use crate::tagging::domain::identity::TagId;

/// Stores face crops as training material for a face recognizer.
///
/// `identity_key` is the identity's display key; where and how the crop is
/// stored is up to the implementation.
pub trait TrainingImageWriter: Send {
    /// Writes one crop and returns where it went.
    fn write(
        &self,
        identity_key: &str,
        image_id: ImageId,
        tag_id: TagId,
        crop: &Frame,
    ) -> Result<PathBuf, Box<dyn std::error::Error>>;
}
