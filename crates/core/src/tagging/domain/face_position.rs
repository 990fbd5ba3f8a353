use crate::shared::face_box::FaceBox;
use crate::tagging::domain::identity::TagId;

pub type ImageId = i64;

/// Where a tagged face sits in an image, in the pixel space of the image
/// resolution at the time the record was written.
///
/// Keyed by `(image_id, tag_id)`: an identity appears at most once per image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredFacePosition {
    pub image_id: ImageId,
    pub tag_id: TagId,
    pub face_box: FaceBox,
    pub image_width: u32,
    pub image_height: u32,
}

impl StoredFacePosition {
    pub fn key(&self) -> (ImageId, TagId) {
        (self.image_id, self.tag_id)
    }

    /// Factor that maps this record's box into an image `current_width`
    /// pixels wide. Assumes a proportional resize; `None` when the stored
    /// width is unusable.
    pub fn scale_to(&self, current_width: u32) -> Option<f64> {
        if self.image_width == 0 {
            return None;
        }
        Some(current_width as f64 / self.image_width as f64)
    }
}
