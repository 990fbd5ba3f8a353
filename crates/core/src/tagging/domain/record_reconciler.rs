use std::collections::{BTreeSet, HashSet};

use crate::detection::domain::detected_face::DetectedFace;
use crate::shared::frame::Frame;
use crate::tagging::domain::face_matcher::FaceMatch;
use crate::tagging::domain::face_position::{ImageId, StoredFacePosition};
use crate::tagging::domain::identity::TagId;
use crate::tagging::domain::tagging_error::TaggingError;

/// The image a batch of detections belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageGeometry {
    pub image_id: ImageId,
    pub width: u32,
    pub height: u32,
}

/// A face crop destined for the training set of `tag_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingCrop {
    pub image_id: ImageId,
    pub tag_id: TagId,
    pub pixels: Frame,
}

/// Persistence batches for one image plus the crops to hand to the trainer.
///
/// `new_records` and `updated_records` never share a key and together hold
/// one record per detection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciliation {
    pub new_records: Vec<StoredFacePosition>,
    pub updated_records: Vec<StoredFacePosition>,
    pub training_crops: Vec<TrainingCrop>,
}

/// Turns match decisions into insert/update batches, drawing anonymous
/// identities for unmatched faces.
#[derive(Clone, Debug, Default)]
pub struct RecordReconciler;

impl RecordReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Builds the batches for one image.
    ///
    /// Matched faces become updates that keep their identity but take this
    /// run's geometry. Unmatched faces become inserts, each taking the
    /// smallest remaining id from `pool`. Pool ids that are also matched in
    /// this batch are never drawn. A pool too small for the unmatched faces
    /// fails the whole image.
    pub fn reconcile(
        &self,
        image: ImageGeometry,
        faces: Vec<(DetectedFace, FaceMatch)>,
        pool: &[TagId],
    ) -> Result<Reconciliation, TaggingError> {
        let mut matched: HashSet<TagId> = HashSet::new();
        for (_, m) in &faces {
            if let FaceMatch::Matched(tag_id) = m {
                if !matched.insert(*tag_id) {
                    return Err(TaggingError::ConflictingMatch { tag_id: *tag_id });
                }
            }
        }

        let available: BTreeSet<TagId> = pool
            .iter()
            .copied()
            .filter(|id| !matched.contains(id))
            .collect();
        let required = faces.len() - matched.len();
        if available.len() < required {
            return Err(TaggingError::PoolUndersized {
                required,
                available: available.len(),
            });
        }
        let mut fresh_ids = available.into_iter();

        let mut result = Reconciliation::default();
        for (face, m) in faces {
            let (tag_id, batch) = match m {
                FaceMatch::Matched(tag_id) => (tag_id, &mut result.updated_records),
                FaceMatch::Unmatched => {
                    let tag_id = fresh_ids.next().ok_or(TaggingError::PoolUndersized {
                        required,
                        available: 0,
                    })?;
                    (tag_id, &mut result.new_records)
                }
            };
            batch.push(StoredFacePosition {
                image_id: image.image_id,
                tag_id,
                face_box: face.face_box,
                image_width: image.width,
                image_height: image.height,
            });
            result.training_crops.push(TrainingCrop {
                image_id: image.image_id,
                tag_id,
                pixels: face.pixels,
            });
        }

        Ok(result)
    }
}
