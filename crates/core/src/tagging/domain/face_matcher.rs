use std::collections::HashSet;

use crate::shared::constants::MATCH_THRESHOLD_PERCENT;
use crate::shared::face_box::FaceBox;
use crate::tagging::domain::face_position::StoredFacePosition;
use crate::tagging::domain::identity::TagId;

/// Outcome of matching one detection against the stored faces of its image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceMatch {
    /// Same face as the stored record holding this identity.
    Matched(TagId),
    /// No stored record overlaps enough; needs a fresh anonymous identity.
    Unmatched,
}

impl FaceMatch {
    pub fn tag_id(&self) -> Option<TagId> {
        match self {
            FaceMatch::Matched(id) => Some(*id),
            FaceMatch::Unmatched => None,
        }
    }
}

/// Re-identifies detections against previously stored positions purely by
/// box overlap.
///
/// Stored records are scanned in (top, left) order and the first one whose
/// rescaled box covers more than `threshold_percent` of the detection wins,
/// even if a later record would overlap more. A record claimed by an
/// earlier detection is not offered to later ones.
#[derive(Clone, Debug)]
pub struct FaceMatcher {
    threshold_percent: f64,
}

impl FaceMatcher {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }

    /// Matches each detection box, in the order given, against `stored`.
    ///
    /// `image_width` is the width of the image the detections come from;
    /// stored boxes are scaled by `image_width / record.image_width`.
    pub fn match_faces(
        &self,
        detections: &[FaceBox],
        image_width: u32,
        stored: &[StoredFacePosition],
    ) -> Vec<FaceMatch> {
        let mut candidates: Vec<&StoredFacePosition> = stored.iter().collect();
        candidates.sort_by_key(|p| (p.face_box.top, p.face_box.left));

        let mut claimed: HashSet<TagId> = HashSet::new();
        detections
            .iter()
            .map(|detection| {
                let hit = candidates.iter().find(|record| {
                    !claimed.contains(&record.tag_id)
                        && self.overlaps(detection, record, image_width)
                });
                match hit {
                    Some(record) => {
                        claimed.insert(record.tag_id);
                        FaceMatch::Matched(record.tag_id)
                    }
                    None => FaceMatch::Unmatched,
                }
            })
            .collect()
    }

    fn overlaps(&self, detection: &FaceBox, record: &StoredFacePosition, image_width: u32) -> bool {
        record.scale_to(image_width).is_some_and(|scale| {
            detection.overlap_percentage(&record.face_box, scale) > self.threshold_percent
        })
    }
}

impl Default for FaceMatcher {
    fn default() -> Self {
        Self::new(MATCH_THRESHOLD_PERCENT)
    }
}
