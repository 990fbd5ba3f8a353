use crate::detection::domain::detected_face::DetectedFace;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// The returned faces carry no ordering guarantee. Implementations may
/// hold inference sessions that need mutable access, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, image: &Frame) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>>;
}
