use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// One face found in the image being processed.
///
/// `face_box` is in the pixel space of that image; `pixels` is the crop
/// under the box. Lives for a single processing pass.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedFace {
    pub face_box: FaceBox,
    pub pixels: Frame,
}

impl DetectedFace {
    /// Builds a detection by cropping `face_box` out of `image`.
    pub fn from_image(image: &Frame, face_box: FaceBox) -> Self {
        Self {
            face_box,
            pixels: image.crop(&face_box),
        }
    }
}
