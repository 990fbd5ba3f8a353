use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::tagging::domain::face_position::ImageId;
use crate::tagging::domain::identity::TagId;
use crate::tagging::domain::training_writer::TrainingImageWriter;

/// Writes crops as JPEG files under `<root>/<identity_key>/`, named
/// `<image_id>_<tag_id>.jpg` so a re-run overwrites its previous crop.
pub struct TrainingFileWriter {
    root: PathBuf,
}

impl TrainingFileWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, identity_key: &str, image_id: ImageId, tag_id: TagId) -> PathBuf {
        self.root
            .join(identity_key)
            .join(format!("{image_id}_{tag_id}.jpg"))
    }
}

impl TrainingImageWriter for TrainingFileWriter {
    fn write(
        &self,
        identity_key: &str,
        image_id: ImageId,
        tag_id: TagId,
        crop: &Frame,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        if identity_key.is_empty() || Path::new(identity_key).components().count() != 1 {
            return Err(format!("Invalid identity key {identity_key:?}").into());
        }
        if crop.width() == 0 || crop.height() == 0 {
            return Err("Cannot write an empty face crop".into());
        }

        let path = self.path_for(identity_key, image_id, tag_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let img = image::RgbImage::from_raw(crop.width(), crop.height(), crop.data().to_vec())
            .ok_or("Face crop is not RGB")?;
        img.save(&path)?;
        Ok(path)
    }
}
