use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use crate::detection::domain::face_detector::FaceDetector;
use crate::imaging::domain::image_reader::ImageReader;
use crate::pipeline::persistence_policy::PersistencePolicy;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::face_box::FaceBox;
use crate::tagging::domain::archive::FaceArchive;
use crate::tagging::domain::face_matcher::{FaceMatch, FaceMatcher};
use crate::tagging::domain::face_position::ImageId;
use crate::tagging::domain::identity::TagId;
use crate::tagging::domain::record_reconciler::{ImageGeometry, RecordReconciler, TrainingCrop};
use crate::tagging::domain::tag_pool_manager::TagPoolManager;
use crate::tagging::domain::tagging_error::TaggingError;
use crate::tagging::domain::training_writer::TrainingImageWriter;

/// Faces written for one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceTally {
    pub image_id: ImageId,
    pub new_faces: usize,
    pub updated_faces: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageOutcome {
    Tagged(FaceTally),
    /// The archive has no record of the image; nothing was written.
    Skipped,
}

/// Single-image tagging pipeline:
/// lookup → read → detect → match → size pool → reconcile → persist → crops.
pub struct TagFacesUseCase {
    reader: Box<dyn ImageReader>,
    detector: Box<dyn FaceDetector>,
    training_writer: Box<dyn TrainingImageWriter>,
    matcher: FaceMatcher,
    pool_manager: TagPoolManager,
    reconciler: RecordReconciler,
    policy: PersistencePolicy,
}

impl TagFacesUseCase {
    pub fn new(
        reader: Box<dyn ImageReader>,
        detector: Box<dyn FaceDetector>,
        training_writer: Box<dyn TrainingImageWriter>,
        matcher: FaceMatcher,
        pool_manager: TagPoolManager,
        policy: PersistencePolicy,
    ) -> Self {
        Self {
            reader,
            detector,
            training_writer,
            matcher,
            pool_manager,
            reconciler: RecordReconciler::new(),
            policy,
        }
    }

    /// Tags the faces of the image recorded at `archive_path`, reading its
    /// pixels from `disk_path`.
    ///
    /// Training crops are written only after the positions are committed.
    /// A save that fails under `LogAndContinue` writes no crops and tallies
    /// no faces.
    pub fn execute(
        &mut self,
        archive: &mut dyn FaceArchive,
        logger: &mut dyn PipelineLogger,
        archive_path: &str,
        disk_path: &Path,
    ) -> Result<ImageOutcome, TaggingError> {
        let file_name = Path::new(archive_path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lookup = archive.image_id(archive_path, &file_name);
        let image_id = self.policy.recover(
            lookup,
            || None,
            &format!("Looking up {archive_path}"),
            logger,
        )?;
        let Some(image_id) = image_id else {
            logger.warn(&format!("{archive_path} is not in the archive, skipping"));
            return Ok(ImageOutcome::Skipped);
        };

        let image = self
            .reader
            .read(disk_path)
            .map_err(|source| TaggingError::ImageRead {
                path: disk_path.to_path_buf(),
                source,
            })?;

        let started = Instant::now();
        let faces = self.detector.detect(&image).map_err(TaggingError::Detection)?;
        logger.timing("detect", started.elapsed().as_secs_f64() * 1000.0);
        logger.metric("faces", faces.len() as f64);

        let stored = self.policy.recover(
            archive.face_positions(image_id),
            Vec::new,
            &format!("Reading stored faces of image {image_id}"),
            logger,
        )?;

        let boxes: Vec<FaceBox> = faces.iter().map(|f| f.face_box).collect();
        let matches = self.matcher.match_faces(&boxes, image.width(), &stored);
        let unmatched = matches.iter().filter(|m| **m == FaceMatch::Unmatched).count();
        let held: HashSet<TagId> = stored.iter().map(|p| p.tag_id).collect();
        let pool = self.pool_manager.pool_for_image(archive, unmatched, &held)?;

        let geometry = ImageGeometry {
            image_id,
            width: image.width(),
            height: image.height(),
        };
        let reconciliation = self
            .reconciler
            .reconcile(geometry, faces.into_iter().zip(matches).collect(), &pool)?;

        let saved = self.policy.recover(
            archive
                .save_face_positions(
                    &reconciliation.new_records,
                    &reconciliation.updated_records,
                )
                .map(|()| true),
            || false,
            &format!("Saving faces of image {image_id}"),
            logger,
        )?;
        if !saved {
            return Ok(ImageOutcome::Tagged(FaceTally {
                image_id,
                new_faces: 0,
                updated_faces: 0,
            }));
        }

        let tally = FaceTally {
            image_id,
            new_faces: reconciliation.new_records.len(),
            updated_faces: reconciliation.updated_records.len(),
        };
        logger.metric("new_faces", tally.new_faces as f64);
        logger.metric("updated_faces", tally.updated_faces as f64);

        for crop in &reconciliation.training_crops {
            self.write_training_crop(archive, logger, crop)?;
        }

        Ok(ImageOutcome::Tagged(tally))
    }

    fn write_training_crop(
        &self,
        archive: &dyn FaceArchive,
        logger: &mut dyn PipelineLogger,
        crop: &TrainingCrop,
    ) -> Result<(), TaggingError> {
        let url_name = self.policy.recover(
            archive.url_name(crop.tag_id),
            || None,
            &format!("Looking up tag {}", crop.tag_id),
            logger,
        )?;
        let Some(url_name) = url_name else {
            logger.warn(&format!(
                "Tag {} has no url name, training crop skipped",
                crop.tag_id
            ));
            return Ok(());
        };

        if let Err(e) =
            self.training_writer
                .write(&url_name, crop.image_id, crop.tag_id, &crop.pixels)
        {
            logger.warn(&format!(
                "Failed to write training crop for image {}, tag {}: {e}",
                crop.image_id, crop.tag_id
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detected_face::DetectedFace;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::shared::frame::Frame;
    use crate::tagging::domain::archive::{
        ArchiveError, FacePositionStore, IdentityStore, ImageCatalog,
    };
    use crate::tagging::domain::face_position::StoredFacePosition;
    use crate::tagging::domain::identity::{Identity, NewIdentity};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    struct StubImageReader {
        width: u32,
        height: u32,
        fail: bool,
    }

    impl ImageReader for StubImageReader {
        fn read(&self, _path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("corrupt jpeg".into());
            }
            let len = (self.width * self.height * 3) as usize;
            Ok(Frame::new(vec![0; len], self.width, self.height, 3))
        }
    }

    struct StubDetector {
        boxes: Vec<FaceBox>,
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, image: &Frame) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
            Ok(self
                .boxes
                .iter()
                .map(|b| DetectedFace::from_image(image, *b))
                .collect())
        }
    }

    struct StubTrainingWriter {
        written: Arc<Mutex<Vec<(String, ImageId, TagId)>>>,
        fail: bool,
    }

    impl TrainingImageWriter for StubTrainingWriter {
        fn write(
            &self,
            identity_key: &str,
            image_id: ImageId,
            tag_id: TagId,
            _crop: &Frame,
        ) -> Result<PathBuf, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("disk full".into());
            }
            self.written
                .lock()
                .unwrap()
                .push((identity_key.to_string(), image_id, tag_id));
            Ok(PathBuf::from(format!("{identity_key}/{image_id}_{tag_id}.jpg")))
        }
    }

    /// In-memory archive holding one image (id 1, `./upload/a.jpg`).
    #[derive(Default)]
    struct StubArchive {
        identities: Vec<Identity>,
        positions: Vec<StoredFacePosition>,
        saves: usize,
        fail_positions: bool,
        fail_save: bool,
    }

    impl StubArchive {
        fn with_anonymous(count: u32) -> Self {
            let mut archive = Self::default();
            let batch: Vec<NewIdentity> = (1..=count).map(NewIdentity::anonymous).collect();
            archive.create_identities(&batch).unwrap();
            archive
        }

        fn query_error(operation: &'static str) -> ArchiveError {
            ArchiveError::Query {
                operation,
                source: "connection lost".into(),
            }
        }
    }

    impl ImageCatalog for StubArchive {
        fn image_id(&self, path: &str, _file_name: &str) -> Result<Option<ImageId>, ArchiveError> {
            Ok((path == "./upload/a.jpg").then_some(1))
        }

        fn image_paths_by_id(&self, _start: ImageId, _end: ImageId) -> Result<Vec<String>, ArchiveError> {
            Ok(vec!["./upload/a.jpg".to_string()])
        }

        fn image_paths_by_date(&self, _start: &str, _end: &str) -> Result<Vec<String>, ArchiveError> {
            Ok(vec!["./upload/a.jpg".to_string()])
        }
    }

    impl IdentityStore for StubArchive {
        fn anonymous_identities(&self) -> Result<Vec<Identity>, ArchiveError> {
            Ok(self
                .identities
                .iter()
                .filter(|i| i.anonymous_index().is_some())
                .cloned()
                .collect())
        }

        fn create_identities(&mut self, identities: &[NewIdentity]) -> Result<(), ArchiveError> {
            for identity in identities {
                let id = 100 + self.identities.len() as TagId;
                self.identities.push(Identity {
                    id,
                    name: identity.name.clone(),
                    url_name: identity.url_name.clone(),
                });
            }
            Ok(())
        }

        fn url_name(&self, tag_id: TagId) -> Result<Option<String>, ArchiveError> {
            Ok(self
                .identities
                .iter()
                .find(|i| i.id == tag_id)
                .map(|i| i.url_name.clone()))
        }
    }

    impl FacePositionStore for StubArchive {
        fn face_positions(&self, image_id: ImageId) -> Result<Vec<StoredFacePosition>, ArchiveError> {
            if self.fail_positions {
                return Err(Self::query_error("face positions"));
            }
            Ok(self
                .positions
                .iter()
                .filter(|p| p.image_id == image_id)
                .copied()
                .collect())
        }

        fn save_face_positions(
            &mut self,
            new: &[StoredFacePosition],
            updated: &[StoredFacePosition],
        ) -> Result<(), ArchiveError> {
            if self.fail_save {
                return Err(Self::query_error("save face positions"));
            }
            self.saves += 1;
            self.positions.extend_from_slice(new);
            for record in updated {
                if let Some(slot) = self.positions.iter_mut().find(|p| p.key() == record.key()) {
                    *slot = *record;
                }
            }
            Ok(())
        }
    }

    struct CountingLogger {
        warnings: Vec<String>,
    }

    impl PipelineLogger for CountingLogger {
        fn progress(&mut self, _current: usize, _total: usize) {}
        fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
        fn metric(&mut self, _name: &str, _value: f64) {}
        fn info(&mut self, _message: &str) {}
        fn warn(&mut self, message: &str) {
            self.warnings.push(message.to_string());
        }
    }

    type Written = Arc<Mutex<Vec<(String, ImageId, TagId)>>>;

    fn use_case(boxes: Vec<FaceBox>, policy: PersistencePolicy) -> (TagFacesUseCase, Written) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let use_case = TagFacesUseCase::new(
            Box::new(StubImageReader {
                width: 200,
                height: 100,
                fail: false,
            }),
            Box::new(StubDetector { boxes }),
            Box::new(StubTrainingWriter {
                written: written.clone(),
                fail: false,
            }),
            FaceMatcher::default(),
            TagPoolManager::default(),
            policy,
        );
        (use_case, written)
    }

    fn stored(tag_id: TagId, face_box: FaceBox, image_width: u32) -> StoredFacePosition {
        StoredFacePosition {
            image_id: 1,
            tag_id,
            face_box,
            image_width,
            image_height: image_width / 2,
        }
    }

    fn run(
        use_case: &mut TagFacesUseCase,
        archive: &mut StubArchive,
    ) -> Result<ImageOutcome, TaggingError> {
        use_case.execute(
            archive,
            &mut NullPipelineLogger,
            "./upload/a.jpg",
            Path::new("/srv/upload/a.jpg"),
        )
    }

    // --- Tests ---

    #[test]
    fn test_first_run_assigns_anonymous_identities() {
        let (mut use_case, written) = use_case(
            vec![FaceBox::new(10, 10, 30, 30), FaceBox::new(100, 10, 30, 30)],
            PersistencePolicy::default(),
        );
        let mut archive = StubArchive::default();

        let outcome = run(&mut use_case, &mut archive).unwrap();

        assert_eq!(
            outcome,
            ImageOutcome::Tagged(FaceTally {
                image_id: 1,
                new_faces: 2,
                updated_faces: 0,
            })
        );
        assert_eq!(archive.identities.len(), 5);
        let tags: Vec<TagId> = archive.positions.iter().map(|p| p.tag_id).collect();
        assert_eq!(tags, vec![100, 101]);
        assert_eq!(
            *written.lock().unwrap(),
            vec![
                ("unidentified_person_#1".to_string(), 1, 100),
                ("unidentified_person_#2".to_string(), 1, 101),
            ]
        );
    }

    #[test]
    fn test_second_run_reuses_identities_at_new_scale() {
        let (mut first, _) = use_case(vec![FaceBox::new(10, 10, 30, 30)], PersistencePolicy::default());
        let mut archive = StubArchive::default();
        run(&mut first, &mut archive).unwrap();

        // Same face, image now stored at half the width it was detected at.
        archive.positions[0] = stored(100, FaceBox::new(5, 5, 15, 15), 100);
        let (mut second, _) = use_case(vec![FaceBox::new(10, 10, 30, 30)], PersistencePolicy::default());

        let outcome = run(&mut second, &mut archive).unwrap();

        assert_eq!(
            outcome,
            ImageOutcome::Tagged(FaceTally {
                image_id: 1,
                new_faces: 0,
                updated_faces: 1,
            })
        );
        assert_eq!(archive.positions, vec![stored(100, FaceBox::new(10, 10, 30, 30), 200)]);
    }

    #[test]
    fn test_unknown_image_is_skipped_without_writes() {
        let (mut use_case, written) = use_case(vec![FaceBox::new(0, 0, 10, 10)], PersistencePolicy::default());
        let mut archive = StubArchive::default();
        let mut logger = CountingLogger { warnings: vec![] };

        let outcome = use_case
            .execute(&mut archive, &mut logger, "./upload/b.jpg", Path::new("b.jpg"))
            .unwrap();

        assert_eq!(outcome, ImageOutcome::Skipped);
        assert_eq!(logger.warnings.len(), 1);
        assert_eq!(archive.saves, 0);
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_held_anonymous_tag_is_not_reassigned() {
        // Tag 100 already sits elsewhere in this image; the new face must not take it.
        let (mut use_case, _) = use_case(vec![FaceBox::new(150, 50, 20, 20)], PersistencePolicy::default());
        let mut archive = StubArchive::with_anonymous(1);
        archive.positions.push(stored(100, FaceBox::new(0, 0, 20, 20), 200));

        run(&mut use_case, &mut archive).unwrap();

        let tags: Vec<TagId> = archive.positions.iter().map(|p| p.tag_id).collect();
        assert_eq!(tags, vec![100, 101]);
    }

    #[test]
    fn test_read_failure_fails_image() {
        let mut use_case = TagFacesUseCase::new(
            Box::new(StubImageReader {
                width: 10,
                height: 10,
                fail: true,
            }),
            Box::new(StubDetector { boxes: vec![] }),
            Box::new(StubTrainingWriter {
                written: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            }),
            FaceMatcher::default(),
            TagPoolManager::default(),
            PersistencePolicy::default(),
        );
        let mut archive = StubArchive::default();

        let err = run(&mut use_case, &mut archive).unwrap_err();

        assert!(matches!(err, TaggingError::ImageRead { .. }));
        assert_eq!(archive.saves, 0);
    }

    #[test]
    fn test_failed_position_read_continues_as_empty() {
        let (mut use_case, _) = use_case(vec![FaceBox::new(10, 10, 30, 30)], PersistencePolicy::LogAndContinue);
        let mut archive = StubArchive {
            fail_positions: true,
            ..StubArchive::default()
        };

        let outcome = run(&mut use_case, &mut archive).unwrap();

        assert!(matches!(outcome, ImageOutcome::Tagged(FaceTally { new_faces: 1, .. })));
    }

    #[test]
    fn test_failed_position_read_aborts_under_strict_policy() {
        let (mut use_case, _) = use_case(vec![FaceBox::new(10, 10, 30, 30)], PersistencePolicy::Abort);
        let mut archive = StubArchive {
            fail_positions: true,
            ..StubArchive::default()
        };

        let err = run(&mut use_case, &mut archive).unwrap_err();

        assert!(matches!(err, TaggingError::Archive(_)));
        assert_eq!(archive.saves, 0);
    }

    #[test]
    fn test_failed_save_aborts_before_crops_under_strict_policy() {
        let (mut use_case, written) = use_case(vec![FaceBox::new(10, 10, 30, 30)], PersistencePolicy::Abort);
        let mut archive = StubArchive {
            fail_save: true,
            ..StubArchive::default()
        };

        assert!(run(&mut use_case, &mut archive).is_err());
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_save_writes_no_crops_when_continuing() {
        let (mut use_case, written) = use_case(vec![FaceBox::new(10, 10, 30, 30)], PersistencePolicy::LogAndContinue);
        let mut archive = StubArchive {
            fail_save: true,
            ..StubArchive::default()
        };
        let mut logger = CountingLogger { warnings: vec![] };

        let outcome = use_case
            .execute(&mut archive, &mut logger, "./upload/a.jpg", Path::new("a.jpg"))
            .unwrap();

        assert_eq!(
            outcome,
            ImageOutcome::Tagged(FaceTally {
                image_id: 1,
                new_faces: 0,
                updated_faces: 0,
            })
        );
        assert!(archive.positions.is_empty());
        assert!(written.lock().unwrap().is_empty());
        assert_eq!(logger.warnings.len(), 1);
        assert!(logger.warnings[0].starts_with("Saving faces of image 1"));
    }

    #[test]
    fn test_training_writer_failure_is_a_warning() {
        let mut use_case = TagFacesUseCase::new(
            Box::new(StubImageReader {
                width: 200,
                height: 100,
                fail: false,
            }),
            Box::new(StubDetector {
                boxes: vec![FaceBox::new(10, 10, 30, 30)],
            }),
            Box::new(StubTrainingWriter {
                written: Arc::new(Mutex::new(Vec::new())),
                fail: true,
            }),
            FaceMatcher::default(),
            TagPoolManager::default(),
            PersistencePolicy::default(),
        );
        let mut archive = StubArchive::default();
        let mut logger = CountingLogger { warnings: vec![] };

        let outcome = use_case
            .execute(&mut archive, &mut logger, "./upload/a.jpg", Path::new("a.jpg"))
            .unwrap();

        assert!(matches!(outcome, ImageOutcome::Tagged(_)));
        assert_eq!(archive.positions.len(), 1);
        assert_eq!(logger.warnings.len(), 1);
        assert!(logger.warnings[0].contains("disk full"));
    }

    #[test]
    fn test_no_faces_writes_nothing_but_succeeds() {
        let (mut use_case, written) = use_case(vec![], PersistencePolicy::default());
        let mut archive = StubArchive::default();

        let outcome = run(&mut use_case, &mut archive).unwrap();

        assert_eq!(
            outcome,
            ImageOutcome::Tagged(FaceTally {
                image_id: 1,
                new_faces: 0,
                updated_faces: 0,
            })
        );
        assert!(archive.identities.is_empty());
        assert!(written.lock().unwrap().is_empty());
    }
}
