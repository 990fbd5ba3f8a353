use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::tag_faces_use_case::{ImageOutcome, TagFacesUseCase};
use crate::shared::constants::UPLOAD_PATH_PREFIX;
use crate::tagging::domain::archive::{ArchiveError, FaceArchive};
use crate::tagging::domain::face_position::ImageId;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("invalid file pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Which archive images a run covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSelection {
    /// Files or glob patterns relative to the uploads directory (an
    /// `./upload/` prefix is accepted and ignored).
    Files(Vec<String>),
    /// Image ids `start..=end`.
    ImageRange { start: ImageId, end: ImageId },
    /// Images made available between `start` and `end` inclusive.
    DateRange { start: String, end: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub tagged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.tagged + self.skipped + self.failed
    }
}

/// Batch pipeline: resolves a selection to archive images and tags each one
/// in turn. A failing image is counted and logged; the batch carries on.
pub struct TagArchiveUseCase {
    tag_faces: TagFacesUseCase,
    uploads_dir: PathBuf,
}

impl TagArchiveUseCase {
    pub fn new(tag_faces: TagFacesUseCase, uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            tag_faces,
            uploads_dir: uploads_dir.into(),
        }
    }

    /// Archive paths (`./upload/<relative>`) covered by `selection`.
    pub fn resolve(
        &self,
        archive: &dyn FaceArchive,
        selection: &ImageSelection,
    ) -> Result<Vec<String>, SelectionError> {
        match selection {
            ImageSelection::Files(files) => self.expand_files(files),
            ImageSelection::ImageRange { start, end } => {
                Ok(archive.image_paths_by_id(*start, *end)?)
            }
            ImageSelection::DateRange { start, end } => {
                Ok(archive.image_paths_by_date(start, end)?)
            }
        }
    }

    /// Expands each entry as a glob pattern under the uploads directory.
    /// An entry matching no file is kept as written so the run reports it.
    fn expand_files(&self, files: &[String]) -> Result<Vec<String>, SelectionError> {
        let root = glob::Pattern::escape(&self.uploads_dir.to_string_lossy());
        let root = root.trim_end_matches('/');

        let mut paths = Vec::new();
        for file in files {
            let relative = relative_path(file);
            let pattern = format!("{root}/{relative}");
            let matches: Vec<String> = glob::glob(&pattern)
                .map_err(|source| SelectionError::Pattern {
                    pattern: file.clone(),
                    source,
                })?
                .filter_map(Result::ok)
                .filter(|p| p.is_file())
                .filter_map(|p| relative_to(&p, &self.uploads_dir))
                .collect();

            if matches.is_empty() {
                paths.push(format!("{UPLOAD_PATH_PREFIX}{relative}"));
            } else {
                paths.extend(matches.iter().map(|m| format!("{UPLOAD_PATH_PREFIX}{m}")));
            }
        }
        Ok(paths)
    }

    /// Where the image recorded at `archive_path` lives on disk.
    pub fn disk_path(&self, archive_path: &str) -> PathBuf {
        self.uploads_dir.join(relative_path(archive_path))
    }

    /// Tags every selected image. Only a failure to list the selection is
    /// returned as an error.
    pub fn execute(
        &mut self,
        archive: &mut dyn FaceArchive,
        logger: &mut dyn PipelineLogger,
        selection: &ImageSelection,
    ) -> Result<BatchSummary, SelectionError> {
        let paths = self.resolve(archive, selection)?;
        logger.info(&format!("{} images selected", paths.len()));

        let mut summary = BatchSummary::default();
        for (index, archive_path) in paths.iter().enumerate() {
            logger.progress(index + 1, paths.len());
            let disk_path = self.disk_path(archive_path);

            match self
                .tag_faces
                .execute(archive, logger, archive_path, &disk_path)
            {
                Ok(ImageOutcome::Tagged(tally)) => {
                    summary.tagged += 1;
                    logger.info(&format!(
                        "{}: {} new, {} updated faces",
                        disk_path.display(),
                        tally.new_faces,
                        tally.updated_faces
                    ));
                }
                Ok(ImageOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    logger.warn(&format!("{}: {e}", disk_path.display()));
                }
            }
        }

        logger.info(&format!(
            "{} tagged, {} skipped, {} failed",
            summary.tagged, summary.skipped, summary.failed
        ));
        Ok(summary)
    }
}

fn relative_path(path: &str) -> &str {
    path.strip_prefix(UPLOAD_PATH_PREFIX)
        .or_else(|| path.strip_prefix("./"))
        .unwrap_or(path)
}

/// `path` below `root` as a `/`-separated string, ignoring `.` components.
fn relative_to(path: &Path, root: &Path) -> Option<String> {
    let normalize = |p: &Path| -> PathBuf {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    };
    let relative = normalize(path);
    let relative = relative.strip_prefix(normalize(root)).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
