use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::tagging::domain::archive::ArchiveError;
use crate::tagging::domain::tagging_error::TaggingError;

/// What to do when the archive fails mid-image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PersistencePolicy {
    /// Warn and carry on with what is known (a failed read counts as no
    /// rows, a failed write is dropped).
    #[default]
    LogAndContinue,
    /// Fail the current image.
    Abort,
}

impl PersistencePolicy {
    /// Applies the policy to an archive result: either propagates the error
    /// or warns through `logger` and substitutes `fallback`.
    pub fn recover<T>(
        self,
        result: Result<T, ArchiveError>,
        fallback: impl FnOnce() -> T,
        context: &str,
        logger: &mut dyn PipelineLogger,
    ) -> Result<T, TaggingError> {
        match (result, self) {
            (Ok(value), _) => Ok(value),
            (Err(e), PersistencePolicy::Abort) => Err(e.into()),
            (Err(e), PersistencePolicy::LogAndContinue) => {
                logger.warn(&format!("{context}: {e}"));
                Ok(fallback())
            }
        }
    }
}
