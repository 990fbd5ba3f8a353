use std::path::PathBuf;
use std::process;

use clap::{ArgGroup, Parser};

use mugshot_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxYoloDetector, DEFAULT_CONFIDENCE,
};
use mugshot_core::imaging::infrastructure::image_file_reader::ImageFileReader;
use mugshot_core::pipeline::persistence_policy::PersistencePolicy;
use mugshot_core::pipeline::pipeline_logger::{PipelineLogger, StdoutPipelineLogger};
use mugshot_core::pipeline::tag_archive_use_case::{ImageSelection, TagArchiveUseCase};
use mugshot_core::pipeline::tag_faces_use_case::TagFacesUseCase;
use mugshot_core::shared::archive_config::ArchiveConfig;
use mugshot_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use mugshot_core::shared::model_resolver::{self, ModelSource};
use mugshot_core::tagging::domain::face_matcher::FaceMatcher;
use mugshot_core::tagging::domain::tag_pool_manager::TagPoolManager;
use mugshot_core::tagging::infrastructure::sqlite_archive::SqliteArchive;
use mugshot_core::tagging::infrastructure::training_file_writer::TrainingFileWriter;

/// Detect faces in archive images and keep their identity tags stable
/// across runs.
#[derive(Parser, Debug)]
#[command(name = "mugshot-detect")]
#[command(group(ArgGroup::new("selection").required(true).args(["files", "images", "dates"])))]
struct Cli {
    /// Archive config (JSON).
    #[arg(long, short, value_name = "CONFIG.JSON")]
    config: PathBuf,

    /// Training crop directory (overrides the config).
    #[arg(long, short)]
    training: Option<PathBuf>,

    /// Uploads directory (overrides the config).
    #[arg(long, short)]
    uploads: Option<PathBuf>,

    /// Image files or glob patterns, relative to the uploads directory.
    #[arg(long, short, num_args = 1..)]
    files: Option<Vec<String>>,

    /// Inclusive range of image ids.
    #[arg(long, short, num_args = 2, value_names = ["START_IMAGE", "END_IMAGE"])]
    images: Option<Vec<i64>>,

    /// Inclusive range of upload dates.
    #[arg(long, short, num_args = 2, value_names = ["START_DATE", "END_DATE"])]
    dates: Option<Vec<String>>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Fail an image on any archive error instead of continuing without it.
    #[arg(long)]
    strict: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let selection = selection(&cli)?;
    let config = ArchiveConfig::load(&cli.config)?;
    let confidence = cli
        .confidence
        .or(config.confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);
    if !(0.0..=1.0).contains(&confidence) {
        return Err(format!("Confidence must be between 0.0 and 1.0, got {confidence}").into());
    }

    let training_dir = cli
        .training
        .clone()
        .unwrap_or_else(|| config.training_dir_or_default());
    let uploads_dir = cli
        .uploads
        .clone()
        .unwrap_or_else(|| config.uploads_dir_or_default());
    let policy = if cli.strict {
        PersistencePolicy::Abort
    } else {
        PersistencePolicy::LogAndContinue
    };

    let mut archive = SqliteArchive::open(&config.database)?;
    let detector = build_detector(&config, confidence)?;

    let tag_faces = TagFacesUseCase::new(
        Box::new(ImageFileReader::new()),
        Box::new(detector),
        Box::new(TrainingFileWriter::new(training_dir)),
        FaceMatcher::default(),
        TagPoolManager::default(),
        policy,
    );
    let mut use_case = TagArchiveUseCase::new(tag_faces, uploads_dir);
    let mut logger = StdoutPipelineLogger::new();

    let summary = use_case.execute(&mut archive, &mut logger, &selection)?;
    logger.summary();
    if summary.failed > 0 {
        log::warn!("{} of {} images failed", summary.failed, summary.total());
    }
    Ok(())
}

fn build_detector(
    config: &ArchiveConfig,
    confidence: f64,
) -> Result<OnnxYoloDetector, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let source = ModelSource {
        name: YOLO_MODEL_NAME,
        url: YOLO_MODEL_URL,
    };
    let cache_dir = model_resolver::model_cache_dir()?;
    let model_path = model_resolver::resolve(
        &source,
        config.model_path.as_deref(),
        &cache_dir,
        Some(Box::new(download_progress)),
    )?;

    Ok(OnnxYoloDetector::new(&model_path, confidence)?)
}

fn selection(cli: &Cli) -> Result<ImageSelection, Box<dyn std::error::Error>> {
    if let Some(files) = &cli.files {
        return Ok(ImageSelection::Files(files.clone()));
    }
    if let Some(ids) = &cli.images {
        let (start, end) = pair(ids)?;
        log::info!("Processing images from {start} to {end}");
        return Ok(ImageSelection::ImageRange { start, end });
    }
    if let Some(dates) = &cli.dates {
        let (start, end) = pair(dates)?;
        log::info!("Processing dates from {start} to {end}");
        return Ok(ImageSelection::DateRange { start, end });
    }
    Err("One of --files, --images or --dates is required".into())
}

fn pair<T: Clone>(values: &[T]) -> Result<(T, T), Box<dyn std::error::Error>> {
    match values {
        [start, end] => Ok((start.clone(), end.clone())),
        _ => Err(format!("Expected START and END, got {} values", values.len()).into()),
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
