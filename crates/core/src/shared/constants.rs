pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// A detection matches a stored face when more than this percentage of its
/// area is covered by the (rescaled) stored box.
pub const MATCH_THRESHOLD_PERCENT: f64 = 75.0;

/// Anonymous identities are created in multiples of this many.
pub const ANONYMOUS_POOL_BATCH: usize = 5;

/// Creation rounds attempted before a pool shortfall fails the image.
pub const MAX_POOL_ATTEMPTS: usize = 3;

pub const ANONYMOUS_NAME_PREFIX: &str = "Unidentified Person #";
pub const ANONYMOUS_URL_PREFIX: &str = "unidentified_person_#";

/// Prefix of archive paths for uploaded images.
pub const UPLOAD_PATH_PREFIX: &str = "./upload/";

pub const DEFAULT_TRAINING_DIR: &str = "./plugins/MugShot/training";
pub const DEFAULT_UPLOADS_DIR: &str = "./upload/";
