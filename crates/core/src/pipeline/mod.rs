pub mod persistence_policy;
pub mod pipeline_logger;
pub mod tag_archive_use_case;
pub mod tag_faces_use_case;
