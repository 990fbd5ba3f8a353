pub mod archive;
pub mod face_matcher;
pub mod face_position;
pub mod identity;
pub mod record_reconciler;
pub mod tag_pool_manager;
pub mod tagging_error;
pub mod training_writer;
