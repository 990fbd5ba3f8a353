pub mod sqlite_archive;
pub mod training_file_writer;
