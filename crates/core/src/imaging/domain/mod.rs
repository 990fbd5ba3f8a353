pub mod image_reader;
