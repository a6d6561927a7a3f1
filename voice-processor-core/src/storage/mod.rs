pub mod dump_writer;
pub mod metadata;
