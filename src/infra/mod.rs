// Adapters for application ports

pub mod fs_sink;

pub use fs_sink::FsExportSink;
