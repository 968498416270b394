//! Repositories over the SQLite schema.

pub mod download;
pub mod job;

pub use download::{DownloadRepository, SqlxDownloadRepository};
pub use job::{JobRepository, SqlxJobRepository};
