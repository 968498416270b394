//! HTTP surface: submission, retry, removal, listing, result files.

pub mod error;
pub mod routes;
pub mod server;

pub use server::AppState;
