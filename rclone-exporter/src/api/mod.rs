//! HTTP surface: probe endpoint, exporter metrics and the informational pages.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, AppState};
