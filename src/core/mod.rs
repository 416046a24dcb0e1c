//! Core types shared across the codebase.

mod error;
mod state;

pub use error::SiteError;
pub use state::{is_shutdown, register_preview, request_shutdown, setup_shutdown_handler};
