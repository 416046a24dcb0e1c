//! Path utilities.
//!
//! - [`fs`]: filesystem path normalization and site-relative conversion
//! - [`rel`]: validation of client-supplied relative paths

pub mod fs;
pub mod rel;

pub use fs::{from_rel, normalize_path, resolve_path, to_rel};
pub use rel::{RelPathError, clean_rel_path};
