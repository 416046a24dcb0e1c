//! Configuration section definitions.
//!
//! Each module corresponds to a section in `sitedesk.toml`:
//!
//! | Module      | TOML Section   | Purpose                                  |
//! |-------------|----------------|------------------------------------------|
//! | `site`      | `[site]`       | Display name                             |
//! | `content`   | `[content]`    | Content dir, page/article paths, formats |
//! | `generator` | `[generator]`  | External command, timeouts, output/cache |
//! | `watch`     | `[watch]`      | File watcher timing                      |
//! | `build`     | `[build]`      | Coalescing and job retention             |
//! | `serve`     | `[serve]`      | RPC and preview listeners                |

mod build;
mod content;
mod generator;
mod serve;
mod site;
mod watch;

pub use build::BuildConfig;
pub use content::ContentConfig;
pub use generator::GeneratorConfig;
pub use serve::ServeConfig;
pub use site::SiteSectionConfig;
pub use watch::WatchConfig;

use super::{ConfigDiagnostics, FieldPath};
use crate::utils::path::{RelPathError, clean_rel_path};

/// Report `value` unless it is a clean site-relative path.
///
/// Hidden segments are fine for tool-owned directories like `.sitedesk/`.
fn check_rel_path(
    field: FieldPath,
    value: &str,
    allow_hidden: bool,
    diag: &mut ConfigDiagnostics,
) {
    let result = match clean_rel_path(value) {
        Err(RelPathError::Hidden(_)) if allow_hidden => {
            let escapes = value.split(['/', '\\']).any(|part| part == "." || part == "..");
            if escapes {
                Err(RelPathError::Traversal)
            } else {
                Ok(())
            }
        }
        other => other.map(|_| ()),
    };

    if let Err(e) = result {
        diag.error_with_hint(
            field,
            format!("`{value}`: {e}"),
            "use a path relative to the site directory, e.g. \"content\"",
        );
    }
}
