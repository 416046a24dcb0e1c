//! MIME type detection for tree nodes and the preview server.

use std::path::Path;

/// Common MIME type constants.
pub mod types {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const CSS: &str = "text/css; charset=utf-8";
    pub const JAVASCRIPT: &str = "text/javascript; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const XML: &str = "application/xml";
    pub const MARKDOWN: &str = "text/markdown; charset=utf-8";
    pub const RST: &str = "text/x-rst; charset=utf-8";
    pub const ASCIIDOC: &str = "text/x-asciidoc; charset=utf-8";
    pub const YAML: &str = "text/yaml; charset=utf-8";
    pub const TOML: &str = "text/toml; charset=utf-8";
    pub const PYTHON: &str = "text/x-python; charset=utf-8";

    pub const RSS: &str = "application/rss+xml";
    pub const ATOM: &str = "application/atom+xml";
    pub const PDF: &str = "application/pdf";
    pub const OCTET_STREAM: &str = "application/octet-stream";

    pub const PNG: &str = "image/png";
    pub const JPEG: &str = "image/jpeg";
    pub const GIF: &str = "image/gif";
    pub const WEBP: &str = "image/webp";
    pub const SVG: &str = "image/svg+xml";
    pub const ICO: &str = "image/x-icon";

    pub const WOFF: &str = "font/woff";
    pub const WOFF2: &str = "font/woff2";
    pub const TTF: &str = "font/ttf";
}

/// Guess MIME type from file extension.
pub fn from_path(path: &Path) -> &'static str {
    from_extension(path.extension().and_then(|e| e.to_str()))
}

/// Guess MIME type from file extension string.
pub fn from_extension(ext: Option<&str>) -> &'static str {
    let ext = ext.map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => types::HTML,
        Some("css") => types::CSS,
        Some("js" | "mjs") => types::JAVASCRIPT,
        Some("json") => types::JSON,
        Some("xml") => types::XML,
        Some("yaml" | "yml") => types::YAML,
        Some("toml") => types::TOML,
        Some("py") => types::PYTHON,
        Some("md" | "markdown" | "mkd" | "mdown") => types::MARKDOWN,
        Some("rst") => types::RST,
        Some("asc" | "adoc" | "asciidoc") => types::ASCIIDOC,
        Some("txt") => types::PLAIN,

        Some("rss") => types::RSS,
        Some("atom") => types::ATOM,
        Some("pdf") => types::PDF,

        Some("svg") => types::SVG,
        Some("png") => types::PNG,
        Some("jpg" | "jpeg") => types::JPEG,
        Some("gif") => types::GIF,
        Some("webp") => types::WEBP,
        Some("ico") => types::ICO,

        Some("woff") => types::WOFF,
        Some("woff2") => types::WOFF2,
        Some("ttf") => types::TTF,

        _ => types::OCTET_STREAM,
    }
}

/// Check if the MIME type represents text content.
pub fn is_text(mime: &str) -> bool {
    mime.starts_with("text/") || mime == types::JSON || mime == types::XML || mime == types::SVG
}
