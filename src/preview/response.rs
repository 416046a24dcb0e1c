//! HTTP responses for the preview server.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::utils::mime::types::{HTML, PLAIN};

/// Respond with a file from the output directory.
pub fn respond_file(request: Request, path: &Path) -> Result<()> {
    let content_type = crate::utils::mime::from_path(path);

    if is_head_request(&request) {
        return send_head(request, 200, content_type);
    }
    if let Some(range) = range_header(&request) {
        return respond_range(request, path, content_type, &range);
    }

    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    send_body(request, 200, content_type, body)
}

/// 206 Partial Content, streamed from disk.
fn respond_range(request: Request, path: &Path, content_type: &'static str, range: &str) -> Result<()> {
    let size = fs::metadata(path)?.len();
    let Some((start, end)) = parse_range(range, size) else {
        let response = with_header(
            Response::empty(StatusCode(416)),
            "Content-Range",
            &format!("bytes */{size}"),
        );
        request.respond(response)?;
        return Ok(());
    };

    let length = end - start + 1;
    let mut file = fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;

    let response = Response::new(
        StatusCode(206),
        [
            ("Content-Type", content_type),
            ("Content-Range", format!("bytes {start}-{end}/{size}").as_str()),
            ("Accept-Ranges", "bytes"),
        ]
        .into_iter()
        .filter_map(|(field, value)| header(field, value))
        .collect(),
        file.take(length),
        usize::try_from(length).ok(),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Parse `bytes=start-end` against a file of `size` bytes.
fn parse_range(range: &str, size: u64) -> Option<(u64, u64)> {
    let spec = range.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let last = size.checked_sub(1)?;

    let (start, end) = match (start.trim(), end.trim()) {
        ("", "") => return None,
        // "-500": the final 500 bytes
        ("", suffix) => (size.saturating_sub(suffix.parse().ok()?), last),
        (start, "") => (start.parse().ok()?, last),
        (start, end) => (start.parse().ok()?, end.parse::<u64>().ok()?.min(last)),
    };
    (start <= end).then_some((start, end))
}

fn range_header(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Range"))
        .map(|h| h.value.to_string())
}

/// 404, using the site's own `404.html` when the generator produced one.
pub fn respond_not_found(request: Request, output: &Path) -> Result<()> {
    let custom = output.join("404.html");

    if is_head_request(&request) {
        let mime = if custom.is_file() { HTML } else { PLAIN };
        return send_head(request, 404, mime);
    }
    if let Ok(body) = fs::read(&custom) {
        return send_body(request, 404, HTML, body);
    }
    send_body(request, 404, PLAIN, b"404 Not Found".to_vec())
}

pub fn respond_method_not_allowed(request: Request) -> Result<()> {
    let response = Response::from_data(b"405 Method Not Allowed".to_vec()).with_status_code(StatusCode(405));
    let response = with_header(with_header(response, "Content-Type", PLAIN), "Allow", "GET, HEAD");
    request.respond(response)?;
    Ok(())
}

pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(request, 503, PLAIN, b"503 Service Unavailable".to_vec())
}

pub fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send_head(request: Request, status: u16, content_type: &'static str) -> Result<()> {
    let response = with_header(Response::empty(StatusCode(status)), "Content-Type", content_type);
    request.respond(response)?;
    Ok(())
}

fn send_body(request: Request, status: u16, content_type: &'static str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body).with_status_code(StatusCode(status));
    let response = with_header(response, "Content-Type", content_type);
    let response = with_header(response, "Cache-Control", "no-cache");
    request.respond(response)?;
    Ok(())
}

fn header(field: &str, value: &str) -> Option<Header> {
    Header::from_bytes(field.as_bytes(), value.as_bytes()).ok()
}

fn with_header<R: Read>(response: Response<R>, field: &str, value: &str) -> Response<R> {
    match header(field, value) {
        Some(header) => response.with_header(header),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("bytes=0-499", 1000), Some((0, 499)));
        assert_eq!(parse_range("bytes=500-", 1000), Some((500, 999)));
        assert_eq!(parse_range("bytes=-100", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=900-5000", 1000), Some((900, 999)));
    }

    #[test]
    fn test_parse_range_unsatisfiable() {
        assert_eq!(parse_range("bytes=600-100", 1000), None);
        assert_eq!(parse_range("bytes=-", 1000), None);
        assert_eq!(parse_range("items=0-1", 1000), None);
        assert_eq!(parse_range("bytes=0-0", 0), None);
        assert_eq!(parse_range("bytes=1000-", 1000), None);
    }
}
