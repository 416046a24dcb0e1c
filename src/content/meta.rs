//! Front-matter extraction and validation.
//!
//! Supported header styles:
//!
//! | Style            | Example                         | Formats        |
//! |------------------|---------------------------------|----------------|
//! | YAML-like fence  | `---\ntitle: Hi\n---`           | any            |
//! | TOML fence       | `+++\ntitle = "Hi"\n+++`        | any            |
//! | Header block     | `Title: Hi\nDate: 2024-01-01\n` | Markdown       |
//! | Field list       | `:title: Hi`                    | reStructuredText |
//! | `<meta>` tags    | `<meta name="date" content=..>` | HTML           |
//!
//! Extraction never fails. Problems become [`NodeDiagnostic`]s naming the
//! offending field, and the node is kept but flagged invalid.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::utils::date::DateTimeUtc;

/// Pseudo-field used for problems with the header block itself.
pub const FRONT_MATTER: &str = "front-matter";

/// Metadata recognised in a page or article header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// RFC 3339, normalized from whatever the source used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    pub tags: Vec<String>,
    pub draft: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// A validation problem attached to a content node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDiagnostic {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl NodeDiagnostic {
    pub fn new(field: impl Into<String>, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            line,
        }
    }
}

/// How a content file's header is written, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Markdown,
    Rst,
    Html,
    Other,
}

impl SourceFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" | "mkd" | "mdown" => Self::Markdown,
            "rst" => Self::Rst,
            "html" | "htm" => Self::Html,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Default)]
pub struct Extracted {
    pub meta: PageMeta,
    pub diagnostics: Vec<NodeDiagnostic>,
}

/// Raw field value before validation.
enum Raw {
    Text(String),
    Toml(toml::Value),
}

struct Field {
    key: String,
    value: Raw,
    line: Option<usize>,
}

/// Extract and validate the metadata header of `text`.
pub fn extract(text: &str, format: SourceFormat) -> Extracted {
    let mut out = Extracted::default();
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let fields = match first_line(text) {
        Some("---") => parse_fenced_yaml(text, &mut out.diagnostics),
        Some("+++") => parse_fenced_toml(text, &mut out.diagnostics),
        _ => match format {
            SourceFormat::Markdown => parse_header_block(text),
            SourceFormat::Rst => parse_rst(text),
            SourceFormat::Html => parse_html(text),
            SourceFormat::Other => Vec::new(),
        },
    };

    for field in fields {
        apply_field(field, &mut out);
    }
    out
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().find(|l| !l.trim().is_empty()).map(str::trim)
}

// ============================================================================
// Parsers
// ============================================================================

/// Locate the closing fence. Returns (first body line index, closing line index).
fn fence_bounds(lines: &[&str], fence: &str, alt: Option<&str>) -> Option<(usize, usize)> {
    let open = lines.iter().position(|l| !l.trim().is_empty())?;
    let close = lines[open + 1..]
        .iter()
        .position(|l| {
            let l = l.trim_end();
            l == fence || Some(l) == alt
        })
        .map(|i| i + open + 1)?;
    Some((open + 1, close))
}

fn parse_fenced_yaml(text: &str, diags: &mut Vec<NodeDiagnostic>) -> Vec<Field> {
    let lines: Vec<&str> = text.lines().collect();
    let Some((start, end)) = fence_bounds(&lines, "---", Some("...")) else {
        diags.push(NodeDiagnostic::new(
            FRONT_MATTER,
            "unterminated `---` fence",
            Some(1),
        ));
        return Vec::new();
    };

    let mut fields: Vec<Field> = Vec::new();
    for (idx, raw) in lines[start..end].iter().enumerate() {
        let line_no = start + idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        // `- item` continues a list under a key with an empty value
        if let Some(item) = trimmed.strip_prefix("- ")
            && let Some(last) = fields.last_mut()
            && let Raw::Text(ref mut acc) = last.value
        {
            if !acc.is_empty() {
                acc.push(',');
            }
            acc.push_str(unquote(item.trim()));
            continue;
        }

        match trimmed.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => fields.push(Field {
                key: key.trim().to_string(),
                value: Raw::Text(unquote(value.trim()).to_string()),
                line: Some(line_no),
            }),
            _ => diags.push(NodeDiagnostic::new(
                FRONT_MATTER,
                format!("expected `key: value`, got `{trimmed}`"),
                Some(line_no),
            )),
        }
    }
    fields
}

fn parse_fenced_toml(text: &str, diags: &mut Vec<NodeDiagnostic>) -> Vec<Field> {
    let lines: Vec<&str> = text.lines().collect();
    let Some((start, end)) = fence_bounds(&lines, "+++", None) else {
        diags.push(NodeDiagnostic::new(
            FRONT_MATTER,
            "unterminated `+++` fence",
            Some(1),
        ));
        return Vec::new();
    };

    let body = lines[start..end].join("\n");
    match toml::from_str::<toml::Table>(&body) {
        Ok(table) => table
            .into_iter()
            .map(|(key, value)| Field {
                key,
                value: Raw::Toml(value),
                line: None,
            })
            .collect(),
        Err(e) => {
            let line = e
                .span()
                .map(|span| start + 1 + body[..span.start].matches('\n').count());
            diags.push(NodeDiagnostic::new(
                FRONT_MATTER,
                format!("invalid TOML: {}", e.message()),
                line,
            ));
            Vec::new()
        }
    }
}

/// Header lines at the top of a Markdown file, up to the first blank line.
/// Indented lines continue the previous value.
fn parse_header_block(text: &str) -> Vec<Field> {
    static KEY: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_-]*)[ \t]*:[ \t]*(.*)$").unwrap());

    let mut fields: Vec<Field> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            break;
        }
        if let Some(caps) = KEY.captures(line) {
            fields.push(Field {
                key: caps[1].to_string(),
                value: Raw::Text(caps[2].trim().to_string()),
                line: Some(idx + 1),
            });
        } else if (line.starts_with("    ") || line.starts_with('\t'))
            && let Some(last) = fields.last_mut()
            && let Raw::Text(ref mut acc) = last.value
        {
            acc.push(' ');
            acc.push_str(line.trim());
        } else {
            // Not a header block after all: plain Markdown body.
            if fields.is_empty() {
                return Vec::new();
            }
            break;
        }
    }
    fields
}

/// Optional section title followed by a `:key: value` field list.
fn parse_rst(text: &str) -> Vec<Field> {
    static FIELD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^:([A-Za-z][A-Za-z0-9_ -]*):[ \t]*(.*)$").unwrap());

    let lines: Vec<&str> = text.lines().collect();
    let mut fields = Vec::new();
    let mut i = 0;

    while i < lines.len() && lines[i].trim().is_empty() {
        i += 1;
    }

    // Overline + title + underline, or title + underline
    if i + 2 < lines.len() && is_adornment(lines[i]) && is_adornment(lines[i + 2]) {
        fields.push(title_field(lines[i + 1], i + 2));
        i += 3;
    } else if i + 1 < lines.len() && !is_adornment(lines[i]) && is_adornment(lines[i + 1]) {
        fields.push(title_field(lines[i], i + 1));
        i += 2;
    }

    while i < lines.len() && lines[i].trim().is_empty() {
        i += 1;
    }

    while i < lines.len() {
        let Some(caps) = FIELD.captures(lines[i]) else {
            break;
        };
        fields.push(Field {
            key: caps[1].trim().to_string(),
            value: Raw::Text(caps[2].trim().to_string()),
            line: Some(i + 1),
        });
        i += 1;
    }
    fields
}

fn title_field(line: &str, line_no: usize) -> Field {
    Field {
        key: "title".into(),
        value: Raw::Text(line.trim().to_string()),
        line: Some(line_no),
    }
}

/// A line made of one repeated punctuation character, e.g. `=====`.
fn is_adornment(line: &str) -> bool {
    let line = line.trim_end();
    let mut chars = line.chars();
    match chars.next() {
        Some(c) if c.is_ascii_punctuation() => line.len() >= 2 && chars.all(|x| x == c),
        _ => false,
    }
}

/// `<title>` plus `<meta name=".." content="..">` tags.
fn parse_html(text: &str) -> Vec<Field> {
    static TITLE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
    static META: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)<meta\s+name\s*=\s*["']([^"']+)["']\s+content\s*=\s*["']([^"']*)["']"#)
            .unwrap()
    });

    let line_of = |offset: usize| text[..offset].matches('\n').count() + 1;
    let mut fields = Vec::new();

    if let Some(caps) = TITLE.captures(text)
        && let Some(m) = caps.get(1)
    {
        fields.push(Field {
            key: "title".into(),
            value: Raw::Text(m.as_str().trim().to_string()),
            line: Some(line_of(m.start())),
        });
    }
    for caps in META.captures_iter(text) {
        let start = caps.get(0).map_or(0, |m| m.start());
        fields.push(Field {
            key: caps[1].to_string(),
            value: Raw::Text(caps[2].to_string()),
            line: Some(line_of(start)),
        });
    }
    fields
}

fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

// ============================================================================
// Validation
// ============================================================================

fn apply_field(field: Field, out: &mut Extracted) {
    let Field { key, value, line } = field;
    let lower = key.to_ascii_lowercase();
    let meta = &mut out.meta;

    let problem = match lower.as_str() {
        "title" => as_text(value)
            .map(|t| meta.title = Some(t))
            .ok_or_else(|| "title must be a string".to_string()),
        "date" | "modified" => parse_date(value).map(|d| {
            if lower == "date" {
                meta.date = Some(d);
            } else {
                meta.modified = Some(d);
            }
        }),
        "tags" => parse_tags(value).map(|tags| meta.tags = tags),
        "draft" => parse_bool(value).map(|b| meta.draft = b),
        "status" => as_text(value)
            .map(|s| {
                if s.eq_ignore_ascii_case("draft") {
                    meta.draft = true;
                }
                meta.status = Some(s);
            })
            .ok_or_else(|| "status must be a string".to_string()),
        _ => {
            let json = match value {
                Raw::Text(t) => parse_yaml_value(&t),
                Raw::Toml(v) => toml_to_json(v),
            };
            meta.extra.insert(key, json);
            Ok(())
        }
    };

    if let Err(message) = problem {
        out.diagnostics.push(NodeDiagnostic::new(lower, message, line));
    }
}

fn as_text(value: Raw) -> Option<String> {
    match value {
        Raw::Text(t) => Some(t),
        Raw::Toml(toml::Value::String(s)) => Some(s),
        Raw::Toml(_) => None,
    }
}

fn parse_date(value: Raw) -> Result<String, String> {
    let text = match value {
        Raw::Text(t) => t,
        Raw::Toml(toml::Value::String(s)) => s,
        Raw::Toml(toml::Value::Datetime(dt)) => dt.to_string(),
        Raw::Toml(other) => return Err(format!("expected a date, got {}", other.type_str())),
    };
    DateTimeUtc::parse(&text)
        .map(DateTimeUtc::to_rfc3339)
        .map_err(|e| format!("unparsable date: {e}"))
}

fn parse_tags(value: Raw) -> Result<Vec<String>, String> {
    match value {
        Raw::Text(t) => Ok(split_list(&t)),
        Raw::Toml(toml::Value::String(s)) => Ok(split_list(&s)),
        Raw::Toml(toml::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s),
                other => Err(format!("tags must be strings, got {}", other.type_str())),
            })
            .collect(),
        Raw::Toml(other) => Err(format!("expected a tag list, got {}", other.type_str())),
    }
}

fn split_list(s: &str) -> Vec<String> {
    let s = s.trim().trim_start_matches('[').trim_end_matches(']');
    s.split(',')
        .map(|t| unquote(t.trim()).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_bool(value: Raw) -> Result<bool, String> {
    match value {
        Raw::Toml(toml::Value::Boolean(b)) => Ok(b),
        Raw::Text(t) | Raw::Toml(toml::Value::String(t)) => {
            match t.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" | "" => Ok(false),
                _ => Err(format!("draft must be a boolean (true/false), got `{t}`")),
            }
        }
        Raw::Toml(other) => Err(format!("draft must be a boolean, got {}", other.type_str())),
    }
}

/// Loose scalar typing for untyped header values.
fn parse_yaml_value(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if s.eq_ignore_ascii_case("null") || s == "~" {
        return Value::Null;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = s.parse::<f64>()
        && let Some(num) = serde_json::Number::from_f64(n)
    {
        return Value::Number(num);
    }
    Value::String(s.to_string())
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(text: &str) -> Extracted {
        extract(text, SourceFormat::Markdown)
    }

    #[test]
    fn test_yaml_fence() {
        let out = md("---\ntitle: Hello\ndate: 2024-01-01\ntags: a, b\ndraft: yes\n---\n\n# Body");
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.meta.title.as_deref(), Some("Hello"));
        assert_eq!(out.meta.date.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(out.meta.tags, vec!["a", "b"]);
        assert!(out.meta.draft);
    }

    #[test]
    fn test_yaml_list_items() {
        let out = md("---\ntags:\n  - rust\n  - \"web\"\n---\nbody");
        assert_eq!(out.meta.tags, vec!["rust", "web"]);
    }

    #[test]
    fn test_unterminated_fence() {
        let out = md("---\ntitle: Hello\n\nno closing fence");
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].field, FRONT_MATTER);
        assert!(out.diagnostics[0].message.contains("unterminated"));
    }

    #[test]
    fn test_toml_fence() {
        let out = md("+++\ntitle = \"Hello\"\ndate = 2024-03-05T10:00:00Z\ntags = [\"a\", \"b\"]\nweight = 3\n+++\n\n# Body");
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.meta.title.as_deref(), Some("Hello"));
        assert_eq!(out.meta.date.as_deref(), Some("2024-03-05T10:00:00Z"));
        assert_eq!(out.meta.tags, vec!["a", "b"]);
        assert_eq!(out.meta.extra.get("weight"), Some(&Value::from(3)));
    }

    #[test]
    fn test_toml_syntax_error() {
        let out = md("+++\ntitle = \"Hello\ndraft = true\n+++\n");
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].field, FRONT_MATTER);
        assert!(out.diagnostics[0].message.starts_with("invalid TOML"));
    }

    #[test]
    fn test_header_block() {
        let out = md("Title: My super title\nDate: 2010-12-03 10:20\nTags: thats, awesome\nSummary: Short version\n    continued here\n\nThis is the content.");
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.meta.title.as_deref(), Some("My super title"));
        assert_eq!(out.meta.date.as_deref(), Some("2010-12-03T10:20:00Z"));
        assert_eq!(out.meta.tags, vec!["thats", "awesome"]);
        assert_eq!(
            out.meta.extra.get("Summary"),
            Some(&Value::from("Short version continued here"))
        );
    }

    #[test]
    fn test_plain_markdown_has_no_meta() {
        let out = md("# Heading\n\nJust text: with a colon.");
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.meta, PageMeta::default());
    }

    #[test]
    fn test_bad_date_names_field() {
        let out = md("Title: Post\nDate: June 5th\n\nbody");
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].field, "date");
        assert_eq!(out.diagnostics[0].line, Some(2));
        assert!(out.meta.date.is_none());
        assert_eq!(out.meta.title.as_deref(), Some("Post"));
    }

    #[test]
    fn test_bad_draft_names_field() {
        let out = md("---\ndraft: maybe\n---\n");
        assert_eq!(out.diagnostics[0].field, "draft");
    }

    #[test]
    fn test_status_draft() {
        let out = md("Title: x\nStatus: draft\n\n");
        assert!(out.meta.draft);
        assert_eq!(out.meta.status.as_deref(), Some("draft"));
    }

    #[test]
    fn test_rst_field_list() {
        let text = "My super title\n##############\n\n:date: 2010-10-03 10:20\n:tags: thats, awesome\n:category: yeah\n\nBody text.\n";
        let out = extract(text, SourceFormat::Rst);
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.meta.title.as_deref(), Some("My super title"));
        assert_eq!(out.meta.date.as_deref(), Some("2010-10-03T10:20:00Z"));
        assert_eq!(out.meta.extra.get("category"), Some(&Value::from("yeah")));
    }

    #[test]
    fn test_rst_overlined_title() {
        let out = extract("=====\nTitle\n=====\n:draft: true\n", SourceFormat::Rst);
        assert_eq!(out.meta.title.as_deref(), Some("Title"));
        assert!(out.meta.draft);
    }

    #[test]
    fn test_html_meta_tags() {
        let text = "<html><head>\n<title>My Page</title>\n<meta name=\"date\" content=\"2012-07-09 22:28\" />\n<meta name=\"tags\" content=\"a, b\" />\n</head></html>";
        let out = extract(text, SourceFormat::Html);
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.meta.title.as_deref(), Some("My Page"));
        assert_eq!(out.meta.date.as_deref(), Some("2012-07-09T22:28:00Z"));
        assert_eq!(out.meta.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_html_bad_date_has_line() {
        let text = "<head>\n<meta name=\"date\" content=\"soon\">\n</head>";
        let out = extract(text, SourceFormat::Html);
        assert_eq!(out.diagnostics[0].field, "date");
        assert_eq!(out.diagnostics[0].line, Some(2));
    }

    #[test]
    fn test_source_format() {
        assert_eq!(SourceFormat::from_extension("MD"), SourceFormat::Markdown);
        assert_eq!(SourceFormat::from_extension("rst"), SourceFormat::Rst);
        assert_eq!(SourceFormat::from_extension("htm"), SourceFormat::Html);
        assert_eq!(SourceFormat::from_extension("txt"), SourceFormat::Other);
    }
}
