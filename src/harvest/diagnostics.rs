//! Plain-text failure dumps.
//!
//! Every transport or schema failure overwrites a single artifact file, so
//! only the most recent failure is kept on disk.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::transport::{TransportRequest, TransportResponse};

/// Characters of context shown either side of a validation error
const EXCERPT_RADIUS: usize = 40;

/// Writes failure artifacts to a fixed path
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    path: PathBuf,
}

impl DiagnosticSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dump a transport failure; `response` is absent when nothing came back
    pub fn transport_failure(
        &self,
        message: &str,
        request: &TransportRequest,
        response: Option<&TransportResponse>,
    ) -> Option<PathBuf> {
        let mut out = header("TransportError", message);
        write_request(&mut out, request);

        out.push_str("\nResponse:\n");
        match response {
            Some(response) => {
                let _ = writeln!(out, "\tstatus: {}", response.status);
                let _ = writeln!(out, "\tcontent:\n\n{}", response.body);
            }
            None => out.push_str("\t(no response received)\n"),
        }

        self.write(&out)
    }

    /// Dump a response that failed shape validation
    pub fn schema_failure(
        &self,
        error: &serde_json::Error,
        request: &TransportRequest,
        body: &str,
    ) -> Option<PathBuf> {
        let position = format!("line {}, column {}", error.line(), error.column());
        let location = match field_context(error, body) {
            Some(field) => format!("{} ({})", field, position),
            None => position,
        };

        self.schema_dump(
            category(error),
            &location,
            &excerpt(body, error.line(), error.column()),
            &error.to_string(),
            request,
            body,
        )
    }

    /// Dump a response that decoded but failed a further shape check
    pub fn schema_rejection(
        &self,
        location: &str,
        message: &str,
        request: &TransportRequest,
        body: &str,
    ) -> Option<PathBuf> {
        self.schema_dump("data", location, "", message, request, body)
    }

    fn schema_dump(
        &self,
        category: &str,
        location: &str,
        input: &str,
        message: &str,
        request: &TransportRequest,
        body: &str,
    ) -> Option<PathBuf> {
        let mut out = header("SchemaError", "response does not match the expected shape");

        out.push_str("1 validation errors:\n\n");
        let _ = writeln!(out, "1: {}", category);
        let _ = writeln!(out, "\tlocation: {}", location);
        let _ = writeln!(out, "\tinput: {}", input);
        let _ = writeln!(out, "\tmessage: {}", message);

        write_request(&mut out, request);
        let _ = writeln!(out, "\nResponse:\n\tcontent:\n\n{}", body);

        self.write(&out)
    }

    fn write(&self, content: &str) -> Option<PathBuf> {
        match std::fs::write(&self.path, content) {
            Ok(()) => {
                tracing::debug!("Diagnostics written to {}", self.path.display());
                Some(self.path.clone())
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to write diagnostics to {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new("error.txt")
    }
}

fn header(kind: &str, message: &str) -> String {
    format!(
        "{}\n{}\n\n{}\n\n",
        kind,
        chrono::Utc::now().to_rfc3339(),
        message
    )
}

fn write_request(out: &mut String, request: &TransportRequest) {
    let headers = request
        .headers
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ");

    out.push_str("\nRequest:\n");
    let _ = writeln!(out, "\t{} {}", request.method, request.url);
    let _ = writeln!(out, "\theaders: {}", headers);
    let _ = writeln!(out, "\tcontent: {}", request.body);
}

fn category(error: &serde_json::Error) -> &'static str {
    use serde_json::error::Category;

    match error.classify() {
        Category::Io => "io",
        Category::Syntax => "syntax",
        Category::Data => "data",
        Category::Eof => "eof",
    }
}

/// Name of the field a decode error is about.
///
/// Missing and unknown fields are named in the error message; for anything
/// else the nearest key before the error position is used.
fn field_context(error: &serde_json::Error, body: &str) -> Option<String> {
    let message = error.to_string();
    if let Some(rest) = message
        .strip_prefix("missing field `")
        .or_else(|| message.strip_prefix("unknown field `"))
    {
        return rest.split('`').next().map(str::to_string);
    }

    let text = body.lines().nth(error.line().checked_sub(1)?)?;
    let before: String = text.chars().take(error.column()).collect();
    enclosing_key(&before)
}

/// The last `"key":` appearing in `text`
fn enclosing_key(text: &str) -> Option<String> {
    let colon = text.rfind(|c: char| c == ':')?;
    let head = text[..colon].trim_end().strip_suffix('"')?;
    let open = head.rfind('"')?;
    Some(head[open + 1..].to_string())
}

/// The text around `line`/`column` (both 1-based) of `body`
fn excerpt(body: &str, line: usize, column: usize) -> String {
    let Some(text) = body.lines().nth(line.saturating_sub(1)) else {
        return String::new();
    };

    let chars: Vec<char> = text.chars().collect();
    let center = column.saturating_sub(1).min(chars.len());
    let start = center.saturating_sub(EXCERPT_RADIUS);
    let end = (center + EXCERPT_RADIUS).min(chars.len());

    chars[start..end].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request() -> TransportRequest {
        TransportRequest::post_json("http://x/graphql", r#"{"query":"query { a }"}"#)
    }

    #[test]
    fn test_transport_failure_dump() {
        let dir = tempdir().unwrap();
        let sink = DiagnosticSink::new(dir.path().join("error.txt"));

        let response = TransportResponse::new(502, "upstream exploded");
        let path = sink
            .transport_failure("HTTP status 502", &request(), Some(&response))
            .unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("TransportError\n"));
        assert!(content.contains("\tPOST http://x/graphql"));
        assert!(content.contains("Content-Type: application/json"));
        assert!(content.contains("query { a }"));
        assert!(content.contains("status: 502"));
        assert!(content.contains("upstream exploded"));
    }

    #[test]
    fn test_schema_failure_dump_overwrites() {
        let dir = tempdir().unwrap();
        let sink = DiagnosticSink::new(dir.path().join("error.txt"));

        sink.transport_failure("first", &request(), None).unwrap();

        let body = r#"{"data": {"unexpectedField": 1}}"#;
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code, non_snake_case)]
        struct Data {
            studyCatalog: Vec<String>,
        }
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Envelope {
            data: Data,
        }
        let error = serde_json::from_str::<Envelope>(body).unwrap_err();

        let path = sink.schema_failure(&error, &request(), body).unwrap();
        let content = std::fs::read_to_string(path).unwrap();

        assert!(content.starts_with("SchemaError\n"));
        assert!(!content.contains("TransportError"));
        assert!(content.contains("1: data"));
        assert!(content.contains("\tlocation: studyCatalog (line 1"));
        assert!(content.contains("unexpectedField"));
    }

    #[test]
    fn test_unwritable_path_returns_none() {
        let dir = tempdir().unwrap();
        let sink = DiagnosticSink::new(dir.path().join("missing").join("error.txt"));
        assert!(sink.transport_failure("x", &request(), None).is_none());
    }

    #[test]
    fn test_schema_rejection_dump() {
        let dir = tempdir().unwrap();
        let sink = DiagnosticSink::new(dir.path().join("error.txt"));

        let body = r#"{"data": {"other": []}}"#;
        let path = sink
            .schema_rejection("data.fileMetadata", "missing field", &request(), body)
            .unwrap();
        let content = std::fs::read_to_string(path).unwrap();

        assert!(content.starts_with("SchemaError\n"));
        assert!(content.contains("\tlocation: data.fileMetadata"));
        assert!(content.contains("\tmessage: missing field"));
        assert!(content.contains(body));
    }

    #[test]
    fn test_field_context() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Study {
            pdc_study_id: String,
            files: Vec<String>,
        }

        let missing = r#"{"files": []}"#;
        let error = serde_json::from_str::<Study>(missing).unwrap_err();
        assert_eq!(field_context(&error, missing).as_deref(), Some("pdc_study_id"));

        let mistyped = r#"{"pdc_study_id": "PDC000109", "files": 3}"#;
        let error = serde_json::from_str::<Study>(mistyped).unwrap_err();
        assert_eq!(field_context(&error, mistyped).as_deref(), Some("files"));
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("abc\ndef", 2, 2), "def");
        assert_eq!(excerpt("abc", 5, 1), "");
        let long = "x".repeat(200);
        assert_eq!(excerpt(&long, 1, 100).len(), 2 * EXCERPT_RADIUS);
    }
}
