//! Common utilities for gateway clients and extractors

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Error, Result};

/// Strip everything but ASCII digits
#[must_use]
pub fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Repair URL-safe or whitespace-damaged base64 to the standard alphabet
///
/// Wuzapi emits media as URL-safe base64, sometimes with embedded line breaks
/// and missing padding: `-`/`_` become `+`/`/`, whitespace is stripped, and
/// the result is padded to a multiple of four.
#[must_use]
pub fn sanitize_base64(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while cleaned.len() % 4 != 0 {
        cleaned.push('=');
    }
    cleaned
}

/// Decode a (possibly damaged) base64 payload to bytes
pub fn decode_base64(raw: &str) -> Result<Vec<u8>> {
    let cleaned = sanitize_base64(strip_data_uri(raw));
    STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Media(format!("invalid base64 payload: {e}")))
}

/// Drop a `data:<mime>;base64,` prefix when present
#[must_use]
pub fn strip_data_uri(raw: &str) -> &str {
    if !raw.starts_with("data:") {
        return raw;
    }
    raw.split_once(',').map_or(raw, |(_, rest)| rest)
}

/// Infer a document extension from a URL tail or a file name
///
/// Query strings and fragments are ignored; the fallback when neither source
/// carries an extension is `pdf`, the dominant document type on the wire.
#[must_use]
pub fn infer_extension(url: Option<&str>, file_name: Option<&str>) -> String {
    fn from_tail(value: &str) -> Option<String> {
        let cleaned = value.split(['?', '#']).next().unwrap_or(value);
        let tail = cleaned.rsplit('/').next().unwrap_or(cleaned);
        let (_, ext) = tail.rsplit_once('.')?;
        (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(char::is_alphanumeric))
            .then(|| ext.to_ascii_lowercase())
    }

    url.and_then(from_tail)
        .or_else(|| file_name.and_then(from_tail))
        .unwrap_or_else(|| "pdf".to_string())
}

/// Truncate a response body for error messages and logs
#[must_use]
pub fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("+55 (11) 99999-8888"), "5511999998888");
        assert_eq!(digits_only("5511999998888@s.whatsapp.net"), "5511999998888");
    }

    #[test]
    fn test_sanitize_base64() {
        assert_eq!(sanitize_base64("YWJj-_\n  "), "YWJj+/==");
        assert_eq!(sanitize_base64("YWJj"), "YWJj");
    }

    #[test]
    fn test_decode_sanitized_base64() {
        // Standard-alphabet equivalent of the damaged input decodes cleanly.
        let bytes = decode_base64("aGVsbG8\n=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_strip_data_uri() {
        assert_eq!(strip_data_uri("data:image/png;base64,aGk="), "aGk=");
        assert_eq!(strip_data_uri("aGk="), "aGk=");
    }

    #[test]
    fn test_infer_extension() {
        assert_eq!(
            infer_extension(Some("https://cdn.example/doc/report.PDF?sig=abc"), None),
            "pdf"
        );
        assert_eq!(infer_extension(None, Some("notas.xlsx")), "xlsx");
        assert_eq!(infer_extension(Some("https://cdn.example/blob"), None), "pdf");
        assert_eq!(
            infer_extension(Some("https://cdn.example/blob"), Some("planilha.csv")),
            "csv"
        );
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(400);
        assert!(truncate_body(&long).len() < 400);
        assert_eq!(truncate_body("short"), "short");
    }
}
