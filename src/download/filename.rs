//! Filename extraction and sanitization for download destinations.

use std::path::{Component, Path};

use url::Url;

/// Longest extension accepted from a URL or header, without the dot.
const MAX_EXTENSION_LEN: usize = 16;

/// Splits `name` into stem and lower-cased extension.
///
/// A leading dot does not start an extension (`.hidden` has none), and
/// overly long or non-alphanumeric suffixes are kept in the stem.
#[must_use]
pub fn split_name_ext(name: &str) -> (String, String) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let ext = &name[dot + 1..];
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                (name[..dot].to_string(), ext.to_ascii_lowercase())
            } else {
                (name.to_string(), String::new())
            }
        }
        _ => (name.to_string(), String::new()),
    }
}

/// Derives `(stem, extension)` from the last path segment of `url`.
///
/// Percent-encoding is decoded; both parts are empty when the URL has no
/// usable segment.
#[must_use]
pub fn name_ext_from_url(url: &str) -> (String, String) {
    let Ok(parsed) = Url::parse(url) else {
        return (String::new(), String::new());
    };
    let Some(last) = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
    else {
        return (String::new(), String::new());
    };
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    split_name_ext(&decoded)
}

/// Parses Content-Disposition header to extract filename.
///
/// Handles both:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    // Try filename*= first (RFC 5987 encoded)
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // Format: charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();

        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file\\name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file:name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file<name>.jpg"), "file_name_.jpg");
        assert_eq!(sanitize_filename("file|name.jpg"), "file_name.jpg");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename("."), "_");
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename(""), "_");
    }

    #[test]
    fn test_sanitize_filename_preserves_valid_chars() {
        assert_eq!(sanitize_filename("file (1).png"), "file (1).png");
        assert_eq!(sanitize_filename("日本語.png"), "日本語.png");
    }

    #[test]
    fn test_split_name_ext() {
        assert_eq!(split_name_ext("photo.JPG"), ("photo".into(), "jpg".into()));
        assert_eq!(split_name_ext("archive.tar.gz"), ("archive.tar".into(), "gz".into()));
        assert_eq!(split_name_ext("noext"), ("noext".into(), String::new()));
        assert_eq!(split_name_ext(".hidden"), (".hidden".into(), String::new()));
        assert_eq!(split_name_ext("trailing."), ("trailing.".into(), String::new()));
        assert_eq!(split_name_ext("weird.a-b"), ("weird.a-b".into(), String::new()));
    }

    #[test]
    fn test_name_ext_from_url_uses_last_segment() {
        assert_eq!(
            name_ext_from_url("https://example.com/a/b/image.png?size=large"),
            ("image".into(), "png".into())
        );
        assert_eq!(
            name_ext_from_url("https://example.com/files/my%20file.webm"),
            ("my file".into(), "webm".into())
        );
        assert_eq!(
            name_ext_from_url("https://example.com/download"),
            ("download".into(), String::new())
        );
    }

    #[test]
    fn test_name_ext_from_url_without_segment() {
        assert_eq!(name_ext_from_url("https://example.com/"), (String::new(), String::new()));
        assert_eq!(name_ext_from_url("not a url"), (String::new(), String::new()));
    }

    #[test]
    fn test_parse_content_disposition_quoted() {
        let header = r#"attachment; filename="example.png""#;
        assert_eq!(parse_content_disposition(header), Some("example.png".to_string()));
    }

    #[test]
    fn test_parse_content_disposition_unquoted() {
        let header = "attachment; filename=example.png";
        assert_eq!(parse_content_disposition(header), Some("example.png".to_string()));
    }

    #[test]
    fn test_parse_content_disposition_with_semicolon() {
        let header = "attachment; filename=example.png; size=1234";
        assert_eq!(parse_content_disposition(header), Some("example.png".to_string()));
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        let header = "attachment; filename*=UTF-8''na%C3%AFve%20file.png";
        assert_eq!(
            parse_content_disposition(header),
            Some("naïve file.png".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_missing() {
        assert_eq!(parse_content_disposition("attachment"), None);
    }
}
