//! Content-Type to filename extension resolution.

/// MIME types whose extension is fixed regardless of the system tables.
const MIME_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/bmp", "bmp"),
    ("image/x-bmp", "bmp"),
    ("image/x-ms-bmp", "bmp"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/heic", "heic"),
    ("image/heif", "heif"),
    ("image/svg+xml", "svg"),
    ("image/ico", "ico"),
    ("image/icon", "ico"),
    ("image/x-icon", "ico"),
    ("image/vnd.microsoft.icon", "ico"),
    ("image/x-photoshop", "psd"),
    ("application/x-photoshop", "psd"),
    ("image/vnd.adobe.photoshop", "psd"),
    ("video/webm", "webm"),
    ("video/ogg", "ogg"),
    ("video/mp4", "mp4"),
    ("video/m4v", "m4v"),
    ("video/x-m4v", "m4v"),
    ("video/quicktime", "mov"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/webm", "webm"),
    ("audio/ogg", "ogg"),
    ("audio/mpeg", "mp3"),
    ("application/zip", "zip"),
    ("application/x-zip", "zip"),
    ("application/x-zip-compressed", "zip"),
    ("application/rar", "rar"),
    ("application/x-rar", "rar"),
    ("application/x-rar-compressed", "rar"),
    ("application/x-7z-compressed", "7z"),
    ("application/pdf", "pdf"),
    ("application/x-pdf", "pdf"),
    ("application/x-shockwave-flash", "swf"),
    ("text/html", "html"),
    ("application/ogg", "ogg"),
    ("model/obj", "obj"),
    ("application/octet-stream", "bin"),
];

/// Content type assumed when a response carries none.
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Extension used for types neither table knows.
pub const FALLBACK_EXTENSION: &str = "bin";

/// Resolves a filename extension (without leading dot) for a Content-Type value.
///
/// Parameters such as `; charset=utf-8` are ignored, and a bare subtype such
/// as `png` is read as `image/png`.
///
/// # Errors
///
/// Returns the normalized MIME type when neither the explicit table nor the
/// generic MIME database knows it. Callers report it and use
/// [`FALLBACK_EXTENSION`].
pub fn extension_for_content_type(content_type: Option<&str>) -> Result<&'static str, String> {
    let raw = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);
    let mut mtype = raw.split(';').next().unwrap_or("").trim().to_string();
    if !mtype.contains('/') {
        mtype = format!("image/{mtype}");
    }

    if let Some(ext) = lookup_table(&mtype) {
        return Ok(ext);
    }

    mime_guess::get_mime_extensions_str(&mtype)
        .and_then(|exts| exts.first().copied())
        .ok_or(mtype)
}

fn lookup_table(mtype: &str) -> Option<&'static str> {
    MIME_TYPES
        .iter()
        .find(|(name, _)| *name == mtype)
        .map(|(_, ext)| *ext)
}
