//! Magic-byte signatures for known file formats.
//!
//! The table is ordered: when a file header does not match the signature of
//! its current extension, [`detect_extension`] scans the table front to back
//! and the first matching entry wins. `bin` is a catch-all that never matches,
//! so `bin` files are always checked against every other signature.

/// Predicate over the first bytes of a file.
pub type SignatureCheck = fn(&[u8]) -> bool;

/// Known signatures, in scan order.
pub const SIGNATURES: &[(&str, SignatureCheck)] = &[
    ("jpg", is_jpg),
    ("png", is_png),
    ("gif", is_gif),
    ("bmp", is_bmp),
    ("webp", is_webp),
    ("avif", is_avif),
    ("heic", is_heic),
    ("svg", is_svg),
    ("ico", is_ico),
    ("cur", is_cur),
    ("psd", is_psd),
    ("mp4", is_mp4),
    ("m4v", is_m4v),
    ("mov", is_mov),
    ("webm", is_webm),
    ("ogg", is_ogg),
    ("wav", is_wav),
    ("mp3", is_mp3),
    ("zip", is_zip),
    ("rar", is_rar),
    ("7z", is_7z),
    ("pdf", is_pdf),
    ("swf", is_swf),
    ("html", is_html),
    ("htm", is_html),
    ("blend", is_blend),
    ("obj", is_obj),
    ("clip", is_clip),
    ("bin", |_| false),
];

/// Returns the signature check registered for `extension`, if any.
#[must_use]
pub fn signature_for(extension: &str) -> Option<SignatureCheck> {
    SIGNATURES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, check)| *check)
}

/// Returns true if `extension` has an entry in the signature table.
#[must_use]
pub fn is_known(extension: &str) -> bool {
    signature_for(extension).is_some()
}

/// Checks `header` against the signature of `extension`.
///
/// Unknown extensions are treated as matching; there is nothing to check
/// them against.
#[must_use]
pub fn matches(extension: &str, header: &[u8]) -> bool {
    signature_for(extension).is_none_or(|check| check(header))
}

/// Returns the first extension in table order whose signature matches.
#[must_use]
pub fn detect_extension(header: &[u8]) -> Option<&'static str> {
    SIGNATURES
        .iter()
        .find(|(_, check)| check(header))
        .map(|(ext, _)| *ext)
}

fn at(s: &[u8], start: usize, expected: &[u8]) -> bool {
    s.get(start..start + expected.len()) == Some(expected)
}

fn at_any(s: &[u8], start: usize, candidates: &[&[u8]]) -> bool {
    candidates.iter().any(|expected| at(s, start, expected))
}

fn is_jpg(s: &[u8]) -> bool {
    at(s, 0, b"\xFF\xD8\xFF")
}

fn is_png(s: &[u8]) -> bool {
    at(s, 0, b"\x89PNG\r\n\x1A\n")
}

fn is_gif(s: &[u8]) -> bool {
    at_any(s, 0, &[b"GIF87a", b"GIF89a"])
}

fn is_bmp(s: &[u8]) -> bool {
    at(s, 0, b"BM")
}

fn is_webp(s: &[u8]) -> bool {
    at(s, 0, b"RIFF") && at(s, 8, b"WEBP")
}

fn is_avif(s: &[u8]) -> bool {
    at(s, 4, b"ftypavi") && matches!(s.get(11), Some(b'f' | b's'))
}

fn is_heic(s: &[u8]) -> bool {
    at(s, 4, b"ftyphe") && at_any(s, 10, &[b"ic", b"im", b"is", b"ix", b"vc", b"vm", b"vs"])
}

fn is_svg(s: &[u8]) -> bool {
    at(s, 0, b"<?xml")
}

fn is_ico(s: &[u8]) -> bool {
    at(s, 0, b"\x00\x00\x01\x00")
}

fn is_cur(s: &[u8]) -> bool {
    at(s, 0, b"\x00\x00\x02\x00")
}

fn is_psd(s: &[u8]) -> bool {
    at(s, 0, b"8BPS")
}

fn is_mp4(s: &[u8]) -> bool {
    at(s, 4, b"ftyp") && at_any(s, 8, &[b"mp4", b"avc", b"iso"])
}

fn is_m4v(s: &[u8]) -> bool {
    at(s, 4, b"ftypM4V")
}

fn is_mov(s: &[u8]) -> bool {
    at(s, 4, b"ftypqt  ")
}

fn is_webm(s: &[u8]) -> bool {
    at(s, 0, b"\x1A\x45\xDF\xA3")
}

fn is_ogg(s: &[u8]) -> bool {
    at(s, 0, b"OggS")
}

fn is_wav(s: &[u8]) -> bool {
    at(s, 0, b"RIFF") && at(s, 8, b"WAVE")
}

fn is_mp3(s: &[u8]) -> bool {
    at(s, 0, b"ID3") || at_any(s, 0, &[b"\xFF\xFB", b"\xFF\xF3", b"\xFF\xF2"])
}

fn is_zip(s: &[u8]) -> bool {
    at_any(s, 0, &[b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"])
}

fn is_rar(s: &[u8]) -> bool {
    at(s, 0, b"Rar!\x1A\x07")
}

fn is_7z(s: &[u8]) -> bool {
    at(s, 0, b"\x37\x7A\xBC\xAF\x27\x1C")
}

fn is_pdf(s: &[u8]) -> bool {
    at(s, 0, b"%PDF-")
}

fn is_swf(s: &[u8]) -> bool {
    at_any(s, 0, &[b"CWS", b"FWS"])
}

/// Matches any non-empty prefix of `<!doctype html`, case-insensitively,
/// after leading whitespace within the first 14 bytes.
fn is_html(s: &[u8]) -> bool {
    let head = &s[..s.len().min(14)];
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    let head = &head[start..];
    !head.is_empty()
        && b"<!doctype html"
            .iter()
            .zip(head)
            .all(|(expected, actual)| *expected == actual.to_ascii_lowercase())
}

fn is_blend(s: &[u8]) -> bool {
    at(s, 0, b"BLENDER")
}

// Wavefront .obj has no signature; Blender's export comment is the best hint.
fn is_obj(s: &[u8]) -> bool {
    at(s, 0, b"# Blender v")
}

// Clip Studio Paint
fn is_clip(s: &[u8]) -> bool {
    at(s, 0, b"CSFCHUNK")
}
