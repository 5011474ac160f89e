// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-type and file-extension inference for media blobs.

/// Guess a content type from leading magic bytes.
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"OggS", "audio/ogg"),
        (b"%PDF", "application/pdf"),
    ];
    if let Some(&(_, ct)) = SIGNATURES.iter().find(|(sig, _)| bytes.starts_with(sig)) {
        return Some(ct);
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        return Some("video/mp4");
    }
    None
}

/// File extension (without dot) for a content type.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let ext = match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/mpeg" => "mp3",
        "application/pdf" => "pdf",
        _ => return None,
    };
    Some(ext)
}

/// Extension from the declared content type, falling back to magic bytes.
pub fn infer_extension(content_type: Option<&str>, bytes: &[u8]) -> &'static str {
    content_type
        .and_then(extension_for_content_type)
        .or_else(|| sniff_content_type(bytes).and_then(extension_for_content_type))
        .unwrap_or("bin")
}

/// Content type from a declared value when it is specific, else magic bytes.
pub fn infer_content_type(declared: Option<&str>, bytes: &[u8]) -> String {
    match declared {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
        _ => sniff_content_type(bytes)
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}

/// True for `image/*` content types.
pub fn is_image(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("image/")
}

/// Route under which stored media is served.
pub const PUBLIC_MEDIA_PREFIX: &str = "/api/v1/photos/";

/// Absolute link for an object-store key. Values that already are absolute
/// URLs pass through unchanged.
pub fn public_url(public_base_url: &str, key: &str) -> String {
    if key.starts_with("http://") || key.starts_with("https://") || key.starts_with("data:") {
        return key.to_string();
    }
    format!(
        "{}{PUBLIC_MEDIA_PREFIX}{}",
        public_base_url.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}
