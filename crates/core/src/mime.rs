//! Content-type lookup for upload payloads.

/// Fallback when an extension is unknown.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Guess the MIME type sent with the presign request and the PUT.
pub fn content_type_for_extension(ext: &str) -> String {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        // Camera formats that mime databases disagree on.
        "heic" => "image/heic".to_string(),
        "heif" => "image/heif".to_string(),
        "dng" => "image/x-adobe-dng".to_string(),
        _ => mime_guess::from_ext(&ext)
            .first_raw()
            .unwrap_or(OCTET_STREAM)
            .to_string(),
    }
}
