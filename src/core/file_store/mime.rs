// src/core/file_store/mime.rs

//! Extension -> (mimeType, binary) classification table.

/// Looks up the MIME type and binary flag for a file name's extension.
/// Extensions are matched case-insensitively; an unknown or missing
/// extension falls back to `text/javascript`, non-binary, matching the
/// source's default.
pub fn classify(name: &str) -> (&'static str, bool) {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "css" => ("text/css", false),
        "js" | "mjs" => ("application/javascript", false),
        "html" | "htm" => ("text/html", false),
        "json" => ("application/json", false),
        "md" => ("text/markdown", false),
        "xml" => ("text/xml", false),

        "png" => ("image/png", true),
        "jpg" | "jpeg" => ("image/jpeg", true),
        "gif" => ("image/gif", true),
        "bmp" => ("image/bmp", true),
        "ico" => ("image/x-icon", true),
        "webp" => ("image/webp", true),
        "wbmp" => ("image/vnd.wap.wbmp", true),
        "tif" | "tiff" => ("image/tiff", true),
        "svg" => ("image/svg+xml", false),

        "woff" => ("font/woff", true),
        "woff2" => ("font/woff2", true),
        "ttf" => ("font/ttf", true),
        "eot" => ("application/vnd.ms-fontobject", true),
        "otf" => ("font/otf", true),

        "mp3" => ("audio/mpeg", true),
        "wav" => ("audio/wav", true),
        "ogg" => ("audio/ogg", true),

        "mp4" => ("video/mp4", true),
        "webm" => ("video/webm", true),
        "avi" => ("video/x-msvideo", true),

        "txt" => ("text/plain", false),
        "csv" => ("text/csv", false),
        "manifest" => ("text/cache-manifest", false),

        "gz" | "gzip" => ("application/gzip", true),
        "zip" => ("application/zip", true),
        "pdf" => ("application/pdf", true),
        "doc" => ("application/msword", true),
        "docx" => (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            true,
        ),

        _ => ("text/javascript", false),
    }
}
