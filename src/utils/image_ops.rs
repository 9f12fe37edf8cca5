use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine};
use image::ImageFormat;
use std::io::Cursor;
use std::path::Path;

/// Decode a base64 image payload as returned by the generative service
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>> {
    // Tolerate payloads that were stored as data URLs
    let data = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    general_purpose::STANDARD
        .decode(data.trim())
        .context("Image payload is not valid base64")
}

/// Sniff the MIME type from the image header, defaulting to PNG
pub fn image_mime_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        _ => "image/png",
    }
}

/// Asynchronously write a base64 payload to `path` as PNG.
///
/// Non-PNG payloads are re-encoded on a blocking thread.
pub async fn save_payload_as_png_async(payload: &str, path: &Path) -> Result<()> {
    let bytes = decode_image_payload(payload)?;

    let png_bytes = if image::guess_format(&bytes).ok() == Some(ImageFormat::Png) {
        bytes
    } else {
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let img = image::load_from_memory(&bytes).context("Failed to decode image payload")?;
            let mut png_bytes = Vec::new();
            img.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
                .context("Failed to encode image as PNG")?;
            Ok(png_bytes)
        })
        .await
        .context("Failed to spawn blocking task for PNG encoding")??
    };

    tokio::fs::write(path, png_bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// File-name-safe version of an identifier ("page-1-panel-2", titles, ...)
pub fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem
    }
}
