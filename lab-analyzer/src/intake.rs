use chrono::Utc;
use image::{ImageFormat, imageops::FilterType};
use serde::Serialize;
use std::io::Cursor;
use tracing::{info, warn};

use crate::{
    error::{LabError, LabResult},
    models::{MediaType, UploadMetadata, UploadedDocument},
};

/// A resized, PNG-encoded rendering of an upload.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewImage {
    #[serde(skip)]
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Accepts an upload when its declared type is on the allow-list.
///
/// The declared content type wins. When the client sent none (or the generic
/// `application/octet-stream`) the filename extension is used instead. The
/// bytes themselves are never inspected.
pub fn accept_upload(
    filename: &str,
    declared_type: Option<&str>,
    bytes: Vec<u8>,
) -> LabResult<UploadedDocument> {
    let declared = declared_type
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("application/octet-stream"));

    let media_type = match declared {
        Some(mime) => MediaType::from_mime(mime),
        None => mime_guess::from_path(filename)
            .first()
            .and_then(|guess| MediaType::from_mime(guess.essence_str())),
    };

    let unsupported = || LabError::UnsupportedUploadType {
        filename: filename.to_string(),
        declared: declared.unwrap_or("unknown").to_string(),
    };
    let media_type = media_type.ok_or_else(unsupported)?;
    if bytes.is_empty() {
        warn!(filename, "rejecting empty upload");
        return Err(unsupported());
    }

    info!(filename, mime = media_type.mime(), size = bytes.len(), "upload accepted");
    Ok(UploadedDocument {
        filename: filename.to_string(),
        media_type,
        bytes,
        uploaded_at: Utc::now(),
    })
}

pub fn metadata(doc: &UploadedDocument) -> UploadMetadata {
    let size_kb = (doc.size() as f64 / 1024.0 * 10.0).round() / 10.0;
    UploadMetadata {
        filename: doc.filename.clone(),
        media_type: doc.media_type,
        mime: doc.media_type.mime().to_string(),
        size_bytes: doc.size(),
        size_kb,
    }
}

/// Previews taller than this many widths are refused.
const MAX_PREVIEW_ASPECT: u32 = 20;

/// Height that keeps the aspect ratio of a `width` x `height` image scaled
/// to `target_width`.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = f64::from(target_width) * f64::from(height) / f64::from(width);
    (scaled.round() as u32).max(1)
}

/// Decodes the upload and resamples it to `max_width`, keeping the aspect
/// ratio. PDFs, corrupt images and images too tall for a preview are
/// `UnreadableImage`.
pub fn preview(doc: &UploadedDocument, max_width: u32) -> LabResult<PreviewImage> {
    let img = decode(doc)?;
    let height = scaled_height(img.width(), img.height(), max_width);
    let max_height = max_width.saturating_mul(MAX_PREVIEW_ASPECT);
    if height > max_height {
        warn!(
            filename = %doc.filename,
            width = img.width(),
            height = img.height(),
            "image too tall for a preview"
        );
        return Err(LabError::UnreadableImage(format!(
            "{} is {}x{} pixels; previews are limited to a 1:{MAX_PREVIEW_ASPECT} aspect ratio",
            doc.filename,
            img.width(),
            img.height()
        )));
    }
    let resized = img.resize_exact(max_width, height, FilterType::Lanczos3);

    let mut png = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| LabError::UnreadableImage(format!("failed to encode preview: {e}")))?;

    Ok(PreviewImage {
        png,
        width: max_width,
        height,
    })
}

pub(crate) fn decode(doc: &UploadedDocument) -> LabResult<image::DynamicImage> {
    let format = match doc.media_type {
        MediaType::Jpeg => ImageFormat::Jpeg,
        MediaType::Png => ImageFormat::Png,
        MediaType::Webp => ImageFormat::WebP,
        MediaType::Pdf => {
            return Err(LabError::UnreadableImage(format!(
                "{} is a PDF; no image preview available",
                doc.filename
            )));
        }
    };
    let img = image::load_from_memory_with_format(&doc.bytes, format)
        .map_err(|e| LabError::UnreadableImage(format!("{}: {e}", doc.filename)))?;
    if img.width() == 0 || img.height() == 0 {
        return Err(LabError::UnreadableImage(format!(
            "{} has no pixels",
            doc.filename
        )));
    }
    Ok(img)
}
