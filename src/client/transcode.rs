//! JPEG transcoding for encodings the vision API can't read.
//!
//! The API accepts JPEG, PNG, WebP and GIF. BMP and TIFF are decoded and
//! re-encoded as JPEG into a temporary file. The file is owned by the
//! returned [`Transcoded`] guard and removed when the guard drops, so its
//! lifetime is exactly that of the request holding it.
//!
//! AVIF and HEIC have no pure-Rust decoder in `image` (AVIF decoding needs
//! the system `dav1d` library). They are rejected with
//! [`HuginnError::UnsupportedFormat`] before any temp file or request.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::types::ResolvedImage;
use crate::{HuginnError, Result};

/// Encodings the API reads directly.
const SUPPORTED_MIMES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Whether the API reads `mime` without conversion.
pub fn supports_mime(mime: &str) -> bool {
    let mime = mime.trim().to_ascii_lowercase();
    let mime = if mime == "image/jpg" { "image/jpeg" } else { mime.as_str() };
    SUPPORTED_MIMES.contains(&mime)
}

/// Whether `mime` must be transcoded before sending.
pub fn needs_transcode(mime: &str) -> bool {
    !supports_mime(mime)
}

/// Whether a decoder for `mime` is compiled in.
pub fn can_transcode(mime: &str) -> bool {
    ImageFormat::from_mime_type(mime.trim().to_ascii_lowercase())
        .is_some_and(|format| format.reading_enabled())
}

/// Decoder to use for `bytes`: content first, then the declared type.
fn source_format(bytes: &[u8], mime: &str) -> Option<ImageFormat> {
    image::guess_format(bytes)
        .ok()
        .or_else(|| ImageFormat::from_mime_type(mime.trim().to_ascii_lowercase()))
}

/// A JPEG rendition backed by a temporary file.
///
/// Dropping the guard deletes the file.
pub struct Transcoded {
    file: NamedTempFile,
    bytes: Vec<u8>,
}

impl Transcoded {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Transcode `image` to JPEG off the async runtime.
///
/// `temp_dir` overrides the system temp directory.
pub async fn to_jpeg(image: &ResolvedImage, temp_dir: Option<&Path>) -> Result<Transcoded> {
    let bytes = image.bytes.clone();
    let source_mime = image.mime_type.clone();
    let temp_dir: Option<PathBuf> = temp_dir.map(Path::to_path_buf);

    tokio::task::spawn_blocking(move || to_jpeg_blocking(&bytes, &source_mime, temp_dir.as_deref()))
        .await
        .map_err(|e| HuginnError::Transcode(format!("transcode task failed: {e}")))?
}

fn to_jpeg_blocking(bytes: &[u8], source_mime: &str, temp_dir: Option<&Path>) -> Result<Transcoded> {
    let format = match source_format(bytes, source_mime) {
        Some(format) if format.reading_enabled() => format,
        _ => {
            return Err(HuginnError::UnsupportedFormat(format!(
                "no decoder available for {source_mime}"
            )));
        }
    };

    let file = match temp_dir {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(|e| HuginnError::Transcode(format!("failed to create temp file: {e}")))?;

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| HuginnError::Transcode(format!("failed to decode {source_mime}: {e}")))?;

    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());
    {
        let handle: &File = file.as_file();
        let mut writer = BufWriter::new(handle);
        rgb.write_to(&mut writer, ImageFormat::Jpeg)
            .map_err(|e| HuginnError::Transcode(format!("failed to encode JPEG: {e}")))?;
        writer
            .flush()
            .map_err(|e| HuginnError::Transcode(format!("failed to write temp file: {e}")))?;
    }

    let encoded = std::fs::read(file.path())
        .map_err(|e| HuginnError::Transcode(format!("failed to read transcoded file: {e}")))?;
    debug!(
        from = source_mime,
        path = %file.path().display(),
        len = encoded.len(),
        "transcoded image to JPEG"
    );

    Ok(Transcoded {
        file,
        bytes: encoded,
    })
}
