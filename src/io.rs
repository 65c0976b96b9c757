use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, RgbaImage};
use rfd::FileDialog;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::canvas::AnnotationBuffer;

/// Extensions the viewer opens.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

// ============================================================================
// SOURCE IMAGES
// ============================================================================

/// A decoded gallery image and the name it is displayed under.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub pixels: RgbaImage,
    pub name: String,
}

impl SourceImage {
    pub fn new(pixels: RgbaImage, name: impl Into<String>) -> Self {
        Self {
            pixels,
            name: name.into(),
        }
    }

    /// Natural pixel dimensions.
    pub fn natural_size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Images without pixels cannot host annotations.
    pub fn is_ready(&self) -> bool {
        self.pixels.width() > 0 && self.pixels.height() > 0
    }
}

/// Decode an image file. The display name is the file stem.
pub fn load_source_image(path: &Path) -> Result<SourceImage, String> {
    let img = image::open(path)
        .map_err(|e| format!("{}: {}", path.display(), e))?
        .to_rgba8();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Map")
        .to_string();
    Ok(SourceImage::new(img, name))
}

/// Native multi-file picker for gallery images.
pub fn pick_images() -> Vec<PathBuf> {
    FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("All Files", &["*"])
        .pick_files()
        .unwrap_or_default()
}

// ============================================================================
// EXPORT
// ============================================================================

/// Encoded output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg { quality: u8 },
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg { .. } => "jpg",
        }
    }
}

/// Why an export attempt produced no output.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportError {
    /// No image is open, or it has no pixels yet.
    NoImage,
    /// The encoder failed or produced no data.
    Encode(String),
    /// The clipboard refused the image.
    Clipboard(String),
    /// Writing the output file failed.
    Write(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::NoImage => write!(f, "No image to export"),
            ExportError::Encode(e) => write!(f, "Could not encode image: {}", e),
            ExportError::Clipboard(e) => write!(f, "Clipboard unavailable: {}", e),
            ExportError::Write(e) => write!(f, "Could not write file: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

/// Flatten source and annotations at the source's natural size. The buffer
/// is resampled down from its density-scaled size and composited on top.
pub fn composite(source: &SourceImage, buffer: &AnnotationBuffer) -> Result<RgbaImage, ExportError> {
    if !source.is_ready() {
        return Err(ExportError::NoImage);
    }
    let (w, h) = source.natural_size();
    let mut out = source.pixels.clone();

    if buffer.is_blank() {
        return Ok(out);
    }
    if buffer.width() == w && buffer.height() == h {
        image::imageops::overlay(&mut out, buffer.pixels(), 0, 0);
    } else {
        let scaled = image::imageops::resize(
            buffer.pixels(),
            w,
            h,
            image::imageops::FilterType::Triangle,
        );
        image::imageops::overlay(&mut out, &scaled, 0, 0);
    }
    Ok(out)
}

/// Encode to bytes. JPEG drops alpha.
pub fn encode(image: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    match format {
        ExportFormat::Png => {
            let encoder = PngEncoder::new(&mut out);
            encoder
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ColorType::Rgba8,
                )
                .map_err(|e| ExportError::Encode(e.to_string()))?;
        }
        ExportFormat::Jpeg { quality } => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder
                .encode(
                    rgb_image.as_raw(),
                    rgb_image.width(),
                    rgb_image.height(),
                    image::ColorType::Rgb8,
                )
                .map_err(|e| ExportError::Encode(e.to_string()))?;
        }
    }
    if out.is_empty() {
        return Err(ExportError::Encode("encoder produced no data".to_string()));
    }
    Ok(out)
}

/// Replace characters that are not allowed in file names.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    if cleaned.trim().is_empty() {
        "Map".to_string()
    } else {
        cleaned
    }
}

/// `YYYY-MM-DD @HH:MM:SS - <name>.jpg`
pub fn export_filename(now: DateTime<Local>, display_name: &str) -> String {
    format!(
        "{} - {}.jpg",
        now.format("%Y-%m-%d @%H:%M:%S"),
        sanitize_name(display_name)
    )
}

/// Destination for saved exports.
pub trait DownloadSink {
    /// Store `bytes` under `file_name`; returns where they ended up.
    fn deliver(&mut self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, String>;
}

/// Writes exports into a directory, creating it if needed.
pub struct DirectoryDownloads {
    pub dir: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DownloadSink for DirectoryDownloads {
    fn deliver(&mut self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, String> {
        fs::create_dir_all(&self.dir).map_err(|e| format!("{}: {}", self.dir.display(), e))?;
        // Windows rejects ':' in the timestamp
        #[cfg(target_os = "windows")]
        let file_name = file_name.replace(':', "-");
        let path = self.dir.join(file_name);
        fs::write(&path, bytes).map_err(|e| format!("{}: {}", path.display(), e))?;
        Ok(path)
    }
}

/// Composite, encode as JPEG and hand the bytes to `sink` under a
/// timestamped name.
pub fn save_composite(
    source: &SourceImage,
    buffer: &AnnotationBuffer,
    quality: u8,
    now: DateTime<Local>,
    sink: &mut dyn DownloadSink,
) -> Result<PathBuf, ExportError> {
    let flat = composite(source, buffer)?;
    let bytes = encode(&flat, ExportFormat::Jpeg { quality })?;
    let path = sink
        .deliver(&export_filename(now, &source.name), &bytes)
        .map_err(ExportError::Write)?;
    log_info!("Saved export {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}
