use image::RgbaImage;
use std::path::PathBuf;

use crate::canvas::AnnotationBuffer;
use crate::io::{ExportError, ExportFormat, SourceImage, composite, encode, sanitize_name};

/// User-visible outcome of an export.
#[derive(Clone, Debug, PartialEq)]
pub enum ExportNotice {
    Copied,
    /// The clipboard refused; the image was opened for manual saving.
    CopiedViaFallback(PathBuf),
    Saved(PathBuf),
    Failed(String),
}

impl ExportNotice {
    pub fn message(&self) -> String {
        match self {
            ExportNotice::Copied => "Image copied to clipboard".to_string(),
            ExportNotice::CopiedViaFallback(path) => format!(
                "Clipboard not available. The image was opened from {}; save it from there.",
                path.display()
            ),
            ExportNotice::Saved(path) => format!("Saved {}", path.display()),
            ExportNotice::Failed(msg) => msg.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExportNotice::Failed(_))
    }
}

impl From<ExportError> for ExportNotice {
    fn from(e: ExportError) -> Self {
        ExportNotice::Failed(e.to_string())
    }
}

// ---------------------------------------------------------------------------
//  Sinks
// ---------------------------------------------------------------------------

/// Image slot of a clipboard.
pub trait ClipboardSink {
    /// Receives the flattened pixels and their PNG encoding.
    fn write_image(&mut self, rgba: &RgbaImage, png: &[u8]) -> Result<(), String>;
}

/// Always-available path for showing an export the clipboard refused.
pub trait FallbackViewer {
    fn show(&mut self, png: &[u8], name: &str) -> Result<PathBuf, String>;
}

/// OS clipboard via arboard.
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn write_image(&mut self, rgba: &RgbaImage, _png: &[u8]) -> Result<(), String> {
        // arboard wants ImageData { width, height, bytes: Cow<[u8]> } in RGBA order.
        let mut clip = arboard::Clipboard::new().map_err(|e| e.to_string())?;
        let data = arboard::ImageData {
            width: rgba.width() as usize,
            height: rgba.height() as usize,
            bytes: std::borrow::Cow::Borrowed(rgba.as_raw()),
        };
        clip.set_image(data).map_err(|e| e.to_string())
    }
}

/// Writes the PNG to the temp directory and opens it with the default viewer.
pub struct TempFileViewer;

impl FallbackViewer for TempFileViewer {
    fn show(&mut self, png: &[u8], name: &str) -> Result<PathBuf, String> {
        let path = std::env::temp_dir().join(format!(
            "{}-{}.png",
            sanitize_name(name),
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(&path, png).map_err(|e| format!("{}: {}", path.display(), e))?;
        open::that(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
        Ok(path)
    }
}

/// Flatten the current image and put it on the clipboard, falling back to
/// `fallback` when the clipboard refuses.
pub fn copy_composite(
    source: &SourceImage,
    buffer: &AnnotationBuffer,
    clipboard: &mut dyn ClipboardSink,
    fallback: &mut dyn FallbackViewer,
) -> ExportNotice {
    let flat = match composite(source, buffer) {
        Ok(img) => img,
        Err(e) => return e.into(),
    };
    let png = match encode(&flat, ExportFormat::Png) {
        Ok(bytes) => bytes,
        Err(e) => {
            log_err!("Clipboard export encode failed: {}", e);
            return e.into();
        }
    };

    match clipboard.write_image(&flat, &png) {
        Ok(()) => {
            log_info!("Copied {}x{} composite to clipboard", flat.width(), flat.height());
            ExportNotice::Copied
        }
        Err(e) => {
            log_warn!("Clipboard write failed ({}), opening fallback viewer", e);
            match fallback.show(&png, &source.name) {
                Ok(path) => ExportNotice::CopiedViaFallback(path),
                Err(fe) => {
                    log_err!("Fallback viewer failed: {}", fe);
                    ExportNotice::Failed(format!("{} ({})", ExportError::Clipboard(e), fe))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    struct RefusingClipboard;
    impl ClipboardSink for RefusingClipboard {
        fn write_image(&mut self, _: &RgbaImage, _: &[u8]) -> Result<(), String> {
            Err("permission denied".into())
        }
    }

    #[derive(Default)]
    struct RecordingClipboard {
        got: Option<(u32, u32, usize)>,
    }
    impl ClipboardSink for RecordingClipboard {
        fn write_image(&mut self, rgba: &RgbaImage, png: &[u8]) -> Result<(), String> {
            self.got = Some((rgba.width(), rgba.height(), png.len()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingViewer {
        shown: Vec<String>,
        fail: bool,
    }
    impl FallbackViewer for RecordingViewer {
        fn show(&mut self, png: &[u8], name: &str) -> Result<PathBuf, String> {
            if self.fail {
                return Err("no viewer".into());
            }
            assert_eq!(&png[1..4], b"PNG");
            self.shown.push(name.to_string());
            Ok(PathBuf::from(format!("/tmp/{}.png", name)))
        }
    }

    fn fixture() -> (SourceImage, AnnotationBuffer) {
        let source = SourceImage::new(RgbaImage::from_pixel(5, 4, Rgba([9, 9, 9, 255])), "Dock");
        let (buffer, _) = crate::canvas::resize(5, 4, 2.0).unwrap();
        (source, buffer)
    }

    #[test]
    fn copies_natural_size_png() {
        let (source, buffer) = fixture();
        let mut clip = RecordingClipboard::default();
        let mut viewer = RecordingViewer::default();
        let notice = copy_composite(&source, &buffer, &mut clip, &mut viewer);
        assert_eq!(notice, ExportNotice::Copied);
        let (w, h, len) = clip.got.unwrap();
        assert_eq!((w, h), (5, 4));
        assert!(len > 0);
        assert!(viewer.shown.is_empty());
    }

    #[test]
    fn refused_clipboard_opens_fallback() {
        let (source, buffer) = fixture();
        let mut viewer = RecordingViewer::default();
        let notice = copy_composite(&source, &buffer, &mut RefusingClipboard, &mut viewer);
        assert_eq!(notice, ExportNotice::CopiedViaFallback(PathBuf::from("/tmp/Dock.png")));
        assert_eq!(viewer.shown, vec!["Dock".to_string()]);
        assert!(!notice.is_error());
    }

    #[test]
    fn both_paths_failing_is_reported() {
        let (source, buffer) = fixture();
        let mut viewer = RecordingViewer { fail: true, ..Default::default() };
        let notice = copy_composite(&source, &buffer, &mut RefusingClipboard, &mut viewer);
        assert!(notice.is_error());
        assert!(notice.message().contains("permission denied"));
    }
}
