use image::{Rgba, RgbaImage};

// ============================================================================
// COLOUR
// ============================================================================

/// An opaque drawing colour. Annotation strokes are always painted at full
/// opacity; transparency only ever comes from the eraser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Colour used when nothing else has been chosen.
pub const DEFAULT_STROKE_COLOR: Rgb = Rgb::new(0xf9, 0x41, 0x44);

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`, `rrggbb` or the short `#rgb` form.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?)),
            3 => {
                let mut out = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    out[i] = v * 16 + v;
                }
                Some(Self::new(out[0], out[1], out[2]))
            }
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_array(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// RGBA with full opacity, as stored in the annotation buffer.
    pub fn opaque(&self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, 255])
    }
}

// ============================================================================
// DISPLAY BOXES — what the host reports about its layout
// ============================================================================

/// A rectangle in client (CSS / logical) pixels.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct DisplayBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayBox {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    /// True when the box has no usable area (not laid out yet, collapsed…).
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width * 0.5, self.top + self.height * 0.5)
    }
}

/// The element hosting the displayed image. Queried synchronously on every
/// pointer event and on every overlay sync; answers are never cached.
pub trait DisplayContainer {
    /// Current rendered box of the source image.
    fn image_box(&self) -> DisplayBox;
    /// Current rendered box of the element the overlay is anchored to.
    fn container_box(&self) -> DisplayBox;
}

/// A layout that never changes. Used by the headless replay and by tests.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct FixedLayout {
    pub image: DisplayBox,
    pub container: DisplayBox,
}

impl FixedLayout {
    /// Image displayed at `width`×`height` with its top-left at the container origin.
    pub fn sized(width: f32, height: f32) -> Self {
        let b = DisplayBox::new(0.0, 0.0, width, height);
        Self { image: b, container: b }
    }
}

impl DisplayContainer for FixedLayout {
    fn image_box(&self) -> DisplayBox {
        self.image
    }

    fn container_box(&self) -> DisplayBox {
        self.container
    }
}

// ============================================================================
// COORDINATE MAPPER
// ============================================================================

/// A position in annotation-buffer pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct BufferPoint {
    pub x: f32,
    pub y: f32,
}

impl BufferPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: BufferPoint) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Raw pointer input in client coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum PointerSample {
    Mouse { x: f32, y: f32 },
    /// Touch points in delivery order; only the first one draws.
    Touch(Vec<(f32, f32)>),
}

impl PointerSample {
    pub fn mouse(x: f32, y: f32) -> Self {
        PointerSample::Mouse { x, y }
    }

    pub fn client_point(&self) -> Option<(f32, f32)> {
        match self {
            PointerSample::Mouse { x, y } => Some((*x, *y)),
            PointerSample::Touch(points) => points.first().copied(),
        }
    }
}

/// Map a client-space point into buffer pixels:
/// `x = (clientX - left) / width * bufferWidth`, likewise for y.
///
/// Returns `None` when the display box has no area.
pub fn map_to_buffer(
    client: (f32, f32),
    display: DisplayBox,
    buffer_w: u32,
    buffer_h: u32,
) -> Option<BufferPoint> {
    if display.is_empty() {
        return None;
    }
    let x = (client.0 - display.left) / display.width * buffer_w as f32;
    let y = (client.1 - display.top) / display.height * buffer_h as f32;
    Some(BufferPoint { x, y })
}

// ============================================================================
// ANNOTATION BUFFER
// ============================================================================

/// Device pixel ratios below 1 (or garbage) are treated as 1 so the buffer is
/// never coarser than the source image.
pub fn sanitize_density(density: f32) -> f32 {
    if density.is_finite() && density >= 1.0 {
        density
    } else {
        1.0
    }
}

/// Pixel dimensions of the buffer for a source of the given natural size.
pub fn scaled_dimensions(natural_w: u32, natural_h: u32, density: f32) -> (u32, u32) {
    let d = sanitize_density(density);
    (
        (natural_w as f32 * d).round() as u32,
        (natural_h as f32 * d).round() as u32,
    )
}

/// The authoritative annotation raster (straight-alpha RGBA8).
#[derive(Clone)]
pub struct AnnotationBuffer {
    pixels: RgbaImage,
    density: f32,
}

impl AnnotationBuffer {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    /// Set every pixel to transparent. Dimensions are untouched.
    pub fn clear(&mut self) {
        let raw: &mut [u8] = &mut self.pixels;
        raw.fill(0);
    }

    /// Replace the whole content with `img`. Refuses (returns `false`) when the
    /// dimensions differ, since dimensions only ever change in [`resize`].
    pub fn replace(&mut self, img: RgbaImage) -> bool {
        if img.dimensions() != self.pixels.dimensions() {
            return false;
        }
        self.pixels = img;
        true
    }

    /// Stretch `source` over the whole buffer (used to pre-seed with the image).
    pub fn seed_from(&mut self, source: &RgbaImage) {
        let (w, h) = self.pixels.dimensions();
        self.pixels = if source.dimensions() == (w, h) {
            source.clone()
        } else {
            image::imageops::resize(source, w, h, image::imageops::FilterType::Triangle)
        };
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p.0[3] == 0)
    }
}

// ============================================================================
// VISIBLE OVERLAY
// ============================================================================

/// Where the overlay sits inside its container, in client pixels.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct OverlayPlacement {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Display mirror of the buffer. Same pixel dimensions as the buffer; the
/// presenter stretches it over `placement`. Never authoritative.
pub struct VisibleOverlay {
    pixels: RgbaImage,
    placement: OverlayPlacement,
    generation: u64,
}

impl VisibleOverlay {
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Mutable access for previews. Counts as a visual change.
    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        self.generation += 1;
        &mut self.pixels
    }

    pub fn placement(&self) -> OverlayPlacement {
        self.placement
    }

    /// Bumped on every visual change so hosts can skip texture uploads.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Anchor the overlay exactly on the displayed image, relative to the
    /// container (absolute positioning).
    pub fn sync_display_box(&mut self, host: &dyn DisplayContainer) -> OverlayPlacement {
        let img = host.image_box();
        let parent = host.container_box();
        self.placement = OverlayPlacement {
            left: img.left - parent.left,
            top: img.top - parent.top,
            width: img.width,
            height: img.height,
        };
        self.placement
    }

    /// Discard whatever is shown and mirror the buffer again.
    pub fn repaint(&mut self, buffer: &AnnotationBuffer) {
        if self.pixels.dimensions() != buffer.pixels().dimensions() {
            crate::log_err!(
                "overlay {:?} and buffer {:?} disagree on size, repaint skipped",
                self.pixels.dimensions(),
                buffer.pixels().dimensions()
            );
            return;
        }
        let raw: &mut [u8] = &mut self.pixels;
        raw.copy_from_slice(buffer.pixels().as_raw());
        self.generation += 1;
    }

    pub fn clear(&mut self) {
        let raw: &mut [u8] = &mut self.pixels;
        raw.fill(0);
        self.generation += 1;
    }
}

/// Create both surfaces at `round(natural·density)`. This is the only place
/// pixel dimensions are decided; returns `None` for an unready (zero-sized)
/// source.
pub fn resize(
    natural_w: u32,
    natural_h: u32,
    density: f32,
) -> Option<(AnnotationBuffer, VisibleOverlay)> {
    let density = sanitize_density(density);
    let (w, h) = scaled_dimensions(natural_w, natural_h, density);
    if w == 0 || h == 0 {
        return None;
    }
    let buffer = AnnotationBuffer {
        pixels: RgbaImage::new(w, h),
        density,
    };
    let overlay = VisibleOverlay {
        pixels: RgbaImage::new(w, h),
        placement: OverlayPlacement::default(),
        generation: 0,
    };
    Some((buffer, overlay))
}
