use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::BufferPoint;

/// Inner radius of the star relative to its outer radius.
pub const STAR_INNER_RATIO: f32 = 0.45;

/// Available shape primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Circle,
    Rectangle,
    Triangle,
    Hexagon,
    Star,
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Circle => "Circle",
            ShapeKind::Rectangle => "Rectangle",
            ShapeKind::Triangle => "Triangle",
            ShapeKind::Hexagon => "Hexagon",
            ShapeKind::Star => "Star",
        }
    }

    pub fn all() -> &'static [ShapeKind] {
        &[
            ShapeKind::Circle,
            ShapeKind::Rectangle,
            ShapeKind::Triangle,
            ShapeKind::Hexagon,
            ShapeKind::Star,
        ]
    }
}

/// Resolved geometry of a shape gesture, in buffer pixels.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapePath {
    Circle { cx: f32, cy: f32, r: f32 },
    /// Closed polygon, vertices in drawing order.
    Polygon(Vec<(f32, f32)>),
}

/// Build the shape spanned by a gesture. `anchor` is the pointer-down point;
/// the extent is the straight-line distance from anchor to `current`, except
/// for the rectangle which spans the two points directly.
pub fn shape_path(kind: ShapeKind, anchor: BufferPoint, current: BufferPoint) -> ShapePath {
    let (ax, ay) = (anchor.x, anchor.y);
    let r = anchor.distance(current);
    match kind {
        ShapeKind::Circle => ShapePath::Circle { cx: ax, cy: ay, r },
        ShapeKind::Rectangle => ShapePath::Polygon(vec![
            (ax, ay),
            (current.x, ay),
            (current.x, current.y),
            (ax, current.y),
        ]),
        ShapeKind::Triangle => {
            ShapePath::Polygon(vec![(ax, ay - r), (ax - r, ay + r), (ax + r, ay + r)])
        }
        ShapeKind::Hexagon => ShapePath::Polygon(
            (0..6)
                .map(|i| {
                    let angle = std::f32::consts::PI / 3.0 * i as f32;
                    (ax + angle.cos() * r, ay + angle.sin() * r)
                })
                .collect(),
        ),
        ShapeKind::Star => ShapePath::Polygon(
            (0..10)
                .map(|i| {
                    let angle = std::f32::consts::PI / 5.0 * i as f32;
                    let radius = if i % 2 == 0 { r } else { r * STAR_INNER_RATIO };
                    (ax + angle.cos() * radius, ay + angle.sin() * radius)
                })
                .collect(),
        ),
    }
}

impl ShapePath {
    /// Axis-aligned bounds of the geometry (without stroke).
    fn bounds(&self) -> (f32, f32, f32, f32) {
        match self {
            ShapePath::Circle { cx, cy, r } => (cx - r, cy - r, cx + r, cy + r),
            ShapePath::Polygon(verts) => verts.iter().fold(
                (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
                |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            ),
        }
    }

    /// Signed distance to the outline (negative = inside).
    fn sdf(&self, px: f32, py: f32) -> f32 {
        match self {
            ShapePath::Circle { cx, cy, r } => {
                ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt() - r
            }
            ShapePath::Polygon(verts) => sdf_polygon(verts, px, py),
        }
    }
}

// ============================================================================
// SDF functions — return signed distance (negative = inside)
// ============================================================================

/// Signed distance to a simple polygon (convex or not). The sign comes from an
/// even-odd crossing test, so stars work as well as hexagons.
fn sdf_polygon(verts: &[(f32, f32)], px: f32, py: f32) -> f32 {
    let n = verts.len();
    if n == 0 {
        return f32::MAX;
    }
    let mut d2 = f32::MAX;
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = verts[i];
        let (xj, yj) = verts[j];
        let ex = xj - xi;
        let ey = yj - yi;
        let wx = px - xi;
        let wy = py - yi;
        let len2 = ex * ex + ey * ey;
        let t = if len2 > 0.0 {
            ((wx * ex + wy * ey) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let bx = wx - ex * t;
        let by = wy - ey * t;
        d2 = d2.min(bx * bx + by * by);

        if (yi > py) != (yj > py) && px < ex * (py - yi) / ey + xi {
            inside = !inside;
        }
        j = i;
    }
    let d = d2.sqrt();
    if inside { -d } else { d }
}

/// Distance to a line segment (a point when both ends coincide).
#[inline]
fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Smoothstep between edge0 and edge1.
#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Pixel coverage for a signed distance.
#[inline]
fn coverage(d: f32, anti_alias: bool) -> f32 {
    if anti_alias {
        smoothstep(0.5, -0.5, d)
    } else if d < 0.0 {
        1.0
    } else {
        0.0
    }
}

// ============================================================================
// Compositing helpers
// ============================================================================

/// Source-over for straight-alpha RGBA8.
#[inline]
pub(crate) fn blend_over(dst: &mut [u8], src: [u8; 4]) {
    let sa = src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().min(255.0) as u8;
}

/// Destination-out: removes `amount` (0..1) of the existing alpha.
#[inline]
fn erase_px(dst: &mut [u8], amount: f32) {
    let a = (dst[3] as f32 * (1.0 - amount)).round() as u8;
    if a == 0 {
        dst.copy_from_slice(&[0, 0, 0, 0]);
    } else {
        dst[3] = a;
    }
}

/// Clamp a float bounding box (already padded) to the pixel grid of the target.
fn pixel_bounds(
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
    canvas_w: u32,
    canvas_h: u32,
) -> Option<(usize, usize, usize, usize)> {
    let x0 = (min_x.floor() as i64).max(0);
    let y0 = (min_y.floor() as i64).max(0);
    let x1 = (max_x.ceil() as i64).min(canvas_w as i64);
    let y1 = (max_y.ceil() as i64).min(canvas_h as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as usize, y0 as usize, x1 as usize, y1 as usize))
}

/// A rasterized RGBA patch positioned in buffer coordinates.
#[derive(Clone, Debug, Default)]
pub struct RasterPatch {
    pub buf: Vec<u8>,
    pub buf_w: u32,
    pub buf_h: u32,
    pub off_x: i32,
    pub off_y: i32,
}

impl RasterPatch {
    pub fn is_empty(&self) -> bool {
        self.buf_w == 0 || self.buf_h == 0 || self.buf.chunks_exact(4).all(|p| p[3] == 0)
    }
}

/// Alpha-composite a patch onto `target` (source-over).
pub fn composite_patch(target: &mut RgbaImage, patch: &RasterPatch) {
    if patch.buf_w == 0 || patch.buf_h == 0 {
        return;
    }
    let tw = target.width() as usize;
    let th = target.height() as i64;
    let row_bytes = tw * 4;
    let src_row = patch.buf_w as usize * 4;
    let raw: &mut [u8] = target;

    raw.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let py = y as i64 - patch.off_y as i64;
            if py < 0 || py >= patch.buf_h as i64 || (y as i64) >= th {
                return;
            }
            let src = &patch.buf[py as usize * src_row..(py as usize + 1) * src_row];
            for col in 0..patch.buf_w as usize {
                let x = patch.off_x as i64 + col as i64;
                if x < 0 || x >= tw as i64 {
                    continue;
                }
                let s = &src[col * 4..col * 4 + 4];
                if s[3] == 0 {
                    continue;
                }
                let o = x as usize * 4;
                blend_over(&mut row[o..o + 4], [s[0], s[1], s[2], s[3]]);
            }
        });
}

// ============================================================================
// Shapes
// ============================================================================

/// How a shape is painted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeStyle {
    pub color: [u8; 4],
    /// Outline width in buffer pixels (already scaled by density).
    pub stroke_width: f32,
    /// Solid interior in addition to the outline.
    pub filled: bool,
    pub anti_alias: bool,
}

/// Rasterize a shape into a patch covering its (stroke-padded) bounds.
pub fn rasterize_shape(
    path: &ShapePath,
    style: &ShapeStyle,
    canvas_w: u32,
    canvas_h: u32,
) -> RasterPatch {
    let (min_x, min_y, max_x, max_y) = path.bounds();
    let pad = style.stroke_width * 0.5 + 2.0;
    let Some((x0, y0, x1, y1)) = pixel_bounds(
        min_x - pad,
        min_y - pad,
        max_x + pad,
        max_y + pad,
        canvas_w,
        canvas_h,
    ) else {
        return RasterPatch::default();
    };
    let buf_w = x1 - x0;
    let buf_h = y1 - y0;
    let row_bytes = buf_w * 4;
    let mut buf = vec![0u8; row_bytes * buf_h];

    let color = style.color;
    let half = style.stroke_width * 0.5;
    let aa = style.anti_alias;
    let filled = style.filled;

    buf.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(row, row_buf)| {
            let py = (y0 + row) as f32 + 0.5;
            for col in 0..buf_w {
                let px = (x0 + col) as f32 + 0.5;
                let d = path.sdf(px, py);
                let mut cov = coverage(d.abs() - half, aa);
                if filled {
                    cov = cov.max(coverage(d, aa));
                }
                if cov > 0.001 {
                    let idx = col * 4;
                    row_buf[idx] = color[0];
                    row_buf[idx + 1] = color[1];
                    row_buf[idx + 2] = color[2];
                    row_buf[idx + 3] = (color[3] as f32 * cov).round().min(255.0) as u8;
                }
            }
        });

    RasterPatch {
        buf,
        buf_w: buf_w as u32,
        buf_h: buf_h as u32,
        off_x: x0 as i32,
        off_y: y0 as i32,
    }
}

/// Rasterize and composite a shape onto `target`. Returns `true` when at least
/// one pixel was covered.
pub fn draw_shape(target: &mut RgbaImage, path: &ShapePath, style: &ShapeStyle) -> bool {
    let patch = rasterize_shape(path, style, target.width(), target.height());
    if patch.is_empty() {
        return false;
    }
    composite_patch(target, &patch);
    true
}

// ============================================================================
// Freehand
// ============================================================================

/// What a freehand segment does to the pixels it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaintMode {
    /// Source-over with the given colour.
    Paint([u8; 4]),
    /// Destination-out: clear towards transparent.
    Erase,
}

/// Draw one round-capped segment of `width` buffer pixels straight onto
/// `target`. Consecutive segments share end points, which gives round joins.
/// Returns `true` when any pixel was touched.
pub fn stroke_segment(
    target: &mut RgbaImage,
    from: BufferPoint,
    to: BufferPoint,
    width: f32,
    mode: PaintMode,
    anti_alias: bool,
) -> bool {
    let half = (width * 0.5).max(0.5);
    let pad = half + 2.0;
    let Some((x0, y0, x1, y1)) = pixel_bounds(
        from.x.min(to.x) - pad,
        from.y.min(to.y) - pad,
        from.x.max(to.x) + pad,
        from.y.max(to.y) + pad,
        target.width(),
        target.height(),
    ) else {
        return false;
    };
    let row_bytes = target.width() as usize * 4;
    let raw: &mut [u8] = target;

    raw.par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y0)
        .take(y1 - y0)
        .map(|(y, row)| {
            let py = y as f32 + 0.5;
            let mut touched = false;
            for x in x0..x1 {
                let px = x as f32 + 0.5;
                let d = sdf_line_segment(px, py, from.x, from.y, to.x, to.y) - half;
                let cov = coverage(d, anti_alias);
                if cov <= 0.001 {
                    continue;
                }
                let o = x * 4;
                let dst = &mut row[o..o + 4];
                match mode {
                    PaintMode::Paint(color) => {
                        let a = (color[3] as f32 * cov).round().min(255.0) as u8;
                        blend_over(dst, [color[0], color[1], color[2], a]);
                    }
                    PaintMode::Erase => erase_px(dst, cov),
                }
                touched = true;
            }
            touched
        })
        .reduce(|| false, |a, b| a || b)
}

/// Dashed ring used as the eraser cursor on the overlay.
pub fn draw_dashed_ring(target: &mut RgbaImage, center: BufferPoint, radius: f32, line_width: f32) {
    const DASH_ON: f32 = 4.0;
    const DASH_PERIOD: f32 = 6.0;
    let half = (line_width * 0.5).max(0.5);
    let pad = radius + half + 1.0;
    let Some((x0, y0, x1, y1)) = pixel_bounds(
        center.x - pad,
        center.y - pad,
        center.x + pad,
        center.y + pad,
        target.width(),
        target.height(),
    ) else {
        return;
    };
    let scale = line_width.max(1.0);
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f32 + 0.5 - center.x;
            let dy = y as f32 + 0.5 - center.y;
            let len = (dx * dx + dy * dy).sqrt();
            if (len - radius).abs() > half {
                continue;
            }
            let arc = (dy.atan2(dx) + std::f32::consts::PI) * radius / scale;
            if arc % DASH_PERIOD < DASH_ON {
                target.put_pixel(x as u32, y as u32, image::Rgba([0, 0, 0, 204]));
            }
        }
    }
}
