use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};
use image::RgbaImage;
use std::sync::OnceLock;

use crate::canvas::BufferPoint;
use crate::ops::shapes::{RasterPatch, composite_patch};

/// Lay out a single line of text with the top of the line at y = 0.
/// Returns `(glyphs, total_width, line_height)`.
pub fn layout_text(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32, f32)>, f32, f32) {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();

    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        // baseline sits one ascent below the top
        glyphs.push((glyph_id, cursor_x, ascent));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x, scaled.height())
}

/// Rasterize one line of text whose top-left corner is at `origin`.
pub fn rasterize_text(
    font: &FontArc,
    text: &str,
    font_size: f32,
    origin: BufferPoint,
    color: [u8; 4],
    anti_alias: bool,
    canvas_w: u32,
    canvas_h: u32,
) -> RasterPatch {
    let (glyphs, _, _) = layout_text(font, text, font_size);
    if glyphs.is_empty() || font_size <= 0.0 {
        return RasterPatch::default();
    }

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(glyph_id, gx, gy) in &glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(gx, gy));
        let bounds = font.glyph_bounds(&glyph);
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    if min_x >= max_x || min_y >= max_y {
        return RasterPatch::default();
    }

    let pad = 2.0;
    let x0 = ((origin.x + min_x - pad).floor() as i32).max(0);
    let y0 = ((origin.y + min_y - pad).floor() as i32).max(0);
    let x1 = ((origin.x + max_x + pad).ceil() as i32).min(canvas_w as i32);
    let y1 = ((origin.y + max_y + pad).ceil() as i32).min(canvas_h as i32);
    let buf_w = (x1 - x0).max(0) as u32;
    let buf_h = (y1 - y0).max(0) as u32;
    if buf_w == 0 || buf_h == 0 {
        return RasterPatch::default();
    }

    let mut coverage = vec![0.0f32; buf_w as usize * buf_h as usize];
    for &(glyph_id, gx, gy) in &glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(origin.x + gx, origin.y + gy));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let b = outlined.px_bounds();
        outlined.draw(|px, py, cov| {
            let ix = px as i32 + b.min.x as i32 - x0;
            let iy = py as i32 + b.min.y as i32 - y0;
            if ix >= 0 && iy >= 0 && (ix as u32) < buf_w && (iy as u32) < buf_h {
                let idx = iy as usize * buf_w as usize + ix as usize;
                let v = if anti_alias {
                    cov
                } else if cov > 0.5 {
                    1.0
                } else {
                    0.0
                };
                coverage[idx] = coverage[idx].max(v);
            }
        });
    }

    let mut buf = vec![0u8; coverage.len() * 4];
    for (i, &cov) in coverage.iter().enumerate() {
        if cov > 0.001 {
            let idx = i * 4;
            buf[idx] = color[0];
            buf[idx + 1] = color[1];
            buf[idx + 2] = color[2];
            buf[idx + 3] = (color[3] as f32 * cov).round().min(255.0) as u8;
        }
    }

    RasterPatch {
        buf,
        buf_w,
        buf_h,
        off_x: x0,
        off_y: y0,
    }
}

/// Draw `text` onto `target`. Blank text draws nothing. Returns `true` when
/// any pixel was written.
pub fn draw_text(
    target: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    font_size: f32,
    origin: BufferPoint,
    color: [u8; 4],
    anti_alias: bool,
) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let patch = rasterize_text(
        font,
        text,
        font_size,
        origin,
        color,
        anti_alias,
        target.width(),
        target.height(),
    );
    if patch.is_empty() {
        return false;
    }
    composite_patch(target, &patch);
    true
}

/// Load a font by family name from the system, falling back to the generic
/// sans-serif family. Returns None if neither can be found.
pub fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let source = SystemSource::new();
    let mut names = Vec::new();
    if !family.trim().is_empty() {
        names.push(FamilyName::Title(family.to_string()));
    }
    names.push(FamilyName::SansSerif);

    let handle = source.select_best_match(&names, &Properties::new()).ok()?;
    let font_data = handle.load().ok()?;
    let font_data_copy = font_data.copy_font_data()?;
    let bytes: Vec<u8> = (*font_data_copy).clone();
    FontArc::try_from_vec(bytes).ok()
}

static ANNOTATION_FONT: OnceLock<Option<FontArc>> = OnceLock::new();

/// Font used for text annotations, looked up once per process.
pub fn annotation_font(family: &str) -> Option<&'static FontArc> {
    ANNOTATION_FONT
        .get_or_init(|| {
            let font = load_system_font(family);
            if font.is_some() {
                log_info!("Annotation font loaded (requested '{}')", family);
            } else {
                log_warn!("No system font found for '{}'; text tool disabled", family);
            }
            font
        })
        .as_ref()
}
