use image::RgbaImage;
use std::collections::VecDeque;

use crate::canvas::BufferPoint;

/// Flood fill from `start`, replacing every 4-connected pixel that exactly
/// matches the start pixel's RGBA with `rgb` at full opacity.
///
/// Returns the number of pixels written. Zero when the start is outside the
/// buffer or the start pixel already is the fill colour.
pub fn flood_fill(target: &mut RgbaImage, start: BufferPoint, rgb: [u8; 3]) -> usize {
    let w = target.width() as usize;
    let h = target.height() as usize;
    // pixel containing the point; rounding would step into the next pixel past .5
    let sx = start.x.floor() as i64;
    let sy = start.y.floor() as i64;
    if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 {
        return 0;
    }
    let (sx, sy) = (sx as usize, sy as usize);

    let fill = [rgb[0], rgb[1], rgb[2], 255];
    let raw: &mut [u8] = target;
    let si = (sy * w + sx) * 4;
    let seed = [raw[si], raw[si + 1], raw[si + 2], raw[si + 3]];
    if seed == fill {
        return 0;
    }

    let matches = |raw: &[u8], idx: usize| -> bool {
        let p = idx * 4;
        raw[p] == seed[0] && raw[p + 1] == seed[1] && raw[p + 2] == seed[2] && raw[p + 3] == seed[3]
    };

    // Flat visited mask, marked on enqueue so no pixel is queued twice.
    let mut visited = vec![false; w * h];
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut written = 0usize;

    let start_idx = sy * w + sx;
    visited[start_idx] = true;
    queue.push_back(start_idx);

    while let Some(idx) = queue.pop_front() {
        let p = idx * 4;
        raw[p..p + 4].copy_from_slice(&fill);
        written += 1;

        let x = idx % w;
        let y = idx / w;
        let mut visit = |n: usize, raw: &[u8]| {
            if !visited[n] && matches(raw, n) {
                visited[n] = true;
                queue.push_back(n);
            }
        };
        if x > 0 {
            visit(idx - 1, &*raw);
        }
        if x + 1 < w {
            visit(idx + 1, &*raw);
        }
        if y > 0 {
            visit(idx - w, &*raw);
        }
        if y + 1 < h {
            visit(idx + w, &*raw);
        }
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const GREEN: [u8; 3] = [0x00, 0xff, 0x00];

    #[test]
    fn fills_a_blank_buffer_entirely() {
        let mut img = RgbaImage::new(50, 50);
        let written = flood_fill(&mut img, BufferPoint::new(5.0, 5.0), GREEN);
        assert_eq!(written, 2500);
        assert!(img.pixels().all(|p| *p == Rgba([0, 255, 0, 255])));
    }

    #[test]
    fn refill_with_same_colour_is_a_no_op() {
        let mut img = RgbaImage::new(10, 10);
        flood_fill(&mut img, BufferPoint::new(1.0, 1.0), GREEN);
        let before = img.clone();
        assert_eq!(flood_fill(&mut img, BufferPoint::new(3.0, 7.0), GREEN), 0);
        assert_eq!(img, before);
    }

    #[test]
    fn same_rgb_but_translucent_is_still_filled() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 128]));
        assert_eq!(flood_fill(&mut img, BufferPoint::new(0.0, 0.0), GREEN), 16);
        assert_eq!(*img.get_pixel(3, 3), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn fractional_start_uses_the_containing_pixel() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        assert_eq!(flood_fill(&mut img, BufferPoint::new(0.7, 0.6), GREEN), 1);
        assert_eq!(*img.get_pixel(0, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(*img.get_pixel(1, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn out_of_range_start_is_ignored() {
        let mut img = RgbaImage::new(10, 10);
        assert_eq!(flood_fill(&mut img, BufferPoint::new(-1.0, 3.0), GREEN), 0);
        assert_eq!(flood_fill(&mut img, BufferPoint::new(3.0, 10.0), GREEN), 0);
        assert!(img.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn does_not_cross_a_closed_border() {
        // 20x20 buffer with a 1px red square outline from (5,5) to (14,14).
        let mut img = RgbaImage::new(20, 20);
        let border = Rgba([255, 0, 0, 255]);
        for i in 5..15 {
            img.put_pixel(i, 5, border);
            img.put_pixel(i, 14, border);
            img.put_pixel(5, i, border);
            img.put_pixel(14, i, border);
        }

        let written = flood_fill(&mut img, BufferPoint::new(10.0, 10.0), GREEN);
        assert_eq!(written, 8 * 8);
        assert_eq!(*img.get_pixel(6, 6), Rgba([0, 255, 0, 255]));
        assert_eq!(*img.get_pixel(5, 10), border);
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(15, 15).0[3], 0);
    }

    #[test]
    fn diagonal_gaps_do_not_leak() {
        // A diagonal line separates the corners for a 4-connected fill.
        let mut img = RgbaImage::new(6, 6);
        for i in 0..6 {
            img.put_pixel(i, i, Rgba([0, 0, 0, 255]));
        }
        flood_fill(&mut img, BufferPoint::new(5.0, 0.0), GREEN);
        assert_eq!(*img.get_pixel(4, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(img.get_pixel(0, 5).0[3], 0);
    }
}
