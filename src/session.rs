use ab_glyph::FontArc;
use uuid::Uuid;

use crate::canvas::{
    AnnotationBuffer, BufferPoint, DisplayContainer, PointerSample, VisibleOverlay, map_to_buffer,
    resize,
};
use crate::components::history::{HistoryManager, RestoreDirection, RestoreJob, Snapshot};
use crate::io::SourceImage;
use crate::ops::fill::flood_fill;
use crate::ops::shapes::{
    PaintMode, ShapeKind, ShapeStyle, draw_dashed_ring, draw_shape, shape_path, stroke_segment,
};
use crate::ops::text::draw_text;

/// What the current drag is doing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureKind {
    /// Freehand or eraser: segments go straight into the buffer.
    Stroke(PaintMode),
    /// Previewed on the overlay, committed on release.
    Shape(ShapeKind),
}

/// One pointer-down .. pointer-up interaction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureState {
    pub kind: GestureKind,
    pub anchor: BufferPoint,
    pub previous: BufferPoint,
    /// The buffer was written during this gesture.
    pub mutated: bool,
}

/// Pending inline text affordance.
#[derive(Clone, Debug, PartialEq)]
pub struct TextEntry {
    /// Where the entry box sits, in client pixels.
    pub client_anchor: (f32, f32),
    /// Top-left of the text in buffer pixels.
    pub buffer_anchor: BufferPoint,
    /// Font size of the entry box on screen.
    pub display_size: f32,
    /// Font size used when rasterizing into the buffer.
    pub buffer_size: f32,
    pub draft: String,
}

/// One viewed image: buffer, overlay and history. Dropped wholesale when
/// another image is opened.
pub struct Session {
    pub id: Uuid,
    source: SourceImage,
    buffer: AnnotationBuffer,
    overlay: VisibleOverlay,
    history: HistoryManager,
    gesture: Option<GestureState>,
    text_entry: Option<TextEntry>,
    restoring: Option<RestoreJob>,
    mutated_since_snapshot: bool,
}

impl Session {
    /// Build a session for `source`. `None` while the source has no pixels.
    /// The first history entry is the buffer as it is right after load.
    pub fn open(source: SourceImage, density: f32, seed_with_image: bool) -> Option<Self> {
        if !source.is_ready() {
            log_warn!("Image '{}' is not ready, annotation disabled", source.name);
            return None;
        }
        let (natural_w, natural_h) = source.natural_size();
        let (mut buffer, mut overlay) = resize(natural_w, natural_h, density)?;
        if seed_with_image {
            buffer.seed_from(&source.pixels);
        }
        overlay.repaint(&buffer);

        let mut history = HistoryManager::default();
        if let Some(initial) = Snapshot::capture(buffer.pixels()) {
            history.push(initial);
        }

        let id = Uuid::new_v4();
        log_info!(
            "Session {} opened for '{}': {}x{} buffer at density {}",
            id,
            source.name,
            buffer.width(),
            buffer.height(),
            buffer.density()
        );
        Some(Self {
            id,
            source,
            buffer,
            overlay,
            history,
            gesture: None,
            text_entry: None,
            restoring: None,
            mutated_since_snapshot: false,
        })
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    pub fn buffer(&self) -> &AnnotationBuffer {
        &self.buffer
    }

    pub fn overlay(&self) -> &VisibleOverlay {
        &self.overlay
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn gesture(&self) -> Option<&GestureState> {
        self.gesture.as_ref()
    }

    pub fn text_entry(&self) -> Option<&TextEntry> {
        self.text_entry.as_ref()
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring.is_some()
    }

    /// Map a pointer sample against the image's current box.
    pub fn map_pointer(&self, sample: &PointerSample, host: &dyn DisplayContainer) -> Option<BufferPoint> {
        let client = sample.client_point()?;
        map_to_buffer(client, host.image_box(), self.buffer.width(), self.buffer.height())
    }

    // ------------------------------------------------------------------
    // Overlay
    // ------------------------------------------------------------------

    /// Re-anchor the overlay and mirror the buffer. Never touches history.
    pub fn sync_layout(&mut self, host: &dyn DisplayContainer) {
        self.overlay.sync_display_box(host);
        self.overlay.repaint(&self.buffer);
    }

    pub fn repaint(&mut self) {
        self.overlay.repaint(&self.buffer);
    }

    /// Eraser cursor: dashed ring of the brush diameter, overlay only.
    pub fn show_eraser_ring(&mut self, center: BufferPoint, diameter: f32) {
        self.overlay.repaint(&self.buffer);
        let density = self.buffer.density();
        draw_dashed_ring(self.overlay.pixels_mut(), center, diameter * 0.5, density);
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Push the buffer if it changed since the last snapshot.
    pub fn snapshot(&mut self) -> bool {
        if !self.mutated_since_snapshot {
            return false;
        }
        let Some(snapshot) = Snapshot::capture(self.buffer.pixels()) else {
            log_warn!("Session {}: snapshot produced no data, skipped", self.id);
            return false;
        };
        self.push_snapshot(snapshot)
    }

    /// Like [`Session::snapshot`], but also skips content identical to the
    /// newest entry (a stroke that painted over itself).
    pub fn snapshot_if_changed(&mut self) -> bool {
        if !self.mutated_since_snapshot {
            return false;
        }
        let Some(snapshot) = Snapshot::capture(self.buffer.pixels()) else {
            return false;
        };
        if self.history.latest().is_some_and(|latest| latest.bytes() == snapshot.bytes()) {
            self.mutated_since_snapshot = false;
            return false;
        }
        self.push_snapshot(snapshot)
    }

    fn push_snapshot(&mut self, snapshot: Snapshot) -> bool {
        self.history.push(snapshot);
        self.mutated_since_snapshot = false;
        log_info!(
            "Session {}: snapshot {} of {} ({} KiB held)",
            self.id,
            self.history.undo_count(),
            crate::components::history::MAX_HISTORY,
            self.history.memory_usage() / 1024
        );
        true
    }

    /// Start restoring the previous state. Settles any outstanding restore
    /// first. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.settle();
        self.cancel_gesture();
        let Some(target) = self.history.undo() else {
            return false;
        };
        self.restoring = Some(RestoreJob::spawn(target, RestoreDirection::Undo));
        true
    }

    pub fn redo(&mut self) -> bool {
        self.settle();
        self.cancel_gesture();
        let Some(target) = self.history.redo() else {
            return false;
        };
        self.restoring = Some(RestoreJob::spawn(target, RestoreDirection::Redo));
        true
    }

    /// Apply a finished restore without blocking. Returns `true` when the
    /// restore completed (successfully or not) during this call.
    pub fn poll_restore(&mut self) -> bool {
        let Some(job) = self.restoring.as_ref() else {
            return false;
        };
        let Some(result) = job.try_finish() else {
            return false;
        };
        let direction = job.direction();
        self.restoring = None;
        self.apply_restore(direction, result);
        true
    }

    /// Block until any outstanding restore is applied.
    pub fn settle(&mut self) {
        if let Some(job) = self.restoring.take() {
            let direction = job.direction();
            let result = job.wait();
            self.apply_restore(direction, result);
        }
    }

    fn apply_restore(&mut self, direction: RestoreDirection, result: Result<image::RgbaImage, String>) {
        let outcome = result.and_then(|img| {
            if self.buffer.replace(img) {
                Ok(())
            } else {
                Err("restored snapshot does not match the buffer size".to_string())
            }
        });
        match outcome {
            Ok(()) => {
                self.overlay.repaint(&self.buffer);
                self.mutated_since_snapshot = false;
                log_info!("Session {}: restored ({:?})", self.id, direction);
            }
            Err(e) => {
                // buffer still shows the pre-move state, so move the stacks back too
                self.history.rollback(direction);
                log_err!("Session {}: restore failed, keeping current content: {}", self.id, e);
            }
        }
    }

    /// Clear both surfaces and both stacks. Pending work is dropped.
    pub fn reset(&mut self) {
        self.restoring = None;
        self.gesture = None;
        self.text_entry = None;
        self.history.clear();
        self.buffer.clear();
        self.overlay.clear();
        self.mutated_since_snapshot = false;
    }

    // ------------------------------------------------------------------
    // Gestures
    // ------------------------------------------------------------------

    pub fn begin_stroke(&mut self, at: BufferPoint, mode: PaintMode) {
        self.gesture = Some(GestureState {
            kind: GestureKind::Stroke(mode),
            anchor: at,
            previous: at,
            mutated: false,
        });
    }

    pub fn begin_shape(&mut self, at: BufferPoint, kind: ShapeKind) {
        self.gesture = Some(GestureState {
            kind: GestureKind::Shape(kind),
            anchor: at,
            previous: at,
            mutated: false,
        });
    }

    /// Advance the active gesture to `to`. Strokes write the buffer, shapes
    /// redraw their preview on the overlay. Returns `true` if anything changed.
    pub fn drag_to(&mut self, to: BufferPoint, width: f32, style: &ShapeStyle) -> bool {
        let Some(gesture) = self.gesture.as_mut() else {
            return false;
        };
        let from = gesture.previous;
        gesture.previous = to;
        match gesture.kind {
            GestureKind::Stroke(mode) => {
                let touched = stroke_segment(
                    self.buffer.pixels_mut(),
                    from,
                    to,
                    width,
                    mode,
                    style.anti_alias,
                );
                if touched {
                    gesture.mutated = true;
                    self.mutated_since_snapshot = true;
                    self.overlay.repaint(&self.buffer);
                }
                touched
            }
            GestureKind::Shape(kind) => {
                let path = shape_path(kind, gesture.anchor, to);
                self.overlay.repaint(&self.buffer);
                draw_shape(self.overlay.pixels_mut(), &path, style);
                true
            }
        }
    }

    /// End the active gesture at `at` (or where it last was). Commits shapes
    /// and snapshots. Returns `true` if a snapshot was pushed.
    pub fn finish_gesture(&mut self, at: Option<BufferPoint>, style: &ShapeStyle) -> bool {
        let Some(gesture) = self.gesture.take() else {
            return false;
        };
        match gesture.kind {
            GestureKind::Stroke(_) => {
                if gesture.mutated {
                    self.snapshot_if_changed()
                } else {
                    false
                }
            }
            GestureKind::Shape(kind) => {
                let end = at.unwrap_or(gesture.previous);
                let path = shape_path(kind, gesture.anchor, end);
                if draw_shape(self.buffer.pixels_mut(), &path, style) {
                    self.mutated_since_snapshot = true;
                }
                self.overlay.repaint(&self.buffer);
                self.snapshot()
            }
        }
    }

    /// Drop the active gesture. Shape previews disappear; stroke pixels
    /// already written stay and are snapshotted.
    pub fn cancel_gesture(&mut self) {
        if let Some(gesture) = self.gesture.take() {
            if gesture.mutated {
                self.snapshot_if_changed();
            }
            self.overlay.repaint(&self.buffer);
        }
    }

    /// Flood fill at `at` and snapshot. Returns `true` if pixels changed.
    pub fn fill(&mut self, at: BufferPoint, rgb: [u8; 3]) -> bool {
        let written = flood_fill(self.buffer.pixels_mut(), at, rgb);
        if written == 0 {
            return false;
        }
        self.mutated_since_snapshot = true;
        self.overlay.repaint(&self.buffer);
        self.snapshot();
        true
    }

    /// Empty the buffer as an undoable step.
    pub fn clear(&mut self) -> bool {
        self.settle();
        self.cancel_gesture();
        self.text_entry = None;
        if self.buffer.is_blank() {
            return false;
        }
        self.buffer.clear();
        self.overlay.repaint(&self.buffer);
        self.mutated_since_snapshot = true;
        self.snapshot()
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    /// Open the inline entry unless one is already pending.
    pub fn open_text_entry(
        &mut self,
        client: (f32, f32),
        at: BufferPoint,
        display_size: f32,
        host: &dyn DisplayContainer,
    ) -> bool {
        if self.text_entry.is_some() {
            return false;
        }
        let box_h = host.image_box().height;
        if box_h <= 0.0 {
            return false;
        }
        let scale_y = self.buffer.height() as f32 / box_h;
        self.text_entry = Some(TextEntry {
            client_anchor: client,
            buffer_anchor: at,
            display_size,
            buffer_size: display_size * scale_y,
            draft: String::new(),
        });
        true
    }

    pub fn set_text_draft(&mut self, text: &str) {
        if let Some(entry) = self.text_entry.as_mut() {
            entry.draft = text.to_string();
        }
    }

    /// Close the entry without drawing.
    pub fn cancel_text(&mut self) -> bool {
        self.text_entry.take().is_some()
    }

    /// Rasterize the pending entry and snapshot. Blank drafts, or a missing
    /// font, close the entry without touching the buffer.
    /// Any outstanding restore is applied first so the text lands on the
    /// state the newest history entry describes.
    pub fn commit_text(&mut self, font: Option<&FontArc>, color: [u8; 4], anti_alias: bool) -> bool {
        self.settle();
        let Some(entry) = self.text_entry.take() else {
            return false;
        };
        if entry.draft.trim().is_empty() {
            return false;
        }
        let Some(font) = font else {
            log_warn!("Session {}: no font available, text discarded", self.id);
            return false;
        };
        let drawn = draw_text(
            self.buffer.pixels_mut(),
            font,
            &entry.draft,
            entry.buffer_size,
            entry.buffer_anchor,
            color,
            anti_alias,
        );
        if !drawn {
            return false;
        }
        self.mutated_since_snapshot = true;
        self.overlay.repaint(&self.buffer);
        self.snapshot()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        log_info!("Session {} closed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::FixedLayout;
    use image::{Rgba, RgbaImage};

    const STYLE: ShapeStyle = ShapeStyle {
        color: [0xf9, 0x41, 0x44, 255],
        stroke_width: 4.0,
        filled: false,
        anti_alias: false,
    };

    fn session(w: u32, h: u32) -> Session {
        Session::open(SourceImage::new(RgbaImage::new(w, h), "test"), 1.0, false).unwrap()
    }

    fn stroke(s: &mut Session, from: (f32, f32), to: (f32, f32)) {
        s.begin_stroke(BufferPoint::new(from.0, from.1), PaintMode::Paint(STYLE.color));
        s.drag_to(BufferPoint::new(to.0, to.1), 4.0, &STYLE);
        s.finish_gesture(None, &STYLE);
    }

    #[test]
    fn unready_source_opens_nothing() {
        assert!(Session::open(SourceImage::new(RgbaImage::new(0, 5), "x"), 1.0, false).is_none());
    }

    #[test]
    fn open_pushes_the_post_load_state() {
        let s = session(8, 8);
        assert_eq!(s.history().undo_count(), 1);
        assert!(s.buffer().is_blank());
    }

    #[test]
    fn seeded_session_starts_with_the_image() {
        let src = SourceImage::new(RgbaImage::from_pixel(4, 4, Rgba([5, 6, 7, 255])), "seed");
        let s = Session::open(src, 2.0, true).unwrap();
        assert_eq!(s.buffer().width(), 8);
        assert_eq!(*s.buffer().pixels().get_pixel(3, 3), Rgba([5, 6, 7, 255]));
    }

    #[test]
    fn strokes_undo_and_redo_byte_identically() {
        let mut s = session(40, 40);
        let origin = s.buffer().pixels().clone();
        let mut states = vec![origin.clone()];
        for i in 0..3 {
            let y = 5.0 + i as f32 * 10.0;
            stroke(&mut s, (2.0, y), (38.0, y));
            states.push(s.buffer().pixels().clone());
        }
        assert_eq!(s.history().undo_count(), 4);

        for expected in states.iter().rev().skip(1) {
            assert!(s.undo());
            s.settle();
            assert_eq!(s.buffer().pixels(), expected);
            assert_eq!(s.overlay().pixels(), expected);
        }
        assert!(!s.undo());
        assert_eq!(s.buffer().pixels(), &origin);

        for expected in states.iter().skip(1) {
            assert!(s.redo());
            s.settle();
            assert_eq!(s.buffer().pixels(), expected);
        }
        assert!(!s.redo());
    }

    #[test]
    fn stroke_over_itself_is_not_a_new_entry() {
        let mut s = session(20, 20);
        stroke(&mut s, (2.0, 10.0), (18.0, 10.0));
        assert_eq!(s.history().undo_count(), 2);
        // identical opaque stroke leaves the pixels as they were
        stroke(&mut s, (2.0, 10.0), (18.0, 10.0));
        assert_eq!(s.history().undo_count(), 2);
    }

    #[test]
    fn shape_preview_stays_off_the_buffer_until_release() {
        let mut s = session(40, 40);
        s.begin_shape(BufferPoint::new(20.0, 20.0), ShapeKind::Circle);
        s.drag_to(BufferPoint::new(30.0, 20.0), 4.0, &STYLE);
        assert!(s.buffer().is_blank());
        assert!(s.overlay().pixels().pixels().any(|p| p.0[3] > 0));

        assert!(s.finish_gesture(Some(BufferPoint::new(30.0, 20.0)), &STYLE));
        assert!(!s.buffer().is_blank());
        assert_eq!(s.overlay().pixels(), s.buffer().pixels());
    }

    #[test]
    fn cancelled_shape_leaves_no_trace() {
        let mut s = session(40, 40);
        s.begin_shape(BufferPoint::new(20.0, 20.0), ShapeKind::Star);
        s.drag_to(BufferPoint::new(30.0, 25.0), 4.0, &STYLE);
        s.cancel_gesture();
        assert!(s.buffer().is_blank());
        assert!(s.overlay().pixels().pixels().all(|p| p.0[3] == 0));
        assert_eq!(s.history().undo_count(), 1);
    }

    #[test]
    fn failed_restore_keeps_content_and_stacks() {
        let mut s = session(10, 10);
        stroke(&mut s, (1.0, 5.0), (9.0, 5.0));
        let drawn = s.buffer().pixels().clone();

        assert!(s.history.undo().is_some());
        s.apply_restore(RestoreDirection::Undo, Err("corrupt".into()));
        assert_eq!(s.buffer().pixels(), &drawn);
        assert_eq!(s.history().undo_count(), 2);
        assert!(!s.history().can_redo());
    }

    #[test]
    fn clear_is_undoable() {
        let mut s = session(20, 20);
        stroke(&mut s, (2.0, 10.0), (18.0, 10.0));
        let drawn = s.buffer().pixels().clone();
        assert!(s.clear());
        assert!(s.buffer().is_blank());
        assert!(!s.clear());

        s.undo();
        s.settle();
        assert_eq!(s.buffer().pixels(), &drawn);
    }

    #[test]
    fn fill_snapshots_immediately() {
        let mut s = session(10, 10);
        assert!(s.fill(BufferPoint::new(5.0, 5.0), [0, 255, 0]));
        assert_eq!(s.history().undo_count(), 2);
        assert!(!s.fill(BufferPoint::new(5.0, 5.0), [0, 255, 0]));
        assert_eq!(s.history().undo_count(), 2);
    }

    #[test]
    fn text_entry_sizes_follow_the_display_box() {
        let mut s = session(200, 100);
        let layout = FixedLayout::sized(100.0, 50.0);
        assert!(s.open_text_entry((10.0, 10.0), BufferPoint::new(20.0, 20.0), 27.0, &layout));
        // second click while pending is ignored
        assert!(!s.open_text_entry((30.0, 30.0), BufferPoint::new(60.0, 60.0), 27.0, &layout));
        let entry = s.text_entry().unwrap();
        assert_eq!(entry.display_size, 27.0);
        assert_eq!(entry.buffer_size, 54.0);

        s.set_text_draft("   ");
        assert!(!s.commit_text(None, [0, 0, 0, 255], true));
        assert!(s.text_entry().is_none());
        assert!(s.buffer().is_blank());
    }

    #[test]
    fn text_commit_waits_for_the_restore() {
        let mut s = session(40, 40);
        let blank = s.buffer().pixels().clone();
        stroke(&mut s, (2.0, 20.0), (38.0, 20.0));
        let layout = FixedLayout::sized(40.0, 40.0);
        assert!(s.open_text_entry((5.0, 5.0), BufferPoint::new(5.0, 5.0), 27.0, &layout));
        s.set_text_draft("Camp");

        assert!(s.undo());
        s.commit_text(None, [0, 0, 0, 255], false);
        assert!(!s.is_restoring());
        assert_eq!(s.buffer().pixels(), &blank);
        assert!(s.history().can_redo());
        let latest = s.history().latest().unwrap().decode().unwrap();
        assert_eq!(&latest, s.buffer().pixels());
    }

    #[test]
    fn layout_sync_never_snapshots() {
        let mut s = session(10, 10);
        let layout = FixedLayout::sized(300.0, 300.0);
        s.sync_layout(&layout);
        assert_eq!(s.overlay().placement().width, 300.0);
        assert!(!s.snapshot());
        assert_eq!(s.history().undo_count(), 1);
    }

    #[test]
    fn reset_empties_everything() {
        let mut s = session(10, 10);
        stroke(&mut s, (1.0, 5.0), (9.0, 5.0));
        s.reset();
        assert!(s.buffer().is_blank());
        assert_eq!(s.history().undo_count(), 0);
        assert!(!s.history().can_redo());
    }
}
