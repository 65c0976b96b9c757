//! Single entry point for annotation input.
//!
//! Hosts translate their native input into [`InputEvent`]s and hand them to
//! [`Annotator::dispatch`] in delivery order, together with something that can
//! report where the image currently sits on screen. Every event is handled to
//! completion before the next one; the returned [`EventEffects`] tell the host
//! what to refresh.

use chrono::{DateTime, Local};

use crate::canvas::{DisplayContainer, PointerSample, Rgb};
use crate::components::tools::{CursorStyle, Shortcut, Tool, ToolState, shortcut_for};
use crate::io::{DownloadSink, SourceImage, save_composite};
use crate::ops::clipboard::{ClipboardSink, ExportNotice, FallbackViewer, copy_composite};
use crate::ops::shapes::ShapeStyle;
use crate::ops::text::annotation_font;
use crate::session::Session;
use crate::settings::AnnotateSettings;

/// Tagged input understood by the annotator.
#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    PointerDown(PointerSample),
    PointerMove(PointerSample),
    PointerUp(PointerSample),
    /// The host lost the pointer; ends the gesture where it last was.
    PointerCancel,
    /// The pointer left the image without a gesture in progress.
    PointerLeave,
    ToolSelected(Tool),
    ColorChanged(Rgb),
    PresetColorSelected(usize),
    BrushSizeChanged(u32),
    /// Fill modifier (Shift in the desktop host).
    ModifierChanged { fill: bool },
    TextDraft(String),
    TextCommit,
    TextCancel,
    UndoRequested,
    RedoRequested,
    ClearRequested,
    /// The image box moved or resized.
    LayoutChanged,
    Shortcut { key: char, command: bool, shift: bool },
}

/// What handling an event changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventEffects {
    /// Overlay content changed.
    pub repaint: bool,
    /// A history entry was pushed.
    pub snapshot: bool,
    /// An undo/redo decode was started.
    pub restore_started: bool,
    /// A gesture was refused because a restore is outstanding.
    pub rejected: bool,
    /// New cursor to show.
    pub cursor: Option<CursorStyle>,
    pub text_entry_opened: bool,
    pub text_entry_closed: bool,
}

/// Owns the tool state and the session of the image being viewed.
pub struct Annotator {
    tools: ToolState,
    settings: AnnotateSettings,
    density: f32,
    session: Option<Session>,
}

impl Annotator {
    pub fn new(settings: AnnotateSettings, density: f32) -> Self {
        let tools = ToolState::new(settings.default_color, settings.default_brush_size);
        Self {
            tools,
            settings,
            density,
            session: None,
        }
    }

    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    pub fn settings(&self) -> &AnnotateSettings {
        &self.settings
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Copy the current colour and brush into the settings as the defaults
    /// for the next launch. Returns `true` if anything changed.
    pub fn remember_tool_defaults(&mut self) -> bool {
        let color = self.tools.color();
        let brush = self.tools.brush_size();
        if self.settings.default_color == color && self.settings.default_brush_size == brush {
            return false;
        }
        self.settings.default_color = color;
        self.settings.default_brush_size = brush;
        true
    }

    /// Pixel density used for the next opened image.
    pub fn set_density(&mut self, density: f32) {
        self.density = density;
    }

    /// Tear down the current session and start one for `source`. Returns
    /// `false` (and stays closed) if the image is not ready.
    pub fn open_image(&mut self, source: SourceImage) -> bool {
        self.close();
        self.session = Session::open(source, self.density, self.settings.seed_with_image);
        self.session.is_some()
    }

    /// End the current session; both surfaces and history are discarded.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.reset();
        }
    }

    /// Apply a finished undo/redo decode, if any. Call once per frame.
    pub fn poll_restore(&mut self) -> bool {
        self.session.as_mut().is_some_and(Session::poll_restore)
    }

    /// Block until an outstanding undo/redo is applied.
    pub fn settle(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.settle();
        }
    }

    fn shape_style(&self) -> ShapeStyle {
        let [r, g, b] = self.tools.color().to_array();
        ShapeStyle {
            color: [r, g, b, 255],
            stroke_width: self.tools.stroke_width(self.density_of_session()),
            filled: self.tools.fill_modifier(),
            anti_alias: self.settings.anti_alias,
        }
    }

    fn density_of_session(&self) -> f32 {
        self.session
            .as_ref()
            .map(|s| s.buffer().density())
            .unwrap_or(1.0)
    }

    /// Handle one input event.
    pub fn dispatch(&mut self, event: InputEvent, host: &dyn DisplayContainer) -> EventEffects {
        let mut fx = EventEffects::default();
        match event {
            InputEvent::PointerDown(sample) => self.pointer_down(&sample, host, &mut fx),
            InputEvent::PointerMove(sample) => self.pointer_move(&sample, host, &mut fx),
            InputEvent::PointerUp(sample) => self.pointer_up(Some(&sample), host, &mut fx),
            InputEvent::PointerCancel => self.pointer_up(None, host, &mut fx),
            InputEvent::PointerLeave => {
                // hide the eraser ring
                if self.tools.is_erasing()
                    && let Some(session) = self.session.as_mut()
                    && session.gesture().is_none()
                {
                    session.repaint();
                    fx.repaint = true;
                }
            }
            InputEvent::ToolSelected(tool) => {
                if let Some(session) = self.session.as_mut() {
                    session.cancel_gesture();
                    if session.cancel_text() {
                        fx.text_entry_closed = true;
                    }
                    session.repaint();
                    fx.repaint = true;
                }
                let active = self.tools.select(tool);
                log_info!("Tool: {}", active.label());
                fx.cursor = Some(self.tools.cursor());
            }
            InputEvent::ColorChanged(color) => self.tools.set_color(color),
            InputEvent::PresetColorSelected(index) => {
                if !self.tools.select_preset(index, &self.settings.preset_colors) {
                    log_warn!("No preset colour at index {}", index);
                }
            }
            InputEvent::BrushSizeChanged(size) => {
                self.tools.set_brush_size(size);
                fx.cursor = Some(self.tools.cursor());
            }
            InputEvent::ModifierChanged { fill } => self.tools.set_fill_modifier(fill),
            InputEvent::TextDraft(text) => {
                if let Some(session) = self.session.as_mut() {
                    session.set_text_draft(&text);
                }
            }
            InputEvent::TextCommit => self.commit_text(&mut fx),
            InputEvent::TextCancel => {
                if let Some(session) = self.session.as_mut()
                    && session.cancel_text()
                {
                    fx.text_entry_closed = true;
                }
            }
            InputEvent::UndoRequested => self.undo(&mut fx),
            InputEvent::RedoRequested => self.redo(&mut fx),
            InputEvent::ClearRequested => {
                if let Some(session) = self.session.as_mut() {
                    let had_text = session.text_entry().is_some();
                    fx.snapshot = session.clear();
                    fx.repaint = true;
                    fx.text_entry_closed = had_text;
                }
            }
            InputEvent::LayoutChanged => {
                if let Some(session) = self.session.as_mut() {
                    session.sync_layout(host);
                    fx.repaint = true;
                }
            }
            InputEvent::Shortcut { key, command, shift } => match shortcut_for(key, command, shift) {
                Some(Shortcut::Undo) => self.undo(&mut fx),
                Some(Shortcut::Redo) => self.redo(&mut fx),
                None => {}
            },
        }
        fx
    }

    fn pointer_down(&mut self, sample: &PointerSample, host: &dyn DisplayContainer, fx: &mut EventEffects) {
        let tool = self.tools.active();
        let color = self.tools.color();
        let paint_mode = self.tools.paint_mode();
        let text_size = self.tools.text_display_size();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_restoring() {
            log_info!("Session {}: gesture rejected while restoring", session.id);
            fx.rejected = true;
            return;
        }
        let Some(at) = session.map_pointer(sample, host) else {
            return;
        };

        match tool {
            Tool::Fill => {
                if session.fill(at, color.to_array()) {
                    fx.repaint = true;
                    fx.snapshot = true;
                }
            }
            Tool::Text => {
                if let Some(client) = sample.client_point() {
                    fx.text_entry_opened = session.open_text_entry(client, at, text_size, host);
                }
            }
            Tool::Freehand | Tool::Eraser => session.begin_stroke(at, paint_mode),
            Tool::Shape(kind) => session.begin_shape(at, kind),
        }
    }

    fn pointer_move(&mut self, sample: &PointerSample, host: &dyn DisplayContainer, fx: &mut EventEffects) {
        let style = self.shape_style();
        let erasing = self.tools.is_erasing();
        let diameter = style.stroke_width;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(at) = session.map_pointer(sample, host) else {
            return;
        };
        if session.gesture().is_some() && session.drag_to(at, style.stroke_width, &style) {
            fx.repaint = true;
        }
        if erasing {
            session.show_eraser_ring(at, diameter);
            fx.repaint = true;
        }
    }

    fn pointer_up(&mut self, sample: Option<&PointerSample>, host: &dyn DisplayContainer, fx: &mut EventEffects) {
        let style = self.shape_style();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.gesture().is_none() {
            return;
        }
        // touch releases carry no points; fall back to the last known one
        let at = sample.and_then(|s| session.map_pointer(s, host));
        fx.snapshot = session.finish_gesture(at, &style);
        fx.repaint = true;
    }

    fn commit_text(&mut self, fx: &mut EventEffects) {
        let [r, g, b] = self.tools.color().to_array();
        let anti_alias = self.settings.anti_alias;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.text_entry().is_none() {
            return;
        }
        let blank = session
            .text_entry()
            .is_some_and(|entry| entry.draft.trim().is_empty());
        let font = if blank {
            None
        } else {
            annotation_font(&self.settings.font_family)
        };
        fx.snapshot = session.commit_text(font, [r, g, b, 255], anti_alias);
        fx.repaint = fx.snapshot;
        fx.text_entry_closed = true;
        self.tools.select(Tool::Freehand);
        fx.cursor = Some(self.tools.cursor());
    }

    fn undo(&mut self, fx: &mut EventEffects) {
        // a pending entry is confirmed before history moves, like losing focus
        self.commit_text(fx);
        if let Some(session) = self.session.as_mut() {
            fx.restore_started = session.undo();
        }
    }

    fn redo(&mut self, fx: &mut EventEffects) {
        self.commit_text(fx);
        if let Some(session) = self.session.as_mut() {
            fx.restore_started = session.redo();
        }
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Put the flattened image on the clipboard (or the fallback viewer).
    pub fn copy_to_clipboard(
        &mut self,
        clipboard: &mut dyn ClipboardSink,
        fallback: &mut dyn FallbackViewer,
    ) -> ExportNotice {
        self.settle();
        let Some(session) = self.session.as_ref() else {
            return ExportNotice::Failed("No image to export".to_string());
        };
        copy_composite(session.source(), session.buffer(), clipboard, fallback)
    }

    /// Save the flattened image as a timestamped JPEG.
    pub fn save_export(&mut self, sink: &mut dyn DownloadSink, now: DateTime<Local>) -> ExportNotice {
        self.settle();
        let Some(session) = self.session.as_ref() else {
            return ExportNotice::Failed("No image to export".to_string());
        };
        match save_composite(
            session.source(),
            session.buffer(),
            self.settings.jpeg_quality,
            now,
            sink,
        ) {
            Ok(path) => ExportNotice::Saved(path),
            Err(e) => {
                log_err!("Save failed: {}", e);
                e.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{DisplayBox, FixedLayout};
    use crate::ops::shapes::ShapeKind;
    use image::{Rgba, RgbaImage};

    fn blank(w: u32, h: u32, name: &str) -> SourceImage {
        SourceImage::new(RgbaImage::from_pixel(w, h, Rgba([200, 200, 200, 255])), name)
    }

    fn annotator(w: u32, h: u32) -> (Annotator, FixedLayout) {
        let mut a = Annotator::new(AnnotateSettings::default(), 1.0);
        assert!(a.open_image(blank(w, h, "map")));
        (a, FixedLayout::sized(w as f32, h as f32))
    }

    fn down(x: f32, y: f32) -> InputEvent {
        InputEvent::PointerDown(PointerSample::mouse(x, y))
    }
    fn mv(x: f32, y: f32) -> InputEvent {
        InputEvent::PointerMove(PointerSample::mouse(x, y))
    }
    fn up(x: f32, y: f32) -> InputEvent {
        InputEvent::PointerUp(PointerSample::mouse(x, y))
    }

    fn pixels(a: &Annotator) -> RgbaImage {
        a.session().unwrap().buffer().pixels().clone()
    }

    #[test]
    fn freehand_band_scenario() {
        let (mut a, layout) = annotator(100, 100);
        a.dispatch(InputEvent::BrushSizeChanged(12), &layout);
        a.dispatch(InputEvent::ColorChanged(Rgb::from_hex("#f94144").unwrap()), &layout);
        a.dispatch(down(10.0, 10.0), &layout);
        let fx = a.dispatch(mv(10.0, 50.0), &layout);
        assert!(fx.repaint);
        let fx = a.dispatch(up(10.0, 50.0), &layout);
        assert!(fx.snapshot);

        let img = pixels(&a);
        assert_eq!(*img.get_pixel(10, 30), Rgba([0xf9, 0x41, 0x44, 255]));
        for (x, y) in [(30, 30), (10, 70), (90, 10)] {
            assert_eq!(img.get_pixel(x, y).0[3], 0);
        }
    }

    #[test]
    fn fill_scenario_covers_the_whole_buffer() {
        let (mut a, layout) = annotator(50, 50);
        a.dispatch(InputEvent::ToolSelected(Tool::Fill), &layout);
        a.dispatch(InputEvent::ColorChanged(Rgb::from_hex("#00ff00").unwrap()), &layout);
        let fx = a.dispatch(down(5.0, 5.0), &layout);
        assert!(fx.snapshot);
        assert!(pixels(&a).pixels().all(|p| *p == Rgba([0, 255, 0, 255])));

        // filling again is byte-identical and adds no entry
        let before = pixels(&a);
        let fx = a.dispatch(down(20.0, 20.0), &layout);
        assert!(!fx.snapshot);
        assert_eq!(pixels(&a), before);
        assert_eq!(a.session().unwrap().history().undo_count(), 2);
    }

    #[test]
    fn rectangle_outline_then_filled_with_modifier() {
        let (mut a, layout) = annotator(40, 40);
        a.dispatch(InputEvent::ToolSelected(Tool::Shape(ShapeKind::Rectangle)), &layout);
        a.dispatch(InputEvent::BrushSizeChanged(2), &layout);
        a.dispatch(down(0.0, 0.0), &layout);
        a.dispatch(mv(20.0, 10.0), &layout);
        assert!(a.session().unwrap().buffer().is_blank());
        a.dispatch(up(20.0, 10.0), &layout);
        let outline = pixels(&a);
        assert_eq!(outline.get_pixel(10, 5).0[3], 0);
        assert_eq!(outline.get_pixel(10, 0).0[3], 255);

        a.dispatch(InputEvent::ClearRequested, &layout);
        a.dispatch(InputEvent::ModifierChanged { fill: true }, &layout);
        a.dispatch(down(0.0, 0.0), &layout);
        a.dispatch(up(20.0, 10.0), &layout);
        let filled = pixels(&a);
        assert_eq!(filled.get_pixel(10, 5).0[3], 255);
        assert_eq!(filled.get_pixel(30, 30).0[3], 0);
    }

    #[test]
    fn new_snapshot_after_undo_drops_the_future() {
        let (mut a, layout) = annotator(30, 30);
        for y in [5.0, 15.0] {
            a.dispatch(down(2.0, y), &layout);
            a.dispatch(mv(28.0, y), &layout);
            a.dispatch(up(28.0, y), &layout);
        }
        assert!(a.dispatch(InputEvent::UndoRequested, &layout).restore_started);
        a.settle();
        a.dispatch(down(2.0, 25.0), &layout);
        a.dispatch(mv(28.0, 25.0), &layout);
        a.dispatch(up(28.0, 25.0), &layout);

        let fx = a.dispatch(InputEvent::RedoRequested, &layout);
        assert!(!fx.restore_started);
        let img = pixels(&a);
        assert_eq!(img.get_pixel(15, 15).0[3], 0);
        assert!(img.get_pixel(15, 25).0[3] > 0);
    }

    #[test]
    fn history_cap_bounds_how_far_undo_reaches() {
        let (mut a, layout) = annotator(60, 20);
        for i in 0..6 {
            let x = 5.0 + i as f32 * 10.0;
            a.dispatch(down(x, 2.0), &layout);
            a.dispatch(mv(x, 18.0), &layout);
            a.dispatch(up(x, 18.0), &layout);
        }
        assert_eq!(a.session().unwrap().history().undo_count(), 5);
        while a.dispatch(InputEvent::UndoRequested, &layout).restore_started {
            a.settle();
        }
        // the oldest retained state still holds the first two strokes
        let img = pixels(&a);
        assert!(img.get_pixel(5, 10).0[3] > 0);
        assert!(img.get_pixel(15, 10).0[3] > 0);
        assert_eq!(img.get_pixel(25, 10).0[3], 0);
    }

    #[test]
    fn gestures_wait_for_outstanding_restore() {
        let (mut a, layout) = annotator(20, 20);
        a.dispatch(down(2.0, 10.0), &layout);
        a.dispatch(mv(18.0, 10.0), &layout);
        a.dispatch(up(18.0, 10.0), &layout);

        a.dispatch(InputEvent::UndoRequested, &layout);
        let fx = a.dispatch(down(5.0, 5.0), &layout);
        assert!(fx.rejected);
        assert!(a.session().unwrap().gesture().is_none());

        a.settle();
        let fx = a.dispatch(down(5.0, 5.0), &layout);
        assert!(!fx.rejected);
        assert!(a.session().unwrap().gesture().is_some());
    }

    #[test]
    fn switching_images_never_resurrects_strokes() {
        let (mut a, layout) = annotator(20, 20);
        a.dispatch(down(2.0, 10.0), &layout);
        a.dispatch(mv(18.0, 10.0), &layout);
        a.dispatch(up(18.0, 10.0), &layout);
        assert!(!a.session().unwrap().buffer().is_blank());

        assert!(a.open_image(blank(30, 30, "other")));
        assert!(a.open_image(blank(20, 20, "map")));
        let session = a.session().unwrap();
        assert!(session.buffer().is_blank());
        assert_eq!(session.history().undo_count(), 1);
        assert!(!session.history().can_redo());
    }

    #[test]
    fn centre_maps_to_centre_at_any_density() {
        for density in [1.0, 1.5, 2.0, 3.0] {
            let mut a = Annotator::new(AnnotateSettings::default(), density);
            a.open_image(blank(64, 48, "d"));
            let layout = FixedLayout {
                image: DisplayBox::new(100.0, 40.0, 320.0, 240.0),
                container: DisplayBox::new(0.0, 0.0, 800.0, 600.0),
            };
            let session = a.session().unwrap();
            let p = session
                .map_pointer(&PointerSample::mouse(260.0, 160.0), &layout)
                .unwrap();
            assert_eq!(p.x, session.buffer().width() as f32 / 2.0);
            assert_eq!(p.y, session.buffer().height() as f32 / 2.0);
        }
    }

    #[test]
    fn cancel_acts_as_release() {
        let (mut a, layout) = annotator(40, 40);
        a.dispatch(InputEvent::ToolSelected(Tool::Shape(ShapeKind::Circle)), &layout);
        a.dispatch(down(20.0, 20.0), &layout);
        a.dispatch(mv(30.0, 20.0), &layout);
        let fx = a.dispatch(InputEvent::PointerCancel, &layout);
        assert!(fx.snapshot);
        assert!(a.session().unwrap().gesture().is_none());
        assert!(!a.session().unwrap().buffer().is_blank());
    }

    #[test]
    fn touch_uses_first_point() {
        let (mut a, layout) = annotator(40, 40);
        a.dispatch(InputEvent::ToolSelected(Tool::Fill), &layout);
        a.dispatch(InputEvent::ColorChanged(Rgb::new(0, 0, 255)), &layout);
        let touch = PointerSample::Touch(vec![(5.0, 5.0), (500.0, 500.0)]);
        assert!(a.dispatch(InputEvent::PointerDown(touch), &layout).snapshot);
    }

    #[test]
    fn selecting_a_tool_discards_text_and_previews() {
        let (mut a, layout) = annotator(40, 40);
        a.dispatch(InputEvent::ToolSelected(Tool::Text), &layout);
        let fx = a.dispatch(down(10.0, 10.0), &layout);
        assert!(fx.text_entry_opened);
        a.dispatch(InputEvent::TextDraft("Camp".into()), &layout);

        let fx = a.dispatch(InputEvent::ToolSelected(Tool::Fill), &layout);
        assert!(fx.text_entry_closed);
        assert_eq!(fx.cursor, Some(CursorStyle::Crosshair));
        assert!(a.session().unwrap().text_entry().is_none());
        assert!(a.session().unwrap().buffer().is_blank());
    }

    #[test]
    fn blank_text_commit_returns_to_freehand() {
        let (mut a, layout) = annotator(40, 40);
        a.dispatch(InputEvent::ToolSelected(Tool::Text), &layout);
        a.dispatch(down(10.0, 10.0), &layout);
        a.dispatch(InputEvent::TextDraft("  ".into()), &layout);
        let fx = a.dispatch(InputEvent::TextCommit, &layout);
        assert!(!fx.snapshot);
        assert!(fx.text_entry_closed);
        assert_eq!(a.tools().active(), Tool::Freehand);
        assert_eq!(a.session().unwrap().history().undo_count(), 1);
    }

    #[test]
    fn undo_with_pending_text_keeps_buffer_and_history_in_step() {
        let (mut a, layout) = annotator(60, 60);
        a.dispatch(down(2.0, 40.0), &layout);
        a.dispatch(mv(58.0, 40.0), &layout);
        a.dispatch(up(58.0, 40.0), &layout);
        a.dispatch(InputEvent::ToolSelected(Tool::Text), &layout);
        a.dispatch(down(5.0, 5.0), &layout);
        a.dispatch(InputEvent::TextDraft("Hello".into()), &layout);

        let fx = a.dispatch(InputEvent::UndoRequested, &layout);
        assert!(fx.text_entry_closed);
        assert!(fx.restore_started);
        let fx = a.dispatch(InputEvent::TextCommit, &layout);
        assert!(!fx.snapshot);
        a.settle();

        let session = a.session().unwrap();
        assert!(session.text_entry().is_none());
        assert!(session.history().can_redo());
        let latest = session.history().latest().unwrap().decode().unwrap();
        assert_eq!(&latest, session.buffer().pixels());
    }

    #[test]
    fn tool_choices_become_the_next_defaults() {
        let (mut a, layout) = annotator(10, 10);
        assert!(!a.remember_tool_defaults());
        a.dispatch(InputEvent::PresetColorSelected(4), &layout);
        a.dispatch(InputEvent::BrushSizeChanged(18), &layout);
        assert!(a.remember_tool_defaults());
        assert_eq!(a.settings().default_color, Rgb::new(0x43, 0xaa, 0x8b));
        assert_eq!(a.settings().default_brush_size, 18);
        assert!(!a.remember_tool_defaults());

        let next = Annotator::new(a.settings().clone(), 1.0);
        assert_eq!(next.tools().color(), Rgb::new(0x43, 0xaa, 0x8b));
        assert_eq!(next.tools().brush_size(), 18);
    }

    #[test]
    fn eraser_ring_is_overlay_only() {
        let (mut a, layout) = annotator(40, 40);
        a.dispatch(InputEvent::ToolSelected(Tool::Eraser), &layout);
        let fx = a.dispatch(mv(20.0, 20.0), &layout);
        assert!(fx.repaint);
        let session = a.session().unwrap();
        assert!(session.buffer().is_blank());
        assert!(session.overlay().pixels().pixels().any(|p| p.0[3] > 0));

        let fx = a.dispatch(InputEvent::PointerLeave, &layout);
        assert!(fx.repaint);
        let session = a.session().unwrap();
        assert_eq!(session.overlay().pixels(), session.buffer().pixels());
    }

    #[test]
    fn shortcuts_route_to_history() {
        let (mut a, layout) = annotator(20, 20);
        a.dispatch(down(2.0, 10.0), &layout);
        a.dispatch(mv(18.0, 10.0), &layout);
        a.dispatch(up(18.0, 10.0), &layout);
        let ctrl_z = InputEvent::Shortcut { key: 'z', command: true, shift: false };
        assert!(a.dispatch(ctrl_z, &layout).restore_started);
        let ctrl_shift_z = InputEvent::Shortcut { key: 'z', command: true, shift: true };
        assert!(a.dispatch(ctrl_shift_z, &layout).restore_started);
        a.settle();
        assert!(!a.session().unwrap().buffer().is_blank());
    }

    #[test]
    fn no_session_means_no_effects() {
        let mut a = Annotator::new(AnnotateSettings::default(), 1.0);
        let layout = FixedLayout::sized(10.0, 10.0);
        assert_eq!(a.dispatch(down(1.0, 1.0), &layout), EventEffects::default());
        let notice = a.copy_to_clipboard(
            &mut crate::ops::clipboard::SystemClipboard,
            &mut crate::ops::clipboard::TempFileViewer,
        );
        assert!(notice.is_error());
        assert!(!a.open_image(SourceImage::new(RgbaImage::new(0, 0), "empty")));
    }
}
