use anyhow::Context;
use chrono::Local;
use egui::{Color32, ColorImage, CursorIcon, Pos2, Rect, Sense, TextureHandle, TextureOptions, Vec2};
use std::path::{Path, PathBuf};

use crate::annotator::{Annotator, EventEffects, InputEvent};
use crate::canvas::{DisplayBox, DisplayContainer, PointerSample, Rgb};
use crate::components::tools::{CursorStyle, Tool};
use crate::io::{DirectoryDownloads, SourceImage, load_source_image, pick_images};
use crate::ops::clipboard::{ExportNotice, SystemClipboard, TempFileViewer};
use crate::settings::AnnotateSettings;

/// Seconds a status notice stays visible.
const NOTICE_SECONDS: f64 = 4.0;

// ============================================================================
// LAYOUT — egui rects reported through DisplayContainer
// ============================================================================

/// Where the image sits this frame, in egui points.
#[derive(Clone, Copy, Debug, PartialEq)]
struct EguiLayout {
    image: Rect,
    container: Rect,
}

fn to_display_box(r: Rect) -> DisplayBox {
    DisplayBox::new(r.left(), r.top(), r.width(), r.height())
}

impl DisplayContainer for EguiLayout {
    fn image_box(&self) -> DisplayBox {
        to_display_box(self.image)
    }

    fn container_box(&self) -> DisplayBox {
        to_display_box(self.container)
    }
}

/// Largest rect with the image's aspect ratio that fits `avail`, centred.
/// Never upscales past the natural size.
fn fit_rect(avail: Rect, natural: (u32, u32)) -> Rect {
    let (w, h) = (natural.0.max(1) as f32, natural.1.max(1) as f32);
    let scale = (avail.width() / w).min(avail.height() / h).min(1.0).max(0.0);
    Rect::from_center_size(avail.center(), Vec2::new(w * scale, h * scale))
}

fn color_image(img: &image::RgbaImage) -> ColorImage {
    ColorImage::from_rgba_unmultiplied([img.width() as usize, img.height() as usize], img.as_raw())
}

fn open_source(path: &Path) -> anyhow::Result<SourceImage> {
    load_source_image(path)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("opening {}", path.display()))
}

// ============================================================================
// APP
// ============================================================================

pub struct AnnotateApp {
    annotator: Annotator,
    /// Gallery being browsed; `current` indexes into it.
    paths: Vec<PathBuf>,
    current: usize,

    source_texture: Option<TextureHandle>,
    overlay_texture: Option<TextureHandle>,
    overlay_generation: u64,

    layout: Option<EguiLayout>,
    density: f32,
    pointer_captured: bool,
    last_pointer: Option<Pos2>,
    over_image: bool,
    shift_held: bool,

    text_draft: String,
    focus_text: bool,
    notice: Option<(ExportNotice, f64)>,
    first_frame: bool,
}

impl AnnotateApp {
    pub fn new(cc: &eframe::CreationContext<'_>, paths: Vec<PathBuf>) -> Self {
        let settings = AnnotateSettings::load();
        let density = cc.egui_ctx.pixels_per_point();
        log_info!("Viewer started: {} image(s), density {:.2}", paths.len(), density);
        Self {
            annotator: Annotator::new(settings, density),
            paths,
            current: 0,
            source_texture: None,
            overlay_texture: None,
            overlay_generation: u64::MAX,
            layout: None,
            density,
            pointer_captured: false,
            last_pointer: None,
            over_image: false,
            shift_held: false,
            text_draft: String::new(),
            focus_text: false,
            notice: None,
            first_frame: true,
        }
    }

    fn notify(&mut self, ctx: &egui::Context, notice: ExportNotice) {
        if notice.is_error() {
            log_warn!("{}", notice.message());
        }
        self.notice = Some((notice, ctx.input(|i| i.time)));
    }

    /// Forward one event and react to what it changed.
    fn send(&mut self, ctx: &egui::Context, event: InputEvent) -> EventEffects {
        // tool changes still apply before an image is laid out
        let layout = self.layout.unwrap_or(EguiLayout {
            image: Rect::ZERO,
            container: Rect::ZERO,
        });
        let fx = self.annotator.dispatch(event, &layout);
        if fx.text_entry_opened {
            self.text_draft.clear();
            self.focus_text = true;
        }
        if fx.text_entry_closed {
            self.text_draft.clear();
        }
        if fx.repaint || fx.restore_started {
            ctx.request_repaint();
        }
        fx
    }

    /// Persist colour and brush so the next launch starts with them.
    fn remember_choices(&mut self) {
        if self.annotator.remember_tool_defaults() {
            self.annotator.settings().save();
        }
    }

    // ------------------------------------------------------------------
    // Gallery navigation
    // ------------------------------------------------------------------

    fn open_index(&mut self, ctx: &egui::Context, index: usize) {
        let Some(path) = self.paths.get(index).cloned() else {
            return;
        };
        self.current = index;
        self.pointer_captured = false;
        self.text_draft.clear();
        self.layout = None;
        self.source_texture = None;
        self.overlay_texture = None;
        self.overlay_generation = u64::MAX;

        match open_source(&path) {
            Ok(source) => {
                self.source_texture = Some(ctx.load_texture(
                    "source_image",
                    color_image(&source.pixels),
                    TextureOptions::LINEAR,
                ));
                self.annotator.set_density(self.density);
                let name = source.name.clone();
                if !self.annotator.open_image(source) {
                    self.notify(ctx, ExportNotice::Failed(format!("{} has no pixels", name)));
                }
                ctx.send_viewport_cmd(egui::ViewportCommand::Title(format!("Gallery Annotate - {}", name)));
            }
            Err(e) => {
                self.annotator.close();
                log_err!("{:#}", e);
                self.notify(ctx, ExportNotice::Failed(format!("{:#}", e)));
            }
        }
    }

    fn step(&mut self, ctx: &egui::Context, delta: isize) {
        if self.paths.is_empty() {
            return;
        }
        let len = self.paths.len() as isize;
        let next = (self.current as isize + delta).rem_euclid(len) as usize;
        self.open_index(ctx, next);
    }

    fn add_paths(&mut self, ctx: &egui::Context, picked: Vec<PathBuf>) {
        if picked.is_empty() {
            return;
        }
        let first_new = self.paths.len();
        self.paths.extend(picked);
        self.open_index(ctx, first_new);
    }

    // ------------------------------------------------------------------
    // Toolbar
    // ------------------------------------------------------------------

    fn toolbar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                if ui.button("Open…").clicked() {
                    let picked = pick_images();
                    self.add_paths(ctx, picked);
                }
                ui.add_enabled_ui(self.paths.len() > 1, |ui| {
                    if ui.button("◀").on_hover_text("Previous image").clicked() {
                        self.step(ctx, -1);
                    }
                    if ui.button("▶").on_hover_text("Next image").clicked() {
                        self.step(ctx, 1);
                    }
                });
                ui.separator();

                let active = self.annotator.tools().active();
                for tool in Tool::all() {
                    if ui.selectable_label(active == tool, tool.label()).clicked() {
                        self.send(ctx, InputEvent::ToolSelected(tool));
                    }
                }
                ui.separator();

                let presets = self.annotator.settings().preset_colors.clone();
                let selected = self.annotator.tools().selected_preset();
                for (i, color) in presets.iter().enumerate() {
                    let [r, g, b] = color.to_array();
                    let (rect, resp) = ui.allocate_exact_size(Vec2::splat(18.0), Sense::click());
                    let stroke = if selected == Some(i) {
                        egui::Stroke::new(2.0, ui.visuals().selection.stroke.color)
                    } else {
                        egui::Stroke::new(1.0, Color32::GRAY)
                    };
                    ui.painter().rect(rect, 3.0, Color32::from_rgb(r, g, b), stroke);
                    if resp.on_hover_text(color.to_hex()).clicked() {
                        self.send(ctx, InputEvent::PresetColorSelected(i));
                        self.remember_choices();
                    }
                }
                let mut rgb = self.annotator.tools().color().to_array();
                if ui.color_edit_button_srgb(&mut rgb).changed() {
                    self.send(ctx, InputEvent::ColorChanged(Rgb::new(rgb[0], rgb[1], rgb[2])));
                    self.remember_choices();
                }
                ui.separator();

                let sizes = self.annotator.settings().brush_sizes.clone();
                let current = self.annotator.tools().brush_size();
                for size in sizes {
                    if ui.selectable_label(current == size, format!("{}px", size)).clicked() {
                        self.send(ctx, InputEvent::BrushSizeChanged(size));
                        self.remember_choices();
                    }
                }
                ui.separator();

                let (can_undo, can_redo) = self
                    .annotator
                    .session()
                    .map(|s| (s.history().can_undo(), s.history().can_redo()))
                    .unwrap_or((false, false));
                if ui.add_enabled(can_undo, egui::Button::new("Undo")).clicked() {
                    self.send(ctx, InputEvent::UndoRequested);
                }
                if ui.add_enabled(can_redo, egui::Button::new("Redo")).clicked() {
                    self.send(ctx, InputEvent::RedoRequested);
                }
                let has_session = self.annotator.session().is_some();
                if ui.add_enabled(has_session, egui::Button::new("Clear")).clicked() {
                    self.send(ctx, InputEvent::ClearRequested);
                }
                ui.separator();

                if ui.add_enabled(has_session, egui::Button::new("Copy")).clicked() {
                    let notice = self
                        .annotator
                        .copy_to_clipboard(&mut SystemClipboard, &mut TempFileViewer);
                    self.notify(ctx, notice);
                }
                if ui.add_enabled(has_session, egui::Button::new("Save")).clicked() {
                    let mut sink = DirectoryDownloads::new(self.annotator.settings().export_directory());
                    let notice = self.annotator.save_export(&mut sink, Local::now());
                    self.notify(ctx, notice);
                }
            });
        });
    }

    fn status_bar(&mut self, ctx: &egui::Context) {
        let now = ctx.input(|i| i.time);
        if self
            .notice
            .as_ref()
            .is_some_and(|(_, shown)| now - shown > NOTICE_SECONDS)
        {
            self.notice = None;
        }
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(session) = self.annotator.session() {
                    ui.label(format!(
                        "{}  ({}/{})",
                        session.source().name,
                        self.current + 1,
                        self.paths.len()
                    ));
                    let (w, h) = session.source().natural_size();
                    ui.label(format!("{}×{}", w, h));
                    if session.is_restoring() {
                        ui.spinner();
                    }
                }
                if let Some((notice, _)) = &self.notice {
                    let color = if notice.is_error() {
                        Color32::from_rgb(0xf9, 0x41, 0x44)
                    } else {
                        ui.visuals().text_color()
                    };
                    ui.colored_label(color, notice.message());
                }
            });
        });
    }

    // ------------------------------------------------------------------
    // Canvas
    // ------------------------------------------------------------------

    fn canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let container = ui.max_rect();
            let Some(natural) = self.annotator.session().map(|s| s.source().natural_size()) else {
                ui.centered_and_justified(|ui| {
                    ui.label("Open or drop map images to annotate them.");
                });
                return;
            };

            let image_rect = fit_rect(container, natural);
            let (_, response) = ui.allocate_exact_size(container.size(), Sense::click_and_drag());
            let layout = EguiLayout { image: image_rect, container };
            if self.layout != Some(layout) {
                self.layout = Some(layout);
                self.send(ctx, InputEvent::LayoutChanged);
            }

            self.pointer_events(ctx, &response);
            self.upload_overlay(ctx);

            let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
            let painter = ui.painter_at(container);
            if let Some(tex) = &self.source_texture {
                painter.image(tex.id(), image_rect, uv, Color32::WHITE);
            }
            if let (Some(tex), Some(session)) = (&self.overlay_texture, self.annotator.session()) {
                let p = session.overlay().placement();
                let rect = Rect::from_min_size(
                    Pos2::new(container.left() + p.left, container.top() + p.top),
                    Vec2::new(p.width, p.height),
                );
                painter.image(tex.id(), rect, uv, Color32::WHITE);
            }

            if response.hovered() {
                self.paint_cursor(ctx, &painter, image_rect);
            }
        });
    }

    fn pointer_events(&mut self, ctx: &egui::Context, response: &egui::Response) {
        let (pressed, released, down, pos) = ctx.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.primary_down(),
                i.pointer.interact_pos().or(i.pointer.hover_pos()),
            )
        });
        let sample = pos.map(|p| PointerSample::mouse(p.x, p.y));
        let over_image = response.hovered()
            && pos
                .zip(self.layout)
                .is_some_and(|(p, layout)| layout.image.contains(p));
        if self.over_image && !over_image && !self.pointer_captured {
            self.send(ctx, InputEvent::PointerLeave);
        }
        self.over_image = over_image;

        if pressed
            && response.hovered()
            && let Some(s) = sample.clone()
        {
            let fx = self.send(ctx, InputEvent::PointerDown(s));
            self.pointer_captured = !fx.rejected && !fx.text_entry_opened;
            self.last_pointer = pos;
            return;
        }

        if pos != self.last_pointer
            && (self.pointer_captured || over_image)
            && let Some(s) = sample.clone()
        {
            self.send(ctx, InputEvent::PointerMove(s));
        }
        self.last_pointer = pos;

        if self.pointer_captured {
            if released {
                self.pointer_captured = false;
                match sample {
                    Some(s) => self.send(ctx, InputEvent::PointerUp(s)),
                    None => self.send(ctx, InputEvent::PointerCancel),
                };
            } else if !down {
                // release happened outside the window
                self.pointer_captured = false;
                self.send(ctx, InputEvent::PointerCancel);
            }
        }
    }

    fn upload_overlay(&mut self, ctx: &egui::Context) {
        let Some(session) = self.annotator.session() else {
            return;
        };
        let generation = session.overlay().generation();
        if generation == self.overlay_generation && self.overlay_texture.is_some() {
            return;
        }
        let image = color_image(session.overlay().pixels());
        match &mut self.overlay_texture {
            Some(tex) => tex.set(image, TextureOptions::LINEAR),
            None => {
                self.overlay_texture = Some(ctx.load_texture("annotation_overlay", image, TextureOptions::LINEAR))
            }
        }
        self.overlay_generation = generation;
    }

    fn paint_cursor(&self, ctx: &egui::Context, painter: &egui::Painter, image_rect: Rect) {
        let hover = ctx.input(|i| i.pointer.hover_pos());
        match self.annotator.tools().cursor() {
            CursorStyle::Circle { diameter } => {
                if let Some(p) = hover
                    && image_rect.contains(p)
                {
                    ctx.set_cursor_icon(CursorIcon::None);
                    if !self.annotator.tools().is_erasing() {
                        let [r, g, b] = self.annotator.tools().color().to_array();
                        painter.circle_stroke(p, diameter * 0.5, egui::Stroke::new(1.0, Color32::from_rgb(r, g, b)));
                    }
                }
            }
            CursorStyle::Crosshair => ctx.set_cursor_icon(CursorIcon::Crosshair),
            CursorStyle::Text => ctx.set_cursor_icon(CursorIcon::Text),
        }
    }

    // ------------------------------------------------------------------
    // Inline text entry
    // ------------------------------------------------------------------

    fn text_entry(&mut self, ctx: &egui::Context) {
        let Some(entry) = self.annotator.session().and_then(|s| s.text_entry()).cloned() else {
            return;
        };
        let [r, g, b] = self.annotator.tools().color().to_array();
        let mut draft = std::mem::take(&mut self.text_draft);
        let mut commit = false;
        let mut cancel = false;

        egui::Area::new("text_entry")
            .fixed_pos(Pos2::new(entry.client_anchor.0, entry.client_anchor.1))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                let edit = egui::TextEdit::singleline(&mut draft)
                    .font(egui::FontId::proportional(entry.display_size))
                    .text_color(Color32::from_rgb(r, g, b))
                    .frame(true)
                    .desired_width(entry.display_size * 12.0);
                let resp = ui.add(edit);
                if self.focus_text {
                    resp.request_focus();
                    self.focus_text = false;
                }
                if ui.input(|i| i.key_pressed(egui::Key::Escape)) {
                    cancel = true;
                } else if resp.lost_focus() {
                    // Enter or clicking elsewhere both confirm
                    commit = true;
                }
            });

        if draft != entry.draft {
            self.send(ctx, InputEvent::TextDraft(draft.clone()));
        }
        self.text_draft = draft;
        if cancel {
            self.send(ctx, InputEvent::TextCancel);
        } else if commit {
            self.send(ctx, InputEvent::TextCommit);
        }
    }

    // ------------------------------------------------------------------
    // Keyboard
    // ------------------------------------------------------------------

    fn keyboard(&mut self, ctx: &egui::Context) {
        let shift = ctx.input(|i| i.modifiers.shift);
        if shift != self.shift_held {
            self.shift_held = shift;
            self.send(ctx, InputEvent::ModifierChanged { fill: shift });
        }

        let typing = self.annotator.session().is_some_and(|s| s.text_entry().is_some());
        if typing {
            return;
        }
        let (command, z, y, left, right) = ctx.input(|i| {
            (
                i.modifiers.command,
                i.key_pressed(egui::Key::Z),
                i.key_pressed(egui::Key::Y),
                i.key_pressed(egui::Key::ArrowLeft),
                i.key_pressed(egui::Key::ArrowRight),
            )
        });
        if z {
            self.send(ctx, InputEvent::Shortcut { key: 'z', command, shift });
        }
        if y {
            self.send(ctx, InputEvent::Shortcut { key: 'y', command, shift });
        }
        if left {
            self.step(ctx, -1);
        }
        if right {
            self.step(ctx, 1);
        }
    }
}

impl eframe::App for AnnotateApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.first_frame {
            self.first_frame = false;
            if !self.paths.is_empty() {
                self.open_index(ctx, 0);
            }
        }

        // --- Density changes (window moved to another monitor) apply to the next image ---
        let ppp = ctx.pixels_per_point();
        if (ppp - self.density).abs() > f32::EPSILON {
            self.density = ppp;
            self.annotator.set_density(ppp);
        }

        // --- Dropped files join the gallery ---
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });
        self.add_paths(ctx, dropped);

        // --- Finished undo/redo decodes ---
        if self.annotator.poll_restore() {
            ctx.request_repaint();
        }
        if self.annotator.session().is_some_and(|s| s.is_restoring()) {
            ctx.request_repaint();
        }

        self.keyboard(ctx);
        self.toolbar(ctx);
        self.status_bar(ctx);
        self.canvas(ctx);
        self.text_entry(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_rect_keeps_aspect_and_centres() {
        let avail = Rect::from_min_size(Pos2::new(0.0, 0.0), Vec2::new(400.0, 400.0));
        let r = fit_rect(avail, (800, 400));
        assert_eq!(r.size(), Vec2::new(400.0, 200.0));
        assert_eq!(r.center(), avail.center());
    }

    #[test]
    fn fit_rect_never_upscales() {
        let avail = Rect::from_min_size(Pos2::new(10.0, 10.0), Vec2::new(1000.0, 1000.0));
        let r = fit_rect(avail, (100, 50));
        assert_eq!(r.size(), Vec2::new(100.0, 50.0));
    }

    #[test]
    fn layout_reports_both_boxes() {
        let layout = EguiLayout {
            image: Rect::from_min_size(Pos2::new(30.0, 40.0), Vec2::new(100.0, 50.0)),
            container: Rect::from_min_size(Pos2::new(0.0, 20.0), Vec2::new(200.0, 200.0)),
        };
        assert_eq!(layout.image_box(), DisplayBox::new(30.0, 40.0, 100.0, 50.0));
        assert_eq!(layout.container_box(), DisplayBox::new(0.0, 20.0, 200.0, 200.0));
    }
}
