use crate::canvas::Rgb;
use crate::ops::shapes::{PaintMode, ShapeKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Freehand,
    /// Freehand with destination-clearing instead of colour.
    Eraser,
    Fill,
    Shape(ShapeKind),
    Text,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Freehand => "Free",
            Tool::Eraser => "Eraser",
            Tool::Fill => "Fill",
            Tool::Shape(kind) => kind.label(),
            Tool::Text => "Text",
        }
    }

    /// Tools in toolbar order.
    pub fn all() -> Vec<Tool> {
        let mut tools = vec![Tool::Freehand, Tool::Eraser, Tool::Fill];
        tools.extend(ShapeKind::all().iter().copied().map(Tool::Shape));
        tools.push(Tool::Text);
        tools
    }

    /// Parse a tool name as used in event scripts.
    pub fn from_name(name: &str) -> Option<Tool> {
        let tool = match name.trim().to_ascii_lowercase().as_str() {
            "free" | "freehand" | "brush" => Tool::Freehand,
            "eraser" | "erase" => Tool::Eraser,
            "fill" => Tool::Fill,
            "circle" => Tool::Shape(ShapeKind::Circle),
            "rectangle" | "rect" => Tool::Shape(ShapeKind::Rectangle),
            "triangle" => Tool::Shape(ShapeKind::Triangle),
            "hexagon" => Tool::Shape(ShapeKind::Hexagon),
            "star" => Tool::Shape(ShapeKind::Star),
            "text" => Tool::Text,
            _ => return None,
        };
        Some(tool)
    }
}

/// Pointer indicator the host should show over the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CursorStyle {
    /// Circle of the brush diameter in display pixels.
    Circle { diameter: f32 },
    Crosshair,
    Text,
}

/// Keyboard shortcuts handled by the annotator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shortcut {
    Undo,
    Redo,
}

/// Map a key press to a shortcut. `command` is Ctrl (or Cmd on macOS).
pub fn shortcut_for(key: char, command: bool, shift: bool) -> Option<Shortcut> {
    if !command {
        return None;
    }
    match key.to_ascii_lowercase() {
        'z' if shift => Some(Shortcut::Redo),
        'z' => Some(Shortcut::Undo),
        'y' => Some(Shortcut::Redo),
        _ => None,
    }
}

// ============================================================================
// TOOL STATE
// ============================================================================

/// Active tool, colour and brush. Owned by the annotator and read at the
/// moment each input event is handled.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolState {
    active: Tool,
    color: Rgb,
    brush_size: u32,
    fill_modifier: bool,
    selected_preset: Option<usize>,
}

impl ToolState {
    pub fn new(color: Rgb, brush_size: u32) -> Self {
        Self {
            active: Tool::Freehand,
            color,
            brush_size: brush_size.max(1),
            fill_modifier: false,
            selected_preset: None,
        }
    }

    pub fn active(&self) -> Tool {
        self.active
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn brush_size(&self) -> u32 {
        self.brush_size
    }

    pub fn fill_modifier(&self) -> bool {
        self.fill_modifier
    }

    pub fn selected_preset(&self) -> Option<usize> {
        self.selected_preset
    }

    pub fn is_erasing(&self) -> bool {
        self.active == Tool::Eraser
    }

    /// Activate `tool` and return the tool that ended up active. Picking the
    /// eraser while it is already active toggles back to freehand.
    pub fn select(&mut self, tool: Tool) -> Tool {
        self.active = match (self.active, tool) {
            (Tool::Eraser, Tool::Eraser) => Tool::Freehand,
            (_, t) => t,
        };
        self.active
    }

    /// Manual colour pick. Clears the preset highlight, keeps the tool.
    pub fn set_color(&mut self, color: Rgb) {
        self.color = color;
        self.selected_preset = None;
    }

    /// Preset swatch pick. Returns `false` for an unknown index.
    pub fn select_preset(&mut self, index: usize, presets: &[Rgb]) -> bool {
        let Some(&color) = presets.get(index) else {
            return false;
        };
        self.color = color;
        self.selected_preset = Some(index);
        true
    }

    /// Sizes are positive; zero is raised to 1.
    pub fn set_brush_size(&mut self, size: u32) {
        self.brush_size = size.max(1);
    }

    pub fn set_fill_modifier(&mut self, held: bool) {
        self.fill_modifier = held;
    }

    /// Line width in buffer pixels.
    pub fn stroke_width(&self, density: f32) -> f32 {
        self.brush_size as f32 * density
    }

    /// How freehand pixels are written.
    pub fn paint_mode(&self) -> PaintMode {
        if self.is_erasing() {
            PaintMode::Erase
        } else {
            let [r, g, b] = self.color.to_array();
            PaintMode::Paint([r, g, b, 255])
        }
    }

    /// Font size of the inline text entry in display pixels.
    pub fn text_display_size(&self) -> f32 {
        self.brush_size as f32 * 3.0
    }

    pub fn cursor(&self) -> CursorStyle {
        match self.active {
            Tool::Freehand | Tool::Eraser => CursorStyle::Circle {
                diameter: self.brush_size as f32,
            },
            Tool::Fill | Tool::Shape(_) => CursorStyle::Crosshair,
            Tool::Text => CursorStyle::Text,
        }
    }
}

impl Default for ToolState {
    fn default() -> Self {
        Self::new(crate::canvas::DEFAULT_STROKE_COLOR, crate::settings::DEFAULT_BRUSH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eraser_toggles_back_to_freehand() {
        let mut tools = ToolState::default();
        tools.select(Tool::Shape(ShapeKind::Star));
        assert_eq!(tools.select(Tool::Eraser), Tool::Eraser);
        assert_eq!(tools.paint_mode(), PaintMode::Erase);
        assert_eq!(tools.select(Tool::Eraser), Tool::Freehand);
        assert!(!tools.is_erasing());
    }

    #[test]
    fn manual_colour_clears_preset_selection() {
        let presets = [Rgb::new(0, 0, 0), Rgb::new(1, 2, 3)];
        let mut tools = ToolState::default();
        tools.select(Tool::Fill);
        assert!(tools.select_preset(1, &presets));
        assert_eq!(tools.selected_preset(), Some(1));
        assert_eq!(tools.color(), Rgb::new(1, 2, 3));

        tools.set_color(Rgb::new(9, 9, 9));
        assert_eq!(tools.selected_preset(), None);
        assert_eq!(tools.active(), Tool::Fill);
        assert!(!tools.select_preset(5, &presets));
        assert_eq!(tools.color(), Rgb::new(9, 9, 9));
    }

    #[test]
    fn cursor_follows_tool() {
        let mut tools = ToolState::new(Rgb::new(0, 0, 0), 12);
        assert_eq!(tools.cursor(), CursorStyle::Circle { diameter: 12.0 });
        tools.select(Tool::Shape(ShapeKind::Circle));
        assert_eq!(tools.cursor(), CursorStyle::Crosshair);
        tools.select(Tool::Fill);
        assert_eq!(tools.cursor(), CursorStyle::Crosshair);
        tools.select(Tool::Text);
        assert_eq!(tools.cursor(), CursorStyle::Text);
    }

    #[test]
    fn brush_size_is_positive_and_scaled() {
        let mut tools = ToolState::default();
        tools.set_brush_size(0);
        assert_eq!(tools.brush_size(), 1);
        tools.set_brush_size(12);
        assert_eq!(tools.stroke_width(2.0), 24.0);
        assert_eq!(tools.text_display_size(), 36.0);
    }

    #[test]
    fn shortcuts() {
        assert_eq!(shortcut_for('z', true, false), Some(Shortcut::Undo));
        assert_eq!(shortcut_for('Z', true, true), Some(Shortcut::Redo));
        assert_eq!(shortcut_for('y', true, false), Some(Shortcut::Redo));
        assert_eq!(shortcut_for('z', false, false), None);
        assert_eq!(shortcut_for('x', true, false), None);
    }

    #[test]
    fn tool_names_parse() {
        assert_eq!(Tool::from_name("Rect"), Some(Tool::Shape(ShapeKind::Rectangle)));
        assert_eq!(Tool::from_name("free"), Some(Tool::Freehand));
        assert_eq!(Tool::from_name("lasso"), None);
        assert_eq!(Tool::all().len(), 9);
    }
}
