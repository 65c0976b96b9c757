use std::path::{Path, PathBuf};

use crate::canvas::{DEFAULT_STROKE_COLOR, Rgb};

/// Brush size selected when nothing else is configured.
pub const DEFAULT_BRUSH_SIZE: u32 = 9;
/// JPEG quality used for saved exports.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Annotation settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotateSettings {
    /// Stroke colour selected at startup
    pub default_color: Rgb,
    /// Swatches shown in the toolbar
    pub preset_colors: Vec<Rgb>,
    /// Brush size buttons
    pub brush_sizes: Vec<u32>,
    pub default_brush_size: u32,
    /// 1..=100
    pub jpeg_quality: u8,
    /// Where saved exports land; empty = the user's download folder
    pub export_dir: String,
    /// Font family for the text tool; empty = system sans-serif
    pub font_family: String,
    pub anti_alias: bool,
    /// Start each image with its own pixels in the annotation buffer
    pub seed_with_image: bool,
}

impl Default for AnnotateSettings {
    fn default() -> Self {
        Self {
            default_color: DEFAULT_STROKE_COLOR,
            preset_colors: [
                "#f94144", "#f8961e", "#f9c74f", "#90be6d", "#43aa8b", "#577590", "#000000",
                "#ffffff",
            ]
            .iter()
            .filter_map(|h| Rgb::from_hex(h))
            .collect(),
            brush_sizes: vec![3, 6, 9, 12, 18],
            default_brush_size: DEFAULT_BRUSH_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            export_dir: String::new(),
            font_family: String::new(),
            anti_alias: true,
            seed_with_image: false,
        }
    }
}

impl AnnotateSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/gallery-annotate/gallery-annotate.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\gallery-annotate\gallery-annotate.cfg
    /// On macOS:   ~/Library/Application Support/gallery-annotate/gallery-annotate.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        let base = std::env::var("APPDATA")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from);
        #[cfg(target_os = "macos")]
        let base = std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library").join("Application Support"));
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let base = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")));

        let config_dir = base?.join("gallery-annotate");
        let _ = std::fs::create_dir_all(&config_dir);
        Some(config_dir.join("gallery-annotate.cfg"))
    }

    /// Directory exports are written to.
    pub fn export_directory(&self) -> PathBuf {
        if !self.export_dir.trim().is_empty() {
            return PathBuf::from(self.export_dir.trim());
        }
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map(|h| PathBuf::from(h).join("Downloads"))
            .unwrap_or_else(|_| PathBuf::from("."))
    }

    fn list_to_str<T: ToString>(items: &[T]) -> String {
        items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
    }

    /// Serialize as `key=value` lines
    pub fn to_config(&self) -> String {
        let presets: Vec<String> = self.preset_colors.iter().map(Rgb::to_hex).collect();
        format!(
            "default_color={}\n\
             preset_colors={}\n\
             brush_sizes={}\n\
             default_brush_size={}\n\
             jpeg_quality={}\n\
             export_dir={}\n\
             font_family={}\n\
             anti_alias={}\n\
             seed_with_image={}\n",
            self.default_color.to_hex(),
            presets.join(","),
            Self::list_to_str(&self.brush_sizes),
            self.default_brush_size,
            self.jpeg_quality,
            self.export_dir,
            self.font_family,
            self.anti_alias,
            self.seed_with_image,
        )
    }

    /// Parse `key=value` lines. Unknown keys are ignored and malformed values
    /// keep their defaults.
    pub fn from_config(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "default_color" => {
                    if let Some(c) = Rgb::from_hex(val) {
                        s.default_color = c;
                    }
                }
                "preset_colors" => {
                    let colors: Vec<Rgb> = val.split(',').filter_map(|h| Rgb::from_hex(h.trim())).collect();
                    if !colors.is_empty() {
                        s.preset_colors = colors;
                    }
                }
                "brush_sizes" => {
                    let sizes: Vec<u32> = val
                        .split(',')
                        .filter_map(|v| v.trim().parse().ok())
                        .filter(|&v| v > 0)
                        .collect();
                    if !sizes.is_empty() {
                        s.brush_sizes = sizes;
                    }
                }
                "default_brush_size" => {
                    s.default_brush_size = val.parse().ok().filter(|&v| v > 0).unwrap_or(DEFAULT_BRUSH_SIZE);
                }
                "jpeg_quality" => {
                    s.jpeg_quality = val
                        .parse::<u8>()
                        .ok()
                        .filter(|q| (1..=100).contains(q))
                        .unwrap_or(DEFAULT_JPEG_QUALITY);
                }
                "export_dir" => {
                    s.export_dir = val.to_string();
                }
                "font_family" => {
                    s.font_family = val.to_string();
                }
                "anti_alias" => {
                    s.anti_alias = val == "true";
                }
                "seed_with_image" => {
                    s.seed_with_image = val == "true";
                }
                _ => {}
            }
        }
        s
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log_warn!("Failed to save settings: {}", e);
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| format!("{}: {}", parent.display(), e))?;
        }
        std::fs::write(path, self.to_config()).map_err(|e| format!("{}: {}", path.display(), e))
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::from_config(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_survives_a_save_load_cycle() {
        let mut s = AnnotateSettings::default();
        s.jpeg_quality = 70;
        s.brush_sizes = vec![2, 4];
        s.export_dir = "/tmp/maps".into();
        s.seed_with_image = true;
        assert_eq!(AnnotateSettings::from_config(&s.to_config()), s);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let s = AnnotateSettings::from_config(
            "jpeg_quality=0\n\
             default_brush_size=-3\n\
             default_color=not-a-colour\n\
             brush_sizes=a,b\n\
             garbage line\n\
             unknown_key=1\n",
        );
        let d = AnnotateSettings::default();
        assert_eq!(s.jpeg_quality, DEFAULT_JPEG_QUALITY);
        assert_eq!(s.default_brush_size, DEFAULT_BRUSH_SIZE);
        assert_eq!(s.default_color, d.default_color);
        assert_eq!(s.brush_sizes, d.brush_sizes);
    }

    #[test]
    fn preset_list_skips_bad_entries() {
        let s = AnnotateSettings::from_config("preset_colors=#000000, nope ,#fff\n");
        assert_eq!(s.preset_colors, vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)]);
    }

    #[test]
    fn saved_file_loads_back() {
        let dir = std::env::temp_dir().join(format!("gallery-annotate-cfg-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("gallery-annotate.cfg");
        let mut s = AnnotateSettings::default();
        s.default_brush_size = 18;
        s.default_color = Rgb::new(0x43, 0xaa, 0x8b);
        s.save_to(&path).unwrap();
        assert_eq!(AnnotateSettings::load_from(&path), s);
        assert_eq!(AnnotateSettings::load_from(&dir.join("missing.cfg")), AnnotateSettings::default());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn explicit_export_dir_wins() {
        let mut s = AnnotateSettings::default();
        s.export_dir = " /srv/out ".into();
        assert_eq!(s.export_directory(), PathBuf::from("/srv/out"));
    }
}
