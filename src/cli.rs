// ============================================================================
// gallery-annotate CLI — headless replay of annotation scripts
// ============================================================================
//
// Usage examples:
//   gallery-annotate -i map.png --events marks.json --output marked.png
//   gallery-annotate -i maps/*.jpg --events route.json --output-dir out/ --format jpeg
//   gallery-annotate -i map.png --events marks.json --display 800x600 --density 2
//   gallery-annotate -i map.png --events marks.json --copy
//
// An event script is a JSON array of steps, replayed against a fresh session
// for every input image. Pointer coordinates are in display pixels of an
// image box of size --display (defaults to the image's natural size).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use serde::Deserialize;

use crate::annotator::{Annotator, InputEvent};
use crate::canvas::{FixedLayout, PointerSample, Rgb};
use crate::components::tools::Tool;
use crate::io::{ExportFormat, composite, encode, load_source_image};
use crate::ops::clipboard::{SystemClipboard, TempFileViewer};
use crate::settings::AnnotateSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// gallery-annotate headless annotator.
///
/// Replays recorded annotation events on map images and writes the flattened result.
#[derive(Parser, Debug)]
#[command(
    name = "gallery-annotate",
    about = "Headless map annotation: replay an event script onto images",
    long_about = "Replay a JSON event script (strokes, shapes, fills, text, undo/redo)\n\
                  onto one or more images without opening the viewer, then write the\n\
                  flattened result as PNG or JPEG.\n\n\
                  Example:\n  \
                  gallery-annotate --input map.png --events marks.json --output marked.png\n  \
                  gallery-annotate -i maps/*.jpg --events route.json --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "maps/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// JSON event script replayed on each input image.
    #[arg(short, long, value_name = "SCRIPT.json")]
    pub events: PathBuf,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png or jpeg. Inferred from --output's extension when omitted.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100). Defaults to the configured export quality.
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// Buffer pixel density (device pixel ratio), default 1.
    #[arg(long, default_value_t = 1.0, value_name = "RATIO")]
    pub density: f32,

    /// Displayed image size the script coordinates refer to, e.g. 800x600.
    #[arg(long, value_name = "WxH")]
    pub display: Option<String>,

    /// Also copy the (last) result to the system clipboard.
    #[arg(long)]
    pub copy: bool,

    /// Print per-step effects and per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Event scripts
// ============================================================================

/// One step of an event script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptStep {
    Tool { name: String },
    Color { hex: String },
    Preset { index: usize },
    Brush { size: u32 },
    Modifier { fill: bool },
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up { x: f32, y: f32 },
    Cancel,
    Leave,
    /// Click with the text tool, type `value` and confirm.
    Text { x: f32, y: f32, value: String },
    Undo,
    Redo,
    Clear,
}

impl ScriptStep {
    /// Translate into annotator input.
    pub fn to_events(&self) -> Result<Vec<InputEvent>, String> {
        let events = match self {
            ScriptStep::Tool { name } => {
                let tool = Tool::from_name(name).ok_or_else(|| format!("unknown tool '{}'", name))?;
                vec![InputEvent::ToolSelected(tool)]
            }
            ScriptStep::Color { hex } => {
                let color = Rgb::from_hex(hex).ok_or_else(|| format!("invalid colour '{}'", hex))?;
                vec![InputEvent::ColorChanged(color)]
            }
            ScriptStep::Preset { index } => vec![InputEvent::PresetColorSelected(*index)],
            ScriptStep::Brush { size } => vec![InputEvent::BrushSizeChanged(*size)],
            ScriptStep::Modifier { fill } => vec![InputEvent::ModifierChanged { fill: *fill }],
            ScriptStep::Down { x, y } => vec![InputEvent::PointerDown(PointerSample::mouse(*x, *y))],
            ScriptStep::Move { x, y } => vec![InputEvent::PointerMove(PointerSample::mouse(*x, *y))],
            ScriptStep::Up { x, y } => vec![InputEvent::PointerUp(PointerSample::mouse(*x, *y))],
            ScriptStep::Cancel => vec![InputEvent::PointerCancel],
            ScriptStep::Leave => vec![InputEvent::PointerLeave],
            ScriptStep::Text { x, y, value } => vec![
                InputEvent::ToolSelected(Tool::Text),
                InputEvent::PointerDown(PointerSample::mouse(*x, *y)),
                InputEvent::TextDraft(value.clone()),
                InputEvent::TextCommit,
            ],
            ScriptStep::Undo => vec![InputEvent::UndoRequested],
            ScriptStep::Redo => vec![InputEvent::RedoRequested],
            ScriptStep::Clear => vec![InputEvent::ClearRequested],
        };
        Ok(events)
    }
}

/// Parse a script and flatten it into input events.
pub fn parse_script(source: &str) -> Result<Vec<InputEvent>, String> {
    let steps: Vec<ScriptStep> =
        serde_json::from_str(source).map_err(|e| format!("invalid event script: {}", e))?;
    let mut events = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        events.extend(step.to_events().map_err(|e| format!("step {}: {}", i + 1, e))?);
    }
    Ok(events)
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let events = match std::fs::read_to_string(&args.events)
        .map_err(|e| format!("could not read event script '{}': {}", args.events.display(), e))
        .and_then(|src| parse_script(&src))
    {
        Ok(events) => events,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let display = match args.display.as_deref().map(parse_display).transpose() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut settings = AnnotateSettings::load();
    if let Some(q) = args.quality {
        settings.jpeg_quality = q.clamp(1, 100);
    }
    let format = parse_format(args.format.as_deref(), args.output.as_deref(), settings.jpeg_quality);

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    log_info!("CLI: {} input(s), {} event(s)", inputs.len(), events.len());
    if args.verbose
        && let Some(path) = crate::logger::log_path()
    {
        println!("log: {}", path.display());
    }
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;
    let mut annotator = Annotator::new(settings, args.density);

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            format,
        ) else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(&mut annotator, input_path, &output_path, &events, display, format, args.verbose) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log_err!("CLI: {}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if args.copy && annotator.session().is_some() {
        let notice = annotator.copy_to_clipboard(&mut SystemClipboard, &mut TempFileViewer);
        println!("{}", notice.message());
        any_failure |= notice.is_error();
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    annotator: &mut Annotator,
    input: &Path,
    output: &Path,
    events: &[InputEvent],
    display: Option<(f32, f32)>,
    format: ExportFormat,
    verbose: bool,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let source = load_source_image(input).map_err(|e| format!("load failed: {}", e))?;
    let (w, h) = source.natural_size();
    if !annotator.open_image(source) {
        return Err("image has no pixels".to_string());
    }
    let (dw, dh) = display.unwrap_or((w as f32, h as f32));
    let layout = FixedLayout::sized(dw, dh);
    annotator.dispatch(InputEvent::LayoutChanged, &layout);

    // -- Step 2: Replay --------------------------------------------------
    for (i, event) in events.iter().enumerate() {
        let fx = annotator.dispatch(event.clone(), &layout);
        if fx.restore_started {
            annotator.settle();
        }
        if verbose {
            println!("  [{:>3}] {:?} -> {:?}", i + 1, event, fx);
        }
    }
    annotator.settle();

    // -- Step 3: Save ----------------------------------------------------
    let session = annotator
        .session()
        .ok_or_else(|| "session closed during replay".to_string())?;
    let flat = composite(session.source(), session.buffer()).map_err(|e| e.to_string())?;
    let bytes = encode(&flat, format).map_err(|e| e.to_string())?;
    std::fs::write(output, bytes).map_err(|e| format!("save failed: {}", e))?;
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `800x600` → (800.0, 600.0)
fn parse_display(s: &str) -> Result<(f32, f32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid --display '{}', expected WxH", s))?;
    let w: f32 = w.trim().parse().map_err(|_| format!("invalid display width '{}'", w))?;
    let h: f32 = h.trim().parse().map_err(|_| format!("invalid display height '{}'", h))?;
    if w <= 0.0 || h <= 0.0 {
        return Err(format!("display size must be positive, got '{}'", s));
    }
    Ok((w, h))
}

/// Choose the format from `--format` or the output file extension.
/// Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>, quality: u8) -> ExportFormat {
    let name = match (format_arg, output) {
        (Some(f), _) => f.to_lowercase(),
        (None, Some(out)) => out
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase(),
        (None, None) => String::new(),
    };
    match name.as_str() {
        "jpeg" | "jpg" => ExportFormat::Jpeg { quality },
        _ => ExportFormat::Png,
    }
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input as `<stem>_annotated.<ext>`
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: ExportFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_annotated.{}", stem, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::shapes::ShapeKind;
    use image::{Rgba, RgbaImage};

    #[test]
    fn script_steps_parse_into_events() {
        let events = parse_script(
            r##"[
                {"type": "tool", "name": "rectangle"},
                {"type": "color", "hex": "#00ff00"},
                {"type": "down", "x": 1, "y": 2},
                {"type": "up", "x": 5, "y": 6},
                {"type": "undo"}
            ]"##,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                InputEvent::ToolSelected(Tool::Shape(ShapeKind::Rectangle)),
                InputEvent::ColorChanged(Rgb::new(0, 255, 0)),
                InputEvent::PointerDown(PointerSample::mouse(1.0, 2.0)),
                InputEvent::PointerUp(PointerSample::mouse(5.0, 6.0)),
                InputEvent::UndoRequested,
            ]
        );
    }

    #[test]
    fn text_step_expands_to_a_full_entry() {
        let events = parse_script(r#"[{"type": "text", "x": 3, "y": 4, "value": "Camp"}]"#).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[2], InputEvent::TextDraft("Camp".into()));
        assert_eq!(events[3], InputEvent::TextCommit);
    }

    #[test]
    fn bad_steps_name_their_position() {
        assert_eq!(
            parse_script(r#"[{"type": "leave"}]"#),
            Ok(vec![InputEvent::PointerLeave])
        );
        let err = parse_script(r#"[{"type": "undo"}, {"type": "tool", "name": "lasso"}]"#).unwrap_err();
        assert!(err.contains("step 2"), "{err}");
        assert!(parse_script(r#"[{"type": "warp"}]"#).is_err());
    }

    #[test]
    fn format_and_output_path_resolution() {
        assert_eq!(parse_format(Some("JPG"), None, 70), ExportFormat::Jpeg { quality: 70 });
        assert_eq!(parse_format(None, Some(Path::new("a/out.jpeg")), 85), ExportFormat::Jpeg { quality: 85 });
        assert_eq!(parse_format(None, None, 85), ExportFormat::Png);

        let input = Path::new("maps/harbor.png");
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out")), ExportFormat::Png),
            Some(PathBuf::from("out/harbor.png"))
        );
        assert_eq!(
            build_output_path(input, None, None, ExportFormat::Jpeg { quality: 85 }),
            Some(PathBuf::from("maps/harbor_annotated.jpg"))
        );
    }

    #[test]
    fn display_sizes() {
        assert_eq!(parse_display("800x600"), Ok((800.0, 600.0)));
        assert!(parse_display("800").is_err());
        assert!(parse_display("0x5").is_err());
    }

    #[test]
    fn replay_writes_the_annotated_image() {
        let dir = std::env::temp_dir().join(format!("gallery-annotate-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("map.png");
        RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]))
            .save(&input)
            .unwrap();
        let output = dir.join("out.png");

        // displayed at twice the size: click (20,20) lands on pixel (10,10)
        let events = parse_script(
            r##"[
                {"type": "tool", "name": "fill"},
                {"type": "color", "hex": "#0000ff"},
                {"type": "down", "x": 20, "y": 20},
                {"type": "up", "x": 20, "y": 20}
            ]"##,
        )
        .unwrap();
        let mut annotator = Annotator::new(AnnotateSettings::default(), 1.0);
        run_one(
            &mut annotator,
            &input,
            &output,
            &events,
            Some((40.0, 40.0)),
            ExportFormat::Png,
            false,
        )
        .unwrap();

        let result = image::open(&output).unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (20, 20));
        assert_eq!(*result.get_pixel(3, 17), Rgba([0, 0, 255, 255]));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
