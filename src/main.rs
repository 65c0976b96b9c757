// GUI-subsystem binary: no console window is ever allocated by Windows.
// CLI mode (--input/-i flag present) attaches to the launching terminal so
// println!/eprintln! reach it.
#![windows_subsystem = "windows"]

use eframe::egui;
use gallery_annotate::app::AnnotateApp;
use gallery_annotate::cli::CliArgs;
use gallery_annotate::io::IMAGE_EXTENSIONS;
use gallery_annotate::logger;
use std::path::PathBuf;

fn main() -> Result<(), eframe::Error> {
    // -- Windows console management ------------------------------------
    #[cfg(target_os = "windows")]
    if CliArgs::is_cli_mode() {
        unsafe extern "system" {
            fn AttachConsole(dwProcessId: u32) -> i32;
        }
        const ATTACH_PARENT_PROCESS: u32 = 0xFFFF_FFFF;
        unsafe {
            AttachConsole(ATTACH_PARENT_PROCESS);
        }
    }

    // -- CLI / headless mode ---------------------------------------------
    if CliArgs::is_cli_mode() {
        use clap::Parser;
        logger::init();
        let args = CliArgs::parse();
        let code = gallery_annotate::cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode -----------------------------------------------------
    logger::init();

    // Positional arguments ("Open with…") seed the gallery
    let paths: Vec<PathBuf> = std::env::args_os()
        .skip(1)
        .map(PathBuf::from)
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_drag_and_drop(true)
            .with_title("Gallery Annotate"),
        ..Default::default()
    };

    eframe::run_native(
        "Gallery Annotate",
        options,
        Box::new(move |cc| Box::new(AnnotateApp::new(cc, paths))),
    )
}
