//! Collection Scanner
//!
//! Reads a 12x3 collection grid from a game screenshot: which cells hold an
//! item, how many copies each holds, and the item names. A calibration window
//! lets the operator line the grid up with their screen layout.

mod calibration;
mod config;
mod extraction;
mod grid;
mod gui;
mod ocr;
mod paths;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use image::RgbaImage;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use calibration::preview::{render_quantity_debug, save_preview};
use calibration::{load_or_default, JsonFileStore, SettingsStore};
use extraction::Extractor;
use grid::{analyze_quantity, compute_grid_cells, LogDiagnostics, CELL_COUNT};
use ocr::{CatalogLookup, HttpNameCorrector, HttpReferenceLookup, ReferenceLookup, TesseractRecognizer};

const LOG_FILE_NAME: &str = "collection_scanner.log";

const USAGE: &str = "\
Usage:
  collection-scanner scan <image> [--out <file.json>] [--verbose]
  collection-scanner preview <image> [--out <file.png>]
  collection-scanner calibrate <image>
  collection-scanner quantity <image> <cell-index> [--out <file.png>]";

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join(LOG_FILE_NAME);
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(line.as_bytes());
    }
}

/// Parsed command line.
#[derive(Debug, PartialEq)]
struct CliArgs {
    command: String,
    positional: Vec<String>,
    out: Option<PathBuf>,
    /// Forward per-cell classifier notes to the log.
    verbose: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut args = args.into_iter();
    let command = args.next().ok_or_else(|| anyhow!("missing command"))?;
    let mut positional = Vec::new();
    let mut out = None;
    let mut verbose = false;

    while let Some(arg) = args.next() {
        if arg == "--out" || arg == "-o" {
            let value = args.next().ok_or_else(|| anyhow!("--out needs a path"))?;
            out = Some(PathBuf::from(value));
        } else if arg == "--verbose" || arg == "-v" {
            verbose = true;
        } else {
            positional.push(arg);
        }
    }

    Ok(CliArgs {
        command,
        positional,
        out,
        verbose,
    })
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        let log_msg = format!("[PANIC]{} {}\n", location, msg);
        eprintln!("{}", log_msg);
        let log_path = paths::get_logs_dir().join(LOG_FILE_NAME);
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = file.write_all(log_msg.as_bytes());
        }
    }));
}

fn load_screenshot(path: &str) -> Result<RgbaImage> {
    let img = image::open(path).with_context(|| format!("Failed to open screenshot {}", path))?;
    Ok(img.to_rgba8())
}

fn image_arg(cli: &CliArgs) -> Result<&str> {
    cli.positional
        .first()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs an image path\n{}", cli.command, USAGE))
}

fn main() -> Result<()> {
    install_panic_hook();

    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(_) => {
            println!("{}", USAGE);
            return Ok(());
        }
    };

    config::init_config();
    paths::ensure_directories()?;

    match cli.command.as_str() {
        "scan" => run_scan(&cli),
        "preview" => run_preview(&cli),
        "calibrate" => {
            let img = load_screenshot(image_arg(&cli)?)?;
            log("Starting calibration window...");
            gui::run_gui(img, &config::get_config().user_id)
        }
        "quantity" => run_quantity(&cli),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => Err(anyhow!("unknown command '{}'\n{}", other, USAGE)),
    }
}

fn settings_store() -> JsonFileStore {
    JsonFileStore::new(paths::get_users_dir())
}

/// Full extraction of one screenshot with the saved calibration.
fn run_scan(cli: &CliArgs) -> Result<()> {
    let config = config::get_config();
    let img = load_screenshot(image_arg(cli)?)?;
    let store = settings_store();
    let settings = load_or_default(&store, &config.user_id);

    let tesseract = ocr::ensure_tesseract(config.tesseract_path.as_deref(), &config.tesseract_lang)?;
    let recognizer = TesseractRecognizer::new(tesseract, &config.tesseract_lang, config.ocr_threshold);

    let corrector = match &config.correction_endpoint {
        Some(url) => Some(HttpNameCorrector::new(
            url.clone(),
            config.correction_api_key.clone(),
            config.http_timeout(),
        )?),
        None => None,
    };
    let lookup: Option<Box<dyn ReferenceLookup>> = if let Some(url) = &config.lookup_endpoint {
        Some(Box::new(HttpReferenceLookup::new(url.clone(), config.http_timeout())?))
    } else if let Some(path) = &config.catalog_path {
        let catalog = CatalogLookup::from_json_file(path)?;
        if catalog.is_empty() {
            log("Catalog is empty; every record will be unmatched");
        }
        Some(Box::new(catalog))
    } else {
        None
    };

    let sink = LogDiagnostics::new("Scan");
    let mut extractor = Extractor::new(&recognizer).parallel(config.parallel_classification);
    if let Some(corrector) = &corrector {
        extractor = extractor.with_corrector(corrector);
    }
    if let Some(lookup) = lookup.as_deref() {
        extractor = extractor.with_lookup(lookup);
    }
    if cli.verbose {
        extractor = extractor.with_diagnostics(&sink);
    }

    let report = extractor.extract(&img, &settings)?;
    for record in &report.records {
        println!(
            "R{}C{:<2}  x{:<2}  {}{}",
            record.row,
            record.column,
            record.quantity.to_string(),
            record.name,
            if record.reference.is_some() { "" } else { "  (unmatched)" }
        );
    }
    if lookup.is_some() {
        log(&format!("{} records without a reference entry", report.unmatched().count()));
    }

    let saved = match &cli.out {
        Some(path) => {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            path.clone()
        }
        None => store.save_records(&config.user_id, &report.records)?,
    };
    log(&format!("Records written to {}", saved.display()));
    Ok(())
}

/// Renders the calibrated regions onto the screenshot.
fn run_preview(cli: &CliArgs) -> Result<()> {
    let config = config::get_config();
    let img = load_screenshot(image_arg(cli)?)?;
    let settings = load_or_default(&settings_store(), &config.user_id);
    settings.validate()?;

    let cells = compute_grid_cells(img.width(), img.height(), &settings.layout);
    let overlay = calibration::preview::render_overlay(&img, &cells, &settings, None);
    let path = output_path(cli, "overlay");
    save_preview(&overlay, &path)?;
    log(&format!("Preview saved to {}", path.display()));
    Ok(())
}

/// Reads one cell's quantity with diagnostics and writes the zoomed strip.
fn run_quantity(cli: &CliArgs) -> Result<()> {
    let config = config::get_config();
    let img = load_screenshot(image_arg(cli)?)?;
    let index: usize = cli
        .positional
        .get(1)
        .ok_or_else(|| anyhow!("quantity needs a cell index\n{}", USAGE))?
        .parse()
        .context("cell index must be a number")?;
    if index >= CELL_COUNT {
        return Err(anyhow!("cell index {} out of range (0..{})", index, CELL_COUNT));
    }

    let settings = load_or_default(&settings_store(), &config.user_id);
    let cells = compute_grid_cells(img.width(), img.height(), &settings.layout);
    let cell = cells[index];
    let sink = LogDiagnostics::new(format!("Quantity {}", cell.label()));
    let analysis = analyze_quantity(&img, &cell.bounds, &settings.quantity_region, Some(&sink));
    println!("{}: {}", cell.label(), analysis.quantity);

    let debug = render_quantity_debug(&img, &analysis, &settings.quantity_region.thresholds, 8);
    let path = output_path(cli, &format!("quantity_{}", cell.label()));
    save_preview(&debug, &path)?;
    log(&format!("Strip view saved to {}", path.display()));
    Ok(())
}

fn output_path(cli: &CliArgs, stem: &str) -> PathBuf {
    cli.out.clone().unwrap_or_else(|| {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        paths::get_previews_dir().join(format!("{}_{}.png", stem, timestamp))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args_with_out() {
        let cli = parse_args(args(&["scan", "shot.png", "--out", "records.json"])).unwrap();
        assert_eq!(cli.command, "scan");
        assert_eq!(cli.positional, vec!["shot.png".to_string()]);
        assert_eq!(cli.out, Some(PathBuf::from("records.json")));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_args_verbose_flag() {
        let cli = parse_args(args(&["scan", "-v", "shot.png"])).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.positional, vec!["shot.png".to_string()]);
    }

    #[test]
    fn test_parse_args_positionals() {
        let cli = parse_args(args(&["quantity", "shot.png", "13"])).unwrap();
        assert_eq!(cli.positional.len(), 2);
        assert!(cli.out.is_none());
        assert!(image_arg(&cli).is_ok());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(Vec::<String>::new()).is_err());
        assert!(parse_args(args(&["preview", "shot.png", "--out"])).is_err());
        let cli = parse_args(args(&["calibrate"])).unwrap();
        assert!(image_arg(&cli).is_err());
    }
}
