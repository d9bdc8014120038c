//! pdfedit command line
//!
//! Thin front end over `pdfedit-core`: reads a JSON edit request and an
//! optional TOML config, applies the edits and prints a JSON report.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pdfedit_core::{AssetMap, Compositor, CoordinateUnits, EditRequest, EditorConfig};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdfedit")]
#[command(version, about = "Place text, image and shape overlays on PDF pages")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a JSON edit request to a PDF
    Apply {
        /// Source PDF, never modified
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the edited PDF
        #[arg(short, long)]
        output: PathBuf,

        /// JSON file mapping page index to edit lists
        #[arg(short, long)]
        edits: PathBuf,

        /// Image asset as ID=PATH, repeatable
        #[arg(long = "asset", value_parser = parse_asset)]
        assets: Vec<(String, PathBuf)>,

        /// How coordinates are read: auto, fraction or points
        #[arg(long, value_parser = parse_units)]
        units: Option<CoordinateUnits>,

        /// Leave content streams uncompressed
        #[arg(long)]
        no_compress: bool,
    },

    /// Print page count and page geometry
    Info {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn parse_asset(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((id, path)) if !id.trim().is_empty() && !path.is_empty() => {
            Ok((id.trim().to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected ID=PATH, got {s:?}")),
    }
}

fn parse_units(s: &str) -> Result<CoordinateUnits, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown units {s:?}, expected auto, fraction or points"))
}

#[derive(Serialize)]
struct PageInfo {
    page: usize,
    width: f64,
    height: f64,
    rotation: u16,
}

fn run_apply(
    config: &EditorConfig,
    input: PathBuf,
    output: PathBuf,
    edits: PathBuf,
    assets: Vec<(String, PathBuf)>,
    units: Option<CoordinateUnits>,
    no_compress: bool,
) -> anyhow::Result<()> {
    let json = fs::read_to_string(&edits)
        .with_context(|| format!("Failed to read edit request: {}", edits.display()))?;
    let mut request = EditRequest::from_json(&json)
        .with_context(|| format!("Invalid edit request: {}", edits.display()))?;
    if let Some(units) = units.or(config.units) {
        request.units = units;
    }

    let assets: AssetMap = assets.into_iter().collect();
    for (id, path) in &assets {
        if !path.is_file() {
            tracing::warn!(image_id = %id, path = %path.display(), "asset file not found");
        }
    }

    let compositor =
        Compositor::from_config(config).with_compression(config.output.compress && !no_compress);
    let report = compositor.apply_file(&input, &output, &request, &assets)?;

    tracing::info!(
        output = %output.display(),
        applied = report.applied,
        skipped = report.skipped.len(),
        "wrote edited PDF"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_info(input: PathBuf) -> anyhow::Result<()> {
    let doc = lopdf::Document::load(&input)
        .with_context(|| format!("Failed to open PDF: {}", input.display()))?;

    let mut pages = Vec::new();
    for (page, geometry) in pdfedit_core::page_geometries(&doc).into_iter().enumerate() {
        match geometry {
            Ok(g) => pages.push(PageInfo {
                page,
                width: g.width,
                height: g.height,
                rotation: g.rotation,
            }),
            Err(e) => tracing::warn!(page, error = %e, "cannot read page geometry"),
        }
    }
    if pages.is_empty() {
        bail!("{} has no readable pages", input.display());
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "page_count": doc.get_pages().len(),
            "pages": pages,
        }))?
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the JSON report, logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => EditorConfig::from_file(path)?,
        None => EditorConfig::default(),
    };

    match cli.command {
        Command::Apply {
            input,
            output,
            edits,
            assets,
            units,
            no_compress,
        } => run_apply(&config, input, output, edits, assets, units, no_compress),
        Command::Info { input } => run_info(input),
    }
}
