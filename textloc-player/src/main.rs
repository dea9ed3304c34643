//! textloc-player - plays a UI frame loop for one localized label
//!
//! Starts loading the localization tables in the background, requests a string (and
//! optionally a font and material) for a label, then ticks a frame scheduler
//! until the label is populated or the frame budget runs out.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use textloc_bridge::{wait_for_ticks, AsyncHandle, FrameScheduler};
use textloc_localization::{
    on_initialized_on, set_localization_string_with_args, LocalizationConfig, LocalizationSettings,
    SharedSettings, TextLabel,
};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "textloc-player")]
#[command(about = "Load localization tables and render one localized label frame by frame")]
struct Args {
    /// Localization configuration file (RON)
    #[arg(short, long, default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/localization.ron"))]
    config: PathBuf,

    /// Locale to select, overriding environment detection
    #[arg(short, long)]
    locale: Option<String>,

    /// String table holding the entry
    #[arg(short, long)]
    table: String,

    /// Entry to look up
    #[arg(short, long)]
    entry: String,

    /// Fluent argument passed to the entry, as KEY=VALUE (repeatable)
    #[arg(short, long = "arg", value_parser = parse_key_value)]
    args: Vec<(String, String)>,

    /// Font table for the label
    #[arg(long, requires = "font_entry")]
    font_table: Option<String>,

    /// Font entry for the label
    #[arg(long, requires = "font_table")]
    font_entry: Option<String>,

    /// Material table for the label
    #[arg(long, requires = "material_entry")]
    material_table: Option<String>,

    /// Material entry for the label
    #[arg(long, requires = "material_table")]
    material_entry: Option<String>,

    /// Give up after this many frames
    #[arg(long, default_value_t = 300)]
    max_frames: u64,

    /// Frame duration in milliseconds
    #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u64).range(1..))]
    frame_ms: u64,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = LocalizationConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    let settings: SharedSettings =
        LocalizationSettings::from_config(config, args.locale.as_deref())?;
    info!("Selected locale: {}", settings.selected_locale());

    let label = TextLabel::new(args.entry.clone());
    let mut scheduler = FrameScheduler::new();

    let target = label.downgrade();
    let lookup = set_localization_string_with_args(
        &settings,
        &args.entry,
        &args.table,
        &args.args,
        move |text| {
            if let Some(label) = target.upgrade() {
                label.set_text(text);
            }
        },
    )
    .ok_or_else(|| anyhow!("Invalid string reference '{}' in '{}'", args.entry, args.table))?;

    if let (Some(table), Some(entry)) = (&args.font_table, &args.font_entry) {
        label.set_localization_font(&settings, entry, table);
    }
    if let (Some(table), Some(entry)) = (&args.material_table, &args.material_entry) {
        label.set_localization_material(&settings, entry, table);
    }

    // load tables on the runtime while the frame loop runs
    on_initialized_on(&settings, &mut scheduler, || info!("Localization tables ready"));

    let text = lookup.handle().clone();
    scheduler.spawn(async move {
        let text = wait_for_ticks(text).await;
        info!("Localized string ready: {:?}", text);
    });

    let mut frames = interval(Duration::from_millis(args.frame_ms));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    while scheduler.frame() < args.max_frames {
        frames.tick().await;
        if scheduler.tick() == 0 {
            break;
        }
    }

    if !lookup.is_delivered() {
        if !settings.initialization_operation().is_done() {
            warn!("Localization tables were still loading");
        }
        bail!(
            "Label '{}' was not populated within {} frames",
            label.name(),
            args.max_frames
        );
    }

    info!("Label populated after {} frames", scheduler.frame());
    println!("{}", label.text());
    if let Some(font) = label.font() {
        println!("font: {} {}pt ({})", font.family, font.size, font.path.display());
    }
    if let Some(material) = label.material() {
        println!("material: {}", material.name);
    }
    Ok(())
}
