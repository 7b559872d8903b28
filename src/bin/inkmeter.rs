#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice
)]

use std::{path::PathBuf, process::ExitCode};

use anyhow::{bail, Context};
use clap::Parser;
use inkmeter::{AnalysisPipeline, AnalysisReport, BackgroundOptions, ReferenceTable};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Estimate ink areas and paint quantities for a print.
#[derive(Parser)]
#[command(name = "inkmeter", version)]
struct Options {
    /// The image to analyze.
    image: PathBuf,

    /// Physical width of the print in millimeters.
    #[arg(long, default_value_t = inkmeter::DEFAULT_PHYSICAL_SIZE_MM)]
    width: f64,

    /// Physical height of the print in millimeters.
    #[arg(long, default_value_t = inkmeter::DEFAULT_PHYSICAL_SIZE_MM)]
    height: f64,

    /// Grams of paint per square millimeter.
    #[arg(long, default_value_t = 1.0)]
    multiplier: f64,

    /// The smallest number of inks to consider.
    #[arg(long, default_value_t = 2)]
    k_min: usize,

    /// The largest number of inks to consider.
    #[arg(long, default_value_t = 10)]
    k_max: usize,

    /// Drop near-black colors regardless of their area.
    #[arg(long)]
    ignore_black: bool,

    /// Remove the background connected to the image corners.
    #[arg(long)]
    ignore_background: bool,

    /// A JSON reference table of `{"name", "code", "L", "a", "b"}` entries.
    /// Without one, only black and white are matched.
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Log the pipeline stages to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "inkmeter=debug" } else { "inkmeter=warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn analyze(options: &Options) -> anyhow::Result<AnalysisReport> {
    if !options.image.exists() {
        bail!("image not found: {}", options.image.display());
    }

    let table = match &options.reference {
        Some(path) => ReferenceTable::load(path)?,
        None => ReferenceTable::fallback(),
    };

    let image = inkmeter::decode_image(&options.image)?;
    let report = AnalysisPipeline::try_from(&image)
        .context("image is too large")?
        .physical_size(options.width, options.height)
        .weight_multiplier(options.multiplier)
        .cluster_range(options.k_min, options.k_max)
        .background(
            BackgroundOptions::new()
                .ignore_background(options.ignore_background)
                .ignore_black(options.ignore_black),
        )
        .analyze_par(&table)?;

    Ok(report)
}

fn main() -> ExitCode {
    let options = Options::parse();
    init_logging(options.verbose);

    let output = analyze(&options).and_then(|report| {
        serde_json::to_string_pretty(&report).context("failed to serialize the report")
    });

    match output {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::debug!(error = %err, "analysis failed");
            println!("{}", serde_json::json!({ "error": format!("{err:#}") }));
            ExitCode::FAILURE
        }
    }
}
