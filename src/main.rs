use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use merge_rgba::geotiff_writer::CreationOptions;
use merge_rgba::{merge_to_geotiff, source, BoundingBox, MergeError, MergeOptions, Resolution};

#[derive(Parser, Debug)]
#[command(
    name = "merge-rgba",
    version,
    about = "Merge a stack of RGBA rasters, using the alpha band as the validity mask"
)]
struct Cli {
    /// Input files, followed by the output file unless --output is given
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output bounds: west south east north
    #[arg(long, num_args = 4, value_names = ["W", "S", "E", "N"], allow_negative_numbers = true)]
    bounds: Option<Vec<f64>>,

    /// Output resolution in target coordinate units; give once for square
    /// pixels or twice for x then y
    #[arg(long, value_name = "RES")]
    res: Vec<f64>,

    /// Overwrite an existing output file
    #[arg(short = 'f', long = "force-overwrite")]
    force_overwrite: bool,

    /// Decimal places used when mapping coordinates to pixels
    #[arg(long, default_value_t = merge_rgba::DEFAULT_PRECISION)]
    precision: u32,

    /// Driver-specific creation option (repeatable)
    #[arg(long = "co", value_name = "NAME=VALUE")]
    creation_options: Vec<String>,

    /// Output format driver
    #[arg(long, default_value = "GTiff")]
    driver: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Split positional files into inputs and the output
fn split_files(files: &[PathBuf], output: Option<&PathBuf>) -> anyhow::Result<(Vec<PathBuf>, PathBuf)> {
    let (inputs, output) = match output {
        Some(out) => (files.to_vec(), out.clone()),
        None => match files.split_last() {
            Some((out, inputs)) => (inputs.to_vec(), out.clone()),
            None => bail!("No output file given"),
        },
    };
    if inputs.is_empty() {
        bail!("At least one input file is required");
    }
    Ok((inputs, output))
}

fn merge_options(cli: &Cli) -> anyhow::Result<MergeOptions> {
    let mut options = MergeOptions::new().with_precision(cli.precision);
    if let Some(bounds) = &cli.bounds {
        let bounds: [f64; 4] = bounds
            .as_slice()
            .try_into()
            .context("--bounds takes four values")?;
        options = options.with_bounds(BoundingBox::from(bounds));
    }
    if !cli.res.is_empty() {
        options = options.with_resolution(Resolution::from_values(&cli.res)?);
    }
    Ok(options)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if !cli.driver.eq_ignore_ascii_case("GTiff") {
        bail!("Unsupported driver: {} (only GTiff is available)", cli.driver);
    }

    let (inputs, output) = split_files(&cli.files, cli.output.as_ref())?;
    if output.exists() && !cli.force_overwrite {
        return Err(MergeError::OutputExists(output).into());
    }

    let options = merge_options(cli)?;
    let creation = CreationOptions::parse(&cli.creation_options)?;

    let mut sources = source::open_all(&inputs)?;
    let transform = merge_to_geotiff(&mut sources, &output, &options, &creation)
        .with_context(|| format!("Failed to merge into {}", output.display()))?;

    info!(output = %output.display(), %transform, "Wrote merged raster");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(&cli)
}
