//! # Image Marker CLI (`marker`)
//!
//! Serves the labeling page for a directory of unlabeled images and records
//! every submission in the sample log.
//!
//! ## Usage
//!
//! ```bash
//! marker [--port 8080] [--outputFile ./samples.txt] [--log info] <IMAGE_DIR>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `marker <IMAGE_DIR>` | Start the labeling server |
//! | `marker stats <IMAGE_DIR>` | Show labeling progress |
//! | `marker reconcile <IMAGE_DIR>` | List (and with `--apply`, move) logged images that were never moved |
//!
//! ## Exit status
//!
//! | Code | Meaning |
//! |------|---------|
//! | 2 | Usage error |
//! | 3 | Image directory missing or not a directory |
//! | 4 | Marked directory cannot be created |
//! | 5 | Listen address cannot be bound |
//! | 6 | Invalid configuration |

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use image_marker::config::{self, Overrides};
use image_marker::error::StartupError;
use image_marker::paths::ResolvedPaths;
use image_marker::{reconcile, server, stats};

/// Image Marker: draw bounding boxes on unlabeled images in the browser.
///
/// Each submission is appended to the sample log and the image is moved into
/// `<IMAGE_DIR>/marked`.
#[derive(Parser)]
#[command(
    name = "marker",
    version,
    about = "Image Marker — label a directory of images with bounding boxes from the browser",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,

    /// Log filter when `RUST_LOG` is unset, e.g. `debug` or `image_marker=trace`.
    #[arg(long, global = true, default_value = "info", value_name = "FILTER")]
    log: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Arguments for the default serve mode.
#[derive(Args)]
struct ServeArgs {
    /// Directory holding the unlabeled images.
    #[arg(value_name = "IMAGE_DIR", required = true)]
    image_dir: Option<PathBuf>,

    /// Port the server listens on (default 8080).
    #[arg(long)]
    port: Option<u16>,

    /// Interface to bind (default 0.0.0.0).
    #[arg(long)]
    host: Option<String>,

    /// Path to the sample log (default ./samples.txt).
    #[arg(long = "outputFile", visible_alias = "output-file", value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Base URL used in `/images/random` responses, e.g. `http://labeler:8080`.
    #[arg(long)]
    public_url: Option<String>,

    /// Optional TOML configuration file. Command-line flags win.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Image directory and sample log, shared by the offline commands.
#[derive(Args)]
struct TargetArgs {
    /// Directory holding the unlabeled images.
    #[arg(value_name = "IMAGE_DIR")]
    image_dir: PathBuf,

    /// Path to the sample log (default ./samples.txt).
    #[arg(long = "outputFile", visible_alias = "output-file", value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Optional TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how many images are labeled, unlabeled, and recorded.
    Stats {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Find images that were logged but never moved into `marked/`.
    ///
    /// Lists them by default. With `--apply`, moves them. The sample log
    /// is never modified.
    Reconcile {
        #[command(flatten)]
        target: TargetArgs,

        /// Move the listed images into the marked directory.
        #[arg(long)]
        apply: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .downcast_ref::<StartupError>()
                .map(StartupError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

/// `RUST_LOG` wins over `--log`; an unparsable filter falls back to `info`.
fn init_tracing(log: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        None => {
            let args = cli.serve;
            let image_dir = args
                .image_dir
                .ok_or_else(|| anyhow::anyhow!("missing IMAGE_DIR argument"))?;
            let cfg = config::build_config(
                args.config.as_deref(),
                Overrides {
                    host: args.host,
                    port: args.port,
                    output_file: args.output_file,
                    public_url: args.public_url,
                },
            )
            .map_err(StartupError::Config)?;

            let paths = Arc::new(ResolvedPaths::prepare(&image_dir, &cfg.output.path)?);
            server::run_server(&cfg, paths).await?;
        }
        Some(Commands::Stats { target }) => {
            let paths = Arc::new(prepare_target(target)?);
            stats::run_stats(&paths)?;
        }
        Some(Commands::Reconcile { target, apply }) => {
            let paths = prepare_target(target)?;
            reconcile::run_reconcile(&paths, apply)?;
        }
    }
    Ok(())
}

fn prepare_target(target: TargetArgs) -> Result<ResolvedPaths, StartupError> {
    let cfg = config::build_config(
        target.config.as_deref(),
        Overrides {
            output_file: target.output_file,
            ..Default::default()
        },
    )
    .map_err(StartupError::Config)?;
    ResolvedPaths::prepare(&target.image_dir, &cfg.output.path)
}
