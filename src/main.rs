use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use thumber::imaging::{
    ImageEngine, RenderOutcome, RustEngine, detect_format, gif, heif, operations, render,
};
use thumber::{batch, config, output, request};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

/// Shared flags for commands that take request parameters.
#[derive(clap::Args, Clone)]
struct ParamArgs {
    /// Request parameters, e.g. "w=200&h=200&cm=1&g=5" or "/url=a.jpg?w=200"
    #[arg(short, long, default_value = "")]
    params: String,
}

impl ParamArgs {
    fn request_path(&self) -> String {
        request::request_path(&self.params)
    }
}

#[derive(Parser)]
#[command(name = "thumber")]
#[command(about = "Image thumbnailing core")]
#[command(long_about = "\
Image thumbnailing core

Renders thumbnails from local files using the same request parameters as the
thumbnail service:

  w, h     target width / height (0 = derive from the other)
  cm       crop mode: 0 fit, 1 crop (needs g), 2 margin
  g        gravity 1-9 (1 north-west ... 9 south-east)
  u        upscale small images when non-zero
  q        quality 0-100
  bg       background color (#rgb, #rrggbb, #rrggbbaa)
  fo       output format: jpg, webp, png, gif, heic
  io*      overlay size/position (iow, ioh, iox, ioy, iog)
  t*       text (t, tg, tm, ts, tc, tf)

Run 'thumber gen-config' to generate a documented thumber.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (default: ./thumber.toml, then /etc/thumber.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one thumbnail
    Render {
        /// Source image
        source: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Overlay image composited onto the thumbnail
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// Print the geometry plan without rendering
    Plan {
        source: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Detect the container format of files
    Sniff {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Rewrite the primary image size recorded in a HEIF file, in place
    HeifResize {
        file: PathBuf,
        width: u32,
        height: u32,
    },
    /// Cut an animated GIF down to its first frame
    GifFirstFrame { input: PathBuf, output: PathBuf },
    /// Render every job in a JSON job file (or directory of job files)
    Batch { jobs: PathBuf },
    /// Print a stock thumber.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let cli = Cli::parse();

    match cli.command {
        Command::Render {
            source,
            params,
            output: out_path,
            overlay,
        } => {
            let service_config = config::load_config(cli.config.as_deref())?;
            let request = request::parse_params(&params.request_path(), &service_config)?;
            let bytes = std::fs::read(&source)?;
            let overlay = overlay.map(std::fs::read).transpose()?;
            let engine = RustEngine::new();
            match render(&engine, bytes, overlay.as_deref(), &request)? {
                RenderOutcome::Rendered(rendered) => {
                    std::fs::write(&out_path, &rendered.bytes)?;
                    println!("{}", output::format_rendered(&out_path, &rendered));
                }
                RenderOutcome::Skipped(reason) => {
                    println!("Skipped {}: {reason}", source.display());
                }
            }
        }
        Command::Plan {
            source,
            params,
            json,
        } => {
            let service_config = config::load_config(cli.config.as_deref())?;
            let request = request::parse_params(&params.request_path(), &service_config)?;
            let prepared = plan_file(&RustEngine::new(), &source, &request)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&prepared.outcome)?);
            } else {
                output::print_plan(&source, &prepared);
            }
        }
        Command::Sniff { files } => {
            for file in files {
                let bytes = std::fs::read(&file)?;
                println!("{}", output::format_sniff(&file, detect_format(&bytes)));
            }
        }
        Command::HeifResize {
            file,
            width,
            height,
        } => {
            let mut bytes = std::fs::read(&file)?;
            let patched = heif::set_primary_image_size(&mut bytes, width, height)?;
            std::fs::write(&file, &bytes)?;
            info!(
                "Set {} to {width}x{height} ({patched} ispe box(es))",
                file.display()
            );
        }
        Command::GifFirstFrame {
            input,
            output: out_path,
        } => {
            let mut bytes = std::fs::read(&input)?;
            let len = gif::extract_first_frame(&mut bytes)?;
            bytes.truncate(len);
            std::fs::write(&out_path, &bytes)?;
            info!("Wrote first frame to {} ({len} bytes)", out_path.display());
        }
        Command::Batch { jobs } => {
            let service_config = config::load_config(cli.config.as_deref())?;
            init_thread_pool(&service_config.processing);
            let jobs = batch::load_jobs(&jobs)?;
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for result in rx {
                    for line in output::format_job_result(&result) {
                        println!("{}", line);
                    }
                }
            });
            let results = batch::run_batch(&RustEngine::new(), &jobs, &service_config, Some(tx));
            if printer.join().is_err() {
                warn!("Progress printer panicked");
            }
            let summary = batch::BatchSummary::from_results(&results);
            println!();
            println!("{}", output::format_batch_summary(&summary));
            if summary.failed > 0 {
                return Err(format!("{} job(s) failed", summary.failed).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Sniff, probe and plan a file without decoding pixels.
fn plan_file<E: ImageEngine>(
    engine: &E,
    source: &Path,
    request: &request::ThumbnailRequest,
) -> Result<operations::Prepared, Box<dyn std::error::Error>> {
    let mut bytes = std::fs::read(source)?;
    Ok(operations::prepare(engine, &mut bytes, request)?)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
