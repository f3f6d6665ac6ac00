//! castor CLI - beaver dam environmental effects

mod io;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use castor_algorithms::sampling::{candidates_along, deduplicate, sample_negatives};
use castor_algorithms::zones::DamPolicy;
use castor_cloud::{BearerToken, RasterServiceBlocking, ServiceOptions};
use castor_core::{AggregationPeriod, Label, Standardizer};
use castor_pipeline::{Pipeline, PipelineConfig, PipelineInput};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "castor")]
#[command(author, version, about = "Environmental effects of beaver dams", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis against a raster service
    Run {
        /// Point file (latitude, longitude[, date][, label])
        input: PathBuf,
        /// Directory results are written to
        #[arg(short, long, default_value = "castor-out")]
        output_dir: PathBuf,
        /// JSON configuration; unset fields keep their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Candidate locations for negative sampling
        #[arg(long)]
        candidates: Option<PathBuf>,
        /// Waterway vertices (line, latitude, longitude) in flow direction
        #[arg(long)]
        waterways: Option<PathBuf>,
        /// Densify waterways into sampling candidates at this spacing (m)
        #[arg(long)]
        candidate_spacing: Option<f64>,
        /// Dams farther than this from every waterway are flagged (m)
        #[arg(long, requires = "waterways")]
        max_dam_distance: Option<f64>,
        /// Leave flagged dams out of the run instead of only reporting them
        #[arg(long, requires = "waterways")]
        valid_dams_only: bool,
        /// Raster service base URL
        #[arg(long, env = "CASTOR_SERVICE_URL")]
        service_url: String,
        /// Bearer token for the raster service
        #[arg(long, env = "CASTOR_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Date for points without one (YYYY-MM-DD)
        #[arg(long)]
        default_date: Option<String>,
        /// Items per service call
        #[arg(long)]
        batch_size: Option<usize>,
        /// Chunks in flight at once (0 = all cores)
        #[arg(short = 'j', long)]
        parallelism: Option<usize>,
        /// Time series bucket
        #[arg(long, value_enum)]
        period: Option<Period>,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "120")]
        timeout: u64,
    },
    /// Draw control points without contacting any service
    Sample {
        /// Dam point file
        input: PathBuf,
        /// Output point file
        output: PathBuf,
        /// Candidate locations
        #[arg(long, conflicts_with = "waterways")]
        candidates: Option<PathBuf>,
        /// Waterway vertices to densify into candidates
        #[arg(long)]
        waterways: Option<PathBuf>,
        /// Candidate spacing along waterways (m)
        #[arg(long, default_value = "100.0")]
        spacing: f64,
        /// Negatives per dam
        #[arg(long)]
        ratio: Option<usize>,
        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
        /// JSON configuration; only the sampling section is used
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Date for points without one (YYYY-MM-DD)
        #[arg(long)]
        default_date: Option<String>,
    },
    /// Print the default configuration as JSON
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Period {
    Month,
    Year,
}

impl From<Period> for AggregationPeriod {
    fn from(p: Period) -> Self {
        match p {
            Period::Month => AggregationPeriod::Month,
            Period::Year => AggregationPeriod::Year,
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_json_file(p).context("Failed to load configuration"),
        None => Ok(PipelineConfig::default()),
    }
}

fn done(start: Instant) {
    info!("Done in {:.2?}", start.elapsed());
}

// ─── Commands ───────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run(
    input: &Path,
    output_dir: &Path,
    config: Option<&Path>,
    candidates: Option<&Path>,
    waterways: Option<&Path>,
    candidate_spacing: Option<f64>,
    max_dam_distance: Option<f64>,
    valid_dams_only: bool,
    service_url: &str,
    token: Option<String>,
    default_date: Option<String>,
    batch_size: Option<usize>,
    parallelism: Option<usize>,
    period: Option<Period>,
    timeout: u64,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(d) = default_date {
        config.fallback_date = Some(io::parse_date(&d)?);
    }
    if let Some(n) = batch_size {
        config.batch = config.batch.with_batch_size(n);
    }
    if let Some(n) = parallelism {
        config.batch.parallelism = n;
    }
    if let Some(p) = period {
        config.period = p.into();
    }
    if let Some(m) = max_dam_distance {
        config.dam_check.max_distance_m = m;
    }
    if valid_dams_only {
        config.dam_check.policy = DamPolicy::ValidOnly;
    }

    let points = io::read_points(input)?;
    info!("Input: {} points from {}", points.len(), input.display());

    let waterways = match waterways {
        Some(p) => io::read_waterways(p)?,
        None => Vec::new(),
    };
    let candidates = match (candidates, candidate_spacing) {
        (Some(p), _) => Some(io::read_candidates(p)?),
        (None, Some(spacing)) if !waterways.is_empty() => Some(candidates_along(&waterways, spacing)),
        (None, Some(_)) => bail!("--candidate-spacing needs --waterways"),
        (None, None) => None,
    };
    if let Some(pool) = &candidates {
        info!("Candidates: {}", pool.len());
    }

    let options = ServiceOptions {
        request_timeout: Duration::from_secs(timeout),
        ..Default::default()
    };
    let mut service = RasterServiceBlocking::new(service_url, options)
        .with_context(|| format!("Failed to set up client for {service_url}"))?;
    if let Some(token) = token {
        service = service.with_auth(BearerToken::new(token));
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let start = Instant::now();
    let pb = spinner("Starting...")?;
    let progress = pb.clone();
    let pipeline = Pipeline::new(config, &service)
        .with_observer(move |stage| progress.set_message(format!("{}...", stage)));
    let input = PipelineInput {
        points,
        candidates,
        waterways,
    };
    let output = pipeline.run(&input);
    pb.finish_and_clear();
    let output = output.context("Pipeline failed")?;

    io::write_points(&output_dir.join("points.csv"), &output)?;
    io::write_series(&output_dir.join("series.csv"), &output.series)?;
    io::write_comparison(&output_dir.join("comparison.csv"), &output.comparison)?;
    io::write_report(&output_dir.join("report.json"), &output, pipeline.config())?;

    println!("{}", output.report);
    if !output.manifest.is_empty() {
        warn!(
            "Some items were left out; see {}",
            output_dir.join("report.json").display()
        );
    }
    info!("Output: {}", output_dir.display());
    done(start);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn sample(
    input: &Path,
    output: &Path,
    candidates: Option<&Path>,
    waterways: Option<&Path>,
    spacing: f64,
    ratio: Option<usize>,
    seed: Option<u64>,
    config: Option<&Path>,
    default_date: Option<String>,
) -> Result<()> {
    let config = load_config(config)?;
    let mut sampling = config.sampling;
    if let Some(r) = ratio {
        sampling.ratio = r;
    }
    if let Some(s) = seed {
        sampling.seed = s;
    }

    let pool = match (candidates, waterways) {
        (Some(p), _) => io::read_candidates(p)?,
        (None, Some(p)) => candidates_along(&io::read_waterways(p)?, spacing),
        (None, None) => bail!("either --candidates or --waterways is required"),
    };

    let mut standardizer = Standardizer::new();
    let fallback = default_date.map(|d| io::parse_date(&d)).transpose()?.or(config.fallback_date);
    if let Some(date) = fallback {
        standardizer = standardizer.with_fallback_date(date);
    }

    let raw: Vec<_> = io::read_points(input)?
        .into_iter()
        .filter(|p| p.label == Label::Dam)
        .collect();
    let raw = deduplicate(&raw, config.dedup_radius_m);
    let standardized = standardizer.standardize(&raw);
    for e in &standardized.rejected {
        warn!("{}", e);
    }

    let start = Instant::now();
    let pb = spinner("Sampling negatives...")?;
    let outcome = sample_negatives(&standardized.points, &pool, &sampling);
    pb.finish_and_clear();

    io::write_raw_points(output, &outcome.raw_points())?;
    println!(
        "  Dams: {}  Candidates: {}  Negatives: {}",
        standardized.points.len(),
        pool.len(),
        outcome.negatives.len()
    );
    if outcome.missing() > 0 {
        warn!(
            "{} negatives could not be drawn ({} cells short)",
            outcome.missing(),
            outcome.shortfalls.len()
        );
    }
    info!("Output: {}", output.display());
    done(start);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run {
            input,
            output_dir,
            config,
            candidates,
            waterways,
            candidate_spacing,
            max_dam_distance,
            valid_dams_only,
            service_url,
            token,
            default_date,
            batch_size,
            parallelism,
            period,
            timeout,
        } => run(
            &input,
            &output_dir,
            config.as_deref(),
            candidates.as_deref(),
            waterways.as_deref(),
            candidate_spacing,
            max_dam_distance,
            valid_dams_only,
            &service_url,
            token,
            default_date,
            batch_size,
            parallelism,
            period,
            timeout,
        ),
        Commands::Sample {
            input,
            output,
            candidates,
            waterways,
            spacing,
            ratio,
            seed,
            config,
            default_date,
        } => sample(
            &input,
            &output,
            candidates.as_deref(),
            waterways.as_deref(),
            spacing,
            ratio,
            seed,
            config.as_deref(),
            default_date,
        ),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
            Ok(())
        }
    }
}
