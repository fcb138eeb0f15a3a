//! Command-line interface for maintcov.

use clap::{Parser, Subcommand};
use globset::GlobSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{self, Config};
use crate::coverage::Calculator;
use crate::dimension;
use crate::extract::{ExtractorRegistry, Project, SourceFile};
use crate::report;
use crate::risk::RiskScorer;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &[
    "vendor",
    "node_modules",
    "target",
    "__pycache__",
    "venv",
    "site-packages",
    "dist",
    "build",
];

/// Maintenance documentation coverage.
///
/// Maintcov extracts operational facts from infrastructure code, application
/// source and configuration files (permissions, failure handling, state,
/// dependencies, configuration parameters) and scores how well they are
/// documented for the people who will maintain the system.
#[derive(Parser)]
#[command(name = "maintcov")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Measure documentation coverage of a project
    #[command(visible_alias = "check")]
    Measure(MeasureArgs),
    /// Print the effective dimension set as YAML
    Dimensions(DimensionsArgs),
}

/// Arguments for the measure command.
#[derive(Parser)]
pub struct MeasureArgs {
    /// Path to measure (file or directory)
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover in the project root)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Minimum acceptable coverage in [0, 1] (exit non-zero below it)
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Number of riskiest configuration parameters to list
    #[arg(long, default_value_t = 5)]
    pub top_risks: usize,
}

/// Arguments for the dimensions command.
#[derive(Parser)]
pub struct DimensionsArgs {
    /// Path to config YAML file (default: built-in dimensions)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Collect and read the files under `root` that some extractor handles.
///
/// Hidden directories and dependency/build directories are skipped, as are
/// paths matching `excluded`. Hidden files are kept since `.env` files carry
/// configuration. File ids are relative to `root` with `/` separators.
pub fn collect_sources(
    root: &Path,
    registry: &ExtractorRegistry,
    excluded: &GlobSet,
) -> anyhow::Result<Vec<SourceFile>> {
    if root.is_file() {
        let id = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.to_string_lossy().to_string());
        return Ok(read_source(root, id).into_iter().collect());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if excluded.is_match(&id) {
            tracing::debug!("excluded {}", id);
            continue;
        }
        if registry.for_file(&id).is_none() {
            continue;
        }
        if let Some(file) = read_source(path, id) {
            files.push(file);
        }
    }

    Ok(files)
}

fn read_source(path: &Path, id: String) -> Option<SourceFile> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(SourceFile::new(id, content)),
        Err(e) => {
            tracing::warn!("skipping {}: {}", path.display(), e);
            None
        }
    }
}

/// Load the config named on the command line, or discover one in `root`.
fn load_config(explicit: Option<&Path>, root: &Path) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let dir = if root.is_dir() {
                root
            } else {
                root.parent().unwrap_or(Path::new("."))
            };
            Config::discover(dir)
        }
    };
    let config = match &path {
        Some(p) => Config::parse_file(p)?,
        None => Config::default(),
    };
    config::validate(&config)?;
    Ok((config, path))
}

/// Run the measure command.
pub fn run_measure(args: &MeasureArgs) -> anyhow::Result<i32> {
    // Validate format
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    // Resolve path
    let root = match args.path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };

    let (config, config_path) = match load_config(args.config.as_deref(), &root) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: invalid config: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let threshold = args.threshold.unwrap_or_else(|| config.threshold());
    if let Err(e) = dimension::validate_threshold(threshold) {
        eprintln!("Error: {}", e);
        return Ok(EXIT_ERROR);
    }

    let specs = config.dimensions()?;
    let registry = config.registry()?;
    let files = collect_sources(&root, &registry, &config.exclusions()?)?;
    if files.is_empty() {
        eprintln!("Warning: no files to measure");
    }
    tracing::debug!(
        "measuring {} files with extractors [{}]",
        files.len(),
        registry.names().join(", ")
    );

    let extraction = Project::new(&registry).extract_sources(&files);
    let coverage = Calculator::new()
        .with_tier_weights(config.tier_weights())
        .measure(&extraction, &specs, threshold)?;

    let scorer = match config.risk_weights {
        Some(w) => RiskScorer::with_weights(w.undocumented, w.sensitive, w.production),
        None => RiskScorer::default(),
    };
    let risks = scorer.top(&extraction.artifacts, args.top_risks);

    // Output results
    let path_str = args.path.to_string_lossy().to_string();
    let config_str = config_path.map(|p| p.to_string_lossy().to_string());

    match args.format.as_str() {
        "json" => {
            report::write_json(&path_str, config_str.as_deref(), &extraction, &coverage, &risks)?;
        }
        _ => {
            report::write_pretty(&path_str, config_str.as_deref(), &extraction, &coverage, &risks);
        }
    }

    // Return appropriate exit code
    if coverage.passed {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILED)
    }
}

/// Run the dimensions command.
pub fn run_dimensions(args: &DimensionsArgs) -> anyhow::Result<i32> {
    let config = match &args.config {
        Some(path) => {
            let config = Config::parse_file(path)?;
            config::validate(&config)?;
            config
        }
        None => Config::default(),
    };
    print!("{}", dimension::to_yaml(&config.dimensions()?)?);
    Ok(EXIT_SUCCESS)
}
