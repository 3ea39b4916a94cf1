//! Heritage CLI - ABC risk scoring and trend analysis for heritage sites

// Global invariants enforced:
// - Results go to stdout, diagnostics to stderr
// - The escalation policy is never guessed

use anyhow::Context;
use clap::{Parser, Subcommand};
use heritage_core::compare;
use heritage_core::config::{self, ResolvedConfig};
use heritage_core::report::{self, SiteReport};
use heritage_core::{evolution, risk, trends};
use heritage_core::{
    AbcScore, AssessmentSource, EscalationPolicy, JsonFileSource, Metric, RiskAssessment,
    SiteDirectory, SiteNameResolver, ThreatType, UncertaintyLevel,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "heritage")]
#[command(about = "ABC risk scoring and temporal trend analysis for heritage sites")]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Path to config file (default: auto-discover)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON map of site ids to display names
    #[arg(long, global = true)]
    sites_file: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single set of ABC components
    Score {
        /// Probability of the threat (1-5)
        #[arg(long)]
        a: i32,

        /// Loss of value if it occurs (1-5)
        #[arg(long)]
        b: i32,

        /// Fraction of the site affected (1-5)
        #[arg(long)]
        c: i32,

        /// Assessment uncertainty (low, medium, high)
        #[arg(long, default_value = "low")]
        uncertainty: UncertaintyLevel,

        /// Escalation policy (overrides config file)
        #[arg(long)]
        policy: Option<EscalationPolicy>,
    },
    /// Summarize a site's risk and recommend actions per threat
    Site {
        /// JSON file of assessment records
        file: PathBuf,

        /// Site id
        #[arg(long)]
        site: String,

        /// Escalation policy (overrides config file)
        #[arg(long)]
        policy: Option<EscalationPolicy>,
    },
    /// Analyze the trend of a metric at one site
    Trend {
        /// JSON file of assessment records
        file: PathBuf,

        /// Site id
        #[arg(long)]
        site: String,

        /// Restrict the series to one threat type
        #[arg(long)]
        threat: Option<ThreatType>,

        /// Metric to analyze (overrides config file)
        #[arg(long)]
        metric: Option<Metric>,
    },
    /// Compare trends across sites
    Compare {
        /// JSON file of assessment records
        file: PathBuf,

        /// Site ids to compare (default: every site in the file, after config filters)
        #[arg(long)]
        site: Vec<String>,

        /// Metric to compare (overrides config file)
        #[arg(long)]
        metric: Option<Metric>,
    },
    /// Trace how one threat evolved at a site
    Evolution {
        /// JSON file of assessment records
        file: PathBuf,

        /// Site id
        #[arg(long)]
        site: String,

        /// Threat type, e.g. flooding or tourism-pressure
        #[arg(long)]
        threat: ThreatType,
    },
    /// Validate and inspect configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running analysis
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = cli.format;
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Score {
            a,
            b,
            c,
            uncertainty,
            policy,
        } => {
            let resolved = load_config(config_path)?;
            let policy = require_policy(policy, &resolved)?;
            let abc = AbcScore::new(a, b, c)?;
            let score = risk::score(abc, uncertainty, policy);
            emit(format, &score, report::render_score_text)?;
        }
        Commands::Site { file, site, policy } => {
            let resolved = load_config(config_path)?;
            let policy = require_policy(policy, &resolved)?;
            let assessments = load_assessments(&file)?;
            let directory = load_sites(cli.sites_file.as_deref())?;

            let site_report = SiteReport::build(&assessments, &site, &directory, policy);
            if site_report.summary.assessment_count == 0 {
                tracing::warn!(site_id = %site, "no assessments recorded for site");
            }
            emit(format, &site_report, report::render_site_text)?;
        }
        Commands::Trend {
            file,
            site,
            threat,
            metric,
        } => {
            let resolved = load_config(config_path)?;
            let metric = metric.unwrap_or(resolved.metric);
            let assessments = load_assessments(&file)?;
            let directory = load_sites(cli.sites_file.as_deref())?;

            let analysis = trends::analyze_site(
                &assessments,
                &site,
                threat,
                metric,
                &directory,
                &resolved.settings,
            )
            .with_context(|| match threat {
                Some(threat) => format!("cannot analyze {} trend for site {}", threat, site),
                None => format!("cannot analyze trend for site {}", site),
            })?;
            emit(format, &analysis, report::render_trend_text)?;
        }
        Commands::Compare { file, site, metric } => {
            let resolved = load_config(config_path)?;
            let metric = metric.unwrap_or(resolved.metric);
            let assessments = load_assessments(&file)?;
            let directory = load_sites(cli.sites_file.as_deref())?;

            let site_ids = if site.is_empty() {
                sites_in(&assessments, &resolved)
            } else {
                site
            };

            let analysis = compare::compare(
                &assessments,
                &site_ids,
                metric,
                &directory,
                &resolved.settings,
            )
            .context("cannot compare sites")?;
            emit(format, &analysis, report::render_comparison_text)?;
        }
        Commands::Evolution { file, site, threat } => {
            let resolved = load_config(config_path)?;
            let assessments = load_assessments(&file)?;
            let directory = load_sites(cli.sites_file.as_deref())?;

            let site_name = directory.display_name(&site);
            let result =
                evolution::analyze(&assessments, &site, &site_name, threat, &resolved.settings);
            if result.timeline.is_empty() {
                tracing::warn!(
                    site_id = %site,
                    threat = threat.as_str(),
                    "no assessments recorded for threat at site"
                );
            }
            emit(format, &result, report::render_evolution_text)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                let resolved =
                    config::load_and_resolve(&project_root, path.as_deref().or(config_path));

                match resolved {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let project_root = std::env::current_dir()?;
                let resolved =
                    config::load_and_resolve(&project_root, path.as_deref().or(config_path))
                        .context("failed to load configuration")?;

                if format == OutputFormat::Json {
                    println!("{}", report::render_json(&ConfigView::from(&resolved))?);
                } else {
                    print_config(&resolved);
                }
            }
        },
    }

    Ok(())
}

/// Install the stderr subscriber; `RUST_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config_path: Option<&Path>) -> anyhow::Result<ResolvedConfig> {
    let project_root = std::env::current_dir()?;
    config::load_and_resolve(&project_root, config_path).context("failed to load configuration")
}

fn require_policy(
    flag: Option<EscalationPolicy>,
    resolved: &ResolvedConfig,
) -> anyhow::Result<EscalationPolicy> {
    match flag.or(resolved.escalation_policy) {
        Some(policy) => Ok(policy),
        None => anyhow::bail!(
            "no escalation policy selected: pass --policy high-uncertainty-step|uncertainty-matrix \
             or set escalation_policy in the config file"
        ),
    }
}

fn load_assessments(path: &Path) -> anyhow::Result<Vec<RiskAssessment>> {
    JsonFileSource::new(path).load()
}

fn load_sites(path: Option<&Path>) -> anyhow::Result<SiteDirectory> {
    match path {
        Some(path) => SiteDirectory::load(path),
        None => Ok(SiteDirectory::new()),
    }
}

/// Distinct site ids in the data, sorted, after include/exclude filters
fn sites_in(assessments: &[RiskAssessment], resolved: &ResolvedConfig) -> Vec<String> {
    let ids: BTreeSet<&str> = assessments.iter().map(RiskAssessment::site_id).collect();
    ids.into_iter()
        .filter(|id| {
            let keep = resolved.should_include_site(id);
            if !keep {
                tracing::debug!(site_id = *id, "site filtered out by config");
            }
            keep
        })
        .map(str::to_string)
        .collect()
}

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    render_text: fn(&T) -> String,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", report::render_json(value)?),
        OutputFormat::Text => print!("{}", render_text(value)),
    }
    Ok(())
}

/// Serializable view of the resolved configuration for `config show --format json`
#[derive(Serialize)]
struct ConfigView {
    source: Option<String>,
    escalation_policy: Option<EscalationPolicy>,
    metric: Metric,
    settings: heritage_core::AnalysisSettings,
    include_patterns: usize,
    exclude_patterns: usize,
}

impl From<&ResolvedConfig> for ConfigView {
    fn from(resolved: &ResolvedConfig) -> Self {
        ConfigView {
            source: resolved
                .config_path
                .as_ref()
                .map(|p| p.display().to_string()),
            escalation_policy: resolved.escalation_policy,
            metric: resolved.metric,
            settings: resolved.settings,
            include_patterns: resolved.include.as_ref().map_or(0, |g| g.len()),
            exclude_patterns: resolved.exclude.len(),
        }
    }
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!(
        "Escalation policy: {}",
        resolved
            .escalation_policy
            .map(|p| p.as_str())
            .unwrap_or("none (pass --policy)")
    );
    println!("Metric: {}", resolved.metric);
    println!();
    println!("Trend:");
    println!("  epsilon_ratio: {}", resolved.settings.trend_epsilon_ratio);
    println!("  forecast_horizon: {}", resolved.settings.forecast_horizon);
    println!();
    println!("Evolution:");
    println!("  margin: {}", resolved.settings.evolution_margin);
    println!(
        "  critical_magnitude: {}",
        resolved.settings.critical_magnitude
    );
    println!();
    println!("Sites:");
    println!(
        "  include: {}",
        match resolved.include {
            Some(ref g) => format!("{} patterns", g.len()),
            None => "all sites".to_string(),
        }
    );
    println!("  exclude: {} patterns", resolved.exclude.len());
}
