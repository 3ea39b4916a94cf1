//! Configuration file support
//!
//! Loads analysis configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.heritagerc.json` in the working directory
//! 3. `heritage.config.json` in the working directory
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::risk::{EscalationPolicy, MAX_MAGNITUDE, MIN_MAGNITUDE};
use crate::series::Metric;
use crate::AnalysisSettings;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Longest forecast horizon accepted from configuration
const MAX_FORECAST_HORIZON: usize = 24;

/// Configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeritageConfig {
    /// Uncertainty escalation policy (no default; must be chosen explicitly)
    #[serde(default)]
    pub escalation_policy: Option<EscalationPolicy>,

    /// Default metric for trend and comparison commands
    #[serde(default)]
    pub metric: Option<Metric>,

    /// Trend classification and forecast settings
    #[serde(default)]
    pub trend: Option<TrendConfig>,

    /// Threat evolution settings
    #[serde(default)]
    pub evolution: Option<EvolutionConfig>,

    /// Site id filters applied when comparing all sites
    #[serde(default)]
    pub sites: Option<SiteFilterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrendConfig {
    /// Direction dead band as a fraction of the value range (default: 0.1)
    pub epsilon_ratio: Option<f64>,
    /// Number of forecast points (default: 3)
    pub forecast_horizon: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvolutionConfig {
    /// Mean magnitude difference that counts as escalation (default: 1.0)
    pub margin: Option<f64>,
    /// Magnitude at or above which a period is critical (default: 9)
    pub critical_magnitude: Option<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteFilterConfig {
    /// Glob patterns for site ids to include (default: all)
    #[serde(default)]
    pub include: Vec<String>,
    /// Glob patterns for site ids to exclude
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Resolved configuration with compiled site filters
#[derive(Debug)]
pub struct ResolvedConfig {
    pub escalation_policy: Option<EscalationPolicy>,
    pub metric: Metric,
    pub settings: AnalysisSettings,
    /// Compiled include patterns (None means include all)
    pub include: Option<GlobSet>,
    /// Compiled exclude patterns
    pub exclude: GlobSet,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl HeritageConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(ref t) = self.trend {
            if let Some(ratio) = t.epsilon_ratio {
                if !(ratio > 0.0 && ratio <= 1.0) {
                    anyhow::bail!("trend.epsilon_ratio must be in (0, 1] (got {})", ratio);
                }
            }
            if let Some(horizon) = t.forecast_horizon {
                if horizon == 0 || horizon > MAX_FORECAST_HORIZON {
                    anyhow::bail!(
                        "trend.forecast_horizon must be between 1 and {} (got {})",
                        MAX_FORECAST_HORIZON,
                        horizon
                    );
                }
            }
        }

        if let Some(ref e) = self.evolution {
            if let Some(margin) = e.margin {
                if !margin.is_finite() || margin < 0.0 {
                    anyhow::bail!("evolution.margin must be non-negative (got {})", margin);
                }
            }
            if let Some(critical) = e.critical_magnitude {
                if !(MIN_MAGNITUDE..=MAX_MAGNITUDE).contains(&critical) {
                    anyhow::bail!(
                        "evolution.critical_magnitude must be between {} and {} (got {})",
                        MIN_MAGNITUDE,
                        MAX_MAGNITUDE,
                        critical
                    );
                }
            }
        }

        if let Some(ref sites) = self.sites {
            for pattern in &sites.include {
                Glob::new(pattern)
                    .with_context(|| format!("invalid sites.include pattern: {}", pattern))?;
            }
            for pattern in &sites.exclude {
                Glob::new(pattern)
                    .with_context(|| format!("invalid sites.exclude pattern: {}", pattern))?;
            }
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let defaults = AnalysisSettings::default();
        let (trend_epsilon_ratio, forecast_horizon) = match &self.trend {
            Some(t) => (
                t.epsilon_ratio.unwrap_or(defaults.trend_epsilon_ratio),
                t.forecast_horizon.unwrap_or(defaults.forecast_horizon),
            ),
            None => (defaults.trend_epsilon_ratio, defaults.forecast_horizon),
        };
        let (evolution_margin, critical_magnitude) = match &self.evolution {
            Some(e) => (
                e.margin.unwrap_or(defaults.evolution_margin),
                e.critical_magnitude.unwrap_or(defaults.critical_magnitude),
            ),
            None => (defaults.evolution_margin, defaults.critical_magnitude),
        };

        let filters = self.sites.clone().unwrap_or_default();
        let include = if filters.include.is_empty() {
            None
        } else {
            Some(build_globset(&filters.include)?)
        };
        let exclude = build_globset(&filters.exclude)?;

        Ok(ResolvedConfig {
            escalation_policy: self.escalation_policy,
            metric: self.metric.unwrap_or_default(),
            settings: AnalysisSettings {
                trend_epsilon_ratio,
                forecast_horizon,
                evolution_margin,
                critical_magnitude,
            },
            include,
            exclude,
            config_path: None,
        })
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

impl ResolvedConfig {
    /// Check whether a site id passes the include/exclude filters
    pub fn should_include_site(&self, site_id: &str) -> bool {
        if self.exclude.is_match(site_id) {
            return false;
        }
        match self.include {
            Some(ref include) => include.is_match(site_id),
            None => true,
        }
    }

    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        HeritageConfig::default().resolve()
    }
}

/// Discover and load a config file from a directory
///
/// Search order:
/// 1. `.heritagerc.json`
/// 2. `heritage.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(root: &Path) -> Result<Option<(HeritageConfig, PathBuf)>> {
    for name in [".heritagerc.json", "heritage.config.json"] {
        let path = root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<HeritageConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: HeritageConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `root`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(root)? {
            Some((config, path)) => (config, Some(path)),
            None => (HeritageConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    if let Some(path) = &resolved.config_path {
        tracing::debug!(path = %path.display(), "resolved configuration");
    }
    Ok(resolved)
}
