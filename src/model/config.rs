use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::company::IndustryLabel;

const ENV_CONFIG_PATH: &str = "EVP_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const ENV_SEARCH_API_KEY: &str = "SEARCH_API_KEY";
const ENV_SEARCH_ENDPOINT: &str = "SEARCH_ENDPOINT";

/// Tolerance when checking that scoring weights sum to 1.0
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Scoring weights must be non-negative and sum to 1.0 (got {0:.4})")]
    InvalidWeights(f64),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Evidence retrieval configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Allowed domains (whitelist). If empty, all domains are allowed.
    pub allow: Vec<String>,
    /// Denied domains (blacklist). Applied after allow list.
    pub deny: Vec<String>,
    /// Per-call timeout for a search query
    pub timeout_secs: u64,
    /// Snippets kept per query
    pub max_results: usize,
    /// Maximum outstanding calls to the search provider
    pub max_concurrent: usize,
    /// Retries after a rate-limit response
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            timeout_secs: 10,
            max_results: 5,
            max_concurrent: 4,
            max_retries: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl RetrieverConfig {
    /// Check if a URL is allowed based on the allow/deny lists
    pub fn is_url_allowed(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        };

        // If deny list contains the host, reject
        if self.deny.iter().any(|d| host.contains(&d.to_lowercase())) {
            return false;
        }

        // If allow list is empty, allow all (except denied)
        if self.allow.is_empty() {
            return true;
        }

        // Otherwise, check if host matches any allow pattern
        self.allow.iter().any(|a| host.contains(&a.to_lowercase()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Language-model call policy shared by all phases
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelPolicyConfig {
    pub timeout_secs: u64,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for ModelPolicyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_concurrent: 4,
            max_retries: 3,
            initial_backoff_ms: 500,
        }
    }
}

/// Weights of the five quality sub-metrics
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringWeights {
    pub factual_basis: f64,
    pub ir_coverage: f64,
    pub business_logic: f64,
    pub speculation_disclosure: f64,
    pub citation: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            factual_basis: 0.30,
            ir_coverage: 0.20,
            business_logic: 0.20,
            speculation_disclosure: 0.15,
            citation: 0.15,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.factual_basis
            + self.ir_coverage
            + self.business_logic
            + self.speculation_disclosure
            + self.citation
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            self.factual_basis,
            self.ir_coverage,
            self.business_logic,
            self.speculation_disclosure,
            self.citation,
        ];
        let sum = self.sum();
        if all.iter().any(|w| *w < 0.0 || !w.is_finite()) || (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ConfigError::InvalidWeights(sum));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Upper bound on the total when the run had no evidence at all
    pub model_only_cap: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            model_only_cap: 70,
        }
    }
}

/// Weight of one blocking finding per category in business_logic_consistency
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlockingWeights {
    pub industry_mismatch: f64,
    pub competitor_mismatch: f64,
    pub contradiction: f64,
    pub unsupported_figure: f64,
}

impl Default for BlockingWeights {
    fn default() -> Self {
        Self {
            industry_mismatch: 1.0,
            competitor_mismatch: 0.5,
            contradiction: 1.0,
            unsupported_figure: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Identity confidence below this is treated as low
    pub low_confidence_threshold: f64,
    /// Weighted blocking count that drives consistency to zero
    pub blocking_baseline: f64,
    pub blocking_weights: BlockingWeights,
    /// Allowed relative excess of segment sums over total revenue
    pub segment_tolerance: f64,
    /// Allowed gap, in percentage points, between stated and derived margin
    pub margin_tolerance_points: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: 0.5,
            blocking_baseline: 4.0,
            blocking_weights: BlockingWeights::default(),
            segment_tolerance: 0.02,
            margin_tolerance_points: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Order-of-magnitude band for one industry
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IndustryBand {
    pub revenue_usd_million: Band,
    pub market_cap_usd_million: Band,
    pub headcount: Band,
}

impl Default for IndustryBand {
    fn default() -> Self {
        Self {
            revenue_usd_million: Band::new(1.0, 700_000.0),
            market_cap_usd_million: Band::new(1.0, 4_000_000.0),
            headcount: Band::new(5.0, 3_000_000.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlausibilityConfig {
    /// Rate used to normalize JPY amounts to USD
    pub jpy_per_usd: f64,
    pub default_band: IndustryBand,
    pub overrides: HashMap<IndustryLabel, IndustryBand>,
    pub growth_rate_percent: Band,
    pub margin_percent: Band,
}

impl Default for PlausibilityConfig {
    fn default() -> Self {
        let mut overrides = HashMap::new();
        overrides.insert(
            IndustryLabel::HrStaffing,
            IndustryBand {
                revenue_usd_million: Band::new(1.0, 60_000.0),
                market_cap_usd_million: Band::new(1.0, 150_000.0),
                headcount: Band::new(5.0, 800_000.0),
            },
        );
        overrides.insert(
            IndustryLabel::RealEstate,
            IndustryBand {
                revenue_usd_million: Band::new(1.0, 60_000.0),
                market_cap_usd_million: Band::new(1.0, 200_000.0),
                headcount: Band::new(5.0, 200_000.0),
            },
        );
        overrides.insert(
            IndustryLabel::Consulting,
            IndustryBand {
                revenue_usd_million: Band::new(1.0, 80_000.0),
                market_cap_usd_million: Band::new(1.0, 300_000.0),
                headcount: Band::new(5.0, 900_000.0),
            },
        );

        Self {
            jpy_per_usd: 150.0,
            default_band: IndustryBand::default(),
            overrides,
            growth_rate_percent: Band::new(-90.0, 300.0),
            margin_percent: Band::new(-100.0, 100.0),
        }
    }
}

impl PlausibilityConfig {
    pub fn band_for(&self, label: IndustryLabel) -> &IndustryBand {
        self.overrides.get(&label).unwrap_or(&self.default_band)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.jpy_per_usd.is_finite() || self.jpy_per_usd <= 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "plausibility.jpy_per_usd must be positive (got {})",
                self.jpy_per_usd
            )));
        }

        let industry_bands = std::iter::once(("default", &self.default_band)).chain(
            self.overrides
                .iter()
                .map(|(label, band)| (label.as_str(), band)),
        );
        for (name, band) in industry_bands {
            for (field, b) in [
                ("revenue_usd_million", &band.revenue_usd_million),
                ("market_cap_usd_million", &band.market_cap_usd_million),
                ("headcount", &band.headcount),
            ] {
                if b.min > b.max {
                    return Err(ConfigError::InvalidValue(format!(
                        "plausibility band {}.{} has min above max",
                        name, field
                    )));
                }
            }
        }
        for (field, b) in [
            ("growth_rate_percent", &self.growth_rate_percent),
            ("margin_percent", &self.margin_percent),
        ] {
            if b.min > b.max {
                return Err(ConfigError::InvalidValue(format!(
                    "plausibility.{} has min above max",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub retrieval: RetrieverConfig,
    pub models: ModelPolicyConfig,
    pub scoring: ScoringConfig,
    pub validation: ValidationConfig,
    pub plausibility: PlausibilityConfig,
}

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub retrieval: RetrieverConfig,
    pub models: ModelPolicyConfig,
    pub scoring: ScoringConfig,
    pub validation: ValidationConfig,
    pub plausibility: PlausibilityConfig,
    /// Absent means the pipeline runs in no-evidence mode
    pub search_api_key: Option<String>,
    pub search_endpoint: Option<Url>,
}

impl Config {
    /// Load configuration from environment and config file
    pub fn from_env() -> Self {
        let config_path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let file = Self::load_config_file(&config_path).unwrap_or_default();
        let mut config = Self::from_file(file);

        config.search_api_key = std::env::var(ENV_SEARCH_API_KEY)
            .ok()
            .filter(|k| !k.trim().is_empty());
        config.search_endpoint = std::env::var(ENV_SEARCH_ENDPOINT)
            .ok()
            .and_then(|e| match Url::parse(&e) {
                Ok(url) => Some(url),
                Err(err) => {
                    tracing::warn!(endpoint = %e, error = %err, "Ignoring invalid search endpoint");
                    None
                }
            });

        config
    }

    /// Build from a parsed file, replacing invalid weights and bands with defaults
    pub fn from_file(file: ConfigFile) -> Self {
        let mut scoring = file.scoring;
        if let Err(e) = scoring.weights.validate() {
            tracing::warn!(error = %e, "Invalid scoring weights, using defaults");
            scoring.weights = ScoringWeights::default();
        }

        let mut plausibility = file.plausibility;
        if let Err(e) = plausibility.validate() {
            tracing::warn!(error = %e, "Invalid plausibility settings, using defaults");
            plausibility = PlausibilityConfig::default();
        }

        Self {
            retrieval: file.retrieval,
            models: file.models,
            scoring,
            validation: file.validation,
            plausibility,
            search_api_key: None,
            search_endpoint: None,
        }
    }

    /// Load configuration from YAML file
    fn load_config_file(path: &str) -> Option<ConfigFile> {
        let path = Path::new(path);

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => Self::parse_yaml(&contents, path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }

    fn parse_yaml(contents: &str, path: &Path) -> Option<ConfigFile> {
        // Handle empty file
        let contents = contents.trim();
        if contents.is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Some(ConfigFile::default());
        }

        match serde_yaml::from_str(contents) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded configuration from file");
                Some(config)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                None
            }
        }
    }
}
