use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::MarketResearchError;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "MARKETRESEARCH_CONFIG";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub crew: CrewConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `MARKETRESEARCH_CONFIG` environment variable.
    /// 3. `config.toml` in the current working directory.
    ///
    /// Only the implicit `config.toml` may be absent, in which case the
    /// built-in defaults are returned.
    pub fn load(path: Option<PathBuf>) -> Result<Config, MarketResearchError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            return Ok(Config::default());
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| MarketResearchError::config_io(candidate.clone(), err))?;
        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from a TOML document.
    pub fn from_toml(raw: &str) -> Result<Config, MarketResearchError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| MarketResearchError::InvalidConfiguration(err.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), MarketResearchError> {
        if config.report.output_dir.as_os_str().is_empty() {
            return Err(MarketResearchError::InvalidConfiguration(
                "report.output_dir must not be empty".into(),
            ));
        }

        if config.report.title.trim().is_empty() {
            return Err(MarketResearchError::InvalidConfiguration(
                "report.title must not be empty".into(),
            ));
        }

        if config.crew.min_sources == 0 {
            return Err(MarketResearchError::InvalidConfiguration(
                "crew.min_sources must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "ReportConfig::default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "ReportConfig::default_title")]
    pub title: String,
}

impl ReportConfig {
    fn default_output_dir() -> PathBuf {
        PathBuf::from("reports")
    }

    fn default_title() -> String {
        "Market Research Report".to_string()
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
            title: Self::default_title(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrewConfig {
    /// Minimum number of sources the search task should gather.
    #[serde(default = "CrewConfig::default_min_sources")]
    pub min_sources: usize,
    #[serde(default = "CrewConfig::default_verbose")]
    pub verbose: bool,
}

impl CrewConfig {
    const fn default_min_sources() -> usize {
        12
    }

    const fn default_verbose() -> bool {
        true
    }
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            min_sources: Self::default_min_sources(),
            verbose: Self::default_verbose(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}
