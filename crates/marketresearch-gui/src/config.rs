use anyhow::{Context, Result};
use marketresearch_core::{ConfigLoader, CrewConfig};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    pub gui_enabled: bool,
    pub auth_token: Option<String>,
    pub output_dir: PathBuf,
    pub report_title: String,
    pub generation_timeout: Duration,
    pub max_reports: usize,
    pub log_level: String,
    pub crew: CrewConfig,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8080";
    const DEFAULT_TIMEOUT_SECS: u64 = 600;
    const DEFAULT_MAX_REPORTS: usize = 100;

    /// Build from `GUI_*` environment variables layered over the core TOML
    /// configuration.
    pub fn from_env() -> Result<Self> {
        let core = ConfigLoader::load(None).context("failed to load core configuration")?;

        let listen_addr =
            env::var("GUI_LISTEN_ADDR").unwrap_or_else(|_| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrency = env::var("GUI_MAX_CONCURRENCY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|nz| nz.get())
                    .unwrap_or(4)
            });

        let gui_enabled = env::var("GUI_ENABLE_GUI")
            .ok()
            .and_then(|value| parse_bool(&value))
            .unwrap_or(false);

        let auth_token = non_empty_var("GUI_AUTH_TOKEN");

        let output_dir = non_empty_var("GUI_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(core.report.output_dir);

        let generation_timeout = match non_empty_var("GUI_GENERATION_TIMEOUT_SECS") {
            Some(value) => parse_timeout(&value)?,
            None => Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        };

        let max_reports = match non_empty_var("GUI_MAX_REPORTS") {
            Some(value) => parse_positive("GUI_MAX_REPORTS", &value)? as usize,
            None => Self::DEFAULT_MAX_REPORTS,
        };

        let log_level = non_empty_var("GUI_LOG_LEVEL").unwrap_or(core.logging.level);

        let gui_enabled = gui_enabled || auth_token.is_some();

        Ok(Self {
            listen_addr,
            max_concurrency,
            gui_enabled,
            auth_token,
            output_dir,
            report_title: core.report.title,
            generation_timeout,
            max_reports,
            log_level,
            crew: core.crew,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_timeout(input: &str) -> Result<Duration> {
    parse_positive("GUI_GENERATION_TIMEOUT_SECS", input).map(Duration::from_secs)
}

fn parse_positive(key: &str, input: &str) -> Result<u64> {
    input
        .parse::<u64>()
        .ok()
        .filter(|value| *value > 0)
        .with_context(|| format!("{key} must be a positive integer, got {input:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn timeout_must_be_positive() {
        assert_eq!(parse_timeout("30").unwrap(), Duration::from_secs(30));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn report_cap_must_be_positive() {
        assert_eq!(parse_positive("GUI_MAX_REPORTS", "25").unwrap(), 25);
        let err = parse_positive("GUI_MAX_REPORTS", "0").unwrap_err();
        assert!(err.to_string().contains("GUI_MAX_REPORTS"));
    }
}
