use anyhow::Result;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

/// Install the service subscriber. `RUST_LOG` overrides `level`, which
/// applies to the core crate and this service; request spans from tower-http
/// are always kept at debug so the trace layer shows up.
pub fn init_tracing(level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(service_filter(level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn service_filter(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    format!("{level},marketresearch_core={level},marketresearch_gui={level},tower_http=debug")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_covers_service_crates() {
        let filter = service_filter("warn");
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("marketresearch_gui=warn"));
        assert!(filter.contains("tower_http=debug"));
        assert!(EnvFilter::try_new(&filter).is_ok());
    }

    #[test]
    fn blank_level_falls_back_to_info() {
        assert!(service_filter("  ").starts_with("info,"));
    }
}
