use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_ENV: &str = "NOAA_LOG";
const DEFAULT_LEVEL: &str = "info";

fn env_filter(raw: Option<&str>) -> EnvFilter {
    raw.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL))
}

/// Installs the stderr fmt layer. Stdout stays reserved for command reports.
pub fn init() {
    let raw = std::env::var(LOG_ENV).ok();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter(raw.as_deref()));

    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_directives_fall_back_to_default_level() {
        assert_eq!(env_filter(Some("noaa_index=loudest")).to_string(), DEFAULT_LEVEL);
        assert_eq!(env_filter(None).to_string(), DEFAULT_LEVEL);
        assert_eq!(env_filter(Some("debug")).to_string(), "debug");
    }
}
