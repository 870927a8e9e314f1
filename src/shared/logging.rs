use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_LEVEL_VAR: &str = "CERN_EGROUP_LOG_LEVEL";

/// Map a user supplied level name to a filter directive, defaulting to info
pub fn level_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

/// Default filter when `RUST_LOG` is unset
pub fn default_filter(level: &str) -> String {
    format!("cern_egroup={},ldap3=warn", level_directive(level))
}

/// Install the global subscriber. Output goes to stderr so stdout stays
/// machine-readable.
pub fn init_logging() {
    let level = std::env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&level).into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
