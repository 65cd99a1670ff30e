use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable with a tracing filter directive, e.g. `gradecalcd=debug`.
pub const LOG_ENV: &str = "GRADECALCD_LOG";
/// Set to `1`/`true` for JSON log lines.
pub const LOG_JSON_ENV: &str = "GRADECALCD_LOG_JSON";

const DEFAULT_LEVEL: &str = "gradecalcd=warn";

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Initialize structured logging on stderr. stdout carries the protocol and
/// must never receive log output.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    let registry = tracing_subscriber::registry().with(filter);

    if env_flag(LOG_JSON_ENV) {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
