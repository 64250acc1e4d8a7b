//! Logging bootstrap for the binary. JSON output for soak runs, pretty
//! output for interactive use, optional append-mode file sink.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let sink: Box<dyn Layer<Registry> + Send + Sync> = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            format_layer(config, Arc::new(file))
        }
        None => format_layer(config, std::io::stderr),
    };

    // The boxed sink only implements Layer<Registry>, so it goes on the
    // registry first; EnvFilter layers over any subscriber.
    tracing_subscriber::registry().with(sink).with(filter).init();
    Ok(())
}

fn format_layer<W>(config: &LoggingConfig, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    if config.format == "json" {
        Box::new(
            fmt::layer()
                .json()
                .with_target(true)
                .with_line_number(true)
                .with_writer(writer),
        )
    } else {
        Box::new(fmt::layer().pretty().with_target(true).with_writer(writer))
    }
}

fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("invalid log level: {level}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_levels_parse() {
        for level in ["trace", "debug", "info", "warn", "warning", "error", "INFO"] {
            assert!(parse_log_level(level).is_ok(), "{level}");
        }
        assert!(parse_log_level("verbose").is_err());
    }
}
