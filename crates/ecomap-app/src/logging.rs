use crate::config::LoggingConfig;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const CRATE_TARGETS: [&str; 2] = ["ecomap_economics", "ecomap_app"];

/// Filter directives for the configured level. `RUST_LOG` wins when set.
pub fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let default_directives = CRATE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, config.level))
        .collect::<Vec<_>>()
        .join(",");
    let mut filter =
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(default_directives));

    for (module, level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }
    Ok(filter)
}

/// Initialize the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::registry().with(build_filter(config)?);

    let file = match &config.file_output {
        Some(path) => Some(Mutex::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        )),
        None => None,
    };

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true);
            let file_layer = file.map(|file| fmt::layer().json().with_writer(file).with_ansi(false));
            subscriber.with(json_layer).with(file_layer).try_init()?;
        }
        "compact" => {
            let compact_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_thread_ids(false)
                .with_line_number(false)
                .with_file(false);
            let file_layer =
                file.map(|file| fmt::layer().compact().with_writer(file).with_ansi(false));
            subscriber.with(compact_layer).with(file_layer).try_init()?;
        }
        _ => {
            // Source locations only help at debug and below.
            let show_location = matches!(config.level.as_str(), "debug" | "trace");
            let pretty_layer = fmt::layer()
                .with_target(show_location)
                .with_thread_ids(false)
                .with_line_number(show_location)
                .with_file(show_location);
            let file_layer = file.map(|file| fmt::layer().with_writer(file).with_ansi(false));
            subscriber.with(pretty_layer).with(file_layer).try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_filter_must_parse() {
        let mut config = LoggingConfig::default();
        config
            .module_filters
            .insert("ecomap_app::market".to_string(), "debug".to_string());
        assert!(build_filter(&config).is_ok());

        config
            .module_filters
            .insert("ecomap_app::escrow".to_string(), "loud".to_string());
        assert!(build_filter(&config).is_err());
    }
}
