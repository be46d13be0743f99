use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Workspace crates whose events follow `--log-level`.
const CHANPRIMS_TARGETS: &[&str] = &[
    "chanprims",
    "chanprims_codec",
    "chanprims_transport",
    "chanprims_channel",
    "chanprims_plugin",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Per-target filter: chanprims crates log at `level`, dependencies such as
/// the tokio runtime never below warn.
pub fn log_filter(level: LogLevel) -> Targets {
    let requested = level.as_filter();
    CHANPRIMS_TARGETS.iter().fold(
        Targets::new().with_default(requested.min(LevelFilter::WARN)),
        |filter, target| filter.with_target(*target, requested),
    )
}

/// Install the stderr subscriber. Library crates only emit through `tracing`.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(log_filter(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn workspace_crates_follow_requested_level() {
        let filter = log_filter(LogLevel::Trace);
        assert!(filter.would_enable("chanprims_channel::messenger", &Level::TRACE));
        assert!(filter.would_enable("chanprims::cmd::echo", &Level::DEBUG));
    }

    #[test]
    fn dependencies_are_capped_at_warn() {
        let filter = log_filter(LogLevel::Debug);
        assert!(!filter.would_enable("tokio::runtime", &Level::DEBUG));
        assert!(filter.would_enable("tokio::runtime", &Level::WARN));

        let quiet = log_filter(LogLevel::Error);
        assert!(!quiet.would_enable("tokio::runtime", &Level::WARN));
        assert!(!quiet.would_enable("chanprims_codec::standard", &Level::WARN));
        assert!(quiet.would_enable("chanprims_codec::standard", &Level::ERROR));
    }
}
