use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable that replaces the `--log-level` filter entirely,
/// e.g. `DIFI_LOG=difi_frame=trace,info`.
pub const LOG_ENV: &str = "DIFI_LOG";

/// Crates whose events follow `--log-level`. Everything else stays at warn.
const DIFI_TARGETS: [&str; 4] = ["difi", "difi_stream", "difi_frame", "difi_transport"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Filter directives for `level` scoped to the difi crates.
fn directives(level: LogLevel) -> String {
    DIFI_TARGETS
        .iter()
        .fold(String::from("warn"), |mut out, target| {
            out.push(',');
            out.push_str(target);
            out.push('=');
            out.push_str(level.as_str());
            out
        })
}

/// Install the stderr subscriber. Stdout is reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(directives(level)));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().with_current_span(false).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_applies_to_difi_crates_only() {
        assert_eq!(
            directives(LogLevel::Debug),
            "warn,difi=debug,difi_stream=debug,difi_frame=debug,difi_transport=debug"
        );
    }

    #[test]
    fn directives_parse() {
        for level in [LogLevel::Error, LogLevel::Trace] {
            assert!(EnvFilter::try_new(directives(level)).is_ok());
        }
    }
}
