#![forbid(unsafe_code)]

//! `tracing` setup for the scenario runner.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Install a stderr formatter filtered by `directives`.
///
/// Malformed directives fall back to `info`. Returns `false` when a global
/// subscriber was already installed.
pub fn init(directives: &str) -> bool {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|err| {
        eprintln!("ignoring log filter {directives:?}: {err}");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_existing_subscriber() {
        let _ = init("warn");
        assert!(!init("definitely not a filter [[["));
    }
}
