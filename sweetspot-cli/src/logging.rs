// ============================================================================
// sweetspot-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: env_logger backend for the `log` facade
//
// The core only emits `log` records; this is the one place a logger is
// installed. Levels:
// - RUST_LOG=info (default): run milestones, fallbacks, worker capping
// - RUST_LOG=debug (or --verbose): per-trial and per-probe detail
// - RUST_LOG=trace: raw process output

use env_logger::Env;
use log::LevelFilter;

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Installs the global logger. Safe to call more than once; later calls are
/// ignored.
pub fn init_logging(verbose: bool) {
    let env = Env::default().default_filter_or(default_filter(verbose));
    let result = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(verbose)
        .try_init();
    if result.is_ok() && verbose {
        log::debug!("Verbose logging enabled (max level {})", log::max_level());
    }
}

/// Whether info-level output is currently enabled.
pub fn info_enabled() -> bool {
    log::max_level() >= LevelFilter::Info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "info");
        assert_eq!(default_filter(true), "debug");
    }
}
