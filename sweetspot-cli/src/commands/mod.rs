//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of a specific command.

/// Scene-complexity window selection and sample extraction.
pub mod analyze;
pub mod codecs;
/// Preset/quality sweeps and target-quality searches.
pub mod optimize;

pub use analyze::run_analyze;
pub use codecs::run_codecs;
pub use optimize::run_optimize;
