//! Core engine for finding the best encoder preset and quality value for a
//! source video.
//!
//! The crate covers four stages:
//! - choosing a representative sample window by scene complexity (`analysis`)
//! - running encode-and-measure trials through an external service, either
//!   as a full preset × quality sweep or as a per-preset target-quality
//!   search (`orchestrator`, `search`)
//! - collecting the results (`results`)
//! - reducing them to a Pareto front and a single sweet spot (`results`)
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sweetspot_core::analysis::{ComplexityMode, SceneComplexityAnalyzer, WindowMethod};
//! use sweetspot_core::external::{CommandTrialRunner, FfprobeFrameProber, TrialSettings};
//! use sweetspot_core::orchestrator::{NullObserver, Orchestrator};
//! use sweetspot_core::results::ActiveMetrics;
//! use sweetspot_core::{OptimizerConfig, ProcessContext, QualityRange, codecs};
//! use std::path::Path;
//!
//! let config = OptimizerConfig::default();
//! let ctx = ProcessContext::default();
//!
//! let prober = FfprobeFrameProber::new(ctx.clone());
//! let selection = SceneComplexityAnalyzer::new(&prober, config.analysis.clone())
//!     .find_window(
//!         Path::new("input.mkv"),
//!         10.0,
//!         ComplexityMode::MostComplex,
//!         WindowMethod::SlidingWindow,
//!     )
//!     .unwrap();
//! println!("sample window: {}", selection.window);
//!
//! let settings = TrialSettings::new("libx264", "/tmp/sample.mkv");
//! let runner = CommandTrialRunner::new("my-trial-service", settings, config.orchestrator.work_root());
//! let orchestrator = Orchestrator::new(Arc::new(runner), config.orchestrator.clone(), ctx);
//!
//! let presets = vec!["medium".to_string(), "slow".to_string()];
//! let summary = orchestrator
//!     .run_target_search(&presets, QualityRange::new(18, 40).unwrap(), 93.0, &mut NullObserver)
//!     .unwrap();
//!
//! let codec = codecs::lookup("libx264").unwrap();
//! let report = summary.results.analyze(&ActiveMetrics::default(), codec.presets);
//! println!("sweet spot: {:?}", report.sweet_spot);
//! ```

pub mod analysis;
pub mod codecs;
pub mod config;
pub mod error;
pub mod external;
pub mod orchestrator;
pub mod results;
pub mod search;
pub mod util;
pub mod utils;

// Re-exports for public API
pub use analysis::{
    AcquisitionStrategy, ComplexityMode, SampleWindow, SceneComplexityAnalyzer, WindowMethod,
    WindowSelection,
};
pub use codecs::{CodecSpec, QualityRange};
pub use config::{
    AnalysisConfig, OptimizerConfig, OptimizerConfigBuilder, OrchestratorConfig, SearchConfig,
};
pub use error::{CoreError, CoreResult};
pub use orchestrator::{Orchestrator, RunObserver, RunSummary, TrialTask};
pub use results::{AnalysisReport, ResultSet, Trial, TrialMetrics, TrialOutcome, TrialStatus};
pub use search::{QualitySearch, SearchOutcome, SearchReport};
pub use util::{CancellationToken, ProcessContext};
pub use utils::format_duration;
