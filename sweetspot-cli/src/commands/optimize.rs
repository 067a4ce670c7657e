//! Implementation of the `optimize` subcommand.
//!
//! Resolves the codec, presets and quality range, gets a sample (given,
//! analyzed or at a fixed start), then hands the trials to the core
//! orchestrator and reports the Pareto front and sweet spot.

use anyhow::{Context, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sweetspot_core::codecs::{self, CodecSpec};
use sweetspot_core::external::{CommandTrialRunner, FrameProber, MetricToggles, TrialSettings};
use sweetspot_core::orchestrator::{plan_worker_count, sweep_tasks};
use sweetspot_core::results::ActiveMetrics;
use sweetspot_core::{
    OptimizerConfig, Orchestrator, ProcessContext, QualityRange, RunSummary, SampleWindow,
};

use crate::cli::OptimizeArgs;
use crate::commands::analyze::{ensure_input, extract, prober, select_window};
use crate::output::{OptimizationReport, RunContext, RunMode};
use crate::progress::CliObserver;

/// Presets to run, in the codec's speed order. Empty means the default preset.
pub fn resolve_presets(codec: &CodecSpec, requested: &[String]) -> anyhow::Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(vec![codec.default_preset.to_string()]);
    }
    for preset in requested {
        codec.validate_preset(preset)?;
    }
    let mut presets = requested.to_vec();
    presets.sort_by_key(|p| codec.preset_index(p));
    presets.dedup();
    Ok(presets)
}

/// Quality range from the flags, defaulting each bound to the codec's.
pub fn resolve_range(
    codec: &CodecSpec,
    min: Option<u32>,
    max: Option<u32>,
) -> anyhow::Result<QualityRange> {
    let range = QualityRange::new(
        min.unwrap_or(codec.quality_range.min),
        max.unwrap_or(codec.quality_range.max),
    )?;
    codec.validate_quality_range(&range)?;
    Ok(range)
}

fn trial_settings(args: &OptimizeArgs, sample: &Path) -> TrialSettings {
    let mut settings = TrialSettings::new(args.codec.clone(), sample);
    settings.audio_mode = args.audio.into();
    settings.metrics = MetricToggles {
        psnr: args.psnr,
        ssim: args.ssim,
        blockdetect: args.blockdetect,
    };
    settings.advanced_options = args.options.iter().cloned().collect();
    settings.quality_model_path = args.quality_model.clone();
    settings
}

/// Where the extracted sample and trial directories go. Without a configured
/// directory a private temporary one is created and removed with the run.
pub enum WorkDir {
    Configured(PathBuf),
    Scoped(tempfile::TempDir),
}

impl WorkDir {
    pub fn prepare(configured: Option<&PathBuf>) -> anyhow::Result<Self> {
        match configured {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create work directory {}", dir.display()))?;
                Ok(Self::Configured(dir.clone()))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("sweetspot_")
                    .tempdir()
                    .context("Failed to create a temporary work directory")?;
                log::debug!("Using temporary work directory {}", dir.path().display());
                Ok(Self::Scoped(dir))
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Configured(dir) => dir,
            Self::Scoped(dir) => dir.path(),
        }
    }
}

/// Gets the sample the trials encode, and the window it was cut from.
fn prepare_sample(
    args: &OptimizeArgs,
    config: &OptimizerConfig,
    work_root: &Path,
    ctx: &ProcessContext,
) -> anyhow::Result<(PathBuf, Option<SampleWindow>)> {
    if let Some(sample) = &args.sample {
        if !sample.is_file() {
            bail!("Sample file '{}' does not exist", sample.display());
        }
        return Ok((sample.clone(), None));
    }

    let window = match args.start {
        Some(start) => {
            let prober = prober(&args.window, ctx)?;
            let source_duration = prober.source_duration(&args.input)?;
            let window = SampleWindow::new(start, args.window.duration, source_duration)?;
            log::info!("Using requested window {}", window);
            window
        }
        None => select_window(&args.input, &args.window, config, ctx)?.window,
    };
    let sample = extract(&args.input, &window, work_root, ctx)?;
    Ok((sample, Some(window)))
}

/// Runs the optimization. Returns whether the run was cancelled.
pub fn run_optimize(
    args: OptimizeArgs,
    config: &OptimizerConfig,
    ctx: &ProcessContext,
) -> anyhow::Result<bool> {
    ensure_input(&args.input)?;
    let codec = codecs::lookup(&args.codec)?;
    let presets = resolve_presets(codec, &args.presets)?;
    let range = resolve_range(codec, args.quality_min, args.quality_max)?;
    if let Some(target) = args.target_vmaf {
        if !(0.0..=100.0).contains(&target) {
            bail!("Target VMAF must be between 0 and 100, got {target}");
        }
    }

    let work = WorkDir::prepare(args.work_dir.as_ref().or(config.orchestrator.work_dir.as_ref()))?;
    let work_root = work.path().to_path_buf();

    let (sample, window) = prepare_sample(&args, config, &work_root, ctx)?;
    if ctx.cancel.is_cancelled() {
        log::warn!("Cancelled before any trial ran");
        return Ok(true);
    }

    let settings = trial_settings(&args, &sample);
    settings.validate().context("Invalid trial settings")?;

    let requested = args.jobs.unwrap_or(config.orchestrator.parallel_jobs);
    let plan = plan_worker_count(requested, codec);

    let runner = CommandTrialRunner::new(&args.service, settings, &work_root)
        .with_args(args.service_args.iter().cloned());
    let orchestrator = Orchestrator::new(Arc::new(runner), config.orchestrator.clone(), ctx.clone())
        .with_search_config(config.search.clone())
        .with_workers(plan.workers);

    let (summary, mode) = execute(&orchestrator, &args, &presets, range)?;

    let run = RunContext {
        input: &args.input,
        codec,
        sample: &sample,
        window,
        mode,
        workers: plan,
        metrics: ActiveMetrics {
            psnr: args.psnr,
            ssim: args.ssim,
            block_score: args.blockdetect,
        },
    };
    let report = OptimizationReport::build(&run, &summary);
    report.print_summary();
    if let Some(path) = &args.report {
        report.write_json(path)?;
        log::info!("Report written to {}", path.display());
    }
    Ok(summary.cancelled)
}

fn execute(
    orchestrator: &Orchestrator,
    args: &OptimizeArgs,
    presets: &[String],
    range: QualityRange,
) -> anyhow::Result<(RunSummary, RunMode)> {
    match args.target_vmaf {
        Some(target) => {
            let mut observer = CliObserver::new(presets.len());
            let summary = orchestrator.run_target_search(presets, range, target, &mut observer);
            observer.finish();
            Ok((summary?, RunMode::TargetSearch { target_vmaf: target }))
        }
        None => {
            let tasks = sweep_tasks(presets, range, args.step);
            let mut observer = CliObserver::new(tasks.len());
            let summary = orchestrator.run_range_sweep(tasks, &mut observer);
            observer.finish();
            Ok((summary?, RunMode::RangeSweep { step: args.step }))
        }
    }
}
