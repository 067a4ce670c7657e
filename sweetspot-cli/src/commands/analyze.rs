//! Implementation of the `analyze` subcommand: scene-complexity window
//! selection, optionally followed by sample extraction.

use anyhow::{Context, bail};
use console::style;
use std::path::{Path, PathBuf};

use sweetspot_core::external::{
    FfprobeFrameProber, SidecarSpawner, check_dependency, extract_sample,
};
use sweetspot_core::{
    OptimizerConfig, ProcessContext, SampleWindow, SceneComplexityAnalyzer, WindowSelection,
};

use crate::cli::{AnalyzeArgs, WindowArgs};

/// Fails early with a readable message when the input is missing.
pub fn ensure_input(input: &Path) -> anyhow::Result<()> {
    if !input.is_file() {
        bail!("Input file '{}' does not exist or is not a file", input.display());
    }
    Ok(())
}

pub fn prober(args: &WindowArgs, ctx: &ProcessContext) -> anyhow::Result<FfprobeFrameProber> {
    check_dependency(&args.ffprobe)
        .with_context(|| format!("ffprobe is required ({})", args.ffprobe.display()))?;
    Ok(FfprobeFrameProber::new(ctx.clone()).with_program(args.ffprobe.clone()))
}

/// Runs the analyzer with the window options from the command line.
pub fn select_window(
    input: &Path,
    args: &WindowArgs,
    config: &OptimizerConfig,
    ctx: &ProcessContext,
) -> anyhow::Result<WindowSelection> {
    let prober = prober(args, ctx)?;
    let selection = SceneComplexityAnalyzer::new(&prober, config.analysis.clone())
        .with_strategy(args.strategy.into())
        .with_cancellation(ctx.cancel.clone())
        .find_window(input, args.duration, args.mode.into(), args.method.into())
        .with_context(|| format!("Scene analysis of {} failed", input.display()))?;

    if selection.is_heuristic() {
        log::warn!(
            "No frame data could be analyzed; using the fixed window {}",
            selection.window
        );
    }
    Ok(selection)
}

/// Cuts the selected window into `dir` with stream copy.
pub fn extract(
    input: &Path,
    window: &SampleWindow,
    dir: &Path,
    ctx: &ProcessContext,
) -> anyhow::Result<PathBuf> {
    check_dependency(Path::new("ffmpeg")).context("ffmpeg is required to extract samples")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create sample directory {}", dir.display()))?;
    let sample = extract_sample(&SidecarSpawner, input, window, dir, &ctx.cancel)
        .context("Sample extraction failed")?;
    log::info!("Sample written to {}", sample.display());
    Ok(sample)
}

pub fn run_analyze(
    args: AnalyzeArgs,
    config: &OptimizerConfig,
    ctx: &ProcessContext,
) -> anyhow::Result<()> {
    ensure_input(&args.input)?;
    let selection = select_window(&args.input, &args.window, config, ctx)?;
    let sample = match &args.extract_to {
        Some(dir) => Some(extract(&args.input, &selection.window, dir, ctx)?),
        None => None,
    };

    if args.json {
        let mut value = serde_json::to_value(selection).context("Failed to serialize selection")?;
        if let Some(sample) = &sample {
            value["sample"] = serde_json::Value::String(sample.display().to_string());
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", style("===== Scene Analysis =====").bold());
    println!("  {:<14}{}", "Input:", args.input.display());
    println!("  {:<14}{}", "Window:", selection.window);
    println!("  {:<14}{:.2}s", "Target:", selection.target);
    let source = if selection.is_heuristic() {
        "heuristic (no usable frame data)".to_string()
    } else {
        format!("analysis of {} second(s)", selection.analyzed_seconds)
    };
    println!("  {:<14}{}", "Source:", source);
    if let Some(sample) = sample {
        println!("  {:<14}{}", "Sample:", sample.display());
    }
    Ok(())
}
