//! Run reports: the JSON document written with `--report` and the
//! terminal summary printed after every run.

use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use sweetspot_core::orchestrator::WorkerPlan;
use sweetspot_core::results::ActiveMetrics;
use sweetspot_core::{CodecSpec, RunSummary, SampleWindow, SearchReport, Trial, format_duration};

use crate::progress::describe_trial;

/// How the trials were generated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunMode {
    RangeSweep { step: u32 },
    TargetSearch { target_vmaf: f64 },
}

/// Everything a run produced, with the derived front and sweet spot resolved
/// to trials.
#[derive(Debug, Serialize)]
pub struct OptimizationReport<'a> {
    /// Local time the report was built, RFC 3339.
    pub generated_at: String,
    pub input: &'a Path,
    pub codec: &'static str,
    pub sample: &'a Path,
    pub window: Option<SampleWindow>,
    #[serde(flatten)]
    pub mode: RunMode,
    pub workers: WorkerPlan,
    pub completed: usize,
    pub total: usize,
    pub cancelled: bool,
    pub elapsed_secs: f64,
    pub trials: &'a [Trial],
    pub searches: &'a [SearchReport],
    pub pareto_front: Vec<&'a Trial>,
    pub sweet_spot: Option<&'a Trial>,
    pub best_per_preset: BTreeMap<String, &'a Trial>,
}

/// Inputs describing the run that are not part of `RunSummary`.
pub struct RunContext<'a> {
    pub input: &'a Path,
    pub codec: &'static CodecSpec,
    pub sample: &'a Path,
    pub window: Option<SampleWindow>,
    pub mode: RunMode,
    pub workers: WorkerPlan,
    pub metrics: ActiveMetrics,
}

impl<'a> OptimizationReport<'a> {
    pub fn build(ctx: &RunContext<'a>, summary: &'a RunSummary) -> Self {
        let results = &summary.results;
        let analysis = results.analyze(&ctx.metrics, ctx.codec.presets);

        let pareto_front = analysis
            .front
            .iter()
            .filter_map(|id| results.get(*id))
            .collect();
        let sweet_spot = analysis.sweet_spot.and_then(|id| results.get(id));
        let best_per_preset = analysis
            .best_per_preset
            .iter()
            .filter_map(|(preset, id)| results.get(*id).map(|t| (preset.clone(), t)))
            .collect();

        Self {
            generated_at: chrono::Local::now().to_rfc3339(),
            input: ctx.input,
            codec: ctx.codec.name,
            sample: ctx.sample,
            window: ctx.window,
            mode: ctx.mode,
            workers: ctx.workers,
            completed: summary.completed,
            total: summary.total,
            cancelled: summary.cancelled,
            elapsed_secs: summary.elapsed.as_secs_f64(),
            trials: results.trials(),
            searches: &summary.searches,
            pareto_front,
            sweet_spot,
            best_per_preset,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }

    pub fn print_summary(&self) {
        println!();
        println!("{}", style("===== Optimization Summary =====").bold());
        println!("  {:<14}{}", "Input:", self.input.display());
        println!("  {:<14}{}", "Codec:", self.codec);
        if let Some(window) = &self.window {
            println!("  {:<14}{}", "Sample:", window);
        }
        println!(
            "  {:<14}{}/{} unit(s) on {} worker(s) in {}",
            "Completed:",
            self.completed,
            self.total,
            self.workers.workers,
            format_duration(self.elapsed_secs)
        );
        if self.cancelled {
            println!("  {}", style("Run was cancelled; results are partial").yellow());
        }

        let failed = self.trials.iter().filter(|t| !t.is_success()).count();
        println!(
            "  {:<14}{} ({} failed)",
            "Trials:",
            self.trials.len(),
            failed
        );

        if !self.pareto_front.is_empty() {
            println!();
            println!("{}", style("Pareto front").bold());
            for trial in &self.pareto_front {
                println!("  {}", describe_trial(trial));
            }
        }

        println!();
        match self.sweet_spot {
            Some(trial) => println!(
                "{} {}",
                style("Sweet spot:").bold().green(),
                describe_trial(trial)
            ),
            None => println!(
                "{}",
                style("No sweet spot (needs at least three Pareto-optimal trials)").dim()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use sweetspot_core::{ResultSet, TrialMetrics, codecs};

    fn trial(preset: &str, quality: u32, vmaf: f64, size_mb: f64) -> Trial {
        Trial::success(
            preset,
            quality,
            TrialMetrics {
                vmaf,
                vmaf_1_low: vmaf,
                vmaf_std_dev: 0.0,
                psnr: None,
                ssim: None,
                block_score: None,
                size_mb,
                efficiency: TrialMetrics::compute_efficiency(vmaf, size_mb),
            },
        )
    }

    #[test]
    fn test_report_resolves_front_and_sweet_spot() {
        let codec = codecs::lookup("libx264").unwrap();
        let results = ResultSet::from(vec![
            trial("medium", 18, 98.0, 10.0),
            trial("medium", 23, 96.0, 4.0),
            trial("medium", 28, 90.0, 2.0),
            trial("medium", 33, 80.0, 1.0),
            Trial::failure("medium", 40, "timeout"),
        ]);
        let summary = RunSummary {
            results,
            searches: Vec::new(),
            completed: 5,
            total: 5,
            workers: 2,
            elapsed: Duration::from_secs(42),
            cancelled: false,
        };
        let input = PathBuf::from("in.mkv");
        let sample = PathBuf::from("sample.mkv");
        let ctx = RunContext {
            input: &input,
            codec,
            sample: &sample,
            window: None,
            mode: RunMode::RangeSweep { step: 5 },
            workers: WorkerPlan {
                requested: 2,
                workers: 2,
                cap: None,
            },
            metrics: ActiveMetrics::default(),
        };

        let report = OptimizationReport::build(&ctx, &summary);
        assert_eq!(report.pareto_front.len(), 4);
        assert!(report.sweet_spot.is_some());
        assert_eq!(report.best_per_preset["medium"].quality, 33);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["mode"], "range_sweep");
        assert_eq!(json["step"], 5);
        assert_eq!(json["trials"].as_array().unwrap().len(), 5);
        assert_eq!(json["codec"], "libx264");
        assert!(json["generated_at"].as_str().is_some_and(|t| t.contains('T')));
    }
}
