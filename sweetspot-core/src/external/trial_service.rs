//! Client for the external encoder/prober service.
//!
//! One trial = one service invocation: the request is written to the
//! service's stdin as a single JSON document, stdout is streamed line by line
//! (each line is a cancellation point) and the last JSON object printed is the
//! response. Service failures never escape as errors: they become failed
//! `Trial`s.

use crate::codecs::{self, CodecSpec};
use crate::error::CoreResult;
use crate::results::{Trial, TrialMetrics, TrialOutcome};
use crate::util::process::{ProcessContext, StreamExit, run_streaming};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// What happens to the sample's audio during a trial encode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    #[default]
    Remove,
    Copy,
    Transcode,
}

/// Optional metrics the service should compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricToggles {
    pub psnr: bool,
    pub ssim: bool,
    pub blockdetect: bool,
}

/// Colour description passed through to the encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMetadata {
    pub primaries: Option<String>,
    pub transfer: Option<String>,
    pub matrix: Option<String>,
    pub range: Option<String>,
}

/// Run-wide trial parameters shared by every (preset, quality) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSettings {
    pub codec: String,
    #[serde(default)]
    pub audio_mode: AudioMode,
    #[serde(default)]
    pub advanced_options: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: MetricToggles,
    pub quality_model_path: Option<PathBuf>,
    pub color_metadata: Option<ColorMetadata>,
    pub sample_path: PathBuf,
}

impl TrialSettings {
    pub fn new(codec: impl Into<String>, sample_path: impl Into<PathBuf>) -> Self {
        Self {
            codec: codec.into(),
            audio_mode: AudioMode::default(),
            advanced_options: BTreeMap::new(),
            metrics: MetricToggles::default(),
            quality_model_path: None,
            color_metadata: None,
            sample_path: sample_path.into(),
        }
    }

    /// Resolves the codec and checks the advanced options against its schema.
    pub fn validate(&self) -> CoreResult<&'static CodecSpec> {
        let spec = codecs::lookup(&self.codec)?;
        spec.validate_options(&self.advanced_options)?;
        Ok(spec)
    }

    pub fn request(&self, preset: &str, quality: u32, work_dir: &Path) -> TrialRequest {
        TrialRequest {
            codec: self.codec.clone(),
            preset: preset.to_string(),
            quality,
            audio_mode: self.audio_mode,
            advanced_options: self.advanced_options.clone(),
            metrics: self.metrics,
            quality_model_path: self.quality_model_path.clone(),
            color_metadata: self.color_metadata.clone(),
            sample_path: self.sample_path.clone(),
            work_dir: work_dir.to_path_buf(),
        }
    }
}

/// Request document sent to the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRequest {
    pub codec: String,
    pub preset: String,
    pub quality: u32,
    pub audio_mode: AudioMode,
    pub advanced_options: BTreeMap<String, String>,
    pub metrics: MetricToggles,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_model_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_metadata: Option<ColorMetadata>,
    pub sample_path: PathBuf,
    pub work_dir: PathBuf,
}

/// Response document printed by the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceResponse {
    pub status: String,
    pub message: Option<String>,
    pub vmaf: Option<f64>,
    pub vmaf_1_low: Option<f64>,
    pub vmaf_std_dev: Option<f64>,
    pub psnr: Option<f64>,
    pub ssim: Option<f64>,
    #[serde(alias = "blockScore")]
    pub block_score: Option<f64>,
    #[serde(alias = "sizeMB")]
    pub size_mb: Option<f64>,
    pub efficiency: Option<f64>,
    pub log: Option<String>,
}

impl ServiceResponse {
    /// Converts the response into a trial. Anything but a complete
    /// `"success"` response is a failed trial.
    pub fn into_trial(self, preset: &str, quality: u32) -> Trial {
        let log = self.log.clone().unwrap_or_default();
        if self.status != "success" {
            let message = self
                .message
                .unwrap_or_else(|| format!("service reported status '{}'", self.status));
            return Trial::failure(preset, quality, message).with_log(log);
        }

        let (Some(vmaf), Some(size_mb)) = (self.vmaf, self.size_mb) else {
            return Trial::failure(preset, quality, "success response without vmaf or size")
                .with_log(log);
        };
        let metrics = TrialMetrics {
            vmaf,
            vmaf_1_low: self.vmaf_1_low.unwrap_or(vmaf),
            vmaf_std_dev: self.vmaf_std_dev.unwrap_or(0.0),
            psnr: self.psnr,
            ssim: self.ssim,
            block_score: self.block_score,
            size_mb,
            efficiency: self
                .efficiency
                .unwrap_or_else(|| TrialMetrics::compute_efficiency(vmaf, size_mb)),
        };
        Trial::success(preset, quality, metrics).with_log(log)
    }
}

/// Last line of `lines` that parses as a service response.
pub fn find_response(lines: &[String]) -> Option<ServiceResponse> {
    lines.iter().rev().find_map(|line| {
        let line = line.trim();
        if line.starts_with('{') {
            serde_json::from_str(line).ok()
        } else {
            None
        }
    })
}

/// Executes one (preset, quality) trial.
pub trait TrialRunner: Send + Sync {
    fn run_trial(&self, preset: &str, quality: u32, ctx: &ProcessContext) -> TrialOutcome;
}

/// `TrialRunner` that spawns a service command per trial.
#[derive(Debug, Clone)]
pub struct CommandTrialRunner {
    program: PathBuf,
    args: Vec<String>,
    settings: TrialSettings,
    work_root: PathBuf,
}

impl CommandTrialRunner {
    pub fn new(
        program: impl Into<PathBuf>,
        settings: TrialSettings,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            settings,
            work_root: work_root.into(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn settings(&self) -> &TrialSettings {
        &self.settings
    }

    fn execute(
        &self,
        preset: &str,
        quality: u32,
        work_dir: &Path,
        ctx: &ProcessContext,
    ) -> TrialOutcome {
        let label = format!("trial service ({preset} q{quality})");
        let request = self.settings.request(preset, quality, work_dir);
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => payload,
            Err(e) => {
                return TrialOutcome::Completed(Trial::failure(
                    preset,
                    quality,
                    format!("failed to encode request: {e}"),
                ));
            }
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(work_dir);

        let mut stdout_lines: Vec<String> = Vec::new();
        let output = match run_streaming(cmd, &label, Some(payload), ctx, |line| {
            stdout_lines.push(line.to_string())
        }) {
            Ok(output) => output,
            Err(e) => {
                log::warn!("{} could not run: {}", label, e);
                return TrialOutcome::Completed(Trial::failure(preset, quality, e.to_string()));
            }
        };

        let status = match output.exit {
            StreamExit::Cancelled => return TrialOutcome::Cancelled,
            StreamExit::Exited(status) => status,
        };

        let response = find_response(&stdout_lines);
        let mut log_text = stdout_lines
            .iter()
            .filter(|line| !line.trim_start().starts_with('{'))
            .chain(output.stderr.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        let trial = match (status.success(), response) {
            (true, Some(response)) => response.into_trial(preset, quality),
            (true, None) => Trial::failure(preset, quality, "service printed no JSON response"),
            (false, Some(response)) if response.status != "success" => {
                response.into_trial(preset, quality)
            }
            (false, _) => Trial::failure(preset, quality, format!("service exited with {status}")),
        };

        if !trial.log.is_empty() {
            if !log_text.is_empty() {
                log_text.push('\n');
            }
            log_text.push_str(&trial.log);
        }
        if let Some(message) = trial.error_message() {
            log::warn!("{} failed: {}", label, message);
        } else {
            log::debug!("{} succeeded", label);
        }
        TrialOutcome::Completed(trial.with_log(log_text))
    }
}

impl TrialRunner for CommandTrialRunner {
    fn run_trial(&self, preset: &str, quality: u32, ctx: &ProcessContext) -> TrialOutcome {
        if ctx.cancel.is_cancelled() {
            return TrialOutcome::Cancelled;
        }

        let work_dir = match std::fs::create_dir_all(&self.work_root).and_then(|_| {
            tempfile::Builder::new()
                .prefix(&format!("trial_{preset}_{quality}_"))
                .tempdir_in(&self.work_root)
        }) {
            Ok(dir) => dir,
            Err(e) => {
                return TrialOutcome::Completed(Trial::failure(
                    preset,
                    quality,
                    format!("failed to create work directory: {e}"),
                ));
            }
        };

        let outcome = self.execute(preset, quality, work_dir.path(), ctx);

        // Encoded and intermediate files go with the directory.
        let path = work_dir.path().to_path_buf();
        if let Err(e) = work_dir.close() {
            log::warn!("Failed to remove trial directory {}: {}", path.display(), e);
        }
        outcome
    }
}
