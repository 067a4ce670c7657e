// ============================================================================
// sweetspot-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: ffprobe, ffmpeg and the Encoder/Prober Service
//
// Everything that leaves the process lives here, behind traits the rest of
// the crate is written against:
// - `FrameProber` (ffprobe packet sizes and keyframes)
// - `FfmpegSpawner` (sample extraction through ffmpeg-sidecar)
// - `TrialRunner` (one encode-and-measure call to the external service)
//
// Tests substitute in-memory fakes for all three.

use crate::error::{CoreError, CoreResult};

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

pub mod ffmpeg_executor;
pub mod ffprobe_executor;
pub mod trial_service;

pub use ffmpeg_executor::{
    FfmpegProcess, FfmpegSpawner, SidecarProcess, SidecarSpawner, extract_sample,
};
pub use ffprobe_executor::{
    FfprobeFrameProber, FrameKind, FrameProber, FrameSample, ProbeInterval, collect_frames,
};
pub use trial_service::{
    AudioMode, ColorMetadata, CommandTrialRunner, MetricToggles, TrialRequest, TrialRunner,
    TrialSettings,
};

/// Checks that `program` can be started by running it with `-version`.
///
/// Only a failure to start matters; the exit status is ignored.
pub fn check_dependency(program: &Path) -> CoreResult<()> {
    let name = program.display().to_string();
    match Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(_) => {
            log::debug!("Found dependency: {}", name);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Dependency '{}' not found.", name);
            Err(CoreError::DependencyNotFound(name))
        }
        Err(e) => {
            log::error!("Failed to start dependency check command '{}': {}", name, e);
            Err(CoreError::CommandStart(name, e))
        }
    }
}
