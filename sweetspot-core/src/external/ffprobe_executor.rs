//! FFprobe integration for frame-size probing and source metadata.
//!
//! The scene complexity analyzer talks to the `FrameProber` trait; the
//! concrete `FfprobeFrameProber` streams packet sizes out of `ffprobe` so the
//! analyzer never holds a full frame list for a sequential pass.

use crate::error::{CoreError, CoreResult, command_failed_error, command_start_error};
use crate::util::process::{ProcessContext, StreamExit, run_streaming};

use ffprobe::{FfProbeError, ffprobe};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameKind {
    Key,
    Delta,
}

/// One probed frame (packet) of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameSample {
    pub timestamp: f64,
    pub size: u64,
    pub kind: FrameKind,
}

impl FrameSample {
    pub fn new(timestamp: f64, size: u64, kind: FrameKind) -> Self {
        Self {
            timestamp,
            size,
            kind,
        }
    }
}

/// Half-open `start%end` probe range; either bound may be omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProbeInterval {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl ProbeInterval {
    pub fn whole() -> Self {
        Self::default()
    }

    pub fn between(start: Option<f64>, end: Option<f64>) -> Self {
        Self { start, end }
    }

    pub fn is_whole(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl fmt::Display for ProbeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{start}")?;
        }
        write!(f, "%")?;
        if let Some(end) = self.end {
            write!(f, "{end}")?;
        }
        Ok(())
    }
}

/// Source of per-frame size data.
///
/// Implementations must be shareable across the probe worker pool.
pub trait FrameProber: Sync {
    /// Duration of the source in seconds.
    fn source_duration(&self, source: &Path) -> CoreResult<f64>;

    /// Streams every frame inside `interval` into `sink`, in decode order.
    fn probe_frames(
        &self,
        source: &Path,
        interval: &ProbeInterval,
        sink: &mut dyn FnMut(FrameSample),
    ) -> CoreResult<()>;

    /// Timestamps of all keyframes, ascending.
    fn keyframe_timestamps(&self, source: &Path) -> CoreResult<Vec<f64>>;
}

/// Collects `probe_frames` output for one interval.
pub fn collect_frames<P: FrameProber + ?Sized>(
    prober: &P,
    source: &Path,
    interval: &ProbeInterval,
) -> CoreResult<Vec<FrameSample>> {
    let mut frames = Vec::new();
    prober.probe_frames(source, interval, &mut |frame| frames.push(frame))?;
    Ok(frames)
}

/// Parses one `pts_time,size,flags` CSV line. `N/A` timestamps yield `None`.
pub fn parse_packet_line(line: &str) -> Option<FrameSample> {
    let mut fields = line.trim().split(',');
    let timestamp: f64 = fields.next()?.trim().parse().ok()?;
    let size: u64 = fields.next()?.trim().parse().ok()?;
    let kind = match fields.next() {
        Some(flags) if flags.trim_start().starts_with('K') => FrameKind::Key,
        _ => FrameKind::Delta,
    };
    if !timestamp.is_finite() {
        return None;
    }
    Some(FrameSample::new(timestamp, size, kind))
}

/// Parses one keyframe-index line (a bare `pts_time`).
pub fn parse_keyframe_line(line: &str) -> Option<f64> {
    let field = line.trim().split(',').next()?.trim();
    field.parse::<f64>().ok().filter(|t| t.is_finite())
}

/// `FrameProber` backed by the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct FfprobeFrameProber {
    program: PathBuf,
    ctx: ProcessContext,
}

impl FfprobeFrameProber {
    pub fn new(ctx: ProcessContext) -> Self {
        Self {
            program: PathBuf::from("ffprobe"),
            ctx,
        }
    }

    /// Uses a specific ffprobe binary instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn packet_command(&self, source: &Path, interval: &ProbeInterval, entries: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-v", "error", "-select_streams", "v:0"]);
        if !interval.is_whole() {
            cmd.arg("-read_intervals").arg(interval.to_string());
        }
        cmd.arg("-show_entries")
            .arg(entries)
            .args(["-of", "csv=p=0"])
            .arg(source);
        cmd
    }

    /// Keyframe-only pass: the decoder skips every non-key frame and only
    /// timestamps are printed.
    fn keyframe_command(&self, source: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-v", "error", "-select_streams", "v:0"])
            .args(["-skip_frame", "nokey"])
            .args(["-show_entries", "frame=pts_time"])
            .args(["-of", "csv=p=0"])
            .arg(source);
        cmd
    }

    fn stream_lines(
        &self,
        cmd: Command,
        label: &str,
        on_line: &mut dyn FnMut(&str),
    ) -> CoreResult<()> {
        let output = run_streaming(cmd, label, None, &self.ctx, |line| on_line(line))?;
        match output.exit {
            StreamExit::Cancelled => Err(CoreError::Cancelled),
            StreamExit::Exited(status) if !status.success() => Err(command_failed_error(
                label,
                status,
                output.stderr.join("\n"),
            )),
            StreamExit::Exited(_) => Ok(()),
        }
    }

    fn stream_packets(
        &self,
        cmd: Command,
        label: &str,
        sink: &mut dyn FnMut(FrameSample),
    ) -> CoreResult<()> {
        self.stream_lines(cmd, label, &mut |line| {
            if let Some(frame) = parse_packet_line(line) {
                sink(frame);
            }
        })
    }
}

impl FrameProber for FfprobeFrameProber {
    fn source_duration(&self, source: &Path) -> CoreResult<f64> {
        log::debug!("Running ffprobe (via crate) for duration of: {}", source.display());
        match ffprobe(source) {
            Ok(metadata) => metadata
                .format
                .duration
                .as_deref()
                .and_then(|d| d.parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0)
                .ok_or_else(|| {
                    CoreError::FfprobeParse(format!(
                        "Failed to parse duration from format for {}",
                        source.display()
                    ))
                }),
            Err(err) => {
                log::error!("ffprobe failed for duration on {}: {:?}", source.display(), err);
                Err(map_ffprobe_error(err, "duration"))
            }
        }
    }

    fn probe_frames(
        &self,
        source: &Path,
        interval: &ProbeInterval,
        sink: &mut dyn FnMut(FrameSample),
    ) -> CoreResult<()> {
        let cmd = self.packet_command(source, interval, "packet=pts_time,size,flags");
        self.stream_packets(cmd, &format!("ffprobe (frames {interval})"), sink)
    }

    fn keyframe_timestamps(&self, source: &Path) -> CoreResult<Vec<f64>> {
        let cmd = self.keyframe_command(source);
        let mut keyframes = Vec::new();
        self.stream_lines(cmd, "ffprobe (keyframe index)", &mut |line| {
            if let Some(timestamp) = parse_keyframe_line(line) {
                keyframes.push(timestamp);
            }
        })?;
        keyframes.sort_by(f64::total_cmp);
        keyframes.dedup();
        log::debug!("Keyframe index for {}: {} keyframe(s)", source.display(), keyframes.len());
        Ok(keyframes)
    }
}

fn map_ffprobe_error(err: FfProbeError, context: &str) -> CoreError {
    match err {
        FfProbeError::Io(io_err) => command_start_error(format!("ffprobe ({context})"), io_err),
        FfProbeError::Status(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            command_failed_error(format!("ffprobe ({context})"), output.status, stderr)
        }
        FfProbeError::Deserialize(err) => {
            CoreError::FfprobeParse(format!("ffprobe {context} output deserialization: {err}"))
        }
        _ => CoreError::FfprobeParse(format!("Unknown ffprobe error during {context}: {err:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_display() {
        assert_eq!(ProbeInterval::between(Some(10.5), Some(20.0)).to_string(), "10.5%20");
        assert_eq!(ProbeInterval::between(None, Some(4.0)).to_string(), "%4");
        assert_eq!(ProbeInterval::between(Some(4.0), None).to_string(), "4%");
        assert!(ProbeInterval::whole().is_whole());
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_keyframe_pass_skips_non_key_frames() {
        let prober = FfprobeFrameProber::new(ProcessContext::default());
        let args = args(&prober.keyframe_command(Path::new("in.mkv")));
        let joined = args.join(" ");
        assert!(joined.contains("-skip_frame nokey"));
        assert!(joined.contains("-show_entries frame=pts_time"));
        assert!(!joined.contains("size"));
        assert!(!joined.contains("-read_intervals"));
        assert_eq!(args.last().map(String::as_str), Some("in.mkv"));
    }

    #[test]
    fn test_frame_pass_reads_packet_sizes_in_interval() {
        let prober = FfprobeFrameProber::new(ProcessContext::default());
        let interval = ProbeInterval::between(Some(10.0), Some(20.0));
        let cmd = prober.packet_command(Path::new("in.mkv"), &interval, "packet=pts_time,size,flags");
        let joined = args(&cmd).join(" ");
        assert!(joined.contains("-read_intervals 10%20"));
        assert!(joined.contains("packet=pts_time,size,flags"));
        assert!(!joined.contains("-skip_frame"));
    }

    #[test]
    fn test_parse_keyframe_line() {
        assert_eq!(parse_keyframe_line("12.512000"), Some(12.512));
        assert_eq!(parse_keyframe_line("4.000000,"), Some(4.0));
        assert_eq!(parse_keyframe_line("N/A"), None);
        assert_eq!(parse_keyframe_line(""), None);
    }

    #[test]
    fn test_parse_packet_line() {
        assert_eq!(
            parse_packet_line("1.001000,53211,K__"),
            Some(FrameSample::new(1.001, 53211, FrameKind::Key))
        );
        assert_eq!(
            parse_packet_line("1.042000,812,___"),
            Some(FrameSample::new(1.042, 812, FrameKind::Delta))
        );
        assert_eq!(parse_packet_line("N/A,812,___"), None);
        assert_eq!(parse_packet_line(""), None);
        assert_eq!(parse_packet_line("2.0,abc,K_"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_from_fake_ffprobe() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffprobe");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf '0.0,100,K_\\n0.5,20,__\\n1.0,90,K_\\nN/A,5,__\\n'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let prober = FfprobeFrameProber::new(ProcessContext::default()).with_program(&script);
        let source = dir.path().join("source.mkv");

        let frames = collect_frames(&prober, &source, &ProbeInterval::whole()).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(prober.keyframe_timestamps(&source).unwrap(), vec![0.0, 1.0]);
    }
}
