// ============================================================================
// sweetspot-core/src/external/ffmpeg_executor.rs
// ============================================================================
//
// FFMPEG EXECUTOR: Sample Clip Extraction
//
// Cuts the selected sample window out of the source with stream copy so that
// every trial of a run encodes the same short clip. Spawning goes through the
// `FfmpegSpawner` trait so tests can substitute a fake process.

use crate::analysis::SampleWindow;
use crate::error::{
    CoreError, CoreResult, command_failed_error, command_start_error, command_wait_error,
};
use crate::util::CancellationToken;

use ffmpeg_sidecar::child::FfmpegChild as SidecarChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// An active ffmpeg process.
pub trait FfmpegProcess {
    /// Feeds every event of the running command to `handler`; the first
    /// handler error stops iteration and is returned.
    fn handle_events<F>(&mut self, handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>;

    fn wait(&mut self) -> CoreResult<ExitStatus>;

    fn kill(&mut self) -> CoreResult<()>;
}

/// Something that can spawn an `FfmpegProcess`.
pub trait FfmpegSpawner {
    type Process: FfmpegProcess;
    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process>;
}

/// `FfmpegProcess` backed by an `ffmpeg-sidecar` child.
pub struct SidecarProcess(SidecarChild);

impl FfmpegProcess for SidecarProcess {
    fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        let iterator = self.0.iter().map_err(|e| {
            log::error!("Failed to get ffmpeg event iterator: {}", e);
            CoreError::Io(std::io::Error::other(e.to_string()))
        })?;
        for event in iterator {
            handler(event)?;
        }
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        self.0
            .wait()
            .map_err(|e| command_wait_error("ffmpeg (sidecar)", e))
    }

    fn kill(&mut self) -> CoreResult<()> {
        self.0.kill().map_err(CoreError::Io)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SidecarSpawner;

impl FfmpegSpawner for SidecarSpawner {
    type Process = SidecarProcess;

    fn spawn(&self, mut cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        cmd.spawn()
            .map(SidecarProcess)
            .map_err(|e| command_start_error("ffmpeg (sidecar)", e))
    }
}

/// File name for a sample of `window`; stable for identical windows.
pub fn sample_file_name(window: &SampleWindow) -> String {
    format!(
        "sample_{}_{}.mkv",
        (window.start * 1000.0).round() as u64,
        (window.duration * 1000.0).round() as u64
    )
}

/// Builds the stream-copy extraction command.
pub fn sample_command(
    input_path: &Path,
    window: &SampleWindow,
    output_path: &Path,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new();
    cmd.arg("-y");
    cmd.arg("-ss");
    cmd.arg(format!("{:.3}", window.start));
    cmd.input(input_path.to_string_lossy().as_ref());
    cmd.arg("-t");
    cmd.arg(format!("{:.3}", window.duration));
    cmd.arg("-map");
    cmd.arg("0:v:0");
    cmd.arg("-map");
    cmd.arg("0:a?");
    cmd.arg("-c");
    cmd.arg("copy");
    cmd.arg("-sn");
    cmd.arg("-map_metadata");
    cmd.arg("0");
    cmd.output(output_path.to_string_lossy().as_ref());
    cmd
}

/// Extracts `window` of `input_path` into `output_dir` with `-c copy`.
///
/// The ffmpeg process is killed when `cancel` fires while it runs. On
/// cancellation or failure any partial output file is removed.
pub fn extract_sample<S: FfmpegSpawner>(
    spawner: &S,
    input_path: &Path,
    window: &SampleWindow,
    output_dir: &Path,
    cancel: &CancellationToken,
) -> CoreResult<PathBuf> {
    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }

    let output_path = output_dir.join(sample_file_name(window));
    match run_extraction(spawner, input_path, window, &output_path, cancel) {
        Ok(()) => {
            log::info!("Extracted sample {} to {}", window, output_path.display());
            Ok(output_path)
        }
        Err(e) => {
            if output_path.exists() {
                if let Err(rm) = std::fs::remove_file(&output_path) {
                    log::warn!(
                        "Failed to remove partial sample {}: {}",
                        output_path.display(),
                        rm
                    );
                }
            }
            Err(e)
        }
    }
}

fn run_extraction<S: FfmpegSpawner>(
    spawner: &S,
    input_path: &Path,
    window: &SampleWindow,
    output_path: &Path,
    cancel: &CancellationToken,
) -> CoreResult<()> {
    let cmd = sample_command(input_path, window, output_path);
    log::debug!("Running sample extraction command: {:?}", cmd);

    let mut process = spawner.spawn(cmd)?;
    let mut errors: Vec<String> = Vec::new();
    let handled = process.handle_events(|event| {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        match event {
            FfmpegEvent::Error(message)
            | FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, message) => {
                errors.push(message);
            }
            _ => {}
        }
        Ok(())
    });

    if let Err(CoreError::Cancelled) = handled {
        log::info!("Sample extraction cancelled; stopping ffmpeg");
        process.kill()?;
        let _ = process.wait();
        return Err(CoreError::Cancelled);
    }
    handled?;

    let status = process.wait()?;
    if !status.success() {
        log::error!("Sample extraction failed: {}", status);
        return Err(command_failed_error(
            "ffmpeg (sample extraction)",
            status,
            errors.join("\n"),
        ));
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::os::unix::process::ExitStatusExt;
    use std::rc::Rc;

    struct FakeProcess {
        events: Vec<FfmpegEvent>,
        exit_code: i32,
        killed: Rc<RefCell<bool>>,
    }

    impl FfmpegProcess for FakeProcess {
        fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
        where
            F: FnMut(FfmpegEvent) -> CoreResult<()>,
        {
            for event in self.events.drain(..) {
                handler(event)?;
            }
            Ok(())
        }

        fn wait(&mut self) -> CoreResult<ExitStatus> {
            Ok(ExitStatus::from_raw(self.exit_code << 8))
        }

        fn kill(&mut self) -> CoreResult<()> {
            *self.killed.borrow_mut() = true;
            Ok(())
        }
    }

    struct FakeSpawner {
        exit_code: i32,
        args: RefCell<Vec<String>>,
        killed: Rc<RefCell<bool>>,
        /// Writes some bytes to the output path, like ffmpeg does before failing.
        write_partial: bool,
        /// Fired once the process is running.
        cancel_after_spawn: Option<CancellationToken>,
    }

    impl FakeSpawner {
        fn new(exit_code: i32) -> Self {
            Self {
                exit_code,
                args: RefCell::new(Vec::new()),
                killed: Rc::new(RefCell::new(false)),
                write_partial: false,
                cancel_after_spawn: None,
            }
        }
    }

    impl FfmpegSpawner for FakeSpawner {
        type Process = FakeProcess;

        fn spawn(&self, mut cmd: FfmpegCommand) -> CoreResult<Self::Process> {
            *self.args.borrow_mut() = cmd
                .as_inner()
                .get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            if self.write_partial {
                if let Some(output) = self.args.borrow().last() {
                    std::fs::write(output, b"partial").unwrap();
                }
            }
            if let Some(cancel) = &self.cancel_after_spawn {
                cancel.cancel();
            }
            Ok(FakeProcess {
                events: vec![
                    FfmpegEvent::Log(LogLevel::Info, "starting".into()),
                    FfmpegEvent::Error("bad packet".into()),
                ],
                exit_code: self.exit_code,
                killed: Rc::clone(&self.killed),
            })
        }
    }

    fn window() -> SampleWindow {
        SampleWindow {
            start: 12.5,
            duration: 30.0,
        }
    }

    #[test]
    fn test_extract_uses_stream_copy_and_window() {
        let spawner = FakeSpawner::new(0);
        let out = extract_sample(
            &spawner,
            Path::new("/media/source.mkv"),
            &window(),
            Path::new("/tmp/work"),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(out, Path::new("/tmp/work/sample_12500_30000.mkv"));

        let args = spawner.args.borrow();
        let joined = args.join(" ");
        assert!(joined.contains("-ss 12.500"));
        assert!(joined.contains("-t 30.000"));
        assert!(joined.contains("-c copy"));
    }

    #[test]
    fn test_failed_extraction_reports_errors() {
        let spawner = FakeSpawner::new(1);
        let err = extract_sample(
            &spawner,
            Path::new("source.mkv"),
            &window(),
            Path::new("/tmp/work"),
            &CancellationToken::new(),
        )
        .unwrap_err();
        match err {
            CoreError::CommandFailed { stderr, .. } => assert!(stderr.contains("bad packet")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failed_extraction_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut spawner = FakeSpawner::new(1);
        spawner.write_partial = true;

        let result = extract_sample(
            &spawner,
            Path::new("source.mkv"),
            &window(),
            dir.path(),
            &CancellationToken::new(),
        );
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_cancelled_extraction_kills_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let mut spawner = FakeSpawner::new(0);
        spawner.write_partial = true;
        spawner.cancel_after_spawn = Some(cancel.clone());

        let result = extract_sample(&spawner, Path::new("source.mkv"), &window(), dir.path(), &cancel);
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert!(*spawner.killed.borrow());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_pre_cancelled_never_spawns() {
        let spawner = FakeSpawner::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = extract_sample(&spawner, Path::new("s.mkv"), &window(), Path::new("/tmp"), &cancel);
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert!(spawner.args.borrow().is_empty());
        assert!(!*spawner.killed.borrow());
    }
}
