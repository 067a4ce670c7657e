//! Cancellation against real child processes. Unix only: the trial service
//! is a `/bin/sh` script.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sweetspot_core::external::{CommandTrialRunner, TrialSettings};
use sweetspot_core::orchestrator::{NullObserver, sweep_tasks};
use sweetspot_core::util::ChildRegistry;
use sweetspot_core::*;

fn write_service(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("service.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn orchestrator(program: PathBuf, work: PathBuf, ctx: ProcessContext) -> Orchestrator {
    let config = OptimizerConfigBuilder::new()
        .parallel_jobs(2)
        .poll_interval_ms(20)
        .termination_grace_ms(300)
        .work_dir(work.clone())
        .build()
        .unwrap();
    let runner = CommandTrialRunner::new(
        program,
        TrialSettings::new("libx264", "/tmp/sample.mkv"),
        work,
    );
    Orchestrator::new(Arc::new(runner), config.orchestrator, ctx)
}

#[test]
fn test_cancel_terminates_running_services() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_service(dir.path(), "cat > /dev/null\nexec sleep 30");

    let cancel = CancellationToken::new();
    let registry = Arc::new(ChildRegistry::new());
    let ctx = ProcessContext::new(cancel.clone(), Arc::clone(&registry));
    let orchestrator = orchestrator(program, dir.path().join("work"), ctx);

    let trigger = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(400));
            cancel.cancel();
        })
    };

    let started = Instant::now();
    let tasks = sweep_tasks(
        &["medium".to_string()],
        QualityRange::new(20, 23).unwrap(),
        1,
    );
    let summary = orchestrator.run_range_sweep(tasks, &mut NullObserver).unwrap();
    trigger.join().unwrap();

    assert!(summary.cancelled);
    assert!(summary.results.is_empty());
    assert_eq!(summary.total, 4);
    assert!(started.elapsed() < Duration::from_secs(10));

    // Workers deregister their children once the terminated process is reaped.
    let deadline = Instant::now() + Duration::from_secs(5);
    while registry.active_count() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(registry.active_count(), 0);
}

#[test]
fn test_completed_trials_survive_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    // q20 answers at once; every other quality value hangs.
    let program = write_service(
        dir.path(),
        r#"request=$(cat)
case "$request" in
  *'"quality":20'*)
    echo '{"status":"success","vmaf":95.0,"size_mb":2.0}'
    ;;
  *)
    exec sleep 30
    ;;
esac"#,
    );

    let cancel = CancellationToken::new();
    let ctx = ProcessContext::new(cancel.clone(), Arc::new(ChildRegistry::new()));
    let orchestrator = orchestrator(program, dir.path().join("work"), ctx);

    let trigger = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(800));
            cancel.cancel();
        })
    };

    let tasks = vec![TrialTask::new("medium", 20), TrialTask::new("medium", 21)];
    let summary = orchestrator.run_range_sweep(tasks, &mut NullObserver).unwrap();
    trigger.join().unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.results.len(), 1);
    let trial = &summary.results.trials()[0];
    assert_eq!(trial.quality, 20);
    assert!(trial.is_success());
}

#[test]
fn test_cancel_stops_encoders_started_by_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let mark = dir.path().join("encoder-finished");
    // The "encoder" is a subshell of the service, not exec'd in its place.
    let program = write_service(
        dir.path(),
        &format!(
            "cat > /dev/null\n(sleep 2; touch '{}')\necho '{{\"status\":\"success\",\"vmaf\":95.0,\"size_mb\":2.0}}'",
            mark.display()
        ),
    );

    let cancel = CancellationToken::new();
    let ctx = ProcessContext::new(cancel.clone(), Arc::new(ChildRegistry::new()));
    let work = dir.path().join("work");
    let orchestrator = orchestrator(program, work.clone(), ctx);

    let trigger = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            cancel.cancel();
        })
    };

    let tasks = vec![TrialTask::new("medium", 20), TrialTask::new("medium", 21)];
    let summary = orchestrator.run_range_sweep(tasks, &mut NullObserver).unwrap();
    trigger.join().unwrap();

    assert!(summary.cancelled);
    assert!(summary.results.is_empty());
    // Trial directories are gone by the time the run returns.
    assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);

    thread::sleep(Duration::from_millis(2500));
    assert!(!mark.exists());
}
