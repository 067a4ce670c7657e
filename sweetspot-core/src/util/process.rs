// ============================================================================
// sweetspot-core/src/util/process.rs
// ============================================================================
//
// PROCESS EXECUTION: Cancellable External Process Management
//
// Every external tool invocation (ffprobe frame probes, trial service calls)
// goes through `run_streaming`, which reads stdout line by line and checks the
// cancellation token at each line boundary. Spawned children are registered in
// a `ChildRegistry` so that an orchestrator-level cancellation can terminate
// processes that are blocked without producing output.
//
// On unix each child leads its own process group and signals go to the whole
// group, so encoders a service starts as subprocesses die with it.
//
// A child is only ever reaped while its mutex is held, and its group is only
// signalled under that same lock.

use crate::error::{CoreResult, command_start_error, command_wait_error};
use crate::util::cancel::CancellationToken;

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Delay between a polite terminate signal and a hard kill.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

type SharedChild = Arc<Mutex<Child>>;

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    // A panicking reader thread must not make the child unkillable.
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Set of live external processes spawned on behalf of a run.
///
/// Once `terminate_all` has run the registry stays closed: children
/// registered afterwards are reported back as already terminating.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    next_id: AtomicU64,
    children: Mutex<HashMap<u64, SharedChild>>,
    closed: AtomicBool,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry id, and whether the registry was already closed.
    /// The flag is read under the same lock `terminate_all` snapshots with.
    fn register(&self, child: SharedChild) -> (u64, bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries();
        entries.insert(id, child);
        (id, self.closed.load(Ordering::SeqCst))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn deregister(&self, id: u64) {
        self.entries().remove(&id);
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, SharedChild>> {
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of registered processes that have not been reaped yet.
    pub fn active_count(&self) -> usize {
        self.entries().len()
    }

    /// Terminates every registered process: terminate signal first, kill for
    /// whatever is still alive after `grace`.
    pub fn terminate_all(&self, grace: Duration) {
        let snapshot: Vec<SharedChild> = {
            let entries = self.entries();
            self.closed.store(true, Ordering::SeqCst);
            entries.values().cloned().collect()
        };
        if snapshot.is_empty() {
            return;
        }
        log::info!("Terminating {} running external process(es)", snapshot.len());

        let mut alive = Vec::new();
        for child in snapshot {
            let mut guard = lock_child(&child);
            if matches!(guard.try_wait(), Ok(None)) {
                send_terminate(&mut guard);
                drop(guard);
                alive.push(child);
            }
        }

        let deadline = Instant::now() + grace;
        while !alive.is_empty() && Instant::now() < deadline {
            alive.retain(|child| leader_running(&mut lock_child(child)));
            if !alive.is_empty() {
                thread::sleep(REAP_POLL_INTERVAL);
            }
        }

        for child in alive {
            let mut guard = lock_child(&child);
            log::warn!("Process {} ignored terminate signal, killing", guard.id());
            kill_now(&mut guard);
        }
    }
}

/// Signals the process group led by `child`. Returns false when the signal
/// could not be delivered.
#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) -> bool {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) has no memory-safety preconditions. The group id is the
    // leader's pid, which cannot be reused while the group has members.
    unsafe { libc::kill(-pgid, signal) == 0 }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    if !signal_group(child, libc::SIGTERM) {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.kill();
}

/// Kills the child and everything left in its group, then reaps it.
fn kill_now(child: &mut Child) {
    #[cfg(unix)]
    signal_group(child, libc::SIGKILL);
    let _ = child.kill();
    let _ = child.wait();
}

/// True while the group leader runs. Once it has exited, whatever it left
/// behind in its group is killed.
fn leader_running(child: &mut Child) -> bool {
    if matches!(child.try_wait(), Ok(None)) {
        return true;
    }
    #[cfg(unix)]
    signal_group(child, libc::SIGKILL);
    false
}

/// Terminates a single child: terminate signal, bounded wait, then kill.
fn terminate_child(child: &Mutex<Child>, grace: Duration) {
    {
        let mut guard = lock_child(child);
        if !matches!(guard.try_wait(), Ok(None)) {
            return;
        }
        send_terminate(&mut guard);
    }
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !leader_running(&mut lock_child(child)) {
            return;
        }
        thread::sleep(REAP_POLL_INTERVAL);
    }
    kill_now(&mut lock_child(child));
}

/// Everything a blocking external call needs to honour cancellation.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub cancel: CancellationToken,
    pub registry: Arc<ChildRegistry>,
    pub termination_grace: Duration,
}

impl ProcessContext {
    pub fn new(cancel: CancellationToken, registry: Arc<ChildRegistry>) -> Self {
        Self {
            cancel,
            registry,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }

    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(CancellationToken::new(), Arc::new(ChildRegistry::new()))
    }
}

/// How a streamed process ended.
#[derive(Debug)]
pub enum StreamExit {
    Exited(ExitStatus),
    Cancelled,
}

#[derive(Debug)]
pub struct StreamOutput {
    pub exit: StreamExit,
    pub stderr: Vec<String>,
}

impl StreamOutput {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.exit, StreamExit::Cancelled)
    }

    fn cancelled(stderr: Vec<String>) -> Self {
        Self {
            exit: StreamExit::Cancelled,
            stderr,
        }
    }
}

/// Runs `cmd`, feeding `stdin_payload` (if any) and handing each stdout line
/// to `on_line`.
///
/// Returns `StreamExit::Cancelled` as soon as the token is observed set,
/// after terminating the child. A non-zero exit is reported through
/// `StreamExit::Exited`; judging it is the caller's business.
pub fn run_streaming<F>(
    mut cmd: Command,
    label: &str,
    stdin_payload: Option<Vec<u8>>,
    ctx: &ProcessContext,
    mut on_line: F,
) -> CoreResult<StreamOutput>
where
    F: FnMut(&str),
{
    if ctx.cancel.is_cancelled() {
        return Ok(StreamOutput::cancelled(Vec::new()));
    }

    log::debug!("Running {}: {:?}", label, cmd);

    cmd.stdin(if stdin_payload.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|e| command_start_error(label, e))?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let shared: SharedChild = Arc::new(Mutex::new(child));
    let (id, closed) = ctx.registry.register(Arc::clone(&shared));

    let writer_handle = match (stdin, stdin_payload) {
        (Some(mut pipe), Some(payload)) => Some(thread::spawn(move || {
            // The pipe is closed when `pipe` drops, signalling EOF to the child.
            if let Err(e) = pipe.write_all(&payload) {
                log::debug!("Writing process stdin failed: {}", e);
            }
        })),
        _ => None,
    };

    let stderr_handle = stderr.map(|pipe| {
        thread::spawn(move || {
            BufReader::new(pipe)
                .lines()
                .map_while(Result::ok)
                .collect::<Vec<String>>()
        })
    });

    // A cancel landing between the check above and `register` is missed by
    // `terminate_all`, so look again now that the child is registered.
    let mut cancelled = closed || ctx.cancel.is_cancelled();
    if let Some(pipe) = stdout.filter(|_| !cancelled) {
        for line in BufReader::new(pipe).lines() {
            if ctx.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match line {
                Ok(line) => on_line(&line),
                Err(e) => {
                    log::debug!("{}: stopped reading stdout: {}", label, e);
                    break;
                }
            }
        }
    }

    let status = if cancelled || ctx.cancel.is_cancelled() {
        terminate_child(&shared, ctx.termination_grace);
        Ok(None)
    } else {
        wait_polling(&shared, label, ctx)
    };
    release(&ctx.registry, id, &shared, status.is_err());

    if let Some(handle) = writer_handle {
        let _ = handle.join();
    }
    let stderr_lines = stderr_handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    match status? {
        Some(status) => Ok(StreamOutput {
            exit: StreamExit::Exited(status),
            stderr: stderr_lines,
        }),
        None => {
            log::debug!("{} cancelled", label);
            Ok(StreamOutput::cancelled(stderr_lines))
        }
    }
}

/// Drops the registry entry. After a failed wait the child's state is
/// unknown, so it is killed and reaped first.
fn release(registry: &ChildRegistry, id: u64, child: &Mutex<Child>, wait_failed: bool) {
    if wait_failed {
        kill_now(&mut lock_child(child));
    }
    registry.deregister(id);
}

/// Waits for the child without ever holding its lock across a blocking call.
/// Returns `None` when cancellation interrupted the wait.
fn wait_polling(child: &Mutex<Child>, label: &str, ctx: &ProcessContext) -> CoreResult<Option<ExitStatus>> {
    loop {
        if let Some(status) = lock_child(child)
            .try_wait()
            .map_err(|e| command_wait_error(label, e))?
        {
            return Ok(Some(status));
        }
        if ctx.cancel.is_cancelled() {
            terminate_child(child, ctx.termination_grace);
            return Ok(None);
        }
        thread::sleep(REAP_POLL_INTERVAL);
    }
}
