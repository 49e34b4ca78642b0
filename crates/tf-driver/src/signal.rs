//! Interrupt handling for a run.
//!
//! The first SIGINT/SIGTERM asks terraform to stop: its whole process group
//! gets SIGTERM, the controller waits for the group leader to disappear, and
//! only then cancels the run token so no further action starts. A second
//! signal while that is in progress exits the driver immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::{getpgid, Pid};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tool::{LiveProcess, BINARY_NAME};
use crate::Result;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

static REGISTERED: AtomicBool = AtomicBool::new(false);

fn claim(flag: &AtomicBool) {
    if flag.swap(true, Ordering::SeqCst) {
        panic!("signal handlers are already installed for this process");
    }
}

// ─── AbortTarget ──────────────────────────────────────────────────────────

/// Finds the running terraform and brings its process group down.
#[derive(Debug, Clone)]
pub struct AbortTarget {
    live: LiveProcess,
    binary_name: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl AbortTarget {
    pub fn new(live: LiveProcess) -> Self {
        Self {
            live,
            binary_name: BINARY_NAME.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How long to wait after SIGTERM before escalating to SIGKILL.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Pid of the terraform process to stop.
    ///
    /// The pid recorded by the driver wins. Without one, the process table
    /// is scanned for a process named like the binary.
    pub fn locate(&self) -> Option<Pid> {
        if let Some(pid) = self.live.get() {
            return Some(Pid::from_raw(pid as i32));
        }
        scan_proc(&self.binary_name)
    }

    /// SIGTERM the process group and wait for it to go away.
    ///
    /// Returns `false` when there was nothing to signal.
    pub async fn abort(&self) -> bool {
        let Some(pid) = self.locate() else {
            info!("no running terraform process found");
            return false;
        };
        let pgid = match getpgid(Some(pid)) {
            Ok(pgid) => pgid,
            Err(e) => {
                debug!(pid = pid.as_raw(), error = %e, "terraform already gone");
                return false;
            }
        };

        info!(pgid = pgid.as_raw(), "sending SIGTERM to terraform process group");
        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            warn!(pgid = pgid.as_raw(), error = %e, "failed to signal terraform");
            return false;
        }

        let deadline = Instant::now() + self.max_wait;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if getpgid(Some(pid)).is_err() {
                info!(pgid = pgid.as_raw(), "terraform process group exited");
                return true;
            }
            if Instant::now() >= deadline {
                warn!(
                    pgid = pgid.as_raw(),
                    waited = ?self.max_wait,
                    "terraform did not exit, sending SIGKILL"
                );
                let _ = killpg(pgid, Signal::SIGKILL);
                return true;
            }
            debug!(pgid = pgid.as_raw(), "waiting for terraform to exit...");
        }
    }
}

/// First process other than ourselves whose `comm` equals `name`.
fn scan_proc(name: &str) -> Option<Pid> {
    let own = std::process::id();
    let entries = std::fs::read_dir("/proc").ok()?;
    entries.flatten().find_map(|entry| {
        let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
        if pid == own {
            return None;
        }
        let comm = std::fs::read_to_string(entry.path().join("comm")).ok()?;
        (comm.trim_end() == name).then(|| Pid::from_raw(pid as i32))
    })
}

// ─── Listener ─────────────────────────────────────────────────────────────

/// React to interrupt notifications arriving on `rx`.
///
/// The first one aborts `target` and then cancels `cancel`. A second one,
/// whether or not the abort has finished, calls `on_second`.
pub async fn listen<F>(
    mut rx: mpsc::Receiver<()>,
    target: AbortTarget,
    cancel: CancellationToken,
    on_second: F,
) where
    F: FnOnce(),
{
    if rx.recv().await.is_none() {
        return;
    }
    info!("received interrupt, stopping terraform");
    let aborting = tokio::spawn(async move {
        target.abort().await;
        cancel.cancel();
    });

    if rx.recv().await.is_some() {
        warn!("received second interrupt, exiting");
        on_second();
    }
    let _ = aborting.await;
}

// ─── AbortController ──────────────────────────────────────────────────────

/// Process-wide SIGINT/SIGTERM handling bound to one run.
///
/// Must be installed from within a tokio runtime, at most once per process.
#[derive(Debug)]
pub struct AbortController {
    cancel: CancellationToken,
}

impl AbortController {
    /// # Panics
    ///
    /// When called a second time in the same process.
    pub fn install(live: LiveProcess) -> Result<Self> {
        claim(&REGISTERED);

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = sigint.recv() => {}
                    Some(()) = sigterm.recv() => {}
                    else => break,
                }
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });

        let cancel = CancellationToken::new();
        tokio::spawn(listen(
            rx,
            AbortTarget::new(live),
            cancel.clone(),
            || std::process::exit(1),
        ));
        Ok(Self { cancel })
    }

    /// Token cancelled once an interrupt has stopped terraform.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn spawn_sleeper() -> tokio::process::Child {
        tokio::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[test]
    #[should_panic(expected = "already installed")]
    fn second_claim_panics() {
        let flag = AtomicBool::new(false);
        claim(&flag);
        claim(&flag);
    }

    #[test]
    fn locate_prefers_live_pid() {
        let live = LiveProcess::new();
        live.set(Some(4242));
        let target = AbortTarget::new(live);
        assert_eq!(target.locate(), Some(Pid::from_raw(4242)));
    }

    #[test]
    fn scan_skips_unknown_names() {
        assert_eq!(scan_proc("terraform-no-such-process-name"), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn abort_terminates_process_group() {
        let mut child = spawn_sleeper();
        let live = LiveProcess::new();
        live.set(child.id());
        let waiter = tokio::spawn(async move { child.wait().await });

        let target = AbortTarget::new(live)
            .poll_interval(Duration::from_millis(50))
            .max_wait(Duration::from_secs(10));
        assert!(target.abort().await);

        let status = waiter.await.unwrap().unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn abort_with_nothing_running_is_noop() {
        let target = AbortTarget {
            binary_name: "terraform-no-such-process-name".into(),
            ..AbortTarget::new(LiveProcess::new())
        };
        assert!(!target.abort().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_signal_cancels_after_abort() {
        let mut child = spawn_sleeper();
        let live = LiveProcess::new();
        live.set(child.id());
        let waiter = tokio::spawn(async move { child.wait().await });

        let target = AbortTarget::new(live).poll_interval(Duration::from_millis(50));
        let cancel = CancellationToken::new();
        let seconds = Arc::new(AtomicU32::new(0));
        let (tx, rx) = mpsc::channel(4);

        let counter = seconds.clone();
        let listener = tokio::spawn(listen(rx, target, cancel.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        tx.send(()).await.unwrap();
        drop(tx);

        listener.await.unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(seconds.load(Ordering::SeqCst), 0);
        assert!(!waiter.await.unwrap().unwrap().success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_signal_triggers_exit_hook() {
        let target = AbortTarget {
            binary_name: "terraform-no-such-process-name".into(),
            ..AbortTarget::new(LiveProcess::new())
        };
        let cancel = CancellationToken::new();
        let seconds = Arc::new(AtomicU32::new(0));
        let (tx, rx) = mpsc::channel(4);

        let counter = seconds.clone();
        let listener = tokio::spawn(listen(rx, target, cancel.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        tx.send(()).await.unwrap();
        tx.send(()).await.unwrap();
        drop(tx);

        listener.await.unwrap();
        assert_eq!(seconds.load(Ordering::SeqCst), 1);
        assert!(cancel.is_cancelled());
    }
}
