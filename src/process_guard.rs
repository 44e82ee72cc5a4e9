//! Child process lifecycle
//!
//! Processes started by run-executable and shell commands must not outlive the
//! setup run. Waited children are spawned as leaders of their own process
//! group with a parent-death signal, and registered in a [`ChildRegistry`]
//! shared with the signal handler. Teardown signals the whole group with
//! SIGTERM, then SIGKILL after a grace period.
//!
//! Signal policy for the binary: the first SIGINT/SIGTERM/SIGHUP requests
//! cancellation (the pipeline stops at the next command boundary); a second
//! one terminates all children and exits with `128 + signal`.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::events::CancelToken;

/// Grace period between SIGTERM and SIGKILL on normal teardown
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Shared handle to the registry of running children
pub type SharedChildren = Arc<Mutex<ChildRegistry>>;

/// Lock a shared registry, recovering from poisoning
pub fn lock_children(children: &SharedChildren) -> MutexGuard<'_, ChildRegistry> {
    children.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-group leaders currently running on behalf of a command
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: BTreeSet<u32>,
    /// Set once teardown started; later registrations are refused
    terminating: bool,
}

impl ChildRegistry {
    pub fn shared() -> SharedChildren {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Returns false once teardown has started
    pub fn register(&mut self, pid: u32) -> bool {
        if self.terminating {
            tracing::warn!("Refusing to track PID {} during teardown", pid);
            return false;
        }
        self.pids.insert(pid);
        tracing::debug!("Tracking child process {}", pid);
        true
    }

    pub fn unregister(&mut self, pid: u32) {
        if self.pids.remove(&pid) {
            tracing::debug!("Child process {} exited", pid);
        }
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    /// Final teardown for process exit: refuse every later registration,
    /// then [`drain`](Self::drain) the tracked groups.
    pub fn terminate_all(&mut self, grace: Duration) -> usize {
        if self.terminating {
            return 0;
        }
        self.terminating = true;
        self.drain(grace)
    }

    /// Signal every tracked process group: SIGTERM, wait up to `grace`,
    /// then SIGKILL the survivors. Registration stays open afterwards.
    /// Returns the number of groups signalled.
    pub fn drain(&mut self, grace: Duration) -> usize {
        let pids: Vec<u32> = std::mem::take(&mut self.pids).into_iter().collect();
        if pids.is_empty() {
            return 0;
        }

        tracing::info!("Terminating {} child process group(s)", pids.len());
        for &pid in &pids {
            signal_group_or_process(pid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !pids.iter().any(|&pid| is_process_alive(pid)) {
                return pids.len();
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in pids.iter().filter(|&&pid| is_process_alive(pid)) {
            tracing::warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
            signal_group_or_process(pid, Signal::SIGKILL);
        }
        pids.len()
    }
}

fn signal_group_or_process(pid: u32, sig: Signal) {
    let raw = pid as i32;
    if signal::kill(Pid::from_raw(-raw), sig).is_err() {
        if let Err(e) = signal::kill(Pid::from_raw(raw), sig) {
            tracing::debug!("Could not send {:?} to {}: {}", sig, pid, e);
        }
    }
}

/// Check if a process is still running (zombies count as dead)
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the state letter
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !matches!(stat.split_whitespace().nth(2), Some("Z" | "X")),
        Err(_) => true,
    }
}

/// Registration of one running child; unregisters on drop
pub struct TrackedChild {
    children: SharedChildren,
    pid: u32,
}

impl TrackedChild {
    pub fn new(children: &SharedChildren, pid: u32) -> Self {
        lock_children(children).register(pid);
        Self {
            children: Arc::clone(children),
            pid,
        }
    }
}

impl Drop for TrackedChild {
    fn drop(&mut self) {
        lock_children(&self.children).unregister(self.pid);
    }
}

/// RAII guard that tears down all children when the run ends.
///
/// The registry stays usable, so the same installer can run again.
pub struct ProcessGuard {
    children: SharedChildren,
}

impl ProcessGuard {
    pub fn new(children: SharedChildren) -> Self {
        Self { children }
    }

    pub fn child_count(&self) -> usize {
        lock_children(&self.children).count()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        lock_children(&self.children).drain(TERMINATE_GRACE);
    }
}

/// Install SIGINT/SIGTERM/SIGHUP handling for the binary.
///
/// The first signal cancels `cancel`; the second tears down `children` and
/// exits the process with `128 + signal`.
pub fn init_signal_handlers(
    cancel: CancelToken,
    children: SharedChildren,
) -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                if !cancel.is_cancelled() {
                    tracing::warn!("Received signal {}, cancelling after the current command", sig);
                    cancel.cancel();
                    continue;
                }

                tracing::warn!("Received signal {} again, terminating", sig);
                lock_children(&children).terminate_all(Duration::from_secs(3));
                std::process::exit(128 + sig);
            }
        })?;

    Ok(())
}

/// Extension trait for `std::process::Command` to set up process groups
pub trait CommandProcessGroup {
    /// Run the child as leader of a new process group that receives SIGTERM
    /// when this process dies
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls async-signal-safe functions
        // (setpgid, prctl) between fork and exec.
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::from)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}
