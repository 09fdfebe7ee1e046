//! Child process lifecycle
//!
//! Every external command runs in its own process group and is recorded in a
//! global registry while it runs. If the installer is interrupted (Ctrl-C,
//! SIGTERM, SIGHUP) the whole group of each live child gets SIGTERM, then
//! SIGKILL after a grace period, so a half-finished `sgdisk` or `pacstrap`
//! never outlives the installer.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static CHILD_REGISTRY: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();

/// PIDs (and process group IDs, which are equal) of running children
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    terminating: bool,
}

impl ChildRegistry {
    /// The process-wide registry
    pub fn global() -> &'static Mutex<ChildRegistry> {
        CHILD_REGISTRY.get_or_init(|| Mutex::new(ChildRegistry::default()))
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!(pid, "child registered");
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!(pid, "child unregistered");
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// SIGTERM every child group, wait up to `grace`, then SIGKILL survivors.
    /// Runs at most once per registry.
    pub fn terminate_all(&mut self, grace: Duration) {
        if std::mem::replace(&mut self.terminating, true) {
            return;
        }
        if self.pids.is_empty() {
            return;
        }

        let pids: Vec<u32> = self.pids.drain().collect();
        info!("Terminating {} child process(es)", pids.len());

        for &pid in &pids {
            signal_group_or_pid(pid, Signal::SIGTERM);
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                info!("Child processes exited after SIGTERM");
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in pids.iter().filter(|&&pid| is_process_alive(pid)) {
            warn!(pid, "child ignored SIGTERM, sending SIGKILL");
            signal_group_or_pid(pid, Signal::SIGKILL);
        }
    }
}

/// Signal the whole group (negative PID), falling back to the single process
fn signal_group_or_pid(pid: u32, sig: Signal) {
    let raw = pid as i32;
    if signal::kill(Pid::from_raw(-raw), sig).is_err() {
        if let Err(e) = signal::kill(Pid::from_raw(raw), sig) {
            debug!(pid, "could not send {}: {}", sig, e);
        }
    }
}

/// Alive means it exists and is not a zombie
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    // Field 3 of /proc/<pid>/stat is the state letter
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .split_whitespace()
            .nth(2)
            .is_none_or(|state| !matches!(state, "Z" | "X")),
        Err(_) => true,
    }
}

/// Install SIGINT/SIGTERM/SIGHUP handling: kill children, exit 128 + signal.
pub fn init_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "signal",
            };
            warn!("Received {}, stopping child processes", name);
            if sig == SIGINT {
                eprintln!("\nInstallation aborted by user (Ctrl+C).");
            }
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Run a `Command` as the leader of a new process group that dies with us
pub trait CommandProcessGroup {
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: only async-signal-safe calls (setpgid, prctl) run between fork and exec
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
