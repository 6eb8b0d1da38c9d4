//! Helper daemon processes

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;
use tracing::debug;

use tether_host_api::{HostError, HostResult};

/// How long a helper gets to exit after SIGTERM before SIGKILL
pub const HELPER_STOP_GRACE: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Child process leading its own process group
pub struct ManagedProcess {
    pub child: Child,
    pub pid: u32,
    pub pgid: u32,
}

impl ManagedProcess {
    /// Spawn `program` as the leader of a new session
    pub fn spawn(program: &Path, args: &[String]) -> HostResult<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // SAFETY: setsid is async-signal-safe and touches no parent state
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::from)?;
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|e| {
            HostError::ApplyFailed(format!("Failed to spawn {}: {}", program.display(), e))
        })?;

        let pid = child.id();
        let pgid = pid; // setsid makes the child its own group leader

        debug!(pid, pgid, program = %program.display(), "Helper spawned");

        Ok(Self { child, pid, pgid })
    }

    fn signal_group(&self, sig: Signal) -> HostResult<()> {
        let pgid = Pid::from_raw(-(self.pgid as i32));

        match signal::kill(pgid, sig) {
            Ok(()) => {
                debug!(pgid = self.pgid, signal = %sig, "Signalled process group");
                Ok(())
            }
            // Already gone
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(HostError::RevertFailed(format!(
                "Failed to send {} to process group {}: {}",
                sig, self.pgid, e
            ))),
        }
    }

    pub fn terminate(&self) -> HostResult<()> {
        self.signal_group(Signal::SIGTERM)
    }

    pub fn kill(&self) -> HostResult<()> {
        self.signal_group(Signal::SIGKILL)
    }

    /// Exit status if the process has exited (non-blocking)
    pub fn try_wait(&mut self) -> HostResult<Option<ExitStatus>> {
        self.child
            .try_wait()
            .map_err(|e| HostError::Internal(format!("Wait failed: {}", e)))
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL
    pub async fn stop(&mut self, grace: Duration) -> HostResult<()> {
        self.terminate()?;

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if self.try_wait()?.is_some() {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        debug!(pid = self.pid, "Helper ignored SIGTERM, killing");
        self.kill()?;

        // Reap so the child does not linger as a zombie
        for _ in 0..20 {
            if self.try_wait()?.is_some() {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(HostError::RevertFailed(format!(
            "Process {} did not exit after SIGKILL",
            self.pid
        )))
    }
}
