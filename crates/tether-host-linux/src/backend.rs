//! Linux share backend implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tether_api::{SharingConfig, SharingMode};
use tether_config::LinuxSettings;
use tether_host_api::{BackendCapabilities, HostError, HostResult, ShareBackend};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::diagnostics::{missing_tools, privilege_issue};
use crate::plan::{Action, Helper, HostState, SharePlan};
use crate::process::{HELPER_STOP_GRACE, ManagedProcess};

/// Helpers that exit within this window are treated as failed to start
const HELPER_STARTUP_GRACE: Duration = Duration::from_millis(300);

const IP_FORWARD_PATH: &str = "/proc/sys/net/ipv4/ip_forward";

/// Executes host tools on behalf of the backend
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion; non-zero exit is an error
    async fn run(&self, program: &Path, args: &[String]) -> HostResult<()>;

    /// Start a helper daemon and keep it running
    async fn spawn(&self, helper: Helper, program: &Path, args: &[String]) -> HostResult<()>;

    /// Stop a helper started by `spawn`. Stopping one that is not running is
    /// not an error.
    async fn terminate(&self, helper: Helper) -> HostResult<()>;
}

/// Runs real processes
#[derive(Default)]
pub struct SystemRunner {
    helpers: Mutex<HashMap<Helper, ManagedProcess>>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &Path, args: &[String]) -> HostResult<()> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                HostError::ApplyFailed(format!("Failed to run {}: {}", program.display(), e))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(HostError::ApplyFailed(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            stderr.trim()
        )))
    }

    async fn spawn(&self, helper: Helper, program: &Path, args: &[String]) -> HostResult<()> {
        let mut helpers = self.helpers.lock().await;
        if let Some(mut old) = helpers.remove(&helper) {
            warn!(%helper, pid = old.pid, "Replacing helper that is still tracked");
            old.stop(HELPER_STOP_GRACE).await?;
        }

        // Tracked before the startup wait so `terminate` can reach it even if
        // this call is abandoned
        let pid = ManagedProcess::spawn(program, args).map(|process| {
            let pid = process.pid;
            helpers.insert(helper, process);
            pid
        })?;
        tokio::time::sleep(HELPER_STARTUP_GRACE).await;

        let exited = match helpers.get_mut(&helper) {
            Some(process) => process.try_wait()?,
            None => None,
        };
        if let Some(status) = exited {
            helpers.remove(&helper);
            return Err(HostError::ApplyFailed(format!(
                "{} exited during startup with {}",
                helper, status
            )));
        }

        info!(%helper, pid, "Helper running");
        Ok(())
    }

    async fn terminate(&self, helper: Helper) -> HostResult<()> {
        let process = self.helpers.lock().await.remove(&helper);
        match process {
            Some(mut process) => {
                process.stop(HELPER_STOP_GRACE).await?;
                info!(%helper, pid = process.pid, "Helper stopped");
                Ok(())
            }
            None => {
                debug!(%helper, "Helper not running");
                Ok(())
            }
        }
    }
}

impl Drop for SystemRunner {
    fn drop(&mut self) {
        for (helper, process) in self.helpers.get_mut().drain() {
            if let Err(e) = process.kill() {
                warn!(%helper, error = %e, "Failed to kill helper on drop");
            }
        }
    }
}

/// Undo log for the plan being applied or last applied.
///
/// Filled in step by step, so an apply that is dropped part way through
/// still leaves enough behind for `revert` to clean up.
struct Applied {
    mode: SharingMode,
    /// In execution order; undone from the back
    undo: Vec<Action>,
    complete: bool,
}

/// Share backend that drives `ip`, `sysctl`, `iptables`, `hostapd` and
/// `dnsmasq`
pub struct LinuxShareBackend {
    capabilities: BackendCapabilities,
    settings: LinuxSettings,
    runner: Arc<dyn CommandRunner>,
    applied: Mutex<Option<Applied>>,
    ip_forward_path: PathBuf,
}

impl LinuxShareBackend {
    pub fn new(settings: LinuxSettings) -> Self {
        Self::with_runner(settings, Arc::new(SystemRunner::new()))
    }

    pub fn with_runner(settings: LinuxSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            capabilities: BackendCapabilities::linux(),
            settings,
            runner,
            applied: Mutex::new(None),
            ip_forward_path: PathBuf::from(IP_FORWARD_PATH),
        }
    }

    #[cfg(test)]
    fn with_ip_forward_path(mut self, path: PathBuf) -> Self {
        self.ip_forward_path = path;
        self
    }

    /// Host settings the plan has to preserve
    async fn host_state(&self) -> HostState {
        let ip_forward = match tokio::fs::read_to_string(&self.ip_forward_path).await {
            Ok(value) => value.trim() == "1",
            Err(e) => {
                warn!(
                    path = %self.ip_forward_path.display(),
                    error = %e,
                    "Cannot read forwarding state, assuming off"
                );
                false
            }
        };
        HostState { ip_forward }
    }

    async fn execute(&self, action: &Action) -> HostResult<()> {
        debug!(action = %action, "Executing");
        match action {
            Action::Run { program, args } => self.runner.run(program, args).await,
            Action::WriteFile { path, contents } => write_private_file(path, contents).await,
            Action::RemoveFile { path } => match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            },
            Action::Spawn {
                helper,
                program,
                args,
            } => self.runner.spawn(*helper, program, args).await,
            Action::Terminate { helper } => self.runner.terminate(*helper).await,
        }
    }

    /// Run the undo log newest first and clear it, returning the first
    /// failure. Every step is attempted.
    async fn unwind(&self, applied: &mut Option<Applied>) -> Option<String> {
        let mut first_error = None;
        while let Some(action) = applied.as_mut().and_then(|record| record.undo.pop()) {
            if let Err(e) = self.execute(&action).await {
                warn!(action = %action, error = %e, "Undo step failed");
                first_error.get_or_insert_with(|| format!("{}: {}", action, e));
            }
        }
        *applied = None;
        first_error
    }
}

async fn write_private_file(path: &Path, contents: &str) -> HostResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;

    // `mode` only applies on creation
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[async_trait]
impl ShareBackend for LinuxShareBackend {
    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    async fn apply(&self, config: &SharingConfig) -> HostResult<()> {
        let mut applied = self.applied.lock().await;
        match applied.as_ref() {
            Some(record) if record.complete => {
                return Err(HostError::ApplyFailed(
                    "a sharing config is already applied".into(),
                ));
            }
            Some(_) => {
                return Err(HostError::ApplyFailed(
                    "an interrupted apply is still recorded, revert first".into(),
                ));
            }
            None => {}
        }

        let host = self.host_state().await;
        let plan = SharePlan::build(config, &self.settings, &host)?;
        info!(
            mode = %plan.mode,
            steps = plan.steps.len(),
            ip_forward = host.ip_forward,
            "Applying share plan"
        );

        let record = applied.insert(Applied {
            mode: plan.mode,
            undo: Vec::with_capacity(plan.steps.len()),
            complete: false,
        });

        for (index, step) in plan.steps.into_iter().enumerate() {
            // Stopping a helper or removing a file that never appeared is
            // harmless, so those undos are logged before their step runs
            let undo_first = step.undo.as_ref().is_some_and(Action::tolerates_missing);
            if undo_first {
                record.undo.extend(step.undo.clone());
            }

            if let Err(e) = self.execute(&step.action).await {
                warn!(
                    action = %step.action,
                    error = %e,
                    completed = index,
                    "Step failed, rolling back"
                );
                if let Some(undo_error) = self.unwind(&mut applied).await {
                    warn!(error = %undo_error, "Rollback incomplete");
                }
                return Err(HostError::ApplyFailed(format!("{}: {}", step.action, e)));
            }

            if !undo_first {
                record.undo.extend(step.undo);
            }
        }

        record.complete = true;
        Ok(())
    }

    async fn revert(&self) -> HostResult<()> {
        let mut applied = self.applied.lock().await;
        let Some(record) = applied.as_ref() else {
            return Err(HostError::NotApplied);
        };
        info!(
            mode = %record.mode,
            complete = record.complete,
            steps = record.undo.len(),
            "Reverting share plan"
        );

        match self.unwind(&mut applied).await {
            None => Ok(()),
            Some(first) => Err(HostError::RevertFailed(first)),
        }
    }

    fn diagnostics(&self) -> Vec<String> {
        let mut issues = missing_tools(
            &self.settings.tools,
            std::env::var_os("PATH").as_deref(),
        );
        issues.extend(privilege_issue(nix::unistd::geteuid()));
        issues
    }
}
