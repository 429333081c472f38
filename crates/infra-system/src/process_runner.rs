// Local process runner
// Spawns a child process with a filtered environment and a hard timeout
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use duct_core::port::{CommandExecutor, CommandOutput, ExecutionError};

/// Variables passed through from the agent's own environment by default
const DEFAULT_INHERITED_ENV: &[&str] = &["PATH", "HOME", "USER", "LANG", "LC_ALL", "TZ"];

/// Runs commands as local child processes.
///
/// The child gets a clean environment: only the inherited allowlist plus the
/// variables supplied with each call. A child outliving its timeout is sent
/// SIGKILL and reported as [`ExecutionError::Timeout`].
pub struct ProcessRunner {
    inherited_env: Vec<String>,
}

impl ProcessRunner {
    /// # Example
    /// ```ignore
    /// let runner = ProcessRunner::new(vec!["PATH".to_string(), "HOME".to_string()]);
    /// ```
    pub fn new(inherited_env: Vec<String>) -> Self {
        Self { inherited_env }
    }

    fn inherited(&self) -> BTreeMap<String, String> {
        self.inherited_env
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
            .collect()
    }

    async fn wait_for_output(
        child: &mut Child,
        stdout: JoinHandle<Vec<u8>>,
        stderr: JoinHandle<Vec<u8>>,
    ) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), ExecutionError> {
        let status = child
            .wait()
            .await
            .map_err(|e| ExecutionError::IoError(e.to_string()))?;
        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        Ok((status, stdout, stderr))
    }

    /// SIGKILL the child. A child that already exited (ESRCH) is not an error.
    fn force_kill(child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let Some(pid) = child.id() else {
                return;
            };
            match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => debug!(pid = pid, "Sent SIGKILL"),
                Err(Errno::ESRCH) => debug!(pid = pid, "Process exited before SIGKILL"),
                Err(e) => warn!(pid = pid, error = %e, "SIGKILL failed"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Kill failed, process probably exited");
            }
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_INHERITED_ENV.iter().map(|s| s.to_string()).collect())
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

fn exit_code(status: ExitStatus) -> Result<i32, ExecutionError> {
    if let Some(code) = status.code() {
        return Ok(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(ExecutionError::Killed(format!("terminated by signal {}", signal)));
        }
    }

    Err(ExecutionError::Killed("terminated without exit code".to_string()))
}

#[async_trait]
impl CommandExecutor for ProcessRunner {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        limit: Duration,
    ) -> Result<CommandOutput, ExecutionError> {
        debug!(command = %command, args = ?args, timeout_ms = limit.as_millis() as u64, "Spawning process");

        let mut child = Command::new(command)
            .args(args)
            .env_clear()
            .envs(self.inherited())
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{}: {}", command, e)))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = timeout(limit, Self::wait_for_output(&mut child, stdout, stderr)).await;
        match waited {
            Ok(Ok((status, stdout, stderr))) => {
                let exit_code = exit_code(status)?;
                debug!(command = %command, exit_code = exit_code, "Process finished");
                Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    exit_code,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(command = %command, timeout_ms = limit.as_millis() as u64, "Process timed out, killing");
                Self::force_kill(&mut child);
                let _ = timeout(Duration::from_secs(1), child.wait()).await;
                Err(ExecutionError::Timeout(limit.as_millis() as u64))
            }
        }
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}
