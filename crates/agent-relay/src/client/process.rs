//! Provider subprocess: spawn with piped stdio, forward stderr, kill on close.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::config::ProviderConfig;
use crate::types::ClientError;

/// A running provider process. The child is killed when this is dropped.
pub struct ProviderProcess {
    name: String,
    child: Child,
}

impl ProviderProcess {
    /// Spawn the provider and take its stdin/stdout pipes. Stderr lines are
    /// forwarded to the log at debug level.
    pub fn spawn(
        name: &str,
        config: &ProviderConfig,
    ) -> Result<(Self, ChildStdin, ChildStdout), ClientError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ClientError::Spawn {
            provider: name.to_string(),
            source,
        })?;

        // Dropping `child` on the error paths below kills it.
        let stdin = child.stdin.take().ok_or_else(|| ClientError::MissingPipe {
            provider: name.to_string(),
            stream: "stdin",
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ClientError::MissingPipe {
            provider: name.to_string(),
            stream: "stdout",
        })?;

        if let Some(stderr) = child.stderr.take() {
            let provider = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(provider = %provider, "stderr: {line}");
                }
            });
        }

        tracing::debug!(provider = %name, pid = ?child.id(), command = %config.command, "provider spawned");
        Ok((
            Self {
                name: name.to_string(),
                child,
            },
            stdin,
            stdout,
        ))
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the process if it is still running and reap it.
    pub async fn terminate(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(provider = %self.name, %status, "provider already exited");
            }
            _ => {
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(provider = %self.name, "failed to kill provider: {e}");
                } else {
                    tracing::debug!(provider = %self.name, "provider killed");
                }
            }
        }
    }
}
