use std::{io, path::PathBuf, process::Stdio, time::Duration};

use anyhow::Result;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use super::Runnable;

#[derive(Error, Debug)]
pub enum SubprocessError {
    #[error("could not start monitor process: {0}")]
    Spawn(#[from] io::Error),
    #[error("monitor process timed out after {0:?}")]
    Timeout(Duration),
    #[error("monitor process failed with exit code {code:?}")]
    Exit { code: Option<i32> },
}

/// Runs one monitoring cycle in a fresh child process.
///
/// Output is captured and relayed to the log. A child still running at the
/// timeout is killed.
#[derive(Debug, Clone)]
pub struct SubprocessJob {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessJob {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        SubprocessJob {
            program: program.into(),
            args,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn invoke(&self) -> Result<(), SubprocessError> {
        info!(program = %self.program.display(), "starting monitor run");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| SubprocessError::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!(output = %stdout.trim_end(), "monitor stdout");
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!(output = %stderr.trim_end(), "monitor stderr");
        }

        if output.status.success() {
            info!("monitor run complete");
            Ok(())
        } else {
            Err(SubprocessError::Exit {
                code: output.status.code(),
            })
        }
    }
}

impl Runnable for SubprocessJob {
    async fn run(&mut self) -> Result<()> {
        self.invoke().await?;
        Ok(())
    }
}
