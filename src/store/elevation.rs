// Privilege elevation
// Retries a failed unprivileged operation through a non-interactive sudo

use crate::process::{ProcessOutput, ProcessRunner};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("privilege elevation unavailable")]
    Unavailable,

    #[error(transparent)]
    Spawn(#[from] crate::process::ProcessError),

    #[error("elevated {program} failed with {detail}")]
    Failed { program: String, detail: String },
}

/// Runs commands under elevated privileges, or refuses when elevation is off
#[derive(Clone)]
pub struct Elevation {
    runner: Arc<dyn ProcessRunner>,
    command: Option<String>,
}

impl Elevation {
    /// Elevate through `command` (usually `sudo`), unless the process is
    /// already root or `command` is empty, in which case elevation is off
    pub fn new(runner: Arc<dyn ProcessRunner>, command: &str) -> Self {
        let command = if command.trim().is_empty() || running_as_root() {
            None
        } else {
            Some(command.trim().to_string())
        };
        Self { runner, command }
    }

    /// Elevate through `command` regardless of the current user
    pub fn with_command(runner: Arc<dyn ProcessRunner>, command: impl Into<String>) -> Self {
        Self {
            runner,
            command: Some(command.into()),
        }
    }

    pub fn disabled(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            command: None,
        }
    }

    /// Run `program args...` elevated and require a zero exit status
    pub async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, ElevationError> {
        let command = self.command.as_deref().ok_or(ElevationError::Unavailable)?;

        // -n: never prompt, fail instead (cron has no terminal)
        let mut full_args = Vec::with_capacity(args.len() + 2);
        full_args.push("-n".to_string());
        full_args.push(program.to_string());
        full_args.extend_from_slice(args);

        debug!(program = %program, "Retrying with elevated privileges");
        let output = self.runner.run(command, &full_args).await?;

        if output.success() {
            Ok(output)
        } else {
            Err(ElevationError::Failed {
                program: program.to_string(),
                detail: output.describe(),
            })
        }
    }
}

#[cfg(unix)]
fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}
