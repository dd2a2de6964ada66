// Competing renewal timer handling
// Certbot packages ship their own systemd timer; two renewal agents must not race on the store

use crate::process::{args, ProcessError, ProcessRunner};
use crate::store::elevation::{Elevation, ElevationError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TimerError {
    #[error(transparent)]
    Query(#[from] ProcessError),

    #[error("cannot disable {unit}: {source}")]
    Disable {
        unit: String,
        #[source]
        source: ElevationError,
    },
}

/// Query and disable OS-level timer units
#[async_trait]
pub trait TimerControl: Send + Sync {
    async fn exists(&self, unit: &str) -> Result<bool, TimerError>;
    async fn is_active(&self, unit: &str) -> Result<bool, TimerError>;
    async fn disable(&self, unit: &str) -> Result<(), TimerError>;
}

/// Timer control through `systemctl`
pub struct SystemdTimers {
    runner: Arc<dyn ProcessRunner>,
    elevation: Elevation,
}

impl SystemdTimers {
    pub fn new(runner: Arc<dyn ProcessRunner>, elevation: Elevation) -> Self {
        Self { runner, elevation }
    }
}

#[async_trait]
impl TimerControl for SystemdTimers {
    async fn exists(&self, unit: &str) -> Result<bool, TimerError> {
        let output = self
            .runner
            .run("systemctl", &args(["list-unit-files", "--no-legend", unit]))
            .await?;
        // list-unit-files exits 0 with empty output on old systemd when nothing matches
        Ok(output.success() && output.stdout_lossy().contains(unit))
    }

    async fn is_active(&self, unit: &str) -> Result<bool, TimerError> {
        let output = self
            .runner
            .run("systemctl", &args(["is-active", "--quiet", unit]))
            .await?;
        Ok(output.success())
    }

    async fn disable(&self, unit: &str) -> Result<(), TimerError> {
        let disable_args = args(["disable", "--now", unit]);

        let direct = self.runner.run("systemctl", &disable_args).await?;
        if direct.success() {
            return Ok(());
        }

        debug!(unit = %unit, detail = %direct.describe(), "Direct disable failed");
        self.elevation
            .run("systemctl", &disable_args)
            .await
            .map(|_| ())
            .map_err(|source| TimerError::Disable {
                unit: unit.to_string(),
                source,
            })
    }
}

/// Result of settling the competing timers
#[derive(Debug, Default)]
pub struct TimerSweep {
    /// Units that were active and are now disabled
    pub disabled: Vec<String>,

    /// Units that could not be queried or disabled
    pub failed: Vec<(String, TimerError)>,
}

impl TimerSweep {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Stop and disable every listed unit that exists and is active.
/// Each unit is settled on its own; one failure never leaves a later unit
/// unchecked. Repeated calls are no-ops.
pub async fn ensure_no_competing_timer(timers: &dyn TimerControl, units: &[String]) -> TimerSweep {
    let mut sweep = TimerSweep::default();

    for unit in units {
        match settle(timers, unit).await {
            Ok(true) => sweep.disabled.push(unit.clone()),
            Ok(false) => {}
            Err(e) => {
                warn!(unit = %unit, error = %e, "Could not settle competing renewal timer");
                sweep.failed.push((unit.clone(), e));
            }
        }
    }

    sweep
}

/// Disable `unit` if it is installed and active; `Ok(true)` when it was disabled
async fn settle(timers: &dyn TimerControl, unit: &str) -> Result<bool, TimerError> {
    if !timers.exists(unit).await? {
        debug!(unit = %unit, "Timer unit not installed");
        return Ok(false);
    }
    if !timers.is_active(unit).await? {
        debug!(unit = %unit, "Timer unit installed but inactive");
        return Ok(false);
    }

    warn!(unit = %unit, "Competing renewal timer is active, disabling it");
    timers.disable(unit).await?;
    info!(unit = %unit, "Competing renewal timer disabled");
    Ok(true)
}
