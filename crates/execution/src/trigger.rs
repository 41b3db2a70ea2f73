//! Build trigger - the collaborator that turns decisions into builds.

use async_trait::async_trait;
use ratchet_core::{Check, Job, ResolvedInputSet};
use tracing::info;

/// Receives the scheduler's decisions.
///
/// The engine never creates builds or runs checks itself; it tells an
/// implementation of this trait to.
#[async_trait]
pub trait BuildTrigger: Send + Sync {
    /// Create a build of `job` with the resolved inputs.
    async fn trigger_build(&self, job: &Job, inputs: &ResolvedInputSet) -> anyhow::Result<()>;

    /// A check was created and should be run by a worker.
    async fn check_started(&self, _check: &Check) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Trigger that only logs; builds are recorded separately.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTrigger;

#[async_trait]
impl BuildTrigger for LoggingTrigger {
    async fn trigger_build(&self, job: &Job, inputs: &ResolvedInputSet) -> anyhow::Result<()> {
        let versions: Vec<String> = inputs
            .inputs
            .iter()
            .filter_map(|(name, resolution)| resolution.version().map(|v| format!("{}={}", name, v.version_id)))
            .collect();
        info!("Build of job {} requested with {}", job.name, versions.join(", "));
        Ok(())
    }

    async fn check_started(&self, check: &Check) -> anyhow::Result<()> {
        info!("Check {} of {} waiting for a worker", check.id, check.checkable);
        Ok(())
    }
}
