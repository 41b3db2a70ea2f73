//! The scheduling engine - one resolution pass per pipeline per tick.
//!
//! ```text
//! Snapshot VersionsDB → Resolve every job → Save changes → Trigger builds
//! ```

use std::sync::Arc;

use anyhow::Context;
use ratchet_core::{Job, PipelineId, PipelineSnapshot, ResolvedInputSet};
use ratchet_resolve::{next_inputs_changed, InputMapper, ResolveError, VersionResolver};
use ratchet_storage::Storage;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::trigger::BuildTrigger;

/// What a tick did for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Same next build inputs as before
    Unchanged,
    /// New next build inputs were saved
    Updated {
        /// A build was requested
        triggered: bool,
    },
    /// No consistent set of inputs
    Unsatisfied,
    /// Creating the build failed; the previous next build inputs were kept,
    /// so the next tick asks again
    TriggerFailed,
    /// The job did not match the snapshot and was left untouched
    Skipped,
}

/// Result of one scheduling tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Pipeline name
    pub pipeline: String,
    /// Skipped because the pipeline is paused
    pub paused: bool,
    /// Outcome per job, in job-name order
    pub jobs: Vec<(String, JobOutcome)>,
}

impl TickReport {
    /// Number of builds requested.
    pub fn triggered(&self) -> usize {
        self.jobs
            .iter()
            .filter(|(_, outcome)| matches!(outcome, JobOutcome::Updated { triggered: true }))
            .count()
    }

    /// Number of jobs whose build could not be requested.
    pub fn failed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|(_, outcome)| *outcome == JobOutcome::TriggerFailed)
            .count()
    }

    /// Outcome for a job.
    pub fn outcome(&self, job: &str) -> Option<JobOutcome> {
        self.jobs.iter().find(|(name, _)| name == job).map(|(_, outcome)| *outcome)
    }
}

type Resolution = (Job, ratchet_resolve::Result<(ResolvedInputSet, ResolvedInputSet)>);

/// Drives input resolution and build triggering for pipelines.
pub struct SchedulingEngine<S: ?Sized> {
    store: Arc<S>,
    trigger: Arc<dyn BuildTrigger>,
    config: EngineConfig,
}

impl<S: Storage + ?Sized + 'static> SchedulingEngine<S> {
    /// Create an engine with the default configuration.
    pub fn new(store: Arc<S>, trigger: Arc<dyn BuildTrigger>) -> Self {
        Self {
            store,
            trigger,
            config: EngineConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one scheduling pass over a pipeline.
    ///
    /// Pins, jobs and versions all come from one snapshot. A job whose build
    /// cannot be requested keeps its previous next build inputs; store
    /// failures abort the pass.
    pub async fn run_tick(&self, pipeline: PipelineId) -> anyhow::Result<TickReport> {
        let PipelineSnapshot {
            pipeline: record,
            versions,
            resources,
            jobs,
        } = self
            .store
            .snapshot_pipeline(pipeline)
            .await
            .with_context(|| format!("loading snapshot of pipeline {}", pipeline))?;

        let mut report = TickReport {
            pipeline: record.name.clone(),
            paused: record.paused,
            jobs: Vec::new(),
        };
        if record.paused {
            debug!("Pipeline {} is paused, not scheduling", record.name);
            return Ok(report);
        }

        let db = Arc::new(versions);
        let resources = Arc::new(resources);
        let resolver = VersionResolver::new(self.config.resolver_config());

        let mut tasks = JoinSet::new();
        for job in jobs {
            let db = db.clone();
            let resources = resources.clone();
            let resolver = resolver.clone();
            tasks.spawn_blocking(move || -> Resolution {
                let resolved = resolver
                    .resolve_inputs(&job, &resources, &db)
                    .and_then(|next| Ok((next, resolver.resolve_independently(&job, &resources, &db)?)));
                (job, resolved)
            });
        }

        let mut resolutions: Vec<Resolution> = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            resolutions.push(joined.context("resolution task failed")?);
        }
        resolutions.sort_by(|a, b| a.0.name.cmp(&b.0.name));

        let mapper = InputMapper::new(self.store.clone(), resolver);
        for (job, resolved) in resolutions {
            let outcome = self.apply(&mapper, &job, resolved).await?;
            report.jobs.push((job.name, outcome));
        }

        info!(
            "Scheduled pipeline {}: {} jobs, {} builds triggered, {} failed",
            report.pipeline,
            report.jobs.len(),
            report.triggered(),
            report.failed()
        );
        Ok(report)
    }

    async fn apply(
        &self,
        mapper: &InputMapper<S>,
        job: &Job,
        resolved: ratchet_resolve::Result<(ResolvedInputSet, ResolvedInputSet)>,
    ) -> anyhow::Result<JobOutcome> {
        let (next, independent) = match resolved {
            Ok(sets) => sets,
            Err(ResolveError::InconsistentSnapshot(reason)) => {
                warn!("Skipping job {}: {}", job.name, reason);
                return Ok(JobOutcome::Skipped);
            }
            Err(e) => return Err(anyhow::Error::new(e).context(format!("resolving job {}", job.name))),
        };

        // The cache is written only after the build was requested.
        let triggered = next.satisfied && next_inputs_changed(job, &next) && should_trigger(job, &next);
        if triggered {
            if let Err(e) = self.trigger.trigger_build(job, &next).await {
                error!("Triggering build of job {} failed: {:#}", job.name, e);
                return Ok(JobOutcome::TriggerFailed);
            }
            info!("Triggered build of job {}", job.name);
        }

        let mapping = mapper.save(job, next, independent).await?;
        Ok(if !mapping.resolved.satisfied {
            JobOutcome::Unsatisfied
        } else if !mapping.next_changed {
            JobOutcome::Unchanged
        } else {
            JobOutcome::Updated { triggered }
        })
    }

    /// Tick on the scheduling interval until `shutdown` turns true or its
    /// sender is dropped. A failed tick is logged and retried next interval.
    pub async fn run(&self, pipeline: PipelineId, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.config.scheduling_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler for pipeline {} stopping", pipeline);
                        return Ok(());
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_tick(pipeline).await {
                        error!("Scheduling pipeline {} failed: {:#}", pipeline, e);
                    }
                }
            }
        }
    }
}

/// A build is due when a triggering input resolved to a version the job has
/// not used for it before.
fn should_trigger(job: &Job, inputs: &ResolvedInputSet) -> bool {
    job.inputs
        .iter()
        .filter(|input| input.trigger)
        .any(|input| inputs.version(&input.name).is_some_and(|v| v.first_occurrence))
}
