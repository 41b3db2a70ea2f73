//! Periodic check ticker.

use std::sync::Arc;

use ratchet_check::{CheckError, CheckOutcome, CheckRequest, CheckScheduler};
use ratchet_core::{Clock, PipelineId};
use ratchet_storage::Storage;
use tracing::{info, warn};

use crate::trigger::BuildTrigger;

/// Result of one check tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckTickReport {
    /// Outcome per resource, in resource-name order
    pub outcomes: Vec<(String, CheckOutcome)>,
    /// Resources whose check could not be requested, with the error
    pub errors: Vec<(String, String)>,
}

impl CheckTickReport {
    /// Number of checks created.
    pub fn created(&self) -> usize {
        self.outcomes.iter().filter(|(_, outcome)| outcome.created()).count()
    }
}

/// Requests periodic checks for every resource of a pipeline.
pub struct CheckTicker<S: ?Sized> {
    store: Arc<S>,
    scheduler: CheckScheduler<S>,
    trigger: Arc<dyn BuildTrigger>,
}

impl<S: Storage + ?Sized> CheckTicker<S> {
    /// Create a ticker.
    pub fn new(store: Arc<S>, scheduler: CheckScheduler<S>, trigger: Arc<dyn BuildTrigger>) -> Self {
        Self {
            store,
            scheduler,
            trigger,
        }
    }

    /// Create a ticker with a fresh scheduler on `clock`.
    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>, trigger: Arc<dyn BuildTrigger>) -> Self {
        let scheduler = CheckScheduler::new(store.clone()).with_clock(clock);
        Self::new(store, scheduler, trigger)
    }

    /// Request a periodic check of each resource. A resource whose request
    /// fails is reported and skipped; store failures abort the tick.
    pub async fn tick(&self, pipeline: PipelineId) -> anyhow::Result<CheckTickReport> {
        let types = self.store.list_resource_types(pipeline).await?;
        let resources = self.store.list_resources(pipeline).await?;
        let request = CheckRequest::periodic();

        let mut report = CheckTickReport::default();
        for resource in &resources {
            match self.scheduler.request_check(resource, &types, &request).await {
                Ok(outcome) => {
                    if let CheckOutcome::Created(check) = &outcome {
                        self.trigger.check_started(check).await?;
                    }
                    report.outcomes.push((resource.name.clone(), outcome));
                }
                Err(CheckError::Storage(e)) => return Err(e.into()),
                Err(e) => {
                    warn!("Could not check resource {}: {}", resource.name, e);
                    report.errors.push((resource.name.clone(), e.to_string()));
                }
            }
        }

        info!(
            "Check tick for pipeline {}: {} of {} resources checked",
            pipeline,
            report.created(),
            resources.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ratchet_core::{Check, FixedClock, Job, Resource, ResourceId, ResolvedInputSet};
    use ratchet_storage::MemoryStorage;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        checks: Mutex<Vec<Check>>,
    }

    #[async_trait]
    impl BuildTrigger for Recorder {
        async fn trigger_build(&self, _job: &Job, _inputs: &ResolvedInputSet) -> anyhow::Result<()> {
            Ok(())
        }

        async fn check_started(&self, check: &Check) -> anyhow::Result<()> {
            self.checks.lock().await.push(check.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tick_checks_each_resource_once() {
        let store = Arc::new(MemoryStorage::new());
        let pipeline = store.save_pipeline("main").await.unwrap();
        for (name, uri) in [("app", "a"), ("lib", "b")] {
            store
                .save_resource(Resource::new(ResourceId(0), pipeline.id, name, "git").with_source(json!({ "uri": uri })))
                .await
                .unwrap();
        }
        store
            .save_resource(Resource::new(ResourceId(0), pipeline.id, "broken", "git").with_check_every("soon"))
            .await
            .unwrap();

        let recorder = Arc::new(Recorder::default());
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        let ticker = CheckTicker::with_clock(store.clone(), clock, recorder.clone());

        let report = ticker.tick(pipeline.id).await.unwrap();
        assert_eq!(report.created(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "broken");
        assert_eq!(recorder.checks.lock().await.len(), 2);

        // Still running, so the second tick creates nothing.
        let report = ticker.tick(pipeline.id).await.unwrap();
        assert_eq!(report.created(), 0);
        assert!(report.outcomes.iter().all(|(_, o)| matches!(o, CheckOutcome::InFlight(_))));
    }
}
