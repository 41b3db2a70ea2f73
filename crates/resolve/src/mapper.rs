//! Input mapper - resolves a job and stores the result on it.

use std::sync::Arc;

use ratchet_core::{Job, Resource, ResolvedInputSet, VersionsDb};
use ratchet_storage::PipelineStore;
use tracing::{debug, info};

use crate::error::Result;
use crate::resolver::VersionResolver;

/// What a mapping pass did for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMapping {
    /// Resolution against the snapshot
    pub resolved: ResolvedInputSet,
    /// The stored next build inputs changed
    pub next_changed: bool,
}

/// Resolves jobs and writes their next and independent build inputs.
pub struct InputMapper<S: ?Sized> {
    store: Arc<S>,
    resolver: VersionResolver,
}

impl<S: PipelineStore + ?Sized> InputMapper<S> {
    /// Create a mapper.
    pub fn new(store: Arc<S>, resolver: VersionResolver) -> Self {
        Self { store, resolver }
    }

    /// The resolver in use.
    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Resolve `job` and save what changed. An unsatisfied resolution clears
    /// the job's next build inputs.
    pub async fn save_next_input_mapping(&self, job: &Job, resources: &[Resource], db: &VersionsDb) -> Result<InputMapping> {
        let resolved = self.resolver.resolve_inputs(job, resources, db)?;
        let independent = self.resolver.resolve_independently(job, resources, db)?;
        self.save(job, resolved, independent).await
    }

    /// Save results computed elsewhere, e.g. on a blocking thread.
    pub async fn save(&self, job: &Job, resolved: ResolvedInputSet, independent: ResolvedInputSet) -> Result<InputMapping> {
        if job.independent_build_inputs.as_ref() != Some(&independent) {
            self.store.save_independent_build_inputs(job.id, &independent).await?;
        }

        let next = resolved.satisfied.then_some(&resolved);
        let next_changed = next_inputs_changed(job, &resolved);
        if next_changed {
            self.store.save_next_build_inputs(job.id, next).await?;
            match next {
                Some(_) => info!("Job {} has new build inputs", job.name),
                None => info!("Job {} inputs unsatisfied: {} unresolved", job.name, resolved.unresolved().count()),
            }
        } else {
            debug!("Job {} build inputs unchanged", job.name);
        }

        Ok(InputMapping { resolved, next_changed })
    }
}

/// Whether saving `resolved` would change the job's next build inputs.
pub fn next_inputs_changed(job: &Job, resolved: &ResolvedInputSet) -> bool {
    job.next_build_inputs.as_ref() != resolved.satisfied.then_some(resolved)
}
