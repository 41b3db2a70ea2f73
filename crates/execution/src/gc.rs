//! Garbage-collection reachability.
//!
//! Reports what must not be reaped: scopes still assigned to a checkable or
//! running a check, and versions a job's cached resolution points at.

use std::collections::BTreeSet;

use ratchet_core::{Checkable, ScopeId, VersionId};
use ratchet_storage::{Result, Storage};
use serde::Serialize;

/// Scopes and versions still in use.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Reachable {
    /// Scopes referenced by checkables or in-flight checks
    pub scopes: BTreeSet<ScopeId>,
    /// Versions referenced by next or independent build inputs
    pub versions: BTreeSet<VersionId>,
}

/// Walk every pipeline and collect what is still reachable.
pub async fn reachable<S: Storage + ?Sized>(store: &S) -> Result<Reachable> {
    let mut reachable = Reachable::default();

    for pipeline in store.list_pipelines().await? {
        let types = store.list_resource_types(pipeline.id).await?;
        let resources = store.list_resources(pipeline.id).await?;

        let checkables = resources
            .iter()
            .map(|r| r as &dyn Checkable)
            .chain(types.types.iter().map(|t| t as &dyn Checkable))
            .chain(types.prototypes.iter().map(|p| p as &dyn Checkable));
        reachable
            .scopes
            .extend(checkables.filter_map(|c| c.scope_id().cloned()));

        for job in store.list_jobs(pipeline.id).await? {
            for set in job.next_build_inputs.iter().chain(job.independent_build_inputs.iter()) {
                reachable.versions.extend(set.version_ids());
            }
        }
    }

    reachable
        .scopes
        .extend(store.in_flight_checks().await?.into_iter().map(|check| check.scope_id));
    Ok(reachable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratchet_core::{DiscoveredVersion, Job, JobId, JobInput, Resource, ResourceId, VersionContent};
    use ratchet_resolve::{InputMapper, VersionResolver};
    use ratchet_storage::{CheckStore, MemoryStorage, PipelineStore, VersionStore};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reachable_scopes_and_versions() {
        let store = Arc::new(MemoryStorage::new());
        let pipeline = store.save_pipeline("main").await.unwrap();
        let repo = store
            .save_resource(Resource::new(ResourceId(0), pipeline.id, "repo", "git").with_source(json!({"uri": "x"})))
            .await
            .unwrap();
        // Never assigned a scope.
        store
            .save_resource(Resource::new(ResourceId(0), pipeline.id, "idle", "git"))
            .await
            .unwrap();

        let scope = store.find_or_create_scope(repo.config_scope()).await.unwrap();
        store.set_checkable_scope(&repo.reference(), &scope.id).await.unwrap();
        let versions: Vec<DiscoveredVersion> = ["a", "b"]
            .iter()
            .map(|v| {
                let content: VersionContent = [("ref".to_string(), v.to_string())].into();
                DiscoveredVersion::from(content)
            })
            .collect();
        let recorded = store.record_versions(&scope.id, &versions).await.unwrap();

        assert!(reachable(&*store).await.unwrap().versions.is_empty());

        let job = store
            .save_job(Job::new(JobId(0), pipeline.id, "unit").with_inputs(vec![JobInput::new("repo")]))
            .await
            .unwrap();
        let db = store.snapshot_versions_db(pipeline.id).await.unwrap();
        let resources = store.list_resources(pipeline.id).await.unwrap();
        InputMapper::new(store.clone(), VersionResolver::default())
            .save_next_input_mapping(&job, &resources, &db)
            .await
            .unwrap();

        let found = reachable(&*store).await.unwrap();
        assert_eq!(found.scopes, BTreeSet::from([scope.id.clone()]));
        assert_eq!(found.versions, BTreeSet::from([recorded[1].id]));
    }
}
