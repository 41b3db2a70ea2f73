//! Version resolver - picks the next build inputs of a job from a snapshot.

use std::collections::{BTreeMap, BTreeSet};

use ratchet_core::{
    InputResolution, Job, JobId, JobInput, Resource, ResolvedInputSet, ResolvedVersion, UnresolvedReason,
    VersionConstraint, VersionsDb,
};
use tracing::{debug, warn};

use crate::candidates::{Candidate, CandidateFinder, InputPlan, SnapshotIndex};
use crate::error::{ResolveError, Result};
use crate::search::{Allowed, Search, SearchFailure, Variable};

/// Bounds on one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Newest candidates kept per input
    pub max_candidates_per_input: usize,
    /// Candidate attempts before the search gives up
    pub max_search_steps: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_candidates_per_input: 100,
            max_search_steps: 100_000,
        }
    }
}

impl ResolverConfig {
    /// Set the per-input candidate cutoff.
    pub fn with_max_candidates_per_input(mut self, max: usize) -> Self {
        self.max_candidates_per_input = max;
        self
    }

    /// Set the search step cutoff.
    pub fn with_max_search_steps(mut self, max: usize) -> Self {
        self.max_search_steps = max;
        self
    }
}

/// Resolves job inputs against a [`VersionsDb`].
///
/// Resolution only reads the snapshot, so it can run any number of times,
/// concurrently, and always gives the same answer for the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct VersionResolver {
    config: ResolverConfig,
}

/// An input taking part in the search, with the shared jobs it constrains.
struct Searched<'a> {
    input: &'a JobInput,
    candidates: &'a [Candidate],
    shared_jobs: Vec<JobId>,
}

impl VersionResolver {
    /// Create a resolver.
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolver bounds.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Choose one version per input such that inputs sharing a `passed` job
    /// all come from one build of it, preferring newer versions in input
    /// order. `resources` supplies resource-level pins.
    pub fn resolve_inputs(&self, job: &Job, resources: &[Resource], db: &VersionsDb) -> Result<ResolvedInputSet> {
        check_snapshot(job, db)?;

        let index = SnapshotIndex::new(db);
        let finder = CandidateFinder::new(db, &index, job.id, self.config.max_candidates_per_input);
        let mut result = ResolvedInputSet {
            inputs: BTreeMap::new(),
            satisfied: true,
        };

        let mut plans: Vec<(&JobInput, InputPlan)> = Vec::with_capacity(job.inputs.len());
        for input in &job.inputs {
            match finder.plan(input, &effective_constraint(input, resources)) {
                Ok(plan) => plans.push((input, plan)),
                Err(reason) => {
                    debug!("Input {} of job {} unresolved: {}", input.name, job.name, reason);
                    result.inputs.insert(input.name.clone(), InputResolution::Unresolved(reason));
                }
            }
        }

        let shared = shared_jobs(db, plans.iter().map(|(input, _)| *input));

        // Pins are decided first and narrow what their partners may use.
        let mut allowed = Allowed::new();
        let mut pinned_jobs = BTreeSet::new();
        for (input, plan) in &plans {
            let InputPlan::Fixed(fixed) = plan else {
                continue;
            };
            result
                .inputs
                .insert(input.name.clone(), InputResolution::Resolved(resolved(&index, job, input, fixed)));

            for (job_id, builds) in fixed.builds.iter().filter(|(j, _)| shared.contains(*j)) {
                pinned_jobs.insert(*job_id);
                let kept = match allowed.get(job_id) {
                    Some(current) => current.intersection(builds).copied().collect(),
                    None => builds.clone(),
                };
                allowed.insert(*job_id, kept);
            }
        }

        let conflicting: BTreeSet<JobId> = allowed
            .iter()
            .filter(|(_, builds)| builds.is_empty())
            .map(|(job_id, _)| *job_id)
            .collect();
        if !conflicting.is_empty() {
            warn!("Pinned inputs of job {} share no build of {} upstream jobs", job.name, conflicting.len());
            result.satisfied = false;
        }

        let mut searched = Vec::new();
        for (input, plan) in &plans {
            let InputPlan::Search(candidates) = plan else {
                continue;
            };
            let shared_jobs: Vec<JobId> = passed_job_ids(db, input).filter(|j| shared.contains(j)).collect();

            if shared_jobs.iter().any(|j| conflicting.contains(j)) {
                result
                    .inputs
                    .insert(input.name.clone(), InputResolution::Unresolved(UnresolvedReason::ConflictsWithPinned));
            } else if shared_jobs.is_empty() {
                // Nothing to agree with; the best candidate stands on its own.
                result.inputs.insert(
                    input.name.clone(),
                    InputResolution::Resolved(resolved(&index, job, input, &candidates[0])),
                );
            } else {
                searched.push(Searched {
                    input: *input,
                    candidates: candidates.as_slice(),
                    shared_jobs,
                });
            }
        }

        let vars = searched
            .iter()
            .map(|s| Variable {
                candidates: s.candidates,
                shared_jobs: s.shared_jobs.clone(),
            })
            .collect();

        match Search::new(vars, self.config.max_search_steps).run(allowed) {
            Ok(choice) => {
                for (s, index_of) in searched.iter().zip(choice) {
                    let version = resolved(&index, job, s.input, &s.candidates[index_of]);
                    result.inputs.insert(s.input.name.clone(), InputResolution::Resolved(version));
                }
            }
            Err(failure) => {
                warn!("No consistent versions for job {}: {:?}", job.name, failure);
                for s in &searched {
                    let reason = match failure {
                        SearchFailure::LimitReached => UnresolvedReason::SearchLimitReached,
                        SearchFailure::Exhausted if s.shared_jobs.iter().any(|j| pinned_jobs.contains(j)) => {
                            UnresolvedReason::ConflictsWithPinned
                        }
                        SearchFailure::Exhausted => UnresolvedReason::NoSatisfyingVersion,
                    };
                    result.inputs.insert(s.input.name.clone(), InputResolution::Unresolved(reason));
                }
            }
        }

        result.satisfied = result.satisfied && result.unresolved().next().is_none();
        debug!(
            "Resolved {} inputs of job {}: satisfied={}",
            result.inputs.len(),
            job.name,
            result.satisfied
        );
        Ok(result)
    }

    /// Resolve each input on its own, ignoring what other inputs chose.
    pub fn resolve_independently(&self, job: &Job, resources: &[Resource], db: &VersionsDb) -> Result<ResolvedInputSet> {
        check_snapshot(job, db)?;

        let index = SnapshotIndex::new(db);
        let finder = CandidateFinder::new(db, &index, job.id, self.config.max_candidates_per_input);

        let inputs: BTreeMap<String, InputResolution> = job
            .inputs
            .iter()
            .map(|input| {
                let resolution = match finder.plan(input, &effective_constraint(input, resources)) {
                    Ok(InputPlan::Fixed(fixed)) => InputResolution::Resolved(resolved(&index, job, input, &fixed)),
                    Ok(InputPlan::Search(candidates)) => {
                        InputResolution::Resolved(resolved(&index, job, input, &candidates[0]))
                    }
                    Err(reason) => InputResolution::Unresolved(reason),
                };
                (input.name.clone(), resolution)
            })
            .collect();

        let satisfied = inputs.values().all(|r| r.version().is_some());
        Ok(ResolvedInputSet { inputs, satisfied })
    }
}

fn check_snapshot(job: &Job, db: &VersionsDb) -> Result<()> {
    if job.pipeline_id != db.pipeline_id {
        return Err(ResolveError::InconsistentSnapshot(format!(
            "job {} belongs to pipeline {}, snapshot is of pipeline {}",
            job.name, job.pipeline_id, db.pipeline_id
        )));
    }
    if db.job_id(&job.name) != Some(job.id) {
        return Err(ResolveError::InconsistentSnapshot(format!(
            "job {} ({}) is not in the snapshot",
            job.name, job.id
        )));
    }
    Ok(())
}

/// A resource-level pin overrides the input's own constraint.
fn effective_constraint(input: &JobInput, resources: &[Resource]) -> VersionConstraint {
    resources
        .iter()
        .find(|r| r.name == input.resource)
        .and_then(|r| r.pinned_version.clone())
        .map(VersionConstraint::Pinned)
        .unwrap_or_else(|| input.constraint.clone())
}

fn passed_job_ids<'a>(db: &'a VersionsDb, input: &'a JobInput) -> impl Iterator<Item = JobId> + 'a {
    input.passed.iter().filter_map(|name| db.job_id(name))
}

/// Jobs named in the `passed` set of at least two inputs.
fn shared_jobs<'a>(db: &VersionsDb, inputs: impl Iterator<Item = &'a JobInput>) -> BTreeSet<JobId> {
    let mut counts: BTreeMap<JobId, usize> = BTreeMap::new();
    for input in inputs {
        for job_id in passed_job_ids(db, input) {
            *counts.entry(job_id).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(job_id, _)| job_id)
        .collect()
}

fn resolved(index: &SnapshotIndex, job: &Job, input: &JobInput, candidate: &Candidate) -> ResolvedVersion {
    ResolvedVersion {
        version_id: candidate.version_id,
        resource_id: candidate.resource_id,
        check_order: candidate.check_order,
        first_occurrence: !index.used_before(job.id, &input.name, candidate.version_id),
    }
}
