//! Candidate versions per input.
//!
//! A candidate is an enabled version of the input's resource that has, for
//! every job in the input's `passed` set, at least one build carrying it.
//! Those builds are kept with the candidate so the search can check that
//! inputs sharing a job agree on one build of it.

use std::collections::{BTreeMap, BTreeSet};

use ratchet_core::{
    BuildId, JobId, JobInput, ResourceId, ResourceVersion, UnresolvedReason, VersionConstraint, VersionId,
    VersionsDb,
};

/// Builds of each upstream job that carried a version.
pub type JobBuilds = BTreeMap<JobId, BTreeSet<BuildId>>;

/// One version an input may resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Version
    pub version_id: VersionId,
    /// Resource
    pub resource_id: ResourceId,
    /// Check order of the version
    pub check_order: u64,
    /// Builds of each `passed` job that carried the version
    pub builds: JobBuilds,
}

/// How an input takes part in resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPlan {
    /// Pinned or exact: decided before the search
    Fixed(Candidate),
    /// Searched over, best candidate first
    Search(Vec<Candidate>),
}

/// Lookup tables derived once from a snapshot.
#[derive(Debug, Default)]
pub struct SnapshotIndex {
    passed: BTreeMap<(JobId, ResourceId, VersionId), BTreeSet<BuildId>>,
    used: BTreeSet<(JobId, String, VersionId)>,
    last_used: BTreeMap<(JobId, String), u64>,
}

impl SnapshotIndex {
    /// Index a snapshot.
    pub fn new(db: &VersionsDb) -> Self {
        let mut index = Self::default();

        for output in &db.build_outputs {
            index
                .passed
                .entry((output.job_id, output.resource_id, output.version_id))
                .or_default()
                .insert(output.build_id);
        }

        let reruns = db.rerun_builds();
        for input in &db.build_inputs {
            index
                .used
                .insert((input.job_id, input.input_name.clone(), input.version_id));

            if reruns.contains(&input.build_id) {
                continue;
            }
            let last = index
                .last_used
                .entry((input.job_id, input.input_name.clone()))
                .or_insert(input.check_order);
            *last = (*last).max(input.check_order);
        }

        index
    }

    /// Builds of `job` that carried the version.
    pub fn builds(&self, job: JobId, resource: ResourceId, version: VersionId) -> Option<&BTreeSet<BuildId>> {
        self.passed.get(&(job, resource, version))
    }

    /// Whether `job` has ever used the version for this input.
    pub fn used_before(&self, job: JobId, input: &str, version: VersionId) -> bool {
        self.used.contains(&(job, input.to_string(), version))
    }

    /// Check order of the newest version a job used for an input, ignoring reruns.
    pub fn last_used_check_order(&self, job: JobId, input: &str) -> Option<u64> {
        self.last_used.get(&(job, input.to_string())).copied()
    }
}

/// Works out candidates for the inputs of one job.
pub struct CandidateFinder<'a> {
    db: &'a VersionsDb,
    index: &'a SnapshotIndex,
    job: JobId,
    max_candidates: usize,
}

impl<'a> CandidateFinder<'a> {
    /// Create a finder for `job`.
    pub fn new(db: &'a VersionsDb, index: &'a SnapshotIndex, job: JobId, max_candidates: usize) -> Self {
        Self {
            db,
            index,
            job,
            max_candidates,
        }
    }

    /// Plan an input under the effective constraint (a resource pin already
    /// folded in).
    pub fn plan(&self, input: &JobInput, constraint: &VersionConstraint) -> Result<InputPlan, UnresolvedReason> {
        let resource = self
            .db
            .resource_id(&input.resource)
            .ok_or_else(|| UnresolvedReason::UnknownResource {
                resource: input.resource.clone(),
            })?;
        let jobs = self.passed_jobs(input)?;

        if let Some(fixed) = constraint.fixed_version() {
            let version = self
                .db
                .find_version(resource, fixed)
                .ok_or(UnresolvedReason::PinnedVersionNotFound)?;
            let builds = jobs
                .iter()
                .map(|job| (*job, self.index.builds(*job, resource, version.version_id).cloned().unwrap_or_default()))
                .collect();
            return Ok(InputPlan::Fixed(candidate(version, builds)));
        }

        let mut versions = self.db.versions_of(resource);
        if versions.is_empty() {
            return Err(UnresolvedReason::NoVersions);
        }
        if *constraint == VersionConstraint::Every {
            versions = self.every_order(input, versions);
        }

        let candidates: Vec<Candidate> = versions
            .into_iter()
            .filter_map(|version| self.passed_builds(&jobs, version).map(|builds| candidate(version, builds)))
            .take(self.max_candidates)
            .collect();

        if candidates.is_empty() {
            return Err(UnresolvedReason::NoVersionsPassed {
                jobs: input.passed.iter().cloned().collect(),
            });
        }
        Ok(InputPlan::Search(candidates))
    }

    fn passed_jobs(&self, input: &JobInput) -> Result<Vec<JobId>, UnresolvedReason> {
        let mut jobs = Vec::with_capacity(input.passed.len());
        let mut unknown = Vec::new();
        for name in &input.passed {
            match self.db.job_id(name) {
                Some(id) => jobs.push(id),
                None => unknown.push(name.clone()),
            }
        }
        if unknown.is_empty() {
            Ok(jobs)
        } else {
            Err(UnresolvedReason::UnknownJobs { jobs: unknown })
        }
    }

    /// Builds of each job carrying the version, or `None` if some job has none.
    fn passed_builds(&self, jobs: &[JobId], version: &ResourceVersion) -> Option<JobBuilds> {
        jobs.iter()
            .map(|job| {
                self.index
                    .builds(*job, version.resource_id, version.version_id)
                    .map(|builds| (*job, builds.clone()))
            })
            .collect()
    }

    /// Versions newer than the last one this job used for the input, oldest
    /// first, then the rest newest first. `versions` is newest first.
    fn every_order<'v>(&self, input: &JobInput, versions: Vec<&'v ResourceVersion>) -> Vec<&'v ResourceVersion> {
        let Some(last) = self.index.last_used_check_order(self.job, &input.name) else {
            return versions;
        };
        let (mut newer, older): (Vec<_>, Vec<_>) = versions.into_iter().partition(|v| v.check_order > last);
        newer.reverse();
        newer.extend(older);
        newer
    }
}

fn candidate(version: &ResourceVersion, builds: JobBuilds) -> Candidate {
    Candidate {
        version_id: version.version_id,
        resource_id: version.resource_id,
        check_order: version.check_order,
        builds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratchet_core::{BuildInput, BuildOutput, BuildRerun, VersionContent};

    fn content(v: &str) -> VersionContent {
        [("v".to_string(), v.to_string())].into()
    }

    fn db() -> VersionsDb {
        let mut db = VersionsDb::default();
        db.resources.insert("x".to_string(), ResourceId(1));
        db.jobs.insert("current".to_string(), JobId(10));
        db.jobs.insert("a".to_string(), JobId(11));
        for i in 1..=4u64 {
            db.resource_versions.push(ResourceVersion {
                version_id: VersionId(i),
                resource_id: ResourceId(1),
                check_order: i,
                version: content(&format!("v{}", i)),
            });
        }
        db
    }

    fn output(job: u64, build: u64, version: u64) -> BuildOutput {
        BuildOutput {
            build_id: BuildId(build),
            job_id: JobId(job),
            resource_id: ResourceId(1),
            version_id: VersionId(version),
            check_order: version,
        }
    }

    fn input(build: u64, version: u64) -> BuildInput {
        BuildInput {
            build_id: BuildId(build),
            job_id: JobId(10),
            input_name: "x".to_string(),
            resource_id: ResourceId(1),
            version_id: VersionId(version),
            check_order: version,
        }
    }

    fn ids(plan: InputPlan) -> Vec<u64> {
        match plan {
            InputPlan::Search(c) => c.iter().map(|c| c.version_id.0).collect(),
            InputPlan::Fixed(c) => vec![c.version_id.0],
        }
    }

    #[test]
    fn test_latest_candidates_newest_first_and_capped() {
        let db = db();
        let index = SnapshotIndex::new(&db);
        let finder = CandidateFinder::new(&db, &index, JobId(10), 3);

        let plan = finder.plan(&JobInput::new("x"), &VersionConstraint::Latest).unwrap();
        assert_eq!(ids(plan), vec![4, 3, 2]);
    }

    #[test]
    fn test_passed_filters_and_keeps_builds() {
        let mut db = db();
        db.build_outputs = vec![output(11, 100, 2), output(11, 101, 2), output(11, 102, 3)];
        let index = SnapshotIndex::new(&db);
        let finder = CandidateFinder::new(&db, &index, JobId(10), 100);

        let plan = finder
            .plan(&JobInput::new("x").with_passed(["a"]), &VersionConstraint::Latest)
            .unwrap();
        let InputPlan::Search(candidates) = plan else {
            panic!("expected search plan");
        };
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].version_id, VersionId(3));
        assert_eq!(candidates[1].builds[&JobId(11)], BTreeSet::from([BuildId(100), BuildId(101)]));
    }

    #[test]
    fn test_unresolved_reasons() {
        let db = db();
        let index = SnapshotIndex::new(&db);
        let finder = CandidateFinder::new(&db, &index, JobId(10), 100);

        let unknown_resource = finder.plan(&JobInput::new("y"), &VersionConstraint::Latest);
        assert!(matches!(unknown_resource, Err(UnresolvedReason::UnknownResource { .. })));

        let unknown_job = finder.plan(&JobInput::new("x").with_passed(["nope"]), &VersionConstraint::Latest);
        assert_eq!(unknown_job, Err(UnresolvedReason::UnknownJobs { jobs: vec!["nope".to_string()] }));

        let none_passed = finder.plan(&JobInput::new("x").with_passed(["a"]), &VersionConstraint::Latest);
        assert!(matches!(none_passed, Err(UnresolvedReason::NoVersionsPassed { .. })));

        let missing_pin = finder.plan(&JobInput::new("x"), &VersionConstraint::Pinned(content("v9")));
        assert_eq!(missing_pin, Err(UnresolvedReason::PinnedVersionNotFound));
    }

    #[test]
    fn test_fixed_version_ignores_passed_evidence() {
        let db = db();
        let index = SnapshotIndex::new(&db);
        let finder = CandidateFinder::new(&db, &index, JobId(10), 100);

        let plan = finder
            .plan(&JobInput::new("x").with_passed(["a"]), &VersionConstraint::Exact(content("v2")))
            .unwrap();
        let InputPlan::Fixed(fixed) = plan else {
            panic!("expected fixed plan");
        };
        assert_eq!(fixed.version_id, VersionId(2));
        assert!(fixed.builds[&JobId(11)].is_empty());
    }

    #[test]
    fn test_every_resumes_after_last_used_version() {
        let mut db = db();
        db.build_inputs = vec![input(1, 2)];
        let index = SnapshotIndex::new(&db);
        let finder = CandidateFinder::new(&db, &index, JobId(10), 100);

        let plan = finder.plan(&JobInput::new("x"), &VersionConstraint::Every).unwrap();
        assert_eq!(ids(plan), vec![3, 4, 2, 1]);
    }

    #[test]
    fn test_every_ignores_reruns() {
        let mut db = db();
        db.build_inputs = vec![input(1, 1), input(2, 3)];
        db.build_reruns = vec![BuildRerun {
            build_id: BuildId(2),
            rerun_of: BuildId(1),
            job_id: JobId(10),
        }];
        let index = SnapshotIndex::new(&db);
        let finder = CandidateFinder::new(&db, &index, JobId(10), 100);

        let plan = finder.plan(&JobInput::new("x"), &VersionConstraint::Every).unwrap();
        assert_eq!(ids(plan), vec![2, 3, 4, 1]);
        assert!(index.used_before(JobId(10), "x", VersionId(3)));
    }
}
