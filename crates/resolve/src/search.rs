//! Backtracking search over candidate combinations.
//!
//! Inputs are assigned in declaration order, each trying its candidates best
//! first. Choosing a candidate narrows, for every shared upstream job, the
//! set of builds all inputs so far can agree on; an empty set rejects the
//! candidate. The stack is explicit so deep pipelines cannot overflow.

use std::collections::{BTreeMap, BTreeSet};

use ratchet_core::{BuildId, JobId};

use crate::candidates::Candidate;

/// Builds still acceptable for each shared job.
pub type Allowed = BTreeMap<JobId, BTreeSet<BuildId>>;

/// One input taking part in the search.
#[derive(Debug)]
pub struct Variable<'a> {
    /// Candidates, best first
    pub candidates: &'a [Candidate],
    /// The input's `passed` jobs that other inputs also name
    pub shared_jobs: Vec<JobId>,
}

/// Why the search found no assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFailure {
    /// Every combination was tried
    Exhausted,
    /// The step limit was hit first
    LimitReached,
}

struct Frame {
    var: usize,
    cursor: usize,
    allowed_before: Allowed,
}

/// Depth-first search with a step limit.
pub struct Search<'a> {
    vars: Vec<Variable<'a>>,
    max_steps: usize,
}

impl<'a> Search<'a> {
    /// Create a search over `vars` in order.
    pub fn new(vars: Vec<Variable<'a>>, max_steps: usize) -> Self {
        Self { vars, max_steps }
    }

    /// Find the first consistent assignment, starting from builds already
    /// fixed by pinned inputs. Returns the chosen candidate index per variable.
    pub fn run(&self, mut allowed: Allowed) -> Result<Vec<usize>, SearchFailure> {
        let mut stack: Vec<Frame> = Vec::with_capacity(self.vars.len());
        let mut var = 0;
        let mut cursor = 0;
        let mut steps = 0;

        loop {
            if var == self.vars.len() {
                return Ok(stack.iter().map(|frame| frame.cursor).collect());
            }

            let current = &self.vars[var];
            if cursor >= current.candidates.len() {
                let Some(frame) = stack.pop() else {
                    return Err(SearchFailure::Exhausted);
                };
                allowed = frame.allowed_before;
                var = frame.var;
                cursor = frame.cursor + 1;
                continue;
            }

            steps += 1;
            if steps > self.max_steps {
                return Err(SearchFailure::LimitReached);
            }

            match narrow(&allowed, &current.shared_jobs, &current.candidates[cursor]) {
                Some(next) => {
                    stack.push(Frame {
                        var,
                        cursor,
                        allowed_before: std::mem::replace(&mut allowed, next),
                    });
                    var += 1;
                    cursor = 0;
                }
                None => cursor += 1,
            }
        }
    }
}

/// Intersect the allowed builds with the candidate's; `None` if any shared
/// job is left with no build.
pub fn narrow(allowed: &Allowed, jobs: &[JobId], candidate: &Candidate) -> Option<Allowed> {
    let mut next = allowed.clone();
    for job in jobs {
        let builds = candidate.builds.get(job)?;
        let kept: BTreeSet<BuildId> = match allowed.get(job) {
            Some(current) => current.intersection(builds).copied().collect(),
            None => builds.clone(),
        };
        if kept.is_empty() {
            return None;
        }
        next.insert(*job, kept);
    }
    Some(next)
}
