//! Check model - one execution of a checkable's version discovery.

use crate::checkable::CheckableRef;
use crate::id::{CheckId, ScopeId};
use crate::version::VersionContent;
use crate::Time;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Created and handed to a worker
    Started,
    /// Finished without error
    Succeeded,
    /// Finished with an error
    Errored,
}

impl CheckStatus {
    /// Whether the check has terminated.
    pub fn is_finished(&self) -> bool {
        !matches!(self, CheckStatus::Started)
    }
}

/// A single check execution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// Unique identifier
    pub id: CheckId,

    /// What is being checked
    pub checkable: CheckableRef,

    /// Scope whose version history the check feeds
    pub scope_id: ScopeId,

    /// Current status
    pub status: CheckStatus,

    /// When the check row was created
    pub create_time: Time,

    /// When a worker picked it up
    pub start_time: Option<Time>,

    /// When it terminated
    pub end_time: Option<Time>,

    /// Error message for errored checks
    pub error: Option<String>,

    /// Version the check starts from; `None` checks from scratch
    pub from_version: Option<VersionContent>,

    /// Requested by a user or webhook rather than the periodic ticker
    pub manually_triggered: bool,

    /// Interval gating was skipped for the whole dependency chain
    pub skip_interval_recursively: bool,

    /// The checkable's type was not checked first
    pub shallow: bool,

    /// Whether discovered versions are written to the version store
    pub persist_to_store: bool,
}

impl Check {
    /// Whether the check is still in flight.
    pub fn is_running(&self) -> bool {
        self.status == CheckStatus::Started
    }

    /// Terminate successfully.
    pub fn succeed(&mut self, at: Time) {
        self.status = CheckStatus::Succeeded;
        self.end_time = Some(at);
        self.error = None;
    }

    /// Terminate with an error.
    pub fn fail(&mut self, at: Time, error: impl Into<String>) {
        self.status = CheckStatus::Errored;
        self.end_time = Some(at);
        self.error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkable::CheckableKind;

    fn started() -> Check {
        let now = chrono::Utc::now();
        Check {
            id: CheckId::new(),
            checkable: CheckableRef {
                kind: CheckableKind::Prototype,
                pipeline_id: None,
                name: "oci".to_string(),
            },
            scope_id: ScopeId("scope".to_string()),
            status: CheckStatus::Started,
            create_time: now,
            start_time: Some(now),
            end_time: None,
            error: None,
            from_version: None,
            manually_triggered: false,
            skip_interval_recursively: false,
            shallow: false,
            persist_to_store: true,
        }
    }

    #[test]
    fn test_check_lifecycle() {
        let mut check = started();
        assert!(check.is_running());
        assert!(!check.status.is_finished());

        let at = chrono::Utc::now();
        check.fail(at, "boom");
        assert_eq!(check.status, CheckStatus::Errored);
        assert_eq!(check.error.as_deref(), Some("boom"));
        assert_eq!(check.end_time, Some(at));

        check.succeed(at);
        assert!(check.error.is_none());
        assert!(check.status.is_finished());
    }
}
