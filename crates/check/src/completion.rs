//! Check completion - terminates a Started check with what the worker found.

use std::sync::Arc;

use ratchet_core::{Check, CheckId, Clock, DiscoveredVersion, SystemClock, Version};
use ratchet_storage::{CheckStore, PipelineStore, Storage, VersionStore};
use tracing::{info, warn};

use crate::error::{CheckError, Result};

/// What happened when a check finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// The terminated check
    pub check: Check,
    /// Versions written to the store
    pub recorded: Vec<Version>,
    /// The checkable moved to another scope while the check ran, so its
    /// result was discarded
    pub superseded: bool,
}

/// Records check results reported by the worker collaborator.
pub struct CheckReporter<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Storage + ?Sized> CheckReporter<S> {
    /// Create a reporter using the system clock.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Finish a check successfully. `versions` are oldest first.
    pub async fn succeed(&self, id: CheckId, versions: Vec<DiscoveredVersion>) -> Result<CheckReport> {
        let mut check = self.running_check(id).await?;
        let superseded = self.is_superseded(&check).await?;

        let nothing_new = match versions.as_slice() {
            [] => true,
            [only] => check.from_version.as_ref() == Some(&only.content),
            _ => false,
        };

        let recorded = if superseded || nothing_new || !check.persist_to_store {
            Vec::new()
        } else {
            self.store.record_versions(&check.scope_id, &versions).await?
        };

        check.succeed(self.clock.now());
        self.store.finish_check(&check).await?;

        if superseded {
            warn!("Check {} of {} superseded; discarded {} versions", check.id, check.checkable, versions.len());
        } else {
            self.store.set_check_error(&check.checkable, None).await?;
            info!("Check {} of {} succeeded: {} versions recorded", check.id, check.checkable, recorded.len());
        }

        Ok(CheckReport {
            check,
            recorded,
            superseded,
        })
    }

    /// Finish a check with an error.
    pub async fn fail(&self, id: CheckId, error: &str) -> Result<CheckReport> {
        let mut check = self.running_check(id).await?;
        let superseded = self.is_superseded(&check).await?;

        check.fail(self.clock.now(), error);
        self.store.finish_check(&check).await?;

        if !superseded {
            self.store.set_check_error(&check.checkable, Some(error)).await?;
        }
        warn!("Check {} of {} errored: {}", check.id, check.checkable, error);

        Ok(CheckReport {
            check,
            recorded: Vec::new(),
            superseded,
        })
    }

    async fn running_check(&self, id: CheckId) -> Result<Check> {
        let check = self
            .store
            .load_check(id)
            .await?
            .ok_or(CheckError::UnknownCheck(id))?;
        if !check.is_running() {
            return Err(CheckError::NotRunning(id));
        }
        Ok(check)
    }

    /// A check is superseded when its checkable was removed or its type and
    /// source no longer hash to the check's scope.
    async fn is_superseded(&self, check: &Check) -> Result<bool> {
        Ok(match self.store.load_checkable(&check.checkable).await? {
            Some(checkable) => checkable.config_scope().id != check.scope_id,
            None => true,
        })
    }
}
