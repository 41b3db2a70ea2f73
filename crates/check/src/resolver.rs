//! Checkable resolver: interval, dependent type and in-flight state of a
//! checkable.

use std::time::Duration;

use ratchet_core::{Check, Checkable, ResourceTypes};
use ratchet_storage::CheckStore;

use crate::error::{CheckError, Result};
use crate::interval::{parse_check_every, CheckEvery};

/// Answers questions about one checkable in the context of the resource
/// types visible to it.
#[derive(Debug, Clone, Copy)]
pub struct CheckableResolver<'a> {
    types: &'a ResourceTypes,
    default_interval: Duration,
}

impl<'a> CheckableResolver<'a> {
    /// Create a resolver over a pipeline's types.
    pub fn new(types: &'a ResourceTypes, default_interval: Duration) -> Self {
        Self {
            types,
            default_interval,
        }
    }

    /// Declared check interval, falling back to the configured default.
    pub fn check_interval(&self, checkable: &dyn Checkable) -> Result<CheckEvery> {
        match checkable.check_every() {
            None => Ok(CheckEvery::Interval(self.default_interval)),
            Some(raw) => parse_check_every(raw).map_err(|e| CheckError::InvalidCheckEvery {
                checkable: checkable.reference(),
                value: raw.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// The custom type the checkable's own type refers to.
    pub fn dependent_type(&self, checkable: &dyn Checkable) -> Option<&'a dyn Checkable> {
        self.types.parent_of(checkable)
    }

    /// The Started check of the checkable's current configuration, if any.
    pub async fn in_flight_check<S>(&self, store: &S, checkable: &dyn Checkable) -> Result<Option<Check>>
    where
        S: CheckStore + ?Sized,
    {
        let scope = checkable.config_scope();
        Ok(store.in_flight_check(&scope.id).await?)
    }
}
