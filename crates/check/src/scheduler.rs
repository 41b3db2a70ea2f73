//! Check scheduler - decides whether a checkable gets a new check.
//!
//! A request first walks the checkable's chain of custom types (deepest
//! ancestor first) so that a type is current before its instances are
//! trusted. Each link, and finally the checkable itself, then goes through:
//!
//! 1. `check_every` parsing (`never` disables periodic checks)
//! 2. pause state, for periodic requests
//! 3. scope assignment
//! 4. de-duplication against the scope's in-flight check
//! 5. interval gating, unless bypassed
//! 6. conditional creation through [`CheckStore::create_check_if_absent`]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use ratchet_core::{
    Check, CheckId, CheckStatus, Checkable, Clock, ResourceTypes, SystemClock, Time, VersionContent,
};
use ratchet_storage::{CheckStore, PipelineStore, Storage, VersionStore};
use tracing::{debug, info, warn};

use crate::error::{CheckError, Result};
use crate::interval::CheckEvery;
use crate::resolver::CheckableResolver;

/// Parameters of one check request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    /// Start the check from this version instead of the scope's latest
    pub from_version: Option<VersionContent>,
    /// Requested by a user rather than the periodic ticker
    pub manually_triggered: bool,
    /// Skip interval gating for the dependent types as well
    pub skip_interval_recursively: bool,
    /// Do not check the checkable's type first
    pub shallow: bool,
    /// Write discovered versions to the store
    pub persist_to_store: bool,
}

impl CheckRequest {
    /// A request from the periodic ticker.
    pub fn periodic() -> Self {
        Self {
            from_version: None,
            manually_triggered: false,
            skip_interval_recursively: false,
            shallow: false,
            persist_to_store: true,
        }
    }

    /// A "check now" request from an operator: the whole type chain is
    /// re-checked regardless of intervals.
    pub fn manual() -> Self {
        Self {
            manually_triggered: true,
            skip_interval_recursively: true,
            ..Self::periodic()
        }
    }

    /// A webhook request. Only the checkable itself bypasses its interval;
    /// its types keep their own.
    pub fn webhook() -> Self {
        Self {
            manually_triggered: true,
            skip_interval_recursively: false,
            ..Self::periodic()
        }
    }

    /// Start from an explicit version.
    pub fn from_version(mut self, version: VersionContent) -> Self {
        self.from_version = Some(version);
        self
    }

    /// Do not check the type chain.
    pub fn shallow(mut self) -> Self {
        self.shallow = true;
        self
    }

    /// Run the check without recording what it finds.
    pub fn dry_run(mut self) -> Self {
        self.persist_to_store = false;
        self
    }

    /// Request used for each type in the chain above the checkable.
    fn for_dependent_type(&self) -> Self {
        Self {
            from_version: None,
            manually_triggered: self.skip_interval_recursively,
            skip_interval_recursively: self.skip_interval_recursively,
            shallow: true,
            persist_to_store: self.persist_to_store,
        }
    }
}

impl Default for CheckRequest {
    fn default() -> Self {
        Self::periodic()
    }
}

/// Why no check was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The last check ended less than the interval ago
    IntervalNotElapsed {
        /// Earliest time a periodic check would be created
        next_check_at: Time,
    },
    /// `check_every: never`
    Never,
    /// The resource or its pipeline is paused
    Paused,
}

/// Result of a check request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// A new check was created
    Created(Check),
    /// A check of the same scope was already running
    InFlight(Check),
    /// Nothing to do
    Skipped(SkipReason),
}

impl CheckOutcome {
    /// Whether a new check was created.
    pub fn created(&self) -> bool {
        matches!(self, CheckOutcome::Created(_))
    }

    /// The check now covering the scope, if any.
    pub fn check(&self) -> Option<&Check> {
        match self {
            CheckOutcome::Created(c) | CheckOutcome::InFlight(c) => Some(c),
            CheckOutcome::Skipped(_) => None,
        }
    }
}

/// Creates and de-duplicates checks.
pub struct CheckScheduler<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    default_check_interval: Duration,
}

impl<S: Storage + ?Sized> CheckScheduler<S> {
    /// Create a scheduler using the system clock and a one minute default interval.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            default_check_interval: Duration::from_secs(60),
        }
    }

    /// Use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Interval for checkables without `check_every`.
    pub fn with_default_check_interval(mut self, interval: Duration) -> Self {
        self.default_check_interval = interval;
        self
    }

    /// Request a check of `checkable`.
    ///
    /// Unless the request is shallow, every custom type the checkable
    /// depends on is requested first. Failures of those, a dependency cycle
    /// included, are recorded on the type and logged; only store failures
    /// abort the request.
    pub async fn request_check(
        &self,
        checkable: &dyn Checkable,
        types: &ResourceTypes,
        request: &CheckRequest,
    ) -> Result<CheckOutcome> {
        let resolver = CheckableResolver::new(types, self.default_check_interval);

        if !request.shallow {
            self.check_dependent_types(&resolver, checkable, request).await?;
        }

        self.check_one(&resolver, checkable, request).await
    }

    async fn check_dependent_types(
        &self,
        resolver: &CheckableResolver<'_>,
        checkable: &dyn Checkable,
        request: &CheckRequest,
    ) -> Result<()> {
        let mut chain: Vec<&dyn Checkable> = Vec::new();
        let mut seen = BTreeSet::from([checkable.reference()]);
        let mut current = resolver.dependent_type(checkable);
        while let Some(parent) = current {
            if !seen.insert(parent.reference()) {
                let cycle = CheckError::DependencyCycle(parent.reference());
                warn!("Not checking types of {}: {}", checkable.reference(), cycle);
                for member in &chain {
                    self.store
                        .set_check_error(&member.reference(), Some(&cycle.to_string()))
                        .await?;
                }
                return Ok(());
            }
            chain.push(parent);
            current = resolver.dependent_type(parent);
        }

        let type_request = request.for_dependent_type();
        for parent in chain.into_iter().rev() {
            if parent.pinned_version().is_some() {
                debug!("Not checking {}: version is fixed", parent.reference());
                continue;
            }

            match self.check_one(resolver, parent, &type_request).await {
                Ok(outcome) => debug!("Type check of {}: {}", parent.reference(), outcome_kind(&outcome)),
                Err(CheckError::Storage(e)) => return Err(CheckError::Storage(e)),
                Err(CheckError::InvalidCheckEvery { .. }) => {
                    // Already recorded on the type by check_one.
                    warn!("Type check of {} failed: invalid check_every", parent.reference());
                }
                Err(e) => {
                    warn!("Type check of {} failed: {}", parent.reference(), e);
                    self.store
                        .set_check_error(&parent.reference(), Some(&e.to_string()))
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn check_one(
        &self,
        resolver: &CheckableResolver<'_>,
        checkable: &dyn Checkable,
        request: &CheckRequest,
    ) -> Result<CheckOutcome> {
        let reference = checkable.reference();
        let bypass_interval =
            request.manually_triggered || request.from_version.is_some() || request.skip_interval_recursively;

        let every = match resolver.check_interval(checkable) {
            Ok(every) => every,
            Err(e) => {
                self.store.set_check_error(&reference, Some(&e.to_string())).await?;
                return Err(e);
            }
        };

        if every == CheckEvery::Never && !bypass_interval {
            debug!("Skipping check of {}: check_every is never", reference);
            return Ok(CheckOutcome::Skipped(SkipReason::Never));
        }

        if !request.manually_triggered && self.is_paused(checkable).await? {
            debug!("Skipping check of {}: paused", reference);
            return Ok(CheckOutcome::Skipped(SkipReason::Paused));
        }

        let scope = self.store.find_or_create_scope(checkable.config_scope()).await?;
        if checkable.scope_id() != Some(&scope.id) {
            self.store.set_checkable_scope(&reference, &scope.id).await?;
        }

        if let Some(existing) = resolver.in_flight_check(&*self.store, checkable).await? {
            debug!("Check {} already running for scope {}", existing.id, scope.id.short());
            return Ok(CheckOutcome::InFlight(existing));
        }

        let now = self.clock.now();
        if !bypass_interval {
            if let (CheckEvery::Interval(interval), Some(last_end)) =
                (every, self.store.last_check_end(&scope.id).await?)
            {
                let elapsed = (now - last_end).to_std().unwrap_or(Duration::ZERO);
                if elapsed < interval {
                    let remaining = chrono::Duration::from_std(interval - elapsed).unwrap_or_else(|_| chrono::Duration::zero());
                    let next_check_at = now.checked_add_signed(remaining).unwrap_or(now);
                    debug!("Skipping check of {}: next check at {}", reference, next_check_at);
                    return Ok(CheckOutcome::Skipped(SkipReason::IntervalNotElapsed { next_check_at }));
                }
            }
        }

        let from_version = match &request.from_version {
            Some(version) => Some(version.clone()),
            None => self
                .store
                .latest_versions(&scope.id)
                .await?
                .into_iter()
                .next()
                .map(|v| v.content),
        };

        let check = Check {
            id: CheckId::new(),
            checkable: reference.clone(),
            scope_id: scope.id.clone(),
            status: CheckStatus::Started,
            create_time: now,
            start_time: Some(now),
            end_time: None,
            error: None,
            from_version,
            manually_triggered: request.manually_triggered,
            skip_interval_recursively: request.skip_interval_recursively,
            shallow: request.shallow,
            persist_to_store: request.persist_to_store,
        };

        let (check, created) = self.store.create_check_if_absent(check).await?;
        if created {
            info!("Created check {} for {} (scope {})", check.id, reference, scope.id.short());
            Ok(CheckOutcome::Created(check))
        } else {
            debug!("Lost race for scope {}; check {} is running", scope.id.short(), check.id);
            Ok(CheckOutcome::InFlight(check))
        }
    }

    async fn is_paused(&self, checkable: &dyn Checkable) -> Result<bool> {
        if checkable.paused() {
            return Ok(true);
        }
        match checkable.pipeline_id() {
            Some(id) => Ok(self.store.load_pipeline(id).await?.map(|p| p.paused).unwrap_or(false)),
            None => Ok(false),
        }
    }
}

fn outcome_kind(outcome: &CheckOutcome) -> &'static str {
    match outcome {
        CheckOutcome::Created(_) => "created",
        CheckOutcome::InFlight(_) => "in flight",
        CheckOutcome::Skipped(_) => "skipped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CheckReporter;
    use ratchet_core::{
        CheckableKind, DiscoveredVersion, FixedClock, Pipeline, Prototype, Resource, ResourceId, ResourceType,
    };
    use ratchet_storage::MemoryStorage;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStorage>,
        clock: Arc<FixedClock>,
        pipeline: Pipeline,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(MemoryStorage::new());
            let pipeline = store.save_pipeline("main").await.unwrap();
            Self {
                store,
                clock: Arc::new(FixedClock::new(chrono::Utc::now())),
                pipeline,
            }
        }

        fn scheduler(&self) -> CheckScheduler<MemoryStorage> {
            CheckScheduler::new(self.store.clone()).with_clock(self.clock.clone())
        }

        fn reporter(&self) -> CheckReporter<MemoryStorage> {
            CheckReporter::new(self.store.clone()).with_clock(self.clock.clone())
        }

        async fn resource(&self, name: &str, type_name: &str, every: Option<&str>) -> Resource {
            let mut resource = Resource::new(ResourceId(0), self.pipeline.id, name, type_name)
                .with_source(json!({"uri": name}));
            resource.check_every = every.map(str::to_string);
            self.store.save_resource(resource).await.unwrap()
        }

        async fn resource_type(&self, resource_type: ResourceType) -> ResourceTypes {
            self.store.save_resource_type(resource_type).await.unwrap();
            self.types().await
        }

        async fn types(&self) -> ResourceTypes {
            self.store.list_resource_types(self.pipeline.id).await.unwrap()
        }

        async fn type_check(&self, name: &str) -> Option<Check> {
            let types = self.types().await;
            let resolver = CheckableResolver::new(&types, Duration::from_secs(60));
            let found = types.resource_type(name).unwrap();
            resolver.in_flight_check(&*self.store, found).await.unwrap()
        }
    }

    fn content(v: &str) -> VersionContent {
        [("ref".to_string(), v.to_string())].into()
    }

    #[tokio::test]
    async fn test_manual_check_creates_then_dedupes() {
        let fx = Fixture::new().await;
        let resource = fx.resource("repo", "git", None).await;
        let types = fx.types().await;
        let scheduler = fx.scheduler();

        let first = scheduler.request_check(&resource, &types, &CheckRequest::manual()).await.unwrap();
        assert!(first.created());
        let check = first.check().unwrap().clone();
        assert_eq!(check.status, CheckStatus::Started);
        assert!(check.manually_triggered);
        assert!(check.from_version.is_none());

        let second = scheduler.request_check(&resource, &types, &CheckRequest::manual()).await.unwrap();
        assert_eq!(second, CheckOutcome::InFlight(check));
    }

    #[tokio::test]
    async fn test_concurrent_requests_create_one_check() {
        let fx = Fixture::new().await;
        let resource = fx.resource("repo", "git", None).await;
        let types = fx.types().await;
        let scheduler = Arc::new(fx.scheduler());

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let scheduler = scheduler.clone();
            let resource = resource.clone();
            let types = types.clone();
            set.spawn(async move {
                scheduler
                    .request_check(&resource, &types, &CheckRequest::manual())
                    .await
                    .unwrap()
            });
        }

        let mut outcomes = Vec::new();
        while let Some(outcome) = set.join_next().await {
            outcomes.push(outcome.unwrap());
        }

        let created: Vec<&CheckOutcome> = outcomes.iter().filter(|o| o.created()).collect();
        assert_eq!(created.len(), 1);
        let id = created[0].check().unwrap().id;
        assert!(outcomes.iter().all(|o| o.check().map(|c| c.id) == Some(id)));
        assert_eq!(fx.store.in_flight_checks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shared_scope_dedupes_across_pipelines() {
        let fx = Fixture::new().await;
        let other = fx.store.save_pipeline("other").await.unwrap();
        let a = fx.resource("repo", "git", None).await;
        let b = fx
            .store
            .save_resource(Resource::new(ResourceId(0), other.id, "repo", "git").with_source(json!({"uri": "repo"})))
            .await
            .unwrap();
        let scheduler = fx.scheduler();

        let first = scheduler
            .request_check(&a, &ResourceTypes::default(), &CheckRequest::manual())
            .await
            .unwrap();
        let second = scheduler
            .request_check(&b, &ResourceTypes::default(), &CheckRequest::manual())
            .await
            .unwrap();
        assert!(first.created());
        assert!(!second.created());
        assert_eq!(first.check().unwrap().id, second.check().unwrap().id);
    }

    #[tokio::test]
    async fn test_interval_gating() {
        let fx = Fixture::new().await;
        let resource = fx.resource("repo", "git", Some("60s")).await;
        let types = fx.types().await;
        let scheduler = fx.scheduler();

        let first = scheduler.request_check(&resource, &types, &CheckRequest::periodic()).await.unwrap();
        fx.reporter().succeed(first.check().unwrap().id, vec![]).await.unwrap();

        fx.clock.advance(chrono::Duration::seconds(30));
        let gated = scheduler.request_check(&resource, &types, &CheckRequest::periodic()).await.unwrap();
        assert!(matches!(gated, CheckOutcome::Skipped(SkipReason::IntervalNotElapsed { .. })));
        assert!(fx.store.in_flight_checks().await.unwrap().is_empty());

        let manual = scheduler.request_check(&resource, &types, &CheckRequest::manual()).await.unwrap();
        assert!(manual.created());
        fx.reporter().succeed(manual.check().unwrap().id, vec![]).await.unwrap();

        fx.clock.advance(chrono::Duration::seconds(61));
        let due = scheduler.request_check(&resource, &types, &CheckRequest::periodic()).await.unwrap();
        assert!(due.created());
    }

    #[tokio::test]
    async fn test_from_version_bypasses_interval_and_seeds_check() {
        let fx = Fixture::new().await;
        let resource = fx.resource("repo", "git", Some("1h")).await;
        let types = fx.types().await;
        let scheduler = fx.scheduler();

        let first = scheduler.request_check(&resource, &types, &CheckRequest::periodic()).await.unwrap();
        fx.reporter()
            .succeed(first.check().unwrap().id, vec![DiscoveredVersion::from(content("a"))])
            .await
            .unwrap();

        let request = CheckRequest::periodic().from_version(content("old"));
        let outcome = scheduler.request_check(&resource, &types, &request).await.unwrap();
        assert!(outcome.created());
        assert_eq!(outcome.check().unwrap().from_version, Some(content("old")));
    }

    #[tokio::test]
    async fn test_from_version_defaults_to_latest() {
        let fx = Fixture::new().await;
        let resource = fx.resource("repo", "git", None).await;
        let types = fx.types().await;
        let scheduler = fx.scheduler();

        let first = scheduler.request_check(&resource, &types, &CheckRequest::manual()).await.unwrap();
        fx.reporter()
            .succeed(
                first.check().unwrap().id,
                vec![DiscoveredVersion::from(content("a")), DiscoveredVersion::from(content("b"))],
            )
            .await
            .unwrap();

        let next = scheduler.request_check(&resource, &types, &CheckRequest::manual()).await.unwrap();
        assert_eq!(next.check().unwrap().from_version, Some(content("b")));
    }

    #[tokio::test]
    async fn test_custom_type_is_checked_first() {
        let fx = Fixture::new().await;
        let types = fx
            .resource_type(ResourceType::new(fx.pipeline.id, "slack", "registry-image").with_source(json!({"repo": "s"})))
            .await;
        let resource = fx.resource("notify", "slack", None).await;

        let outcome = fx
            .scheduler()
            .request_check(&resource, &types, &CheckRequest::manual())
            .await
            .unwrap();
        assert!(outcome.created());

        let type_check = fx.type_check("slack").await.unwrap();
        assert_eq!(type_check.checkable.kind, CheckableKind::ResourceType);
        assert!(type_check.manually_triggered);
        assert!(type_check.create_time <= outcome.check().unwrap().create_time);
    }

    #[tokio::test]
    async fn test_shallow_check_skips_type() {
        let fx = Fixture::new().await;
        let types = fx
            .resource_type(ResourceType::new(fx.pipeline.id, "slack", "registry-image"))
            .await;
        let resource = fx.resource("notify", "slack", None).await;

        let outcome = fx
            .scheduler()
            .request_check(&resource, &types, &CheckRequest::manual().shallow())
            .await
            .unwrap();
        assert!(outcome.created());
        assert!(fx.type_check("slack").await.is_none());
    }

    #[tokio::test]
    async fn test_type_with_fixed_version_is_not_checked() {
        let fx = Fixture::new().await;
        let mut fixed = ResourceType::new(fx.pipeline.id, "slack", "registry-image");
        fixed.version = Some(content("v1"));
        let types = fx.resource_type(fixed).await;
        let resource = fx.resource("notify", "slack", None).await;

        fx.scheduler()
            .request_check(&resource, &types, &CheckRequest::manual())
            .await
            .unwrap();
        assert!(fx.type_check("slack").await.is_none());
    }

    #[tokio::test]
    async fn test_webhook_keeps_type_interval() {
        let fx = Fixture::new().await;
        let types = fx
            .resource_type(ResourceType::new(fx.pipeline.id, "slack", "registry-image"))
            .await;
        let resource = fx.resource("notify", "slack", Some("1h")).await;
        let scheduler = fx.scheduler();

        // Check the type once and finish it.
        let slack = types.resource_type("slack").unwrap().clone();
        let type_outcome = scheduler
            .request_check(&slack, &types, &CheckRequest::manual())
            .await
            .unwrap();
        fx.reporter().succeed(type_outcome.check().unwrap().id, vec![]).await.unwrap();
        fx.clock.advance(chrono::Duration::seconds(10));

        let outcome = scheduler
            .request_check(&resource, &types, &CheckRequest::webhook())
            .await
            .unwrap();
        assert!(outcome.created());
        assert!(!outcome.check().unwrap().skip_interval_recursively);
        assert!(fx.type_check("slack").await.is_none());

        // A manual check forces the type too.
        fx.reporter().succeed(outcome.check().unwrap().id, vec![]).await.unwrap();
        scheduler
            .request_check(&resource, &types, &CheckRequest::manual())
            .await
            .unwrap();
        assert!(fx.type_check("slack").await.is_some());
    }

    #[tokio::test]
    async fn test_type_failure_is_recorded_not_returned() {
        let fx = Fixture::new().await;
        let mut broken = ResourceType::new(fx.pipeline.id, "slack", "registry-image");
        broken.check_every = Some("whenever".to_string());
        let types = fx.resource_type(broken).await;
        let resource = fx.resource("notify", "slack", None).await;

        let outcome = fx
            .scheduler()
            .request_check(&resource, &types, &CheckRequest::manual())
            .await
            .unwrap();
        assert!(outcome.created());

        let types = fx.types().await;
        let error = types.resource_type("slack").unwrap().last_check_error.clone();
        assert!(error.unwrap().contains("whenever"));
    }

    #[tokio::test]
    async fn test_invalid_check_every_is_an_error() {
        let fx = Fixture::new().await;
        let resource = fx.resource("repo", "git", Some("often")).await;
        let types = fx.types().await;

        let err = fx
            .scheduler()
            .request_check(&resource, &types, &CheckRequest::manual())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::InvalidCheckEvery { .. }));

        let stored = fx.store.list_resources(fx.pipeline.id).await.unwrap();
        assert!(stored[0].last_check_error.is_some());
    }

    #[tokio::test]
    async fn test_never_only_allows_manual_checks() {
        let fx = Fixture::new().await;
        let resource = fx.resource("repo", "git", Some("never")).await;
        let types = fx.types().await;
        let scheduler = fx.scheduler();

        let periodic = scheduler.request_check(&resource, &types, &CheckRequest::periodic()).await.unwrap();
        assert_eq!(periodic, CheckOutcome::Skipped(SkipReason::Never));

        let manual = scheduler.request_check(&resource, &types, &CheckRequest::manual()).await.unwrap();
        assert!(manual.created());
    }

    #[tokio::test]
    async fn test_paused_pipeline_skips_periodic_checks() {
        let fx = Fixture::new().await;
        let resource = fx.resource("repo", "git", None).await;
        let types = fx.types().await;
        fx.store.set_pipeline_paused(fx.pipeline.id, true).await.unwrap();
        let scheduler = fx.scheduler();

        let periodic = scheduler.request_check(&resource, &types, &CheckRequest::periodic()).await.unwrap();
        assert_eq!(periodic, CheckOutcome::Skipped(SkipReason::Paused));

        let manual = scheduler.request_check(&resource, &types, &CheckRequest::manual()).await.unwrap();
        assert!(manual.created());
    }

    #[tokio::test]
    async fn test_dependency_cycle_is_recorded_and_resource_still_checked() {
        let fx = Fixture::new().await;
        fx.store
            .save_resource_type(ResourceType::new(fx.pipeline.id, "a", "b"))
            .await
            .unwrap();
        let types = fx.resource_type(ResourceType::new(fx.pipeline.id, "b", "a")).await;
        let resource = fx.resource("thing", "a", None).await;

        let outcome = fx
            .scheduler()
            .request_check(&resource, &types, &CheckRequest::manual())
            .await
            .unwrap();
        assert!(outcome.created());
        assert_eq!(outcome.check().map(|c| c.checkable.name.as_str()), Some("thing"));

        assert!(fx.type_check("a").await.is_none());
        assert!(fx.type_check("b").await.is_none());
        let types = fx.types().await;
        for name in ["a", "b"] {
            let error = types.resource_type(name).unwrap().last_check_error.clone();
            assert!(error.is_some_and(|e| e.contains("cycle")), "{} has no cycle error", name);
        }
    }

    #[tokio::test]
    async fn test_prototype_dependency() {
        let fx = Fixture::new().await;
        fx.store.save_prototype(Prototype::new("oci", "registry-image")).await.unwrap();
        let types = fx.types().await;
        let resource = fx.resource("image", "oci", None).await;

        fx.scheduler()
            .request_check(&resource, &types, &CheckRequest::manual())
            .await
            .unwrap();

        let proto = types.prototypes[0].clone();
        let resolver = CheckableResolver::new(&types, Duration::from_secs(60));
        assert!(resolver.in_flight_check(&*fx.store, &proto).await.unwrap().is_some());
    }
}
