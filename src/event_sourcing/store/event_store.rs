use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::backend::{AppendOutcome, AppendRequest, EventStorage, ExpectedVersion, ResetOutcome, StreamHeader};
use super::memory::InMemoryStorage;
use crate::config::StoreConfig;
use crate::event_sourcing::concurrency::{InProcessStreamLocks, StreamLease, StreamLockProvider};
use crate::event_sourcing::core::{Aggregate, DomainEvent, EntityTag, EventEnvelope, NewEvent};
use crate::event_sourcing::error::{EventStoreError, StoreResult};
use crate::event_sourcing::projection::{
    default_audit_order, AuditFilter, AuditRecord, InlineProjector, RebuildReport, Snapshot,
    SnapshotMismatch,
};
use crate::event_sourcing::query::{OrderBy, Page, PageRequest, SnapshotFilter};
use crate::event_sourcing::registry::{DomainRegistry, RegistryEntity, RegistryModule};
use crate::metrics::{AppendMode, StoreMetrics};

// ============================================================================
// Generic Event Store - The Engine's Public Operations
// ============================================================================
//
// This is a GENERIC event store that works with ANY domain registry.
//
// Type Parameter:
// - `R`: The domain registry (payload type, folds, audit classification)
//
// Responsibilities:
// 1. Append events; snapshot + audit are projected inside the same commit
// 2. Optimistic appends (expected version) and exclusive appends (stream lease)
// 3. Typed and untyped reads over snapshots, history and audit trail
// 4. Administrative rebuild, verification, reset and audit catch-up
//
// Nothing is retried here; retry policy belongs to the caller.
//
// ============================================================================

type Payload<R> = <R as DomainRegistry>::Payload;

pub struct EventStore<R: DomainRegistry> {
    storage: Arc<dyn EventStorage<Payload<R>>>,
    locks: Arc<dyn StreamLockProvider>,
    projector: Arc<InlineProjector<R>>,
    lock_timeout: Duration,
    max_page_size: u32,
    default_page_size: u32,
    metrics: Option<Arc<StoreMetrics>>,
}

impl<R: DomainRegistry> Clone for EventStore<R> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            locks: self.locks.clone(),
            projector: self.projector.clone(),
            lock_timeout: self.lock_timeout,
            max_page_size: self.max_page_size,
            default_page_size: self.default_page_size,
            metrics: self.metrics.clone(),
        }
    }
}

impl<R: DomainRegistry> EventStore<R> {
    pub fn new(storage: Arc<dyn EventStorage<Payload<R>>>, locks: Arc<dyn StreamLockProvider>) -> Self {
        let defaults = StoreConfig::default();
        Self {
            storage,
            locks,
            projector: Arc::new(InlineProjector::new()),
            lock_timeout: defaults.lock_timeout,
            max_page_size: defaults.max_page_size,
            default_page_size: defaults.default_page_size,
            metrics: None,
        }
    }

    /// In-memory backend with in-process leases
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(InProcessStreamLocks::new()),
        )
    }

    pub fn with_config(mut self, config: &StoreConfig) -> Self {
        self.lock_timeout = config.lock_timeout;
        self.max_page_size = config.max_page_size;
        self.default_page_size = config.default_page_size;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Validate caller pagination input against the configured ceiling
    pub fn page_request(&self, page: Option<u32>, page_size: Option<u32>) -> StoreResult<PageRequest> {
        let page_size = page_size.unwrap_or(self.default_page_size);
        Ok(PageRequest::validated(page, Some(page_size), self.max_page_size)?)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create a stream with its first events. Fails with `VersionConflict`
    /// when the stream already exists.
    pub async fn start_stream(
        &self,
        entity: RegistryEntity<R>,
        stream_id: Uuid,
        events: Vec<NewEvent<Payload<R>>>,
    ) -> StoreResult<AppendOutcome<Payload<R>>> {
        self.commit(stream_id, entity, ExpectedVersion::NoStream, events, AppendMode::Optimistic)
            .await
    }

    /// Append with an optional optimistic check. `None` appends after
    /// whatever the stream holds at commit time.
    pub async fn append(
        &self,
        entity: RegistryEntity<R>,
        stream_id: Uuid,
        expected_version: Option<i64>,
        events: Vec<NewEvent<Payload<R>>>,
    ) -> StoreResult<AppendOutcome<Payload<R>>> {
        self.commit(
            stream_id,
            entity,
            ExpectedVersion::from_option(expected_version),
            events,
            AppendMode::Optimistic,
        )
        .await
    }

    /// Append under the stream's exclusive lease; acquires and releases it.
    ///
    /// Events land after whatever the stream holds at commit time, so a plain
    /// append committed while the lease is held never turns this into a
    /// `VersionConflict`. Exclusive callers are ordered by the lease.
    pub async fn append_exclusive(
        &self,
        entity: RegistryEntity<R>,
        stream_id: Uuid,
        events: Vec<NewEvent<Payload<R>>>,
    ) -> StoreResult<AppendOutcome<Payload<R>>> {
        let lease = self.acquire_lease(stream_id).await?;
        let outcome = self.append_with_lease(&lease, entity, None, events).await;
        lease.release();
        outcome
    }

    /// Append while the caller holds the stream's lease, e.g. across a
    /// load + decide + append sequence.
    pub async fn append_with_lease(
        &self,
        lease: &StreamLease,
        entity: RegistryEntity<R>,
        expected_version: Option<i64>,
        events: Vec<NewEvent<Payload<R>>>,
    ) -> StoreResult<AppendOutcome<Payload<R>>> {
        self.commit(
            lease.stream_id(),
            entity,
            ExpectedVersion::from_option(expected_version),
            events,
            AppendMode::Exclusive,
        )
        .await
    }

    /// Wait for the stream's lease, at most the configured lock timeout.
    pub async fn acquire_lease(&self, stream_id: Uuid) -> StoreResult<StreamLease> {
        let started = Instant::now();
        let result = self.locks.acquire(stream_id, self.lock_timeout).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_lock_wait(started.elapsed().as_secs_f64(), result.is_ok());
        }
        result
    }

    async fn commit(
        &self,
        stream_id: Uuid,
        entity: RegistryEntity<R>,
        expected: ExpectedVersion,
        events: Vec<NewEvent<Payload<R>>>,
        mode: AppendMode,
    ) -> StoreResult<AppendOutcome<Payload<R>>> {
        let started = Instant::now();
        let request = AppendRequest {
            stream_id,
            entity,
            expected,
            events,
        };

        match self.storage.append(request, self.projector.as_ref()).await {
            Ok(outcome) => {
                self.observe_commit(&outcome, mode, started);
                Ok(outcome)
            }
            Err(error) => {
                if let EventStoreError::VersionConflict { expected, actual, .. } = &error {
                    tracing::warn!(
                        stream_id = %stream_id,
                        entity = %entity,
                        expected = expected,
                        actual = actual,
                        "Version conflict, append rejected"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_conflict(entity.as_str());
                    }
                } else {
                    tracing::error!(stream_id = %stream_id, entity = %entity, error = %error, "Append failed");
                }
                Err(error)
            }
        }
    }

    fn observe_commit(&self, outcome: &AppendOutcome<Payload<R>>, mode: AppendMode, started: Instant) {
        let entity = outcome.stream.entity;

        tracing::info!(
            stream_id = %outcome.stream.stream_id,
            entity = %entity,
            mode = mode.as_str(),
            new_version = outcome.new_version(),
            event_count = outcome.events.len(),
            "✅ Appended events to event store"
        );

        for record in outcome.audit.iter().filter(|r| r.is_unclassified()) {
            tracing::warn!(
                stream_id = %record.stream_id,
                event_type = %record.event_type,
                "Event type has no business module, audited as unclassified"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_unclassified(&record.event_type);
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_append(
                entity.as_str(),
                mode,
                outcome.events.len(),
                started.elapsed().as_secs_f64(),
            );
        }
    }

    // ========================================================================
    // Streams & History
    // ========================================================================

    pub async fn stream(&self, stream_id: Uuid) -> StoreResult<Option<StreamHeader<RegistryEntity<R>>>> {
        self.storage.stream(stream_id).await
    }

    /// Current version of a stream; 0 when it does not exist
    pub async fn current_version(&self, stream_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .storage
            .stream(stream_id)
            .await?
            .map(|header| header.version)
            .unwrap_or(0))
    }

    pub async fn list_streams(
        &self,
        entity: Option<RegistryEntity<R>>,
    ) -> StoreResult<Vec<StreamHeader<RegistryEntity<R>>>> {
        self.storage.list_streams(entity).await
    }

    /// Full history of a stream, ascending version
    pub async fn fetch_history(&self, stream_id: Uuid) -> StoreResult<Vec<EventEnvelope<Payload<R>>>> {
        if self.storage.stream(stream_id).await?.is_none() {
            return Err(EventStoreError::StreamNotFound(stream_id));
        }
        let events = self.storage.fetch(stream_id, 0).await?;
        tracing::debug!(stream_id = %stream_id, event_count = events.len(), "Loaded stream history");
        Ok(events)
    }

    /// Events after `since_version`; empty for an unknown stream
    pub async fn fetch_from(
        &self,
        stream_id: Uuid,
        since_version: i64,
    ) -> StoreResult<Vec<EventEnvelope<Payload<R>>>> {
        self.storage.fetch(stream_id, since_version).await
    }

    /// Rebuild an aggregate by replaying its full history, bypassing the snapshot
    pub async fn load_aggregate<A>(&self, stream_id: Uuid) -> StoreResult<A>
    where
        A: Aggregate,
        A::Event: DomainEvent<Payload = Payload<R>>,
    {
        let header = self
            .storage
            .stream(stream_id)
            .await?
            .ok_or(EventStoreError::StreamNotFound(stream_id))?;
        header.ensure_entity(A::entity_type())?;

        let events = self.storage.fetch(stream_id, 0).await?;
        A::load_from_events(&events)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Current state document of a stream of `entity`
    pub async fn load_snapshot(
        &self,
        entity: RegistryEntity<R>,
        stream_id: Uuid,
    ) -> StoreResult<Snapshot<RegistryEntity<R>>> {
        match self.storage.load_snapshot(stream_id).await? {
            Some(snapshot) if snapshot.entity == entity => Ok(snapshot),
            _ => Err(EventStoreError::SnapshotNotFound(stream_id)),
        }
    }

    /// Typed current state of a stream
    pub async fn load_state<A>(&self, stream_id: Uuid) -> StoreResult<A>
    where
        A: Aggregate,
        A::Event: DomainEvent<Payload = Payload<R>>,
    {
        self.load_snapshot(A::entity_type(), stream_id).await?.decode::<A>()
    }

    pub async fn query_snapshots(
        &self,
        entity: RegistryEntity<R>,
        filter: &SnapshotFilter,
        order: Option<&OrderBy>,
        page: PageRequest,
    ) -> StoreResult<Page<Snapshot<RegistryEntity<R>>>> {
        let result = self.storage.query_snapshots(entity, filter, order, page).await?;
        tracing::debug!(
            entity = %entity,
            page = page.page,
            page_size = page.page_size,
            total_count = result.total_count,
            "Queried snapshots"
        );
        Ok(result)
    }

    /// Typed `query_snapshots`
    pub async fn query_states<A>(
        &self,
        filter: &SnapshotFilter,
        order: Option<&OrderBy>,
        page: PageRequest,
    ) -> StoreResult<Page<A>>
    where
        A: Aggregate,
        A::Event: DomainEvent<Payload = Payload<R>>,
    {
        self.query_snapshots(A::entity_type(), filter, order, page)
            .await?
            .try_map(|snapshot| snapshot.decode::<A>())
    }

    // ========================================================================
    // Audit Trail
    // ========================================================================

    /// Search the audit trail; newest first unless `order` says otherwise
    pub async fn query_audit(
        &self,
        filter: &AuditFilter<RegistryModule<R>>,
        order: Option<&OrderBy>,
        page: PageRequest,
    ) -> StoreResult<Page<AuditRecord<Payload<R>>>> {
        let default_order = default_audit_order();
        let order = order.unwrap_or(&default_order);
        self.storage.query_audit(filter, order, page).await
    }

    /// Add the audit records a stream is missing (streams written before the
    /// audit projection existed). Returns how many were added.
    pub async fn catch_up_audit(&self, stream_id: Uuid) -> StoreResult<usize> {
        let last_audited = self.storage.last_audited_version(stream_id).await?;
        let missing = self.storage.fetch(stream_id, last_audited).await?;
        if missing.is_empty() {
            return Ok(0);
        }

        let records = InlineProjector::<R>::audit_records(&missing);
        let added = self.storage.append_audit(records).await?;

        tracing::info!(
            stream_id = %stream_id,
            from_version = last_audited + 1,
            added = added,
            "✅ Audit trail caught up"
        );
        Ok(added)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Re-derive snapshots by full replay. Streams that receive an append
    /// while the rebuild runs keep their inline snapshot and are reported as
    /// skipped.
    pub async fn rebuild_snapshots(&self, entity: Option<RegistryEntity<R>>) -> StoreResult<RebuildReport> {
        let streams = self.storage.list_streams(entity).await?;
        let mut report = RebuildReport {
            streams: streams.len(),
            ..RebuildReport::default()
        };

        let mut replayed = Vec::with_capacity(streams.len());
        for header in &streams {
            let snapshot = self.replay(header).await?;
            let stored = self.storage.load_snapshot(header.stream_id).await?;
            if stored.as_ref() != Some(&snapshot) {
                report.changed += 1;
            }
            replayed.push(snapshot);
        }

        let candidates = replayed.len();
        report.rebuilt = self.storage.replace_snapshots(replayed).await?;
        report.skipped = candidates - report.rebuilt;

        if let Some(metrics) = &self.metrics {
            metrics.record_rebuilt(report.rebuilt);
        }
        tracing::info!(
            streams = report.streams,
            rebuilt = report.rebuilt,
            changed = report.changed,
            skipped = report.skipped,
            "✅ Rebuilt snapshots"
        );
        Ok(report)
    }

    /// Compare every stored snapshot with a full replay without writing
    pub async fn verify_snapshots(&self) -> StoreResult<Vec<SnapshotMismatch>> {
        let mut mismatches = Vec::new();
        for header in self.storage.list_streams(None).await? {
            let replayed = self.replay(&header).await?;
            let stored = self.storage.load_snapshot(header.stream_id).await?;
            if stored.as_ref() != Some(&replayed) {
                mismatches.push(SnapshotMismatch {
                    stream_id: header.stream_id,
                    stored_version: stored.map(|s| s.version),
                    replayed_version: replayed.version,
                });
            }
        }

        if !mismatches.is_empty() {
            tracing::warn!(count = mismatches.len(), "Snapshots diverge from their streams");
        }
        Ok(mismatches)
    }

    /// Wipe every stream, snapshot and audit record. When `preserve` names an
    /// existing stream, its full history is re-inserted with the same
    /// versions, ids and timestamps.
    pub async fn reset_all_streams(&self, preserve: Option<Uuid>) -> StoreResult<ResetOutcome<RegistryEntity<R>>> {
        let outcome = self.storage.reset(preserve, self.projector.as_ref()).await?;
        tracing::warn!(
            removed_streams = outcome.removed_streams,
            preserved = ?outcome.preserved.as_ref().map(|h| h.stream_id),
            "Event store reset"
        );
        Ok(outcome)
    }

    async fn replay(&self, header: &StreamHeader<RegistryEntity<R>>) -> StoreResult<Snapshot<RegistryEntity<R>>> {
        let events = self.storage.fetch(header.stream_id, 0).await?;
        R::fold(header.entity, None, &events)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::configuration::{
        ConfigurationEvent, ConfigurationInitialized, SettingChanged, CONFIGURATION_STREAM_ID,
    };
    use crate::domain::{EntityType, MaintenanceDomain, MaintenanceEvent};
    use std::collections::BTreeMap;

    type Store = EventStore<MaintenanceDomain>;

    fn initialized() -> NewEvent<MaintenanceEvent> {
        NewEvent::from_event(ConfigurationEvent::Initialized(ConfigurationInitialized {
            company_name: "Planta Norte".to_string(),
            settings: BTreeMap::new(),
        }))
    }

    fn setting(key: &str, value: &str) -> NewEvent<MaintenanceEvent> {
        NewEvent::from_event(ConfigurationEvent::SettingChanged(SettingChanged {
            key: key.to_string(),
            value: value.to_string(),
        }))
    }

    #[tokio::test]
    async fn test_start_stream_twice_conflicts() {
        let store = Store::in_memory();
        store
            .start_stream(EntityType::Configuration, CONFIGURATION_STREAM_ID, vec![initialized()])
            .await
            .unwrap();

        let again = store
            .start_stream(EntityType::Configuration, CONFIGURATION_STREAM_ID, vec![initialized()])
            .await;
        assert!(matches!(again, Err(EventStoreError::VersionConflict { expected: 0, actual: 1, .. })));
    }

    #[tokio::test]
    async fn test_load_snapshot_of_other_entity_is_not_found() {
        let store = Store::in_memory();
        store
            .start_stream(EntityType::Configuration, CONFIGURATION_STREAM_ID, vec![initialized()])
            .await
            .unwrap();

        assert!(store.load_snapshot(EntityType::Configuration, CONFIGURATION_STREAM_ID).await.is_ok());
        assert!(matches!(
            store.load_snapshot(EntityType::Equipment, CONFIGURATION_STREAM_ID).await,
            Err(EventStoreError::SnapshotNotFound(_))
        ));
        assert!(matches!(
            store.fetch_history(Uuid::new_v4()).await,
            Err(EventStoreError::StreamNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_exclusive_uses_current_version() {
        let store = Store::in_memory();
        store
            .start_stream(EntityType::Configuration, CONFIGURATION_STREAM_ID, vec![initialized()])
            .await
            .unwrap();

        let outcome = store
            .append_exclusive(EntityType::Configuration, CONFIGURATION_STREAM_ID, vec![setting("timezone", "UTC")])
            .await
            .unwrap();
        assert_eq!(outcome.new_version(), 2);
        assert_eq!(outcome.snapshot.state["settings"]["timezone"], "UTC");
    }

    #[tokio::test]
    async fn test_metrics_count_appends_and_conflicts() {
        let metrics = Arc::new(StoreMetrics::new().unwrap());
        let store = Store::in_memory().with_metrics(metrics.clone());

        store
            .start_stream(EntityType::Configuration, CONFIGURATION_STREAM_ID, vec![initialized()])
            .await
            .unwrap();
        let _ = store
            .append(EntityType::Configuration, CONFIGURATION_STREAM_ID, Some(0), vec![setting("a", "b")])
            .await;

        let gathered = metrics.registry().gather();
        let conflicts = gathered
            .iter()
            .find(|m| m.name() == "es_version_conflicts_total")
            .unwrap();
        assert_eq!(conflicts.metric[0].counter.value, Some(1.0));
    }

    #[tokio::test]
    async fn test_page_request_respects_ceiling() {
        let store = Store::in_memory().with_config(&StoreConfig::default().with_max_page_size(30));
        assert!(store.page_request(Some(2), Some(30)).is_ok());
        assert!(matches!(
            store.page_request(Some(1), Some(31)),
            Err(EventStoreError::InvalidPagination(_))
        ));
    }
}
