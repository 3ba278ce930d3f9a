use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::backend::{AppendOutcome, AppendRequest, EventStorage, ResetOutcome, StreamHeader};
use crate::event_sourcing::core::{EventEnvelope, EventPayload};
use crate::event_sourcing::error::{EventStoreError, StoreResult};
use crate::event_sourcing::projection::{compare_audit, AuditFilter, AuditRecord, Projector, Snapshot};
use crate::event_sourcing::query::{compare_json, OrderBy, Page, PageRequest, SnapshotFilter};

// ============================================================================
// In-Memory Storage Backend
// ============================================================================
//
// Single-process backend for tests, demos and tooling. A commit builds the
// whole batch (envelopes, snapshot, audit records) before touching shared
// state, so a failed append never leaves partial effects.
//
// ============================================================================

struct MemoryState<P: EventPayload> {
    streams: HashMap<Uuid, StreamHeader<P::Entity>>,
    events: HashMap<Uuid, Vec<EventEnvelope<P>>>,
    snapshots: HashMap<Uuid, Snapshot<P::Entity>>,
    audit: Vec<AuditRecord<P>>,
    global_sequence: i64,
}

impl<P: EventPayload> Default for MemoryState<P> {
    fn default() -> Self {
        Self {
            streams: HashMap::new(),
            events: HashMap::new(),
            snapshots: HashMap::new(),
            audit: Vec::new(),
            global_sequence: 0,
        }
    }
}

impl<P: EventPayload> MemoryState<P> {
    fn commit(
        &mut self,
        request: AppendRequest<P>,
        projector: &dyn Projector<P>,
    ) -> StoreResult<AppendOutcome<P>> {
        let stream_id = request.stream_id;
        if request.events.is_empty() {
            return Err(EventStoreError::EmptyAppend);
        }

        let existing = self.streams.get(&stream_id).cloned();
        if let Some(header) = &existing {
            header.ensure_entity(request.entity)?;
        }
        let current_version = existing.as_ref().map(|h| h.version).unwrap_or(0);
        request.expected.check(stream_id, current_version)?;

        let committed_at = Utc::now();
        let envelopes: Vec<EventEnvelope<P>> = request
            .events
            .into_iter()
            .enumerate()
            .map(|(i, event)| {
                let offset = i as i64 + 1;
                EventEnvelope::commit(
                    stream_id,
                    current_version + offset,
                    self.global_sequence + offset,
                    event,
                    committed_at,
                )
            })
            .collect();

        let projection = projector.project(request.entity, self.snapshots.get(&stream_id), &envelopes)?;

        // Nothing below can fail
        let new_version = current_version + envelopes.len() as i64;
        let header = StreamHeader {
            stream_id,
            entity: request.entity,
            version: new_version,
            created_at: existing.map(|h| h.created_at).unwrap_or(committed_at),
            updated_at: committed_at,
        };

        self.global_sequence += envelopes.len() as i64;
        self.streams.insert(stream_id, header.clone());
        self.events
            .entry(stream_id)
            .or_default()
            .extend(envelopes.iter().cloned());
        self.snapshots.insert(stream_id, projection.snapshot.clone());
        self.audit.extend(projection.audit.iter().cloned());

        Ok(AppendOutcome {
            stream: header,
            events: envelopes,
            snapshot: projection.snapshot,
            audit: projection.audit,
        })
    }
}

pub struct InMemoryStorage<P: EventPayload> {
    state: RwLock<MemoryState<P>>,
}

impl<P: EventPayload> InMemoryStorage<P> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }
}

impl<P: EventPayload> Default for InMemoryStorage<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P: EventPayload> EventStorage<P> for InMemoryStorage<P> {
    async fn append(
        &self,
        request: AppendRequest<P>,
        projector: &dyn Projector<P>,
    ) -> StoreResult<AppendOutcome<P>> {
        let mut state = self.state.write().await;
        state.commit(request, projector)
    }

    async fn stream(&self, stream_id: Uuid) -> StoreResult<Option<StreamHeader<P::Entity>>> {
        Ok(self.state.read().await.streams.get(&stream_id).cloned())
    }

    async fn list_streams(&self, entity: Option<P::Entity>) -> StoreResult<Vec<StreamHeader<P::Entity>>> {
        let state = self.state.read().await;
        let mut streams: Vec<_> = state
            .streams
            .values()
            .filter(|header| entity.map_or(true, |e| header.entity == e))
            .cloned()
            .collect();
        streams.sort_by_key(|header| (header.created_at, header.stream_id));
        Ok(streams)
    }

    async fn fetch(&self, stream_id: Uuid, since_version: i64) -> StoreResult<Vec<EventEnvelope<P>>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .get(&stream_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.stream_version > since_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_snapshot(&self, stream_id: Uuid) -> StoreResult<Option<Snapshot<P::Entity>>> {
        Ok(self.state.read().await.snapshots.get(&stream_id).cloned())
    }

    async fn query_snapshots(
        &self,
        entity: P::Entity,
        filter: &SnapshotFilter,
        order: Option<&OrderBy>,
        page: PageRequest,
    ) -> StoreResult<Page<Snapshot<P::Entity>>> {
        let state = self.state.read().await;
        let mut matching: Vec<&Snapshot<P::Entity>> = state
            .snapshots
            .values()
            .filter(|s| s.entity == entity && filter.matches(&s.state))
            .collect();

        matching.sort_by(|a, b| {
            let primary = match order {
                Some(order) => {
                    let left = a.state.get(&order.field).unwrap_or(&serde_json::Value::Null);
                    let right = b.state.get(&order.field).unwrap_or(&serde_json::Value::Null);
                    order.direction.apply(compare_json(left, right))
                }
                None => std::cmp::Ordering::Equal,
            };
            primary.then_with(|| a.stream_id.cmp(&b.stream_id))
        });

        let total = matching.len() as u64;
        let data = page.slice(&matching).into_iter().cloned().collect();
        Ok(Page::new(data, page, total))
    }

    async fn replace_snapshots(&self, snapshots: Vec<Snapshot<P::Entity>>) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let mut written = 0;
        for snapshot in snapshots {
            let current = state.streams.get(&snapshot.stream_id).map(|h| h.version);
            if current == Some(snapshot.version) {
                state.snapshots.insert(snapshot.stream_id, snapshot);
                written += 1;
            }
        }
        Ok(written)
    }

    async fn query_audit(
        &self,
        filter: &AuditFilter<P::Module>,
        order: &OrderBy,
        page: PageRequest,
    ) -> StoreResult<Page<AuditRecord<P>>> {
        let state = self.state.read().await;
        let mut matching: Vec<&AuditRecord<P>> =
            state.audit.iter().filter(|r| filter.matches(r)).collect();
        matching.sort_by(|a, b| compare_audit(a, b, order));

        let total = matching.len() as u64;
        let data = page.slice(&matching).into_iter().cloned().collect();
        Ok(Page::new(data, page, total))
    }

    async fn last_audited_version(&self, stream_id: Uuid) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .filter(|r| r.stream_id == stream_id)
            .map(|r| r.stream_version)
            .max()
            .unwrap_or(0))
    }

    async fn append_audit(&self, records: Vec<AuditRecord<P>>) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let mut inserted = 0;
        for record in records {
            let present = state
                .audit
                .iter()
                .any(|r| r.stream_id == record.stream_id && r.stream_version == record.stream_version);
            if !present {
                state.audit.push(record);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn reset(
        &self,
        preserve: Option<Uuid>,
        projector: &dyn Projector<P>,
    ) -> StoreResult<ResetOutcome<P::Entity>> {
        let mut state = self.state.write().await;
        let removed_streams = state.streams.len();

        // Build the replacement state first; on failure the old one stays
        let mut fresh = MemoryState::default();
        let mut preserved = None;

        if let Some(stream_id) = preserve {
            if let (Some(header), Some(history)) =
                (state.streams.get(&stream_id), state.events.get(&stream_id))
            {
                let request = AppendRequest {
                    stream_id,
                    entity: header.entity,
                    expected: super::backend::ExpectedVersion::NoStream,
                    events: history.iter().map(EventEnvelope::to_new_event).collect(),
                };
                let outcome = fresh.commit(request, projector)?;
                let mut restored = outcome.stream;
                restored.created_at = header.created_at;
                restored.updated_at = header.updated_at;
                fresh.streams.insert(stream_id, restored.clone());
                preserved = Some(restored);
            }
        }

        *state = fresh;
        Ok(ResetOutcome {
            removed_streams: removed_streams - usize::from(preserved.is_some()),
            preserved,
        })
    }
}
