use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::marker::PhantomData;
use uuid::Uuid;

use super::backend::{
    AppendOutcome, AppendRequest, EventStorage, ExpectedVersion, ResetOutcome, StreamHeader,
};
use crate::event_sourcing::core::{EntityTag, EventEnvelope, EventPayload, ModuleTag};
use crate::event_sourcing::error::{EventStoreError, StoreResult};
use crate::event_sourcing::projection::{AuditFilter, AuditRecord, AuditSortField, Projector, Snapshot};
use crate::event_sourcing::query::{ConditionOp, OrderBy, Page, PageRequest, SnapshotFilter, SortDirection};

// ============================================================================
// PostgreSQL Storage Backend
// ============================================================================
//
// One transaction per append:
// 1. Upsert + lock the stream row (SELECT ... FOR UPDATE)
// 2. Check the entity type and the expected version
// 3. Draw global sequence numbers
// 4. Project snapshot + audit from the locked snapshot row
// 5. Insert events, snapshot, audit records, bump the stream version
//
// Any error drops the transaction, which rolls everything back.
//
// ============================================================================

const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS es_global_sequence;

CREATE TABLE IF NOT EXISTS es_streams (
    stream_id   UUID PRIMARY KEY,
    entity      TEXT NOT NULL,
    version     BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS es_events (
    global_sequence BIGINT PRIMARY KEY,
    event_id        UUID NOT NULL UNIQUE,
    stream_id       UUID NOT NULL REFERENCES es_streams (stream_id),
    stream_version  BIGINT NOT NULL,
    entity          TEXT NOT NULL,
    event_type      TEXT NOT NULL,
    payload         JSONB NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL,
    actor_id        UUID,
    actor_name      TEXT,
    correlation_id  UUID,
    metadata        JSONB NOT NULL,
    UNIQUE (stream_id, stream_version)
);

CREATE TABLE IF NOT EXISTS es_snapshots (
    stream_id   UUID PRIMARY KEY REFERENCES es_streams (stream_id),
    entity      TEXT NOT NULL,
    version     BIGINT NOT NULL,
    state       JSONB NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS es_snapshots_entity_idx ON es_snapshots (entity);

CREATE TABLE IF NOT EXISTS es_audit (
    id              UUID PRIMARY KEY,
    global_sequence BIGINT NOT NULL,
    stream_id       UUID NOT NULL,
    entity          TEXT NOT NULL,
    event_type      TEXT NOT NULL,
    module          TEXT NOT NULL,
    stream_version  BIGINT NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL,
    actor_id        UUID,
    actor_name      TEXT,
    detail          JSONB NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS es_audit_stream_idx ON es_audit (stream_id, stream_version);
CREATE INDEX IF NOT EXISTS es_audit_occurred_idx ON es_audit (occurred_at DESC, global_sequence DESC);
CREATE INDEX IF NOT EXISTS es_audit_module_idx ON es_audit (module);
"#;

const EVENT_COLUMNS: &str = "event_id, stream_id, entity, stream_version, global_sequence, event_type, \
     payload, occurred_at, actor_id, actor_name, correlation_id, metadata";

const AUDIT_COLUMNS: &str = "id, global_sequence, stream_id, entity, event_type, module, \
     stream_version, occurred_at, actor_id, actor_name, detail";

pub struct PostgresStorage<P: EventPayload> {
    pool: PgPool,
    _payload: PhantomData<P>,
}

impl<P: EventPayload> PostgresStorage<P> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _payload: PhantomData,
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = max_connections, "✅ Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Create the tables, indexes and the global sequence if missing
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("✅ Event store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn parse_entity<E: EntityTag>(raw: &str) -> StoreResult<E> {
    E::parse_tag(raw).ok_or_else(|| EventStoreError::Storage(format!("unknown entity tag '{}'", raw)))
}

fn header_from_row<E: EntityTag>(row: &PgRow) -> StoreResult<StreamHeader<E>> {
    let entity: String = row.try_get("entity")?;
    Ok(StreamHeader {
        stream_id: row.try_get("stream_id")?,
        entity: parse_entity(&entity)?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn envelope_from_row<P: EventPayload>(row: &PgRow) -> StoreResult<EventEnvelope<P>> {
    let entity: String = row.try_get("entity")?;
    let payload: Value = row.try_get("payload")?;
    let metadata: Value = row.try_get("metadata")?;
    Ok(EventEnvelope {
        event_id: row.try_get("event_id")?,
        stream_id: row.try_get("stream_id")?,
        entity: parse_entity(&entity)?,
        stream_version: row.try_get("stream_version")?,
        global_sequence: row.try_get("global_sequence")?,
        event_type: row.try_get("event_type")?,
        payload: serde_json::from_value(payload)?,
        occurred_at: row.try_get("occurred_at")?,
        actor_id: row.try_get("actor_id")?,
        actor_name: row.try_get("actor_name")?,
        correlation_id: row.try_get("correlation_id")?,
        metadata: serde_json::from_value(metadata)?,
    })
}

fn snapshot_from_row<E: EntityTag>(row: &PgRow) -> StoreResult<Snapshot<E>> {
    let entity: String = row.try_get("entity")?;
    Ok(Snapshot {
        stream_id: row.try_get("stream_id")?,
        entity: parse_entity(&entity)?,
        version: row.try_get("version")?,
        state: row.try_get("state")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn audit_from_row<P: EventPayload>(row: &PgRow) -> StoreResult<AuditRecord<P>> {
    let entity: String = row.try_get("entity")?;
    let module: String = row.try_get("module")?;
    let detail: Value = row.try_get("detail")?;
    Ok(AuditRecord {
        id: row.try_get("id")?,
        global_sequence: row.try_get("global_sequence")?,
        stream_id: row.try_get("stream_id")?,
        entity: parse_entity(&entity)?,
        event_type: row.try_get("event_type")?,
        module: <P::Module as ModuleTag>::parse_tag(&module).unwrap_or(<P::Module as ModuleTag>::UNCLASSIFIED),
        stream_version: row.try_get("stream_version")?,
        occurred_at: row.try_get("occurred_at")?,
        actor_id: row.try_get("actor_id")?,
        actor_name: row.try_get("actor_name")?,
        detail: serde_json::from_value(detail)?,
    })
}

// ============================================================================
// Statements Shared by Append and Reset
// ============================================================================

/// TIMESTAMPTZ keeps microseconds; folding must see what a replay will see.
fn storable(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

async fn load_snapshot_in<E: EntityTag>(
    conn: &mut PgConnection,
    stream_id: Uuid,
) -> StoreResult<Option<Snapshot<E>>> {
    let row = sqlx::query(
        "SELECT stream_id, entity, version, state, updated_at FROM es_snapshots WHERE stream_id = $1",
    )
    .bind(stream_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(snapshot_from_row).transpose()
}

async fn insert_audit_in<P: EventPayload>(
    conn: &mut PgConnection,
    records: &[AuditRecord<P>],
) -> StoreResult<usize> {
    let mut inserted = 0;
    for record in records {
        let result = sqlx::query(
            "INSERT INTO es_audit (id, global_sequence, stream_id, entity, event_type, module, \
             stream_version, occurred_at, actor_id, actor_name, detail) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (stream_id, stream_version) DO NOTHING",
        )
        .bind(record.id)
        .bind(record.global_sequence)
        .bind(record.stream_id)
        .bind(record.entity.as_str())
        .bind(&record.event_type)
        .bind(record.module.as_str())
        .bind(record.stream_version)
        .bind(record.occurred_at)
        .bind(record.actor_id)
        .bind(&record.actor_name)
        .bind(serde_json::to_value(&record.detail)?)
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected() as usize;
    }
    Ok(inserted)
}

async fn commit_in<P: EventPayload>(
    conn: &mut PgConnection,
    request: AppendRequest<P>,
    projector: &dyn Projector<P>,
) -> StoreResult<AppendOutcome<P>> {
    let stream_id = request.stream_id;
    if request.events.is_empty() {
        return Err(EventStoreError::EmptyAppend);
    }
    let now = storable(Utc::now());

    sqlx::query(
        "INSERT INTO es_streams (stream_id, entity, version, created_at, updated_at) \
         VALUES ($1, $2, 0, $3, $3) ON CONFLICT (stream_id) DO NOTHING",
    )
    .bind(stream_id)
    .bind(request.entity.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        "SELECT stream_id, entity, version, created_at, updated_at FROM es_streams \
         WHERE stream_id = $1 FOR UPDATE",
    )
    .bind(stream_id)
    .fetch_one(&mut *conn)
    .await?;
    let header: StreamHeader<P::Entity> = header_from_row(&row)?;

    header.ensure_entity(request.entity)?;
    request.expected.check(stream_id, header.version)?;

    let count = request.events.len() as i64;
    let mut sequences: Vec<i64> = sqlx::query("SELECT nextval('es_global_sequence') AS seq FROM generate_series(1, $1)")
        .bind(count)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| row.try_get::<i64, _>("seq"))
        .collect::<Result<_, _>>()?;
    sequences.sort_unstable();

    let envelopes: Vec<EventEnvelope<P>> = request
        .events
        .into_iter()
        .zip(sequences)
        .enumerate()
        .map(|(i, (mut event, sequence))| {
            event.occurred_at = Some(storable(event.occurred_at.unwrap_or(now)));
            EventEnvelope::commit(stream_id, header.version + i as i64 + 1, sequence, event, now)
        })
        .collect();

    let current = load_snapshot_in::<P::Entity>(conn, stream_id).await?;
    let projection = projector.project(request.entity, current.as_ref(), &envelopes)?;

    for envelope in &envelopes {
        sqlx::query(
            "INSERT INTO es_events (event_id, stream_id, entity, stream_version, global_sequence, \
             event_type, payload, occurred_at, actor_id, actor_name, correlation_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(envelope.event_id)
        .bind(envelope.stream_id)
        .bind(envelope.entity.as_str())
        .bind(envelope.stream_version)
        .bind(envelope.global_sequence)
        .bind(&envelope.event_type)
        .bind(serde_json::to_value(&envelope.payload)?)
        .bind(envelope.occurred_at)
        .bind(envelope.actor_id)
        .bind(&envelope.actor_name)
        .bind(envelope.correlation_id)
        .bind(serde_json::to_value(&envelope.metadata)?)
        .execute(&mut *conn)
        .await?;
    }

    let snapshot = &projection.snapshot;
    sqlx::query(
        "INSERT INTO es_snapshots (stream_id, entity, version, state, updated_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (stream_id) DO UPDATE SET version = EXCLUDED.version, \
         state = EXCLUDED.state, updated_at = EXCLUDED.updated_at",
    )
    .bind(snapshot.stream_id)
    .bind(snapshot.entity.as_str())
    .bind(snapshot.version)
    .bind(&snapshot.state)
    .bind(snapshot.updated_at)
    .execute(&mut *conn)
    .await?;

    insert_audit_in(conn, &projection.audit).await?;

    let new_version = header.version + count;
    sqlx::query("UPDATE es_streams SET version = $2, updated_at = $3 WHERE stream_id = $1")
        .bind(stream_id)
        .bind(new_version)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    Ok(AppendOutcome {
        stream: StreamHeader {
            version: new_version,
            updated_at: now,
            ..header
        },
        events: envelopes,
        snapshot: projection.snapshot,
        audit: projection.audit,
    })
}

// ============================================================================
// Dynamic Query Fragments
// ============================================================================

fn push_snapshot_conditions<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    entity: &'static str,
    filter: &'a SnapshotFilter,
) {
    builder.push(" WHERE entity = ").push_bind(entity);
    for condition in &filter.conditions {
        match condition.op {
            ConditionOp::Eq => {
                builder
                    .push(" AND COALESCE(state -> ")
                    .push_bind(&condition.field)
                    .push(", 'null'::jsonb) = ")
                    .push_bind(&condition.value);
            }
            ConditionOp::NotEq => {
                builder
                    .push(" AND COALESCE(state -> ")
                    .push_bind(&condition.field)
                    .push(", 'null'::jsonb) <> ")
                    .push_bind(&condition.value);
            }
            ConditionOp::Contains => {
                let needle = condition.value.as_str().unwrap_or_default();
                builder
                    .push(" AND jsonb_typeof(state -> ")
                    .push_bind(&condition.field)
                    .push(") = 'string' AND strpos(lower(state ->> ")
                    .push_bind(&condition.field)
                    .push("), lower(")
                    .push_bind(needle)
                    .push(")) > 0");
            }
        }
    }
}

fn push_audit_conditions<'a, M: ModuleTag>(
    builder: &mut QueryBuilder<'a, Postgres>,
    filter: &'a AuditFilter<M>,
) {
    builder.push(" WHERE TRUE");
    if let Some(module) = filter.module {
        builder.push(" AND module = ").push_bind(module.as_str());
    }
    if let Some(event_type) = &filter.event_type {
        builder.push(" AND event_type = ").push_bind(event_type);
    }
    if let Some(actor) = &filter.actor_name {
        builder
            .push(" AND strpos(lower(actor_name), lower(")
            .push_bind(actor)
            .push(")) > 0");
    }
    if let Some(stream_id) = filter.stream_id {
        builder.push(" AND stream_id = ").push_bind(stream_id);
    }
    if let Some(from) = filter.from {
        builder.push(" AND occurred_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND occurred_at <= ").push_bind(to);
    }
}

/// Missing values sort first ascending and last descending, like the in-memory backend.
fn nulls(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "NULLS FIRST",
        SortDirection::Desc => "NULLS LAST",
    }
}

fn page_bounds(page: PageRequest) -> (i64, i64) {
    let limit = i64::try_from(page.limit()).unwrap_or(i64::MAX);
    let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
    (limit, offset)
}

#[async_trait]
impl<P: EventPayload> EventStorage<P> for PostgresStorage<P> {
    async fn append(
        &self,
        request: AppendRequest<P>,
        projector: &dyn Projector<P>,
    ) -> StoreResult<AppendOutcome<P>> {
        let mut tx = self.pool.begin().await?;
        let outcome = commit_in(&mut tx, request, projector).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn stream(&self, stream_id: Uuid) -> StoreResult<Option<StreamHeader<P::Entity>>> {
        let row = sqlx::query(
            "SELECT stream_id, entity, version, created_at, updated_at FROM es_streams \
             WHERE stream_id = $1 AND version > 0",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(header_from_row).transpose()
    }

    async fn list_streams(&self, entity: Option<P::Entity>) -> StoreResult<Vec<StreamHeader<P::Entity>>> {
        let rows = sqlx::query(
            "SELECT stream_id, entity, version, created_at, updated_at FROM es_streams \
             WHERE version > 0 AND ($1::text IS NULL OR entity = $1) \
             ORDER BY created_at ASC, stream_id ASC",
        )
        .bind(entity.map(|e| e.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(header_from_row).collect()
    }

    async fn fetch(&self, stream_id: Uuid, since_version: i64) -> StoreResult<Vec<EventEnvelope<P>>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM es_events WHERE stream_id = $1 AND stream_version > $2 \
             ORDER BY stream_version ASC",
            EVENT_COLUMNS
        ))
        .bind(stream_id)
        .bind(since_version)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(stream_id = %stream_id, since_version = since_version, event_count = rows.len(), "Fetched events");
        rows.iter().map(envelope_from_row).collect()
    }

    async fn load_snapshot(&self, stream_id: Uuid) -> StoreResult<Option<Snapshot<P::Entity>>> {
        let mut conn = self.pool.acquire().await?;
        load_snapshot_in(&mut conn, stream_id).await
    }

    async fn query_snapshots(
        &self,
        entity: P::Entity,
        filter: &SnapshotFilter,
        order: Option<&OrderBy>,
        page: PageRequest,
    ) -> StoreResult<Page<Snapshot<P::Entity>>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) AS total FROM es_snapshots");
        push_snapshot_conditions(&mut count, entity.as_str(), filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get("total")?;

        let mut select =
            QueryBuilder::new("SELECT stream_id, entity, version, state, updated_at FROM es_snapshots");
        push_snapshot_conditions(&mut select, entity.as_str(), filter);
        select.push(" ORDER BY ");
        if let Some(order) = order {
            select
                .push("COALESCE(state -> ")
                .push_bind(order.field.clone())
                .push(", 'null'::jsonb) ")
                .push(order.direction.as_sql())
                .push(", ");
        }
        let (limit, offset) = page_bounds(page);
        select
            .push("stream_id ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(&self.pool).await?;
        let data = rows.iter().map(snapshot_from_row).collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(data, page, total.max(0) as u64))
    }

    async fn replace_snapshots(&self, snapshots: Vec<Snapshot<P::Entity>>) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for snapshot in &snapshots {
            // FOR SHARE keeps appends to this stream out until the snapshot is written
            let current: Option<i64> = sqlx::query("SELECT version FROM es_streams WHERE stream_id = $1 FOR SHARE")
                .bind(snapshot.stream_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.try_get("version"))
                .transpose()?;

            if current != Some(snapshot.version) {
                continue;
            }

            sqlx::query(
                "INSERT INTO es_snapshots (stream_id, entity, version, state, updated_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (stream_id) DO UPDATE SET entity = EXCLUDED.entity, \
                 version = EXCLUDED.version, state = EXCLUDED.state, updated_at = EXCLUDED.updated_at",
            )
            .bind(snapshot.stream_id)
            .bind(snapshot.entity.as_str())
            .bind(snapshot.version)
            .bind(&snapshot.state)
            .bind(snapshot.updated_at)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn query_audit(
        &self,
        filter: &AuditFilter<P::Module>,
        order: &OrderBy,
        page: PageRequest,
    ) -> StoreResult<Page<AuditRecord<P>>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) AS total FROM es_audit");
        push_audit_conditions(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get("total")?;

        let field = AuditSortField::parse(&order.field);
        let direction = order.direction.as_sql();
        let collate = match field {
            AuditSortField::EventType | AuditSortField::Module | AuditSortField::ActorName => " COLLATE \"C\"",
            _ => "",
        };

        let mut select = QueryBuilder::new(format!("SELECT {} FROM es_audit", AUDIT_COLUMNS));
        push_audit_conditions(&mut select, filter);
        let (limit, offset) = page_bounds(page);
        select
            .push(format!(
                " ORDER BY {}{} {} {}, global_sequence {} LIMIT ",
                field.column(),
                collate,
                direction,
                nulls(order.direction),
                direction
            ))
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(&self.pool).await?;
        let data = rows.iter().map(audit_from_row).collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(data, page, total.max(0) as u64))
    }

    async fn last_audited_version(&self, stream_id: Uuid) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(stream_version), 0) AS version FROM es_audit WHERE stream_id = $1")
            .bind(stream_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("version")?)
    }

    async fn append_audit(&self, records: Vec<AuditRecord<P>>) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_audit_in(&mut tx, &records).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn reset(
        &self,
        preserve: Option<Uuid>,
        projector: &dyn Projector<P>,
    ) -> StoreResult<ResetOutcome<P::Entity>> {
        let mut tx = self.pool.begin().await?;

        // Blocks concurrent writers until the wipe commits
        sqlx::query("LOCK TABLE es_streams IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM es_streams WHERE version > 0")
            .fetch_one(&mut *tx)
            .await?
            .try_get("total")?;

        let mut kept: Option<(StreamHeader<P::Entity>, Vec<EventEnvelope<P>>)> = None;
        if let Some(stream_id) = preserve {
            let header = sqlx::query(
                "SELECT stream_id, entity, version, created_at, updated_at FROM es_streams \
                 WHERE stream_id = $1 AND version > 0",
            )
            .bind(stream_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = header {
                let header: StreamHeader<P::Entity> = header_from_row(&row)?;
                let history = sqlx::query(&format!(
                    "SELECT {} FROM es_events WHERE stream_id = $1 ORDER BY stream_version ASC",
                    EVENT_COLUMNS
                ))
                .bind(stream_id)
                .fetch_all(&mut *tx)
                .await?
                .iter()
                .map(envelope_from_row)
                .collect::<StoreResult<Vec<_>>>()?;
                kept = Some((header, history));
            }
        }

        sqlx::query("TRUNCATE es_audit, es_snapshots, es_events, es_streams")
            .execute(&mut *tx)
            .await?;

        let mut preserved = None;
        if let Some((header, history)) = kept {
            let request = AppendRequest {
                stream_id: header.stream_id,
                entity: header.entity,
                expected: ExpectedVersion::NoStream,
                events: history.iter().map(EventEnvelope::to_new_event).collect(),
            };
            let outcome = commit_in(&mut tx, request, projector).await?;

            sqlx::query("UPDATE es_streams SET created_at = $2, updated_at = $3 WHERE stream_id = $1")
                .bind(header.stream_id)
                .bind(header.created_at)
                .bind(header.updated_at)
                .execute(&mut *tx)
                .await?;

            preserved = Some(StreamHeader {
                created_at: header.created_at,
                updated_at: header.updated_at,
                ..outcome.stream
            });
        }

        tx.commit().await?;

        let total = usize::try_from(total).unwrap_or_default();
        Ok(ResetOutcome {
            removed_streams: total - usize::from(preserved.is_some()),
            preserved,
        })
    }
}
