use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use maintenance_store::domain::configuration::{
    ConfigurationAggregate, ConfigurationCommand, ConfigurationEvent, ConfigurationInitialized,
    SettingChanged, SettingRemoved, CONFIGURATION_STREAM_ID,
};
use maintenance_store::domain::employee::{EmployeeAggregate, EmployeeCommand};
use maintenance_store::domain::equipment::{
    EquipmentAggregate, EquipmentCommand, EquipmentDeleted, EquipmentEvent, EquipmentRegistered,
    EquipmentStatus, EquipmentStatusChanged,
};
use maintenance_store::domain::routine::{RoutineAggregate, RoutineCommand};
use maintenance_store::domain::user::{UserAggregate, UserCommand, UserEvent, UserRole};
use maintenance_store::domain::work_order::{
    ProgressRecorded, WorkOrderAggregate, WorkOrderCommand, WorkOrderEvent, WorkOrderStatus, WorkStarted,
};
use maintenance_store::domain::{
    BusinessModule, CommandHandler, CommandMetadata, EntityType, MaintenanceDomain, MaintenanceEvent,
    MaintenanceStore,
};
use maintenance_store::event_sourcing::core::{Actor, EventEnvelope, NewEvent};
use maintenance_store::event_sourcing::projection::{AuditFilter, Snapshot};
use maintenance_store::event_sourcing::query::{OrderBy, SnapshotFilter};
use maintenance_store::event_sourcing::registry::DomainRegistry;
use maintenance_store::event_sourcing::store::EventStore;
use maintenance_store::event_sourcing::{EventStoreError, StoreResult};

// ============================================================================
// Helpers
// ============================================================================

fn store() -> Arc<MaintenanceStore> {
    Arc::new(MaintenanceStore::in_memory())
}

fn supervisor() -> CommandMetadata {
    CommandMetadata::by(Actor::new(Uuid::new_v4(), "Supervisor de planta"))
}

fn initialized() -> NewEvent<MaintenanceEvent> {
    NewEvent::from_event(ConfigurationEvent::Initialized(ConfigurationInitialized {
        company_name: "Planta Norte".to_string(),
        settings: BTreeMap::new(),
    }))
    .with_actor(Actor::named("Ana Torres"))
}

fn setting(key: &str, value: &str) -> NewEvent<MaintenanceEvent> {
    NewEvent::from_event(ConfigurationEvent::SettingChanged(SettingChanged {
        key: key.to_string(),
        value: value.to_string(),
    }))
    .with_actor(Actor::named("Ana Torres"))
}

fn equipment_registered(code: &str, area: &str) -> NewEvent<MaintenanceEvent> {
    NewEvent::from_event(EquipmentEvent::Registered(EquipmentRegistered {
        code: code.to_string(),
        name: "Bomba centrífuga".to_string(),
        area: area.to_string(),
        manufacturer: None,
        model: None,
        serial_number: None,
    }))
}

fn status_changed(status: EquipmentStatus) -> NewEvent<MaintenanceEvent> {
    NewEvent::from_event(EquipmentEvent::StatusChanged(EquipmentStatusChanged { status }))
}

async fn register_equipment(store: &Arc<MaintenanceStore>, code: &str) -> Uuid {
    let id = Uuid::new_v4();
    CommandHandler::<EquipmentAggregate>::new(store.clone())
        .handle(
            id,
            &EquipmentCommand::RegisterEquipment {
                code: code.to_string(),
                name: "Compresor".to_string(),
                area: "Sala de máquinas".to_string(),
                manufacturer: None,
                model: None,
                serial_number: None,
            },
            &supervisor(),
        )
        .await
        .unwrap();
    id
}

async fn create_user(store: &Arc<MaintenanceStore>) -> Uuid {
    let id = Uuid::new_v4();
    CommandHandler::<UserAggregate>::new(store.clone())
        .handle(
            id,
            &UserCommand::CreateUser {
                username: "admin".to_string(),
                display_name: "Administrador".to_string(),
                role: UserRole::Administrador,
                employee_id: None,
                password_hash: "opaque".to_string(),
            },
            &supervisor(),
        )
        .await
        .unwrap();
    id
}

/// Everything derived from one stream, for before/after comparisons
async fn observe(
    store: &MaintenanceStore,
    stream_id: Uuid,
    entity: EntityType,
) -> (Vec<EventEnvelope<MaintenanceEvent>>, Snapshot<EntityType>, usize) {
    let history = store.fetch_history(stream_id).await.unwrap();
    let snapshot = store.load_snapshot(entity, stream_id).await.unwrap();
    let audit = store
        .query_audit(&AuditFilter::for_stream(stream_id), None, store.page_request(None, None).unwrap())
        .await
        .unwrap();
    (history, snapshot, audit.total_count as usize)
}

async fn assert_snapshot_is_replay(store: &MaintenanceStore) {
    let mismatches = store.verify_snapshots().await.unwrap();
    assert!(mismatches.is_empty(), "snapshots diverge: {:?}", mismatches);
}

// ============================================================================
// Append & read-after-write
// ============================================================================

#[tokio::test]
async fn test_start_then_append_with_expected_version() {
    let store = store();

    let started = store
        .start_stream(EntityType::Configuration, CONFIGURATION_STREAM_ID, vec![initialized()])
        .await
        .unwrap();
    assert_eq!(started.new_version(), 1);

    let appended = store
        .append(
            EntityType::Configuration,
            CONFIGURATION_STREAM_ID,
            Some(1),
            vec![setting("timezone", "America/Bogota")],
        )
        .await
        .unwrap();
    assert_eq!(appended.new_version(), 2);

    let config: ConfigurationAggregate = store.load_state(CONFIGURATION_STREAM_ID).await.unwrap();
    assert_eq!(config.version, 2);
    assert_eq!(config.company_name, "Planta Norte");
    assert_eq!(config.setting("timezone"), Some("America/Bogota"));

    let audit = store
        .query_audit(
            &AuditFilter::for_stream(CONFIGURATION_STREAM_ID),
            None,
            store.page_request(None, None).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(audit.total_count, 2);
    assert!(audit.data.iter().all(|r| r.module == BusinessModule::Configuracion));
}

#[tokio::test]
async fn test_batch_gets_consecutive_versions() {
    let store = store();
    let id = Uuid::new_v4();

    let outcome = store
        .start_stream(
            EntityType::Equipment,
            id,
            vec![
                equipment_registered("BMB-01", "Planta A"),
                status_changed(EquipmentStatus::EnMantenimiento),
                status_changed(EquipmentStatus::Operativo),
            ],
        )
        .await
        .unwrap();

    let versions: Vec<i64> = outcome.events.iter().map(|e| e.stream_version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(outcome.snapshot.version, 3);
    assert_eq!(outcome.audit.len(), 3);

    let sequences: Vec<i64> = outcome.events.iter().map(|e| e.global_sequence).collect();
    assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
}

#[tokio::test]
async fn test_snapshot_matches_replay_after_every_command() {
    let store = store();
    let equipment_id = register_equipment(&store, "cmp-07").await;
    let work_orders = CommandHandler::<WorkOrderAggregate>::new(store.clone());
    let id = Uuid::new_v4();
    let meta = supervisor();

    let steps = vec![
        WorkOrderCommand::CreateWorkOrder {
            code: "OT-0001".to_string(),
            title: "Cambio de rodamientos".to_string(),
            description: None,
            equipment_id,
            routine_id: None,
            scheduled_for: None,
        },
        WorkOrderCommand::AssignEmployees {
            employee_ids: vec![Uuid::new_v4()],
        },
        WorkOrderCommand::StartWork,
        WorkOrderCommand::RecordProgress {
            percentage: 40,
            note: None,
        },
        WorkOrderCommand::CompleteExecution {
            observations: Some("Sin novedad".to_string()),
        },
    ];

    for step in &steps {
        work_orders.handle(id, step, &meta).await.unwrap();

        let cached: WorkOrderAggregate = store.load_state(id).await.unwrap();
        let replayed: WorkOrderAggregate = store.load_aggregate(id).await.unwrap();
        assert_eq!(cached, replayed);
        assert_eq!(
            store.load_snapshot(EntityType::WorkOrder, id).await.unwrap().version,
            store.current_version(id).await.unwrap()
        );
    }

    let order: WorkOrderAggregate = store.load_state(id).await.unwrap();
    assert_eq!(order.status, WorkOrderStatus::EjecucionCompleta);
    assert_eq!(order.progress, 100);
    assert_snapshot_is_replay(&store).await;
}

// ============================================================================
// Failure leaves nothing behind
// ============================================================================

#[tokio::test]
async fn test_stale_expected_version_conflicts_without_effects() {
    let store = store();
    let id = Uuid::new_v4();
    store
        .start_stream(EntityType::Equipment, id, vec![equipment_registered("BMB-02", "Planta A")])
        .await
        .unwrap();
    store
        .append(EntityType::Equipment, id, Some(1), vec![status_changed(EquipmentStatus::EnMantenimiento)])
        .await
        .unwrap();

    let before = observe(&store, id, EntityType::Equipment).await;

    let stale = store
        .append(EntityType::Equipment, id, Some(1), vec![status_changed(EquipmentStatus::FueraDeServicio)])
        .await;
    assert!(matches!(
        stale,
        Err(EventStoreError::VersionConflict { expected: 1, actual: 2, .. })
    ));

    let after = observe(&store, id, EntityType::Equipment).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_rejected_fold_leaves_no_effects() {
    let store = store();
    let id = Uuid::new_v4();

    // No work order can start with progress
    let orphan = NewEvent::from_event(WorkOrderEvent::ProgressRecorded(ProgressRecorded {
        percentage: 30,
        note: None,
    }));
    let result = store.start_stream(EntityType::WorkOrder, id, vec![orphan]).await;
    assert!(matches!(result, Err(EventStoreError::InvalidEventSequence { version: 1, .. })));

    assert!(store.stream(id).await.unwrap().is_none());
    assert!(store.fetch_from(id, 0).await.unwrap().is_empty());
    let audit = store
        .query_audit(&AuditFilter::for_stream(id), None, store.page_request(None, None).unwrap())
        .await
        .unwrap();
    assert_eq!(audit.total_count, 0);
}

#[tokio::test]
async fn test_raw_append_cannot_reopen_completed_order() {
    let store = store();
    let equipment_id = register_equipment(&store, "cmp-08").await;
    let work_orders = CommandHandler::<WorkOrderAggregate>::new(store.clone());
    let id = Uuid::new_v4();
    let meta = supervisor();
    for command in [
        WorkOrderCommand::CreateWorkOrder {
            code: "OT-0002".to_string(),
            title: "Alineación de motor".to_string(),
            description: None,
            equipment_id,
            routine_id: None,
            scheduled_for: None,
        },
        WorkOrderCommand::CompleteExecution { observations: None },
    ] {
        work_orders.handle(id, &command, &meta).await.unwrap();
    }
    let before = observe(&store, id, EntityType::WorkOrder).await;

    let backwards = vec![
        NewEvent::from_event(WorkOrderEvent::ProgressRecorded(ProgressRecorded {
            percentage: 10,
            note: None,
        })),
        NewEvent::from_event(WorkOrderEvent::Started(WorkStarted {})),
    ];
    let result = store.append(EntityType::WorkOrder, id, Some(2), backwards).await;
    assert!(matches!(result, Err(EventStoreError::InvalidEventSequence { version: 3, .. })));

    assert_eq!(before, observe(&store, id, EntityType::WorkOrder).await);
    let order: WorkOrderAggregate = store.load_state(id).await.unwrap();
    assert_eq!(order.status, WorkOrderStatus::EjecucionCompleta);
    assert_eq!(order.progress, 100);
}

#[tokio::test]
async fn test_foreign_payload_is_rejected_whole_batch() {
    let store = store();
    let id = Uuid::new_v4();
    store
        .start_stream(EntityType::Equipment, id, vec![equipment_registered("BMB-03", "Planta B")])
        .await
        .unwrap();
    let before = observe(&store, id, EntityType::Equipment).await;

    // A valid event followed by a configuration payload in an equipment stream
    let result = store
        .append(
            EntityType::Equipment,
            id,
            Some(1),
            vec![status_changed(EquipmentStatus::EnMantenimiento), setting("timezone", "UTC")],
        )
        .await;
    assert!(matches!(result, Err(EventStoreError::UnknownEventForEntity { .. })));

    assert_eq!(before, observe(&store, id, EntityType::Equipment).await);
}

#[tokio::test]
async fn test_nothing_moves_a_stream_out_of_deleted() {
    let store = store();
    let id = Uuid::new_v4();
    store
        .start_stream(
            EntityType::Equipment,
            id,
            vec![
                equipment_registered("BMB-04", "Planta B"),
                NewEvent::from_event(EquipmentEvent::Deleted(EquipmentDeleted { reason: None })),
            ],
        )
        .await
        .unwrap();

    let revived = store
        .append(EntityType::Equipment, id, Some(2), vec![status_changed(EquipmentStatus::Operativo)])
        .await;
    assert!(matches!(revived, Err(EventStoreError::InvalidEventSequence { version: 3, .. })));
    assert_eq!(store.current_version(id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_empty_append_is_rejected() {
    let store = store();
    let result = store.append(EntityType::Equipment, Uuid::new_v4(), None, vec![]).await;
    assert!(matches!(result, Err(EventStoreError::EmptyAppend)));
}

#[tokio::test]
async fn test_append_to_stream_of_other_entity_fails() {
    let store = store();
    let id = register_equipment(&store, "cmp-08").await;

    let result = store.append(EntityType::Configuration, id, None, vec![setting("a", "b")]).await;
    assert!(matches!(result, Err(EventStoreError::StreamTypeMismatch { .. })));
}

// ============================================================================
// Audit trail
// ============================================================================

#[tokio::test]
async fn test_one_audit_record_per_event() {
    let store = store();
    let meta = supervisor();
    let routine_id = Uuid::new_v4();
    let routines = CommandHandler::<RoutineAggregate>::new(store.clone());
    routines
        .handle(
            routine_id,
            &RoutineCommand::CreateRoutine {
                name: "Inspección semanal".to_string(),
                description: None,
                frequency_days: 7,
                tasks: vec!["Revisar fugas".to_string()],
            },
            &meta,
        )
        .await
        .unwrap();
    for _ in 0..3 {
        routines
            .handle(routine_id, &RoutineCommand::LinkEquipment { equipment_id: Uuid::new_v4() }, &meta)
            .await
            .unwrap();
    }
    let employee_id = Uuid::new_v4();
    CommandHandler::<EmployeeAggregate>::new(store.clone())
        .handle(
            employee_id,
            &EmployeeCommand::RegisterEmployee {
                document_id: "79123456".to_string(),
                first_name: "Luis".to_string(),
                last_name: "Pardo".to_string(),
                position: "Electricista".to_string(),
                email: None,
            },
            &meta,
        )
        .await
        .unwrap();

    let page = store.page_request(Some(1), Some(100)).unwrap();
    for stream in store.list_streams(None).await.unwrap() {
        let events = store.fetch_history(stream.stream_id).await.unwrap();
        let audit = store
            .query_audit(&AuditFilter::for_stream(stream.stream_id), None, page)
            .await
            .unwrap();
        assert_eq!(audit.total_count as usize, events.len());

        let mut audited: Vec<i64> = audit.data.iter().map(|r| r.stream_version).collect();
        audited.sort_unstable();
        let versions: Vec<i64> = events.iter().map(|e| e.stream_version).collect();
        assert_eq!(audited, versions);
    }

    // Already complete, nothing to catch up
    assert_eq!(store.catch_up_audit(routine_id).await.unwrap(), 0);
    let again = store
        .query_audit(&AuditFilter::for_stream(routine_id), None, page)
        .await
        .unwrap();
    assert_eq!(again.total_count, 4);
}

#[tokio::test]
async fn test_audit_records_envelope_actor_and_declared_detail() {
    let store = store();
    let actor_id = Uuid::new_v4();
    let meta = CommandMetadata::by(Actor::new(actor_id, "Ana Torres"));
    let user_id = Uuid::new_v4();
    let users = CommandHandler::<UserAggregate>::new(store.clone());
    users
        .handle(
            user_id,
            &UserCommand::CreateUser {
                username: "atorres".to_string(),
                display_name: "Ana Torres".to_string(),
                role: UserRole::Supervisor,
                employee_id: None,
                password_hash: "secret-hash".to_string(),
            },
            &meta,
        )
        .await
        .unwrap();

    let audit = store
        .query_audit(&AuditFilter::for_stream(user_id), None, store.page_request(None, None).unwrap())
        .await
        .unwrap();
    let record = &audit.data[0];
    assert_eq!(record.module, BusinessModule::Usuarios);
    assert_eq!(record.event_type, "UserCreated");
    assert_eq!(record.actor_id, Some(actor_id));
    assert_eq!(record.actor_name.as_deref(), Some("Ana Torres"));
    assert_eq!(record.detail.get("username"), Some(&json!("atorres")));
    assert!(!record
        .detail
        .values()
        .any(|value| value == &Value::String("secret-hash".to_string())));

    let snapshot = store.load_snapshot(EntityType::User, user_id).await.unwrap();
    assert!(!snapshot.state.to_string().contains("secret-hash"));
}

#[tokio::test]
async fn test_audit_query_filters_and_orders_newest_first() {
    let store = store();
    let ana = CommandMetadata::by(Actor::named("Ana Torres"));
    let luis = CommandMetadata::by(Actor::named("Luis Pardo"));

    let equipment = CommandHandler::<EquipmentAggregate>::new(store.clone());
    let id = Uuid::new_v4();
    equipment
        .handle(
            id,
            &EquipmentCommand::RegisterEquipment {
                code: "TRN-01".to_string(),
                name: "Torno".to_string(),
                area: "Taller".to_string(),
                manufacturer: None,
                model: None,
                serial_number: None,
            },
            &ana,
        )
        .await
        .unwrap();
    equipment
        .handle(id, &EquipmentCommand::ChangeStatus { status: EquipmentStatus::EnMantenimiento }, &luis)
        .await
        .unwrap();
    equipment
        .handle(id, &EquipmentCommand::ChangeStatus { status: EquipmentStatus::Operativo }, &ana)
        .await
        .unwrap();
    register_equipment(&store, "cmp-09").await;

    let page = store.page_request(None, None).unwrap();

    let by_ana = store
        .query_audit(
            &AuditFilter {
                actor_name: Some("ana TORRES".to_string()),
                ..AuditFilter::default()
            },
            None,
            page,
        )
        .await
        .unwrap();
    assert_eq!(by_ana.total_count, 2);
    let versions: Vec<i64> = by_ana.data.iter().map(|r| r.stream_version).collect();
    assert_eq!(versions, vec![3, 1]);

    let status_changes = store
        .query_audit(
            &AuditFilter {
                module: Some(BusinessModule::Equipos),
                event_type: Some("EquipmentStatusChanged".to_string()),
                ..AuditFilter::default()
            },
            None,
            page,
        )
        .await
        .unwrap();
    assert_eq!(status_changes.total_count, 2);

    let everything = store.query_audit(&AuditFilter::for_module(BusinessModule::Equipos), None, page).await.unwrap();
    assert_eq!(everything.total_count, 4);
    assert!(everything
        .data
        .windows(2)
        .all(|w| w[0].global_sequence > w[1].global_sequence));

    let oldest_first = store
        .query_audit(
            &AuditFilter::for_module(BusinessModule::Equipos),
            Some(&OrderBy::asc("global_sequence")),
            page,
        )
        .await
        .unwrap();
    assert_eq!(oldest_first.data.first().map(|r| r.stream_version), Some(1));

    let future = store
        .query_audit(
            &AuditFilter {
                from: Some(Utc::now() + Duration::hours(1)),
                ..AuditFilter::default()
            },
            None,
            page,
        )
        .await
        .unwrap();
    assert_eq!(future.total_count, 0);
}

/// Same payloads, but `SettingRemoved` is left without a module
struct PartialDomain;

impl DomainRegistry for PartialDomain {
    type Payload = MaintenanceEvent;

    fn fold(
        entity: EntityType,
        current: Option<&Snapshot<EntityType>>,
        events: &[EventEnvelope<MaintenanceEvent>],
    ) -> StoreResult<Snapshot<EntityType>> {
        MaintenanceDomain::fold(entity, current, events)
    }

    fn classify(payload: &MaintenanceEvent) -> Option<BusinessModule> {
        match payload {
            MaintenanceEvent::Configuration(ConfigurationEvent::SettingRemoved(_)) => None,
            other => MaintenanceDomain::classify(other),
        }
    }

    fn audit_detail(payload: &MaintenanceEvent) -> BTreeMap<String, Value> {
        MaintenanceDomain::audit_detail(payload)
    }
}

#[tokio::test]
async fn test_declined_payload_is_audited_as_unclassified() {
    let store = EventStore::<PartialDomain>::in_memory();
    let removed = NewEvent::from_event(ConfigurationEvent::SettingRemoved(SettingRemoved {
        key: "timezone".to_string(),
    }));

    store
        .start_stream(
            EntityType::Configuration,
            CONFIGURATION_STREAM_ID,
            vec![initialized(), setting("timezone", "UTC"), removed],
        )
        .await
        .unwrap();

    let page = store.page_request(None, None).unwrap();
    let unclassified = store
        .query_audit(&AuditFilter::for_module(BusinessModule::Unclassified), None, page)
        .await
        .unwrap();
    assert_eq!(unclassified.total_count, 1);
    assert_eq!(unclassified.data[0].event_type, "SettingRemoved");
    assert_eq!(unclassified.data[0].stream_version, 3);
    assert_eq!(unclassified.data[0].module.as_str(), "unclassified");

    let all = store
        .query_audit(&AuditFilter::for_stream(CONFIGURATION_STREAM_ID), None, page)
        .await
        .unwrap();
    assert_eq!(all.total_count, 3);
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_second_page_of_twenty_five_matches() {
    let store = store();
    for i in 0..25 {
        store
            .start_stream(
                EntityType::Equipment,
                Uuid::new_v4(),
                vec![equipment_registered(&format!("BMB-{:02}", i), "Planta A")],
            )
            .await
            .unwrap();
    }
    for i in 0..5 {
        store
            .start_stream(
                EntityType::Equipment,
                Uuid::new_v4(),
                vec![equipment_registered(&format!("OTR-{:02}", i), "Planta B")],
            )
            .await
            .unwrap();
    }

    let filter = SnapshotFilter::all().eq("area", "Planta A");
    let page = store
        .query_states::<EquipmentAggregate>(
            &filter,
            Some(&OrderBy::asc("code")),
            store.page_request(Some(2), Some(10)).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(page.data.len(), 10);
    assert_eq!(page.page, 2);
    assert_eq!(page.page_size, 10);
    assert_eq!(page.total_count, 25);
    assert_eq!(page.total_pages, 3);
    let codes: Vec<&str> = page.data.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes.first(), Some(&"BMB-10"));
    assert_eq!(codes.last(), Some(&"BMB-19"));

    let last = store
        .query_states::<EquipmentAggregate>(
            &filter,
            Some(&OrderBy::parse("code", Some("DESC"))),
            store.page_request(Some(3), Some(10)).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(last.data.len(), 5);
    assert_eq!(last.data.last().map(|e| e.code.as_str()), Some("BMB-00"));
}

#[tokio::test]
async fn test_page_size_above_ceiling_is_rejected() {
    let store = store();
    assert!(matches!(
        store.page_request(Some(1), Some(101)),
        Err(EventStoreError::InvalidPagination(_))
    ));
    assert!(matches!(
        store.page_request(Some(0), Some(10)),
        Err(EventStoreError::InvalidPagination(_))
    ));

    let defaults = store.page_request(None, None).unwrap();
    assert_eq!((defaults.page, defaults.page_size), (1, 20));
}

// ============================================================================
// Exclusive mode
// ============================================================================

#[tokio::test]
async fn test_concurrent_exclusive_appends_serialize() {
    let store = store();
    let id = Uuid::new_v4();
    store
        .start_stream(EntityType::Equipment, id, vec![equipment_registered("BMB-20", "Planta A")])
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let status = if i % 2 == 0 {
                EquipmentStatus::EnMantenimiento
            } else {
                EquipmentStatus::Operativo
            };
            tokio::spawn(async move {
                store
                    .append_exclusive(EntityType::Equipment, id, vec![status_changed(status)])
                    .await
            })
        })
        .collect();

    let mut versions = Vec::new();
    for task in tasks {
        versions.push(task.await.unwrap().unwrap().new_version());
    }
    versions.sort_unstable();
    assert_eq!(versions, (2..=9).collect::<Vec<i64>>());
    assert_eq!(store.current_version(id).await.unwrap(), 9);
    assert_snapshot_is_replay(&store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_plain_appends_never_make_exclusive_appends_conflict() {
    let store = store();
    let id = Uuid::new_v4();
    store
        .start_stream(EntityType::Equipment, id, vec![equipment_registered("BMB-21", "Planta A")])
        .await
        .unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let events = vec![status_changed(EquipmentStatus::EnMantenimiento)];
                if i % 2 == 0 {
                    store.append_exclusive(EntityType::Equipment, id, events).await
                } else {
                    store.append(EntityType::Equipment, id, None, events).await
                }
            })
        })
        .collect();

    for task in tasks {
        let result = task.await.unwrap();
        assert!(result.is_ok(), "append failed: {:?}", result.err());
    }
    assert_eq!(store.current_version(id).await.unwrap(), 17);
    assert_snapshot_is_replay(&store).await;
}

#[tokio::test]
async fn test_second_exclusive_credential_sees_the_first() {
    let store = store();
    let user_id = create_user(&store).await;
    let users = CommandHandler::<UserAggregate>::new(store.clone());
    let login = CommandMetadata::by(Actor::new(user_id, "login"));
    let expires_at = Utc::now() + Duration::hours(8);

    let first = UserCommand::IssueCredential {
        credential_id: Uuid::new_v4(),
        expires_at,
    };
    let second = UserCommand::IssueCredential {
        credential_id: Uuid::new_v4(),
        expires_at,
    };
    let (a, b) = tokio::join!(
        users.handle_exclusive(user_id, &first, &login),
        users.handle_exclusive(user_id, &second, &login)
    );
    let versions = [a.unwrap().version, b.unwrap().version];
    assert!(versions.contains(&2) && versions.contains(&3));

    let issued: Vec<(Uuid, Option<Uuid>)> = store
        .fetch_history(user_id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|envelope| match envelope.payload {
            MaintenanceEvent::User(UserEvent::CredentialIssued(e)) => Some((e.credential_id, e.replaces)),
            _ => None,
        })
        .collect();

    // The later issue replaced the earlier one; neither observed an empty slot twice
    assert_eq!(issued.len(), 2);
    assert_eq!(issued[0].1, None);
    assert_eq!(issued[1].1, Some(issued[0].0));

    let user: UserAggregate = store.load_state(user_id).await.unwrap();
    assert_eq!(user.current_credential.map(|c| c.credential_id), Some(issued[1].0));
    assert_eq!(user.credentials_issued, 2);
}

#[tokio::test]
async fn test_held_lease_makes_exclusive_append_lock_unavailable() {
    let store = Arc::new(MaintenanceStore::in_memory().with_lock_timeout(StdDuration::from_millis(50)));
    let id = register_equipment(&store, "cmp-10").await;
    let other = register_equipment(&store, "cmp-11").await;

    let lease = store.acquire_lease(id).await.unwrap();

    let blocked = store
        .append_exclusive(EntityType::Equipment, id, vec![status_changed(EquipmentStatus::EnMantenimiento)])
        .await;
    assert!(matches!(blocked, Err(EventStoreError::LockUnavailable { .. })));
    assert_eq!(store.current_version(id).await.unwrap(), 1);

    // Other streams are not affected
    store
        .append_exclusive(EntityType::Equipment, other, vec![status_changed(EquipmentStatus::EnMantenimiento)])
        .await
        .unwrap();

    lease.release();
    store
        .append_exclusive(EntityType::Equipment, id, vec![status_changed(EquipmentStatus::EnMantenimiento)])
        .await
        .unwrap();
    assert_eq!(store.current_version(id).await.unwrap(), 2);
}

// ============================================================================
// Administration
// ============================================================================

#[tokio::test]
async fn test_rebuild_reproduces_incremental_snapshots() {
    let store = store();
    let id = register_equipment(&store, "cmp-12").await;
    let equipment = CommandHandler::<EquipmentAggregate>::new(store.clone());
    let meta = supervisor();
    equipment
        .handle(
            id,
            &EquipmentCommand::RecordMaintenance {
                work_order_id: Uuid::new_v4(),
                performed_at: Utc::now(),
            },
            &meta,
        )
        .await
        .unwrap();
    create_user(&store).await;
    CommandHandler::<ConfigurationAggregate>::new(store.clone())
        .handle(
            CONFIGURATION_STREAM_ID,
            &ConfigurationCommand::Initialize {
                company_name: "Planta Sur".to_string(),
                settings: BTreeMap::new(),
            },
            &meta,
        )
        .await
        .unwrap();

    let mut before = Vec::new();
    for stream in store.list_streams(None).await.unwrap() {
        before.push(store.load_snapshot(stream.entity, stream.stream_id).await.unwrap());
    }

    let report = store.rebuild_snapshots(None).await.unwrap();
    assert_eq!(report.streams, 3);
    assert_eq!(report.rebuilt, 3);
    assert_eq!(report.changed, 0);
    assert_eq!(report.skipped, 0);

    for snapshot in before {
        assert_eq!(
            store.load_snapshot(snapshot.entity, snapshot.stream_id).await.unwrap(),
            snapshot
        );
    }

    let only_users = store.rebuild_snapshots(Some(EntityType::User)).await.unwrap();
    assert_eq!(only_users.streams, 1);
}

#[tokio::test]
async fn test_reset_preserving_one_user() {
    let store = store();
    let user_id = create_user(&store).await;
    CommandHandler::<UserAggregate>::new(store.clone())
        .handle(user_id, &UserCommand::ChangeRole { role: UserRole::Supervisor }, &supervisor())
        .await
        .unwrap();
    for code in ["cmp-13", "cmp-14"] {
        register_equipment(&store, code).await;
    }
    store
        .start_stream(EntityType::Configuration, CONFIGURATION_STREAM_ID, vec![initialized()])
        .await
        .unwrap();
    CommandHandler::<RoutineAggregate>::new(store.clone())
        .handle(
            Uuid::new_v4(),
            &RoutineCommand::CreateRoutine {
                name: "Limpieza".to_string(),
                description: None,
                frequency_days: 30,
                tasks: vec![],
            },
            &supervisor(),
        )
        .await
        .unwrap();
    assert_eq!(store.list_streams(None).await.unwrap().len(), 5);

    let (history, snapshot, _) = observe(&store, user_id, EntityType::User).await;

    let outcome = store.reset_all_streams(Some(user_id)).await.unwrap();
    assert_eq!(outcome.removed_streams, 4);
    assert_eq!(outcome.preserved.as_ref().map(|h| h.stream_id), Some(user_id));

    let streams = store.list_streams(None).await.unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].stream_id, user_id);
    assert_eq!(streams[0].version, 2);

    assert_eq!(store.load_snapshot(EntityType::User, user_id).await.unwrap(), snapshot);
    let restored = store.fetch_history(user_id).await.unwrap();
    let ids: Vec<Uuid> = restored.iter().map(|e| e.event_id).collect();
    assert_eq!(ids, history.iter().map(|e| e.event_id).collect::<Vec<_>>());

    let audit = store
        .query_audit(&AuditFilter::default(), None, store.page_request(None, None).unwrap())
        .await
        .unwrap();
    assert_eq!(audit.total_count, 2);

    // Appends continue from the preserved version
    CommandHandler::<UserAggregate>::new(store.clone())
        .handle(user_id, &UserCommand::Disable { reason: None }, &supervisor())
        .await
        .unwrap();
    assert_eq!(store.current_version(user_id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_reset_without_preserve_empties_everything() {
    let store = store();
    register_equipment(&store, "cmp-15").await;

    let outcome = store.reset_all_streams(None).await.unwrap();
    assert_eq!(outcome.removed_streams, 1);
    assert!(outcome.preserved.is_none());
    assert!(store.list_streams(None).await.unwrap().is_empty());
}
