use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use maintenance_store::domain::equipment::{EquipmentAggregate, EquipmentCommand, EquipmentStatus};
use maintenance_store::domain::work_order::{WorkOrderAggregate, WorkOrderCommand};
use maintenance_store::domain::{CommandError, CommandHandler, CommandMetadata, MaintenanceStore};
use maintenance_store::event_sourcing::core::Actor;
use maintenance_store::event_sourcing::projection::AuditFilter;

// ============================================================================
// Generated histories: whatever sequence of commands is accepted, the
// inline snapshot must equal a full replay and every event must be audited.
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Retitle(String),
    Assign(u8),
    Start,
    Progress(u8),
    Complete,
    DeleteOrder,
    EquipmentStatus(u8),
    Maintenance(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[A-Za-z ]{0,12}".prop_map(Op::Retitle),
        (0u8..4).prop_map(Op::Assign),
        Just(Op::Start),
        (0u8..=120).prop_map(Op::Progress),
        Just(Op::Complete),
        Just(Op::DeleteOrder),
        (0u8..3).prop_map(Op::EquipmentStatus),
        (-30i64..30).prop_map(Op::Maintenance),
    ]
}

fn status(index: u8) -> EquipmentStatus {
    match index {
        0 => EquipmentStatus::Operativo,
        1 => EquipmentStatus::EnMantenimiento,
        _ => EquipmentStatus::FueraDeServicio,
    }
}

/// Business rejections are expected; anything else is a failure
fn accept<A, E>(result: Result<A, CommandError<E>>) -> Result<(), TestCaseError>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(_) | Err(CommandError::Rejected(_)) => Ok(()),
        Err(CommandError::Store(e)) => Err(TestCaseError::fail(format!("store error: {}", e))),
    }
}

async fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let store = Arc::new(MaintenanceStore::in_memory());
    let meta = CommandMetadata::by(Actor::named("Planificador"));
    let work_orders = CommandHandler::<WorkOrderAggregate>::new(store.clone());
    let equipment = CommandHandler::<EquipmentAggregate>::new(store.clone());

    let equipment_id = Uuid::new_v4();
    let order_id = Uuid::new_v4();
    let base = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();

    accept(
        equipment
            .handle(
                equipment_id,
                &EquipmentCommand::RegisterEquipment {
                    code: "ext-01".to_string(),
                    name: "Extrusora".to_string(),
                    area: "Producción".to_string(),
                    manufacturer: None,
                    model: None,
                    serial_number: None,
                },
                &meta,
            )
            .await,
    )?;
    accept(
        work_orders
            .handle(
                order_id,
                &WorkOrderCommand::CreateWorkOrder {
                    code: "OT-9000".to_string(),
                    title: "Mantenimiento extrusora".to_string(),
                    description: None,
                    equipment_id,
                    routine_id: None,
                    scheduled_for: None,
                },
                &meta,
            )
            .await,
    )?;

    for op in ops {
        match op {
            Op::Retitle(title) => {
                let command = WorkOrderCommand::UpdateDetails {
                    title: Some(title),
                    description: None,
                    scheduled_for: None,
                };
                accept(work_orders.handle(order_id, &command, &meta).await)?
            }
            Op::Assign(count) => {
                let command = WorkOrderCommand::AssignEmployees {
                    employee_ids: (0..count).map(|_| Uuid::new_v4()).collect(),
                };
                accept(work_orders.handle(order_id, &command, &meta).await)?
            }
            Op::Start => accept(work_orders.handle(order_id, &WorkOrderCommand::StartWork, &meta).await)?,
            Op::Progress(percentage) => {
                let command = WorkOrderCommand::RecordProgress { percentage, note: None };
                accept(work_orders.handle(order_id, &command, &meta).await)?
            }
            Op::Complete => {
                let command = WorkOrderCommand::CompleteExecution { observations: None };
                accept(work_orders.handle(order_id, &command, &meta).await)?
            }
            Op::DeleteOrder => {
                let command = WorkOrderCommand::DeleteWorkOrder { reason: None };
                accept(work_orders.handle(order_id, &command, &meta).await)?
            }
            Op::EquipmentStatus(index) => {
                let command = EquipmentCommand::ChangeStatus { status: status(index) };
                accept(equipment.handle(equipment_id, &command, &meta).await)?
            }
            Op::Maintenance(days) => {
                let command = EquipmentCommand::RecordMaintenance {
                    work_order_id: order_id,
                    performed_at: base + Duration::days(days),
                };
                accept(equipment.handle(equipment_id, &command, &meta).await)?
            }
        }

        // Read-after-write after every step
        let cached: WorkOrderAggregate = store.load_state(order_id).await.map_err(fail)?;
        let replayed: WorkOrderAggregate = store.load_aggregate(order_id).await.map_err(fail)?;
        prop_assert_eq!(cached, replayed);
    }

    let mismatches = store.verify_snapshots().await.map_err(fail)?;
    prop_assert!(mismatches.is_empty(), "diverging snapshots: {:?}", mismatches);

    let report = store.rebuild_snapshots(None).await.map_err(fail)?;
    prop_assert_eq!(report.changed, 0);
    prop_assert_eq!(report.rebuilt, 2);

    let page = store.page_request(Some(1), Some(100)).map_err(fail)?;
    for stream_id in [equipment_id, order_id] {
        let events = store.fetch_history(stream_id).await.map_err(fail)?;
        let versions: Vec<i64> = events.iter().map(|e| e.stream_version).collect();
        prop_assert_eq!(versions, (1..=events.len() as i64).collect::<Vec<_>>());

        let audit = store
            .query_audit(&AuditFilter::for_stream(stream_id), None, page)
            .await
            .map_err(fail)?;
        prop_assert_eq!(audit.total_count as usize, events.len());
    }

    let order: WorkOrderAggregate = store.load_state(order_id).await.map_err(fail)?;
    prop_assert!(order.progress <= 100);
    Ok(())
}

fn fail(e: impl std::fmt::Display) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_snapshots_equal_replay(ops in prop::collection::vec(op(), 0..24)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(run(ops))?;
    }
}
