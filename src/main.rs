use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use maintenance_store::config::StoreConfig;
use maintenance_store::domain::configuration::{
    ConfigurationAggregate, ConfigurationCommand, ConfigurationError, CONFIGURATION_STREAM_ID,
};
use maintenance_store::domain::employee::{EmployeeAggregate, EmployeeCommand};
use maintenance_store::domain::equipment::{EquipmentAggregate, EquipmentCommand};
use maintenance_store::domain::routine::{RoutineAggregate, RoutineCommand};
use maintenance_store::domain::user::{UserAggregate, UserCommand, UserRole};
use maintenance_store::domain::work_order::{WorkOrderAggregate, WorkOrderCommand};
use maintenance_store::domain::{
    BusinessModule, CommandHandler, CommandMetadata, EntityType, MaintenanceEvent, MaintenanceStore,
};
use maintenance_store::event_sourcing::concurrency::InProcessStreamLocks;
use maintenance_store::event_sourcing::core::Actor;
use maintenance_store::event_sourcing::projection::AuditFilter;
use maintenance_store::event_sourcing::query::{OrderBy, SnapshotFilter};
use maintenance_store::event_sourcing::store::PostgresStorage;
use maintenance_store::metrics::{start_metrics_server, StoreMetrics};

#[tokio::main]
async fn main() -> Result<()> {
    let config = StoreConfig::from_env().context("Invalid MAINTENANCE_* configuration")?;

    // Structured logging; RUST_LOG overrides the configured default
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .init();

    tracing::info!("🚀 Starting machinery maintenance event store");

    // === 1. Metrics ===
    let metrics = Arc::new(StoreMetrics::new()?);
    if let Some(port) = config.metrics_port {
        spawn_metrics_server(metrics.clone(), port);
    }

    // === 2. Storage backend ===
    let store = Arc::new(build_store(&config).await?.with_metrics(metrics.clone()));

    // === 3. Walk through a maintenance cycle ===
    run_lifecycle(store.clone()).await?;

    // === 4. Administration ===
    let mismatches = store.verify_snapshots().await?;
    tracing::info!(mismatches = mismatches.len(), "Snapshot verification finished");

    let report = store.rebuild_snapshots(None).await?;
    tracing::info!(
        streams = report.streams,
        changed = report.changed,
        "Snapshot rebuild finished"
    );

    tracing::info!(
        "📊 Metrics registry holds {} metric families",
        metrics.registry().gather().len()
    );
    tracing::info!("✅ Demo finished");
    Ok(())
}

async fn build_store(config: &StoreConfig) -> Result<MaintenanceStore> {
    let store = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL...");
            let storage = PostgresStorage::<MaintenanceEvent>::connect(url, config.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            storage.migrate().await.context("Failed to create the event store schema")?;
            MaintenanceStore::new(Arc::new(storage), Arc::new(InProcessStreamLocks::new()))
        }
        None => {
            tracing::info!("No database configured, using the in-memory backend");
            MaintenanceStore::in_memory()
        }
    };
    Ok(store.with_config(config))
}

/// The metrics server runs on its own thread and actix runtime
fn spawn_metrics_server(metrics: Arc<StoreMetrics>, port: u16) {
    let registry = Arc::new(metrics.registry().clone());
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(start_metrics_server(registry, port)) {
            tracing::error!("Metrics server error: {}", e);
        }
    });
}

async fn run_lifecycle(store: Arc<MaintenanceStore>) -> Result<()> {
    let supervisor = CommandMetadata::by(Actor::new(Uuid::new_v4(), "Supervisor de planta"))
        .with_correlation(Uuid::new_v4());

    // Global configuration: a second run against the same database finds it initialized
    let configuration = CommandHandler::<ConfigurationAggregate>::new(store.clone());
    let initialize = ConfigurationCommand::Initialize {
        company_name: "Planta Norte".to_string(),
        settings: BTreeMap::from([("timezone".to_string(), "America/Bogota".to_string())]),
    };
    match configuration.handle(CONFIGURATION_STREAM_ID, &initialize, &supervisor).await {
        Ok(outcome) => tracing::info!(version = outcome.version, "Configuration initialized"),
        Err(e) if e.rejection() == Some(&ConfigurationError::AlreadyInitialized) => {
            tracing::info!("Configuration already initialized")
        }
        Err(e) => return Err(e.into()),
    }

    // Equipment, staff and the routine that ties them together
    let equipment_id = Uuid::new_v4();
    CommandHandler::<EquipmentAggregate>::new(store.clone())
        .handle(
            equipment_id,
            &EquipmentCommand::RegisterEquipment {
                code: format!("CMP-{}", &equipment_id.simple().to_string()[..6]),
                name: "Compresor de tornillo".to_string(),
                area: "Sala de máquinas".to_string(),
                manufacturer: Some("Atlas Copco".to_string()),
                model: Some("GA 37".to_string()),
                serial_number: None,
            },
            &supervisor,
        )
        .await?;

    let employees = CommandHandler::<EmployeeAggregate>::new(store.clone());
    let mut crew = Vec::new();
    for (document_id, first_name, last_name) in [("1020304050", "Carlos", "Gómez"), ("1122334455", "Lucía", "Ramírez")] {
        let employee_id = Uuid::new_v4();
        employees
            .handle(
                employee_id,
                &EmployeeCommand::RegisterEmployee {
                    document_id: document_id.to_string(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    position: "Técnico mecánico".to_string(),
                    email: None,
                },
                &supervisor,
            )
            .await?;
        crew.push(employee_id);
    }

    let routine_id = Uuid::new_v4();
    let routines = CommandHandler::<RoutineAggregate>::new(store.clone());
    routines
        .handle(
            routine_id,
            &RoutineCommand::CreateRoutine {
                name: "Cambio de aceite".to_string(),
                description: Some("Cada 2000 horas de operación".to_string()),
                frequency_days: 90,
                tasks: vec!["Drenar aceite".to_string(), "Cambiar filtro".to_string()],
            },
            &supervisor,
        )
        .await?;
    routines
        .handle(routine_id, &RoutineCommand::LinkEquipment { equipment_id }, &supervisor)
        .await?;

    // Work order through its whole status machine
    let work_order_id = Uuid::new_v4();
    let work_orders = CommandHandler::<WorkOrderAggregate>::new(store.clone());
    let steps = vec![
        WorkOrderCommand::CreateWorkOrder {
            code: format!("OT-{}", &work_order_id.simple().to_string()[..6]),
            title: "Cambio de aceite compresor".to_string(),
            description: None,
            equipment_id,
            routine_id: Some(routine_id),
            scheduled_for: Some(Utc::now() + Duration::days(1)),
        },
        WorkOrderCommand::AssignEmployees { employee_ids: crew.clone() },
        WorkOrderCommand::StartWork,
        WorkOrderCommand::RecordProgress { percentage: 50, note: Some("Aceite drenado".to_string()) },
        WorkOrderCommand::CompleteExecution { observations: Some("Filtro reemplazado".to_string()) },
    ];
    for step in &steps {
        let outcome = work_orders.handle_with_retry(work_order_id, step, &supervisor).await?;
        tracing::info!(
            work_order_id = %work_order_id,
            version = outcome.version,
            status = ?outcome.state.status,
            "Work order updated"
        );
    }

    CommandHandler::<EquipmentAggregate>::new(store.clone())
        .handle(
            equipment_id,
            &EquipmentCommand::RecordMaintenance { work_order_id, performed_at: Utc::now() },
            &supervisor,
        )
        .await?;

    // A user logging in from several devices at once keeps exactly one credential
    let user_id = Uuid::new_v4();
    let users = CommandHandler::<UserAggregate>::new(store.clone());
    users
        .handle(
            user_id,
            &UserCommand::CreateUser {
                username: format!("tecnico-{}", &user_id.simple().to_string()[..6]),
                display_name: "Carlos Gómez".to_string(),
                role: UserRole::Tecnico,
                employee_id: crew.first().copied(),
                password_hash: "opaque-hash-from-auth-service".to_string(),
            },
            &supervisor,
        )
        .await?;

    let login = CommandMetadata::by(Actor::new(user_id, "login"));
    let expires_at = Utc::now() + Duration::hours(8);
    let issues: Vec<UserCommand> = (0..3)
        .map(|_| UserCommand::IssueCredential { credential_id: Uuid::new_v4(), expires_at })
        .collect();
    let results = futures_util::future::join_all(
        issues.iter().map(|command| users.handle_exclusive(user_id, command, &login)),
    )
    .await;
    for result in results {
        result?;
    }
    let user = users.load(user_id).await?.context("user stream vanished")?;
    tracing::info!(
        credentials_issued = user.credentials_issued,
        current = ?user.current_credential.as_ref().map(|c| c.credential_id),
        "Credentials issued under exclusive lease"
    );

    // Reads: completed work orders, newest audit records of one module
    let page = store.page_request(Some(1), Some(10))?;
    let completed = store
        .query_states::<WorkOrderAggregate>(
            &SnapshotFilter::all().eq("status", json!("EjecucionCompleta")),
            Some(&OrderBy::desc("code")),
            page,
        )
        .await?;
    tracing::info!(
        total = completed.total_count,
        pages = completed.total_pages,
        "Completed work orders"
    );

    let audit = store
        .query_audit(&AuditFilter::for_module(BusinessModule::OrdenesDeTrabajo), None, page)
        .await?;
    for record in &audit.data {
        tracing::info!(
            module = %record.module,
            event_type = %record.event_type,
            version = record.stream_version,
            actor = ?record.actor_name,
            "Audit"
        );
    }

    let equipment = store.list_streams(Some(EntityType::Equipment)).await?;
    tracing::info!(count = equipment.len(), "Equipment streams");
    Ok(())
}
