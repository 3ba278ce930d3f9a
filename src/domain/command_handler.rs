use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use super::{MaintenanceEvent, MaintenanceStore};
use crate::event_sourcing::concurrency::StreamLease;
use crate::event_sourcing::core::{Actor, Aggregate, DomainEvent, EventEnvelope, NewEvent};
use crate::event_sourcing::error::EventStoreError;
use crate::event_sourcing::store::AppendOutcome;
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};

// ============================================================================
// Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Event Store
//
// One handler per aggregate type. The current state is read from the
// snapshot, the aggregate decides, and the events are appended with the
// version that was read as the expected version.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CommandError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("Command rejected: {0}")]
    Rejected(#[source] E),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl<E> CommandError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn rejection(&self) -> Option<&E> {
        match self {
            CommandError::Rejected(e) => Some(e),
            CommandError::Store(_) => None,
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, CommandError::Store(e) if e.is_version_conflict())
    }
}

impl<E> IsTransient for CommandError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn is_transient(&self) -> bool {
        match self {
            CommandError::Rejected(_) => false,
            CommandError::Store(e) => e.is_transient(),
        }
    }
}

/// Who issues a command; copied onto every event it produces
#[derive(Debug, Clone, Default)]
pub struct CommandMetadata {
    pub actor: Actor,
    pub correlation_id: Option<Uuid>,
}

impl CommandMetadata {
    pub fn by(actor: Actor) -> Self {
        Self {
            actor,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    fn stamp(&self, event: NewEvent<MaintenanceEvent>) -> NewEvent<MaintenanceEvent> {
        let event = event.with_actor(self.actor.clone());
        match self.correlation_id {
            Some(correlation_id) => event.with_correlation(correlation_id),
            None => event,
        }
    }
}

/// Result of an accepted command
#[derive(Debug, Clone)]
pub struct CommandOutcome<A> {
    pub state: A,
    pub version: i64,
    pub events: Vec<EventEnvelope<MaintenanceEvent>>,
}

impl<A> CommandOutcome<A>
where
    A: Aggregate,
    A::Event: DomainEvent<Payload = MaintenanceEvent>,
{
    fn from_append(outcome: AppendOutcome<MaintenanceEvent>) -> Result<Self, EventStoreError> {
        Ok(Self {
            state: outcome.snapshot.decode::<A>()?,
            version: outcome.new_version(),
            events: outcome.events,
        })
    }
}

pub type CommandResult<A> = Result<CommandOutcome<A>, CommandError<<A as Aggregate>::Error>>;

pub struct CommandHandler<A> {
    store: Arc<MaintenanceStore>,
    retry: RetryConfig,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Clone for CommandHandler<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<A> CommandHandler<A>
where
    A: Aggregate,
    A::Event: DomainEvent<Payload = MaintenanceEvent>,
{
    pub fn new(store: Arc<MaintenanceStore>) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
            _aggregate: PhantomData,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Current state, `None` when the stream does not exist yet
    pub async fn load(&self, stream_id: Uuid) -> Result<Option<A>, EventStoreError> {
        match self.store.load_state::<A>(stream_id).await {
            Ok(state) => Ok(Some(state)),
            Err(EventStoreError::SnapshotNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Optimistic: a concurrent writer surfaces as a version conflict
    pub async fn handle(
        &self,
        stream_id: Uuid,
        command: &A::Command,
        meta: &CommandMetadata,
    ) -> CommandResult<A> {
        self.execute(None, stream_id, command, meta).await
    }

    /// Optimistic, re-reading and re-deciding on version conflicts
    pub async fn handle_with_retry(
        &self,
        stream_id: Uuid,
        command: &A::Command,
        meta: &CommandMetadata,
    ) -> CommandResult<A> {
        retry_on_transient(self.retry.clone(), move |attempt| {
            tracing::debug!(
                stream_id = %stream_id,
                entity = %A::entity_type(),
                attempt = attempt,
                "Handling command"
            );
            self.execute(None, stream_id, command, meta)
        })
        .await
        .into_result()
    }

    /// Exclusive: the stream lease is held across load, decide and append
    pub async fn handle_exclusive(
        &self,
        stream_id: Uuid,
        command: &A::Command,
        meta: &CommandMetadata,
    ) -> CommandResult<A> {
        let lease = self.store.acquire_lease(stream_id).await?;
        let result = self.execute(Some(&lease), stream_id, command, meta).await;
        lease.release();
        result
    }

    async fn execute(
        &self,
        lease: Option<&StreamLease>,
        stream_id: Uuid,
        command: &A::Command,
        meta: &CommandMetadata,
    ) -> CommandResult<A> {
        let state = self.load(stream_id).await?;
        let expected_version = state.as_ref().map_or(0, |s| s.version());

        let events = A::handle_command(state.as_ref(), command).map_err(|e| {
            tracing::debug!(
                stream_id = %stream_id,
                entity = %A::entity_type(),
                error = %e,
                "Command rejected"
            );
            CommandError::Rejected(e)
        })?;

        let events: Vec<NewEvent<MaintenanceEvent>> = events
            .into_iter()
            .map(|event| meta.stamp(NewEvent::from_event(event)))
            .collect();

        let outcome = match lease {
            Some(lease) => {
                self.store
                    .append_with_lease(lease, A::entity_type(), Some(expected_version), events)
                    .await?
            }
            None => {
                self.store
                    .append(A::entity_type(), stream_id, Some(expected_version), events)
                    .await?
            }
        };

        Ok(CommandOutcome::from_append(outcome)?)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
