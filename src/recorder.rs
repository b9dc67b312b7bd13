//! Write path for wellness sessions.
//!
//! Recording a session updates the domain's read model first, so history
//! renders the new value immediately, then appends the session to the action
//! queue so it survives restarts until the server acknowledges it. The two
//! writes are not one transaction; the queue is the record of what must still
//! reach the server.

use chrono::NaiveDate;

use crate::db::{Database, StoreError};
use crate::models::{ActionType, Session};
use crate::queue::ActionQueue;
use crate::read_model::LocalReadModel;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid session: {0}")]
    Invalid(String),
    #[error("Failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Acknowledgement for a session that is stored locally and waiting to sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub action: ActionType,
    pub day: NaiveDate,
    pub queue_id: i64,
}

impl std::fmt::Display for Recorded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Saved {} for {} locally, will sync (queued #{})",
            self.action, self.day, self.queue_id
        )
    }
}

#[derive(Debug, Clone)]
pub struct Recorder {
    db: Database,
    queue: ActionQueue,
}

impl Recorder {
    pub fn new(db: Database) -> Self {
        let queue = ActionQueue::new(db.clone());
        Self { db, queue }
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    /// Read model for the domain of `S`.
    pub fn read_model<S: Session>(&self) -> LocalReadModel<S::Entry> {
        LocalReadModel::for_session::<S>(self.db.clone())
    }

    /// Stores a session locally: read-model upsert, then enqueue.
    pub async fn record<S: Session>(&self, session: &S) -> Result<Recorded, RecordError> {
        session.validate().map_err(RecordError::Invalid)?;
        let payload = serde_json::to_value(session)?;
        let day = session.day();

        self.read_model::<S>()
            .upsert(day, &session.to_entry())
            .await?;
        let queue_id = self.queue.enqueue(S::ACTION, payload).await?;

        tracing::info!("Recorded {} session for {} (queued #{})", S::ACTION, day, queue_id);
        Ok(Recorded {
            action: S::ACTION,
            day,
            queue_id,
        })
    }
}
