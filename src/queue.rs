//! Durable FIFO queue of mutations still owed to the server.
//!
//! Items are only ever inserted and deleted. An item stays in the queue from
//! `enqueue` until the sync engine confirms the remote call, or until it is
//! parked in the dead-letter store because it can never be dispatched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{Database, StoreError, DEAD_LETTER_STORE, QUEUE_STORE};
use crate::models::ActionType;

/// A pending mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Queue key; assigned by the store, increasing in insertion order.
    #[serde(skip)]
    pub id: i64,
    /// Raw dispatch key as persisted (normally an [`ActionType`]).
    #[serde(rename = "type")]
    pub kind: String,
    /// Domain body, forwarded verbatim.
    #[serde(default)]
    pub payload: Value,
    /// Epoch milliseconds at enqueue time.
    #[serde(default)]
    pub created_at: i64,
    /// Sent to the server so a retried submission can be deduplicated.
    #[serde(default)]
    pub idempotency_key: Option<Uuid>,
}

impl QueueItem {
    /// Parses the dispatch key.
    pub fn action_type(&self) -> Result<ActionType, String> {
        self.kind.parse()
    }

    /// Decodes a stored row. A row that does not have the expected shape is
    /// still returned, with an empty `kind` and the raw value as payload, so it
    /// can be parked instead of blocking the queue.
    fn from_row(id: i64, value: Value) -> Self {
        match serde_json::from_value::<QueueItem>(value.clone()) {
            Ok(mut item) => {
                item.id = id;
                item
            }
            Err(e) => {
                tracing::warn!("Queue item {} has an unexpected shape: {}", id, e);
                QueueItem {
                    id,
                    kind: String::new(),
                    payload: value,
                    created_at: 0,
                    idempotency_key: None,
                }
            }
        }
    }
}

/// A queue item that was moved aside because it cannot be dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    #[serde(skip)]
    pub id: i64,
    /// Queue key the item had before it was parked.
    pub original_id: i64,
    pub item: QueueItem,
    pub reason: String,
    pub parked_at: i64,
}

/// Append-only action queue on top of the `queue` store.
#[derive(Debug, Clone)]
pub struct ActionQueue {
    db: Database,
}

impl ActionQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Appends an action with a fresh key and the current timestamp.
    /// Identical payloads are not deduplicated.
    pub async fn enqueue(&self, action: ActionType, payload: Value) -> Result<i64, StoreError> {
        let item = QueueItem {
            id: 0,
            kind: action.to_string(),
            payload,
            created_at: Utc::now().timestamp_millis(),
            idempotency_key: Some(Uuid::new_v4()),
        };
        let record = serde_json::to_value(&item).map_err(|source| StoreError::Corrupt {
            store: QUEUE_STORE.to_string(),
            source,
        })?;
        let id = self.db.add(QUEUE_STORE, &record).await?;
        tracing::debug!("Enqueued {} action #{}", action, id);
        Ok(id)
    }

    /// All pending items in insertion order.
    pub async fn list(&self) -> Result<Vec<QueueItem>, StoreError> {
        let rows = self.db.scan(QUEUE_STORE).await?;
        Ok(rows
            .into_iter()
            .map(|(id, value)| QueueItem::from_row(id, value))
            .collect())
    }

    /// Deletes an item. Removing an id that is already gone is a no-op.
    pub async fn remove(&self, id: i64) -> Result<(), StoreError> {
        self.db.delete(QUEUE_STORE, id).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.db.count(QUEUE_STORE).await? as usize)
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Moves an item to the dead-letter store in one transaction.
    ///
    /// Returns the dead-letter id, or `None` if the item was no longer queued.
    pub async fn park(&self, item: &QueueItem, reason: &str) -> Result<Option<i64>, StoreError> {
        let letter = DeadLetter {
            id: 0,
            original_id: item.id,
            item: item.clone(),
            reason: reason.to_string(),
            parked_at: Utc::now().timestamp_millis(),
        };
        let value = serde_json::to_value(&letter).map_err(|source| StoreError::Corrupt {
            store: DEAD_LETTER_STORE.to_string(),
            source,
        })?;
        let parked = self
            .db
            .transfer(QUEUE_STORE, item.id, DEAD_LETTER_STORE, &value)
            .await?;
        if let Some(dead_id) = parked {
            tracing::warn!(
                "Parked queue item #{} as dead letter #{}: {}",
                item.id,
                dead_id,
                reason
            );
        }
        Ok(parked)
    }

    /// Parked items, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError> {
        let rows = self.db.scan(DEAD_LETTER_STORE).await?;
        rows.into_iter()
            .map(|(id, value)| {
                let mut letter: DeadLetter =
                    serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                        store: DEAD_LETTER_STORE.to_string(),
                        source,
                    })?;
                letter.id = id;
                letter.item.id = letter.original_id;
                Ok(letter)
            })
            .collect()
    }

    /// Puts a parked item back at the tail of the queue under a new id. The
    /// idempotency key is kept so the server can still recognise it.
    ///
    /// Returns the new queue id, or `None` if no such dead letter exists.
    pub async fn restore(&self, dead_id: i64) -> Result<Option<i64>, StoreError> {
        let letter = match self
            .dead_letters()
            .await?
            .into_iter()
            .find(|l| l.id == dead_id)
        {
            Some(letter) => letter,
            None => return Ok(None),
        };

        let record = serde_json::to_value(&letter.item).map_err(|source| StoreError::Corrupt {
            store: QUEUE_STORE.to_string(),
            source,
        })?;
        let restored = self
            .db
            .transfer(DEAD_LETTER_STORE, dead_id, QUEUE_STORE, &record)
            .await?;
        if let Some(id) = restored {
            tracing::info!("Restored dead letter #{} as queue item #{}", dead_id, id);
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    async fn test_queue() -> (ActionQueue, Database, TempDir) {
        let temp_dir = tempdir().unwrap();
        let db = init_db(Some(temp_dir.path().join("test.db"))).await.unwrap();
        (ActionQueue::new(db.clone()), db, temp_dir)
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let (queue, _db, _temp) = test_queue().await;

        let a = queue.enqueue(ActionType::Sleep, json!({"n": "a"})).await.unwrap();
        let b = queue
            .enqueue(ActionType::Exercise, json!({"n": "b"}))
            .await
            .unwrap();
        let c = queue
            .enqueue(ActionType::Meditation, json!({"n": "c"}))
            .await
            .unwrap();

        let items = queue.list().await.unwrap();
        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert!(a < b && b < c);
        assert_eq!(items[1].action_type().unwrap(), ActionType::Exercise);
    }

    #[tokio::test]
    async fn test_enqueue_keeps_payload_verbatim() {
        let (queue, _db, _temp) = test_queue().await;
        let payload = json!({"hours": 7, "quality": 4, "nested": {"list": [1, 2, 3]}});

        queue.enqueue(ActionType::Sleep, payload.clone()).await.unwrap();

        let items = queue.list().await.unwrap();
        assert_eq!(items[0].payload, payload);
        assert_eq!(items[0].kind, "sleep");
        assert!(items[0].created_at > 0);
        assert!(items[0].idempotency_key.is_some());
    }

    #[tokio::test]
    async fn test_identical_enqueues_are_not_deduplicated() {
        let (queue, _db, _temp) = test_queue().await;
        let payload = json!({"hours": 7});

        queue.enqueue(ActionType::Sleep, payload.clone()).await.unwrap();
        queue.enqueue(ActionType::Sleep, payload).await.unwrap();

        let items = queue.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_ne!(items[0].idempotency_key, items[1].idempotency_key);
    }

    #[tokio::test]
    async fn test_list_is_pure_read() {
        let (queue, _db, _temp) = test_queue().await;
        queue.enqueue(ActionType::Sleep, json!({})).await.unwrap();

        let first = queue.list().await.unwrap();
        let second = queue.list().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (queue, _db, _temp) = test_queue().await;
        let id = queue.enqueue(ActionType::Sleep, json!({})).await.unwrap();

        queue.remove(id).await.unwrap();
        queue.remove(id).await.unwrap();
        queue.remove(9999).await.unwrap();

        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_row_is_listed_with_empty_kind() {
        let (queue, db, _temp) = test_queue().await;
        db.add(QUEUE_STORE, &json!({"payload": {"hours": 7}}))
            .await
            .unwrap();

        let items = queue.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, "");
        assert!(items[0].action_type().is_err());
        assert_eq!(items[0].payload, json!({"payload": {"hours": 7}}));
    }

    #[tokio::test]
    async fn test_park_moves_item_to_dead_letters() {
        let (queue, _db, _temp) = test_queue().await;
        let a = queue.enqueue(ActionType::Sleep, json!({"n": 1})).await.unwrap();
        let b = queue.enqueue(ActionType::Sleep, json!({"n": 2})).await.unwrap();

        let item = queue.list().await.unwrap().remove(0);
        let dead_id = queue.park(&item, "no handler").await.unwrap();
        assert!(dead_id.is_some());

        let remaining: Vec<i64> = queue.list().await.unwrap().iter().map(|i| i.id).collect();
        assert_eq!(remaining, vec![b]);

        let letters = queue.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].original_id, a);
        assert_eq!(letters[0].item.id, a);
        assert_eq!(letters[0].item.payload, json!({"n": 1}));
        assert_eq!(letters[0].reason, "no handler");

        // Parking the same item again is a no-op
        assert!(queue.park(&item, "again").await.unwrap().is_none());
        assert_eq!(queue.dead_letters().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_requeues_at_tail_with_same_idempotency_key() {
        let (queue, _db, _temp) = test_queue().await;
        queue.enqueue(ActionType::Sleep, json!({"n": 1})).await.unwrap();
        let later = queue.enqueue(ActionType::Sleep, json!({"n": 2})).await.unwrap();

        let item = queue.list().await.unwrap().remove(0);
        let dead_id = queue.park(&item, "no handler").await.unwrap().unwrap();

        let restored = queue.restore(dead_id).await.unwrap().unwrap();
        assert!(restored > later);

        let items = queue.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, restored);
        assert_eq!(items[1].payload, json!({"n": 1}));
        assert_eq!(items[1].idempotency_key, item.idempotency_key);
        assert!(queue.dead_letters().await.unwrap().is_empty());

        assert!(queue.restore(dead_id).await.unwrap().is_none());
    }
}
