use gateway_api::MeasureEnvelope;
use gateway_api::MessageId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::time::Instant;

/// A measure message published but not acknowledged yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub message_id: MessageId,

    /// The measure message as published
    pub payload: MeasureEnvelope,

    pub created_at: Instant,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("A message is already pending with the id {message_id}")]
pub struct DuplicateKeyError {
    pub message_id: MessageId,
}

/// Links the identifiers of the measure messages awaiting acknowledgement to these messages.
///
/// A correlator is shared by the publishers and the task processing the acknowledgements:
/// all the accesses are serialized by a lock around the table of pending messages.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: Mutex<HashMap<MessageId, PendingMessage>>,
}

impl Correlator {
    pub fn new() -> Self {
        Correlator::default()
    }

    /// Register a message as pending, unless a message is already pending under the same id.
    pub fn track(
        &self,
        message_id: MessageId,
        payload: MeasureEnvelope,
    ) -> Result<(), DuplicateKeyError> {
        match self.lock().entry(message_id) {
            Entry::Occupied(entry) => Err(DuplicateKeyError {
                message_id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let message_id = entry.key().clone();
                entry.insert(PendingMessage {
                    message_id,
                    payload,
                    created_at: Instant::now(),
                });
                Ok(())
            }
        }
    }

    /// Remove and return the pending message with that id, if any.
    ///
    /// `None` is returned for unknown ids, e.g. for a duplicated or late acknowledgement.
    pub fn resolve(&self, message_id: &MessageId) -> Option<PendingMessage> {
        self.lock().remove(message_id)
    }

    /// Remove and return all the pending messages, oldest first.
    pub fn drain(&self) -> Vec<PendingMessage> {
        let mut pending: Vec<_> = self.lock().drain().map(|(_, message)| message).collect();
        pending.sort_by_key(|message| message.created_at);
        pending
    }

    /// Remove and return the messages pending for longer than the given time-to-live, oldest first.
    pub fn evict_older_than(&self, ttl: Duration) -> Vec<PendingMessage> {
        let now = Instant::now();
        let mut pending = self.lock();
        let expired_ids: Vec<_> = pending
            .values()
            .filter(|message| now.saturating_duration_since(message.created_at) > ttl)
            .map(|message| message.message_id.clone())
            .collect();

        let mut expired: Vec<_> = expired_ids
            .iter()
            .filter_map(|message_id| pending.remove(message_id))
            .collect();
        expired.sort_by_key(|message| message.created_at);
        expired
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.lock().contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The table is left consistent by every operation, even if a panic occurred while locked
    fn lock(&self) -> MutexGuard<'_, HashMap<MessageId, PendingMessage>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
