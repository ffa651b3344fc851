use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    messages::{generate_id, EncryptedMessage},
    Result,
};

/// Stored envelope awaiting pickup.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    /// Queue id, acknowledged by the recipient once delivered.
    pub id: String,
    pub recipient_key: Option<String>,
    pub payload: EncryptedMessage,
}

/// Store-and-forward queue, per relationship.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn add(
        &self,
        connection_id: &str,
        recipient_key: Option<&str>,
        payload: EncryptedMessage,
    ) -> Result<()>;
    /// Up to `limit` messages in arrival order, only those for
    /// `recipient_key` when it is given. Nothing is removed.
    async fn peek(
        &self,
        connection_id: &str,
        recipient_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueuedMessage>>;
    /// Like [`MessageQueue::peek`] but removes what it returns.
    async fn take(
        &self,
        connection_id: &str,
        recipient_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueuedMessage>>;
    /// Drops the messages with the given ids, returns how many were found.
    async fn remove(&self, connection_id: &str, ids: &[String]) -> Result<usize>;
    async fn count(&self, connection_id: &str) -> Result<usize>;
}

fn is_for(message: &QueuedMessage, recipient_key: Option<&str>) -> bool {
    recipient_key.is_none() || message.recipient_key.as_deref() == recipient_key
}

#[derive(Default)]
pub struct InMemoryMessageQueue {
    messages: Mutex<HashMap<String, VecDeque<QueuedMessage>>>,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn add(
        &self,
        connection_id: &str,
        recipient_key: Option<&str>,
        payload: EncryptedMessage,
    ) -> Result<()> {
        self.messages
            .lock()
            .await
            .entry(connection_id.into())
            .or_default()
            .push_back(QueuedMessage {
                id: generate_id(),
                recipient_key: recipient_key.map(String::from),
                payload,
            });
        debug!("queued message for connection {}", connection_id);
        Ok(())
    }

    async fn peek(
        &self,
        connection_id: &str,
        recipient_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueuedMessage>> {
        Ok(self
            .messages
            .lock()
            .await
            .get(connection_id)
            .map(|queue| {
                queue
                    .iter()
                    .filter(|m| is_for(m, recipient_key))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn take(
        &self,
        connection_id: &str,
        recipient_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueuedMessage>> {
        let mut messages = self.messages.lock().await;
        let queue = match messages.get_mut(connection_id) {
            Some(queue) => queue,
            None => return Ok(vec![]),
        };
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());
        while let Some(message) = queue.pop_front() {
            if is_for(&message, recipient_key) && taken.len() < limit {
                taken.push(message);
            } else {
                kept.push_back(message);
            }
        }
        *queue = kept;
        Ok(taken)
    }

    async fn remove(&self, connection_id: &str, ids: &[String]) -> Result<usize> {
        let mut messages = self.messages.lock().await;
        let queue = match messages.get_mut(connection_id) {
            Some(queue) => queue,
            None => return Ok(0),
        };
        let before = queue.len();
        queue.retain(|m| !ids.contains(&m.id));
        Ok(before - queue.len())
    }

    async fn count(&self, connection_id: &str) -> Result<usize> {
        Ok(self
            .messages
            .lock()
            .await
            .get(connection_id)
            .map(VecDeque::len)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(tag: &str) -> EncryptedMessage {
        EncryptedMessage {
            protected: "cHJvdGVjdGVk".into(),
            recipients: vec![],
            iv: "aXY".into(),
            ciphertext: "Y3Q".into(),
            tag: tag.into(),
        }
    }

    #[tokio::test]
    async fn takes_in_order_filtered_by_key() {
        let queue = InMemoryMessageQueue::new();
        queue.add("c1", Some("k1"), envelope("a")).await.unwrap();
        queue.add("c1", Some("k2"), envelope("b")).await.unwrap();
        queue.add("c1", Some("k1"), envelope("c")).await.unwrap();
        assert_eq!(queue.count("c1").await.unwrap(), 3);

        let taken = queue.take("c1", Some("k1"), 10).await.unwrap();
        assert_eq!(
            taken.iter().map(|m| m.payload.tag.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        assert_eq!(queue.count("c1").await.unwrap(), 1);

        assert!(queue.take("unknown", None, 10).await.unwrap().is_empty());
        assert_eq!(queue.take("c1", None, 1).await.unwrap().len(), 1);
        assert_eq!(queue.count("c1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn peeked_messages_stay_until_removed() {
        let queue = InMemoryMessageQueue::new();
        queue.add("c1", Some("k1"), envelope("a")).await.unwrap();
        queue.add("c1", Some("k1"), envelope("b")).await.unwrap();

        let peeked = queue.peek("c1", None, 1).await.unwrap();
        assert_eq!(peeked.len(), 1);
        assert_eq!(queue.count("c1").await.unwrap(), 2);

        let ids = vec![peeked[0].id.clone(), "unknown".to_string()];
        assert_eq!(queue.remove("c1", &ids).await.unwrap(), 1);
        let left = queue.peek("c1", None, 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload.tag, "b");
        assert_eq!(queue.remove("other", &ids).await.unwrap(), 0);
    }
}
