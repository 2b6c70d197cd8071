use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::domain::Subscription;
use crate::store::{StoreError, SubscriptionStore};

struct StoredSubscription {
    subscription: Subscription,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

/// In-memory store for tests and lightweight deployments.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, StoredSubscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn timestamps(&self, endpoint: &str) -> Option<(OffsetDateTime, OffsetDateTime)> {
        let rows = self.rows.lock().await;
        rows.get(endpoint)
            .map(|stored| (stored.created_at, stored.updated_at))
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn upsert(&self, subscription: Subscription) -> Result<bool, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut rows = self.rows.lock().await;

        match rows.get_mut(&subscription.endpoint) {
            Some(stored) => {
                stored.subscription = subscription;
                stored.updated_at = now;
                Ok(false)
            }
            None => {
                rows.insert(
                    subscription.endpoint.clone(),
                    StoredSubscription {
                        subscription,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<(), StoreError> {
        self.rows.lock().await.remove(endpoint);
        Ok(())
    }

    async fn get_topics(&self, endpoint: &str) -> Result<Option<Vec<String>>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get(endpoint)
            .map(|stored| stored.subscription.topics.clone()))
    }

    async fn get_subscription(&self, endpoint: &str) -> Result<Option<Subscription>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.get(endpoint).map(|stored| stored.subscription.clone()))
    }

    async fn list_for_topic(&self, topic: &str) -> Result<Vec<Subscription>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|stored| stored.subscription.topics.iter().any(|t| t == topic))
            .map(|stored| stored.subscription.clone())
            .collect())
    }
}
