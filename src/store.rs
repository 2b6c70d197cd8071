use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Subscription;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),
}

/// Durable endpoint-keyed subscription storage.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Inserts `subscription` or, on endpoint collision, replaces its
    /// credentials and topics. Returns whether a new row was created.
    async fn upsert(&self, subscription: Subscription) -> Result<bool, StoreError>;

    /// Removes the subscription for `endpoint`. Idempotent.
    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<(), StoreError>;

    async fn get_topics(&self, endpoint: &str) -> Result<Option<Vec<String>>, StoreError>;

    async fn get_subscription(&self, endpoint: &str) -> Result<Option<Subscription>, StoreError>;

    /// Every subscription whose topic set contains `topic`, in no particular
    /// order.
    async fn list_for_topic(&self, topic: &str) -> Result<Vec<Subscription>, StoreError>;
}
