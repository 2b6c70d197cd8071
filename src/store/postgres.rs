use async_trait::async_trait;
use tokio_postgres::Client;

use crate::domain::Subscription;
use crate::store::{StoreError, SubscriptionStore};

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Wraps an established connection and ensures the schema exists.
    pub async fn new(client: Client) -> Result<Self, StoreError> {
        client
            .execute(
                "CREATE TABLE IF NOT EXISTS push_subscriptions (
                    endpoint TEXT PRIMARY KEY,
                    p256dh TEXT NOT NULL,
                    auth TEXT NOT NULL,
                    topics TEXT[] NOT NULL DEFAULT '{}',
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
                &[],
            )
            .await?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SubscriptionStore for PostgresStore {
    async fn upsert(&self, subscription: Subscription) -> Result<bool, StoreError> {
        // Best-effort created-vs-updated: the pre-check and the upsert are
        // not atomic, and two concurrent first registrations may both report
        // creation. Status codes built on this flag are not safety-critical.
        let row = self
            .client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM push_subscriptions WHERE endpoint = $1)",
                &[&subscription.endpoint],
            )
            .await?;
        let exists: bool = row.get(0);

        self.client
            .execute(
                "INSERT INTO push_subscriptions (endpoint, p256dh, auth, topics)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (endpoint)
                 DO UPDATE SET p256dh = EXCLUDED.p256dh,
                               auth = EXCLUDED.auth,
                               topics = EXCLUDED.topics,
                               updated_at = NOW()",
                &[
                    &subscription.endpoint,
                    &subscription.p256dh,
                    &subscription.auth,
                    &subscription.topics,
                ],
            )
            .await?;

        Ok(!exists)
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<(), StoreError> {
        self.client
            .execute(
                "DELETE FROM push_subscriptions WHERE endpoint = $1",
                &[&endpoint],
            )
            .await?;
        Ok(())
    }

    async fn get_topics(&self, endpoint: &str) -> Result<Option<Vec<String>>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT topics FROM push_subscriptions WHERE endpoint = $1",
                &[&endpoint],
            )
            .await?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn get_subscription(&self, endpoint: &str) -> Result<Option<Subscription>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT endpoint, p256dh, auth, topics
                 FROM push_subscriptions
                 WHERE endpoint = $1",
                &[&endpoint],
            )
            .await?;

        Ok(row.map(|row| Subscription {
            endpoint: row.get(0),
            p256dh: row.get(1),
            auth: row.get(2),
            topics: row.get(3),
        }))
    }

    async fn list_for_topic(&self, topic: &str) -> Result<Vec<Subscription>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT endpoint, p256dh, auth, topics
                 FROM push_subscriptions
                 WHERE $1 = ANY(topics)",
                &[&topic],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Subscription {
                endpoint: row.get(0),
                p256dh: row.get(1),
                auth: row.get(2),
                topics: row.get(3),
            })
            .collect())
    }
}
