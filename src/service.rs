use std::sync::Arc;

use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::domain::{self, NotificationPayload, Subscription};
use crate::push::PushDispatcher;
use crate::ratelimit::RateLimiter;
use crate::store::{StoreError, SubscriptionStore};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Every supplied topic was blank.
    #[error("subscription topics are empty after normalization")]
    EmptyTopics,

    #[error("failed to marshal notification payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates credentials, normalization, the store and the dispatcher.
pub struct Service {
    hub_ui_code: String,
    hub_secret: String,
    store: Arc<dyn SubscriptionStore>,
    limiter: RateLimiter,
    dispatcher: Arc<PushDispatcher>,
}

impl Service {
    pub fn new(
        hub_ui_code: String,
        hub_secret: String,
        store: Arc<dyn SubscriptionStore>,
        limiter: RateLimiter,
        dispatcher: Arc<PushDispatcher>,
    ) -> Self {
        Self {
            hub_ui_code,
            hub_secret,
            store,
            limiter,
            dispatcher,
        }
    }

    pub fn allow_subscribe(&self, ip: &str) -> bool {
        self.limiter.allow(ip)
    }

    pub fn validate_ui_code(&self, code: &str) -> bool {
        secure_compare(&self.hub_ui_code, code)
    }

    pub fn validate_hub_secret(&self, secret: &str) -> bool {
        secure_compare(&self.hub_secret, secret)
    }

    /// Normalizes topics and upserts. Returns whether a new subscription was
    /// created, along with the topics as stored.
    pub async fn subscribe(
        &self,
        subscription: Subscription,
    ) -> Result<(bool, Vec<String>), ServiceError> {
        let mut topics = domain::normalize_topics(&subscription.topics);
        if topics.is_empty() {
            if !subscription.topics.is_empty() {
                return Err(ServiceError::EmptyTopics);
            }
            topics = vec![domain::DEFAULT_TOPIC.to_string()];
        }

        let created = self
            .store
            .upsert(Subscription {
                topics: topics.clone(),
                ..subscription
            })
            .await?;

        Ok((created, topics))
    }

    pub async fn unsubscribe(&self, endpoint: &str) -> Result<(), StoreError> {
        self.store.delete_by_endpoint(endpoint).await
    }

    /// Reports `("active", topics)` for a registered endpoint and
    /// `("inactive", [])` otherwise.
    pub async fn subscriptions_me(
        &self,
        endpoint: &str,
    ) -> Result<(&'static str, Vec<String>), StoreError> {
        match self.store.get_topics(endpoint).await? {
            Some(topics) => Ok(("active", topics)),
            None => Ok(("inactive", Vec::new())),
        }
    }

    /// Resolves the targets for `topic` and, unless `dry_run`, hands them to
    /// the dispatcher on a background task so the caller never blocks on a
    /// full queue. Returns the target count either way.
    pub async fn trigger_topic(
        &self,
        topic: &str,
        payload: Vec<u8>,
        dry_run: bool,
    ) -> Result<usize, StoreError> {
        let targets = self.store.list_for_topic(domain::normalize_topic(topic)).await?;
        let count = targets.len();

        if !dry_run {
            let dispatcher = Arc::clone(&self.dispatcher);
            let payload = Arc::new(payload);
            tokio::spawn(async move {
                dispatcher.enqueue_many(targets, payload).await;
            });
        }

        Ok(count)
    }

    /// Sends the fixed self-test notification to a single endpoint, if it is
    /// registered. Returns the number of targets (0 or 1).
    pub async fn trigger_self(&self, endpoint: &str) -> Result<usize, ServiceError> {
        let Some(target) = self.store.get_subscription(endpoint).await? else {
            return Ok(0);
        };

        let payload = serde_json::to_vec(&NotificationPayload {
            title: "Test notification".to_string(),
            body: "Your Notification Hub is wired up.".to_string(),
            url: "/".to_string(),
        })?;

        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            dispatcher.enqueue(target, Arc::new(payload)).await;
        });

        Ok(1)
    }
}

/// Constant-time string equality; an empty configured value fails closed.
fn secure_compare(expected: &str, actual: &str) -> bool {
    if expected.is_empty() || actual.is_empty() {
        return false;
    }
    if expected.len() != actual.len() {
        return false;
    }
    bool::from(expected.as_bytes().ct_eq(actual.as_bytes()))
}
