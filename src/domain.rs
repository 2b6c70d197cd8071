use serde::{Deserialize, Serialize};

/// Topic assigned when a registration does not name one.
pub const DEFAULT_TOPIC: &str = "default";

/// One browser endpoint willing to receive notifications.
///
/// The `endpoint` URL is the identity of a subscription; re-registering the
/// same endpoint replaces its credentials and topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub topics: Vec<String>,
}

/// The JSON document delivered to service workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub url: String,
}

/// Resolves the topic a trigger targets: empty means `default`, anything
/// else is used verbatim.
pub fn normalize_topic(topic: &str) -> &str {
    if topic.is_empty() { DEFAULT_TOPIC } else { topic }
}

/// Trims topics, discards blanks and collapses duplicates, preserving the
/// order of first appearance.
pub fn normalize_topics(topics: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for topic in topics {
        let trimmed = topic.trim();
        if trimmed.is_empty() || normalized.iter().any(|existing| existing == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_string());
    }
    normalized
}
