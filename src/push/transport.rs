use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;

use crate::domain::Subscription;
use crate::push::vapid::VapidConfig;

/// `Topic` header sent with every message so the push service collapses
/// superseded notifications instead of queueing them.
pub const COLLAPSE_TOPIC: &str = "lectures-on-tap";

#[derive(Debug, Error)]
pub enum TransportError {
    /// The message could not be built, typically because the stored
    /// subscription keys are malformed. Not retryable.
    #[error("failed to build push message: {0}")]
    Message(#[from] web_push::WebPushError),

    /// The HTTP request to the push service failed. Retryable.
    #[error("push request failed: {0}")]
    Network(String),
}

/// One Web Push transmission: encrypt, sign, POST, report the raw status.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn transmit(
        &self,
        subscription: &Subscription,
        payload: &[u8],
    ) -> Result<StatusCode, TransportError>;
}

pub struct WebPushTransport {
    vapid: VapidConfig,
    ttl: u32,
    client: reqwest::Client,
}

impl WebPushTransport {
    pub fn new(vapid: VapidConfig, ttl: u32) -> Self {
        Self {
            vapid,
            ttl,
            client: reqwest::Client::new(),
        }
    }

    /// Encrypts `payload` to the subscription keys (aes128gcm) and signs a
    /// VAPID JWT scoped to the endpoint origin.
    fn build_message(
        &self,
        subscription: &Subscription,
        payload: &[u8],
    ) -> Result<web_push::WebPushMessage, web_push::WebPushError> {
        let subscription_info = web_push::SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh.clone(),
            subscription.auth.clone(),
        );

        let mut builder = web_push::WebPushMessageBuilder::new(&subscription_info)?;
        builder.set_payload(web_push::ContentEncoding::Aes128Gcm, payload);
        builder.set_ttl(self.ttl);

        let mut signature_builder = web_push::VapidSignatureBuilder::from_base64(
            &self.vapid.private_key,
            web_push::URL_SAFE_NO_PAD,
            &subscription_info,
        )?;
        signature_builder.add_claim("sub", self.vapid.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);

        builder.build()
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn transmit(
        &self,
        subscription: &Subscription,
        payload: &[u8],
    ) -> Result<StatusCode, TransportError> {
        let message = self.build_message(subscription, payload)?;

        let mut request = self
            .client
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string())
            .header("Urgency", "high")
            .header("Topic", COLLAPSE_TOPIC);

        if let Some(payload) = message.payload {
            request = request.header("Content-Encoding", encoding_header(&payload.content_encoding));
            for (name, value) in payload.crypto_headers {
                request = request.header(name, value);
            }
            request = request.body(payload.content);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        Ok(response.status())
    }
}

fn encoding_header(encoding: &web_push::ContentEncoding) -> &'static str {
    if matches!(encoding, web_push::ContentEncoding::AesGcm) {
        "aesgcm"
    } else {
        "aes128gcm"
    }
}
