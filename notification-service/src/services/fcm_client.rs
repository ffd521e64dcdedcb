/// FCM integration (using shared library).
///
/// Thin adapter over `nova-fcm-shared`'s `FCMClient`, mirroring
/// `apns_client.rs`'s wrapper so the worker pool can treat both gateways
/// through the same shape.
use nova_fcm_shared::{FcmAndroidConfig, FCMClient as NovaFcmClient, ServiceAccountKey};
use serde::{Deserialize, Serialize};

pub use nova_fcm_shared::ServiceAccountKey as FcmServiceAccountKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FCMSendResult {
    pub message_id: String,
    pub success: bool,
    pub error: Option<String>,
}

impl From<nova_fcm_shared::FCMSendResult> for FCMSendResult {
    fn from(r: nova_fcm_shared::FCMSendResult) -> Self {
        Self {
            message_id: r.message_id,
            success: r.success,
            error: r.error,
        }
    }
}

pub struct FCMClient {
    inner: NovaFcmClient,
}

impl FCMClient {
    pub fn new(project_id: String, credentials: ServiceAccountKey) -> Self {
        Self {
            inner: NovaFcmClient::new(project_id, credentials),
        }
    }

    /// Send to a single device, carrying the notification's gateway priority
    /// scale (§3's 1-10 scale) into FCM's android high/normal priority split.
    pub async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
        gateway_priority: u8,
    ) -> Result<FCMSendResult, String> {
        let android = FcmAndroidConfig::new(gateway_priority >= 8, Some(3600), None);
        self.inner
            .send_with_android(device_token, title, body, data, Some(android))
            .await
            .map(Into::into)
    }

    pub async fn send_to_topic(&self, topic: &str, title: &str, body: &str) -> Result<FCMSendResult, String> {
        self.inner.send_to_topic(topic, title, body).await.map(Into::into)
    }

    pub async fn validate_token(&self, device_token: &str) -> Result<bool, String> {
        self.inner.validate_token(device_token).await
    }
}
