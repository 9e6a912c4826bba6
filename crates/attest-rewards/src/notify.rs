use async_trait::async_trait;
use attest_types::DeviceAddress;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Chat channel to paired devices.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message_to_device(&self, device_address: &DeviceAddress, text: &str);
}

/// Out-of-band channel to the bot operator.
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify_operator(&self, subject: &str, body: &str);
}

/// Writes outgoing chat messages to the log.
#[derive(Debug, Default, Clone)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_message_to_device(&self, device_address: &DeviceAddress, text: &str) {
        info!(device = %device_address, text = %text, "💬 Message to device");
    }
}

/// Writes operator notifications to the log at warn level.
#[derive(Debug, Default, Clone)]
pub struct LogOperatorNotifier;

#[async_trait]
impl OperatorNotifier for LogOperatorNotifier {
    async fn notify_operator(&self, subject: &str, body: &str) {
        warn!(subject = %subject, body = %body, "📣 Operator notification");
    }
}

/// Keeps every message and notification in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryMessenger {
    messages: Arc<RwLock<Vec<(DeviceAddress, String)>>>,
    notifications: Arc<RwLock<Vec<(String, String)>>>,
}

impl MemoryMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<(DeviceAddress, String)> {
        self.messages.read().await.clone()
    }

    pub async fn messages_to(&self, device_address: &DeviceAddress) -> Vec<String> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|(device, _)| device == device_address)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub async fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl Messenger for MemoryMessenger {
    async fn send_message_to_device(&self, device_address: &DeviceAddress, text: &str) {
        self.messages
            .write()
            .await
            .push((device_address.clone(), text.to_string()));
    }
}

#[async_trait]
impl OperatorNotifier for MemoryMessenger {
    async fn notify_operator(&self, subject: &str, body: &str) {
        self.notifications
            .write()
            .await
            .push((subject.to_string(), body.to_string()));
    }
}
