use std::fmt::Display;

use rread_engine::db_types::{PaymentId, QueueStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// The body of a gateway notification. Only `type` and `data.id` are used; everything else is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookNotification {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookData {
    /// The gateway sends this as a number or a string
    pub id: Option<Value>,
}

impl WebhookNotification {
    pub fn is_payment(&self) -> bool {
        self.kind.as_deref() == Some("payment")
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        let id = match self.data.as_ref()?.id.as_ref()? {
            Value::Number(n) => PaymentId::new(n.to_string()),
            Value::String(s) => PaymentId::new(s.as_str()),
            _ => return None,
        };
        (!id.is_empty()).then_some(id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub dependencies: HealthDependencies,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDependencies {
    pub database: String,
}
