use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Customer,
    Agent,
    System,
}

impl Sender {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(Self::Customer),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub content: String,
    /// ISO language tag detected at ingestion, when known.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub auto_generated: bool,
    pub created_at: DateTime<Utc>,
}

/// A message that has not been stored yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender: Sender,
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub auto_generated: bool,
}

/// Newest customer-sent message, scanning from the end of a timestamp-ordered list.
pub fn latest_customer_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|message| message.sender == Sender::Customer)
}

/// Snapshot written by the conversation analyzer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub emotions: Vec<String>,
    #[serde(default)]
    pub objections: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerMemory {
    #[serde(default)]
    pub pricing_sensitivity: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub past_objections: Vec<String>,
}

impl CustomerMemory {
    pub fn is_empty(&self) -> bool {
        self.pricing_sensitivity.is_none()
            && self.interests.is_empty()
            && self.past_objections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{latest_customer_message, ConversationId, Message, MessageId, Sender};
    use crate::domain::TenantId;

    fn message(id: &str, sender: Sender, offset_secs: i64) -> Message {
        Message {
            id: MessageId(id.to_string()),
            tenant_id: TenantId("t-1".to_string()),
            conversation_id: ConversationId("c-1".to_string()),
            sender,
            content: format!("message {id}"),
            language: None,
            auto_generated: false,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn latest_customer_message_skips_trailing_agent_messages() {
        let messages = vec![
            message("m1", Sender::Customer, 0),
            message("m2", Sender::Customer, 1),
            message("m3", Sender::Agent, 2),
        ];

        let latest = latest_customer_message(&messages).map(|m| m.id.0.as_str());
        assert_eq!(latest, Some("m2"));
    }

    #[test]
    fn latest_customer_message_is_none_without_customer_messages() {
        let messages = vec![message("m1", Sender::Agent, 0)];
        assert!(latest_customer_message(&messages).is_none());
    }
}
