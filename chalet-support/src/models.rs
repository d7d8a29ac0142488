use chalet_core::{Actor, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Customer,
    Team,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::Customer => "customer",
            SenderRole::Team => "team",
        }
    }

    /// Admins answer as the support team; everyone else writes as a customer.
    pub fn for_actor(actor: &Actor) -> Self {
        match actor.role {
            Role::Admin => SenderRole::Team,
            Role::Owner | Role::Customer => SenderRole::Customer,
        }
    }

    pub fn other(&self) -> Self {
        match self {
            SenderRole::Customer => SenderRole::Team,
            SenderRole::Team => SenderRole::Customer,
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(SenderRole::Customer),
            "team" => Ok(SenderRole::Team),
            other => Err(format!("unknown sender role '{}'", other)),
        }
    }
}

/// One entry of an append-only conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub customer_id: Uuid,
    pub sender_id: Uuid,
    pub sender: SenderRole,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Inbox row: a conversation reduced to its latest message and unread counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub customer_id: Uuid,
    pub last_message: Message,
    pub message_count: usize,
    /// Customer messages the team has not read yet.
    pub unread_by_team: usize,
    /// Team replies the customer has not read yet.
    pub unread_by_customer: usize,
}

impl ConversationSummary {
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.last_message.created_at
    }
}
