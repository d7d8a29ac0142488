use crate::models::{ConversationSummary, Message, SenderRole};
use std::collections::HashMap;
use uuid::Uuid;

/// Folds a flat message list into one summary per conversation, most
/// recently active first.
pub fn group_conversations<I>(messages: I) -> Vec<ConversationSummary>
where
    I: IntoIterator<Item = Message>,
{
    let mut grouped: HashMap<Uuid, ConversationSummary> = HashMap::new();

    for message in messages {
        let unread_team = usize::from(message.sender == SenderRole::Customer && !message.is_read);
        let unread_customer = usize::from(message.sender == SenderRole::Team && !message.is_read);

        match grouped.get_mut(&message.conversation_id) {
            Some(summary) => {
                summary.message_count += 1;
                summary.unread_by_team += unread_team;
                summary.unread_by_customer += unread_customer;
                if newer(&message, &summary.last_message) {
                    summary.last_message = message;
                }
            }
            None => {
                grouped.insert(
                    message.conversation_id,
                    ConversationSummary {
                        conversation_id: message.conversation_id,
                        customer_id: message.customer_id,
                        message_count: 1,
                        unread_by_team: unread_team,
                        unread_by_customer: unread_customer,
                        last_message: message,
                    },
                );
            }
        }
    }

    let mut summaries: Vec<ConversationSummary> = grouped.into_values().collect();
    summaries.sort_by(|a, b| {
        b.updated_at()
            .cmp(&a.updated_at())
            .then_with(|| a.conversation_id.cmp(&b.conversation_id))
    });
    summaries
}

fn newer(candidate: &Message, current: &Message) -> bool {
    (candidate.created_at, candidate.id) > (current.created_at, current.id)
}
