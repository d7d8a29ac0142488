use crate::database::{corrupt, repo_err};
use async_trait::async_trait;
use chalet_core::{RepoError, RepoResult};
use chalet_support::{Message, MessageRepository, SenderRole};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct StoreMessageRepository {
    pool: PgPool,
}

impl StoreMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, clause: &str, id: Uuid) -> RepoResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE {} ORDER BY created_at, id",
            COLUMNS, clause
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)?;
        rows.into_iter().map(Message::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    customer_id: Uuid,
    sender_id: Uuid,
    sender: String,
    body: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = RepoError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            customer_id: row.customer_id,
            sender_id: row.sender_id,
            sender: row.sender.parse().map_err(|_| corrupt("sender", &row.sender))?,
            body: row.body,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

const COLUMNS: &str = "id, conversation_id, customer_id, sender_id, sender, body, is_read, created_at";

#[async_trait]
impl MessageRepository for StoreMessageRepository {
    async fn append(&self, message: &Message) -> RepoResult<DateTime<Utc>> {
        let mut tx = self.pool.begin().await.map_err(repo_err)?;

        // Writers on every instance queue here per conversation.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(message.conversation_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(repo_err)?;

        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO messages (id, conversation_id, customer_id, sender_id, sender, body, is_read, created_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, GREATEST($8, MAX(created_at) + INTERVAL '1 microsecond')
            FROM messages WHERE conversation_id = $2
            RETURNING created_at
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.customer_id)
        .bind(message.sender_id)
        .bind(message.sender.as_str())
        .bind(&message.body)
        .bind(message.is_read)
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(repo_err)?;

        tx.commit().await.map_err(repo_err)?;
        Ok(created_at)
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Message>> {
        Ok(self.fetch("id = $1", id).await?.into_iter().next())
    }

    async fn conversation(&self, conversation_id: Uuid) -> RepoResult<Vec<Message>> {
        self.fetch("conversation_id = $1", conversation_id).await
    }

    async fn since(&self, conversation_id: Uuid, after: Option<DateTime<Utc>>) -> RepoResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE conversation_id = $1 AND ($2::timestamptz IS NULL OR created_at > $2) \
             ORDER BY created_at, id",
            COLUMNS
        ))
        .bind(conversation_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await
        .map_err(repo_err)?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn latest_timestamp(&self, conversation_id: Uuid) -> RepoResult<Option<DateTime<Utc>>> {
        sqlx::query_scalar("SELECT MAX(created_at) FROM messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await
            .map_err(repo_err)
    }

    async fn conversation_owner(&self, conversation_id: Uuid) -> RepoResult<Option<Uuid>> {
        sqlx::query_scalar("SELECT customer_id FROM messages WHERE conversation_id = $1 LIMIT 1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(repo_err)
    }

    async fn list_all(&self) -> RepoResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!("SELECT {} FROM messages ORDER BY created_at, id", COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(repo_err)?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Message>> {
        self.fetch("customer_id = $1", customer_id).await
    }

    async fn mark_read(&self, id: Uuid) -> RepoResult<Message> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "UPDATE messages SET is_read = TRUE WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(repo_err)?;
        row.ok_or_else(|| RepoError::NotFound(format!("message {}", id)))?
            .try_into()
    }

    async fn mark_conversation_read(&self, conversation_id: Uuid, sender: SenderRole) -> RepoResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE WHERE conversation_id = $1 AND sender = $2 AND NOT is_read",
        )
        .bind(conversation_id)
        .bind(sender.as_str())
        .execute(&self.pool)
        .await
        .map_err(repo_err)?;
        Ok(result.rows_affected())
    }
}
