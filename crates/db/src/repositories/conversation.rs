use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use parley_core::domain::conversation::{
    ConversationId, ConversationMetadata, CustomerId, CustomerMemory, Message, MessageId,
    NewMessage, Sender,
};
use parley_core::domain::TenantId;
use parley_core::errors::StoreError;
use parley_core::store::ConversationStore;

use super::{decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates the conversation row if missing, leaving an existing customer link alone.
    pub async fn ensure_conversation(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversations (tenant_id, id, customer_id, created_at)
             VALUES (?, ?, NULL, ?)
             ON CONFLICT(tenant_id, id) DO NOTHING",
        )
        .bind(&tenant_id.0)
        .bind(&conversation_id.0)
        .bind(encode_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_conversation_customer(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        customer_id: &CustomerId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversations (tenant_id, id, customer_id, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(tenant_id, id) DO UPDATE SET customer_id = excluded.customer_id",
        )
        .bind(&tenant_id.0)
        .bind(&conversation_id.0)
        .bind(&customer_id.0)
        .bind(encode_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_customer_memory(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        memory: &CustomerMemory,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer_memory
                (tenant_id, customer_id, pricing_sensitivity, interests_json,
                 past_objections_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, customer_id) DO UPDATE SET
                pricing_sensitivity = excluded.pricing_sensitivity,
                interests_json = excluded.interests_json,
                past_objections_json = excluded.past_objections_json,
                updated_at = excluded.updated_at",
        )
        .bind(&tenant_id.0)
        .bind(&customer_id.0)
        .bind(&memory.pricing_sensitivity)
        .bind(serde_json::to_string(&memory.interests)?)
        .bind(serde_json::to_string(&memory.past_objections)?)
        .bind(encode_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_brand_tone(
        &self,
        tenant_id: &TenantId,
        brand_tone: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tenant_settings (tenant_id, brand_tone, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                brand_tone = excluded.brand_tone,
                updated_at = excluded.updated_at",
        )
        .bind(&tenant_id.0)
        .bind(brand_tone)
        .bind(encode_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_messages(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, conversation_id, sender, content, language, auto_generated,
                    created_at
             FROM messages
             WHERE tenant_id = ? AND conversation_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&tenant_id.0)
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    pub async fn insert_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, RepositoryError> {
        let stored = Message {
            id: MessageId(Uuid::new_v4().to_string()),
            tenant_id: tenant_id.clone(),
            conversation_id: conversation_id.clone(),
            sender: message.sender,
            content: message.content,
            language: message.language,
            auto_generated: message.auto_generated,
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO conversations (tenant_id, id, customer_id, created_at)
             VALUES (?, ?, NULL, ?)
             ON CONFLICT(tenant_id, id) DO NOTHING",
        )
        .bind(&tenant_id.0)
        .bind(&conversation_id.0)
        .bind(encode_timestamp(&stored.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO messages
                (id, tenant_id, conversation_id, sender, content, language, auto_generated,
                 created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&stored.id.0)
        .bind(&tenant_id.0)
        .bind(&conversation_id.0)
        .bind(stored.sender.as_str())
        .bind(&stored.content)
        .bind(&stored.language)
        .bind(stored.auto_generated)
        .bind(encode_timestamp(&stored.created_at))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(stored)
    }

    pub async fn find_metadata(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationMetadata>, RepositoryError> {
        let row = sqlx::query(
            "SELECT intent, sentiment, emotions_json, objections_json, updated_at
             FROM conversation_metadata
             WHERE tenant_id = ? AND conversation_id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_metadata).transpose()
    }

    pub async fn upsert_metadata(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        metadata: &ConversationMetadata,
    ) -> Result<(), RepositoryError> {
        let updated_at = metadata.updated_at.unwrap_or_else(Utc::now);
        sqlx::query(
            "INSERT INTO conversation_metadata
                (tenant_id, conversation_id, intent, sentiment, emotions_json, objections_json,
                 updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, conversation_id) DO UPDATE SET
                intent = excluded.intent,
                sentiment = excluded.sentiment,
                emotions_json = excluded.emotions_json,
                objections_json = excluded.objections_json,
                updated_at = excluded.updated_at",
        )
        .bind(&tenant_id.0)
        .bind(&conversation_id.0)
        .bind(&metadata.intent)
        .bind(&metadata.sentiment)
        .bind(serde_json::to_string(&metadata.emotions)?)
        .bind(serde_json::to_string(&metadata.objections)?)
        .bind(encode_timestamp(&updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_customer(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<CustomerId>, RepositoryError> {
        let row = sqlx::query("SELECT customer_id FROM conversations WHERE tenant_id = ? AND id = ?")
            .bind(&tenant_id.0)
            .bind(&conversation_id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let customer_id: Option<String> =
            row.try_get("customer_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(customer_id.map(CustomerId))
    }

    pub async fn find_customer_memory(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerMemory>, RepositoryError> {
        let row = sqlx::query(
            "SELECT pricing_sensitivity, interests_json, past_objections_json
             FROM customer_memory
             WHERE tenant_id = ? AND customer_id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&customer_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_customer_memory).transpose()
    }

    pub async fn find_brand_tone(&self, tenant_id: &TenantId) -> Result<String, RepositoryError> {
        let tone: Option<String> =
            sqlx::query_scalar("SELECT brand_tone FROM tenant_settings WHERE tenant_id = ?")
                .bind(&tenant_id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(tone.unwrap_or_default())
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sender: String =
        row.try_get("sender").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let language: Option<String> =
        row.try_get("language").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let auto_generated: bool =
        row.try_get("auto_generated").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let sender = Sender::parse(&sender)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown sender `{sender}`")))?;

    Ok(Message {
        id: MessageId(id),
        tenant_id: TenantId(tenant_id),
        conversation_id: ConversationId(conversation_id),
        sender,
        content,
        language,
        auto_generated,
        created_at: decode_timestamp(&created_at)?,
    })
}

fn row_to_metadata(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationMetadata, RepositoryError> {
    let intent: String =
        row.try_get("intent").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sentiment: String =
        row.try_get("sentiment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let emotions: String =
        row.try_get("emotions_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let objections: String =
        row.try_get("objections_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ConversationMetadata {
        intent,
        sentiment,
        emotions: serde_json::from_str(&emotions)?,
        objections: serde_json::from_str(&objections)?,
        updated_at: Some(decode_timestamp(&updated_at)?),
    })
}

fn row_to_customer_memory(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<CustomerMemory, RepositoryError> {
    let pricing_sensitivity: Option<String> =
        row.try_get("pricing_sensitivity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let interests: String =
        row.try_get("interests_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let past_objections: String =
        row.try_get("past_objections_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(CustomerMemory {
        pricing_sensitivity,
        interests: serde_json::from_str(&interests)?,
        past_objections: serde_json::from_str(&past_objections)?,
    })
}

#[async_trait::async_trait]
impl ConversationStore for SqlConversationRepository {
    async fn get_messages(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self.find_messages(tenant_id, conversation_id).await?)
    }

    async fn append_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        Ok(self.insert_message(tenant_id, conversation_id, message).await?)
    }

    async fn get_conversation_metadata(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationMetadata>, StoreError> {
        Ok(self.find_metadata(tenant_id, conversation_id).await?)
    }

    async fn save_conversation_metadata(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        metadata: &ConversationMetadata,
    ) -> Result<(), StoreError> {
        Ok(self.upsert_metadata(tenant_id, conversation_id, metadata).await?)
    }

    async fn get_conversation_customer(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<CustomerId>, StoreError> {
        Ok(self.find_customer(tenant_id, conversation_id).await?)
    }

    async fn get_customer_memory(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerMemory>, StoreError> {
        Ok(self.find_customer_memory(tenant_id, customer_id).await?)
    }

    async fn get_brand_tone(&self, tenant_id: &TenantId) -> Result<String, StoreError> {
        Ok(self.find_brand_tone(tenant_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use parley_core::domain::conversation::{
        ConversationId, ConversationMetadata, CustomerId, CustomerMemory, NewMessage, Sender,
    };
    use parley_core::domain::TenantId;
    use parley_core::store::ConversationStore;

    use super::SqlConversationRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlConversationRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlConversationRepository::new(pool)
    }

    fn ids() -> (TenantId, ConversationId) {
        (TenantId("t-1".to_string()), ConversationId("c-1".to_string()))
    }

    fn new_message(sender: Sender, content: &str) -> NewMessage {
        NewMessage {
            sender,
            content: content.to_string(),
            language: Some("en".to_string()),
            auto_generated: false,
        }
    }

    #[tokio::test]
    async fn appended_messages_come_back_in_order() {
        let repo = repository().await;
        let (tenant, conversation) = ids();

        for (sender, content) in
            [(Sender::Customer, "hi"), (Sender::Agent, "hello"), (Sender::Customer, "price?")]
        {
            repo.append_message(&tenant, &conversation, new_message(sender, content))
                .await
                .expect("append");
        }

        let messages = repo.get_messages(&tenant, &conversation).await.expect("messages");
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello", "price?"]);
        assert_eq!(messages[1].sender, Sender::Agent);
        assert_eq!(messages[2].language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn messages_are_scoped_by_tenant() {
        let repo = repository().await;
        let (tenant, conversation) = ids();
        repo.append_message(&tenant, &conversation, new_message(Sender::Customer, "hi"))
            .await
            .expect("append");

        let other = repo
            .get_messages(&TenantId("t-2".to_string()), &conversation)
            .await
            .expect("messages");
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn metadata_upsert_replaces_snapshot() {
        let repo = repository().await;
        let (tenant, conversation) = ids();
        assert!(repo.get_conversation_metadata(&tenant, &conversation).await.expect("get").is_none());

        let mut metadata = ConversationMetadata {
            intent: "purchase".to_string(),
            sentiment: "positive".to_string(),
            emotions: vec!["excited".to_string()],
            objections: vec!["price".to_string()],
            updated_at: None,
        };
        repo.save_conversation_metadata(&tenant, &conversation, &metadata).await.expect("save");
        metadata.objections.clear();
        repo.save_conversation_metadata(&tenant, &conversation, &metadata).await.expect("save");

        let stored = repo
            .get_conversation_metadata(&tenant, &conversation)
            .await
            .expect("get")
            .expect("metadata present");
        assert_eq!(stored.intent, "purchase");
        assert_eq!(stored.emotions, vec!["excited".to_string()]);
        assert!(stored.objections.is_empty());
        assert!(stored.updated_at.is_some());
    }

    #[tokio::test]
    async fn customer_memory_follows_conversation_link() {
        let repo = repository().await;
        let (tenant, conversation) = ids();
        let customer = CustomerId("cust-9".to_string());
        assert!(repo.get_conversation_customer(&tenant, &conversation).await.expect("get").is_none());

        repo.ensure_conversation(&tenant, &conversation).await.expect("ensure");
        repo.set_conversation_customer(&tenant, &conversation, &customer).await.expect("link");
        repo.save_customer_memory(
            &tenant,
            &customer,
            &CustomerMemory {
                pricing_sensitivity: Some("high".to_string()),
                interests: vec!["serums".to_string()],
                past_objections: vec!["shipping".to_string()],
            },
        )
        .await
        .expect("memory");

        let linked = repo.get_conversation_customer(&tenant, &conversation).await.expect("get");
        assert_eq!(linked, Some(customer.clone()));
        let memory = repo
            .get_customer_memory(&tenant, &customer)
            .await
            .expect("get")
            .expect("memory present");
        assert_eq!(memory.pricing_sensitivity.as_deref(), Some("high"));
        assert_eq!(memory.interests, vec!["serums".to_string()]);
    }

    #[tokio::test]
    async fn brand_tone_defaults_to_empty() {
        let repo = repository().await;
        let (tenant, _) = ids();
        assert_eq!(repo.get_brand_tone(&tenant).await.expect("tone"), "");

        repo.set_brand_tone(&tenant, "warm, concise").await.expect("set");
        assert_eq!(repo.get_brand_tone(&tenant).await.expect("tone"), "warm, concise");
    }

    #[tokio::test]
    async fn closed_pool_reports_unavailable() {
        let repo = repository().await;
        let (tenant, conversation) = ids();
        repo.pool.close().await;

        let error = repo.get_messages(&tenant, &conversation).await.expect_err("closed pool");
        assert!(matches!(error, parley_core::errors::StoreError::Unavailable(_)));
    }
}
