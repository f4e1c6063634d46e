use sqlx::Row;

use parley_core::domain::conversation::{ConversationId, MessageId};
use parley_core::domain::TenantId;
use parley_core::errors::StoreError;
use parley_core::store::SuggestionCacheStore;
use parley_core::suggestions::{SuggestionCacheEntry, SuggestionCacheKey};

use super::{decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlSuggestionCacheRepository {
    pool: DbPool,
}

impl SqlSuggestionCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        tenant_id: &TenantId,
        key: &SuggestionCacheKey,
    ) -> Result<Option<SuggestionCacheEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, conversation_id, last_message_id, suggestions_json, context_used,
                    created_at
             FROM suggestion_cache
             WHERE tenant_id = ? AND conversation_id = ? AND last_message_id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&key.conversation_id.0)
        .bind(&key.last_message_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    /// Replaces the entry for the same key inside one transaction.
    pub async fn replace(&self, entry: &SuggestionCacheEntry) -> Result<(), RepositoryError> {
        let suggestions = serde_json::to_string(&entry.suggestions)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM suggestion_cache
             WHERE tenant_id = ? AND conversation_id = ? AND last_message_id = ?",
        )
        .bind(&entry.tenant_id.0)
        .bind(&entry.key.conversation_id.0)
        .bind(&entry.key.last_message_id.0)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO suggestion_cache
                (tenant_id, conversation_id, last_message_id, suggestions_json, context_used,
                 created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.tenant_id.0)
        .bind(&entry.key.conversation_id.0)
        .bind(&entry.key.last_message_id.0)
        .bind(&suggestions)
        .bind(entry.context_used)
        .bind(encode_timestamp(&entry.created_at))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<SuggestionCacheEntry, RepositoryError> {
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_message_id: String =
        row.try_get("last_message_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let suggestions: String =
        row.try_get("suggestions_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let context_used: bool =
        row.try_get("context_used").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(SuggestionCacheEntry {
        tenant_id: TenantId(tenant_id),
        key: SuggestionCacheKey {
            conversation_id: ConversationId(conversation_id),
            last_message_id: MessageId(last_message_id),
        },
        suggestions: serde_json::from_str(&suggestions)?,
        context_used,
        created_at: decode_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl SuggestionCacheStore for SqlSuggestionCacheRepository {
    async fn get_suggestion_cache(
        &self,
        tenant_id: &TenantId,
        key: &SuggestionCacheKey,
    ) -> Result<Option<SuggestionCacheEntry>, StoreError> {
        Ok(self.find(tenant_id, key).await?)
    }

    async fn save_suggestion_cache(&self, entry: SuggestionCacheEntry) -> Result<(), StoreError> {
        Ok(self.replace(&entry).await?)
    }
}
