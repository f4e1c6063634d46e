use chrono::Utc;
use sqlx::Row;

use parley_core::domain::auto_reply::AutoReplyConfigRow;
use parley_core::domain::conversation::ConversationId;
use parley_core::domain::TenantId;
use parley_core::errors::StoreError;
use parley_core::store::AutoReplyConfigStore;

use super::{encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlAutoReplyConfigRepository {
    pool: DbPool,
}

impl SqlAutoReplyConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Replaces the row for the same scope; a `None` conversation is the tenant-wide row.
    pub async fn save_config(&self, row: &AutoReplyConfigRow) -> Result<(), RepositoryError> {
        let conversation_id = row.conversation_id.as_ref().map(|id| id.0.clone());

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM auto_reply_config
             WHERE tenant_id = ? AND conversation_id IS ?",
        )
        .bind(&row.tenant_id.0)
        .bind(&conversation_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO auto_reply_config
                (tenant_id, conversation_id, enabled, confidence_threshold, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&row.tenant_id.0)
        .bind(&conversation_id)
        .bind(row.enabled)
        .bind(row.confidence_threshold)
        .bind(encode_timestamp(&Utc::now()))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_config(
        &self,
        tenant_id: &TenantId,
        conversation_id: Option<&ConversationId>,
    ) -> Result<Option<AutoReplyConfigRow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, conversation_id, enabled, confidence_threshold
             FROM auto_reply_config
             WHERE tenant_id = ? AND conversation_id IS ?
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(conversation_id.map(|id| id.0.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_config).transpose()
    }
}

fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<AutoReplyConfigRow, RepositoryError> {
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: Option<String> =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let enabled: bool =
        row.try_get("enabled").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let confidence_threshold: Option<f64> =
        row.try_get("confidence_threshold").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(AutoReplyConfigRow {
        tenant_id: TenantId(tenant_id),
        conversation_id: conversation_id.map(ConversationId),
        enabled,
        confidence_threshold,
    })
}

#[async_trait::async_trait]
impl AutoReplyConfigStore for SqlAutoReplyConfigRepository {
    async fn conversation_auto_reply_config(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<AutoReplyConfigRow>, StoreError> {
        Ok(self.find_config(tenant_id, Some(conversation_id)).await?)
    }

    async fn global_auto_reply_config(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<AutoReplyConfigRow>, StoreError> {
        Ok(self.find_config(tenant_id, None).await?)
    }
}
