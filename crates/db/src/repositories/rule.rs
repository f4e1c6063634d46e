use chrono::Utc;
use sqlx::Row;

use parley_core::domain::rule::{Rule, RuleAction, RuleId};
use parley_core::domain::TenantId;
use parley_core::errors::StoreError;
use parley_core::store::RuleStore;

use super::{encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a rule by id. A rule never moves to another tenant.
    pub async fn save_rule(&self, rule: &Rule) -> Result<(), RepositoryError> {
        let now = encode_timestamp(&Utc::now());
        sqlx::query(
            "INSERT INTO policy_rules
                (id, tenant_id, name, pattern, action, correction_template, description,
                 active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                pattern = excluded.pattern,
                action = excluded.action,
                correction_template = excluded.correction_template,
                description = excluded.description,
                active = excluded.active,
                updated_at = excluded.updated_at
             WHERE policy_rules.tenant_id = excluded.tenant_id",
        )
        .bind(&rule.id.0)
        .bind(&rule.tenant_id.0)
        .bind(&rule.name)
        .bind(&rule.pattern)
        .bind(rule.action.as_str())
        .bind(&rule.correction_template)
        .bind(rule.description.clone().unwrap_or_default())
        .bind(rule.active)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_active(&self, tenant_id: &TenantId) -> Result<Vec<Rule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, name, pattern, action, correction_template, description, active
             FROM policy_rules
             WHERE tenant_id = ? AND active = 1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rule).collect()
    }
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<Rule, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let pattern: String =
        row.try_get("pattern").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action: String =
        row.try_get("action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let correction_template: Option<String> =
        row.try_get("correction_template").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Rule {
        id: RuleId(id),
        tenant_id: TenantId(tenant_id),
        name,
        pattern,
        action: RuleAction::parse(&action),
        correction_template,
        description: if description.is_empty() { None } else { Some(description) },
        active,
    })
}

#[async_trait::async_trait]
impl RuleStore for SqlRuleRepository {
    async fn load_active_rules(&self, tenant_id: &TenantId) -> Result<Vec<Rule>, StoreError> {
        Ok(self.find_active(tenant_id).await?)
    }
}
