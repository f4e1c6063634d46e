use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;
use crate::domain::TenantId;

pub const DEFAULT_AUTO_REPLY_THRESHOLD: f64 = 0.8;

/// One stored auto-reply setting. `conversation_id == None` is the tenant-wide row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoReplyConfigRow {
    pub tenant_id: TenantId,
    pub conversation_id: Option<ConversationId>,
    pub enabled: bool,
    pub confidence_threshold: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Global,
    Conversation,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectiveAutoReplyConfig {
    pub enabled: bool,
    pub confidence_threshold: f64,
    pub source: ConfigSource,
}

impl Default for EffectiveAutoReplyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            confidence_threshold: DEFAULT_AUTO_REPLY_THRESHOLD,
            source: ConfigSource::Global,
        }
    }
}

impl EffectiveAutoReplyConfig {
    /// Conversation row wins; an unset conversation threshold borrows the global one.
    pub fn resolve(
        conversation: Option<&AutoReplyConfigRow>,
        global: Option<&AutoReplyConfigRow>,
        default_threshold: f64,
    ) -> Self {
        let global_threshold = global.and_then(|row| row.confidence_threshold);

        match (conversation, global) {
            (Some(row), _) => Self {
                enabled: row.enabled,
                confidence_threshold: clamp_threshold(
                    row.confidence_threshold.or(global_threshold).unwrap_or(default_threshold),
                ),
                source: ConfigSource::Conversation,
            },
            (None, Some(row)) => Self {
                enabled: row.enabled,
                confidence_threshold: clamp_threshold(
                    row.confidence_threshold.unwrap_or(default_threshold),
                ),
                source: ConfigSource::Global,
            },
            (None, None) => Self {
                confidence_threshold: clamp_threshold(default_threshold),
                ..Self::default()
            },
        }
    }
}

fn clamp_threshold(value: f64) -> f64 {
    if value.is_nan() {
        DEFAULT_AUTO_REPLY_THRESHOLD
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AutoReplyConfigRow, ConfigSource, EffectiveAutoReplyConfig, DEFAULT_AUTO_REPLY_THRESHOLD,
    };
    use crate::domain::conversation::ConversationId;
    use crate::domain::TenantId;

    fn row(conversation: Option<&str>, enabled: bool, threshold: Option<f64>) -> AutoReplyConfigRow {
        AutoReplyConfigRow {
            tenant_id: TenantId("tenant-1".to_string()),
            conversation_id: conversation.map(|id| ConversationId(id.to_string())),
            enabled,
            confidence_threshold: threshold,
        }
    }

    #[test]
    fn conversation_row_borrows_global_threshold_when_unset() {
        let conversation = row(Some("c-1"), true, None);
        let global = row(None, false, Some(0.8));

        let effective = EffectiveAutoReplyConfig::resolve(
            Some(&conversation),
            Some(&global),
            DEFAULT_AUTO_REPLY_THRESHOLD,
        );

        assert!(effective.enabled);
        assert!((effective.confidence_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(effective.source, ConfigSource::Conversation);
    }

    #[test]
    fn conversation_row_overrides_global_values() {
        let conversation = row(Some("c-1"), false, Some(0.95));
        let global = row(None, true, Some(0.6));

        let effective = EffectiveAutoReplyConfig::resolve(
            Some(&conversation),
            Some(&global),
            DEFAULT_AUTO_REPLY_THRESHOLD,
        );

        assert!(!effective.enabled);
        assert!((effective.confidence_threshold - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn global_row_is_used_without_conversation_row() {
        let global = row(None, true, Some(0.65));

        let effective =
            EffectiveAutoReplyConfig::resolve(None, Some(&global), DEFAULT_AUTO_REPLY_THRESHOLD);

        assert!(effective.enabled);
        assert!((effective.confidence_threshold - 0.65).abs() < f64::EPSILON);
        assert_eq!(effective.source, ConfigSource::Global);
    }

    #[test]
    fn absent_rows_resolve_to_disabled_default() {
        let effective = EffectiveAutoReplyConfig::resolve(None, None, DEFAULT_AUTO_REPLY_THRESHOLD);
        assert_eq!(effective, EffectiveAutoReplyConfig::default());
    }
}
