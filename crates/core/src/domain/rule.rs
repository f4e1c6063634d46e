use serde::{Deserialize, Serialize};

use crate::domain::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

/// What the policy engine does when a rule's pattern matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Block,
    AutoCorrect,
    Flag,
    /// Actions written by newer admin tooling that this engine does not know.
    /// They evaluate last and are treated like `Flag`.
    #[serde(untagged)]
    Unknown(String),
}

impl RuleAction {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "block" => Self::Block,
            "auto_correct" | "autocorrect" | "auto-correct" => Self::AutoCorrect,
            "flag" => Self::Flag,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Block => "block",
            Self::AutoCorrect => "auto_correct",
            Self::Flag => "flag",
            Self::Unknown(raw) => raw,
        }
    }

    /// Evaluation order; lower runs first.
    pub fn priority(&self) -> u32 {
        match self {
            Self::Block => 1,
            Self::AutoCorrect => 2,
            Self::Flag => 3,
            Self::Unknown(_) => 999,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Block => Severity::Critical,
            Self::AutoCorrect => Severity::High,
            Self::Flag | Self::Unknown(_) => Severity::Medium,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Regular expression, or a plain keyword when it does not compile.
    pub pattern: String,
    pub action: RuleAction,
    /// Replacement text for `auto_correct` rules.
    #[serde(default)]
    pub correction_template: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub action: RuleAction,
    pub matched_text: String,
    /// Byte offsets of the match in the text the rule was evaluated against.
    pub span: (usize, usize),
    pub severity: Severity,
}

/// Pass/fail outcome of one evaluated rule, in evaluation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    pub passed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub blocked: bool,
    pub violations: Vec<Violation>,
    pub corrected_text: String,
    pub explanation: String,
    pub rule_results: Vec<RuleOutcome>,
}

impl ValidationResult {
    pub fn was_corrected(&self, original: &str) -> bool {
        self.corrected_text != original
    }

    pub fn rule_pass_vector(&self) -> Vec<bool> {
        self.rule_results.iter().map(|outcome| outcome.passed).collect()
    }
}
