use regex::{Match, Regex, RegexBuilder};

use crate::domain::rule::{Rule, RuleAction, RuleOutcome, ValidationResult, Violation};

use super::PolicyEngine;

#[derive(Clone, Debug, Default)]
pub struct DeterministicPolicyEngine;

impl DeterministicPolicyEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyEngine for DeterministicPolicyEngine {
    fn validate_output(&self, text: &str, rules: &[Rule]) -> ValidationResult {
        let mut ordered: Vec<&Rule> = rules.iter().filter(|rule| rule.active).collect();
        // sort_by_key is stable, so equal priorities keep their stored order.
        ordered.sort_by_key(|rule| rule.action.priority());

        let mut current = text.to_string();
        let mut violations = Vec::new();
        let mut rule_results = Vec::with_capacity(ordered.len());

        for rule in ordered {
            let Some(matcher) = compile_pattern(&rule.pattern) else {
                rule_results.push(RuleOutcome { rule_id: rule.id.clone(), passed: true });
                continue;
            };

            let Some(found) = first_match(&matcher, &current) else {
                rule_results.push(RuleOutcome { rule_id: rule.id.clone(), passed: true });
                continue;
            };

            rule_results.push(RuleOutcome { rule_id: rule.id.clone(), passed: false });
            let violation = Violation {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                action: rule.action.clone(),
                matched_text: found.as_str().to_string(),
                span: (found.start(), found.end()),
                severity: rule.action.severity(),
            };

            match &rule.action {
                RuleAction::Block => {
                    let explanation = blocked_explanation(rule, &violation);
                    violations.push(violation);
                    return ValidationResult {
                        passed: false,
                        blocked: true,
                        violations,
                        corrected_text: current,
                        explanation,
                        rule_results,
                    };
                }
                RuleAction::AutoCorrect => {
                    current = apply_correction(
                        &matcher,
                        &current,
                        rule.correction_template.as_deref().unwrap_or_default(),
                    );
                    violations.push(violation);
                }
                RuleAction::Flag | RuleAction::Unknown(_) => violations.push(violation),
            }
        }

        let passed = violations.iter().all(|violation| violation.action != RuleAction::Block);
        let explanation = summary_explanation(&violations, rule_results.len());

        ValidationResult {
            passed,
            blocked: false,
            violations,
            corrected_text: current,
            explanation,
            rule_results,
        }
    }
}

/// Patterns that do not compile as regex fall back to a case-insensitive literal.
fn compile_pattern(pattern: &str) -> Option<Regex> {
    if pattern.trim().is_empty() {
        return None;
    }

    Regex::new(pattern)
        .or_else(|_| RegexBuilder::new(&regex::escape(pattern)).case_insensitive(true).build())
        .ok()
}

/// Zero-length matches (`x*`, `^`, `\b`) never count as a hit.
fn matches<'r, 't>(matcher: &'r Regex, text: &'t str) -> impl Iterator<Item = Match<'t>> + 'r
where
    't: 'r,
{
    matcher.find_iter(text).filter(|found| found.start() < found.end())
}

fn first_match<'t>(matcher: &Regex, text: &'t str) -> Option<Match<'t>> {
    matches(matcher, text).next()
}

fn apply_correction(matcher: &Regex, text: &str, template: &str) -> String {
    if !template.trim().is_empty() {
        let replaced = replace_matches(matcher, text, template);
        if replaced != text {
            return replaced;
        }
    }

    let stripped = strip_matches(matcher, text);
    if stripped != text {
        return stripped;
    }

    if template.trim().is_empty() {
        text.to_string()
    } else {
        format!("{} {}", text.trim_end(), template.trim())
    }
}

fn replace_matches(matcher: &Regex, text: &str, replacement: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for found in matches(matcher, text) {
        output.push_str(&text[last..found.start()]);
        output.push_str(replacement);
        last = found.end();
    }
    output.push_str(&text[last..]);
    output
}

/// Removes every match, tidying only the spaces that border a removed span.
fn strip_matches(matcher: &Regex, text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for found in matches(matcher, text) {
        output.push_str(&text[last..found.start()]);
        last = found.end();

        let rest = &text[last..];
        let at_word_start = output.is_empty() || output.ends_with(' ');
        if at_word_start && rest.starts_with(' ') {
            last += 1;
        } else if output.ends_with(' ')
            && (rest.is_empty() || rest.starts_with(['.', ',', '!', '?', ';', ':']))
        {
            output.pop();
        }
    }
    output.push_str(&text[last..]);
    output
}

fn blocked_explanation(rule: &Rule, violation: &Violation) -> String {
    let mut explanation = format!(
        "Blocked by rule '{}': matched \"{}\".",
        rule.name, violation.matched_text
    );
    if let Some(description) = rule.description.as_deref().filter(|d| !d.trim().is_empty()) {
        explanation.push(' ');
        explanation.push_str(description.trim());
    }
    explanation
}

fn summary_explanation(violations: &[Violation], evaluated: usize) -> String {
    if violations.is_empty() {
        return format!("All {evaluated} active rules passed.");
    }

    let corrected: Vec<&str> = violations
        .iter()
        .filter(|v| v.action == RuleAction::AutoCorrect)
        .map(|v| v.rule_name.as_str())
        .collect();
    let flagged: Vec<&str> = violations
        .iter()
        .filter(|v| v.action != RuleAction::AutoCorrect)
        .map(|v| v.rule_name.as_str())
        .collect();

    let mut parts = Vec::new();
    if !corrected.is_empty() {
        parts.push(format!("auto-corrected by {}", corrected.join(", ")));
    }
    if !flagged.is_empty() {
        parts.push(format!("flagged by {}", flagged.join(", ")));
    }
    format!("{} of {evaluated} rules matched: {}.", violations.len(), parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::DeterministicPolicyEngine;
    use crate::domain::rule::{Rule, RuleAction, RuleId, Severity};
    use crate::domain::TenantId;
    use crate::policy::PolicyEngine;

    fn rule(id: &str, pattern: &str, action: RuleAction, template: Option<&str>) -> Rule {
        Rule {
            id: RuleId(id.to_string()),
            tenant_id: TenantId("tenant-1".to_string()),
            name: id.to_string(),
            pattern: pattern.to_string(),
            action,
            correction_template: template.map(str::to_string),
            description: None,
            active: true,
        }
    }

    #[test]
    fn block_rule_stops_evaluation() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![rule("no-guarantee", "guarantee", RuleAction::Block, None)];

        let result = engine.validate_output("We guarantee results", &rules);

        assert!(result.blocked);
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].severity, Severity::Critical);
        assert!(result.explanation.contains("no-guarantee"));
    }

    #[test]
    fn block_runs_before_earlier_listed_flag_and_records_nothing_after() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![
            rule("flag-results", "results", RuleAction::Flag, None),
            rule("fix-we", "we", RuleAction::AutoCorrect, Some("our team")),
            rule("no-guarantee", "guarantee", RuleAction::Block, None),
            rule("block-later", "results", RuleAction::Block, None),
        ];

        let result = engine.validate_output("We guarantee results", &rules);

        assert!(result.blocked);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].rule_id.0, "no-guarantee");
        assert_eq!(result.rule_results.len(), 1);
        assert_eq!(result.corrected_text, "We guarantee results");
    }

    #[test]
    fn auto_correct_replaces_matched_span() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![rule(
            "no-discounts",
            "50% off",
            RuleAction::AutoCorrect,
            Some("Let me check current pricing."),
        )];

        let result = engine.validate_output("Get 50% off today", &rules);

        assert!(result.passed);
        assert!(!result.blocked);
        assert!(result.corrected_text.contains("Let me check current pricing."));
        assert!(!result.corrected_text.contains("50% off"));
        assert_eq!(result.violations[0].severity, Severity::High);
    }

    #[test]
    fn chained_corrections_see_previous_rewrites() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![
            rule("guaranteed", "100% guaranteed", RuleAction::AutoCorrect, Some("a discount option")),
            rule("discount", "discount", RuleAction::AutoCorrect, Some("pricing option")),
        ];

        let result = engine.validate_output("This plan is 100% guaranteed.", &rules);

        assert_eq!(result.violations.len(), 2);
        assert_eq!(result.corrected_text, "This plan is a pricing option option.");
    }

    #[test]
    fn empty_template_strips_matched_text() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![rule("no-asap", "ASAP", RuleAction::AutoCorrect, None)];

        let result = engine.validate_output("I will ship it ASAP today", &rules);

        assert_eq!(result.corrected_text, "I will ship it today");
    }

    #[test]
    fn no_op_replacement_falls_back_to_stripping() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![rule("echo", "free", RuleAction::AutoCorrect, Some("free"))];

        let result = engine.validate_output("It is free now", &rules);

        assert_eq!(result.corrected_text, "It is now");
    }

    #[test]
    fn invalid_regex_falls_back_to_case_insensitive_substring() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![rule("bracket", "[limited", RuleAction::Flag, None)];

        let result = engine.validate_output("This is a [LIMITED offer", &rules);

        assert!(result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].matched_text, "[LIMITED");
        assert_eq!(result.violations[0].severity, Severity::Medium);
        assert_eq!(result.corrected_text, "This is a [LIMITED offer");
    }

    #[test]
    fn valid_regex_is_case_sensitive() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![rule("no-shouting", "[A-Z]{5}", RuleAction::Block, None)];

        let quiet = engine.validate_output("hello there friend", &rules);
        assert!(quiet.passed);
        assert!(!quiet.blocked);
        assert!(quiet.violations.is_empty());

        let loud = engine.validate_output("hello THERE friend", &rules);
        assert!(loud.blocked);
        assert_eq!(loud.violations[0].matched_text, "THERE");
    }

    #[test]
    fn zero_length_matches_are_not_violations() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![
            rule("empty-flag", "x*", RuleAction::Flag, None),
            rule("empty-fix", r"\b", RuleAction::AutoCorrect, Some("!")),
        ];

        let result = engine.validate_output("hello", &rules);

        assert!(result.passed);
        assert!(result.violations.is_empty());
        assert_eq!(result.rule_pass_vector(), vec![true, true]);
        assert_eq!(result.corrected_text, "hello");
    }

    #[test]
    fn optional_pattern_still_matches_its_non_empty_occurrence() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![rule("no-xs", "x*", RuleAction::AutoCorrect, Some("y"))];

        let result = engine.validate_output("axxb", &rules);

        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].matched_text, "xx");
        assert_eq!(result.corrected_text, "ayb");
    }

    #[test]
    fn stripping_leaves_untouched_spacing_alone() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![rule("no-asap", "ASAP", RuleAction::AutoCorrect, None)];

        let result = engine.validate_output("Hi  there,  we ship ASAP.", &rules);

        assert_eq!(result.corrected_text, "Hi  there,  we ship.");
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let engine = DeterministicPolicyEngine::new();
        let mut inactive = rule("no-guarantee", "guarantee", RuleAction::Block, None);
        inactive.active = false;

        let result = engine.validate_output("We guarantee results", &[inactive]);

        assert!(result.passed);
        assert!(result.violations.is_empty());
        assert!(result.rule_results.is_empty());
    }

    #[test]
    fn rule_results_track_each_evaluated_rule() {
        let engine = DeterministicPolicyEngine::new();
        let rules = vec![
            rule("flag-price", "price", RuleAction::Flag, None),
            rule("flag-refund", "refund", RuleAction::Flag, None),
        ];

        let result = engine.validate_output("The price is fair", &rules);

        assert_eq!(result.rule_pass_vector(), vec![false, true]);
        assert!(result.passed);
    }
}
