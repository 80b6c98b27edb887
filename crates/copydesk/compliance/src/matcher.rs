//! Deterministic rule matching and rewrite.

use crate::{ComplianceError, Result};
use copydesk_types::{ComplianceResult, Issue, PolicyRule};
use regex::{NoExpand, Regex, RegexBuilder};
use std::ops::Range;

/// Upper bound on rewrite passes before a rule set is considered cyclic.
const MAX_REWRITE_PASSES: usize = 16;

struct CompiledRule {
    rule: PolicyRule,
    regex: Regex,
}

/// An immutable, compiled snapshot of the active rules.
///
/// Rules are held longest pattern first (ties by insertion position), which is
/// the order in which they are tried and rewritten.
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Compile the active rules. Inactive rules are dropped.
    pub fn compile(rules: impl IntoIterator<Item = PolicyRule>) -> Result<Self> {
        let mut compiled = rules
            .into_iter()
            .filter(|rule| rule.active)
            .map(|rule| {
                let regex = RegexBuilder::new(&regex::escape(&rule.pattern))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ComplianceError::InvalidInput(format!(
                            "pattern '{}' cannot be compiled: {e}",
                            rule.pattern
                        ))
                    })?;
                Ok(CompiledRule { rule, regex })
            })
            .collect::<Result<Vec<_>>>()?;

        compiled.sort_by(|a, b| {
            b.rule
                .pattern
                .chars()
                .count()
                .cmp(&a.rule.pattern.chars().count())
                .then(a.rule.position.cmp(&b.rule.position))
        });
        Ok(Self { rules: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Rules in matching order.
    pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    /// Match every rule against `text` and build the verdict.
    ///
    /// Fails with `InvalidInput` when the rules keep re-creating each other's
    /// patterns so that no stable rewrite exists.
    pub fn evaluate(&self, text: &str) -> Result<ComplianceResult> {
        let mut claimed: Vec<Range<usize>> = Vec::new();
        let mut present: Vec<&CompiledRule> = Vec::new();
        let mut matched: Vec<(&CompiledRule, Range<usize>)> = Vec::new();

        for compiled in &self.rules {
            let spans = compiled
                .regex
                .find_iter(text)
                .map(|m| m.range())
                .collect::<Vec<_>>();
            let Some(first) = spans.first().cloned() else {
                continue;
            };
            present.push(compiled);
            // A shorter pattern living only inside longer matches adds nothing.
            let subsumed = spans.iter().all(|span| {
                claimed
                    .iter()
                    .any(|c| c.start <= span.start && span.end <= c.end)
            });
            if subsumed {
                continue;
            }
            claimed.extend(spans);
            matched.push((compiled, first));
        }

        if matched.is_empty() {
            return Ok(ComplianceResult::compliant(text));
        }

        // Subsumed rules are rewritten too: an earlier replacement may have
        // consumed only part of the longer match that covered them.
        let mut rewrite = text.to_string();
        for compiled in present {
            rewrite = compiled
                .regex
                .replace_all(&rewrite, NoExpand(&compiled.rule.suggestion))
                .into_owned();
        }
        let rewrite = self.settle(rewrite)?;

        let mut ordered = matched;
        ordered.sort_by(|(a, _), (b, _)| {
            b.rule
                .severity
                .cmp(&a.rule.severity)
                .then(a.rule.position.cmp(&b.rule.position))
        });
        let issues = ordered
            .into_iter()
            .map(|(compiled, first)| Issue {
                matched_text: text[first].to_string(),
                reason: compiled.rule.reason.clone(),
                suggestion: compiled.rule.suggestion.clone(),
                severity: compiled.rule.severity,
                category: compiled.rule.category.clone(),
            })
            .collect();

        Ok(ComplianceResult::from_issues(issues, rewrite))
    }

    /// Replacements can splice with neighbouring text and spell a pattern
    /// again. Keep rewriting until no rule matches.
    fn settle(&self, mut rewrite: String) -> Result<String> {
        for _ in 0..MAX_REWRITE_PASSES {
            let mut changed = false;
            for compiled in &self.rules {
                if compiled.regex.is_match(&rewrite) {
                    rewrite = compiled
                        .regex
                        .replace_all(&rewrite, NoExpand(&compiled.rule.suggestion))
                        .into_owned();
                    changed = true;
                }
            }
            if !changed {
                return Ok(rewrite);
            }
        }

        let cycling = self
            .rules
            .iter()
            .filter(|compiled| compiled.regex.is_match(&rewrite))
            .map(|compiled| compiled.rule.pattern.as_str())
            .collect::<Vec<_>>();
        if cycling.is_empty() {
            return Ok(rewrite);
        }
        Err(ComplianceError::InvalidInput(format!(
            "rules {:?} rewrite into each other's patterns; no stable suggestion exists",
            cycling
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_rules;
    use copydesk_types::{PolicyRuleDraft, Severity};
    use proptest::prelude::*;

    fn rule_set(drafts: Vec<PolicyRuleDraft>) -> RuleSet {
        let rules = drafts
            .into_iter()
            .enumerate()
            .map(|(idx, draft)| PolicyRule::from_draft(draft, idx as u64 + 1).unwrap())
            .collect::<Vec<_>>();
        RuleSet::compile(rules).unwrap()
    }

    #[test]
    fn demo_rules_flag_waterproof_claim() {
        let set = rule_set(demo_rules());
        let text = "Our phone is 100% waterproof and guaranteed to never fail.";
        let result = set.evaluate(text).unwrap();

        assert!(!result.is_compliant);
        assert_eq!(result.issues.len(), 3);
        assert_eq!(result.highest_severity(), Some(Severity::High));
        let severities = result
            .issues
            .iter()
            .map(|issue| issue.severity)
            .collect::<Vec<_>>();
        assert_eq!(
            severities,
            vec![Severity::High, Severity::High, Severity::Medium]
        );
        assert_eq!(result.issues[0].matched_text, "100% waterproof");
        assert_eq!(result.issues[2].matched_text, "guaranteed");

        let rewrite = result.suggested_rewrite.to_lowercase();
        assert!(!rewrite.contains("100% waterproof"));
        assert!(!rewrite.contains("guaranteed"));
        assert!(!rewrite.contains("never fail"));
    }

    #[test]
    fn clean_text_is_compliant_and_unchanged() {
        let set = rule_set(demo_rules());
        let text = "A thoughtfully designed phone for everyday use.";
        let result = set.evaluate(text).unwrap();
        assert!(result.is_compliant);
        assert!(result.issues.is_empty());
        assert_eq!(result.suggested_rewrite, text);
    }

    #[test]
    fn no_rules_means_compliant() {
        let result = RuleSet::empty().evaluate("anything goes").unwrap();
        assert!(result.is_compliant);
        assert_eq!(result.suggested_rewrite, "anything goes");
    }

    #[test]
    fn matched_text_keeps_original_casing() {
        let set = rule_set(vec![PolicyRuleDraft::new(
            "risk-free",
            "Absolute claim",
            "low-risk",
            "claims",
            Severity::Medium,
        )]);
        let result = set.evaluate("Totally RISK-FREE investing").unwrap();
        assert_eq!(result.issues[0].matched_text, "RISK-FREE");
        assert_eq!(result.suggested_rewrite, "Totally low-risk investing");
    }

    #[test]
    fn shorter_pattern_inside_longer_match_is_subsumed() {
        let set = rule_set(vec![
            PolicyRuleDraft::new("free", "Pricing claim", "included", "pricing", Severity::Low),
            PolicyRuleDraft::new(
                "risk free",
                "Absolute claim",
                "lower risk",
                "claims",
                Severity::High,
            ),
        ]);

        let only_long = set.evaluate("A risk free plan").unwrap();
        assert_eq!(only_long.issues.len(), 1);
        assert_eq!(only_long.issues[0].matched_text, "risk free");

        let both = set.evaluate("A risk free plan with free shipping").unwrap();
        assert_eq!(both.issues.len(), 2);
        assert_eq!(both.suggested_rewrite, "A lower risk plan with included shipping");
    }

    #[test]
    fn replacement_is_inserted_literally() {
        let set = rule_set(vec![PolicyRuleDraft::new(
            "cheapest",
            "Comparative claim",
            "from $5 (${price})",
            "pricing",
            Severity::Low,
        )]);
        let result = set.evaluate("The cheapest plan").unwrap();
        assert_eq!(result.suggested_rewrite, "The from $5 (${price}) plan");
    }

    #[test]
    fn equal_severity_keeps_insertion_order() {
        let set = rule_set(vec![
            PolicyRuleDraft::new("best", "Superlative", "great", "claims", Severity::Low),
            PolicyRuleDraft::new("amazing", "Hype", "notable", "tone", Severity::Low),
        ]);
        let result = set.evaluate("An amazing deal, the best one").unwrap();
        let texts = result
            .issues
            .iter()
            .map(|issue| issue.matched_text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["best", "amazing"]);
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let mut rule = PolicyRule::from_draft(
            PolicyRuleDraft::new("miracle", "Health claim", "remarkable", "health", Severity::High),
            1,
        )
        .unwrap();
        rule.active = false;
        let set = RuleSet::compile(vec![rule]).unwrap();
        assert!(set.is_empty());
        assert!(set.evaluate("a miracle cure").unwrap().is_compliant);
    }

    #[test]
    fn rewrite_that_splices_a_pattern_is_rewritten_again() {
        let set = rule_set(vec![PolicyRuleDraft::new(
            "free gift",
            "Pricing claim",
            "gift",
            "pricing",
            Severity::High,
        )]);
        let result = set.evaluate("Get a free free gift gift today").unwrap();
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.suggested_rewrite, "Get a gift gift today");

        let again = set.evaluate(&result.suggested_rewrite).unwrap();
        assert!(again.is_compliant);
    }

    #[test]
    fn rules_rewriting_into_each_other_are_rejected() {
        let set = rule_set(vec![
            PolicyRuleDraft::new("alpha", "First", "beta", "general", Severity::Low),
            PolicyRuleDraft::new("beta", "Second", "alpha", "general", Severity::Low),
        ]);
        assert!(matches!(
            set.evaluate("Try the alpha build"),
            Err(ComplianceError::InvalidInput(_))
        ));
        assert!(set.evaluate("Nothing to see").unwrap().is_compliant);
    }

    fn word() -> impl Strategy<Value = String> {
        "[abc]{1,4}"
    }

    fn draft() -> impl Strategy<Value = PolicyRuleDraft> {
        (word(), "[abc]{0,3}", prop_oneof![
            Just(Severity::Low),
            Just(Severity::Medium),
            Just(Severity::High)
        ])
            .prop_map(|(pattern, suggestion, severity)| {
                PolicyRuleDraft::new(pattern, "reason", suggestion, "general", severity)
            })
            .prop_filter("suggestion must not contain its pattern", |draft| {
                draft.validate().is_ok()
            })
    }

    proptest! {
        #[test]
        fn property_evaluation_is_idempotent(
            drafts in proptest::collection::vec(draft(), 0..6),
            words in proptest::collection::vec(word(), 0..20),
        ) {
            let set = rule_set(drafts);
            let text = words.join(" ");
            match (set.evaluate(&text), set.evaluate(&text)) {
                (Ok(first), Ok(second)) => prop_assert!(first.same_verdict(&second)),
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "evaluation is not deterministic"),
            }
        }

        #[test]
        fn property_rewrite_does_not_retrigger(
            drafts in proptest::collection::vec(draft(), 1..6),
            words in proptest::collection::vec(word(), 1..20),
        ) {
            let set = rule_set(drafts);
            let text = words.join(" ");
            if let Ok(first) = set.evaluate(&text) {
                let second = set.evaluate(&first.suggested_rewrite).unwrap();
                prop_assert!(second.is_compliant);
                prop_assert_eq!(&second.suggested_rewrite, &first.suggested_rewrite);
            }
        }

        #[test]
        fn property_issues_are_sorted_by_severity(
            drafts in proptest::collection::vec(draft(), 0..6),
            words in proptest::collection::vec(word(), 0..20),
        ) {
            let set = rule_set(drafts);
            if let Ok(result) = set.evaluate(&words.join(" ")) {
                for pair in result.issues.windows(2) {
                    prop_assert!(pair[0].severity >= pair[1].severity);
                }
                prop_assert_eq!(result.is_compliant, result.issues.is_empty());
            }
        }
    }
}
