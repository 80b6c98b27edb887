use copydesk_types::{ComplianceResult, Issue};
use serde::Serialize;

/// Outcome of the submission gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "issues", rename_all = "snake_case")]
pub enum GateDecision {
    Allowed,
    /// The high-severity issues that block submission
    Blocked(Vec<Issue>),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// Pure submission decision: any high-severity issue blocks.
pub struct ComplianceGate;

impl ComplianceGate {
    pub fn can_submit(result: &ComplianceResult) -> GateDecision {
        let blocking = result.high_severity_issues();
        if blocking.is_empty() {
            GateDecision::Allowed
        } else {
            GateDecision::Blocked(blocking)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copydesk_types::Severity;
    use proptest::prelude::*;

    fn issue(severity: Severity) -> Issue {
        Issue {
            matched_text: "claim".to_string(),
            reason: "reason".to_string(),
            suggestion: "alternative".to_string(),
            severity,
            category: "general".to_string(),
        }
    }

    #[test]
    fn medium_and_low_issues_do_not_block() {
        let result = ComplianceResult::from_issues(
            vec![issue(Severity::Medium), issue(Severity::Low)],
            "rewritten",
        );
        assert!(!result.is_compliant);
        assert_eq!(ComplianceGate::can_submit(&result), GateDecision::Allowed);
    }

    #[test]
    fn manual_review_verdict_blocks() {
        let result = ComplianceResult::manual_review_required("text");
        match ComplianceGate::can_submit(&result) {
            GateDecision::Blocked(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].category, "system");
            }
            GateDecision::Allowed => panic!("fallback verdict must block"),
        }
    }

    fn severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Low),
            Just(Severity::Medium),
            Just(Severity::High)
        ]
    }

    proptest! {
        #[test]
        fn property_blocks_iff_high_issue(severities in proptest::collection::vec(severity(), 0..8)) {
            let issues = severities.iter().copied().map(issue).collect::<Vec<_>>();
            let result = ComplianceResult::from_issues(issues, "rewrite");
            let has_high = severities.contains(&Severity::High);
            match ComplianceGate::can_submit(&result) {
                GateDecision::Allowed => prop_assert!(!has_high),
                GateDecision::Blocked(blocking) => {
                    prop_assert!(has_high);
                    prop_assert!(blocking.iter().all(|i| i.severity == Severity::High));
                    prop_assert_eq!(
                        blocking.len(),
                        severities.iter().filter(|s| **s == Severity::High).count()
                    );
                }
            }
        }
    }
}
