use copydesk_types::{PolicyRuleDraft, Severity};

/// Starter rule set for fresh deployments and local development.
pub fn demo_rules() -> Vec<PolicyRuleDraft> {
    vec![
        PolicyRuleDraft::new(
            "100% waterproof",
            "Absolute durability claims cannot be substantiated",
            "water-resistant (IP68 rated)",
            "product_claims",
            Severity::High,
        ),
        PolicyRuleDraft::new(
            "guaranteed",
            "Guarantees create contractual obligations",
            "backed by our warranty",
            "legal",
            Severity::Medium,
        ),
        PolicyRuleDraft::new(
            "never fail",
            "Claims of infallibility are misleading",
            "built to last",
            "product_claims",
            Severity::High,
        ),
        PolicyRuleDraft::new(
            "risk-free",
            "Financial products always carry risk",
            "low-risk",
            "financial",
            Severity::High,
        ),
        PolicyRuleDraft::new(
            "clinically proven",
            "Clinical claims require documented trials",
            "tested with users",
            "health",
            Severity::High,
        ),
        PolicyRuleDraft::new(
            "no side effects",
            "Health products cannot rule out side effects",
            "well tolerated",
            "health",
            Severity::High,
        ),
        PolicyRuleDraft::new(
            "best in the world",
            "Superlatives need independent evidence",
            "one of the finest",
            "comparative",
            Severity::Medium,
        ),
        PolicyRuleDraft::new(
            "lowest price",
            "Price comparisons go stale quickly",
            "competitive price",
            "pricing",
            Severity::Low,
        ),
        PolicyRuleDraft::new(
            "act now",
            "Pressure tactics erode trust",
            "available today",
            "tone",
            Severity::Low,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_rules_are_valid() {
        for draft in demo_rules() {
            assert!(draft.validate().is_ok(), "{} failed validation", draft.pattern);
        }
    }
}
