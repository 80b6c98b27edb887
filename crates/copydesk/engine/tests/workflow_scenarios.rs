mod common;

use common::{harness, harness_with, CLEAN_COPY, WATERPROOF_COPY};
use copydesk_engine::{ContentEdit, EngineConfig, EngineError};
use copydesk_storage::{QueryWindow, WorkflowStore};
use copydesk_types::{
    ContentStatus, Role, Severity, StepStatus, StepTemplate, WorkflowEvent, WorkflowStatus,
};

#[tokio::test]
async fn waterproof_claims_are_flagged() {
    let h = harness().await;
    let result = h.engine.check_text(WATERPROOF_COPY, false).await.unwrap();

    assert!(!result.is_compliant);
    assert_eq!(result.issues.len(), 3);
    assert_eq!(result.highest_severity(), Some(Severity::High));
    assert_eq!(
        result
            .issues
            .iter()
            .filter(|issue| issue.severity == Severity::Medium)
            .count(),
        1
    );
    let rewrite = result.suggested_rewrite.to_lowercase();
    for phrase in ["100% waterproof", "guaranteed", "never fail"] {
        assert!(!rewrite.contains(phrase), "rewrite still contains {phrase}");
    }
}

#[tokio::test]
async fn clean_copy_is_untouched() {
    let h = harness().await;
    let result = h.engine.check_text(CLEAN_COPY, false).await.unwrap();
    assert!(result.is_compliant);
    assert!(result.issues.is_empty());
    assert_eq!(result.suggested_rewrite, CLEAN_COPY);
}

#[tokio::test]
async fn high_issue_blocks_submission() {
    let h = harness().await;
    let content = h.draft(WATERPROOF_COPY).await;

    let err = h.engine.submit(&content.id).await.unwrap_err();
    match err {
        EngineError::Blocked { issues } => {
            assert_eq!(issues.len(), 2);
            assert!(issues.iter().all(|issue| issue.severity == Severity::High));
        }
        other => panic!("expected Blocked, got {other:?}"),
    }

    let stored = h.engine.get_content(&content.id).await.unwrap();
    assert_eq!(stored.status, ContentStatus::Draft);
    assert!(h.engine.current_workflow(&content.id).await.unwrap().is_none());
}

#[tokio::test]
async fn full_chain_approves_content() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;

    let submitted = h.engine.submit(&content.id).await.unwrap();
    assert_eq!(submitted.content.status, ContentStatus::PendingReview);
    let workflow = submitted.workflow;
    assert_eq!(workflow.current_step_number, 1);
    assert!(workflow.check_invariant().is_ok());

    let step1 = workflow.step_by_number(1).unwrap().id.clone();
    let step2 = workflow.step_by_number(2).unwrap().id.clone();
    let step3 = workflow.step_by_number(3).unwrap().id.clone();

    let after1 = h.engine.approve(&step1, Some(&h.manager.id)).await.unwrap();
    assert_eq!(after1.content.status, ContentStatus::InReview);
    assert_eq!(
        after1.workflow.step_by_number(2).unwrap().status,
        StepStatus::InProgress
    );
    assert_eq!(
        after1.workflow.step_by_number(1).unwrap().assignee_id,
        Some(h.manager.id.clone())
    );
    assert!(after1.workflow.check_invariant().is_ok());

    let after2 = h.engine.approve(&step2, Some(&h.legal.id)).await.unwrap();
    assert_eq!(
        after2.workflow.step_by_number(3).unwrap().status,
        StepStatus::InProgress
    );
    assert_eq!(after2.workflow.current_step_number, 3);

    let after3 = h.engine.approve(&step3, Some(&h.executive.id)).await.unwrap();
    assert_eq!(after3.workflow.status, WorkflowStatus::Completed);
    assert!(after3.workflow.completed_at.is_some());
    assert_eq!(after3.content.status, ContentStatus::Approved);
    assert!(after3.workflow.check_invariant().is_ok());

    let published = h.engine.publish(&content.id).await.unwrap();
    assert_eq!(published.status, ContentStatus::Published);
}

#[tokio::test]
async fn reject_edit_resubmit_starts_fresh() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let first = h.engine.submit(&content.id).await.unwrap().workflow;
    let step1 = first.step_by_number(1).unwrap().id.clone();

    let rejected = h
        .engine
        .reject(&step1, Some(&h.manager.id), "fix claim X")
        .await
        .unwrap();
    assert_eq!(rejected.content.status, ContentStatus::ChangesRequested);
    assert_eq!(rejected.workflow.status, WorkflowStatus::Cancelled);
    let decided = rejected.workflow.step_by_number(1).unwrap();
    assert_eq!(decided.status, StepStatus::Rejected);
    assert_eq!(decided.feedback.as_deref(), Some("fix claim X"));

    let comments = h.engine.list_comments(&step1).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].text, "fix claim X");

    let edited = h
        .engine
        .edit_content(
            &content.id,
            ContentEdit {
                text: Some("Meet the phone that keeps up with your whole day.".to_string()),
                ..ContentEdit::default()
            },
            Some(&h.creator.id),
        )
        .await
        .unwrap();
    assert_eq!(edited.version, 2);
    assert!(edited.current_compliance().is_some());

    let second = h.engine.submit(&content.id).await.unwrap().workflow;
    assert_ne!(second.id, first.id);
    assert_eq!(
        second.step_by_number(1).unwrap().status,
        StepStatus::InProgress
    );

    let history = h.engine.workflow_history(&content.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    let old = history.iter().find(|w| w.id == first.id).unwrap();
    assert_eq!(old.status, WorkflowStatus::Cancelled);
    assert_eq!(old.step_by_number(1).unwrap().status, StepStatus::Rejected);
    assert!(old.superseded_at.is_some());
}

#[tokio::test]
async fn wrong_role_is_refused_with_details() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let workflow = h.engine.submit(&content.id).await.unwrap().workflow;
    let step1 = workflow.step_by_number(1).unwrap().id.clone();

    let err = h.engine.approve(&step1, Some(&h.legal.id)).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::RoleMismatch {
            required: Role::Manager,
            actual: Role::Legal
        }
    ));

    let current = h.engine.current_workflow(&content.id).await.unwrap().unwrap();
    assert_eq!(current.current_step_number, 1);
    assert_eq!(
        current.step_by_number(1).unwrap().status,
        StepStatus::InProgress
    );
}

#[tokio::test]
async fn later_step_cannot_be_decided_early() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let workflow = h.engine.submit(&content.id).await.unwrap().workflow;
    let step2 = workflow.step_by_number(2).unwrap().id.clone();

    let err = h.engine.approve(&step2, Some(&h.legal.id)).await.unwrap_err();
    assert!(matches!(err, EngineError::StateConflict(_)));
}

#[tokio::test]
async fn reject_requires_feedback() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let workflow = h.engine.submit(&content.id).await.unwrap().workflow;
    let step1 = workflow.step_by_number(1).unwrap().id.clone();

    let err = h
        .engine
        .reject(&step1, Some(&h.manager.id), "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingFeedback));
}

#[tokio::test]
async fn anonymous_decisions_follow_identity_policy() {
    let relaxed = harness().await;
    let content = relaxed.draft(CLEAN_COPY).await;
    let workflow = relaxed.engine.submit(&content.id).await.unwrap().workflow;
    let step1 = workflow.step_by_number(1).unwrap().id.clone();
    let outcome = relaxed.engine.approve(&step1, None).await.unwrap();
    assert_eq!(outcome.workflow.step_by_number(1).unwrap().assignee_id, None);

    let strict = harness_with(EngineConfig {
        enforce_identity: true,
        ..EngineConfig::default()
    })
    .await;
    let content = strict.draft(CLEAN_COPY).await;
    let workflow = strict.engine.submit(&content.id).await.unwrap().workflow;
    let step1 = workflow.step_by_number(1).unwrap().id.clone();
    let err = strict.engine.approve(&step1, None).await.unwrap_err();
    assert!(matches!(err, EngineError::IdentityRequired));
}

#[tokio::test]
async fn publish_requires_approval() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let err = h.engine.publish(&content.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotApproved(ContentStatus::Draft)));
}

#[tokio::test]
async fn approved_content_cannot_be_resubmitted_or_edited() {
    let h = harness_with(EngineConfig {
        step_template: vec![StepTemplate::new("Sign-off", Role::Manager)],
        ..EngineConfig::default()
    })
    .await;
    let content = h.draft(CLEAN_COPY).await;
    let workflow = h.engine.submit(&content.id).await.unwrap().workflow;
    assert_eq!(workflow.steps.len(), 1);
    let only = workflow.steps[0].id.clone();
    let outcome = h.engine.approve(&only, Some(&h.manager.id)).await.unwrap();
    assert_eq!(outcome.content.status, ContentStatus::Approved);

    assert!(matches!(
        h.engine.submit(&content.id).await,
        Err(EngineError::StateConflict(_))
    ));
    assert!(matches!(
        h.engine
            .edit_content(
                &content.id,
                ContentEdit {
                    title: Some("New".to_string()),
                    ..ContentEdit::default()
                },
                None
            )
            .await,
        Err(EngineError::StateConflict(_))
    ));
}

#[tokio::test]
async fn resubmitting_mid_review_supersedes_active_workflow() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let first = h.engine.submit(&content.id).await.unwrap().workflow;
    let step1 = first.step_by_number(1).unwrap().id.clone();
    h.engine.approve(&step1, Some(&h.manager.id)).await.unwrap();

    let second = h.engine.submit(&content.id).await.unwrap();
    assert_eq!(second.content.status, ContentStatus::PendingReview);
    assert_eq!(second.workflow.current_step_number, 1);

    let old = h.storage.get_workflow(&first.id).await.unwrap().unwrap();
    assert_eq!(old.status, WorkflowStatus::Cancelled);
    assert_eq!(old.step_by_number(2).unwrap().status, StepStatus::Skipped);
    assert!(old.check_invariant().is_ok());

    // Steps of the superseded workflow can no longer be decided.
    let stale = old.step_by_number(2).unwrap().id.clone();
    assert!(matches!(
        h.engine.approve(&stale, Some(&h.legal.id)).await,
        Err(EngineError::StateConflict(_))
    ));
}

#[tokio::test]
async fn only_the_creator_may_edit() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let err = h
        .engine
        .edit_content(
            &content.id,
            ContentEdit {
                title: Some("Hijacked".to_string()),
                ..ContentEdit::default()
            },
            Some(&h.manager.id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotOwner));
}

#[tokio::test]
async fn unchanged_text_keeps_version_and_verdict() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let before = h
        .engine
        .compliance()
        .list_checks(QueryWindow::default())
        .await
        .unwrap()
        .len();

    let edited = h
        .engine
        .edit_content(
            &content.id,
            ContentEdit {
                text: Some(CLEAN_COPY.to_string()),
                title: Some("Renamed".to_string()),
                ..ContentEdit::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(edited.version, 1);
    assert_eq!(edited.title, "Renamed");

    let after = h
        .engine
        .compliance()
        .list_checks(QueryWindow::default())
        .await
        .unwrap()
        .len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn fixing_the_text_unblocks_submission() {
    let h = harness().await;
    let content = h.draft(WATERPROOF_COPY).await;
    let rewrite = content
        .current_compliance()
        .unwrap()
        .suggested_rewrite
        .clone();

    let edited = h
        .engine
        .edit_content(
            &content.id,
            ContentEdit {
                text: Some(rewrite),
                ..ContentEdit::default()
            },
            Some(&h.creator.id),
        )
        .await
        .unwrap();
    assert!(edited.current_compliance().unwrap().is_compliant);
    assert!(h.engine.submit(&content.id).await.is_ok());
}

#[tokio::test]
async fn pending_approvals_follow_the_chain() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let workflow = h.engine.submit(&content.id).await.unwrap().workflow;

    let managers = h.engine.pending_approvals(Some(Role::Manager)).await.unwrap();
    assert_eq!(managers.len(), 1);
    assert_eq!(managers[0].content_id, content.id);
    assert!(h
        .engine
        .pending_approvals(Some(Role::Legal))
        .await
        .unwrap()
        .is_empty());

    let step1 = workflow.step_by_number(1).unwrap().id.clone();
    h.engine.approve(&step1, Some(&h.manager.id)).await.unwrap();
    assert!(h
        .engine
        .pending_approvals(Some(Role::Manager))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        h.engine
            .pending_approvals(Some(Role::Legal))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn committed_transitions_are_broadcast() {
    let h = harness().await;
    let mut events = h.engine.subscribe();
    let content = h.draft(CLEAN_COPY).await;
    let workflow = h.engine.submit(&content.id).await.unwrap().workflow;
    let step1 = workflow.step_by_number(1).unwrap().id.clone();
    h.engine.approve(&step1, Some(&h.manager.id)).await.unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        WorkflowEvent::ContentCreated { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        WorkflowEvent::Submitted { .. }
    ));
    match events.recv().await.unwrap() {
        WorkflowEvent::StepApproved {
            step_number,
            content_status,
            ..
        } => {
            assert_eq!(step_number, 1);
            assert_eq!(content_status, ContentStatus::InReview);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let h = harness().await;
    let err = h
        .engine
        .create_user("Other", "Casey@Example.com", Role::Legal)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateConflict(_)));
}

#[tokio::test]
async fn content_for_unknown_creator_is_not_found() {
    let h = harness().await;
    let err = h
        .engine
        .create_content(copydesk_engine::NewContent {
            title: "t".to_string(),
            text: CLEAN_COPY.to_string(),
            description: String::new(),
            creator_id: copydesk_types::UserId::new("ghost"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}
