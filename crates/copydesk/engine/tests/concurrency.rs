mod common;

use common::{compliance_for, harness, CLEAN_COPY};
use copydesk_engine::{EngineConfig, EngineError, WorkflowEngine};
use copydesk_types::{StepStatus, WorkflowStatus};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_approvals_yield_one_winner() {
    let h = harness().await;
    let content = h.draft(CLEAN_COPY).await;
    let workflow = h.engine.submit(&content.id).await.unwrap().workflow;
    let step1 = workflow.step_by_number(1).unwrap().id.clone();

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let engine = h.engine.clone();
        let step = step1.clone();
        let manager = h.manager.id.clone();
        tasks.push(tokio::spawn(async move {
            engine.approve(&step, Some(&manager)).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(EngineError::StateConflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!((wins, conflicts), (1, 1));

    let current = h.engine.current_workflow(&content.id).await.unwrap().unwrap();
    assert_eq!(current.current_step_number, 2);
    assert!(current.check_invariant().is_ok());
}

/// Two engines over one store share no in-process lock; the storage
/// compare-and-set alone must pick the winner.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn storage_arbitrates_between_engines() {
    let h = harness().await;
    let other = Arc::new(
        WorkflowEngine::new(
            h.storage.clone(),
            compliance_for(h.storage.clone()).await,
            EngineConfig::default(),
        )
        .unwrap(),
    );
    let content = h.draft(CLEAN_COPY).await;
    let workflow = h.engine.submit(&content.id).await.unwrap().workflow;
    let step1 = workflow.step_by_number(1).unwrap().id.clone();

    let approve = {
        let engine = h.engine.clone();
        let step = step1.clone();
        let manager = h.manager.id.clone();
        tokio::spawn(async move { engine.approve(&step, Some(&manager)).await })
    };
    let reject = {
        let engine = other.clone();
        let step = step1.clone();
        let manager = h.manager.id.clone();
        tokio::spawn(async move { engine.reject(&step, Some(&manager), "not yet").await })
    };

    let results = [approve.await.unwrap(), reject.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, EngineError::StateConflict(_))));

    let current = h.engine.current_workflow(&content.id).await.unwrap().unwrap();
    assert!(current.check_invariant().is_ok());
    let first = current.step_by_number(1).unwrap();
    match current.status {
        WorkflowStatus::Active => assert_eq!(first.status, StepStatus::Approved),
        WorkflowStatus::Cancelled => assert_eq!(first.status, StepStatus::Rejected),
        WorkflowStatus::Completed => panic!("a three-step workflow cannot complete here"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_content_progresses_in_parallel() {
    let h = harness().await;
    let mut steps = Vec::new();
    for _ in 0..8 {
        let content = h.draft(CLEAN_COPY).await;
        let workflow = h.engine.submit(&content.id).await.unwrap().workflow;
        steps.push(workflow.step_by_number(1).unwrap().id.clone());
    }

    let tasks = steps
        .into_iter()
        .map(|step| {
            let engine = h.engine.clone();
            let manager = h.manager.id.clone();
            tokio::spawn(async move { engine.approve(&step, Some(&manager)).await })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
}
