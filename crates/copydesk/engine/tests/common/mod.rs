#![allow(dead_code)]

use copydesk_compliance::{
    demo_rules, ComplianceService, ComplianceSettings, NoopRetrieval, PolicyRuleStore,
    RuleMatchingEvaluator,
};
use copydesk_engine::{EngineConfig, NewContent, WorkflowEngine};
use copydesk_storage::InMemoryStorage;
use copydesk_types::{Content, Role, User};
use std::sync::Arc;

pub const WATERPROOF_COPY: &str = "Our phone is 100% waterproof and guaranteed to never fail.";
pub const CLEAN_COPY: &str = "Meet the phone that keeps up with your day.";

pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub engine: Arc<WorkflowEngine>,
    pub creator: User,
    pub manager: User,
    pub legal: User,
    pub executive: User,
}

pub async fn compliance_for(storage: Arc<InMemoryStorage>) -> Arc<ComplianceService> {
    let rules = Arc::new(PolicyRuleStore::new(storage.clone()));
    rules.seed_if_empty(demo_rules()).await.unwrap();
    Arc::new(ComplianceService::new(
        rules.clone(),
        Arc::new(RuleMatchingEvaluator::new(rules)),
        Arc::new(NoopRetrieval),
        storage,
        ComplianceSettings::default(),
    ))
}

pub async fn harness_with(config: EngineConfig) -> Harness {
    let storage = Arc::new(InMemoryStorage::new());
    let compliance = compliance_for(storage.clone()).await;
    let engine = Arc::new(WorkflowEngine::new(storage.clone(), compliance, config).unwrap());

    let creator = engine
        .create_user("Casey Creator", "casey@example.com", Role::Creator)
        .await
        .unwrap();
    let manager = engine
        .create_user("Morgan Manager", "morgan@example.com", Role::Manager)
        .await
        .unwrap();
    let legal = engine
        .create_user("Lee Legal", "lee@example.com", Role::Legal)
        .await
        .unwrap();
    let executive = engine
        .create_user("Emery Executive", "emery@example.com", Role::Executive)
        .await
        .unwrap();

    Harness {
        storage,
        engine,
        creator,
        manager,
        legal,
        executive,
    }
}

pub async fn harness() -> Harness {
    harness_with(EngineConfig::default()).await
}

impl Harness {
    pub async fn draft(&self, text: &str) -> Content {
        self.engine
            .create_content(NewContent {
                title: "Launch copy".to_string(),
                text: text.to_string(),
                description: String::new(),
                creator_id: self.creator.id.clone(),
            })
            .await
            .unwrap()
    }
}
