//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use copydesk_compliance::{
    demo_rules, ComplianceEvaluator, ComplianceService, ContextAugmentedEvaluator,
    HttpReasoningBackend, InMemoryPolicyIndex, PolicyRuleStore, RuleMatchingEvaluator,
};
use copydesk_engine::WorkflowEngine;
use copydesk_storage::{InMemoryStorage, Storage};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Copydesk daemon server
pub struct Server {
    config: DaemonConfig,
    state: AppState,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let state = bootstrap(&config).await?;
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(self.state, &self.config.server);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("copydesk daemon listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("copydesk daemon shutting down");
        Ok(())
    }
}

/// Build storage, compliance and the engine from configuration.
pub async fn bootstrap(config: &DaemonConfig) -> DaemonResult<AppState> {
    match &config.storage {
        StorageConfig::Memory => assemble(Arc::new(InMemoryStorage::new()), "memory", config).await,
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let storage = copydesk_storage::postgres::PostgresStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            assemble(Arc::new(storage), "postgres", config).await
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(DaemonError::Config(
            "postgres storage requested but copydeskd was built without the `postgres` feature"
                .to_string(),
        )),
    }
}

async fn assemble<S: Storage + 'static>(
    storage: Arc<S>,
    backend_name: &'static str,
    config: &DaemonConfig,
) -> DaemonResult<AppState> {
    let rules = Arc::new(PolicyRuleStore::new(storage.clone()));
    if config.compliance.seed_demo_rules {
        rules.seed_if_empty(demo_rules()).await?;
    }

    let settings = config.compliance.settings();
    let evaluator: Arc<dyn ComplianceEvaluator> = match &config.compliance.backend {
        Some(backend) => {
            let api_key = std::env::var(&backend.api_key_env).ok();
            if api_key.is_none() {
                tracing::warn!(
                    env = %backend.api_key_env,
                    "No API key found for reasoning backend; sending unauthenticated requests"
                );
            }
            let http = HttpReasoningBackend::new(
                &backend.endpoint,
                backend.model.clone(),
                api_key,
                settings.evaluator_timeout + Duration::from_secs(1),
            )?;
            tracing::info!(endpoint = %http.endpoint(), model = %backend.model, "Reasoning backend enabled");
            Arc::new(ContextAugmentedEvaluator::new(
                rules.clone(),
                Arc::new(http),
                settings.evaluator_timeout,
            ))
        }
        None => Arc::new(RuleMatchingEvaluator::new(rules.clone())),
    };

    let index = Arc::new(InMemoryPolicyIndex::new());
    let compliance = Arc::new(ComplianceService::new(
        rules,
        evaluator,
        index.clone(),
        storage.clone(),
        settings,
    ));
    let engine = Arc::new(WorkflowEngine::new(
        storage,
        compliance,
        config.workflow.clone(),
    )?);

    tracing::info!(
        storage = backend_name,
        steps = config.workflow.step_template.len(),
        enforce_identity = config.workflow.enforce_identity,
        "Workflow engine ready"
    );
    Ok(AppState::new(engine, index, backend_name))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
