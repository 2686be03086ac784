//! Composition root
//!
//! Turns an [`AppConfig`] into a running [`ChaosService`]: checks the
//! configuration, opens the ledger, wires adapters and drivers, and rolls
//! back executions a previous process left behind.

use std::sync::Arc;

use application::ports::{
    ExecutionLedgerPort, ExperimentRegistryPort, InfrastructureClient, NotifierPort,
    RemoteCommandPort,
};
use application::{ApplicationError, ChaosService, CustomPredicate, HypothesisValidator, PhaseExecutor};
use domain::ExecutionId;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::adapters::{
    HttpAgentTransport, HttpControlPlane, InMemoryExecutionLedger, InMemoryExperimentRegistry,
    LogNotifier, WebhookNotifier,
};
use crate::config::{AppConfig, NotifierKind};
use crate::drivers::standard_registry;
use crate::http::PlatformHttpClient;
use crate::persistence::{AsyncDatabase, AsyncDatabaseError, SqliteExecutionLedger, SqliteExperimentRegistry};
use crate::validation::ConfigValidator;

/// Errors that stop the orchestrator from starting
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Refusing to start with unsafe configuration: {}", .0.join(", "))]
    UnsafeConfiguration(Vec<String>),

    #[error("Database error: {0}")]
    Database(#[from] AsyncDatabaseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("Orphan recovery failed: {0}")]
    Recovery(#[source] ApplicationError),
}

/// Builder for [`Orchestrator`]
///
/// Ports default to the HTTP adapters described by the configuration;
/// tests swap in their own.
pub struct OrchestratorBuilder {
    config: AppConfig,
    infrastructure: Option<Arc<dyn InfrastructureClient>>,
    agent: Option<Arc<dyn RemoteCommandPort>>,
    notifier: Option<Arc<dyn NotifierPort>>,
    validator: HypothesisValidator,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("environment", &self.config.environment)
            .field("custom_infrastructure", &self.infrastructure.is_some())
            .field("custom_agent", &self.agent.is_some())
            .field("custom_notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            infrastructure: None,
            agent: None,
            notifier: None,
            validator: HypothesisValidator::new(),
        }
    }

    #[must_use]
    pub fn with_infrastructure(mut self, infrastructure: Arc<dyn InfrastructureClient>) -> Self {
        self.infrastructure = Some(infrastructure);
        self
    }

    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn RemoteCommandPort>) -> Self {
        self.agent = Some(agent);
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotifierPort>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Register a predicate usable from `custom` success criteria
    #[must_use]
    pub fn with_predicate(mut self, id: impl Into<String>, predicate: Arc<dyn CustomPredicate>) -> Self {
        self.validator = self.validator.with_predicate(id, predicate);
        self
    }

    /// Wire everything and recover orphaned executions
    ///
    /// # Errors
    ///
    /// Fails on unsafe production configuration, an unreachable ledger,
    /// HTTP client construction or orphan recovery errors.
    #[instrument(skip(self), fields(environment = %self.config.environment))]
    pub async fn build(self) -> Result<Orchestrator, BootstrapError> {
        let config = self.config;

        let warnings = ConfigValidator::validate(&config);
        ConfigValidator::log_warnings(&warnings);
        if ConfigValidator::should_block_startup(&config, &warnings) {
            return Err(BootstrapError::UnsafeConfiguration(
                warnings
                    .iter()
                    .filter(|w| w.is_critical())
                    .map(|w| w.code.clone())
                    .collect(),
            ));
        }

        let (registry, ledger, database) = open_stores(&config).await?;

        let infrastructure: Arc<dyn InfrastructureClient> = match self.infrastructure {
            Some(infrastructure) => infrastructure,
            None => Arc::new(HttpControlPlane::new(PlatformHttpClient::control_plane(
                &config.platform,
            )?)),
        };
        let agent: Arc<dyn RemoteCommandPort> = match self.agent {
            Some(agent) => agent,
            None => Arc::new(HttpAgentTransport::new(PlatformHttpClient::agent(&config.platform)?)),
        };
        let notifier = match self.notifier {
            Some(notifier) => notifier,
            None => build_notifier(&config)?,
        };

        let retry = config.retry.to_retry_config();
        let drivers = standard_registry(&infrastructure, &agent, &config.drivers, &retry);
        let settings = config
            .orchestrator
            .to_executor_settings(retry.max_attempts(), config.notifier.timeout());

        let executor = PhaseExecutor::new(
            infrastructure,
            drivers,
            Arc::clone(&ledger),
            notifier,
            self.validator,
            settings,
        );
        let service = ChaosService::new(registry, ledger, executor);

        let recovered = if config.orchestrator.recover_orphans_on_startup {
            service
                .recover_orphaned()
                .await
                .map_err(BootstrapError::Recovery)?
        } else {
            Vec::new()
        };

        info!(recovered = recovered.len(), "Orchestrator ready");
        Ok(Orchestrator {
            service,
            database,
            recovered,
            config,
        })
    }
}

type Stores = (
    Arc<dyn ExperimentRegistryPort>,
    Arc<dyn ExecutionLedgerPort>,
    Option<AsyncDatabase>,
);

async fn open_stores(config: &AppConfig) -> Result<Stores, BootstrapError> {
    if config.database.is_in_memory() {
        warn!("Ledger is in memory; executions are lost on exit");
        return Ok((
            Arc::new(InMemoryExperimentRegistry::new()),
            Arc::new(InMemoryExecutionLedger::new()),
            None,
        ));
    }

    let database = AsyncDatabase::new(&config.database.to_async_config()).await?;
    if config.database.run_migrations {
        database.migrate().await?;
    }
    let pool = database.pool().clone();
    Ok((
        Arc::new(SqliteExperimentRegistry::new(pool.clone())),
        Arc::new(SqliteExecutionLedger::new(pool)),
        Some(database),
    ))
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn NotifierPort>, BootstrapError> {
    match (config.notifier.kind, config.notifier.webhook_url.as_deref()) {
        (NotifierKind::Webhook, Some(url)) => {
            let notifier = WebhookNotifier::new(url, config.notifier.timeout())
                .map_err(|e| BootstrapError::Notifier(e.to_string()))?;
            Ok(Arc::new(notifier))
        },
        (NotifierKind::Webhook, None) => Err(BootstrapError::Notifier(
            "notifier.kind is webhook but notifier.webhook_url is not set".to_string(),
        )),
        (NotifierKind::Log, _) => Ok(Arc::new(LogNotifier::new())),
    }
}

/// A wired orchestrator
pub struct Orchestrator {
    service: ChaosService,
    database: Option<AsyncDatabase>,
    recovered: Vec<ExecutionId>,
    config: AppConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("service", &self.service)
            .field("recovered", &self.recovered.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Wire an orchestrator from configuration alone
    ///
    /// # Errors
    ///
    /// See [`OrchestratorBuilder::build`].
    pub async fn from_config(config: AppConfig) -> Result<Self, BootstrapError> {
        OrchestratorBuilder::new(config).build().await
    }

    pub fn builder(config: AppConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub const fn service(&self) -> &ChaosService {
        &self.service
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Executions failed by orphan recovery during startup
    pub fn recovered(&self) -> &[ExecutionId] {
        &self.recovered
    }

    /// Abort running executions, wait for their rollback and close the ledger
    pub async fn shutdown(&self, reason: &str) {
        self.service.shutdown(reason).await;
        if let Some(database) = &self.database {
            database.close().await;
        }
        info!("Orchestrator stopped");
    }
}
