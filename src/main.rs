//! talkflow-worker - runs the talk pipeline on the Tokio command bus.
//!
//! Inbound traffic is read from stdin as JSON lines:
//!
//! ```text
//! {"type":"agent","organization_id":"...","name":"Ava","instructions":"Be brief."}
//! {"type":"open_talk","organization_id":"...","tree_flow_id":"..."}
//! {"type":"message","talk_id":"...","body":"Hi, I'm Ada"}
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use talkflow::adapters::ai::{AnthropicConfig, AnthropicProvider, LlmAiGateway, ScriptedAiGateway};
use talkflow::adapters::bus::{
    InMemoryProcessedCommandStore, TokioCommandBus, TokioCommandBusConfig,
};
use talkflow::adapters::flows::FileTreeFlowRepository;
use talkflow::adapters::memory::{
    InMemoryAgentRepository, InMemoryAuditLogRepository, InMemoryTalkMessageRepository,
    InMemoryTalkRepository,
};
use talkflow::adapters::postgres::{
    PostgresAgentRepository, PostgresAuditLogRepository, PostgresProcessedCommandStore,
    PostgresTalkMessageRepository, PostgresTalkRepository,
};
use talkflow::application::{
    build_registry, InboundMessageService, PipelineDeps, PipelineSettings,
};
use talkflow::config::{
    AiProviderKind, AppConfig, ConfigError, DatabaseConfig, LoggingConfig, ValidationError,
};
use talkflow::domain::agent::Agent;
use talkflow::domain::foundation::{
    CommandMetadata, DomainError, OrganizationId, TalkId, TreeFlowId,
};
use talkflow::domain::talk::Talk;
use talkflow::ports::{
    AIError, AgentRepository, AiGateway, AuditLogRepository, ProcessedCommandStore,
    TalkMessageRepository, TalkRepository,
};

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("AI provider setup failed: {0}")]
    Ai(#[from] AIError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Persistence adapters selected by configuration.
struct Stores {
    talks: Arc<dyn TalkRepository>,
    messages: Arc<dyn TalkMessageRepository>,
    agents: Arc<dyn AgentRepository>,
    audit_logs: Arc<dyn AuditLogRepository>,
    processed: Arc<dyn ProcessedCommandStore>,
}

/// One line of stdin traffic.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IngressLine {
    Agent {
        organization_id: OrganizationId,
        name: String,
        #[serde(default)]
        instructions: String,
    },
    OpenTalk {
        #[serde(default)]
        talk_id: Option<TalkId>,
        organization_id: OrganizationId,
        #[serde(default)]
        tree_flow_id: Option<TreeFlowId>,
    },
    Message {
        talk_id: TalkId,
        body: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("talkflow-worker: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Worker failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    config.validate()?;

    let stores = stores(&config.database).await?;
    let flows = Arc::new(
        FileTreeFlowRepository::load_dir(&config.flows.dir, config.flows.default_max_attempts)
            .await?,
    );
    let gateway = gateway(&config)?;

    let bus = Arc::new(TokioCommandBus::new(
        TokioCommandBusConfig::default()
            .with_workers(config.bus.workers)
            .with_max_attempts(config.bus.max_attempts)
            .with_backoff(config.bus.initial_backoff(), config.bus.max_backoff()),
    ));

    let registry = build_registry(
        PipelineDeps {
            talks: stores.talks.clone(),
            messages: stores.messages.clone(),
            agents: stores.agents.clone(),
            flows,
            audit_logs: stores.audit_logs.clone(),
            gateway,
            dispatcher: bus.clone(),
            processed: config.bus.idempotent.then(|| stores.processed.clone()),
        },
        PipelineSettings {
            history_window: config.pipeline.history_window,
        },
    );
    bus.start(Arc::new(registry)).await?;

    let ingress = InboundMessageService::new(
        stores.talks.clone(),
        stores.messages.clone(),
        bus.clone(),
    );
    tokio::select! {
        () = read_stdin(&ingress, &stores) => {
            tracing::info!("Input closed, draining command bus");
        }
        () = shutdown_signal() => {}
    }

    bus.shutdown().await;
    let dead_letters = bus.dead_letters().await;
    if !dead_letters.is_empty() {
        tracing::warn!(count = dead_letters.len(), "Commands left in the dead letter list");
    }
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

async fn stores(config: &DatabaseConfig) -> Result<Stores, StartupError> {
    let Some(url) = config.url() else {
        tracing::warn!("No database configured, using in-memory repositories");
        return Ok(Stores {
            talks: Arc::new(InMemoryTalkRepository::new()),
            messages: Arc::new(InMemoryTalkMessageRepository::new()),
            agents: Arc::new(InMemoryAgentRepository::new()),
            audit_logs: Arc::new(InMemoryAuditLogRepository::new()),
            processed: Arc::new(InMemoryProcessedCommandStore::new()),
        });
    };

    let pool = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(url)
        .await?;
    tracing::info!(max_connections = config.max_connections, "Database connection pool created");

    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    Ok(Stores {
        talks: Arc::new(PostgresTalkRepository::new(pool.clone())),
        messages: Arc::new(PostgresTalkMessageRepository::new(pool.clone())),
        agents: Arc::new(PostgresAgentRepository::new(pool.clone())),
        audit_logs: Arc::new(PostgresAuditLogRepository::new(pool.clone())),
        processed: Arc::new(PostgresProcessedCommandStore::new(pool)),
    })
}

fn gateway(config: &AppConfig) -> Result<Arc<dyn AiGateway>, StartupError> {
    if config.ai.provider == AiProviderKind::Scripted {
        tracing::warn!("Scripted AI provider selected, replies are canned and nothing is extracted");
        return Ok(Arc::new(ScriptedAiGateway::new()));
    }
    let Some(api_key) = config.ai.anthropic_api_key.as_ref().filter(|_| config.ai.has_anthropic())
    else {
        return Err(ValidationError::MissingRequired("AI__ANTHROPIC_API_KEY").into());
    };

    let mut anthropic = AnthropicConfig::from_secret(api_key.clone())
        .with_model(config.ai.model.clone())
        .with_timeout(config.ai.timeout())
        .with_max_retries(config.ai.max_retries)
        .with_default_max_tokens(config.ai.max_tokens);
    if let Some(base_url) = &config.ai.base_url {
        anthropic = anthropic.with_base_url(base_url.clone());
    }
    let provider = AnthropicProvider::new(anthropic)?;
    tracing::info!(model = %config.ai.model, "Using Anthropic provider");

    Ok(Arc::new(LlmAiGateway::new(Arc::new(provider))))
}

/// Feeds stdin lines into the pipeline until EOF.
async fn read_stdin(ingress: &InboundMessageService, stores: &Stores) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<IngressLine>(&line) {
            Ok(parsed) => {
                if let Err(e) = apply(parsed, ingress, stores).await {
                    tracing::error!(error = %e, "Input line rejected");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed input line"),
        }
    }
}

async fn apply(
    line: IngressLine,
    ingress: &InboundMessageService,
    stores: &Stores,
) -> Result<(), DomainError> {
    match line {
        IngressLine::Agent {
            organization_id,
            name,
            instructions,
        } => {
            let agent = Agent::new(organization_id, name, instructions)
                .map_err(|e| DomainError::validation("agent", e.to_string()))?;
            stores.agents.save(&agent).await?;
            tracing::info!(agent_id = %agent.id, organization_id = %organization_id, "Agent registered");
        }
        IngressLine::OpenTalk {
            talk_id,
            organization_id,
            tree_flow_id,
        } => {
            let talk = Talk::new(talk_id.unwrap_or_default(), organization_id, tree_flow_id);
            stores.talks.save(&talk).await?;
            tracing::info!(talk_id = %talk.id(), tree_flow_id = ?tree_flow_id, "Talk opened");
        }
        IngressLine::Message { talk_id, body } => {
            ingress
                .receive(talk_id, &body, CommandMetadata::new().with_source("stdin"))
                .await?;
        }
    }
    Ok(())
}

/// Waits for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
