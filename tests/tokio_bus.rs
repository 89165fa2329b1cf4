//! TokioCommandBus behavior: partition exclusivity, retries, dead letters
//! and draining shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use talkflow::adapters::{HandlerRegistry, TokioCommandBus, TokioCommandBusConfig};
use talkflow::domain::foundation::{
    Command, CommandEnvelope, CommandMetadata, DomainError, ErrorCode,
};
use talkflow::ports::{
    CommandContext, CommandDispatcher, CommandDispatcherExt, CommandHandler, HandlerError,
};

fn config(workers: usize, max_attempts: u32) -> TokioCommandBusConfig {
    TokioCommandBusConfig::default()
        .with_workers(workers)
        .with_max_attempts(max_attempts)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
}

// ─────────────────────────────────────────────────────────────────────────────
// Partitioned work
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Touch {
    talk: String,
    seq: u32,
}

impl Command for Touch {
    const COMMAND_TYPE: &'static str = "test.touch.v1";

    fn partition_key(&self) -> Option<String> {
        Some(self.talk.clone())
    }
}

#[derive(Default)]
struct TouchRecorder {
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: AtomicUsize,
    seen: Mutex<HashMap<String, Vec<u32>>>,
    handled: AtomicUsize,
}

#[async_trait]
impl CommandHandler<Touch> for TouchRecorder {
    async fn handle(&self, command: Touch, _: CommandContext) -> Result<(), HandlerError> {
        {
            let mut in_flight = self.in_flight.lock().await;
            let count = in_flight.entry(command.talk.clone()).or_default();
            *count += 1;
            self.max_in_flight.fetch_max(*count, Ordering::SeqCst);
        }

        tokio::time::sleep(Duration::from_millis(2)).await;

        self.seen
            .lock()
            .await
            .entry(command.talk.clone())
            .or_default()
            .push(command.seq);
        *self
            .in_flight
            .lock()
            .await
            .entry(command.talk)
            .or_default() -= 1;
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TouchRecorder"
    }
}

#[tokio::test]
async fn commands_of_one_talk_never_overlap_and_keep_order() {
    let recorder = Arc::new(TouchRecorder::default());
    let mut registry = HandlerRegistry::new();
    registry.register::<Touch, _>(recorder.clone());

    let bus = TokioCommandBus::new(config(4, 3));
    bus.start(Arc::new(registry)).await.unwrap();

    for seq in 0..10 {
        for talk in ["talk-a", "talk-b", "talk-c"] {
            bus.send(
                &Touch {
                    talk: talk.to_string(),
                    seq,
                },
                CommandMetadata::new(),
            )
            .await
            .unwrap();
        }
    }
    bus.shutdown().await;

    assert_eq!(recorder.handled.load(Ordering::SeqCst), 30);
    assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
    let seen = recorder.seen.lock().await;
    for talk in ["talk-a", "talk-b", "talk-c"] {
        assert_eq!(seen[talk], (0..10).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn commands_dispatched_before_start_are_handled() {
    let recorder = Arc::new(TouchRecorder::default());
    let mut registry = HandlerRegistry::new();
    registry.register::<Touch, _>(recorder.clone());
    let bus = TokioCommandBus::new(config(2, 3));

    bus.send(
        &Touch {
            talk: "early".to_string(),
            seq: 0,
        },
        CommandMetadata::new(),
    )
    .await
    .unwrap();
    assert_eq!(bus.pending(), 1);

    bus.start(Arc::new(registry)).await.unwrap();
    bus.wait_idle().await;

    assert_eq!(recorder.handled.load(Ordering::SeqCst), 1);
    bus.shutdown().await;
}

#[tokio::test]
async fn bus_cannot_be_started_twice() {
    let bus = TokioCommandBus::new(config(1, 3));
    let registry = Arc::new(HandlerRegistry::new());

    bus.start(registry.clone()).await.unwrap();
    let err = bus.start(registry).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::DispatchError);
    bus.shutdown().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Flaky {
    /// Attempts that fail before the handler succeeds.
    failures: u32,
    retryable: bool,
}

impl Command for Flaky {
    const COMMAND_TYPE: &'static str = "test.flaky.v1";

    fn partition_key(&self) -> Option<String> {
        Some("flaky".to_string())
    }
}

#[derive(Default)]
struct FlakyHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl CommandHandler<Flaky> for FlakyHandler {
    async fn handle(&self, command: Flaky, ctx: CommandContext) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if ctx.attempt > command.failures {
            return Ok(());
        }
        let err = DomainError::new(ErrorCode::AIProviderError, "provider down");
        if command.retryable {
            Err(HandlerError::Retryable(err))
        } else {
            Err(HandlerError::Rejected(err))
        }
    }

    fn name(&self) -> &'static str {
        "FlakyHandler"
    }
}

async fn run_flaky(command: Flaky, max_attempts: u32) -> (usize, TokioCommandBus) {
    let handler = Arc::new(FlakyHandler::default());
    let mut registry = HandlerRegistry::new();
    registry.register::<Flaky, _>(handler.clone());

    let bus = TokioCommandBus::new(config(2, max_attempts));
    bus.start(Arc::new(registry)).await.unwrap();
    bus.send(&command, CommandMetadata::new()).await.unwrap();
    bus.wait_idle().await;

    (handler.calls.load(Ordering::SeqCst), bus)
}

#[tokio::test]
async fn retryable_failure_is_retried_until_success() {
    let (calls, bus) = run_flaky(
        Flaky {
            failures: 2,
            retryable: true,
        },
        5,
    )
    .await;

    assert_eq!(calls, 3);
    assert!(bus.dead_letters().await.is_empty());
    bus.shutdown().await;
}

#[tokio::test]
async fn exhausted_command_is_dead_lettered() {
    let (calls, bus) = run_flaky(
        Flaky {
            failures: u32::MAX,
            retryable: true,
        },
        3,
    )
    .await;

    assert_eq!(calls, 3);
    let dead = bus.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert!(dead[0].retryable);
    assert_eq!(dead[0].envelope.attempt, 3);
    assert_eq!(dead[0].envelope.command_type, Flaky::COMMAND_TYPE);
    bus.shutdown().await;
}

#[tokio::test]
async fn rejected_command_is_not_retried() {
    let (calls, bus) = run_flaky(
        Flaky {
            failures: u32::MAX,
            retryable: false,
        },
        5,
    )
    .await;

    assert_eq!(calls, 1);
    let dead = bus.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert!(!dead[0].retryable);
    bus.shutdown().await;
}

#[tokio::test]
async fn unknown_command_type_is_dead_lettered() {
    let bus = TokioCommandBus::new(config(1, 5));
    bus.start(Arc::new(HandlerRegistry::new())).await.unwrap();

    bus.dispatch(CommandEnvelope::new(
        "test.nobody_home.v1",
        None,
        serde_json::json!({}),
    ))
    .await
    .unwrap();
    bus.wait_idle().await;

    let dead = bus.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert!(!dead[0].retryable);
    bus.shutdown().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Shutdown
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Chain {
    remaining: u32,
}

impl Command for Chain {
    const COMMAND_TYPE: &'static str = "test.chain.v1";
}

/// Dispatches the next link while handling the current one.
struct ChainHandler {
    bus: Arc<TokioCommandBus>,
    handled: AtomicUsize,
}

#[async_trait]
impl CommandHandler<Chain> for ChainHandler {
    async fn handle(&self, command: Chain, ctx: CommandContext) -> Result<(), HandlerError> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.handled.fetch_add(1, Ordering::SeqCst);
        if command.remaining > 0 {
            self.bus
                .send(
                    &Chain {
                        remaining: command.remaining - 1,
                    },
                    ctx.child_metadata(),
                )
                .await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ChainHandler"
    }
}

#[tokio::test]
async fn shutdown_drains_follow_up_commands_then_refuses_work() {
    let bus = Arc::new(TokioCommandBus::new(config(3, 3)));
    let handler = Arc::new(ChainHandler {
        bus: bus.clone(),
        handled: AtomicUsize::new(0),
    });
    let mut registry = HandlerRegistry::new();
    registry.register::<Chain, _>(handler.clone());
    bus.start(Arc::new(registry)).await.unwrap();

    bus.send(&Chain { remaining: 9 }, CommandMetadata::new())
        .await
        .unwrap();
    bus.shutdown().await;

    assert_eq!(handler.handled.load(Ordering::SeqCst), 10);
    assert_eq!(bus.pending(), 0);

    let err = bus
        .send(&Chain { remaining: 0 }, CommandMetadata::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DispatchError);
}
