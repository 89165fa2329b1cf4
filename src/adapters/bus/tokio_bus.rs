//! TokioCommandBus - partitioned worker pool for production use.
//!
//! Each worker task owns one unbounded channel. Commands with a partition
//! key always land on the same worker, so at most one command per talk is
//! in flight; unkeyed commands are spread round-robin.
//!
//! ## Retries
//!
//! Retryable failures are retried in place, on the same worker, with
//! exponential backoff. Later commands of the same partition wait behind the
//! retry, which keeps per-talk ordering. Rejected or exhausted commands are
//! dead-lettered.
//!
//! ## Graceful Shutdown
//!
//! `shutdown` waits until every queued command (including commands
//! dispatched while draining) has been handled, then stops the workers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::domain::foundation::{CommandEnvelope, DomainError, ErrorCode};
use crate::ports::CommandDispatcher;

use super::{DeadLetter, HandlerRegistry};

/// Configuration for the TokioCommandBus.
#[derive(Debug, Clone)]
pub struct TokioCommandBusConfig {
    /// Number of worker tasks (partitions).
    pub workers: usize,

    /// Delivery attempts before a retryable command is dead-lettered.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles on each further attempt.
    pub initial_backoff: Duration,

    /// Upper bound for the retry delay.
    pub max_backoff: Duration,
}

impl Default for TokioCommandBusConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl TokioCommandBusConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Shared between the bus handle and its workers.
struct BusState {
    dead_letters: Mutex<Vec<DeadLetter>>,
    /// Commands accepted but not yet finished.
    pending: AtomicUsize,
    idle: Notify,
}

impl BusState {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Partitioned command bus on Tokio tasks.
///
/// Construct with `new`, build the handler registry (handlers usually hold
/// the bus as their dispatcher), then call `start`.
pub struct TokioCommandBus {
    config: TokioCommandBusConfig,
    senders: Vec<mpsc::UnboundedSender<CommandEnvelope>>,
    receivers: Mutex<Vec<mpsc::UnboundedReceiver<CommandEnvelope>>>,
    next_shard: AtomicUsize,
    state: Arc<BusState>,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioCommandBus {
    pub fn new(config: TokioCommandBusConfig) -> Self {
        let workers = config.workers.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..workers)
            .map(|_| mpsc::unbounded_channel::<CommandEnvelope>())
            .unzip();
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config: TokioCommandBusConfig { workers, ..config },
            senders,
            receivers: Mutex::new(receivers),
            next_shard: AtomicUsize::new(0),
            state: Arc::new(BusState {
                dead_letters: Mutex::new(Vec::new()),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            started: AtomicBool::new(false),
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker tasks. Commands dispatched before `start` are kept
    /// in their channels and handled once the workers run.
    ///
    /// # Errors
    ///
    /// - `DispatchError` if the bus was already started
    pub async fn start(&self, registry: Arc<HandlerRegistry>) -> Result<(), DomainError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DispatchError,
                "Command bus already started",
            ));
        }

        let receivers = std::mem::take(&mut *self.receivers.lock().await);
        let mut workers = self.workers.lock().await;
        for (index, receiver) in receivers.into_iter().enumerate() {
            let worker = Worker {
                index,
                registry: Arc::clone(&registry),
                config: self.config.clone(),
                state: Arc::clone(&self.state),
            };
            workers.push(tokio::spawn(worker.run(receiver, self.shutdown_tx.subscribe())));
        }

        tracing::info!(
            workers = self.config.workers,
            max_attempts = self.config.max_attempts,
            command_types = ?registry.command_types(),
            "Command bus started"
        );
        Ok(())
    }

    /// Waits until no accepted command is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.state.idle.notified();
            if self.state.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Drains outstanding commands, then stops the workers.
    pub async fn shutdown(&self) {
        self.wait_idle().await;
        let _ = self.shutdown_tx.send(true);

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Command bus worker panicked");
            }
        }
        tracing::info!("Command bus stopped");
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.dead_letters.lock().await.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    fn shard_for(&self, partition_key: Option<&str>) -> usize {
        let shards = self.senders.len();
        match partition_key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % shards as u64) as usize
            }
            None => self.next_shard.fetch_add(1, Ordering::Relaxed) % shards,
        }
    }
}

#[async_trait]
impl CommandDispatcher for TokioCommandBus {
    async fn dispatch(&self, envelope: CommandEnvelope) -> Result<(), DomainError> {
        if *self.shutdown_tx.borrow() {
            return Err(DomainError::new(
                ErrorCode::DispatchError,
                "Command bus is shut down",
            )
            .with_detail("command_type", envelope.command_type));
        }

        let shard = self.shard_for(envelope.partition_key.as_deref());
        self.state.pending.fetch_add(1, Ordering::SeqCst);

        if let Err(mpsc::error::SendError(envelope)) = self.senders[shard].send(envelope) {
            self.state.finish_one();
            return Err(DomainError::new(
                ErrorCode::DispatchError,
                "Command bus worker is gone",
            )
            .with_detail("command_type", envelope.command_type)
            .with_detail("shard", shard.to_string()));
        }
        Ok(())
    }
}

struct Worker {
    index: usize,
    registry: Arc<HandlerRegistry>,
    config: TokioCommandBusConfig,
    state: Arc<BusState>,
}

impl Worker {
    async fn run(
        self,
        mut receiver: mpsc::UnboundedReceiver<CommandEnvelope>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;

                maybe = receiver.recv() => match maybe {
                    Some(envelope) => {
                        self.deliver(envelope).await;
                        self.state.finish_one();
                    }
                    None => break,
                },

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(worker = self.index, "Command bus worker exiting");
    }

    async fn deliver(&self, mut envelope: CommandEnvelope) {
        loop {
            match self.registry.route(&envelope).await {
                Ok(()) => return,
                Err(err) if err.is_retryable() && envelope.attempt < self.config.max_attempts => {
                    let delay = self.config.backoff_for(envelope.attempt);
                    tracing::warn!(
                        worker = self.index,
                        command_id = %envelope.command_id,
                        command_type = %envelope.command_type,
                        attempt = envelope.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Command failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    envelope = envelope.next_attempt();
                }
                Err(err) => {
                    let letter = DeadLetter::new(envelope, &err);
                    self.state.dead_letters.lock().await.push(letter);
                    return;
                }
            }
        }
    }
}
