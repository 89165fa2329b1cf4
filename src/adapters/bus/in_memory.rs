//! In-memory command bus.
//!
//! Dispatch only enqueues; nothing runs until `run_until_idle` drains the
//! queue in FIFO order. Commands dispatched by handlers join the back of the
//! queue, so a whole pipeline runs deterministically inside one test.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::foundation::{CommandEnvelope, DomainError, ErrorCode};
use crate::ports::CommandDispatcher;

use super::{DeadLetter, HandlerRegistry};

/// Default delivery attempts before a retryable command is dead-lettered.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Counts from one `run_until_idle` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub handled: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

/// FIFO command bus drained on demand.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryCommandBus::new());
/// let registry = build_registry(deps_with(bus.clone()), PipelineSettings::default());
///
/// bus.send(&ProcessTalkMessageCommand { talk_message_id, talk_id }, metadata).await?;
/// bus.run_until_idle(&registry).await;
///
/// assert!(bus.dead_letters().await.is_empty());
/// ```
pub struct InMemoryCommandBus {
    queue: Mutex<VecDeque<CommandEnvelope>>,
    dispatched: Mutex<Vec<CommandEnvelope>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    /// Command types whose next dispatch fails.
    failing_dispatches: Mutex<Vec<String>>,
    max_attempts: u32,
}

impl InMemoryCommandBus {
    pub fn new() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            dispatched: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            failing_dispatches: Mutex::new(Vec::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Handles queued commands until the queue is empty.
    ///
    /// Retryable failures are re-queued at the back until `max_attempts`;
    /// rejected and exhausted commands are dead-lettered.
    pub async fn run_until_idle(&self, registry: &HandlerRegistry) -> DrainReport {
        let mut report = DrainReport::default();

        while let Some(envelope) = self.next().await {
            match registry.route(&envelope).await {
                Ok(()) => report.handled += 1,
                Err(err) if err.is_retryable() && envelope.attempt < self.max_attempts => {
                    tracing::warn!(
                        command_id = %envelope.command_id,
                        command_type = %envelope.command_type,
                        attempt = envelope.attempt,
                        error = %err,
                        "Command failed, re-queueing"
                    );
                    report.retried += 1;
                    self.queue.lock().await.push_back(envelope.next_attempt());
                }
                Err(err) => {
                    report.dead_lettered += 1;
                    self.dead_letters
                        .lock()
                        .await
                        .push(DeadLetter::new(envelope, &err));
                }
            }
        }

        report
    }

    async fn next(&self) -> Option<CommandEnvelope> {
        self.queue.lock().await.pop_front()
    }

    // === Test Helpers ===

    /// Every envelope ever dispatched, in dispatch order.
    pub async fn dispatched(&self) -> Vec<CommandEnvelope> {
        self.dispatched.lock().await.clone()
    }

    /// Dispatched envelopes of one command type.
    pub async fn dispatched_of_type(&self, command_type: &str) -> Vec<CommandEnvelope> {
        self.dispatched()
            .await
            .into_iter()
            .filter(|e| e.command_type == command_type)
            .collect()
    }

    /// Makes the next dispatch of `command_type` fail with `DispatchError`.
    pub async fn fail_next_dispatch_of(&self, command_type: &str) {
        self.failing_dispatches
            .lock()
            .await
            .push(command_type.to_string());
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }
}

impl Default for InMemoryCommandBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandDispatcher for InMemoryCommandBus {
    async fn dispatch(&self, envelope: CommandEnvelope) -> Result<(), DomainError> {
        {
            let mut failing = self.failing_dispatches.lock().await;
            if let Some(pos) = failing.iter().position(|t| *t == envelope.command_type) {
                failing.remove(pos);
                return Err(DomainError::new(ErrorCode::DispatchError, "Dispatch refused")
                    .with_detail("command_type", envelope.command_type));
            }
        }
        self.dispatched.lock().await.push(envelope.clone());
        self.queue.lock().await.push_back(envelope);
        Ok(())
    }
}
