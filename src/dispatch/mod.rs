// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

//! Command dispatch: a queue of commands with filtered, at-most-once delivery
//! to blocking waiting agents.
//!
//! One mutex guards the queue and the waiter registry together, so every
//! check-then-claim step (immediate match on wait, dispatch on submit, cancel,
//! timeout removal) is atomic. The blocking path suspends outside the lock on
//! a single-resolution oneshot channel; claims are published while the lock is
//! held, which makes a claim/timeout race resolve on lock order instead of
//! last-writer-wins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};

use crate::history::{ChangeHistory, Operation};
use crate::model::{
    now_millis, AgentId, Command, CommandFilter, CommandId, CommandStatus, ComponentId, Priority,
};

/// Why a wait resolved without a command. Failures of one `wait_for_command`
/// call, never process-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The wait's deadline elapsed before any matching command arrived.
    Timeout,
    /// `cancel_wait` was called for this agent.
    Cancelled,
    /// The same agent registered a newer wait; the old one is rejected rather
    /// than silently dropped.
    Superseded,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out waiting for a command"),
            Self::Cancelled => f.write_str("wait cancelled"),
            Self::Superseded => f.write_str("wait superseded by a newer wait for the same agent"),
        }
    }
}

impl std::error::Error for WaitError {}

/// Everything `submit` needs to build a command record.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub kind: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub source: String,
    pub target_component_ids: Vec<ComponentId>,
    pub task_type: Option<String>,
}

/// A registry entry as reported by `list_waiting`.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WaitingAgent {
    pub agent_id: AgentId,
    pub filter: CommandFilter,
    pub waiting_since: u64,
}

struct Waiter {
    agent_id: AgentId,
    filter: CommandFilter,
    registered_at: u64,
    /// Distinguishes this registration from later ones under the same agent
    /// id, so a timeout never tears down a superseding wait.
    seq: u64,
    tx: oneshot::Sender<Result<Command, WaitError>>,
}

#[derive(Default)]
struct DispatchState {
    /// Every command ever submitted, in insertion order. Never removed.
    commands: Vec<Command>,
    /// Active waits in registration order, at most one per agent id.
    waiters: Vec<Waiter>,
    next_seq: u64,
}

impl DispatchState {
    fn claim(command: &mut Command, agent_id: &AgentId, now: u64) -> Command {
        command.status = CommandStatus::Delivered;
        command.delivered_to = Some(agent_id.clone());
        command.delivered_at = Some(now);
        command.clone()
    }

    /// First pending command (insertion order) satisfying `filter`, claimed
    /// for `agent_id`.
    fn claim_first_pending(&mut self, agent_id: &AgentId, filter: &CommandFilter) -> Option<Command> {
        let now = now_millis();
        self.commands
            .iter_mut()
            .find(|command| command.status == CommandStatus::Pending && filter.matches(command))
            .map(|command| Self::claim(command, agent_id, now))
    }

    /// Registers a wait, rejecting any prior wait for the same agent with
    /// `Superseded`. Returns the registration sequence number.
    fn register(
        &mut self,
        agent_id: AgentId,
        filter: CommandFilter,
        tx: oneshot::Sender<Result<Command, WaitError>>,
    ) -> u64 {
        if let Some(position) = self.waiters.iter().position(|waiter| waiter.agent_id == agent_id) {
            let prior = self.waiters.remove(position);
            tracing::debug!(agent_id = %agent_id, "superseding prior wait");
            let _ = prior.tx.send(Err(WaitError::Superseded));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiters.push(Waiter {
            agent_id,
            filter,
            registered_at: now_millis(),
            seq,
            tx,
        });
        seq
    }

    /// Removes the wait identified by `(agent_id, seq)`. False when that
    /// exact registration is gone (already resolved or superseded).
    fn remove_registration(&mut self, agent_id: &AgentId, seq: u64) -> bool {
        let Some(position) = self
            .waiters
            .iter()
            .position(|waiter| &waiter.agent_id == agent_id && waiter.seq == seq)
        else {
            return false;
        };
        self.waiters.remove(position);
        true
    }
}

/// Process-wide dispatcher over the command queue and waiter registry.
pub struct DispatchCore {
    state: Mutex<DispatchState>,
    history: Arc<ChangeHistory>,
}

impl DispatchCore {
    pub fn new(history: Arc<ChangeHistory>) -> Self {
        Self { state: Mutex::new(DispatchState::default()), history }
    }

    /// Stores a new `PENDING` command and tries to hand it to the first
    /// matching waiter (registration order) right away. Returns the stored
    /// record, which already reflects an immediate delivery.
    pub async fn submit(&self, spec: CommandSpec) -> Command {
        let mut command = Command {
            id: CommandId::random(),
            kind: spec.kind,
            payload: spec.payload,
            priority: spec.priority,
            source: spec.source,
            target_component_ids: spec.target_component_ids,
            task_type: spec.task_type,
            created_at: now_millis(),
            status: CommandStatus::Pending,
            delivered_to: None,
            delivered_at: None,
        };

        let stored = {
            let mut state = self.state.lock().await;
            if let Some(position) =
                state.waiters.iter().position(|waiter| waiter.filter.matches(&command))
            {
                let waiter = state.waiters.remove(position);
                let now = now_millis();
                let delivered = DispatchState::claim(&mut command, &waiter.agent_id, now);
                tracing::debug!(
                    command_id = %delivered.id,
                    agent_id = %waiter.agent_id,
                    "delivered command on submit"
                );
                // The receiver may have timed out and not yet re-locked; its
                // timeout arm will still find the value in the channel.
                let _ = waiter.tx.send(Ok(delivered));
            }
            state.commands.push(command.clone());
            command
        };

        self.history
            .record(
                Operation::SendCommand,
                serde_json::json!({
                    "command_id": stored.id.as_str(),
                    "kind": stored.kind,
                    "priority": stored.priority,
                    "source": stored.source,
                }),
            )
            .await;
        stored
    }

    /// Resolves with the first matching command, suspending when none is
    /// pending. Fails with [`WaitError::Timeout`] after `timeout`,
    /// [`WaitError::Cancelled`] on `cancel_wait`, or [`WaitError::Superseded`]
    /// when the agent registers a newer wait.
    pub async fn wait_for_command(
        &self,
        agent_id: AgentId,
        filter: CommandFilter,
        timeout: Duration,
    ) -> Result<Command, WaitError> {
        let (seq, mut rx) = {
            let mut state = self.state.lock().await;
            if let Some(command) = state.claim_first_pending(&agent_id, &filter) {
                tracing::debug!(command_id = %command.id, agent_id = %agent_id, "immediate match");
                return Ok(command);
            }
            let (tx, rx) = oneshot::channel();
            let seq = state.register(agent_id.clone(), filter, tx);
            (seq, rx)
        };

        tokio::select! {
            biased;
            outcome = &mut rx => match outcome {
                Ok(result) => result,
                // Sender dropped without resolving; treat as cancellation.
                Err(_) => Err(WaitError::Cancelled),
            },
            _ = tokio::time::sleep(timeout) => {
                let mut state = self.state.lock().await;
                if state.remove_registration(&agent_id, seq) {
                    tracing::debug!(agent_id = %agent_id, "wait timed out");
                    Err(WaitError::Timeout)
                } else {
                    // Our registration is gone: someone resolved it under the
                    // lock strictly before this arm ran, so the match wins.
                    drop(state);
                    match rx.try_recv() {
                        Ok(result) => result,
                        Err(_) => Err(WaitError::Cancelled),
                    }
                }
            }
        }
    }

    /// Lenient idempotent cancel: flips a `PENDING` command to `CANCELLED`,
    /// leaves terminal commands untouched, and reports the status after the
    /// call. `None` means the id is unknown.
    pub async fn cancel(&self, command_id: &CommandId) -> Option<CommandStatus> {
        let status = {
            let mut state = self.state.lock().await;
            let command =
                state.commands.iter_mut().find(|command| &command.id == command_id)?;
            if command.status == CommandStatus::Pending {
                command.status = CommandStatus::Cancelled;
            }
            command.status
        };

        self.history
            .record(
                Operation::CancelCommand,
                serde_json::json!({ "command_id": command_id.as_str(), "status": status }),
            )
            .await;
        Some(status)
    }

    /// Fails the agent's active wait with `Cancelled`. False when the agent
    /// has no active wait (including one already matched).
    pub async fn cancel_wait(&self, agent_id: &AgentId) -> bool {
        let mut state = self.state.lock().await;
        let Some(position) =
            state.waiters.iter().position(|waiter| &waiter.agent_id == agent_id)
        else {
            return false;
        };
        let waiter = state.waiters.remove(position);
        tracing::debug!(agent_id = %agent_id, "wait cancelled");
        let _ = waiter.tx.send(Err(WaitError::Cancelled));
        true
    }

    /// Commands still `PENDING`, in insertion order.
    pub async fn list_pending(&self) -> Vec<Command> {
        let state = self.state.lock().await;
        state
            .commands
            .iter()
            .filter(|command| command.status == CommandStatus::Pending)
            .cloned()
            .collect()
    }

    /// Every command regardless of status, newest first, truncated to `limit`.
    pub async fn command_history(&self, limit: usize) -> Vec<Command> {
        let state = self.state.lock().await;
        let mut commands = state.commands.clone();
        commands.reverse();
        commands.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        commands.truncate(limit);
        commands
    }

    /// Active waits in registration order.
    pub async fn list_waiting(&self) -> Vec<WaitingAgent> {
        let state = self.state.lock().await;
        state
            .waiters
            .iter()
            .map(|waiter| WaitingAgent {
                agent_id: waiter.agent_id.clone(),
                filter: waiter.filter.clone(),
                waiting_since: waiter.registered_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests;
