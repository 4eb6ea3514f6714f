// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

//! Append-only audit log of every mutating operation, plus the replay
//! planner that reports which logged operations fall at or before a target
//! timestamp.
//!
//! Entries are never mutated or deleted, and their timestamps never regress:
//! the log clamps each new timestamp to the latest one recorded so the total
//! order by insertion agrees with the order by timestamp even under clock
//! slew.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::model::{now_millis, EntryId};

/// Enumerated mutation kinds. One entry per logical mutation anywhere in the
/// system; this is the sole audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    CreateComponent,
    UpdateComponent,
    DeleteComponent,
    CreateTask,
    UpdateTask,
    CreateRelationship,
    SendCommand,
    CancelCommand,
    CreateSnapshot,
    RestoreSnapshot,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateComponent => "CREATE_COMPONENT",
            Self::UpdateComponent => "UPDATE_COMPONENT",
            Self::DeleteComponent => "DELETE_COMPONENT",
            Self::CreateTask => "CREATE_TASK",
            Self::UpdateTask => "UPDATE_TASK",
            Self::CreateRelationship => "CREATE_RELATIONSHIP",
            Self::SendCommand => "SEND_COMMAND",
            Self::CancelCommand => "CANCEL_COMMAND",
            Self::CreateSnapshot => "CREATE_SNAPSHOT",
            Self::RestoreSnapshot => "RESTORE_SNAPSHOT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeHistoryEntry {
    pub id: EntryId,
    pub operation: Operation,
    /// Operation-specific payload; id-bearing fields inside it
    /// (`component_id`, `task_id`, ...) drive entity-scoped queries.
    pub data: serde_json::Value,
    pub timestamp: u64,
}

/// Fields inside entry `data` that can reference an entity.
const ID_FIELDS: [&str; 5] =
    ["component_id", "task_id", "relationship_id", "command_id", "snapshot_id"];

fn references_entity(entry: &ChangeHistoryEntry, entity_id: &str) -> bool {
    ID_FIELDS
        .iter()
        .filter_map(|field| entry.data.get(field))
        .filter_map(|value| value.as_str())
        .any(|value| value == entity_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct HistoryStats {
    pub total_operations: u64,
    pub operation_counts: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest_timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_timestamp: Option<u64>,
}

/// A selected entry as reported by the replay planner: the `data` payload is
/// deliberately omitted from the preview.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ReplayOperation {
    pub id: EntryId,
    pub operation: Operation,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ReplayPlan {
    pub dry_run: bool,
    pub target_timestamp: u64,
    pub operations_to_replay: u64,
    /// Populated only for dry runs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<ReplayOperation>,
}

/// Process-wide append-only mutation log.
#[derive(Debug, Default)]
pub struct ChangeHistory {
    entries: Mutex<Vec<ChangeHistoryEntry>>,
}

impl ChangeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry. Fire-and-forget: never fails, returns the stored
    /// entry for callers that want the assigned id/timestamp.
    pub async fn record(
        &self,
        operation: Operation,
        data: serde_json::Value,
    ) -> ChangeHistoryEntry {
        let mut entries = self.entries.lock().await;
        let floor = entries.last().map(|entry| entry.timestamp).unwrap_or(0);
        let entry = ChangeHistoryEntry {
            id: EntryId::random(),
            operation,
            data,
            timestamp: now_millis().max(floor),
        };
        entries.push(entry.clone());
        entry
    }

    /// Entries filtered by referenced entity and/or operation, newest first,
    /// truncated to `limit`.
    pub async fn query(
        &self,
        entity_id: Option<&str>,
        operation: Option<Operation>,
        limit: usize,
    ) -> Vec<ChangeHistoryEntry> {
        let entries = self.entries.lock().await;
        let mut selected = entries
            .iter()
            .filter(|entry| entity_id.map_or(true, |id| references_entity(entry, id)))
            .filter(|entry| operation.map_or(true, |operation| entry.operation == operation))
            .cloned()
            .collect::<Vec<_>>();
        selected.reverse();
        selected.truncate(limit);
        selected
    }

    pub async fn stats(&self) -> HistoryStats {
        let entries = self.entries.lock().await;
        let mut operation_counts = BTreeMap::new();
        for entry in entries.iter() {
            *operation_counts.entry(entry.operation.as_str().to_owned()).or_default() += 1;
        }
        HistoryStats {
            total_operations: entries.len() as u64,
            operation_counts,
            earliest_timestamp: entries.first().map(|entry| entry.timestamp),
            latest_timestamp: entries.last().map(|entry| entry.timestamp),
        }
    }

    /// Selects every entry with `timestamp <= target_timestamp`.
    ///
    /// Dry runs preview the selected operations. Non-dry runs report only the
    /// count: actually re-applying mutations is an explicitly unimplemented
    /// capability, kept as a reporting surface so callers cannot mistake it
    /// for time travel.
    pub async fn plan_replay(&self, target_timestamp: u64, dry_run: bool) -> ReplayPlan {
        let entries = self.entries.lock().await;
        let selected = entries.iter().filter(|entry| entry.timestamp <= target_timestamp);
        if dry_run {
            let operations = selected
                .map(|entry| ReplayOperation {
                    id: entry.id.clone(),
                    operation: entry.operation,
                    timestamp: entry.timestamp,
                })
                .collect::<Vec<_>>();
            ReplayPlan {
                dry_run: true,
                target_timestamp,
                operations_to_replay: operations.len() as u64,
                operations,
            }
        } else {
            ReplayPlan {
                dry_run: false,
                target_timestamp,
                operations_to_replay: selected.count() as u64,
                operations: Vec::new(),
            }
        }
    }
}
