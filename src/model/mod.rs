// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

//! Shared model types: typed ids, property bags, graph records, and the
//! command queue data model.

mod command;
mod ids;
mod record;
mod value;

pub use command::{Command, CommandFilter, CommandStatus, Priority};
pub use ids::{
    AgentId, CommandId, ComponentId, EntryId, Id, IdError, RelationshipId, SnapshotId, TaskId,
};
pub use record::{
    ComponentRecord, GraphCounts, GraphState, RelationshipRecord, TaskRecord, TaskStatus,
};
pub use value::{PropMap, PropValue};

/// Milliseconds since the Unix epoch, as reported by the process clock.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
