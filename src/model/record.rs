// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ids::{ComponentId, RelationshipId, TaskId};
use super::value::PropMap;

/// A node in the codebase graph: a service, module, file, or any other unit
/// the visualized codebase is carved into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComponentRecord {
    pub id: ComponentId,
    /// Free-form classification, e.g. `"service"`, `"module"`, `"table"`.
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub codebase: String,
    #[serde(default)]
    pub path: String,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    #[serde(default, skip_serializing_if = "PropMap::is_empty")]
    pub metadata: PropMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Done,
}

/// A unit of tracked work, optionally tied to the components it touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    /// Completion percentage in `0..=100`.
    pub progress: u8,
    #[serde(default)]
    pub related_component_ids: Vec<ComponentId>,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    #[serde(default, skip_serializing_if = "PropMap::is_empty")]
    pub metadata: PropMap,
}

/// A typed edge between two components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipRecord {
    pub id: RelationshipId,
    /// Edge label, e.g. `"DEPENDS_ON"` or `"CALLS"`.
    pub kind: String,
    pub source_id: ComponentId,
    pub target_id: ComponentId,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "PropMap::is_empty")]
    pub properties: PropMap,
}

/// The whole graph as one value. Snapshots capture exactly this; restore
/// swaps exactly this back in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GraphState {
    pub components: Vec<ComponentRecord>,
    pub tasks: Vec<TaskRecord>,
    pub relationships: Vec<RelationshipRecord>,
}

impl GraphState {
    pub fn counts(&self) -> GraphCounts {
        GraphCounts {
            components: self.components.len() as u64,
            tasks: self.tasks.len() as u64,
            relationships: self.relationships.len() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GraphCounts {
    pub components: u64,
    pub tasks: u64,
    pub relationships: u64,
}
