// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dispatch::WaitingAgent;
use crate::graph::{
    ComponentQuery, ComponentUpdate, DependencyPath, Direction, KindCount, RelationshipNeighbor,
};
use crate::history::{ChangeHistoryEntry, HistoryStats, Operation, ReplayPlan};
use crate::model::{
    Command, CommandFilter, CommandStatus, ComponentRecord, PropMap, Priority, RelationshipRecord,
    TaskRecord, TaskStatus,
};
use crate::snapshot::{RestoreReport, Snapshot, SnapshotMetadata};

// ---- command queue ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendCommandParams {
    /// Command tag chosen by the producer, e.g. `"BUILD"`.
    pub kind: String,
    /// Opaque structured payload handed to the consumer unchanged.
    pub payload: Option<serde_json::Value>,
    /// Defaults to `MEDIUM`.
    pub priority: Option<Priority>,
    /// Originator label; defaults to `"mcp-server"`.
    pub source: Option<String>,
    pub target_component_ids: Option<Vec<String>>,
    pub task_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SendCommandResponse {
    pub command: Command,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WaitForCommandParams {
    pub agent_id: String,
    /// Defaults to 300000 (five minutes).
    pub timeout_ms: Option<u64>,
    /// Optional constraints; absent fields impose none.
    pub filters: Option<CommandFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitForCommandResponse {
    pub command: Command,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CancelCommandParams {
    pub command_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CancelCommandResponse {
    pub success: bool,
    pub command_id: String,
    /// Status after the call; absent when the id is unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CommandStatus>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CancelWaitParams {
    pub agent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CancelWaitResponse {
    pub success: bool,
    pub agent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetPendingCommandsResponse {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetWaitingAgentsResponse {
    pub agents: Vec<WaitingAgent>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetCommandHistoryParams {
    /// Defaults to 100.
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetCommandHistoryResponse {
    pub commands: Vec<Command>,
}

// ---- snapshots, history, replay ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateSnapshotParams {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CreateSnapshotResponse {
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListSnapshotsResponse {
    pub snapshots: Vec<SnapshotMetadata>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RestoreSnapshotParams {
    pub snapshot_id: String,
    /// Defaults to false; a dry run only reports counts.
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RestoreSnapshotResponse {
    pub report: RestoreReport,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReplayToTimestampParams {
    /// Epoch milliseconds; entries at or before this instant are selected.
    pub target_timestamp: u64,
    /// Defaults to true. Non-dry runs report a count and apply nothing.
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ReplayToTimestampResponse {
    pub plan: ReplayPlan,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetChangeHistoryParams {
    /// Restrict to entries whose data references this entity id.
    pub entity_id: Option<String>,
    pub operation: Option<Operation>,
    /// Defaults to 50.
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetChangeHistoryResponse {
    pub entries: Vec<ChangeHistoryEntry>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetHistoryStatsResponse {
    pub stats: HistoryStats,
}

// ---- components ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateComponentParams {
    /// Classification, e.g. `"service"`, `"module"`, `"table"`.
    pub kind: String,
    pub name: String,
    pub description: Option<String>,
    pub codebase: Option<String>,
    pub path: Option<String>,
    pub metadata: Option<PropMap>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ComponentResponse {
    pub component: ComponentRecord,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateComponentsBulkParams {
    pub components: Vec<CreateComponentParams>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CreateComponentsBulkResponse {
    pub components: Vec<ComponentRecord>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateComponentParams {
    pub component_id: String,
    pub updates: ComponentUpdate,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteComponentParams {
    pub component_id: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DeleteComponentResponse {
    pub success: bool,
    pub component_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetComponentParams {
    pub component_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchComponentsParams {
    #[serde(flatten)]
    pub query: ComponentQuery,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SearchComponentsResponse {
    pub components: Vec<ComponentRecord>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetCodebaseOverviewParams {
    pub codebase: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetCodebaseOverviewResponse {
    pub codebase: String,
    pub overview: Vec<KindCount>,
    pub total_components: u64,
}

// ---- tasks ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateTaskParams {
    pub name: String,
    pub description: Option<String>,
    /// Defaults to `TODO`.
    pub status: Option<TaskStatus>,
    /// Defaults to 0; clamped to 100.
    pub progress: Option<u8>,
    pub related_component_ids: Option<Vec<String>>,
    pub metadata: Option<PropMap>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TaskResponse {
    pub task: TaskRecord,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateTasksBulkParams {
    pub tasks: Vec<CreateTaskParams>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CreateTasksBulkResponse {
    pub tasks: Vec<TaskRecord>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetTaskParams {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetTaskResponse {
    pub task: TaskRecord,
    /// The related components resolved to full records.
    pub related_components: Vec<ComponentRecord>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTasksParams {
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskRecord>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateTaskStatusParams {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: Option<u8>,
}

// ---- relationships ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateRelationshipParams {
    /// Edge label, e.g. `"DEPENDS_ON"`.
    pub kind: String,
    pub source_id: String,
    pub target_id: String,
    pub details: Option<PropMap>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CreateRelationshipResponse {
    pub relationship: RelationshipRecord,
    pub source_name: String,
    pub target_name: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateRelationshipsBulkParams {
    pub relationships: Vec<CreateRelationshipParams>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CreateRelationshipsBulkResponse {
    pub relationships: Vec<CreateRelationshipResponse>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetDependencyTreeParams {
    pub component_id: String,
    /// Longest path followed, in hops. Defaults to 3.
    pub max_depth: Option<u32>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetDependencyTreeResponse {
    pub component_id: String,
    pub paths: Vec<DependencyPath>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetComponentRelationshipsParams {
    pub component_id: String,
    /// Defaults to `both`.
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetComponentRelationshipsResponse {
    pub relationships: Vec<RelationshipNeighbor>,
}
