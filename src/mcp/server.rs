// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::{Json, Parameters};
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};

use crate::dispatch::{CommandSpec, DispatchCore, WaitError};
use crate::graph::{Direction, GraphStore, StorageError};
use crate::history::{ChangeHistory, Operation};
use crate::model::{
    now_millis, AgentId, CommandId, ComponentId, ComponentRecord, Id, RelationshipId,
    RelationshipRecord, SnapshotId, TaskId, TaskRecord,
};
use crate::snapshot::{SnapshotError, SnapshotStore};

use super::types::*;

const DEFAULT_WAIT_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_COMMAND_HISTORY_LIMIT: usize = 100;
const DEFAULT_CHANGE_HISTORY_LIMIT: usize = 50;
const DEFAULT_DEPENDENCY_DEPTH: u32 = 3;

/// The MCP server: one dispatch core, one change history, one snapshot store,
/// and one graph store handle, shared for the life of the process.
#[derive(Clone)]
pub struct CoderelayMcp {
    graph: Arc<dyn GraphStore>,
    history: Arc<ChangeHistory>,
    dispatch: Arc<DispatchCore>,
    snapshots: Arc<SnapshotStore>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CoderelayMcp {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        let history = Arc::new(ChangeHistory::new());
        let dispatch = Arc::new(DispatchCore::new(history.clone()));
        let snapshots = Arc::new(SnapshotStore::new(graph.clone(), history.clone()));
        Self { graph, history, dispatch, snapshots, tool_router: Self::tool_router() }
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    // ---- command queue ----

    /// Submit a command for delivery to exactly one matching waiting agent;
    /// undelivered commands stay pending for future `wait_for_command` calls.
    #[tool(name = "send_command")]
    async fn send_command(
        &self,
        params: Parameters<SendCommandParams>,
    ) -> Result<Json<SendCommandResponse>, ErrorData> {
        let SendCommandParams { kind, payload, priority, source, target_component_ids, task_type } =
            params.0;
        let target_component_ids =
            parse_ids(target_component_ids.unwrap_or_default(), "target_component_ids")?;

        let command = self
            .dispatch
            .submit(CommandSpec {
                kind,
                payload: payload.unwrap_or(serde_json::Value::Null),
                priority: priority.unwrap_or_default(),
                source: source.unwrap_or_else(|| "mcp-server".to_owned()),
                target_component_ids,
                task_type,
            })
            .await;
        Ok(Json(SendCommandResponse { command }))
    }

    /// Block until a command matching the filters is available, the timeout
    /// elapses, or the wait is cancelled/superseded.
    #[tool(name = "wait_for_command")]
    async fn wait_for_command(
        &self,
        params: Parameters<WaitForCommandParams>,
    ) -> Result<Json<WaitForCommandResponse>, ErrorData> {
        let WaitForCommandParams { agent_id, timeout_ms, filters } = params.0;
        let agent_id: AgentId = parse_id(agent_id, "agent_id")?;
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS));

        let command = self
            .dispatch
            .wait_for_command(agent_id, filters.unwrap_or_default(), timeout)
            .await
            .map_err(map_wait_error)?;
        Ok(Json(WaitForCommandResponse { command }))
    }

    /// Cancel a pending command. Lenient: succeeds for any known id, even one
    /// already delivered or cancelled.
    #[tool(name = "cancel_command")]
    async fn cancel_command(
        &self,
        params: Parameters<CancelCommandParams>,
    ) -> Result<Json<CancelCommandResponse>, ErrorData> {
        let raw = params.0.command_id;
        let command_id: CommandId = parse_id(raw.clone(), "command_id")?;
        let status = self.dispatch.cancel(&command_id).await;
        Ok(Json(CancelCommandResponse { success: status.is_some(), command_id: raw, status }))
    }

    /// Fail an agent's active wait with a cancellation error.
    #[tool(name = "cancel_wait")]
    async fn cancel_wait(
        &self,
        params: Parameters<CancelWaitParams>,
    ) -> Result<Json<CancelWaitResponse>, ErrorData> {
        let raw = params.0.agent_id;
        let agent_id: AgentId = parse_id(raw.clone(), "agent_id")?;
        let success = self.dispatch.cancel_wait(&agent_id).await;
        Ok(Json(CancelWaitResponse { success, agent_id: raw }))
    }

    /// Commands still pending delivery, in submission order.
    #[tool(name = "get_pending_commands")]
    async fn get_pending_commands(&self) -> Result<Json<GetPendingCommandsResponse>, ErrorData> {
        Ok(Json(GetPendingCommandsResponse { commands: self.dispatch.list_pending().await }))
    }

    /// Agents currently blocked in `wait_for_command`, with their filters.
    #[tool(name = "get_waiting_agents")]
    async fn get_waiting_agents(&self) -> Result<Json<GetWaitingAgentsResponse>, ErrorData> {
        Ok(Json(GetWaitingAgentsResponse { agents: self.dispatch.list_waiting().await }))
    }

    /// Every command ever submitted (any status), newest first.
    #[tool(name = "get_command_history")]
    async fn get_command_history(
        &self,
        params: Parameters<GetCommandHistoryParams>,
    ) -> Result<Json<GetCommandHistoryResponse>, ErrorData> {
        let limit = params.0.limit.unwrap_or(DEFAULT_COMMAND_HISTORY_LIMIT as u64) as usize;
        Ok(Json(GetCommandHistoryResponse {
            commands: self.dispatch.command_history(limit).await,
        }))
    }

    // ---- snapshots, history, replay ----

    /// Capture the entire current graph as a named snapshot.
    #[tool(name = "create_snapshot")]
    async fn create_snapshot(
        &self,
        params: Parameters<CreateSnapshotParams>,
    ) -> Result<Json<CreateSnapshotResponse>, ErrorData> {
        let CreateSnapshotParams { name, description } = params.0;
        let snapshot = self
            .snapshots
            .create(name, description.unwrap_or_default())
            .await
            .map_err(map_snapshot_error)?;
        Ok(Json(CreateSnapshotResponse { snapshot }))
    }

    /// Stored snapshots, metadata only.
    #[tool(name = "list_snapshots")]
    async fn list_snapshots(&self) -> Result<Json<ListSnapshotsResponse>, ErrorData> {
        Ok(Json(ListSnapshotsResponse { snapshots: self.snapshots.list().await }))
    }

    /// Replace the live graph with a snapshot's captured state; `dry_run`
    /// reports what would be restored without mutating anything.
    #[tool(name = "restore_snapshot")]
    async fn restore_snapshot(
        &self,
        params: Parameters<RestoreSnapshotParams>,
    ) -> Result<Json<RestoreSnapshotResponse>, ErrorData> {
        let RestoreSnapshotParams { snapshot_id, dry_run } = params.0;
        let snapshot_id: SnapshotId = parse_id(snapshot_id, "snapshot_id")?;
        let report = self
            .snapshots
            .restore(&snapshot_id, dry_run.unwrap_or(false))
            .await
            .map_err(map_snapshot_error)?;
        Ok(Json(RestoreSnapshotResponse { report }))
    }

    /// Report which change-history operations fall at or before a target
    /// timestamp. Non-dry runs return a count only; no mutation is applied.
    #[tool(name = "replay_to_timestamp")]
    async fn replay_to_timestamp(
        &self,
        params: Parameters<ReplayToTimestampParams>,
    ) -> Result<Json<ReplayToTimestampResponse>, ErrorData> {
        let ReplayToTimestampParams { target_timestamp, dry_run } = params.0;
        let plan = self.history.plan_replay(target_timestamp, dry_run.unwrap_or(true)).await;
        Ok(Json(ReplayToTimestampResponse { plan }))
    }

    /// The audit log of mutations, newest first, optionally scoped to one
    /// entity and/or operation kind.
    #[tool(name = "get_change_history")]
    async fn get_change_history(
        &self,
        params: Parameters<GetChangeHistoryParams>,
    ) -> Result<Json<GetChangeHistoryResponse>, ErrorData> {
        let GetChangeHistoryParams { entity_id, operation, limit } = params.0;
        let limit = limit.unwrap_or(DEFAULT_CHANGE_HISTORY_LIMIT as u64) as usize;
        let entries = self.history.query(entity_id.as_deref(), operation, limit).await;
        Ok(Json(GetChangeHistoryResponse { entries }))
    }

    /// Aggregate counts and time range of the audit log.
    #[tool(name = "get_history_stats")]
    async fn get_history_stats(&self) -> Result<Json<GetHistoryStatsResponse>, ErrorData> {
        Ok(Json(GetHistoryStatsResponse { stats: self.history.stats().await }))
    }

    // ---- components ----

    /// Create a component node in the codebase graph.
    #[tool(name = "create_component")]
    async fn create_component(
        &self,
        params: Parameters<CreateComponentParams>,
    ) -> Result<Json<ComponentResponse>, ErrorData> {
        let component = self.make_component(params.0).await?;
        Ok(Json(ComponentResponse { component }))
    }

    /// Create several components in one call. Items are created in order;
    /// a failure stops the loop and earlier creations stand.
    #[tool(name = "create_components_bulk")]
    async fn create_components_bulk(
        &self,
        params: Parameters<CreateComponentsBulkParams>,
    ) -> Result<Json<CreateComponentsBulkResponse>, ErrorData> {
        let mut components = Vec::with_capacity(params.0.components.len());
        for item in params.0.components {
            components.push(self.make_component(item).await?);
        }
        Ok(Json(CreateComponentsBulkResponse { components }))
    }

    async fn make_component(
        &self,
        params: CreateComponentParams,
    ) -> Result<ComponentRecord, ErrorData> {
        let CreateComponentParams { kind, name, description, codebase, path, metadata } = params;
        let component = ComponentRecord {
            id: ComponentId::random(),
            kind,
            name,
            description: description.unwrap_or_default(),
            codebase: codebase.unwrap_or_default(),
            path: path.unwrap_or_default(),
            created_at: now_millis(),
            updated_at: None,
            metadata: metadata.unwrap_or_default(),
        };
        self.graph.insert_component(component.clone()).map_err(map_storage_error)?;

        self.history
            .record(
                Operation::CreateComponent,
                serde_json::json!({
                    "component_id": component.id.as_str(),
                    "kind": component.kind,
                    "name": component.name,
                    "codebase": component.codebase,
                }),
            )
            .await;
        Ok(component)
    }

    /// Apply a partial update to a component; metadata entries are merged.
    #[tool(name = "update_component")]
    async fn update_component(
        &self,
        params: Parameters<UpdateComponentParams>,
    ) -> Result<Json<ComponentResponse>, ErrorData> {
        let UpdateComponentParams { component_id, updates } = params.0;
        let component_id: ComponentId = parse_id(component_id, "component_id")?;
        let component = self
            .graph
            .update_component(&component_id, updates, now_millis())
            .map_err(map_storage_error)?;

        self.history
            .record(
                Operation::UpdateComponent,
                serde_json::json!({ "component_id": component_id.as_str() }),
            )
            .await;
        Ok(Json(ComponentResponse { component }))
    }

    /// Delete a component and detach every relationship touching it.
    #[tool(name = "delete_component")]
    async fn delete_component(
        &self,
        params: Parameters<DeleteComponentParams>,
    ) -> Result<Json<DeleteComponentResponse>, ErrorData> {
        let raw = params.0.component_id;
        let component_id: ComponentId = parse_id(raw.clone(), "component_id")?;
        self.graph.delete_component(&component_id).map_err(map_storage_error)?;

        self.history
            .record(
                Operation::DeleteComponent,
                serde_json::json!({ "component_id": component_id.as_str() }),
            )
            .await;
        Ok(Json(DeleteComponentResponse { success: true, component_id: raw }))
    }

    /// Look up one component by id.
    #[tool(name = "get_component")]
    async fn get_component(
        &self,
        params: Parameters<GetComponentParams>,
    ) -> Result<Json<ComponentResponse>, ErrorData> {
        let component_id: ComponentId = parse_id(params.0.component_id, "component_id")?;
        let component = self.graph.get_component(&component_id).map_err(map_storage_error)?;
        Ok(Json(ComponentResponse { component }))
    }

    /// Search components by name substring, kind, and/or codebase.
    #[tool(name = "search_components")]
    async fn search_components(
        &self,
        params: Parameters<SearchComponentsParams>,
    ) -> Result<Json<SearchComponentsResponse>, ErrorData> {
        let components =
            self.graph.search_components(&params.0.query).map_err(map_storage_error)?;
        Ok(Json(SearchComponentsResponse { components }))
    }

    /// Component counts per kind within one codebase.
    #[tool(name = "get_codebase_overview")]
    async fn get_codebase_overview(
        &self,
        params: Parameters<GetCodebaseOverviewParams>,
    ) -> Result<Json<GetCodebaseOverviewResponse>, ErrorData> {
        let codebase = params.0.codebase;
        let overview = self.graph.codebase_overview(&codebase).map_err(map_storage_error)?;
        let total_components = overview.iter().map(|entry| entry.count).sum();
        Ok(Json(GetCodebaseOverviewResponse { codebase, overview, total_components }))
    }

    // ---- tasks ----

    /// Create a task, optionally linked to the components it touches.
    #[tool(name = "create_task")]
    async fn create_task(
        &self,
        params: Parameters<CreateTaskParams>,
    ) -> Result<Json<TaskResponse>, ErrorData> {
        let task = self.make_task(params.0).await?;
        Ok(Json(TaskResponse { task }))
    }

    /// Create several tasks in one call, in order; a failure stops the loop
    /// and earlier creations stand.
    #[tool(name = "create_tasks_bulk")]
    async fn create_tasks_bulk(
        &self,
        params: Parameters<CreateTasksBulkParams>,
    ) -> Result<Json<CreateTasksBulkResponse>, ErrorData> {
        let mut tasks = Vec::with_capacity(params.0.tasks.len());
        for item in params.0.tasks {
            tasks.push(self.make_task(item).await?);
        }
        Ok(Json(CreateTasksBulkResponse { tasks }))
    }

    async fn make_task(&self, params: CreateTaskParams) -> Result<TaskRecord, ErrorData> {
        let CreateTaskParams { name, description, status, progress, related_component_ids, metadata } =
            params;
        let related_component_ids =
            parse_ids(related_component_ids.unwrap_or_default(), "related_component_ids")?;
        let task = TaskRecord {
            id: TaskId::random(),
            name,
            description: description.unwrap_or_default(),
            status: status.unwrap_or_default(),
            progress: progress.unwrap_or(0).min(100),
            related_component_ids,
            created_at: now_millis(),
            updated_at: None,
            metadata: metadata.unwrap_or_default(),
        };
        self.graph.insert_task(task.clone()).map_err(map_storage_error)?;

        self.history
            .record(
                Operation::CreateTask,
                serde_json::json!({
                    "task_id": task.id.as_str(),
                    "name": task.name,
                    "status": task.status,
                }),
            )
            .await;
        Ok(task)
    }

    /// Look up one task, resolving its related components to full records.
    #[tool(name = "get_task")]
    async fn get_task(
        &self,
        params: Parameters<GetTaskParams>,
    ) -> Result<Json<GetTaskResponse>, ErrorData> {
        let task_id: TaskId = parse_id(params.0.task_id, "task_id")?;
        let task = self.graph.get_task(&task_id).map_err(map_storage_error)?;
        let related_components = task
            .related_component_ids
            .iter()
            .filter_map(|component_id| self.graph.get_component(component_id).ok())
            .collect();
        Ok(Json(GetTaskResponse { task, related_components }))
    }

    /// All tasks, optionally narrowed to one status, ordered by name.
    #[tool(name = "list_tasks")]
    async fn list_tasks(
        &self,
        params: Parameters<ListTasksParams>,
    ) -> Result<Json<ListTasksResponse>, ErrorData> {
        let tasks = self.graph.list_tasks(params.0.status).map_err(map_storage_error)?;
        Ok(Json(ListTasksResponse { tasks }))
    }

    /// Move a task through its workflow, optionally updating progress.
    #[tool(name = "update_task_status")]
    async fn update_task_status(
        &self,
        params: Parameters<UpdateTaskStatusParams>,
    ) -> Result<Json<TaskResponse>, ErrorData> {
        let UpdateTaskStatusParams { task_id, status, progress } = params.0;
        let task_id: TaskId = parse_id(task_id, "task_id")?;
        let task = self
            .graph
            .update_task_status(&task_id, status, progress, now_millis())
            .map_err(map_storage_error)?;

        self.history
            .record(
                Operation::UpdateTask,
                serde_json::json!({
                    "task_id": task_id.as_str(),
                    "status": status,
                    "progress": progress,
                }),
            )
            .await;
        Ok(Json(TaskResponse { task }))
    }

    // ---- relationships ----

    /// Create a typed edge between two existing components.
    #[tool(name = "create_relationship")]
    async fn create_relationship(
        &self,
        params: Parameters<CreateRelationshipParams>,
    ) -> Result<Json<CreateRelationshipResponse>, ErrorData> {
        let response = self.make_relationship(params.0).await?;
        Ok(Json(response))
    }

    /// Create several relationships in one call, in order; a failure stops
    /// the loop and earlier creations stand.
    #[tool(name = "create_relationships_bulk")]
    async fn create_relationships_bulk(
        &self,
        params: Parameters<CreateRelationshipsBulkParams>,
    ) -> Result<Json<CreateRelationshipsBulkResponse>, ErrorData> {
        let mut relationships = Vec::with_capacity(params.0.relationships.len());
        for item in params.0.relationships {
            relationships.push(self.make_relationship(item).await?);
        }
        Ok(Json(CreateRelationshipsBulkResponse { relationships }))
    }

    async fn make_relationship(
        &self,
        params: CreateRelationshipParams,
    ) -> Result<CreateRelationshipResponse, ErrorData> {
        let CreateRelationshipParams { kind, source_id, target_id, details } = params;
        let relationship = RelationshipRecord {
            id: RelationshipId::random(),
            kind,
            source_id: parse_id(source_id, "source_id")?,
            target_id: parse_id(target_id, "target_id")?,
            created_at: now_millis(),
            properties: details.unwrap_or_default(),
        };
        let endpoints =
            self.graph.insert_relationship(relationship.clone()).map_err(map_storage_error)?;

        self.history
            .record(
                Operation::CreateRelationship,
                serde_json::json!({
                    "relationship_id": relationship.id.as_str(),
                    "kind": relationship.kind,
                    "source_id": relationship.source_id.as_str(),
                    "target_id": relationship.target_id.as_str(),
                }),
            )
            .await;
        Ok(CreateRelationshipResponse {
            relationship,
            source_name: endpoints.source_name,
            target_name: endpoints.target_name,
        })
    }

    /// `DEPENDS_ON` paths rooted at a component, up to `max_depth` hops.
    #[tool(name = "get_dependency_tree")]
    async fn get_dependency_tree(
        &self,
        params: Parameters<GetDependencyTreeParams>,
    ) -> Result<Json<GetDependencyTreeResponse>, ErrorData> {
        let GetDependencyTreeParams { component_id, max_depth } = params.0;
        let root: ComponentId = parse_id(component_id.clone(), "component_id")?;
        let depth = max_depth.unwrap_or(DEFAULT_DEPENDENCY_DEPTH) as usize;
        let paths = self.graph.dependency_tree(&root, depth).map_err(map_storage_error)?;
        Ok(Json(GetDependencyTreeResponse { component_id, paths }))
    }

    /// Edges touching a component, with the far-end record resolved.
    #[tool(name = "get_component_relationships")]
    async fn get_component_relationships(
        &self,
        params: Parameters<GetComponentRelationshipsParams>,
    ) -> Result<Json<GetComponentRelationshipsResponse>, ErrorData> {
        let GetComponentRelationshipsParams { component_id, direction } = params.0;
        let component_id: ComponentId = parse_id(component_id, "component_id")?;
        let relationships = self
            .graph
            .component_relationships(&component_id, direction.unwrap_or(Direction::Both))
            .map_err(map_storage_error)?;
        Ok(Json(GetComponentRelationshipsResponse { relationships }))
    }
}

#[tool_handler]
impl ServerHandler for CoderelayMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Coderelay codebase graph server (tools: send_command, wait_for_command, cancel_command, cancel_wait, get_pending_commands, get_waiting_agents, get_command_history, create_snapshot, list_snapshots, restore_snapshot, replay_to_timestamp, get_change_history, get_history_stats, create_component, create_components_bulk, update_component, delete_component, get_component, search_components, get_codebase_overview, create_task, create_tasks_bulk, get_task, list_tasks, update_task_status, create_relationship, create_relationships_bulk, get_component_relationships, get_dependency_tree)"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

fn parse_id<T>(value: String, field: &str) -> Result<Id<T>, ErrorData> {
    Id::new(value.clone()).map_err(|err| {
        ErrorData::invalid_params(
            format!("invalid {field}: {err}"),
            Some(serde_json::json!({ "field": field, "value": value })),
        )
    })
}

fn parse_ids<T>(values: Vec<String>, field: &str) -> Result<Vec<Id<T>>, ErrorData> {
    values.into_iter().map(|value| parse_id(value, field)).collect()
}

fn map_wait_error(err: WaitError) -> ErrorData {
    let reason = match err {
        WaitError::Timeout => "TIMEOUT",
        WaitError::Cancelled => "CANCELLED",
        WaitError::Superseded => "SUPERSEDED",
    };
    ErrorData::internal_error(err.to_string(), Some(serde_json::json!({ "reason": reason })))
}

fn map_storage_error(err: StorageError) -> ErrorData {
    match &err {
        StorageError::ComponentNotFound(id) => ErrorData::resource_not_found(
            err.to_string(),
            Some(serde_json::json!({ "component_id": id.as_str() })),
        ),
        StorageError::TaskNotFound(id) => ErrorData::resource_not_found(
            err.to_string(),
            Some(serde_json::json!({ "task_id": id.as_str() })),
        ),
        StorageError::Unavailable(_) => ErrorData::internal_error(err.to_string(), None),
    }
}

fn map_snapshot_error(err: SnapshotError) -> ErrorData {
    match &err {
        SnapshotError::NotFound(id) => ErrorData::resource_not_found(
            err.to_string(),
            Some(serde_json::json!({ "snapshot_id": id.as_str() })),
        ),
        SnapshotError::Storage(storage) => map_storage_error(storage.clone()),
    }
}
