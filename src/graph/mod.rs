// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

//! The graph store seam.
//!
//! [`GraphStore`] is the external-collaborator interface the rest of the crate
//! programs against: bulk read of the whole graph, an atomic whole-graph swap
//! (what makes snapshot restore transactional), and record-level CRUD.
//! [`MemoryGraph`] is the in-process implementation; a remote backend would
//! map `replace_all` onto its native transaction.

use std::fmt;
use std::sync::Mutex;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::{
    ComponentId, ComponentRecord, GraphState, PropMap, RelationshipRecord, TaskId, TaskRecord,
    TaskStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    ComponentNotFound(ComponentId),
    TaskNotFound(TaskId),
    /// Backend unavailable or a query failed; surfaced unchanged to callers.
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ComponentNotFound(id) => write!(f, "component not found (id={id})"),
            Self::TaskNotFound(id) => write!(f, "task not found (id={id})"),
            Self::Unavailable(reason) => write!(f, "graph store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Partial update for a component; absent fields are left untouched and
/// `metadata` entries are merged over the existing bag.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ComponentUpdate {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub codebase: Option<String>,
    pub path: Option<String>,
    pub metadata: Option<PropMap>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ComponentQuery {
    /// Substring match against the component name.
    pub name: Option<String>,
    /// Exact match against the component kind.
    pub kind: Option<String>,
    /// Exact match against the codebase label.
    pub codebase: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

/// One edge touching a component, paired with the record on the far end.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RelationshipNeighbor {
    pub relationship: RelationshipRecord,
    pub neighbor: ComponentRecord,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct KindCount {
    pub kind: String,
    pub count: u64,
}

/// Names of the two endpoints of a newly created relationship.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RelationshipEndpoints {
    pub source_name: String,
    pub target_name: String,
}

/// Edge kind followed by the dependency-tree traversal.
const DEPENDS_ON: &str = "DEPENDS_ON";

/// One hop of a dependency path.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DependencySegment {
    pub source: ComponentRecord,
    pub target: ComponentRecord,
    pub relationship: RelationshipRecord,
}

/// A path of `DEPENDS_ON` hops rooted at the queried component. Every prefix
/// of a longer path is reported as its own path, so a chain of depth 3 yields
/// three paths.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DependencyPath {
    pub segments: Vec<DependencySegment>,
}

pub trait GraphStore: Send + Sync {
    /// Reads the entire graph into one value.
    fn read_all(&self) -> Result<GraphState, StorageError>;

    /// Atomically replaces the entire graph. Either the whole new state is
    /// visible afterwards or the old state is untouched.
    fn replace_all(&self, state: GraphState) -> Result<(), StorageError>;

    fn insert_component(&self, component: ComponentRecord) -> Result<(), StorageError>;
    fn get_component(&self, id: &ComponentId) -> Result<ComponentRecord, StorageError>;
    fn update_component(
        &self,
        id: &ComponentId,
        update: ComponentUpdate,
        now: u64,
    ) -> Result<ComponentRecord, StorageError>;
    /// Removes the component and detaches every relationship touching it.
    fn delete_component(&self, id: &ComponentId) -> Result<(), StorageError>;
    fn search_components(&self, query: &ComponentQuery) -> Result<Vec<ComponentRecord>, StorageError>;
    /// Count of components per kind within one codebase, most common first.
    fn codebase_overview(&self, codebase: &str) -> Result<Vec<KindCount>, StorageError>;

    fn insert_task(&self, task: TaskRecord) -> Result<(), StorageError>;
    fn get_task(&self, id: &TaskId) -> Result<TaskRecord, StorageError>;
    fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<TaskRecord>, StorageError>;
    fn update_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        progress: Option<u8>,
        now: u64,
    ) -> Result<TaskRecord, StorageError>;

    /// Inserts an edge; both endpoints must exist.
    fn insert_relationship(
        &self,
        relationship: RelationshipRecord,
    ) -> Result<RelationshipEndpoints, StorageError>;
    fn component_relationships(
        &self,
        id: &ComponentId,
        direction: Direction,
    ) -> Result<Vec<RelationshipNeighbor>, StorageError>;
    /// All `DEPENDS_ON` paths rooted at `id`, at most `max_depth` hops long.
    /// No relationship repeats within one path, so cycles terminate.
    fn dependency_tree(
        &self,
        id: &ComponentId,
        max_depth: usize,
    ) -> Result<Vec<DependencyPath>, StorageError>;
}

/// In-memory graph. One lock serializes every operation, so `replace_all`
/// cannot interleave with concurrent CRUD.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<GraphState>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, GraphState>, StorageError> {
        self.state.lock().map_err(|_| StorageError::Unavailable("graph lock poisoned".to_owned()))
    }
}

impl GraphStore for MemoryGraph {
    fn read_all(&self) -> Result<GraphState, StorageError> {
        Ok(self.lock()?.clone())
    }

    fn replace_all(&self, state: GraphState) -> Result<(), StorageError> {
        *self.lock()? = state;
        Ok(())
    }

    fn insert_component(&self, component: ComponentRecord) -> Result<(), StorageError> {
        self.lock()?.components.push(component);
        Ok(())
    }

    fn get_component(&self, id: &ComponentId) -> Result<ComponentRecord, StorageError> {
        self.lock()?
            .components
            .iter()
            .find(|component| &component.id == id)
            .cloned()
            .ok_or_else(|| StorageError::ComponentNotFound(id.clone()))
    }

    fn update_component(
        &self,
        id: &ComponentId,
        update: ComponentUpdate,
        now: u64,
    ) -> Result<ComponentRecord, StorageError> {
        let mut state = self.lock()?;
        let component = state
            .components
            .iter_mut()
            .find(|component| &component.id == id)
            .ok_or_else(|| StorageError::ComponentNotFound(id.clone()))?;

        if let Some(kind) = update.kind {
            component.kind = kind;
        }
        if let Some(name) = update.name {
            component.name = name;
        }
        if let Some(description) = update.description {
            component.description = description;
        }
        if let Some(codebase) = update.codebase {
            component.codebase = codebase;
        }
        if let Some(path) = update.path {
            component.path = path;
        }
        if let Some(metadata) = update.metadata {
            component.metadata.extend(metadata);
        }
        component.updated_at = Some(now);

        Ok(component.clone())
    }

    fn delete_component(&self, id: &ComponentId) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let before = state.components.len();
        state.components.retain(|component| &component.id != id);
        if state.components.len() == before {
            return Err(StorageError::ComponentNotFound(id.clone()));
        }

        state
            .relationships
            .retain(|relationship| &relationship.source_id != id && &relationship.target_id != id);
        for task in &mut state.tasks {
            task.related_component_ids.retain(|related| related != id);
        }
        Ok(())
    }

    fn search_components(
        &self,
        query: &ComponentQuery,
    ) -> Result<Vec<ComponentRecord>, StorageError> {
        let state = self.lock()?;
        let mut matches = state
            .components
            .iter()
            .filter(|component| {
                query.name.as_deref().map_or(true, |name| component.name.contains(name))
                    && query.kind.as_deref().map_or(true, |kind| component.kind == kind)
                    && query
                        .codebase
                        .as_deref()
                        .map_or(true, |codebase| component.codebase == codebase)
            })
            .cloned()
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matches)
    }

    fn codebase_overview(&self, codebase: &str) -> Result<Vec<KindCount>, StorageError> {
        let state = self.lock()?;
        let mut counts = std::collections::BTreeMap::<String, u64>::new();
        for component in state.components.iter().filter(|c| c.codebase == codebase) {
            *counts.entry(component.kind.clone()).or_default() += 1;
        }
        let mut overview = counts
            .into_iter()
            .map(|(kind, count)| KindCount { kind, count })
            .collect::<Vec<_>>();
        overview.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.kind.cmp(&b.kind)));
        Ok(overview)
    }

    fn insert_task(&self, task: TaskRecord) -> Result<(), StorageError> {
        self.lock()?.tasks.push(task);
        Ok(())
    }

    fn get_task(&self, id: &TaskId) -> Result<TaskRecord, StorageError> {
        self.lock()?
            .tasks
            .iter()
            .find(|task| &task.id == id)
            .cloned()
            .ok_or_else(|| StorageError::TaskNotFound(id.clone()))
    }

    fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<TaskRecord>, StorageError> {
        let state = self.lock()?;
        let mut tasks = state
            .tasks
            .iter()
            .filter(|task| status.map_or(true, |status| task.status == status))
            .cloned()
            .collect::<Vec<_>>();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tasks)
    }

    fn update_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        progress: Option<u8>,
        now: u64,
    ) -> Result<TaskRecord, StorageError> {
        let mut state = self.lock()?;
        let task = state
            .tasks
            .iter_mut()
            .find(|task| &task.id == id)
            .ok_or_else(|| StorageError::TaskNotFound(id.clone()))?;

        task.status = status;
        if let Some(progress) = progress {
            task.progress = progress.min(100);
        }
        task.updated_at = Some(now);
        Ok(task.clone())
    }

    fn insert_relationship(
        &self,
        relationship: RelationshipRecord,
    ) -> Result<RelationshipEndpoints, StorageError> {
        let mut state = self.lock()?;
        let source_name = state
            .components
            .iter()
            .find(|component| component.id == relationship.source_id)
            .map(|component| component.name.clone())
            .ok_or_else(|| StorageError::ComponentNotFound(relationship.source_id.clone()))?;
        let target_name = state
            .components
            .iter()
            .find(|component| component.id == relationship.target_id)
            .map(|component| component.name.clone())
            .ok_or_else(|| StorageError::ComponentNotFound(relationship.target_id.clone()))?;

        state.relationships.push(relationship);
        Ok(RelationshipEndpoints { source_name, target_name })
    }

    fn component_relationships(
        &self,
        id: &ComponentId,
        direction: Direction,
    ) -> Result<Vec<RelationshipNeighbor>, StorageError> {
        let state = self.lock()?;
        if !state.components.iter().any(|component| &component.id == id) {
            return Err(StorageError::ComponentNotFound(id.clone()));
        }

        let mut neighbors = Vec::new();
        for relationship in &state.relationships {
            let outgoing = &relationship.source_id == id;
            let incoming = &relationship.target_id == id;
            let (include, neighbor_id, edge_direction) = match direction {
                Direction::Outgoing => (outgoing, &relationship.target_id, Direction::Outgoing),
                Direction::Incoming => (incoming, &relationship.source_id, Direction::Incoming),
                Direction::Both if outgoing => {
                    (true, &relationship.target_id, Direction::Outgoing)
                }
                Direction::Both if incoming => {
                    (true, &relationship.source_id, Direction::Incoming)
                }
                Direction::Both => (false, &relationship.source_id, Direction::Both),
            };
            if !include {
                continue;
            }
            let Some(neighbor) =
                state.components.iter().find(|component| &component.id == neighbor_id)
            else {
                continue;
            };
            neighbors.push(RelationshipNeighbor {
                relationship: relationship.clone(),
                neighbor: neighbor.clone(),
                direction: edge_direction,
            });
        }
        Ok(neighbors)
    }

    fn dependency_tree(
        &self,
        id: &ComponentId,
        max_depth: usize,
    ) -> Result<Vec<DependencyPath>, StorageError> {
        let state = self.lock()?;
        if !state.components.iter().any(|component| &component.id == id) {
            return Err(StorageError::ComponentNotFound(id.clone()));
        }

        let mut paths = Vec::new();
        let mut stack = Vec::new();
        walk_dependencies(&state, id, max_depth, &mut stack, &mut paths);
        Ok(paths)
    }
}

/// Depth-first enumeration of `DEPENDS_ON` paths from `from`. Each extension
/// of the current path is emitted before recursing, and a relationship already
/// on the path is never followed again.
fn walk_dependencies(
    state: &GraphState,
    from: &ComponentId,
    max_depth: usize,
    stack: &mut Vec<DependencySegment>,
    paths: &mut Vec<DependencyPath>,
) {
    if stack.len() >= max_depth {
        return;
    }
    for relationship in &state.relationships {
        if relationship.kind != DEPENDS_ON || &relationship.source_id != from {
            continue;
        }
        if stack.iter().any(|segment| segment.relationship.id == relationship.id) {
            continue;
        }
        let source = state.components.iter().find(|c| c.id == relationship.source_id);
        let target = state.components.iter().find(|c| c.id == relationship.target_id);
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };
        stack.push(DependencySegment {
            source: source.clone(),
            target: target.clone(),
            relationship: relationship.clone(),
        });
        paths.push(DependencyPath { segments: stack.clone() });
        walk_dependencies(state, &relationship.target_id, max_depth, stack, paths);
        stack.pop();
    }
}
