// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

//! Point-in-time snapshots of the graph.
//!
//! A snapshot is a deep, independent copy of the whole graph state; later
//! mutations of the live graph never reach into a captured snapshot. Restore
//! is transactional: the captured state is swapped in through a single
//! [`GraphStore::replace_all`] call, so a storage failure leaves the live
//! graph untouched instead of half-restored.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::graph::{GraphStore, StorageError};
use crate::history::{ChangeHistory, Operation};
use crate::model::{now_millis, GraphCounts, GraphState, SnapshotId};

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotError {
    NotFound(SnapshotId),
    Storage(StorageError),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "snapshot not found (id={id})"),
            Self::Storage(err) => write!(f, "snapshot storage failure: {err}"),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<StorageError> for SnapshotError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub name: String,
    pub description: String,
    pub timestamp: u64,
    pub data: GraphState,
}

/// Summary without the bulk `data` field, as returned by `list`.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct SnapshotMetadata {
    pub id: SnapshotId,
    pub name: String,
    pub description: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct RestoreReport {
    pub snapshot_id: SnapshotId,
    pub dry_run: bool,
    /// What was (or would be) restored.
    pub counts: GraphCounts,
    /// Set only when the graph was actually mutated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<u64>,
}

/// Process-wide store of named snapshots. Snapshots are kept until process
/// exit; retention policy is deliberately out of scope.
pub struct SnapshotStore {
    graph: Arc<dyn GraphStore>,
    history: Arc<ChangeHistory>,
    snapshots: Mutex<Vec<Snapshot>>,
}

impl SnapshotStore {
    pub fn new(graph: Arc<dyn GraphStore>, history: Arc<ChangeHistory>) -> Self {
        Self { graph, history, snapshots: Mutex::new(Vec::new()) }
    }

    /// Captures the entire current graph into a new immutable snapshot and
    /// returns it, data included.
    pub async fn create(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Snapshot, SnapshotError> {
        let data = self.graph.read_all()?;
        let snapshot = Snapshot {
            id: SnapshotId::random(),
            name: name.into(),
            description: description.into(),
            timestamp: now_millis(),
            data,
        };
        self.snapshots.lock().await.push(snapshot.clone());

        self.history
            .record(
                Operation::CreateSnapshot,
                serde_json::json!({ "snapshot_id": snapshot.id.as_str(), "name": snapshot.name }),
            )
            .await;
        tracing::debug!(snapshot_id = %snapshot.id, name = %snapshot.name, "snapshot created");
        Ok(snapshot)
    }

    pub async fn list(&self) -> Vec<SnapshotMetadata> {
        self.snapshots
            .lock()
            .await
            .iter()
            .map(|snapshot| SnapshotMetadata {
                id: snapshot.id.clone(),
                name: snapshot.name.clone(),
                description: snapshot.description.clone(),
                timestamp: snapshot.timestamp,
            })
            .collect()
    }

    /// Replaces the live graph with the captured state. A dry run reports the
    /// counts that would be restored without touching anything.
    pub async fn restore(
        &self,
        snapshot_id: &SnapshotId,
        dry_run: bool,
    ) -> Result<RestoreReport, SnapshotError> {
        let snapshot = {
            let snapshots = self.snapshots.lock().await;
            snapshots
                .iter()
                .find(|snapshot| &snapshot.id == snapshot_id)
                .cloned()
                .ok_or_else(|| SnapshotError::NotFound(snapshot_id.clone()))?
        };
        let counts = snapshot.data.counts();

        if dry_run {
            return Ok(RestoreReport {
                snapshot_id: snapshot.id,
                dry_run: true,
                counts,
                restored_at: None,
            });
        }

        self.graph.replace_all(snapshot.data)?;
        let restored_at = now_millis();

        self.history
            .record(
                Operation::RestoreSnapshot,
                serde_json::json!({ "snapshot_id": snapshot_id.as_str() }),
            )
            .await;
        tracing::info!(snapshot_id = %snapshot_id, "graph restored from snapshot");
        Ok(RestoreReport {
            snapshot_id: snapshot_id.clone(),
            dry_run: false,
            counts,
            restored_at: Some(restored_at),
        })
    }
}
