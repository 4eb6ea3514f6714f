// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, CommandId, ComponentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Lifecycle status of a command. `Pending` is the only non-terminal state;
/// a command never re-enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Pending,
    Delivered,
    Cancelled,
}

/// A unit of work submitted for delivery to exactly one matching consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Command {
    pub id: CommandId,
    /// String tag chosen by the producer, e.g. `"BUILD"`.
    pub kind: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    /// Originator label, e.g. `"mcp-server"` or an agent id.
    pub source: String,
    #[serde(default)]
    pub target_component_ids: Vec<ComponentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    pub created_at: u64,
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_to: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<u64>,
}

/// Predicate a waiting agent attaches to its wait.
///
/// All fields are optional and AND-combined; an absent field imposes no
/// constraint. `component_ids` matches when it intersects the command's
/// `target_component_ids`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct CommandFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_ids: Option<Vec<ComponentId>>,
}

impl CommandFilter {
    pub fn matches(&self, command: &Command) -> bool {
        if let Some(priority) = self.priority {
            if command.priority != priority {
                return false;
            }
        }
        if let Some(task_types) = &self.task_types {
            match &command.task_type {
                Some(task_type) if task_types.contains(task_type) => {}
                _ => return false,
            }
        }
        if let Some(component_ids) = &self.component_ids {
            if !command.target_component_ids.iter().any(|id| component_ids.contains(id)) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Command, CommandFilter, CommandStatus, Priority};
    use crate::model::{CommandId, ComponentId};

    fn command(priority: Priority, task_type: Option<&str>, targets: &[&str]) -> Command {
        Command {
            id: CommandId::random(),
            kind: "BUILD".to_owned(),
            payload: serde_json::Value::Null,
            priority,
            source: "test".to_owned(),
            target_component_ids: targets
                .iter()
                .map(|id| ComponentId::new(*id).expect("component id"))
                .collect(),
            task_type: task_type.map(str::to_owned),
            created_at: 0,
            status: CommandStatus::Pending,
            delivered_to: None,
            delivered_at: None,
        }
    }

    fn cids(ids: &[&str]) -> Vec<ComponentId> {
        ids.iter().map(|id| ComponentId::new(*id).expect("component id")).collect()
    }

    #[test]
    fn empty_filter_matches_anything() {
        let filter = CommandFilter::default();
        assert!(filter.matches(&command(Priority::Low, None, &[])));
        assert!(filter.matches(&command(Priority::High, Some("ci"), &["c1"])));
    }

    #[rstest]
    #[case(Priority::High, Priority::High, true)]
    #[case(Priority::High, Priority::Medium, false)]
    #[case(Priority::Low, Priority::Low, true)]
    fn priority_is_exact_match(
        #[case] filter_priority: Priority,
        #[case] command_priority: Priority,
        #[case] expected: bool,
    ) {
        let filter = CommandFilter { priority: Some(filter_priority), ..Default::default() };
        assert_eq!(filter.matches(&command(command_priority, None, &[])), expected);
    }

    #[rstest]
    #[case(Some("ci"), true)]
    #[case(Some("deploy"), false)]
    #[case(None, false)]
    fn task_type_must_be_member(#[case] task_type: Option<&str>, #[case] expected: bool) {
        let filter = CommandFilter {
            task_types: Some(vec!["ci".to_owned(), "lint".to_owned()]),
            ..Default::default()
        };
        assert_eq!(filter.matches(&command(Priority::Medium, task_type, &[])), expected);
    }

    #[rstest]
    #[case(&["c1"], true)]
    #[case(&["c3", "c2"], true)]
    #[case(&["c3"], false)]
    #[case(&[], false)]
    fn component_ids_match_on_intersection(#[case] targets: &[&str], #[case] expected: bool) {
        let filter =
            CommandFilter { component_ids: Some(cids(&["c1", "c2"])), ..Default::default() };
        assert_eq!(filter.matches(&command(Priority::Medium, None, targets)), expected);
    }

    #[test]
    fn filter_fields_are_and_combined() {
        let filter = CommandFilter {
            priority: Some(Priority::High),
            task_types: Some(vec!["ci".to_owned()]),
            component_ids: Some(cids(&["c1"])),
        };
        assert!(filter.matches(&command(Priority::High, Some("ci"), &["c1"])));
        assert!(!filter.matches(&command(Priority::Medium, Some("ci"), &["c1"])));
        assert!(!filter.matches(&command(Priority::High, Some("lint"), &["c1"])));
        assert!(!filter.matches(&command(Priority::High, Some("ci"), &["c9"])));
    }

    #[test]
    fn priority_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Priority::High).expect("serialize"), r#""HIGH""#);
        assert_eq!(
            serde_json::to_string(&CommandStatus::Pending).expect("serialize"),
            r#""PENDING""#
        );
    }
}
