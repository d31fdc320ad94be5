//! Repetition-indexed queries over a completed run.
//!
//! Built once per run from the run-history tree: a depth-first walk flattens
//! every action execution into a name-keyed sequence of repetitions, so
//! queries never walk the tree. Iteration `i` of a loop body yields
//! repetition `i` for every action name inside that body, independent of the
//! other actions in the same loop.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{ConfigError, LookupError};
use crate::trace::history::{ActionStatus, RunHistory, ScopeNode};

/// One action execution, flattened out of the run-history tree.
#[derive(Debug, Clone)]
pub struct TraceNode {
    pub name: String,
    pub status: ActionStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    /// 1-based position among this action's executions, in execution order.
    pub repetition: usize,
    /// Names of the enclosing scopes, outermost first. Loop iterations share
    /// one scope path; only structurally distinct positions differ.
    pub scope_path: Vec<String>,
}

/// Immutable index over one run's action executions.
#[derive(Debug)]
pub struct TraceIndex {
    nodes: HashMap<String, Vec<TraceNode>>,
}

impl TraceIndex {
    /// Flatten the history into the index. The same action name appearing in
    /// two structurally unrelated scopes is a configuration error, never a
    /// silent merge.
    pub fn build(history: &RunHistory) -> Result<Self, ConfigError> {
        let mut builder = Builder::default();
        let mut path = Vec::new();
        for node in &history.actions {
            builder.visit(node, &mut path)?;
        }
        Ok(Self {
            nodes: builder.nodes,
        })
    }

    /// Number of recorded executions for `name`; 0 if the action never ran.
    pub fn repetition_count(&self, name: &str) -> usize {
        self.nodes.get(name).map_or(0, Vec::len)
    }

    /// All action names with at least one recorded execution.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Status of a non-repeated action (repetition 1).
    pub fn status(&self, name: &str) -> Result<ActionStatus, LookupError> {
        self.status_at(name, 1)
    }

    /// Status of the `repetition`th execution (1-based, execution order).
    pub fn status_at(&self, name: &str, repetition: usize) -> Result<ActionStatus, LookupError> {
        self.node_at(name, repetition).map(|node| node.status)
    }

    pub fn input(&self, name: &str) -> Result<&Value, LookupError> {
        self.input_at(name, 1)
    }

    pub fn input_at(&self, name: &str, repetition: usize) -> Result<&Value, LookupError> {
        let node = self.node_at(name, repetition)?;
        node.input.as_ref().ok_or(LookupError::NoInputRecorded {
            name: name.to_string(),
            repetition,
        })
    }

    pub fn output(&self, name: &str) -> Result<&Value, LookupError> {
        self.output_at(name, 1)
    }

    /// Output payload of the `repetition`th execution. Failed executions may
    /// legitimately have no output; that is [`LookupError::NoOutputRecorded`],
    /// distinct from querying a name that never ran.
    pub fn output_at(&self, name: &str, repetition: usize) -> Result<&Value, LookupError> {
        let node = self.node_at(name, repetition)?;
        node.output.as_ref().ok_or(LookupError::NoOutputRecorded {
            name: name.to_string(),
            repetition,
        })
    }

    pub fn node(&self, name: &str) -> Result<&TraceNode, LookupError> {
        self.node_at(name, 1)
    }

    /// Raw access to the flattened node for ad-hoc inspection.
    pub fn node_at(&self, name: &str, repetition: usize) -> Result<&TraceNode, LookupError> {
        let repetitions = self.nodes.get(name).ok_or_else(|| LookupError::NotFound {
            name: name.to_string(),
        })?;
        if repetition == 0 || repetition > repetitions.len() {
            return Err(LookupError::RepetitionOutOfRange {
                name: name.to_string(),
                requested: repetition,
                available: repetitions.len(),
            });
        }
        Ok(&repetitions[repetition - 1])
    }
}

#[derive(Default)]
struct Builder {
    nodes: HashMap<String, Vec<TraceNode>>,
    /// Scope path of each action name's first occurrence, for ambiguity
    /// detection.
    first_seen_at: HashMap<String, Vec<String>>,
}

impl Builder {
    fn visit(&mut self, node: &ScopeNode, path: &mut Vec<String>) -> Result<(), ConfigError> {
        match node {
            ScopeNode::Action(action) => {
                match self.first_seen_at.get(&action.name) {
                    Some(first_path) if first_path != path => {
                        return Err(ConfigError::AmbiguousActionName {
                            name: action.name.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        self.first_seen_at
                            .insert(action.name.clone(), path.clone());
                    }
                }
                let repetitions = self.nodes.entry(action.name.clone()).or_default();
                repetitions.push(TraceNode {
                    name: action.name.clone(),
                    status: action.status,
                    input: action.inputs.clone(),
                    output: action.outputs.clone(),
                    repetition: repetitions.len() + 1,
                    scope_path: path.clone(),
                });
                Ok(())
            }
            ScopeNode::Scope(scope) => {
                path.push(scope.name.clone());
                for child in &scope.children {
                    self.visit(child, path)?;
                }
                path.pop();
                Ok(())
            }
            ScopeNode::Loop(repeat) => {
                // Iterations share the loop's structural position: the path
                // gains the loop name, never the iteration index.
                path.push(repeat.name.clone());
                for iteration in &repeat.iterations {
                    for child in &iteration.children {
                        self.visit(child, path)?;
                    }
                }
                path.pop();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn history(doc: serde_json::Value) -> RunHistory {
        serde_json::from_value(doc).unwrap()
    }

    fn looped_history() -> RunHistory {
        history(json!({
            "runId": "run-loop",
            "status": "Succeeded",
            "actions": [
                {"kind": "action", "name": "Init", "status": "Succeeded",
                 "inputs": {"seed": 1}, "outputs": {"items": 3}},
                {"kind": "loop", "name": "ForEachItem", "status": "Succeeded", "iterations": [
                    {"index": 0, "children": [
                        {"kind": "action", "name": "Fetch", "status": "Succeeded",
                         "inputs": {"item": "a"}, "outputs": {"got": "A"}},
                        {"kind": "action", "name": "Store", "status": "Succeeded"}
                    ]},
                    {"index": 1, "children": [
                        {"kind": "action", "name": "Fetch", "status": "Failed",
                         "inputs": {"item": "b"}},
                        {"kind": "action", "name": "Store", "status": "Skipped"}
                    ]},
                    {"index": 2, "children": [
                        {"kind": "action", "name": "Fetch", "status": "Succeeded",
                         "inputs": {"item": "c"}, "outputs": {"got": "C"}}
                    ]}
                ]}
            ]
        }))
    }

    #[test]
    fn repetition_count_reflects_loop_iterations() {
        let index = TraceIndex::build(&looped_history()).unwrap();
        assert_eq!(index.repetition_count("Fetch"), 3);
        assert_eq!(index.repetition_count("Store"), 2);
        assert_eq!(index.repetition_count("Init"), 1);
        assert_eq!(index.repetition_count("NeverRan"), 0);
    }

    #[test]
    fn repetitions_follow_execution_order() {
        let index = TraceIndex::build(&looped_history()).unwrap();
        assert_eq!(index.status_at("Fetch", 1).unwrap(), ActionStatus::Succeeded);
        assert_eq!(index.status_at("Fetch", 2).unwrap(), ActionStatus::Failed);
        assert_eq!(index.status_at("Fetch", 3).unwrap(), ActionStatus::Succeeded);
        assert_eq!(index.input_at("Fetch", 2).unwrap(), &json!({"item": "b"}));
    }

    #[test]
    fn non_repeated_actions_are_addressable_without_an_index() {
        let index = TraceIndex::build(&looped_history()).unwrap();
        assert_eq!(index.status("Init").unwrap(), ActionStatus::Succeeded);
        assert_eq!(index.output("Init").unwrap(), &json!({"items": 3}));
    }

    #[test]
    fn unknown_name_is_not_found_never_a_default() {
        let index = TraceIndex::build(&looped_history()).unwrap();
        assert_eq!(
            index.status("Missing").unwrap_err(),
            LookupError::NotFound {
                name: "Missing".into()
            }
        );
    }

    #[test]
    fn repetition_bounds_are_checked() {
        let index = TraceIndex::build(&looped_history()).unwrap();
        assert_eq!(
            index.status_at("Fetch", 4).unwrap_err(),
            LookupError::RepetitionOutOfRange {
                name: "Fetch".into(),
                requested: 4,
                available: 3
            }
        );
        assert!(matches!(
            index.status_at("Fetch", 0).unwrap_err(),
            LookupError::RepetitionOutOfRange { requested: 0, .. }
        ));
    }

    #[test]
    fn failed_execution_keeps_input_but_may_lack_output() {
        let index = TraceIndex::build(&looped_history()).unwrap();
        assert!(index.input_at("Fetch", 2).is_ok());
        assert_eq!(
            index.output_at("Fetch", 2).unwrap_err(),
            LookupError::NoOutputRecorded {
                name: "Fetch".into(),
                repetition: 2
            }
        );
    }

    #[test]
    fn execution_without_recorded_input_is_a_distinct_error() {
        let index = TraceIndex::build(&looped_history()).unwrap();
        assert_eq!(
            index.input_at("Store", 1).unwrap_err(),
            LookupError::NoInputRecorded {
                name: "Store".into(),
                repetition: 1
            }
        );
        // The execution itself is present; only its input payload is absent.
        assert_eq!(index.status_at("Store", 1).unwrap(), ActionStatus::Succeeded);
    }

    #[test]
    fn same_name_in_unrelated_scopes_is_a_config_error() {
        let doc = history(json!({
            "runId": "run-dup",
            "status": "Succeeded",
            "actions": [
                {"kind": "scope", "name": "A", "status": "Succeeded", "children": [
                    {"kind": "action", "name": "Log", "status": "Succeeded"}
                ]},
                {"kind": "scope", "name": "B", "status": "Succeeded", "children": [
                    {"kind": "action", "name": "Log", "status": "Succeeded"}
                ]}
            ]
        }));
        assert!(matches!(
            TraceIndex::build(&doc),
            Err(ConfigError::AmbiguousActionName { name }) if name == "Log"
        ));
    }

    #[test]
    fn building_twice_yields_identical_results() {
        let doc = looped_history();
        let a = TraceIndex::build(&doc).unwrap();
        let b = TraceIndex::build(&doc).unwrap();
        for name in a.action_names() {
            assert_eq!(a.repetition_count(name), b.repetition_count(name));
            for rep in 1..=a.repetition_count(name) {
                assert_eq!(
                    a.status_at(name, rep).unwrap(),
                    b.status_at(name, rep).unwrap()
                );
                assert_eq!(
                    a.node_at(name, rep).unwrap().scope_path,
                    b.node_at(name, rep).unwrap().scope_path
                );
            }
        }
    }

    #[test]
    fn skipped_container_contributes_no_repetitions() {
        let doc = history(json!({
            "runId": "run-skip",
            "status": "Succeeded",
            "actions": [
                {"kind": "loop", "name": "Never", "status": "Skipped", "iterations": []}
            ]
        }));
        let index = TraceIndex::build(&doc).unwrap();
        assert_eq!(index.repetition_count("InsideNever"), 0);
    }
}
