//! Task dependency graph.
//!
//! Used to reject cyclic builds before any command runs, and to order the
//! tasks reachable from a build target.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::types::BuildGraph;

/// Dependencies of the tasks reachable from one target, as a DAG with edges
/// from dependency to dependent.
pub struct TaskDag {
  graph: DiGraph<String, ()>,
  nodes: HashMap<String, NodeIndex>,
}

impl TaskDag {
  /// Collect the tasks reachable from `target`. Unknown ids are skipped;
  /// graph validation reports them.
  pub fn reachable_from(graph: &BuildGraph, target: &str) -> Self {
    let mut dag = Self {
      graph: DiGraph::new(),
      nodes: HashMap::new(),
    };

    let mut pending = vec![target.to_string()];
    while let Some(id) = pending.pop() {
      let Some(task) = graph.task(&id) else {
        continue;
      };
      let dependent = dag.node(&id);
      for dep in task.dependencies() {
        if graph.task(dep).is_none() {
          continue;
        }
        let is_new = !dag.nodes.contains_key(dep);
        let dependency = dag.node(dep);
        dag.graph.update_edge(dependency, dependent, ());
        if is_new {
          pending.push(dep.to_string());
        }
      }
    }

    dag
  }

  fn node(&mut self, id: &str) -> NodeIndex {
    if let Some(&idx) = self.nodes.get(id) {
      return idx;
    }
    let idx = self.graph.add_node(id.to_string());
    self.nodes.insert(id.to_string(), idx);
    idx
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Task ids with dependencies before dependents, or the id of a task on a
  /// cycle.
  pub fn topological_order(&self) -> Result<Vec<String>, String> {
    toposort(&self.graph, None)
      .map(|order| order.into_iter().map(|idx| self.graph[idx].clone()).collect())
      .map_err(|cycle| self.graph[cycle.node_id()].clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::{Glob, Task, TaskArgument};
  use std::path::Path;

  fn graph(edges: &[(&str, &[&str])]) -> BuildGraph {
    let mut graph = BuildGraph::new(Path::new("/base"));
    for (id, deps) in edges {
      let inputs = deps.iter().map(|d| TaskArgument::task(*d, Glob::default())).collect();
      graph.insert_task(Task::new(*id, inputs, Glob::default(), None).unwrap()).unwrap();
    }
    graph
  }

  #[test]
  fn orders_dependencies_first() {
    let g = graph(&[("app", &["lib", "gen"]), ("lib", &["gen"]), ("gen", &[]), ("unrelated", &[])]);
    let dag = TaskDag::reachable_from(&g, "app");
    assert_eq!(dag.len(), 3);

    let order = dag.topological_order().unwrap();
    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    assert!(pos("gen") < pos("lib"));
    assert!(pos("lib") < pos("app"));
  }

  #[test]
  fn detects_cycles() {
    let g = graph(&[("a", &["b"]), ("b", &["a"])]);
    let cycle = TaskDag::reachable_from(&g, "a").topological_order().unwrap_err();
    assert!(cycle == "a" || cycle == "b");
  }

  #[test]
  fn detects_self_reference() {
    let g = graph(&[("a", &["a"])]);
    assert_eq!(TaskDag::reachable_from(&g, "a").topological_order().unwrap_err(), "a");
  }

  #[test]
  fn unknown_target_is_empty() {
    let g = graph(&[("a", &[])]);
    assert!(TaskDag::reachable_from(&g, "missing").is_empty());
  }
}
