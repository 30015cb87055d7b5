//! Generic keyed dependency graph with topological sort.
//!
//! Nodes are keyed by a caller-supplied extractor so values can reference
//! each other by name instead of by pointer; the graph only lives for the
//! duration of a build.

use std::collections::{HashMap, HashSet};

/// A directed graph keyed by a caller-supplied key extractor.
///
/// Edges point from a dependent value to its dependency
/// (`add_edge(child, parent)`), and [`topological_sort`] emits dependencies
/// before dependents, so a parent is always emitted before its children.
///
/// Cycles are not expected in valid input. If one is present the sort still
/// terminates via the visited set, but the order among cycle members is
/// unspecified.
///
/// [`topological_sort`]: DependencyGraph::topological_sort
#[derive(Debug)]
pub struct DependencyGraph<T> {
    nodes: HashMap<String, GraphNode<T>>,
    /// Insertion order, so sort output is deterministic for unrelated nodes.
    order: Vec<String>,
    key_of: fn(&T) -> &str,
}

#[derive(Debug)]
struct GraphNode<T> {
    value: T,
    dependencies: Vec<String>,
}

impl<T> DependencyGraph<T> {
    /// Create an empty graph with the given key extractor.
    pub fn new(key_of: fn(&T) -> &str) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            key_of,
        }
    }

    /// Number of nodes currently in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Remove every node and edge.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
    }

    /// Add a standalone node. Adding an already-present key is a no-op.
    pub fn add_node(&mut self, value: T) {
        self.insert(value);
    }

    /// Add an edge `from -> to`, recording that `from` depends on `to`.
    ///
    /// Both nodes are created if absent.
    pub fn add_edge(&mut self, from: T, to: T) {
        let to_key = self.insert(to);
        let from_key = self.insert(from);
        let node = self
            .nodes
            .get_mut(&from_key)
            .expect("node inserted above");
        if !node.dependencies.contains(&to_key) {
            node.dependencies.push(to_key);
        }
    }

    fn insert(&mut self, value: T) -> String {
        let key = (self.key_of)(&value).to_owned();
        if !self.nodes.contains_key(&key) {
            self.order.push(key.clone());
            self.nodes.insert(
                key.clone(),
                GraphNode {
                    value,
                    dependencies: Vec::new(),
                },
            );
        }
        key
    }

    /// Return all values ordered so that every dependency precedes its
    /// dependents.
    ///
    /// Depth-first post-order: a node is emitted after everything it depends
    /// on, so for the route graph a parent is always emitted before any of
    /// its children.
    pub fn topological_sort(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut result = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::with_capacity(self.nodes.len());

        for key in &self.order {
            self.visit(key, &mut visited, &mut result);
        }

        result
    }

    fn visit(&self, key: &str, visited: &mut HashSet<String>, out: &mut Vec<T>)
    where
        T: Clone,
    {
        if visited.contains(key) {
            return;
        }
        visited.insert(key.to_owned());

        let Some(node) = self.nodes.get(key) else {
            return;
        };
        for dependency in &node.dependencies {
            self.visit(dependency, visited, out);
        }

        out.push(node.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> DependencyGraph<(&'static str, &'static str)> {
        // (name, payload) pairs keyed by name.
        DependencyGraph::new(|v| v.0)
    }

    fn position(sorted: &[(&str, &str)], name: &str) -> usize {
        sorted
            .iter()
            .position(|(n, _)| *n == name)
            .unwrap_or_else(|| panic!("{name} missing from sort output"))
    }

    #[test]
    fn single_node() {
        let mut g = graph();
        g.add_node(("a", "payload"));
        let sorted = g.topological_sort();
        assert_eq!(sorted, vec![("a", "payload")]);
    }

    #[test]
    fn add_node_idempotent() {
        let mut g = graph();
        g.add_node(("a", "first"));
        g.add_node(("a", "second"));
        assert_eq!(g.len(), 1);
        assert_eq!(g.topological_sort(), vec![("a", "first")]);
    }

    #[test]
    fn dependency_emitted_before_dependent() {
        let mut g = graph();
        g.add_edge(("child", ""), ("parent", ""));
        let sorted = g.topological_sort();
        assert!(position(&sorted, "parent") < position(&sorted, "child"));
    }

    #[test]
    fn chain_is_fully_ordered() {
        let mut g = graph();
        g.add_edge(("c", ""), ("b", ""));
        g.add_edge(("b", ""), ("a", ""));
        let sorted = g.topological_sort();
        assert!(position(&sorted, "a") < position(&sorted, "b"));
        assert!(position(&sorted, "b") < position(&sorted, "c"));
    }

    #[test]
    fn diamond_dependencies() {
        let mut g = graph();
        g.add_edge(("left", ""), ("root", ""));
        g.add_edge(("right", ""), ("root", ""));
        g.add_edge(("leaf", ""), ("left", ""));
        g.add_edge(("leaf", ""), ("right", ""));
        let sorted = g.topological_sort();
        assert_eq!(sorted.len(), 4);
        assert!(position(&sorted, "root") < position(&sorted, "left"));
        assert!(position(&sorted, "root") < position(&sorted, "right"));
        assert!(position(&sorted, "left") < position(&sorted, "leaf"));
        assert!(position(&sorted, "right") < position(&sorted, "leaf"));
    }

    #[test]
    fn cycle_terminates() {
        let mut g = graph();
        g.add_edge(("a", ""), ("b", ""));
        g.add_edge(("b", ""), ("a", ""));
        // Order among cycle members is unspecified; the sort must still
        // terminate and emit each node exactly once.
        let sorted = g.topological_sort();
        assert_eq!(sorted.len(), 2);
    }

    #[test]
    fn clear_empties_graph() {
        let mut g = graph();
        g.add_edge(("child", ""), ("parent", ""));
        assert!(!g.is_empty());
        g.clear();
        assert!(g.is_empty());
        assert!(g.topological_sort().is_empty());
    }
}
