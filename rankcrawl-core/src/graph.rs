//! Directed link graph built up during a crawl.
//!
//! Node keys are exactly the URLs that were fetched successfully. Edges may
//! point at URLs that have no node (yet, or ever); those are dangling edges
//! and are a normal part of a time-boxed crawl.

use crate::error::{CrawlError, Result};
use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(rename = "source")]
    pub from: String,
    #[serde(rename = "target")]
    pub to: String,
}

impl GraphEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<String, GraphNode>,
    node_order: Vec<String>,
    edges: HashSet<GraphEdge>,
    edge_order: Vec<GraphEdge>,
    frozen: bool,
}

/// Shared, thread-safe link graph. Frozen once the crawl that owns it ends.
#[derive(Debug, Default)]
pub struct LinkGraph {
    state: RwLock<GraphState>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a node for `url` unless one exists, returning the node's id.
    ///
    /// An existing node is returned untouched: its id, timestamp and metadata
    /// are fixed at creation.
    pub fn upsert_node(
        &self,
        url: &str,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<Uuid> {
        let mut state = self.write();
        if state.frozen {
            return Err(CrawlError::GraphFrozen(format!("node {}", url)));
        }
        if let Some(existing) = state.nodes.get(url) {
            return Ok(existing.id);
        }

        let node = GraphNode {
            id: Uuid::new_v4(),
            url: url.to_string(),
            title,
            description,
            indexed_at: Utc::now(),
        };
        let id = node.id;
        debug!("Added node {} ({})", url, id);
        state.nodes.insert(url.to_string(), node);
        state.node_order.push(url.to_string());
        Ok(id)
    }

    /// Insert the edge `from -> to`. Returns `false` if it was already present.
    pub fn add_edge(&self, from: &str, to: &str) -> Result<bool> {
        let mut state = self.write();
        if state.frozen {
            return Err(CrawlError::GraphFrozen(format!("edge {} -> {}", from, to)));
        }

        let edge = GraphEdge::new(from, to);
        if state.edges.contains(&edge) {
            return Ok(false);
        }
        state.edges.insert(edge.clone());
        state.edge_order.push(edge);
        Ok(true)
    }

    pub fn node(&self, url: &str) -> Option<GraphNode> {
        self.read().nodes.get(url).cloned()
    }

    pub fn contains_node(&self, url: &str) -> bool {
        self.read().nodes.contains_key(url)
    }

    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.read().edges.len()
    }

    /// Reject every later mutation.
    pub fn freeze(&self) {
        self.write().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.read().frozen
    }

    /// Copy the graph out in insertion order.
    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.read();
        GraphSnapshot {
            nodes: state
                .node_order
                .iter()
                .filter_map(|url| state.nodes.get(url).cloned())
                .collect(),
            edges: state.edge_order.clone(),
        }
    }
}

/// Immutable copy of a [`LinkGraph`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, url: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.url == url)
    }

    /// Edges whose target never became a node.
    pub fn dangling_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        let known: HashSet<&str> = self.nodes.iter().map(|n| n.url.as_str()).collect();
        self.edges
            .iter()
            .filter(move |e| !known.contains(e.to.as_str()))
    }

    /// Every URL in the graph: nodes first, then unresolved edge endpoints in
    /// first-seen order.
    pub fn vertices(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut vertices = Vec::new();

        let endpoints = self
            .edges
            .iter()
            .flat_map(|e| [e.from.as_str(), e.to.as_str()]);
        for url in self.nodes.iter().map(|n| n.url.as_str()).chain(endpoints) {
            if seen.insert(url) {
                vertices.push(url.to_string());
            }
        }
        vertices
    }

    /// Build a petgraph view with one vertex per URL in [`Self::vertices`].
    pub fn to_digraph(&self) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for url in self.vertices() {
            let idx = graph.add_node(url.clone());
            index.insert(url, idx);
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
                graph.add_edge(from, to, ());
            }
        }

        (graph, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_upsert_node_sets_metadata() {
        let graph = LinkGraph::new();
        let id = graph
            .upsert_node(
                "http://a.com/",
                Some("test title".to_string()),
                Some("test description".to_string()),
            )
            .unwrap();

        assert_eq!(graph.node_count(), 1);
        let node = graph.node("http://a.com/").unwrap();
        assert_eq!(node.id, id);
        assert_eq!(node.title.as_deref(), Some("test title"));
        assert_eq!(node.description.as_deref(), Some("test description"));
        assert!(node.indexed_at <= Utc::now());
    }

    #[test]
    fn test_upsert_node_is_idempotent() {
        let graph = LinkGraph::new();
        let first = graph.upsert_node("http://a.com/", Some("one".into()), None).unwrap();
        let before = graph.node("http://a.com/").unwrap();

        let second = graph.upsert_node("http://a.com/", Some("two".into()), None).unwrap();
        let after = graph.node("http://a.com/").unwrap();

        assert_eq!(first, second);
        assert_eq!(before, after);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_concurrent_upserts_create_one_node() {
        let graph = Arc::new(LinkGraph::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let graph = graph.clone();
                std::thread::spawn(move || graph.upsert_node("http://a.com/", None, None).unwrap())
            })
            .collect();

        let ids: HashSet<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_edges_collapse_and_may_dangle() {
        let graph = LinkGraph::new();
        graph.upsert_node("http://a.com/", None, None).unwrap();

        assert!(graph.add_edge("http://a.com/", "http://b.com/").unwrap());
        assert!(!graph.add_edge("http://a.com/", "http://b.com/").unwrap());
        assert!(graph.add_edge("http://b.com/", "http://a.com/").unwrap());

        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.node_count(), 1);
        assert!(!graph.contains_node("http://b.com/"));

        let snapshot = graph.snapshot();
        let dangling: Vec<_> = snapshot.dangling_edges().collect();
        assert_eq!(dangling, vec![&GraphEdge::new("http://a.com/", "http://b.com/")]);
    }

    #[test]
    fn test_frozen_graph_rejects_mutation() {
        let graph = LinkGraph::new();
        graph.upsert_node("http://a.com/", None, None).unwrap();
        graph.freeze();

        assert!(graph.is_frozen());
        assert!(matches!(
            graph.upsert_node("http://b.com/", None, None),
            Err(CrawlError::GraphFrozen(_))
        ));
        assert!(matches!(
            graph.add_edge("http://a.com/", "http://b.com/"),
            Err(CrawlError::GraphFrozen(_))
        ));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_snapshot_vertices_and_digraph() {
        let graph = LinkGraph::new();
        graph.upsert_node("http://a.com/", None, None).unwrap();
        graph.upsert_node("http://b.com/", None, None).unwrap();
        graph.add_edge("http://a.com/", "http://b.com/").unwrap();
        graph.add_edge("http://b.com/", "http://c.com/").unwrap();

        let snapshot = graph.snapshot();
        assert_eq!(
            snapshot.vertices(),
            vec!["http://a.com/", "http://b.com/", "http://c.com/"]
        );

        let (digraph, index) = snapshot.to_digraph();
        assert_eq!(digraph.node_count(), 3);
        assert_eq!(digraph.edge_count(), 2);
        assert!(digraph.contains_edge(index["http://a.com/"], index["http://b.com/"]));
    }
}
