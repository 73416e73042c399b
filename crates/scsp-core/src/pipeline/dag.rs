use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What an action does inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRole {
    Source,
    Scan,
    Aggregation,
}

/// A node in the pipeline DAG representing one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionNode {
    pub id: String,
    pub name: String,
    pub stage: String,
    pub role: ActionRole,
    pub provider: String,
    pub run_order: u32,
    pub needs: Vec<String>,
}

impl ActionNode {
    pub fn new(id: String, name: String, stage: String, role: ActionRole) -> Self {
        Self {
            id,
            name,
            stage,
            role,
            provider: String::new(),
            run_order: 1,
            needs: Vec::new(),
        }
    }
}

/// Edge types in the pipeline DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DagEdge {
    /// Hard ordering: the later stage or runOrder group waits for this one.
    Dependency,
    /// The target consumes an artifact the source produces.
    Artifact,
    /// Soft join through shared storage: the target polls for the source's
    /// output but is not scheduled after it.
    Storage,
}

impl DagEdge {
    pub fn is_scheduling(&self) -> bool {
        !matches!(self, DagEdge::Storage)
    }
}

/// Graph view of an assembled pipeline.
#[derive(Debug, Clone)]
pub struct PipelineDag {
    pub name: String,
    pub graph: DiGraph<ActionNode, DagEdge>,
    pub node_map: HashMap<String, NodeIndex>,
}

impl PipelineDag {
    pub fn new(name: String) -> Self {
        Self {
            name,
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Add an action node to the DAG, returning its index.
    pub fn add_action(&mut self, action: ActionNode) -> NodeIndex {
        let id = action.id.clone();
        let idx = self.graph.add_node(action);
        self.node_map.insert(id, idx);
        idx
    }

    /// Add an edge between two actions.
    pub fn add_edge(&mut self, from_id: &str, to_id: &str, kind: DagEdge) -> anyhow::Result<()> {
        let from_idx = self
            .node_map
            .get(from_id)
            .ok_or_else(|| anyhow::anyhow!("Action '{}' not found in DAG", from_id))?;
        let to_idx = self
            .node_map
            .get(to_id)
            .ok_or_else(|| anyhow::anyhow!("Action '{}' not found in DAG", to_id))?;
        self.graph.add_edge(*from_idx, *to_idx, kind);
        if kind.is_scheduling() {
            let from = from_id.to_string();
            let needs = &mut self.graph[*to_idx].needs;
            if !needs.contains(&from) {
                needs.push(from);
            }
        }
        Ok(())
    }

    fn scheduling_neighbors(&self, idx: NodeIndex, dir: Direction) -> usize {
        self.graph
            .edges_directed(idx, dir)
            .filter(|e| e.weight().is_scheduling())
            .count()
    }

    /// Actions with nothing scheduled before them.
    pub fn root_actions(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| self.scheduling_neighbors(idx, Direction::Incoming) == 0)
            .collect()
    }

    /// Actions nothing is scheduled after.
    pub fn leaf_actions(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| self.scheduling_neighbors(idx, Direction::Outgoing) == 0)
            .collect()
    }

    pub fn action_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn get_action(&self, id: &str) -> Option<&ActionNode> {
        self.node_map.get(id).map(|idx| &self.graph[*idx])
    }

    pub fn has_edge(&self, from_id: &str, to_id: &str, kind: DagEdge) -> bool {
        match (self.node_map.get(from_id), self.node_map.get(to_id)) {
            (Some(&from), Some(&to)) => self
                .graph
                .edges_connecting(from, to)
                .any(|e| *e.weight() == kind),
            _ => false,
        }
    }

    /// Scheduling level of every action: roots are level 0.
    pub fn levels(&self) -> HashMap<NodeIndex, usize> {
        let mut levels: HashMap<NodeIndex, usize> = HashMap::new();
        for root in self.root_actions() {
            self.compute_levels(root, 0, &mut levels);
        }
        levels
    }

    /// Maximum number of actions that can run concurrently.
    pub fn max_parallelism(&self) -> usize {
        let levels = self.levels();
        if levels.is_empty() {
            return 0;
        }

        let max_level = levels.values().copied().max().unwrap_or(0);
        let mut level_counts = vec![0usize; max_level + 1];
        for level in levels.values() {
            level_counts[*level] += 1;
        }
        level_counts.into_iter().max().unwrap_or(0)
    }

    fn compute_levels(&self, node: NodeIndex, level: usize, levels: &mut HashMap<NodeIndex, usize>) {
        let current = levels.entry(node).or_insert(0);
        if level > *current {
            *current = level;
        }
        let level = *current;
        let next: Vec<NodeIndex> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .filter(|e| e.weight().is_scheduling())
            .map(|e| e.target())
            .collect();
        for neighbor in next {
            self.compute_levels(neighbor, level + 1, levels);
        }
    }
}
