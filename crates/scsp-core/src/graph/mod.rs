use crate::pipeline::{ActionNode, ActionRole, DagEdge, PipelineDag};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

fn node_label(action: &ActionNode) -> String {
    match action.role {
        ActionRole::Aggregation => format!("{}\\naggregation", action.name),
        _ => format!("{}\\n{}", action.name, action.provider),
    }
}

fn node_color(dag: &PipelineDag, idx: NodeIndex, roots: &[NodeIndex]) -> &'static str {
    if roots.contains(&idx) {
        "#22c55e"
    } else if dag.graph[idx].role == ActionRole::Aggregation {
        "#3b82f6"
    } else {
        "#f59e0b"
    }
}

/// Generate a Mermaid flowchart of the pipeline DAG.
///
/// Storage joins are drawn dotted: the aggregation action polls for them
/// but is not scheduled after them.
pub fn to_mermaid(dag: &PipelineDag) -> String {
    let mut lines = vec!["graph LR".to_string()];

    for idx in dag.graph.node_indices() {
        let action = &dag.graph[idx];
        lines.push(format!("    {}[\"{}\"]", action.id, node_label(action)));
    }

    for edge in dag.graph.edge_references() {
        let source = &dag.graph[edge.source()].id;
        let target = &dag.graph[edge.target()].id;
        let arrow = match edge.weight() {
            DagEdge::Dependency => "-->",
            DagEdge::Artifact => "-- artifact -->",
            DagEdge::Storage => "-.->",
        };
        lines.push(format!("    {} {} {}", source, arrow, target));
    }

    let roots = dag.root_actions();
    if !roots.is_empty() {
        let ids: Vec<&str> = roots.iter().map(|&idx| dag.graph[idx].id.as_str()).collect();
        lines.push(format!("    style {} fill:#22c55e,color:#fff", ids.join(",")));
    }
    let aggregations: Vec<&str> = dag
        .graph
        .node_weights()
        .filter(|a| a.role == ActionRole::Aggregation)
        .map(|a| a.id.as_str())
        .collect();
    if !aggregations.is_empty() {
        lines.push(format!(
            "    style {} fill:#3b82f6,color:#fff",
            aggregations.join(",")
        ));
    }

    lines.join("\n")
}

/// Generate a DOT (Graphviz) representation of the pipeline DAG.
pub fn to_dot(dag: &PipelineDag) -> String {
    let mut lines = vec![
        format!("digraph \"{}\" {{", dag.name),
        "    rankdir=LR;".to_string(),
        "    node [shape=box, style=\"rounded,filled\", fontname=\"Helvetica\"];".to_string(),
        "    edge [color=\"#666666\"];".to_string(),
        String::new(),
    ];

    let roots = dag.root_actions();
    for idx in dag.graph.node_indices() {
        let action = &dag.graph[idx];
        lines.push(format!(
            "    \"{}\" [label=\"{}\", fillcolor=\"{}\", fontcolor=\"#ffffff\"];",
            action.id,
            node_label(action),
            node_color(dag, idx, &roots)
        ));
    }

    lines.push(String::new());

    for edge in dag.graph.edge_references() {
        let style = match edge.weight() {
            DagEdge::Storage => " [style=dashed]",
            DagEdge::Artifact => " [label=\"artifact\"]",
            DagEdge::Dependency => "",
        };
        lines.push(format!(
            "    \"{}\" -> \"{}\"{};",
            dag.graph[edge.source()].id,
            dag.graph[edge.target()].id,
            style
        ));
    }

    lines.push("}".to_string());
    lines.join("\n")
}

/// Plain-text level view: which actions start together.
pub fn to_ascii(dag: &PipelineDag) -> String {
    let levels = dag.levels();
    let max_level = levels.values().copied().max().unwrap_or(0);
    let mut by_level: Vec<Vec<&ActionNode>> = vec![Vec::new(); max_level + 1];
    for idx in dag.graph.node_indices() {
        if let Some(level) = levels.get(&idx) {
            by_level[*level].push(&dag.graph[idx]);
        }
    }

    let mut lines = vec![
        format!(
            "Pipeline: {} ({} actions, {} levels)",
            dag.name,
            dag.action_count(),
            by_level.len()
        ),
        "=".repeat(60),
    ];
    for (level, actions) in by_level.iter().enumerate() {
        let prefix = if level == 0 {
            "START".to_string()
        } else {
            format!("L{}", level)
        };
        let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
        match names.split_first() {
            Some((first, rest)) if !rest.is_empty() => {
                lines.push(format!("  {:>5} ─┬─ {}", prefix, first));
                for (i, name) in rest.iter().enumerate() {
                    let branch = if i == rest.len() - 1 { "└─" } else { "├─" };
                    lines.push(format!("         {} {}", branch, name));
                }
            }
            Some((first, _)) => lines.push(format!("  {:>5} ── {}", prefix, first)),
            None => {}
        }
        if level < max_level {
            lines.push("         │".to_string());
        }
    }
    lines.join("\n")
}
