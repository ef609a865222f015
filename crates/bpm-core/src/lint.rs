//! Workflow validation for BPM diagrams.
//!
//! Reports structural problems without modifying the diagram. An empty
//! result means the process can be run.

use crate::id::ElementId;
use crate::model::{Diagram, NodeKind};
use petgraph::algo::{has_path_connecting, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

// ─── Diagnostic types ────────────────────────────────────────────────────

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LintSeverity {
    /// The process cannot run as drawn.
    Error,
    /// Suspicious, but the process may still run.
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct LintDiagnostic {
    /// The node this diagnostic refers to, if any.
    pub node_id: Option<ElementId>,
    /// Human-readable message.
    pub message: String,
    pub severity: LintSeverity,
    /// Short rule identifier (e.g. "missing-start", "orphan-node").
    pub rule: &'static str,
}

impl LintDiagnostic {
    fn diagram(rule: &'static str, severity: LintSeverity, message: String) -> Self {
        Self {
            node_id: None,
            message,
            severity,
            rule,
        }
    }

    fn node(id: ElementId, rule: &'static str, severity: LintSeverity, message: String) -> Self {
        Self {
            node_id: Some(id),
            message,
            severity,
            rule,
        }
    }
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Run every rule over the diagram and return diagnostics.
#[must_use]
pub fn lint_diagram(diagram: &Diagram) -> Vec<LintDiagnostic> {
    let flow = Flow::build(diagram);
    let mut diags = Vec::new();
    lint_start_end(diagram, &mut diags);
    lint_connectivity(diagram, &flow, &mut diags);
    lint_reachability(diagram, &flow, &mut diags);
    lint_loops(diagram, &flow, &mut diags);
    diags
}

/// True when no rule reports an error.
pub fn is_valid(diags: &[LintDiagnostic]) -> bool {
    diags.iter().all(|d| d.severity != LintSeverity::Error)
}

// ─── Graph view ───────────────────────────────────────────────────────────

struct Flow {
    graph: DiGraph<ElementId, ()>,
    index: HashMap<ElementId, NodeIndex>,
}

impl Flow {
    fn build(diagram: &Diagram) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for n in diagram.nodes() {
            index.insert(n.id, graph.add_node(n.id));
        }
        for e in diagram.edges() {
            if let (Some(&s), Some(&t)) = (index.get(&e.source), index.get(&e.target)) {
                graph.add_edge(s, t, ());
            }
        }
        Self { graph, index }
    }

    fn incoming(&self, id: ElementId) -> usize {
        self.index.get(&id).map_or(0, |&i| {
            self.graph
                .neighbors_directed(i, petgraph::Direction::Incoming)
                .count()
        })
    }

    fn outgoing(&self, id: ElementId) -> usize {
        self.index.get(&id).map_or(0, |&i| {
            self.graph
                .neighbors_directed(i, petgraph::Direction::Outgoing)
                .count()
        })
    }
}

// ─── Rules ────────────────────────────────────────────────────────────────

fn lint_start_end(diagram: &Diagram, diags: &mut Vec<LintDiagnostic>) {
    let starts = diagram.nodes().iter().filter(|n| n.kind == NodeKind::Start).count();
    let ends = diagram.nodes().iter().filter(|n| n.kind == NodeKind::End).count();
    if starts == 0 {
        diags.push(LintDiagnostic::diagram(
            "missing-start",
            LintSeverity::Error,
            "No start node found.".into(),
        ));
    } else if starts > 1 {
        diags.push(LintDiagnostic::diagram(
            "multiple-start",
            LintSeverity::Error,
            format!("{starts} start nodes found; a process has exactly one."),
        ));
    }
    if ends == 0 {
        diags.push(LintDiagnostic::diagram(
            "missing-end",
            LintSeverity::Error,
            "No end node found.".into(),
        ));
    }
}

fn lint_connectivity(diagram: &Diagram, flow: &Flow, diags: &mut Vec<LintDiagnostic>) {
    for n in diagram.nodes() {
        let (inc, out) = (flow.incoming(n.id), flow.outgoing(n.id));
        match n.kind {
            NodeKind::Start if out == 0 => diags.push(LintDiagnostic::node(
                n.id,
                "start-without-outgoing",
                LintSeverity::Error,
                format!("Start node \"{}\" has no outgoing transition.", n.label),
            )),
            NodeKind::End if inc == 0 => diags.push(LintDiagnostic::node(
                n.id,
                "end-without-incoming",
                LintSeverity::Error,
                format!("End node \"{}\" has no incoming transition.", n.label),
            )),
            NodeKind::Task | NodeKind::Gateway if inc == 0 && out == 0 => {
                diags.push(LintDiagnostic::node(
                    n.id,
                    "orphan-node",
                    LintSeverity::Error,
                    format!("Node \"{}\" is not connected.", n.label),
                ))
            }
            NodeKind::Task | NodeKind::Gateway if inc == 0 => diags.push(LintDiagnostic::node(
                n.id,
                "no-incoming",
                LintSeverity::Warning,
                format!("Node \"{}\" has no incoming transition.", n.label),
            )),
            NodeKind::Task | NodeKind::Gateway if out == 0 => diags.push(LintDiagnostic::node(
                n.id,
                "no-outgoing",
                LintSeverity::Warning,
                format!("Node \"{}\" has no outgoing transition.", n.label),
            )),
            _ => {}
        }
    }
}

/// The first start node must reach some end node.
fn lint_reachability(diagram: &Diagram, flow: &Flow, diags: &mut Vec<LintDiagnostic>) {
    let Some(start) = diagram.nodes().iter().find(|n| n.kind == NodeKind::Start) else {
        return;
    };
    let ends: Vec<_> = diagram
        .nodes()
        .iter()
        .filter(|n| n.kind == NodeKind::End)
        .filter_map(|n| flow.index.get(&n.id).copied())
        .collect();
    if ends.is_empty() {
        return;
    }
    let Some(&from) = flow.index.get(&start.id) else {
        return;
    };
    if !ends
        .iter()
        .any(|&to| has_path_connecting(&flow.graph, from, to, None))
    {
        diags.push(LintDiagnostic::node(
            start.id,
            "no-path-to-end",
            LintSeverity::Error,
            "No path leads from the start node to an end node.".into(),
        ));
    }
}

/// One warning per cycle that does not pass through an end node.
fn lint_loops(diagram: &Diagram, flow: &Flow, diags: &mut Vec<LintDiagnostic>) {
    for component in tarjan_scc(&flow.graph) {
        if component.len() < 2 {
            continue;
        }
        let ids: Vec<ElementId> = component.iter().map(|&i| flow.graph[i]).collect();
        let through_end = ids
            .iter()
            .any(|&id| diagram.node_by_id(id).is_some_and(|n| n.kind == NodeKind::End));
        if through_end {
            continue;
        }
        let Some(&first) = ids.iter().min_by(|a, b| a.as_str().cmp(b.as_str())) else {
            continue;
        };
        diags.push(LintDiagnostic::node(
            first,
            "potential-loop",
            LintSeverity::Warning,
            format!("Potential infinite loop through {} node(s).", ids.len()),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node};

    fn build(nodes: &[(&str, NodeKind)], edges: &[(&str, &str)]) -> Diagram {
        let mut d = Diagram::new();
        for (i, (id, kind)) in nodes.iter().enumerate() {
            let id = ElementId::intern(&format!("node_{id}"));
            d.add_node(Node::new(id, *kind, i as f32 * 200.0, 0.0))
                .unwrap();
        }
        for (s, t) in edges {
            d.add_edge(Edge::new(
                ElementId::intern(&format!("lint_{s}_{t}")),
                ElementId::intern(&format!("node_{s}")),
                ElementId::intern(&format!("node_{t}")),
            ))
            .unwrap();
        }
        d
    }

    fn rules(d: &Diagram) -> Vec<&'static str> {
        lint_diagram(d).into_iter().map(|d| d.rule).collect()
    }

    #[test]
    fn valid_linear_process() {
        let d = build(
            &[
                ("ls", NodeKind::Start),
                ("lt", NodeKind::Task),
                ("le", NodeKind::End),
            ],
            &[("ls", "lt"), ("lt", "le")],
        );
        let diags = lint_diagram(&d);
        assert!(diags.is_empty(), "{diags:?}");
        assert!(is_valid(&diags));
    }

    #[test]
    fn empty_diagram_misses_start_and_end() {
        assert_eq!(rules(&Diagram::new()), vec!["missing-start", "missing-end"]);
    }

    #[test]
    fn connectivity_rules() {
        let d = build(
            &[
                ("cs", NodeKind::Start),
                ("co", NodeKind::Task),
                ("cg", NodeKind::Gateway),
                ("ce", NodeKind::End),
                ("ce2", NodeKind::End),
            ],
            &[("cs", "cg"), ("cg", "ce")],
        );
        let r = rules(&d);
        assert!(r.contains(&"orphan-node"));
        assert!(r.contains(&"end-without-incoming"));
        assert!(!r.contains(&"no-path-to-end"));
    }

    #[test]
    fn unreachable_end() {
        let d = build(
            &[
                ("us", NodeKind::Start),
                ("ut", NodeKind::Task),
                ("uu", NodeKind::Task),
                ("ue", NodeKind::End),
            ],
            &[("us", "ut"), ("uu", "ue")],
        );
        let diags = lint_diagram(&d);
        assert!(diags.iter().any(|d| d.rule == "no-path-to-end"));
        assert!(diags.iter().any(|d| d.rule == "no-outgoing"));
        assert!(diags.iter().any(|d| d.rule == "no-incoming"));
        assert!(!is_valid(&diags));
    }

    #[test]
    fn cycle_is_a_warning() {
        let d = build(
            &[
                ("ys", NodeKind::Start),
                ("ya", NodeKind::Task),
                ("yb", NodeKind::Gateway),
                ("ye", NodeKind::End),
            ],
            &[("ys", "ya"), ("ya", "yb"), ("yb", "ya"), ("yb", "ye")],
        );
        let diags = lint_diagram(&d);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule, "potential-loop");
        assert_eq!(diags[0].node_id, Some(ElementId::intern("node_ya")));
        assert!(is_valid(&diags));
    }
}
