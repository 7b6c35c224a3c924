//! Builds the per-container node/edge tree the oracle consumes, and flags
//! the back-edges its cycle breaker should reverse (spec.md §4.4).

use layout_classify::{is_boundary_event, is_layoutable_shape};
use layout_model::{BpmnType, Id, Registry, constants};
use std::collections::HashMap;

/// Larger padding for participants than for nested subprocesses, per
/// spec.md §4.4 ("options override setting padding").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeOptions {
    pub padding: f64,
}

const SUBPROCESS_PADDING: f64 = 20.0;
const PARTICIPANT_PADDING: f64 = 40.0;

/// Relative priority an edge carries into the oracle's cycle breaker;
/// back-edges get [`EdgePriority::Low`] so the breaker reverses exactly
/// those (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePriority {
    Normal,
    Low,
}

/// Where a [`GraphEdge`] came from: a real connection, or a synthetic
/// proxy standing in for a boundary event's outgoing flow (spec.md §4.4:
/// "Boundary-event outgoing flows are emitted as proxy edges from the
/// boundary event's host").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrigin {
    Connection(Id),
    BoundaryProxy { boundary_event: Id },
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub origin: EdgeOrigin,
    pub source: Id,
    pub target: Id,
    pub priority: EdgePriority,
}

/// One node in the container tree submitted to the oracle. Leaf nodes have
/// empty `children`/`edges`; a layoutable shape with layoutable descendants
/// (subprocess, participant) is emitted as a compound node instead.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: Id,
    pub width: f64,
    pub height: f64,
    pub children: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub options: Option<NodeOptions>,
}

fn default_size(bpmn_type: BpmnType) -> (f64, f64) {
    use BpmnType::*;
    match bpmn_type {
        StartEvent | EndEvent | IntermediateEvent | BoundaryEvent => {
            (constants::DEFAULT_EVENT_SIZE, constants::DEFAULT_EVENT_SIZE)
        }
        ExclusiveGateway | InclusiveGateway | ParallelGateway | EventBasedGateway => {
            (constants::DEFAULT_GATEWAY_SIZE, constants::DEFAULT_GATEWAY_SIZE)
        }
        _ => (constants::DEFAULT_TASK_WIDTH, constants::DEFAULT_TASK_HEIGHT),
    }
}

/// Build the node/edge tree rooted at `container`'s direct layoutable
/// children, recursing into compound shapes (subprocesses, participants).
pub fn build_graph(registry: &Registry, container: Id) -> GraphNode {
    let graph = build_node(registry, container);
    tracing::trace!(target: "graph.build", container = container.0, nodes = graph.children.len(), edges = graph.edges.len(), "graph built");
    graph
}

fn build_node(registry: &Registry, container: Id) -> GraphNode {
    let container_el = registry.get(container);
    let (width, height) = container_el
        .map(|e| {
            if e.width > 0.0 && e.height > 0.0 {
                (e.width, e.height)
            } else {
                default_size(e.bpmn_type)
            }
        })
        .unwrap_or((0.0, 0.0));

    let mut children = Vec::new();
    let mut node_ids: Vec<Id> = Vec::new();

    for child in registry.children_of(container) {
        if !is_layoutable_shape(child.bpmn_type) {
            continue;
        }
        node_ids.push(child.id);
        let has_layoutable_descendants = registry
            .children_of(child.id)
            .iter()
            .any(|d| is_layoutable_shape(d.bpmn_type));
        if has_layoutable_descendants {
            let mut compound = build_node(registry, child.id);
            compound.options = Some(NodeOptions {
                padding: if child.bpmn_type == BpmnType::Participant {
                    PARTICIPANT_PADDING
                } else {
                    SUBPROCESS_PADDING
                },
            });
            children.push(compound);
        } else {
            let (w, h) = if child.width > 0.0 && child.height > 0.0 {
                (child.width, child.height)
            } else {
                default_size(child.bpmn_type)
            };
            children.push(GraphNode {
                id: child.id,
                width: w,
                height: h,
                children: Vec::new(),
                edges: Vec::new(),
                options: None,
            });
        }
    }

    let node_id_set: std::collections::HashSet<Id> = node_ids.iter().copied().collect();
    let mut edges = Vec::new();
    for conn in registry.filter(|e| {
        e.is_connection()
            && e.source.is_some_and(|s| node_id_set.contains(&s))
            && e.target.is_some_and(|t| node_id_set.contains(&t))
    }) {
        edges.push(GraphEdge {
            origin: EdgeOrigin::Connection(conn.id),
            source: conn.source.unwrap(),
            target: conn.target.unwrap(),
            priority: EdgePriority::Normal,
        });
    }

    // Boundary-event proxy edges: for each boundary event hosted by a node
    // in this container, substitute the host as the source of its outgoing
    // flows so the oracle positions the downstream element relative to the
    // host rather than leaving the boundary event's real successor edge
    // dangling without a submitted source.
    for be in registry.filter(|e| is_boundary_event(e.bpmn_type)) {
        let Some(host) = be.host else { continue };
        if !node_id_set.contains(&host) {
            continue;
        }
        for out in registry.filter(|e| e.is_connection() && e.source == Some(be.id)) {
            let Some(target) = out.target else { continue };
            if !node_id_set.contains(&target) {
                continue;
            }
            edges.push(GraphEdge {
                origin: EdgeOrigin::BoundaryProxy {
                    boundary_event: be.id,
                },
                source: host,
                target,
                priority: EdgePriority::Normal,
            });
        }
    }

    mark_back_edges(&node_ids, &mut edges);

    GraphNode {
        id: container,
        width,
        height,
        children,
        edges,
        options: None,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

/// DFS over the submitted edge set starting from nodes with no incoming
/// edge within that set; any edge reaching an in-progress node is a
/// back-edge and gets downgraded to [`EdgePriority::Low`] (spec.md §4.4).
fn mark_back_edges(node_ids: &[Id], edges: &mut [GraphEdge]) {
    let mut adjacency: HashMap<Id, Vec<usize>> = HashMap::new();
    let mut has_incoming: std::collections::HashSet<Id> = std::collections::HashSet::new();
    for (idx, edge) in edges.iter().enumerate() {
        adjacency.entry(edge.source).or_default().push(idx);
        has_incoming.insert(edge.target);
    }

    let mut state: HashMap<Id, VisitState> =
        node_ids.iter().map(|&id| (id, VisitState::Unvisited)).collect();

    let roots: Vec<Id> = node_ids
        .iter()
        .copied()
        .filter(|id| !has_incoming.contains(id))
        .collect();
    // Fall back to visiting every node as a potential root so cyclic
    // components with no "natural" source still get a deterministic DFS
    // order (all nodes in such a component are equally valid starts).
    let all_roots = if roots.is_empty() { node_ids.to_vec() } else { roots };

    let mut back_edge_indices = Vec::new();
    for root in all_roots {
        dfs(root, &adjacency, &mut state, edges, &mut back_edge_indices);
    }
    for idx in back_edge_indices {
        edges[idx].priority = EdgePriority::Low;
    }
}

fn dfs(
    node: Id,
    adjacency: &HashMap<Id, Vec<usize>>,
    state: &mut HashMap<Id, VisitState>,
    edges: &[GraphEdge],
    back_edges: &mut Vec<usize>,
) {
    match state.get(&node) {
        Some(VisitState::Done) => return,
        Some(VisitState::InProgress) => return,
        _ => {}
    }
    state.insert(node, VisitState::InProgress);
    if let Some(out_edges) = adjacency.get(&node) {
        for &idx in out_edges {
            let target = edges[idx].target;
            match state.get(&target) {
                Some(VisitState::InProgress) => back_edges.push(idx),
                Some(VisitState::Done) => {}
                _ => dfs(target, adjacency, state, edges, back_edges),
            }
        }
    }
    state.insert(node, VisitState::Done);
}
