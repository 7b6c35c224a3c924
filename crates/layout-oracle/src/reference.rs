//! A small deterministic Sugiyama-style oracle: longest-path layering with
//! back-edge reversal, barycenter crossing reduction, centred node
//! placement, and orthogonal edge-section synthesis. Good enough to drive
//! and test the refinement passes that are the real deliverable; not a
//! claim to ELK-grade quality (spec.md §1 treats the oracle as out of
//! scope; SPEC_FULL.md §4 supplements a concrete stand-in).

use crate::{
    Direction, EdgeSection, LayoutOptions, LayeredLayoutOracle, NodePosition, OracleError,
    OracleResult,
};
use layout_geom::Point;
use layout_graph::{EdgePriority, GraphEdge, GraphNode};
use layout_model::Id;
use std::collections::HashMap;

/// The deterministic stand-in for a real ELK-style layered layout engine.
#[derive(Debug, Default)]
pub struct ReferenceOracle;

impl ReferenceOracle {
    pub fn new() -> Self {
        Self
    }
}

impl LayeredLayoutOracle for ReferenceOracle {
    async fn run(
        &self,
        graph: &GraphNode,
        options: &LayoutOptions,
    ) -> Result<OracleResult, OracleError> {
        tracing::debug!(target: "oracle.run", direction = ?options.direction, nodes = graph.children.len(), "reference oracle running");
        layout_node(graph, options)
    }
}

fn layout_node(node: &GraphNode, options: &LayoutOptions) -> Result<OracleResult, OracleError> {
    if node.children.is_empty() {
        return Ok(OracleResult::empty());
    }

    let layers = assign_layers(node);
    let ordered = reduce_crossings(node, &layers, options);
    let positions = place_nodes(node, &ordered, options);

    let mut result = OracleResult::empty();
    let mut children_results = HashMap::new();
    for child in &node.children {
        if !child.children.is_empty() {
            let child_result = layout_node(child, options)?;
            children_results.insert(child.id, child_result);
        }
    }
    result.children = children_results;

    for (&id, &pos) in &positions {
        if !pos.x.is_finite() || !pos.y.is_finite() {
            return Err(OracleError::NonFiniteCoordinate(id));
        }
    }
    result.positions = positions;
    result.sections = synthesize_sections(node, &result.positions);
    Ok(result)
}

/// Longest-path layering over the forward (non-back) edges: a node's layer
/// is one more than the max layer of its forward predecessors.
fn assign_layers(node: &GraphNode) -> HashMap<Id, usize> {
    let mut layer: HashMap<Id, usize> = node.children.iter().map(|c| (c.id, 0)).collect();
    let forward: Vec<&GraphEdge> = node
        .edges
        .iter()
        .filter(|e| e.priority != EdgePriority::Low)
        .collect();

    // Relax |V| times; sufficient for a DAG restricted to forward edges,
    // and harmless (just a few redundant passes) on any residual cycle the
    // graph builder's DFS didn't fully break.
    for _ in 0..node.children.len().max(1) {
        let mut changed = false;
        for edge in &forward {
            let (Some(&src_layer), Some(&tgt_layer)) =
                (layer.get(&edge.source), layer.get(&edge.target))
            else {
                continue;
            };
            if tgt_layer < src_layer + 1 {
                layer.insert(edge.target, src_layer + 1);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    layer
}

/// Group node ids by layer, in ascending layer order, each layer's
/// internal order seeded by model order, then refined by a few barycenter
/// sweeps against forward-edge neighbours (deterministic: ties keep model
/// order, per `options.random_seed`/`consider_model_order_strategy` being
/// fixed rather than actually randomised).
fn reduce_crossings(
    node: &GraphNode,
    layers: &HashMap<Id, usize>,
    options: &LayoutOptions,
) -> Vec<Vec<Id>> {
    let max_layer = layers.values().copied().max().unwrap_or(0);
    let mut by_layer: Vec<Vec<Id>> = vec![Vec::new(); max_layer + 1];
    for child in &node.children {
        let l = layers.get(&child.id).copied().unwrap_or(0);
        by_layer[l].push(child.id);
    }

    let sweeps = options.thoroughness.min(10) as usize;
    for _ in 0..sweeps {
        for l in 1..by_layer.len() {
            let prev_positions: HashMap<Id, usize> = by_layer[l - 1]
                .iter()
                .enumerate()
                .map(|(i, &id)| (id, i))
                .collect();
            let mut keyed: Vec<(f64, Id)> = by_layer[l]
                .iter()
                .map(|&id| {
                    let preds: Vec<usize> = node
                        .edges
                        .iter()
                        .filter(|e| e.target == id && e.priority != EdgePriority::Low)
                        .filter_map(|e| prev_positions.get(&e.source).copied())
                        .collect();
                    let bary = if preds.is_empty() {
                        prev_positions.len() as f64 / 2.0
                    } else {
                        preds.iter().sum::<usize>() as f64 / preds.len() as f64
                    };
                    (bary, id)
                })
                .collect();
            keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.0.cmp(&b.1.0)));
            by_layer[l] = keyed.into_iter().map(|(_, id)| id).collect();
        }
    }
    by_layer
}

fn place_nodes(
    node: &GraphNode,
    ordered: &[Vec<Id>],
    options: &LayoutOptions,
) -> HashMap<Id, NodePosition> {
    let sizes: HashMap<Id, (f64, f64)> =
        node.children.iter().map(|c| (c.id, (c.width, c.height))).collect();
    let mut positions = HashMap::new();

    let layer_gap = options.spacings.node_node_between_layers;
    let node_gap = options.spacings.node_node;

    let mut layer_offset = 0.0;
    for layer_nodes in ordered {
        let layer_extent = layer_nodes
            .iter()
            .map(|id| match options.direction {
                Direction::Right | Direction::Left => sizes.get(id).map(|s| s.0).unwrap_or(0.0),
                Direction::Down | Direction::Up => sizes.get(id).map(|s| s.1).unwrap_or(0.0),
            })
            .fold(0.0_f64, f64::max);

        let mut cross_offset = 0.0;
        for &id in layer_nodes {
            let (w, h) = sizes.get(&id).copied().unwrap_or((0.0, 0.0));
            let (x, y) = match options.direction {
                Direction::Right => (layer_offset, cross_offset),
                Direction::Left => (-layer_offset - w, cross_offset),
                Direction::Down => (cross_offset, layer_offset),
                Direction::Up => (cross_offset, -layer_offset - h),
            };
            positions.insert(id, NodePosition { x, y });
            cross_offset += match options.direction {
                Direction::Right | Direction::Left => h + node_gap,
                Direction::Down | Direction::Up => w + node_gap,
            };
        }
        layer_offset += layer_extent + layer_gap;
    }
    positions
}

/// Straight L/Z orthogonal sections between each edge's node borders,
/// derived from its endpoints' computed positions and sizes; the centre
/// of mass of each connected pair, not a routing-quality claim (the real
/// routing refinement happens downstream in `layout-routing`).
fn synthesize_sections(
    node: &GraphNode,
    positions: &HashMap<Id, NodePosition>,
) -> HashMap<Id, Vec<EdgeSection>> {
    let sizes: HashMap<Id, (f64, f64)> =
        node.children.iter().map(|c| (c.id, (c.width, c.height))).collect();
    let mut sections: HashMap<Id, Vec<EdgeSection>> = HashMap::new();

    for edge in &node.edges {
        let (Some(src_pos), Some(tgt_pos)) =
            (positions.get(&edge.source), positions.get(&edge.target))
        else {
            continue;
        };
        let (src_w, src_h) = sizes.get(&edge.source).copied().unwrap_or((0.0, 0.0));
        let (_tgt_w, tgt_h) = sizes.get(&edge.target).copied().unwrap_or((0.0, 0.0));
        let start = Point::new(src_pos.x + src_w, src_pos.y + src_h / 2.0);
        let end = Point::new(tgt_pos.x, tgt_pos.y + tgt_h / 2.0);
        let waypoints = layout_geom::build_orthogonal_waypoints(start, end);
        let bend_points: Vec<Point> = waypoints[1..waypoints.len().saturating_sub(1)].to_vec();
        let section = EdgeSection {
            start_point: waypoints[0],
            bend_points,
            end_point: *waypoints.last().unwrap(),
        };
        let key = match edge.origin {
            layout_graph::EdgeOrigin::Connection(id) => id,
            layout_graph::EdgeOrigin::BoundaryProxy { .. } => continue,
        };
        sections.entry(key).or_default().push(section);
    }
    sections
}
