//! The layered-layout adapter (spec.md §4.5): an options bag, the
//! [`LayeredLayoutOracle`] trait boundary, and [`reference`] — a small
//! deterministic Sugiyama-style implementation the rest of the pipeline
//! runs and is tested against, since the trait is deliberately the only
//! thing the core depends on by contract and a runnable repository needs
//! something behind it.

pub mod reference;

use layout_geom::Point;
use layout_graph::GraphNode;
use layout_model::Id;
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;

pub const ORACLE_RANDOM_SEED: u64 = layout_model::constants::ORACLE_RANDOM_SEED;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Right,
    Down,
    Left,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRouting {
    Orthogonal,
    Splines,
    Polyline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePlacementStrategy {
    NetworkSimplex,
    BrandesKoepf,
    LinearSegments,
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingMinimizationStrategy {
    LayerSweep,
    Interactive,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleBreakingStrategy {
    DepthFirst,
    Greedy,
    Interactive,
    ModelOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayeringStrategy {
    LongestPath,
    CoffmanGraham,
    Interactive,
}

#[derive(Debug, Clone, Copy)]
pub struct Spacings {
    pub node_node: f64,
    pub edge_node: f64,
    pub node_node_between_layers: f64,
    pub edge_edge: f64,
}

impl Default for Spacings {
    fn default() -> Self {
        Self {
            node_node: 30.0,
            edge_node: 15.0,
            node_node_between_layers: 60.0,
            edge_edge: 10.0,
        }
    }
}

/// Everything the oracle needs to run one `layered` pass (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct LayoutOptions {
    pub direction: Direction,
    pub edge_routing: EdgeRouting,
    pub spacings: Spacings,
    pub node_placement_strategy: NodePlacementStrategy,
    pub crossing_minimization_strategy: CrossingMinimizationStrategy,
    pub thoroughness: u32,
    pub force_node_model_order: bool,
    pub semi_interactive: bool,
    pub cycle_breaking_strategy: CycleBreakingStrategy,
    pub consider_model_order_strategy: bool,
    pub random_seed: u64,
    pub favor_straight_edges: bool,
    pub layering_strategy: LayeringStrategy,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Right,
            edge_routing: EdgeRouting::Orthogonal,
            spacings: Spacings::default(),
            node_placement_strategy: NodePlacementStrategy::BrandesKoepf,
            crossing_minimization_strategy: CrossingMinimizationStrategy::LayerSweep,
            thoroughness: 7,
            force_node_model_order: false,
            semi_interactive: false,
            cycle_breaking_strategy: CycleBreakingStrategy::DepthFirst,
            consider_model_order_strategy: false,
            random_seed: ORACLE_RANDOM_SEED,
            favor_straight_edges: true,
            layering_strategy: LayeringStrategy::LongestPath,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle received an empty graph")]
    EmptyGraph,
    #[error("oracle produced a non-finite coordinate for node {0:?}")]
    NonFiniteCoordinate(Id),
}

/// One edge's routed geometry, relative to the container it was computed
/// in (spec.md §4.5: "start_point, optional bend_points, end_point").
#[derive(Debug, Clone)]
pub struct EdgeSection {
    pub start_point: Point,
    pub bend_points: Vec<Point>,
    pub end_point: Point,
}

impl EdgeSection {
    pub fn waypoints(&self) -> Vec<Point> {
        let mut pts = Vec::with_capacity(self.bend_points.len() + 2);
        pts.push(self.start_point);
        pts.extend(self.bend_points.iter().copied());
        pts.push(self.end_point);
        pts
    }
}

/// A node's computed position, relative to its own parent container.
#[derive(Debug, Clone, Copy)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// The oracle's full output tree, mirroring the shape of the submitted
/// [`GraphNode`] tree: one [`NodePosition`] per child plus nested results
/// for compound children, and edge sections keyed by the id of the
/// connection (or boundary-event proxy) that produced them.
#[derive(Debug, Clone)]
pub struct OracleResult {
    pub positions: HashMap<Id, NodePosition>,
    pub children: HashMap<Id, OracleResult>,
    pub sections: HashMap<Id, Vec<EdgeSection>>,
}

impl OracleResult {
    pub fn empty() -> Self {
        Self {
            positions: HashMap::new(),
            children: HashMap::new(),
            sections: HashMap::new(),
        }
    }
}

/// The narrow trait boundary the core depends on by contract (spec.md §9);
/// only this call suspends in an otherwise synchronous pipeline (spec.md
/// §5).
pub trait LayeredLayoutOracle {
    fn run(
        &self,
        graph: &GraphNode,
        options: &LayoutOptions,
    ) -> impl Future<Output = Result<OracleResult, OracleError>> + Send;
}

/// Walk `result` and issue absolute moves in the registry: each node's
/// absolute position is its relative position plus the accumulated
/// offsets of every ancestor container (spec.md §4.5).
pub fn apply_positions(
    registry: &mut layout_model::Registry,
    graph: &GraphNode,
    result: &OracleResult,
    origin: Point,
) -> Result<(), OracleError> {
    use layout_model::Modeller;

    for child in &graph.children {
        let pos = result
            .positions
            .get(&child.id)
            .copied()
            .ok_or(OracleError::NonFiniteCoordinate(child.id))?;
        if !pos.x.is_finite() || !pos.y.is_finite() {
            return Err(OracleError::NonFiniteCoordinate(child.id));
        }
        let abs_x = origin.x + pos.x;
        let abs_y = origin.y + pos.y;
        registry
            .direct_move(child.id, abs_x, abs_y)
            .map_err(|_| OracleError::NonFiniteCoordinate(child.id))?;

        if let Some(child_result) = result.children.get(&child.id) {
            apply_positions(registry, child, child_result, Point::new(abs_x, abs_y))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_section_waypoints_include_bend_points_in_order() {
        let section = EdgeSection {
            start_point: Point::new(0.0, 0.0),
            bend_points: vec![Point::new(5.0, 0.0), Point::new(5.0, 10.0)],
            end_point: Point::new(10.0, 10.0),
        };
        let pts = section.waypoints();
        assert_eq!(pts.len(), 4);
        assert_eq!(pts[0], Point::new(0.0, 0.0));
        assert_eq!(pts[3], Point::new(10.0, 10.0));
    }

    #[test]
    fn default_options_use_fixed_seed() {
        let opts = LayoutOptions::default();
        assert_eq!(opts.random_seed, ORACLE_RANDOM_SEED);
    }
}
