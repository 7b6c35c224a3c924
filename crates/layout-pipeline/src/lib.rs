//! The pipeline runner (C13) and the top-level layout driver (C14),
//! spec.md §4.13-§4.14: orders every pass from graph construction through
//! final pixel quantisation, timing and logging each step so tests and
//! callers can inspect what happened without re-deriving it from geometry.

mod runner;

pub use runner::{PipelineLog, StepRecord};

use layout_boundary::{BoundaryEventSnapshot, reposition_boundary_events, restore_boundary_events, snapshot_boundary_events};
use layout_config::{GridSnap, LaneStrategy, ResolvedOptions};
use layout_geom::Point;
use layout_graph::build_graph;
use layout_grid::{detect_layers, find_happy_path, grid_snap, pin_happy_path, quantize};
use layout_lanes::{LaneSnapshot, assign_bands, clamp_intra_lane_flows, route_cross_lane_flows, snapshot_lanes};
use layout_model::{Id, Registry, constants};
use layout_oracle::{LayeredLayoutOracle, OracleError, apply_positions};
use layout_routing::{avoid_obstacles, build_section_map, collinear_cleanup, loopback_and_overlap_passes, repair_after_grid_snap, route_connections, run_passes};
use runner::PipelineRunner;
use thiserror::Error;

/// Margin kept clear of a lane's top/bottom edge by intra-lane clamping
/// (spec.md §4.9 doesn't name a separate constant; using the loopback
/// margin keeps routed flows visibly inside their band).
const INTRA_LANE_CLAMP_MARGIN: f64 = constants::LOOPBACK_HORIZONTAL_MARGIN;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("scope element {0:?} not found in registry")]
    ScopeNotFound(Id),
    #[error("layered-layout oracle failed: {0}")]
    Oracle(#[from] OracleError),
}

/// Everything a caller might want back from a completed `run_layout` call:
/// the step log (spec.md §4.13) and the happy-path element ids it found,
/// in case the caller wants to render them distinctly.
#[derive(Debug, Clone)]
pub struct LayoutReport {
    pub log: PipelineLog,
    pub happy_path: Vec<Id>,
}

/// Run the full layout pipeline against `registry`, rooted at `canvas`
/// (the diagram's top-level container) unless `options.scope_element_id`
/// names a single subprocess or participant for scoped re-layout
/// (spec.md §4.14, control flow in spec.md §2).
///
/// On oracle failure the registry is left exactly as it was before this
/// call — nothing from §4.14 steps 5 onward has been applied yet (spec.md
/// §5 "Cancellation and timeouts").
pub async fn run_layout<O: LayeredLayoutOracle>(
    registry: &mut Registry,
    canvas: Id,
    oracle: &O,
    options: &ResolvedOptions,
) -> Result<LayoutReport, LayoutError> {
    let scope = match options.scope_element_id {
        Some(id) => {
            if registry.get(id).is_none() {
                return Err(LayoutError::ScopeNotFound(id));
            }
            id
        }
        None => canvas,
    };

    // Step 4: resolve options. A scoped re-layout forces the interactive
    // strategies (spec.md §4.14) regardless of whether the caller already
    // ran them through `layout_config::apply_scope_strategy` — callers that
    // build a `ResolvedOptions` by hand must get the same guarantee.
    let mut layout_options = options.layout.clone();
    if options.scope_element_id.is_some() {
        layout_options.layering_strategy = layout_oracle::LayeringStrategy::Interactive;
        layout_options.crossing_minimization_strategy = layout_oracle::CrossingMinimizationStrategy::Interactive;
        layout_options.cycle_breaking_strategy = layout_oracle::CycleBreakingStrategy::Interactive;
    }

    let mut runner = PipelineRunner::new(registry);

    // Step 2: snapshots, taken before anything moves.
    let boundary_snapshots: Vec<BoundaryEventSnapshot> =
        runner.step("boundary.snapshot", false, |r| snapshot_boundary_events(r));
    let lane_snapshots: Vec<LaneSnapshot> = runner.step("lanes.snapshot", false, |r| snapshot_lanes(r));

    // Step 3: build the container graph rooted at the scope.
    let graph = runner.step("graph.build", false, |r| build_graph(r, scope));

    // Steps 4-5: await the oracle, then apply its positions. A failure
    // here propagates untouched — nothing below this point has run yet.
    let origin = runner
        .registry()
        .get(scope)
        .map(|e| Point::new(e.x, e.y))
        .unwrap_or(Point::new(0.0, 0.0));
    let oracle_result = runner.step_async("oracle.run", false, oracle.run(&graph, &layout_options)).await?;
    runner.try_step("oracle.apply_positions", true, |r| {
        apply_positions(r, &graph, &oracle_result, origin)
    })?;

    // Step 6: lane-band assignment for every pool with lanes.
    let optimize_lanes = options.lane_strategy == LaneStrategy::Optimize;
    runner.step("lanes.assign_bands", true, |r| {
        assign_bands(r, &lane_snapshots, optimize_lanes)
    });

    // Step 7: artifact repositioning.
    runner.step("artifacts.resize_groups", true, |r| layout_artifacts::resize_groups(r));
    runner.step("artifacts.reposition", true, |r| layout_artifacts::reposition_artifacts(r));

    // Step 8: restore and reposition boundary events.
    runner.step("boundary.restore", true, |r| restore_boundary_events(r, &boundary_snapshots));
    runner.step("boundary.reposition", true, |r| reposition_boundary_events(r, true, 0.0));

    // Step 9: apply edge routes, then the C7 refinement passes, then
    // element avoidance.
    let section_map = runner.step("routing.build_section_map", false, |_r| {
        build_section_map(&graph, &oracle_result, origin)
    });
    runner.step("routing.route_connections", true, |r| route_connections(r, &section_map));
    if options.simplify_routes {
        runner.step("routing.run_passes", true, |r| run_passes(r));
    }
    runner.step("routing.avoid_obstacles", true, |r| avoid_obstacles(r));

    // Step 10: grid snap and happy-path alignment.
    let quantum = match options.grid_snap {
        GridSnap::Off => None,
        GridSnap::On => Some(constants::DEFAULT_GRID_QUANTUM),
        GridSnap::Quantum(q) => Some(q),
    };
    if !matches!(options.grid_snap, GridSnap::Off) {
        runner.step("grid.snap", true, |r| {
            let layers = detect_layers(r, Some(scope));
            grid_snap(r, &layers, options.layout.spacings.node_node_between_layers);
        });
    }
    let happy_path = if options.preserve_happy_path {
        let path = runner.step("grid.find_happy_path", false, |r| find_happy_path(r, Some(scope)));
        runner.step("grid.pin_happy_path", true, |r| pin_happy_path(r, &path));
        path
    } else {
        Vec::new()
    };

    // Step 11: grid snap can disconnect or mis-anchor routes; repair them.
    runner.step("routing.repair_after_grid_snap", true, |r| repair_after_grid_snap(r));

    // Step 12: cross-lane staircase + intra-lane clamp.
    runner.step("lanes.route_cross_lane_flows", true, |r| route_cross_lane_flows(r));
    runner.step("lanes.clamp_intra_lane_flows", true, |r| {
        clamp_intra_lane_flows(r, INTRA_LANE_CLAMP_MARGIN)
    });

    // Step 13: loopback routing and overlap separation, re-run since lane
    // and grid passes may have shifted routes since C7 first ran.
    if options.simplify_routes {
        runner.step("routing.loopback_and_overlap", true, |r| loopback_and_overlap_passes(r));
    }

    // Step 14: final collinear cleanup.
    runner.step("routing.collinear_cleanup", true, |r| collinear_cleanup(r));

    // Step 15: final pixel quantisation.
    if let Some(quantum) = quantum {
        runner.step("grid.quantize", true, |r| quantize(r, quantum));
    }

    // Step 16: finish the logger.
    let log = runner.finish();
    Ok(LayoutReport { log, happy_path })
}
