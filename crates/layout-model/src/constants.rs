//! Load-bearing constants shared across the pipeline (spec.md §6).
//!
//! These are deliberately free functions/consts rather than fields on
//! `LayoutOptions` where the spec calls them out as fixed tuning knobs
//! rather than user-configurable surface.

/// Default shape sizes by BPMN category, used by the graph builder when the
/// registry does not already carry explicit dimensions.
pub const DEFAULT_TASK_WIDTH: f64 = 100.0;
pub const DEFAULT_TASK_HEIGHT: f64 = 80.0;
pub const DEFAULT_EVENT_SIZE: f64 = 36.0;
pub const DEFAULT_GATEWAY_SIZE: f64 = 50.0;

/// A waypoint further than this from its element's border is "disconnected".
pub const DISCONNECT_THRESHOLD: f64 = 20.0;
/// Endpoint-to-centre snap tolerance for horizontal/vertical flow alignment.
pub const CENTRE_SNAP_TOLERANCE: f64 = 10.0;
/// Two elements are "on the same row" within this Y delta.
pub const SAME_ROW_Y_TOLERANCE: f64 = 5.0;
/// Minimum Y delta before two elements are considered on different rows.
pub const DIFFERENT_ROW_MIN_Y: f64 = 30.0;
/// Segment snapped to strict orthogonal below this off-axis delta.
pub const SEGMENT_ORTHO_SNAP: f64 = 8.0;
/// Distance within which a route endpoint is considered already anchored.
pub const ENDPOINT_SNAP_TOLERANCE: f64 = 15.0;
/// Spatial-index query/obstacle expansion margin used by element avoidance.
pub const AVOIDANCE_MARGIN: f64 = 15.0;
/// Element avoidance gives up rerouting after this many splice iterations.
pub const MAX_AVOIDANCE_ITERATIONS: usize = 3;
/// Below this per-axis delta, a position change does not count as "moved".
pub const MOVEMENT_THRESHOLD: f64 = 0.5;
/// Final pixel-grid quantum (spec.md §4.12) unless overridden by options.
pub const DEFAULT_GRID_QUANTUM: f64 = 10.0;

/// Minimum lane band height regardless of content.
pub const MIN_LANE_HEIGHT: f64 = 100.0;
/// Vertical padding applied above/below lane content when sizing a band.
pub const LANE_VERTICAL_PADDING: f64 = 20.0;
/// Width reserved for the pool/lane name label column.
pub const POOL_LABEL_BAND: f64 = 30.0;
/// Maximum lane count for brute-force crossing-minimisation reordering.
pub const LANE_REORDER_BRUTE_FORCE_MAX: usize = 8;

/// Vertical offset of a text annotation above its associated element.
pub const ARTIFACT_ABOVE_OFFSET: f64 = 20.0;
/// Vertical offset of a data object/store below its associated element.
pub const ARTIFACT_BELOW_OFFSET: f64 = 20.0;
/// Minimum spacing kept between artifact rectangles when resolving collisions.
pub const ARTIFACT_PADDING: f64 = 10.0;

/// Self-loop route: horizontal extent past the element's right edge.
pub const SELF_LOOP_HORIZONTAL_MARGIN: f64 = 40.0;
/// Self-loop route: vertical extent below the element's bottom edge.
pub const SELF_LOOP_VERTICAL_MARGIN: f64 = 30.0;

/// Loopback-below route: clearance below the scope's lowest element.
pub const LOOPBACK_BELOW_MARGIN: f64 = 30.0;
/// Loopback-below route: horizontal clearance when exiting a non-gateway source.
pub const LOOPBACK_HORIZONTAL_MARGIN: f64 = 20.0;

/// Vertical offset used by the overlapping-collinear-flow separation detour.
pub const COLLINEAR_DETOUR_OFFSET: f64 = 30.0;

/// Fixed seed handed to the layered-layout oracle for deterministic output.
pub const ORACLE_RANDOM_SEED: u64 = 1;

/// Shapes within this x-centre delta belong to the same grid-snap layer.
pub const X_CENTRE_CLUSTER_THRESHOLD: f64 = 40.0;
/// Default column pitch added on top of the widest layer when spacing is unset.
pub const DEFAULT_LAYER_SPACING: f64 = 60.0;
