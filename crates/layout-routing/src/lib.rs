//! Edge routing: the core conversion from oracle sections to registry
//! waypoints (C6), the seven ordered refinement passes (C7), and element
//! avoidance (C8). Run in that order — each stage assumes the previous
//! one already committed orthogonal, connected waypoints (spec.md §4.6-§4.8).

pub mod avoidance;
pub mod core;
pub mod passes;

pub use avoidance::avoid_obstacles;
pub use core::{build_section_map, route_connections};
pub use passes::{collinear_cleanup, loopback_and_overlap_passes, repair_after_grid_snap, run_passes};
