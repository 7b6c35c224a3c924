//! Layout-options surface: TOML loading, compactness presets, and the merge
//! into a final [`layout_oracle::LayoutOptions`] (spec.md §6).
//!
//! The core never reads a file itself; a caller (the CLI, or an embedding
//! host) loads a [`LayoutOptionsFile`] and merges it with an optional
//! [`Overrides`] value before handing [`LayoutOptions`] to the pipeline.
//! Unknown TOML fields are ignored, matching the teacher's serde tolerance
//! policy for forward-compatible config files.

use layout_model::Id;
use layout_oracle::{
    CrossingMinimizationStrategy, CycleBreakingStrategy, Direction, EdgeRouting, LayeringStrategy,
    LayoutOptions, NodePlacementStrategy, Spacings,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// `grid_snap` accepts either a bare bool or an integer quantum (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridSnap {
    Off,
    On,
    Quantum(f64),
}

impl Default for GridSnap {
    fn default() -> Self {
        GridSnap::On
    }
}

/// Mirrors the TOML document's `grid_snap = true` / `grid_snap = 25` union
/// so a single field name can carry either shape (spec.md §6).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum GridSnapValue {
    Bool(bool),
    Quantum(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compactness {
    Compact,
    Spacious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneStrategy {
    Preserve,
    Optimize,
}

impl Default for LaneStrategy {
    fn default() -> Self {
        LaneStrategy::Preserve
    }
}

fn default_direction() -> String {
    "right".to_string()
}

fn default_simplify_routes() -> bool {
    true
}

/// The on-disk shape of a layout config TOML document. Every field is
/// optional so a partial file layers on top of [`LayoutOptions::default`].
#[derive(Debug, Deserialize, Clone)]
pub struct LayoutOptionsFile {
    #[serde(default = "default_direction")]
    pub direction: String,
    #[serde(default)]
    pub node_spacing: Option<f64>,
    #[serde(default)]
    pub layer_spacing: Option<f64>,
    #[serde(default)]
    pub preserve_happy_path: bool,
    #[serde(default)]
    pub grid_snap: Option<GridSnapValue>,
    #[serde(default = "default_simplify_routes")]
    pub simplify_routes: bool,
    #[serde(default)]
    pub compactness: Option<Compactness>,
    #[serde(default)]
    pub lane_strategy: LaneStrategy,
}

impl Default for LayoutOptionsFile {
    fn default() -> Self {
        Self {
            direction: default_direction(),
            node_spacing: None,
            layer_spacing: None,
            preserve_happy_path: false,
            grid_snap: None,
            simplify_routes: default_simplify_routes(),
            compactness: None,
            lane_strategy: LaneStrategy::default(),
        }
    }
}

/// Explicit programmatic overrides, applied after the file and before
/// compactness presets, matching spec.md §6's "options surface" ordering.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub scope_element_id: Option<Id>,
    pub compactness: Option<Compactness>,
    pub direction: Option<Direction>,
}

/// A fully merged, ready-to-run options bundle: the oracle's
/// [`LayoutOptions`], plus the post-oracle pass toggles the oracle itself
/// doesn't need (grid snap, happy-path pinning, route simplification,
/// lane strategy, scope).
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub layout: LayoutOptions,
    pub preserve_happy_path: bool,
    pub grid_snap: GridSnap,
    pub simplify_routes: bool,
    pub lane_strategy: LaneStrategy,
    pub scope_element_id: Option<Id>,
}

fn parse_direction(s: &str) -> Direction {
    match s.to_ascii_lowercase().as_str() {
        "down" => Direction::Down,
        "left" => Direction::Left,
        "up" => Direction::Up,
        _ => Direction::Right,
    }
}

/// Merge a parsed file, explicit overrides, and a compactness preset into
/// the options the rest of the pipeline consumes.
pub fn resolve(file: &LayoutOptionsFile, overrides: &Overrides) -> ResolvedOptions {
    let mut layout = LayoutOptions::default();
    layout.direction = parse_direction(&file.direction);
    if let Some(dir) = overrides.direction {
        layout.direction = dir;
    }

    let compactness = overrides.compactness.or(file.compactness);
    layout.spacings = spacings_for(compactness, file.node_spacing, file.layer_spacing);

    let grid_snap = match file.grid_snap {
        Some(GridSnapValue::Bool(false)) => GridSnap::Off,
        Some(GridSnapValue::Bool(true)) => GridSnap::On,
        Some(GridSnapValue::Quantum(q)) => GridSnap::Quantum(q as f64),
        None => GridSnap::default(),
    };

    ResolvedOptions {
        layout,
        preserve_happy_path: file.preserve_happy_path,
        grid_snap,
        simplify_routes: file.simplify_routes,
        lane_strategy: file.lane_strategy,
        scope_element_id: overrides.scope_element_id,
    }
}

fn spacings_for(compactness: Option<Compactness>, node: Option<f64>, layer: Option<f64>) -> Spacings {
    let mut spacings = match compactness {
        Some(Compactness::Compact) => Spacings {
            node_node: 16.0,
            edge_node: 10.0,
            node_node_between_layers: 36.0,
            edge_edge: 6.0,
        },
        Some(Compactness::Spacious) => Spacings {
            node_node: 48.0,
            edge_node: 24.0,
            node_node_between_layers: 96.0,
            edge_edge: 16.0,
        },
        None => Spacings::default(),
    };
    if let Some(n) = node {
        spacings.node_node = n;
    }
    if let Some(l) = layer {
        spacings.node_node_between_layers = l;
    }
    spacings
}

/// Apply a scoped re-layout's required strategy overrides (spec.md §4.14
/// step 4: "for scoped re-layout set layering strategy = INTERACTIVE").
pub fn apply_scope_strategy(options: &mut ResolvedOptions) {
    if options.scope_element_id.is_some() {
        options.layout.layering_strategy = LayeringStrategy::Interactive;
        options.layout.crossing_minimization_strategy = CrossingMinimizationStrategy::Interactive;
        options.layout.cycle_breaking_strategy = CycleBreakingStrategy::Interactive;
    }
}

pub fn default_node_placement() -> NodePlacementStrategy {
    NodePlacementStrategy::BrandesKoepf
}

pub fn default_edge_routing() -> EdgeRouting {
    EdgeRouting::Orthogonal
}

/// Best-effort config path: a local `layout.toml` in the working directory,
/// falling back to that same relative name when absent.
pub fn discover() -> PathBuf {
    PathBuf::from("layout.toml")
}

/// Parse a TOML document at `path`, falling back to defaults on a missing
/// file or parse error (mirrors the teacher's config-loading resilience:
/// a broken or absent config never blocks startup).
pub fn load_from(path: Option<&Path>) -> LayoutOptionsFile {
    let path = path.map(PathBuf::from).unwrap_or_else(discover);
    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<LayoutOptionsFile>(&content) {
            Ok(file) => file,
            Err(err) => {
                info!(target: "config.layout", path = %path.display(), error = %err, "falling back to default layout options");
                LayoutOptionsFile::default()
            }
        },
        Err(_) => LayoutOptionsFile::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_resolves_to_default_options() {
        let file = LayoutOptionsFile::default();
        let resolved = resolve(&file, &Overrides::default());
        assert_eq!(resolved.layout.direction, Direction::Right);
        assert!(resolved.simplify_routes);
        assert_eq!(resolved.grid_snap, GridSnap::On);
    }

    #[test]
    fn compact_preset_shrinks_spacings() {
        let file = LayoutOptionsFile {
            compactness: Some(Compactness::Compact),
            ..Default::default()
        };
        let resolved = resolve(&file, &Overrides::default());
        assert!(resolved.layout.spacings.node_node < Spacings::default().node_node);
    }

    #[test]
    fn grid_snap_integer_is_taken_as_quantum() {
        let file = LayoutOptionsFile {
            grid_snap: Some(GridSnapValue::Quantum(25)),
            ..Default::default()
        };
        let resolved = resolve(&file, &Overrides::default());
        assert_eq!(resolved.grid_snap, GridSnap::Quantum(25.0));
    }

    #[test]
    fn grid_snap_toml_union_parses_both_shapes() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "grid_snap = 5\n").unwrap();
        let file = load_from(Some(tmp.path()));
        assert!(matches!(file.grid_snap, Some(GridSnapValue::Quantum(5))));
    }

    #[test]
    fn scoped_relayout_forces_interactive_strategy() {
        let file = LayoutOptionsFile::default();
        let overrides = Overrides {
            scope_element_id: Some(Id(7)),
            ..Default::default()
        };
        let mut resolved = resolve(&file, &overrides);
        apply_scope_strategy(&mut resolved);
        assert_eq!(resolved.layout.layering_strategy, LayeringStrategy::Interactive);
    }

    #[test]
    fn parses_toml_document() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "direction = \"down\"\ncompactness = \"compact\"\n").unwrap();
        let file = load_from(Some(tmp.path()));
        let resolved = resolve(&file, &Overrides::default());
        assert_eq!(resolved.layout.direction, Direction::Down);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let file = load_from(Some(Path::new("__does_not_exist__.toml")));
        assert_eq!(file.direction, "right");
    }
}
