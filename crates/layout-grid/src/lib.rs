//! Grid snap and happy-path alignment (spec.md §4.12), the last pass before
//! a layout is handed back: columns get pulled onto a regular pitch, the
//! longest forward path from a start event gets pinned to one row, and
//! every coordinate is quantised to a pixel grid.

use layout_classify::is_layoutable_shape;
use layout_geom::Rect;
use layout_model::{BpmnType, Id, Modeller, Registry, constants};
use std::collections::{HashMap, HashSet};

/// A cluster of shapes sharing an x-centre, in left-to-right order.
#[derive(Debug, Clone)]
pub struct Layer {
    pub members: Vec<Id>,
    pub min_x: f64,
    pub max_right: f64,
    pub max_width: f64,
}

/// Cluster the scope's direct layoutable children by x-centre. Two shapes
/// join a cluster when their centres are within
/// [`constants::X_CENTRE_CLUSTER_THRESHOLD`] of the cluster's running mean.
pub fn detect_layers(registry: &Registry, scope: Option<Id>) -> Vec<Layer> {
    let mut shapes: Vec<(Id, Rect)> = registry
        .filter(|e| is_layoutable_shape(e.bpmn_type) && e.parent == scope)
        .into_iter()
        .map(|e| (e.id, e.rect()))
        .collect();
    shapes.sort_by(|a, b| a.1.center().x.partial_cmp(&b.1.center().x).unwrap());

    let mut layers: Vec<(f64, Vec<(Id, Rect)>)> = Vec::new();
    for (id, rect) in shapes {
        let cx = rect.center().x;
        match layers.last_mut() {
            Some((mean, members)) if (cx - *mean).abs() <= constants::X_CENTRE_CLUSTER_THRESHOLD => {
                members.push((id, rect));
                let sum: f64 = members.iter().map(|(_, r)| r.center().x).sum();
                *mean = sum / members.len() as f64;
            }
            _ => layers.push((cx, vec![(id, rect)])),
        }
    }

    layers
        .into_iter()
        .map(|(_, members)| {
            let min_x = members.iter().map(|(_, r)| r.left()).fold(f64::INFINITY, f64::min);
            let max_right = members.iter().map(|(_, r)| r.right()).fold(f64::NEG_INFINITY, f64::max);
            let max_width = members.iter().map(|(_, r)| r.width).fold(0.0, f64::max);
            Layer {
                members: members.into_iter().map(|(id, _)| id).collect(),
                min_x,
                max_right,
                max_width,
            }
        })
        .collect()
}

/// Reposition every layer onto a regular column pitch: `first_column_x +
/// layer_index * pitch`, where `pitch` is the widest layer's width plus
/// `layer_spacing`. Shapes within a layer align to the layer's left edge.
pub fn grid_snap(registry: &mut Registry, layers: &[Layer], layer_spacing: f64) {
    if layers.is_empty() {
        return;
    }
    tracing::trace!(target: "grid.snap", layers = layers.len(), layer_spacing, "snapping layers to grid columns");
    let first_column_x = layers[0].min_x;
    let pitch = layers.iter().map(|l| l.max_width).fold(0.0, f64::max) + layer_spacing;

    for (index, layer) in layers.iter().enumerate() {
        let column_x = first_column_x + index as f64 * pitch;
        for &member in &layer.members {
            let Some(el) = registry.get(member) else { continue };
            let rect = el.rect();
            if (rect.left() - column_x).abs() < constants::MOVEMENT_THRESHOLD {
                continue;
            }
            let new_rect = Rect::new(column_x, rect.y, rect.width, rect.height);
            let _ = registry.resize_shape(member, new_rect);
        }
    }
}

/// Walk forward sequence flows from every start event in `scope`, returning
/// the longest chain of element ids (the happy path). Ties keep the first
/// discovered chain; cycles are avoided via a visited set per walk.
pub fn find_happy_path(registry: &Registry, scope: Option<Id>) -> Vec<Id> {
    let starts: Vec<Id> = registry
        .filter(|e| e.bpmn_type == BpmnType::StartEvent && e.parent == scope)
        .into_iter()
        .map(|e| e.id)
        .collect();

    let mut outgoing: HashMap<Id, Vec<(Id, Id)>> = HashMap::new();
    for flow in registry.filter(|e| e.bpmn_type == BpmnType::SequenceFlow) {
        let (Some(source), Some(target)) = (flow.source, flow.target) else { continue };
        outgoing.entry(source).or_default().push((flow.id, target));
    }

    let mut best: Vec<Id> = Vec::new();
    for start in starts {
        let path = longest_forward_walk(start, &outgoing);
        if path.len() > best.len() {
            best = path;
        }
    }
    best
}

fn longest_forward_walk(start: Id, outgoing: &HashMap<Id, Vec<(Id, Id)>>) -> Vec<Id> {
    let mut visited = HashSet::new();
    let mut path = vec![start];
    visited.insert(start);
    let mut current = start;
    loop {
        let Some(next) = outgoing
            .get(&current)
            .and_then(|edges| edges.iter().min_by_key(|(flow_id, _)| flow_id.0))
            .map(|(_, target)| *target)
        else {
            break;
        };
        if !visited.insert(next) {
            break;
        }
        path.push(next);
        current = next;
    }
    path
}

/// Shift every happy-path shape so they share one row Y (the first
/// happy-path shape's existing centre Y), then symmetrically balance any
/// binary-gateway branch whose two branch tasks both sit off that row.
pub fn pin_happy_path(registry: &mut Registry, happy_path: &[Id]) {
    if happy_path.is_empty() {
        return;
    }
    let Some(row_y) = registry.get(happy_path[0]).map(|e| e.center().y) else { return };

    for &id in happy_path {
        let Some(el) = registry.get(id) else { continue };
        let rect = el.rect();
        let dy = row_y - rect.center().y;
        if dy.abs() < constants::MOVEMENT_THRESHOLD {
            continue;
        }
        let new_rect = Rect::new(rect.x, rect.y + dy, rect.width, rect.height);
        let _ = registry.resize_shape(id, new_rect);
    }

    balance_binary_gateway_branches(registry, happy_path, row_y);
}

fn balance_binary_gateway_branches(registry: &mut Registry, happy_path: &[Id], row_y: f64) {
    let on_path: HashSet<Id> = happy_path.iter().copied().collect();
    for &gateway_id in happy_path {
        let Some(gateway) = registry.get(gateway_id) else { continue };
        if !layout_classify::is_gateway(gateway.bpmn_type) {
            continue;
        }
        let outgoing: Vec<Id> = registry
            .filter(|e| e.bpmn_type == BpmnType::SequenceFlow && e.source == Some(gateway_id))
            .into_iter()
            .filter_map(|e| e.target)
            .collect();
        if outgoing.len() != 2 {
            continue;
        }
        let (on, off): (Vec<Id>, Vec<Id>) = outgoing.into_iter().partition(|t| on_path.contains(t));
        if on.len() != 1 || off.len() != 1 {
            continue;
        }
        let off_id = off[0];
        let Some(off_el) = registry.get(off_id) else { continue };
        let off_rect = off_el.rect();
        let offset = (off_rect.center().y - row_y).abs().max(constants::DIFFERENT_ROW_MIN_Y);
        let desired_y = if off_rect.center().y >= row_y {
            row_y + offset - off_rect.height / 2.0
        } else {
            row_y - offset - off_rect.height / 2.0
        };
        if (desired_y - off_rect.y).abs() < constants::MOVEMENT_THRESHOLD {
            continue;
        }
        let new_rect = Rect::new(off_rect.x, desired_y, off_rect.width, off_rect.height);
        let _ = registry.resize_shape(off_id, new_rect);
    }
}

/// Round every shape's x/y to the nearest multiple of `quantum`, and round
/// intermediate connection waypoints (not first/last) to the same grid.
/// First/last waypoints are recomputed from the connected elements' borders
/// rather than rounded, so a connection never drifts off its anchor.
pub fn quantize(registry: &mut Registry, quantum: f64) {
    if quantum <= 0.0 {
        return;
    }
    let shape_ids: Vec<Id> = registry
        .filter(|e| is_layoutable_shape(e.bpmn_type))
        .into_iter()
        .map(|e| e.id)
        .collect();
    for id in shape_ids {
        let Some(el) = registry.get(id) else { continue };
        let rect = el.rect();
        let snapped = Rect::new(round_to(rect.x, quantum), round_to(rect.y, quantum), rect.width, rect.height);
        if (snapped.x - rect.x).abs() >= constants::MOVEMENT_THRESHOLD
            || (snapped.y - rect.y).abs() >= constants::MOVEMENT_THRESHOLD
        {
            let _ = registry.resize_shape(id, snapped);
        }
    }

    let connection_ids: Vec<Id> = registry
        .filter(|e| e.is_connection())
        .into_iter()
        .map(|e| e.id)
        .collect();
    for id in connection_ids {
        let Some(el) = registry.get(id) else { continue };
        let Some(waypoints) = el.waypoints.clone() else { continue };
        if waypoints.len() < 2 {
            continue;
        }
        let (source, target) = (el.source, el.target);
        let mut snapped = waypoints.clone();
        for wp in snapped.iter_mut().skip(1).take(waypoints.len().saturating_sub(2)) {
            wp.x = round_to(wp.x, quantum);
            wp.y = round_to(wp.y, quantum);
        }
        if let Some(first) = recompute_border_point(registry, source, snapped.get(1).copied()) {
            snapped[0] = first;
        }
        let last_idx = snapped.len() - 1;
        if let Some(last) = recompute_border_point(registry, target, snapped.get(last_idx.saturating_sub(1)).copied())
        {
            snapped[last_idx] = last;
        }
        let _ = registry.update_waypoints(id, snapped);
    }
}

fn recompute_border_point(
    registry: &Registry,
    endpoint: Option<Id>,
    towards: Option<layout_geom::Point>,
) -> Option<layout_geom::Point> {
    let rect = registry.get(endpoint?)?.rect();
    let towards = towards?;
    Some(closest_border_point(rect, towards))
}

fn closest_border_point(rect: Rect, towards: layout_geom::Point) -> layout_geom::Point {
    let c = rect.center();
    let dx = towards.x - c.x;
    let dy = towards.y - c.y;
    if dx.abs() * rect.height > dy.abs() * rect.width {
        let x = if dx >= 0.0 { rect.right() } else { rect.left() };
        layout_geom::Point::new(x, c.y.clamp(rect.top(), rect.bottom()))
    } else {
        let y = if dy >= 0.0 { rect.bottom() } else { rect.top() };
        layout_geom::Point::new(c.x.clamp(rect.left(), rect.right()), y)
    }
}

fn round_to(value: f64, quantum: f64) -> f64 {
    (value / quantum).round() * quantum
}

#[cfg(test)]
mod tests {
    use super::*;
    use layout_model::Element;

    fn shape(reg: &mut Registry, bpmn_type: BpmnType, x: f64, y: f64, w: f64, h: f64) -> Id {
        let mut e = Element::new(Id(0), bpmn_type);
        e.x = x;
        e.y = y;
        e.width = w;
        e.height = h;
        reg.insert(e)
    }

    #[test]
    fn detect_layers_clusters_by_x_centre() {
        let mut reg = Registry::new();
        shape(&mut reg, BpmnType::Task, 0.0, 0.0, 100.0, 80.0);
        shape(&mut reg, BpmnType::Task, 10.0, 200.0, 100.0, 80.0);
        shape(&mut reg, BpmnType::Task, 300.0, 0.0, 100.0, 80.0);

        let layers = detect_layers(&reg, None);
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].members.len(), 2);
        assert_eq!(layers[1].members.len(), 1);
    }

    #[test]
    fn grid_snap_aligns_layer_to_left_edge() {
        let mut reg = Registry::new();
        let a = shape(&mut reg, BpmnType::Task, 0.0, 0.0, 100.0, 80.0);
        let b = shape(&mut reg, BpmnType::Task, 500.0, 200.0, 100.0, 80.0);

        let layers = vec![
            Layer { members: vec![a], min_x: 0.0, max_right: 100.0, max_width: 100.0 },
            Layer { members: vec![b], min_x: 500.0, max_right: 600.0, max_width: 100.0 },
        ];
        grid_snap(&mut reg, &layers, 60.0);

        let ra = reg.get(a).unwrap().rect();
        let rb = reg.get(b).unwrap().rect();
        assert_eq!(ra.left(), 0.0);
        assert_eq!(rb.left(), 160.0);
    }

    #[test]
    fn quantize_snaps_shape_origin_to_grid() {
        let mut reg = Registry::new();
        let a = shape(&mut reg, BpmnType::Task, 13.0, 27.0, 100.0, 80.0);
        quantize(&mut reg, 10.0);
        let rect = reg.get(a).unwrap().rect();
        assert_eq!(rect.x, 10.0);
        assert_eq!(rect.y, 30.0);
    }

    #[test]
    fn happy_path_follows_lowest_id_sequence_flow() {
        let mut reg = Registry::new();
        let start = shape(&mut reg, BpmnType::StartEvent, 0.0, 0.0, 36.0, 36.0);
        let t1 = shape(&mut reg, BpmnType::Task, 100.0, 0.0, 100.0, 80.0);
        let end = shape(&mut reg, BpmnType::EndEvent, 300.0, 0.0, 36.0, 36.0);

        let mut f1 = Element::new(Id(0), BpmnType::SequenceFlow);
        f1.source = Some(start);
        f1.target = Some(t1);
        reg.insert(f1);
        let mut f2 = Element::new(Id(0), BpmnType::SequenceFlow);
        f2.source = Some(t1);
        f2.target = Some(end);
        reg.insert(f2);

        let path = find_happy_path(&reg, None);
        assert_eq!(path, vec![start, t1, end]);
    }

    #[test]
    fn pin_happy_path_aligns_shapes_to_one_row() {
        let mut reg = Registry::new();
        let a = shape(&mut reg, BpmnType::StartEvent, 0.0, 0.0, 36.0, 36.0);
        let b = shape(&mut reg, BpmnType::Task, 100.0, 200.0, 100.0, 80.0);

        pin_happy_path(&mut reg, &[a, b]);

        let ra = reg.get(a).unwrap().rect();
        let rb = reg.get(b).unwrap().rect();
        assert!((ra.center().y - rb.center().y).abs() < 0.001);
    }
}
