//! Edge routing core (spec.md §4.6): turns the oracle's per-container edge
//! sections into absolute waypoints on every connection in the registry,
//! synthesising a route from scratch for anything the oracle didn't cover
//! (boundary-event flows, message flows, self-loops).

use layout_classify::is_boundary_event;
use layout_geom::{Point, build_orthogonal_waypoints, deduplicate_waypoints, tolerance};
use layout_graph::GraphNode;
use layout_model::{Id, Modeller, Registry, constants};
use layout_oracle::OracleResult;
use std::collections::HashMap;

/// Flattened `edge_id -> (sections, container absolute offset)`, built by
/// walking the oracle result tree with accumulated offsets.
pub fn build_section_map(
    graph: &GraphNode,
    result: &OracleResult,
    origin: Point,
) -> HashMap<Id, (Vec<layout_oracle::EdgeSection>, Point)> {
    let mut map = HashMap::new();
    collect_sections(graph, result, origin, &mut map);
    map
}

fn collect_sections(
    graph: &GraphNode,
    result: &OracleResult,
    origin: Point,
    map: &mut HashMap<Id, (Vec<layout_oracle::EdgeSection>, Point)>,
) {
    for (&edge_id, sections) in &result.sections {
        map.insert(edge_id, (sections.clone(), origin));
    }
    for child in &graph.children {
        let Some(pos) = result.positions.get(&child.id) else {
            continue;
        };
        let child_origin = Point::new(origin.x + pos.x, origin.y + pos.y);
        if let Some(child_result) = result.children.get(&child.id) {
            collect_sections(child, child_result, child_origin, map);
        }
    }
}

/// Route every connection in the registry: use the oracle's sections when
/// available, otherwise synthesise a route by connection kind.
pub fn route_connections(
    registry: &mut Registry,
    section_map: &HashMap<Id, (Vec<layout_oracle::EdgeSection>, Point)>,
) {
    let connection_ids: Vec<Id> = registry
        .filter(|e| e.is_connection())
        .into_iter()
        .map(|e| e.id)
        .collect();

    for id in connection_ids {
        let waypoints = route_one(registry, id, section_map);
        let Some(waypoints) = waypoints else { continue };
        if waypoints.len() < 2 {
            continue;
        }
        let _ = registry.update_waypoints(id, waypoints);
    }
}

fn route_one(
    registry: &Registry,
    id: Id,
    section_map: &HashMap<Id, (Vec<layout_oracle::EdgeSection>, Point)>,
) -> Option<Vec<Point>> {
    let conn = registry.get(id)?;
    let source_id = conn.source?;
    let target_id = conn.target?;

    if source_id == target_id {
        return Some(self_loop_route(registry.get(source_id)?.rect()));
    }

    if let Some((sections, offset)) = section_map.get(&id) {
        let mut wps: Vec<Point> = Vec::new();
        for section in sections {
            for p in section.waypoints() {
                wps.push(Point::new(p.x + offset.x, p.y + offset.y));
            }
        }
        if !wps.is_empty() {
            return Some(finish_route(registry, source_id, target_id, wps));
        }
    }

    let source = registry.get(source_id)?;
    let target = registry.get(target_id)?;

    if is_boundary_event(source.bpmn_type) {
        let host_id = source.host?;
        let host = registry.get(host_id)?;
        return Some(boundary_event_route(host.rect(), target.rect()));
    }

    if matches!(conn.bpmn_type, layout_model::BpmnType::MessageFlow) {
        return Some(message_flow_route(source.rect(), target.rect()));
    }

    let src_pt = source.rect().right_center();
    let tgt_pt = target.rect().left_center();
    Some(build_orthogonal_waypoints(src_pt, tgt_pt))
}

fn finish_route(registry: &Registry, source_id: Id, target_id: Id, wps: Vec<Point>) -> Vec<Point> {
    let mut wps = snap_near_orthogonal(&wps);
    wps = deduplicate_waypoints(&wps, tolerance::DEDUPE_EPS);

    if wps.len() == 2 {
        if let (Some(source), Some(target)) = (registry.get(source_id), registry.get(target_id)) {
            let same_row = (wps[0].y - wps[1].y).abs() <= constants::SAME_ROW_Y_TOLERANCE;
            let src_anchor = source.rect().right_center();
            let tgt_anchor = target.rect().left_center();
            if same_row
                && wps[0].near(src_anchor, constants::ENDPOINT_SNAP_TOLERANCE)
                && wps[1].near(tgt_anchor, constants::ENDPOINT_SNAP_TOLERANCE)
            {
                return vec![src_anchor, tgt_anchor];
            }
        }
    }
    wps
}

/// Snap any near-orthogonal segment (off-axis delta below the snap
/// threshold) to strictly horizontal or vertical.
fn snap_near_orthogonal(wps: &[Point]) -> Vec<Point> {
    if wps.len() < 2 {
        return wps.to_vec();
    }
    let mut out = wps.to_vec();
    for i in 0..out.len() - 1 {
        let (a, b) = (out[i], out[i + 1]);
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        if dx < constants::SEGMENT_ORTHO_SNAP && dx > 0.0 {
            out[i + 1].x = a.x;
        } else if dy < constants::SEGMENT_ORTHO_SNAP && dy > 0.0 {
            out[i + 1].y = a.y;
        }
    }
    out
}

/// L-route from a boundary event's host border down/up to the target's
/// centre-Y, then across to its near edge (spec.md §4.6).
fn boundary_event_route(host: layout_geom::Rect, target: layout_geom::Rect) -> Vec<Point> {
    let host_cx = host.center().x;
    let target_cy = target.center().y;
    let below = target_cy >= host.bottom();
    let exit = if below {
        Point::new(host_cx, host.bottom())
    } else {
        Point::new(host_cx, host.top())
    };
    let bend = Point::new(host_cx, target_cy);
    let entry = if host_cx <= target.left() {
        target.left_center()
    } else {
        target.right_center()
    };
    vec![exit, bend, Point::new(entry.x, target_cy)]
}

/// V-H-V dog-leg for a message flow, bending at the midpoint between the
/// two elements' vertical extents; a single L if the Y ranges overlap.
fn message_flow_route(source: layout_geom::Rect, target: layout_geom::Rect) -> Vec<Point> {
    let overlap = source.top() < target.bottom() && source.bottom() > target.top();
    if overlap {
        return build_orthogonal_waypoints(source.right_center(), target.left_center());
    }
    let (top_rect, bottom_rect) = if source.top() < target.top() {
        (source, target)
    } else {
        (target, source)
    };
    let mid_y = (top_rect.bottom() + bottom_rect.top()) / 2.0;
    let src_pt = Point::new(source.center().x, if source.top() < target.top() { source.bottom() } else { source.top() });
    let tgt_pt = Point::new(target.center().x, if target.top() < source.top() { target.bottom() } else { target.top() });
    vec![
        src_pt,
        Point::new(src_pt.x, mid_y),
        Point::new(tgt_pt.x, mid_y),
        tgt_pt,
    ]
}

/// Five-waypoint self-loop: exit right at a quarter height down, out by a
/// margin, below the element by a margin, back to centre-X, enter bottom.
fn self_loop_route(rect: layout_geom::Rect) -> Vec<Point> {
    let exit_y = rect.top() + rect.height / 4.0;
    let exit = Point::new(rect.right(), exit_y);
    let out = Point::new(rect.right() + constants::SELF_LOOP_HORIZONTAL_MARGIN, exit_y);
    let below_y = rect.bottom() + constants::SELF_LOOP_VERTICAL_MARGIN;
    let below = Point::new(out.x, below_y);
    let centre_x = Point::new(rect.center().x, below_y);
    let entry = Point::new(rect.center().x, rect.bottom());
    vec![exit, out, below, centre_x, entry]
}

#[cfg(test)]
mod tests {
    use super::*;
    use layout_geom::Rect;
    use layout_model::{BpmnType, Element};

    #[test]
    fn self_loop_has_five_waypoints() {
        let rect = Rect::new(0.0, 0.0, 100.0, 80.0);
        let wps = self_loop_route(rect);
        assert_eq!(wps.len(), 5);
        assert_eq!(wps[0].x, 100.0);
    }

    #[test]
    fn message_flow_overlap_uses_single_l() {
        let source = Rect::new(0.0, 0.0, 100.0, 80.0);
        let target = Rect::new(300.0, 20.0, 100.0, 80.0);
        let wps = message_flow_route(source, target);
        assert!(wps.len() <= 3);
    }

    #[test]
    fn message_flow_disjoint_y_is_v_h_v() {
        let source = Rect::new(0.0, 0.0, 100.0, 80.0);
        let target = Rect::new(300.0, 300.0, 100.0, 80.0);
        let wps = message_flow_route(source, target);
        assert_eq!(wps.len(), 4);
    }

    #[test]
    fn route_connections_handles_self_loop() {
        let mut reg = Registry::new();
        let mut t = Element::new(Id(0), BpmnType::Task);
        t.width = 100.0;
        t.height = 80.0;
        let id = reg.insert(t);
        let mut flow = Element::new(Id(0), BpmnType::SequenceFlow);
        flow.source = Some(id);
        flow.target = Some(id);
        flow.waypoints = Some(vec![]);
        let flow_id = reg.insert(flow);

        route_connections(&mut reg, &HashMap::new());
        let routed = reg.get(flow_id).unwrap();
        assert_eq!(routed.waypoints.as_ref().unwrap().len(), 5);
    }
}
