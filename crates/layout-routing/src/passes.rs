//! Edge routing passes (spec.md §4.7): seven deterministic, order-dependent
//! refinements applied to every sequence flow after the routing core (C6)
//! and before element avoidance (C8). Each pass is intentionally narrow —
//! composing simple rewrites is easier to get right than one monolithic
//! router.

use layout_classify::is_gateway;
use layout_geom::{Point, build_z_shape_route};
use layout_model::{BpmnType, Id, Modeller, Registry, constants};
use std::collections::HashMap;

/// Run all seven passes, in spec order, against every sequence flow.
pub fn run_passes(registry: &mut Registry) {
    gateway_branch_simplification(registry);
    rebuild_off_row_gateway_routes(registry);
    disconnected_edge_repair(registry);
    endpoint_centre_snap(registry);
    overlapping_collinear_flow_separation(registry);
    loopback_below_routing(registry);
    collinear_cleanup(registry);
}

/// Re-run the subset of passes that repair routes invalidated by grid snap
/// and happy-path alignment (spec.md §4.14 step 11): disconnected-edge
/// repair, endpoint-centre snap, and off-row gateway route rebuild.
pub fn repair_after_grid_snap(registry: &mut Registry) {
    disconnected_edge_repair(registry);
    endpoint_centre_snap(registry);
    rebuild_off_row_gateway_routes(registry);
}

/// Loopback routing and overlap separation (spec.md §4.14 step 13), run
/// again after lane/grid passes may have shifted routes.
pub fn loopback_and_overlap_passes(registry: &mut Registry) {
    loopback_below_routing(registry);
    overlapping_collinear_flow_separation(registry);
}

fn sequence_flow_ids(registry: &Registry) -> Vec<Id> {
    registry
        .filter(|e| e.bpmn_type == BpmnType::SequenceFlow && e.source.is_some() && e.target.is_some())
        .into_iter()
        .map(|e| e.id)
        .collect()
}

fn outgoing_count(registry: &Registry, node: Id) -> usize {
    registry
        .filter(|e| e.bpmn_type == BpmnType::SequenceFlow && e.source == Some(node))
        .len()
}

fn incoming_count(registry: &Registry, node: Id) -> usize {
    registry
        .filter(|e| e.bpmn_type == BpmnType::SequenceFlow && e.target == Some(node))
        .len()
}

/// 1. Gateway-branch simplification.
fn gateway_branch_simplification(registry: &mut Registry) {
    for id in sequence_flow_ids(registry) {
        let Some(conn) = registry.get(id) else { continue };
        let (source_id, target_id) = (conn.source.unwrap(), conn.target.unwrap());
        let wp_len = conn.waypoints.as_ref().map(Vec::len).unwrap_or(0);
        if wp_len < 5 {
            continue;
        }
        let Some(source) = registry.get(source_id) else { continue };
        let Some(target) = registry.get(target_id) else { continue };

        let source_qualifies =
            is_gateway(source.bpmn_type) && outgoing_count(registry, source_id) <= 2;
        let target_qualifies =
            is_gateway(target.bpmn_type) && incoming_count(registry, target_id) <= 2;
        if !source_qualifies && !target_qualifies {
            continue;
        }

        let src_rect = source.rect();
        let tgt_rect = target.rect();
        let dcy = tgt_rect.center().y - src_rect.center().y;
        if dcy.abs() <= 10.0 || tgt_rect.center().x <= src_rect.center().x {
            continue;
        }
        let route = build_z_shape_route(
            src_rect.right(),
            src_rect.center().y,
            tgt_rect.left(),
            tgt_rect.center().y,
        );
        let _ = registry.update_waypoints(id, route);
    }
}

/// 2. Rebuild off-row gateway routes.
fn rebuild_off_row_gateway_routes(registry: &mut Registry) {
    for id in sequence_flow_ids(registry) {
        let Some(conn) = registry.get(id) else { continue };
        let (source_id, target_id) = (conn.source.unwrap(), conn.target.unwrap());
        let waypoints = conn.waypoints.clone().unwrap_or_default();
        let Some(source) = registry.get(source_id) else { continue };
        let Some(target) = registry.get(target_id) else { continue };
        let src_rect = source.rect();
        let tgt_rect = target.rect();

        if (tgt_rect.center().y - src_rect.center().y).abs() < constants::DIFFERENT_ROW_MIN_Y {
            continue;
        }
        if tgt_rect.center().x <= src_rect.center().x {
            continue;
        }

        let src_is_gateway = is_gateway(source.bpmn_type);
        let tgt_is_gateway = is_gateway(target.bpmn_type);
        let flat = waypoints
            .windows(2)
            .all(|w| (w[0].y - w[1].y).abs() <= constants::DIFFERENT_ROW_MIN_Y)
            && waypoints.len() >= 2;

        let route = if src_is_gateway {
            let below = tgt_rect.center().y >= src_rect.bottom();
            let exit = if below {
                Point::new(src_rect.center().x, src_rect.bottom())
            } else {
                Point::new(src_rect.center().x, src_rect.top())
            };
            vec![
                exit,
                Point::new(src_rect.center().x, tgt_rect.center().y),
                tgt_rect.left_center(),
            ]
        } else if tgt_is_gateway {
            let below = tgt_rect.center().y >= src_rect.bottom();
            let entry = if below {
                Point::new(tgt_rect.center().x, tgt_rect.top())
            } else {
                Point::new(tgt_rect.center().x, tgt_rect.bottom())
            };
            vec![
                src_rect.right_center(),
                Point::new(tgt_rect.center().x, src_rect.center().y),
                entry,
            ]
        } else if flat {
            build_z_shape_route(
                src_rect.right(),
                src_rect.center().y,
                tgt_rect.left(),
                tgt_rect.center().y,
            )
        } else {
            continue;
        };
        let _ = registry.update_waypoints(id, route);
    }
}

/// 3. Disconnected-edge repair.
fn disconnected_edge_repair(registry: &mut Registry) {
    for id in sequence_flow_ids(registry) {
        let Some(conn) = registry.get(id) else { continue };
        let (source_id, target_id) = (conn.source.unwrap(), conn.target.unwrap());
        let waypoints = conn.waypoints.clone().unwrap_or_default();
        if waypoints.len() < 2 {
            continue;
        }
        let Some(source) = registry.get(source_id) else { continue };
        let Some(target) = registry.get(target_id) else { continue };
        let src_rect = source.rect();
        let tgt_rect = target.rect();

        let first = waypoints[0];
        let last = *waypoints.last().unwrap();
        let first_disconnected = distance_to_border(first, src_rect) > constants::DISCONNECT_THRESHOLD;
        let last_disconnected = distance_to_border(last, tgt_rect) > constants::DISCONNECT_THRESHOLD;
        if !first_disconnected && !last_disconnected {
            continue;
        }

        let same_row = (src_rect.center().y - tgt_rect.center().y).abs() <= constants::SAME_ROW_Y_TOLERANCE;
        let target_right = tgt_rect.center().x > src_rect.center().x;

        let route = if same_row {
            vec![src_rect.right_center(), tgt_rect.left_center()]
        } else if target_right {
            build_z_shape_route(
                src_rect.right(),
                src_rect.center().y,
                tgt_rect.left(),
                tgt_rect.center().y,
            )
        } else {
            let mut wps = waypoints.clone();
            if first_disconnected {
                wps[0] = nearest_border_point(first, src_rect);
            }
            let last_idx = wps.len() - 1;
            if last_disconnected {
                wps[last_idx] = nearest_border_point(last, tgt_rect);
            }
            wps
        };
        let _ = registry.update_waypoints(id, route);
    }
}

fn distance_to_border(p: Point, rect: layout_geom::Rect) -> f64 {
    let dx = (p.x - rect.left()).min((p.x - rect.right()).abs());
    let dy = (p.y - rect.top()).min((p.y - rect.bottom()).abs());
    if rect.contains_point(p) {
        dx.min(dy)
    } else {
        p.distance_to(rect.center()) - (rect.width.max(rect.height) / 2.0)
    }
}

fn nearest_border_point(p: Point, rect: layout_geom::Rect) -> Point {
    let clamped_x = p.x.clamp(rect.left(), rect.right());
    let clamped_y = p.y.clamp(rect.top(), rect.bottom());
    let dist_left = (clamped_x - rect.left()).abs();
    let dist_right = (clamped_x - rect.right()).abs();
    let dist_top = (clamped_y - rect.top()).abs();
    let dist_bottom = (clamped_y - rect.bottom()).abs();
    let min = dist_left.min(dist_right).min(dist_top).min(dist_bottom);
    if min == dist_left {
        Point::new(rect.left(), clamped_y)
    } else if min == dist_right {
        Point::new(rect.right(), clamped_y)
    } else if min == dist_top {
        Point::new(clamped_x, rect.top())
    } else {
        Point::new(clamped_x, rect.bottom())
    }
}

/// 4. Endpoint centre snap.
fn endpoint_centre_snap(registry: &mut Registry) {
    for id in sequence_flow_ids(registry) {
        let Some(conn) = registry.get(id) else { continue };
        let (source_id, target_id) = (conn.source.unwrap(), conn.target.unwrap());
        let mut waypoints = conn.waypoints.clone().unwrap_or_default();
        if waypoints.len() < 2 {
            continue;
        }
        let Some(source) = registry.get(source_id) else { continue };
        let Some(target) = registry.get(target_id) else { continue };
        let src_rect = source.rect();
        let tgt_rect = target.rect();

        let first = waypoints[0];
        let last = *waypoints.last().unwrap();
        let dx = (last.x - first.x).abs();
        let dy = (last.y - first.y).abs();
        let horizontal = dx >= dy;
        let mut changed = false;

        if horizontal {
            let diff = (first.y - src_rect.center().y).abs();
            if diff > 0.5 && diff <= constants::CENTRE_SNAP_TOLERANCE {
                let old_y = waypoints[0].y;
                waypoints[0].y = src_rect.center().y;
                if waypoints.len() > 2 && (waypoints[1].y - old_y).abs() < f64::EPSILON {
                    waypoints[1].y = src_rect.center().y;
                }
                changed = true;
            }
            let last_idx = waypoints.len() - 1;
            let diff = (last.y - tgt_rect.center().y).abs();
            if diff > 0.5 && diff <= constants::CENTRE_SNAP_TOLERANCE {
                let old_y = waypoints[last_idx].y;
                waypoints[last_idx].y = tgt_rect.center().y;
                if last_idx >= 1 && (waypoints[last_idx - 1].y - old_y).abs() < f64::EPSILON {
                    waypoints[last_idx - 1].y = tgt_rect.center().y;
                }
                changed = true;
            }
        } else {
            let diff = (first.x - src_rect.center().x).abs();
            if diff > 0.5 && diff <= constants::CENTRE_SNAP_TOLERANCE {
                let old_x = waypoints[0].x;
                waypoints[0].x = src_rect.center().x;
                if waypoints.len() > 2 && (waypoints[1].x - old_x).abs() < f64::EPSILON {
                    waypoints[1].x = src_rect.center().x;
                }
                changed = true;
            }
            let last_idx = waypoints.len() - 1;
            let diff = (last.x - tgt_rect.center().x).abs();
            if diff > 0.5 && diff <= constants::CENTRE_SNAP_TOLERANCE {
                let old_x = waypoints[last_idx].x;
                waypoints[last_idx].x = tgt_rect.center().x;
                if last_idx >= 1 && (waypoints[last_idx - 1].x - old_x).abs() < f64::EPSILON {
                    waypoints[last_idx - 1].x = tgt_rect.center().x;
                }
                changed = true;
            }
        }

        if changed {
            let _ = registry.update_waypoints(id, waypoints);
        }
    }
}

/// 5. Overlapping collinear flow separation.
fn overlapping_collinear_flow_separation(registry: &mut Registry) {
    let mut by_source: HashMap<Id, Vec<Id>> = HashMap::new();
    for id in sequence_flow_ids(registry) {
        if let Some(conn) = registry.get(id) {
            by_source.entry(conn.source.unwrap()).or_default().push(id);
        }
    }

    for (_, flows) in by_source {
        for i in 0..flows.len() {
            for j in (i + 1)..flows.len() {
                let (Some(a), Some(b)) = (registry.get(flows[i]), registry.get(flows[j])) else {
                    continue;
                };
                let wa = a.waypoints.clone().unwrap_or_default();
                let wb = b.waypoints.clone().unwrap_or_default();
                if wa.len() < 2 || wb.len() < 2 {
                    continue;
                }
                let (a_horizontal, a_y) = first_segment_orientation(&wa);
                let (b_horizontal, b_y) = first_segment_orientation(&wb);
                if !a_horizontal || !b_horizontal || (a_y - b_y).abs() > 0.5 {
                    continue;
                }
                let overlap = horizontal_overlap(wa[0].x, wa[1].x, wb[0].x, wb[1].x);
                if overlap <= 10.0 {
                    continue;
                }

                let (source_id, target_id) = (a.source.unwrap(), a.target.unwrap());
                let Some(source) = registry.get(source_id) else { continue };
                let Some(target) = registry.get(target_id) else { continue };
                let same_row = (source.rect().center().y - target.rect().center().y).abs()
                    <= constants::SAME_ROW_Y_TOLERANCE;
                if !same_row {
                    continue;
                }

                let len_a = (wa.last().unwrap().x - wa[0].x).abs();
                let len_b = (wb.last().unwrap().x - wb[0].x).abs();
                let (skip_id, other) = if len_a >= len_b {
                    (flows[i], source)
                } else {
                    (flows[j], source)
                };
                let skip_conn = registry.get(skip_id).unwrap();
                let skip_target_id = skip_conn.target.unwrap();
                let Some(skip_target) = registry.get(skip_target_id) else { continue };
                let src_rect = other.rect();
                let tgt_rect = skip_target.rect();
                let detour_y = src_rect.center().y - constants::COLLINEAR_DETOUR_OFFSET;
                let route = vec![
                    src_rect.right_center(),
                    Point::new(src_rect.right(), detour_y),
                    Point::new(tgt_rect.center().x, detour_y),
                    tgt_rect.top_center(),
                ];
                let _ = registry.update_waypoints(skip_id, route);
            }
        }
    }
}

fn first_segment_orientation(wps: &[Point]) -> (bool, f64) {
    let horizontal = (wps[0].y - wps[1].y).abs() < (wps[0].x - wps[1].x).abs();
    (horizontal, wps[0].y)
}

fn horizontal_overlap(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    let (a_min, a_max) = (a0.min(a1), a0.max(a1));
    let (b_min, b_max) = (b0.min(b1), b0.max(b1));
    (a_max.min(b_max) - a_min.max(b_min)).max(0.0)
}

/// 6. Loopback-below routing.
fn loopback_below_routing(registry: &mut Registry) {
    let scope_bottom = registry
        .filter(|e| !e.is_connection())
        .iter()
        .map(|e| e.rect().bottom())
        .fold(0.0_f64, f64::max);

    for id in sequence_flow_ids(registry) {
        let Some(conn) = registry.get(id) else { continue };
        let (source_id, target_id) = (conn.source.unwrap(), conn.target.unwrap());
        let waypoints = conn.waypoints.clone().unwrap_or_default();
        let Some(source) = registry.get(source_id) else { continue };
        let Some(target) = registry.get(target_id) else { continue };
        let src_rect = source.rect();
        let tgt_rect = target.rect();

        if tgt_rect.left() >= src_rect.right() - constants::DIFFERENT_ROW_MIN_Y {
            continue;
        }
        if waypoints.iter().any(|p| p.y > scope_bottom + 1.0) {
            continue;
        }

        let below_y = scope_bottom + constants::LOOPBACK_BELOW_MARGIN;
        let route = if is_gateway(source.bpmn_type) {
            vec![
                src_rect.bottom_center(),
                Point::new(src_rect.center().x, below_y),
                Point::new(tgt_rect.center().x, below_y),
                tgt_rect.bottom_center(),
            ]
        } else {
            let out_x = src_rect.right() + constants::LOOPBACK_HORIZONTAL_MARGIN;
            vec![
                src_rect.right_center(),
                Point::new(out_x, src_rect.center().y),
                Point::new(out_x, below_y),
                Point::new(tgt_rect.left(), below_y),
                tgt_rect.left_center(),
            ]
        };
        let _ = registry.update_waypoints(id, route);
    }
}

/// 7. Micro-bend removal / collinear cleanup.
pub fn collinear_cleanup(registry: &mut Registry) {
    for id in sequence_flow_ids(registry) {
        let Some(conn) = registry.get(id) else { continue };
        let waypoints = conn.waypoints.clone().unwrap_or_default();
        if waypoints.len() < 3 {
            continue;
        }
        let cleaned = layout_geom::remove_collinear_points(&waypoints);
        if cleaned.len() != waypoints.len() {
            let _ = registry.update_waypoints(id, cleaned);
        }
    }
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

    fn flow(reg: &mut Registry, source: Id, target: Id, waypoints: Vec<Point>) -> Id {
        let mut e = Element::new(Id(0), BpmnType::SequenceFlow);
        e.source = Some(source);
        e.target = Some(target);
        e.waypoints = Some(waypoints);
        reg.insert(e)
    }

    #[test]
    fn collinear_cleanup_removes_redundant_middle_point() {
        let mut reg = Registry::new();
        let a = shape(&mut reg, BpmnType::Task, 0.0, 0.0, 100.0, 80.0);
        let b = shape(&mut reg, BpmnType::Task, 300.0, 0.0, 100.0, 80.0);
        let id = flow(
            &mut reg,
            a,
            b,
            vec![
                Point::new(100.0, 40.0),
                Point::new(200.0, 40.0),
                Point::new(300.0, 40.0),
            ],
        );
        collinear_cleanup(&mut reg);
        assert_eq!(reg.get(id).unwrap().waypoints.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn disconnected_edge_repair_rebuilds_same_row_flow() {
        let mut reg = Registry::new();
        let a = shape(&mut reg, BpmnType::Task, 0.0, 0.0, 100.0, 80.0);
        let b = shape(&mut reg, BpmnType::Task, 300.0, 0.0, 100.0, 80.0);
        let id = flow(&mut reg, a, b, vec![Point::new(500.0, 500.0), Point::new(600.0, 600.0)]);
        disconnected_edge_repair(&mut reg);
        let wps = reg.get(id).unwrap().waypoints.clone().unwrap();
        assert_eq!(wps.len(), 2);
        assert!((wps[0].y - 40.0).abs() < 1.0);
    }

    #[test]
    fn endpoint_centre_snap_aligns_near_centre_endpoint() {
        let mut reg = Registry::new();
        let a = shape(&mut reg, BpmnType::Task, 0.0, 0.0, 100.0, 80.0);
        let b = shape(&mut reg, BpmnType::Task, 300.0, 0.0, 100.0, 80.0);
        let id = flow(&mut reg, a, b, vec![Point::new(100.0, 45.0), Point::new(300.0, 45.0)]);
        endpoint_centre_snap(&mut reg);
        let wps = reg.get(id).unwrap().waypoints.clone().unwrap();
        assert_eq!(wps[0].y, 40.0);
    }

    #[test]
    fn collinear_cleanup_is_idempotent() {
        let mut reg = Registry::new();
        let a = shape(&mut reg, BpmnType::Task, 0.0, 0.0, 100.0, 80.0);
        let b = shape(&mut reg, BpmnType::Task, 300.0, 0.0, 100.0, 80.0);
        let id = flow(
            &mut reg,
            a,
            b,
            vec![
                Point::new(100.0, 40.0),
                Point::new(200.0, 40.0),
                Point::new(300.0, 40.0),
            ],
        );
        collinear_cleanup(&mut reg);
        let once = reg.get(id).unwrap().waypoints.clone().unwrap();
        collinear_cleanup(&mut reg);
        let twice = reg.get(id).unwrap().waypoints.clone().unwrap();
        assert_eq!(once, twice);
    }

    proptest::proptest! {
        #[test]
        fn collinear_cleanup_never_grows_a_route(
            y in 0.0f64..200.0,
            mid_x in 150.0f64..250.0,
        ) {
            let mut reg = Registry::new();
            let a = shape(&mut reg, BpmnType::Task, 0.0, 0.0, 100.0, 80.0);
            let b = shape(&mut reg, BpmnType::Task, 300.0, 0.0, 100.0, 80.0);
            let id = flow(&mut reg, a, b, vec![Point::new(100.0, y), Point::new(mid_x, y), Point::new(300.0, y)]);
            let before = reg.get(id).unwrap().waypoints.clone().unwrap().len();
            collinear_cleanup(&mut reg);
            let after = reg.get(id).unwrap().waypoints.clone().unwrap().len();
            prop_assert!(after <= before);
        }
    }
}
