//! Element avoidance (spec.md §4.8): detour any routed segment that cuts
//! through an obstacle it has no business passing through.

use layout_classify::{is_artifact, is_boundary_event, is_gateway};
use layout_geom::{Point, Rect, deduplicate_waypoints, segment_intersects_rect, tolerance};
use layout_model::{BpmnType, Id, Modeller, Registry, constants};
use layout_spatial::SpatialIndex;
use std::collections::{HashMap, HashSet};

/// Reroute every eligible sequence/message flow around obstacles it
/// currently crosses, up to the spec's fixed iteration budget.
pub fn avoid_obstacles(registry: &mut Registry) {
    let shapes: Vec<(Id, Rect)> = registry
        .filter(|e| !e.is_connection())
        .into_iter()
        .map(|e| (e.id, e.rect()))
        .collect();
    let rects: HashMap<Id, Rect> = shapes.iter().copied().collect();
    let index = SpatialIndex::build(&shapes);

    let connection_ids: Vec<Id> = registry
        .filter(|e| {
            e.is_connection()
                && matches!(e.bpmn_type, BpmnType::SequenceFlow | BpmnType::MessageFlow)
        })
        .into_iter()
        .map(|e| e.id)
        .collect();

    let mut rerouted = 0usize;
    for id in connection_ids {
        let Some(conn) = registry.get(id) else { continue };
        let (source_id, target_id) = match (conn.source, conn.target) {
            (Some(s), Some(t)) => (s, t),
            _ => continue,
        };
        let Some(source) = registry.get(source_id) else { continue };
        let Some(target) = registry.get(target_id) else { continue };
        if is_gateway(source.bpmn_type) || is_gateway(target.bpmn_type) {
            continue;
        }

        let valid_obstacles = valid_obstacle_set(registry, source_id, target_id);
        let Some(waypoints) = registry.get(id).and_then(|e| e.waypoints.clone()) else {
            continue;
        };
        if waypoints.len() < 2 {
            continue;
        }

        let routed = reroute_around_obstacles(&waypoints, &index, &rects, &valid_obstacles);
        if routed.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            continue;
        }
        if routed != waypoints {
            rerouted += 1;
        }
        let _ = registry.update_waypoints(id, routed);
    }
    tracing::debug!(target: "routing.avoidance", candidates = shapes.len(), rerouted, "avoidance pass complete");
}

fn valid_obstacle_set(registry: &Registry, source_id: Id, target_id: Id) -> HashSet<Id> {
    let mut excluded: HashSet<Id> = HashSet::new();
    excluded.insert(source_id);
    excluded.insert(target_id);

    for be in registry.filter(|e| is_boundary_event(e.bpmn_type)) {
        if be.host == Some(source_id) || be.host == Some(target_id) {
            excluded.insert(be.id);
        }
    }

    let source_parent = registry.get(source_id).and_then(|e| e.parent);
    let target_parent = registry.get(target_id).and_then(|e| e.parent);
    let shared_subprocess = source_parent.is_some() && source_parent == target_parent;

    let mut valid = HashSet::new();
    for shape in registry.filter(|e| !e.is_connection()) {
        if excluded.contains(&shape.id) || is_artifact(shape.bpmn_type) {
            continue;
        }
        if shared_subprocess && shape.parent != source_parent {
            continue;
        }
        valid.insert(shape.id);
    }
    valid
}

fn reroute_around_obstacles(
    waypoints: &[Point],
    index: &SpatialIndex,
    rects: &HashMap<Id, Rect>,
    valid: &HashSet<Id>,
) -> Vec<Point> {
    let mut route = waypoints.to_vec();

    for _ in 0..constants::MAX_AVOIDANCE_ITERATIONS {
        let mut spliced = false;
        let mut i = 0;
        while i + 1 < route.len() {
            let (p1, p2) = (route[i], route[i + 1]);
            let bbox = segment_bbox(p1, p2).expand(constants::AVOIDANCE_MARGIN);
            let candidates = index.get_candidates(&bbox);

            let hit = candidates.into_iter().find_map(|id| {
                if !valid.contains(&id) {
                    return None;
                }
                let rect = rects.get(&id)?;
                let expanded = rect.expand(constants::AVOIDANCE_MARGIN);
                if segment_intersects_rect(p1, p2, &expanded) {
                    Some(expanded)
                } else {
                    None
                }
            });

            if let Some(obstacle) = hit {
                let detour = compute_detour(p1, p2, obstacle, &route, index, rects, valid);
                route.splice(i..=i + 1, detour);
                spliced = true;
                break;
            }
            i += 1;
        }
        if !spliced {
            break;
        }
    }

    deduplicate_waypoints(&route, tolerance::DEDUPE_EPS)
}

/// Compute an H-V-H (primarily horizontal segment) or V-H-V (primarily
/// vertical segment) detour around `obstacle`, choosing the side that
/// crosses fewer other valid obstacles (tie goes to above/left).
fn compute_detour(
    p1: Point,
    p2: Point,
    obstacle: Rect,
    full_route: &[Point],
    index: &SpatialIndex,
    rects: &HashMap<Id, Rect>,
    valid: &HashSet<Id>,
) -> Vec<Point> {
    let horizontal = (p2.x - p1.x).abs() >= (p2.y - p1.y).abs();
    let (min_x, max_x) = (p1.x.min(p2.x), p1.x.max(p2.x));
    let (min_y, max_y) = (p1.y.min(p2.y), p1.y.max(p2.y));

    if horizontal {
        let above_y = obstacle.top() - constants::AVOIDANCE_MARGIN;
        let below_y = obstacle.bottom() + constants::AVOIDANCE_MARGIN;
        let entry_x = p1.x.clamp(min_x, max_x);
        let exit_x = p2.x.clamp(min_x, max_x);

        let above = vec![
            p1,
            Point::new(entry_x, above_y),
            Point::new(exit_x, above_y),
            p2,
        ];
        let below = vec![
            p1,
            Point::new(entry_x, below_y),
            Point::new(exit_x, below_y),
            p2,
        ];
        let above_crossings = count_crossings(&above, full_route, index, rects, valid);
        let below_crossings = count_crossings(&below, full_route, index, rects, valid);
        if below_crossings < above_crossings { below } else { above }
    } else {
        let left_x = obstacle.left() - constants::AVOIDANCE_MARGIN;
        let right_x = obstacle.right() + constants::AVOIDANCE_MARGIN;
        let entry_y = p1.y.clamp(min_y, max_y);
        let exit_y = p2.y.clamp(min_y, max_y);

        let left = vec![
            p1,
            Point::new(left_x, entry_y),
            Point::new(left_x, exit_y),
            p2,
        ];
        let right = vec![
            p1,
            Point::new(right_x, entry_y),
            Point::new(right_x, exit_y),
            p2,
        ];
        let left_crossings = count_crossings(&left, full_route, index, rects, valid);
        let right_crossings = count_crossings(&right, full_route, index, rects, valid);
        if right_crossings < left_crossings { right } else { left }
    }
}

fn count_crossings(
    candidate: &[Point],
    _full_route: &[Point],
    index: &SpatialIndex,
    rects: &HashMap<Id, Rect>,
    valid: &HashSet<Id>,
) -> usize {
    let mut count = 0;
    for pair in candidate.windows(2) {
        let bbox = segment_bbox(pair[0], pair[1]).expand(constants::AVOIDANCE_MARGIN);
        for id in index.get_candidates(&bbox) {
            if !valid.contains(&id) {
                continue;
            }
            if let Some(rect) = rects.get(&id) {
                if segment_intersects_rect(pair[0], pair[1], &rect.expand(constants::AVOIDANCE_MARGIN)) {
                    count += 1;
                }
            }
        }
    }
    count
}

fn segment_bbox(p1: Point, p2: Point) -> Rect {
    let x = p1.x.min(p2.x);
    let y = p1.y.min(p2.y);
    Rect::new(x, y, (p1.x - p2.x).abs(), (p1.y - p2.y).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use layout_model::{BpmnType, Element};

    #[test]
    fn segment_bbox_normalizes_reversed_points() {
        let bbox = segment_bbox(Point::new(100.0, 50.0), Point::new(0.0, 0.0));
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.y, 0.0);
        assert_eq!(bbox.width, 100.0);
        assert_eq!(bbox.height, 50.0);
    }

    #[test]
    fn route_detours_around_blocking_obstacle() {
        let mut reg = Registry::new();
        let mut a = Element::new(Id(0), BpmnType::Task);
        a.x = 0.0;
        a.y = 100.0;
        a.width = 100.0;
        a.height = 80.0;
        let source = reg.insert(a);

        let mut b = Element::new(Id(0), BpmnType::Task);
        b.x = 400.0;
        b.y = 100.0;
        b.width = 100.0;
        b.height = 80.0;
        let target = reg.insert(b);

        let mut blocker = Element::new(Id(0), BpmnType::Task);
        blocker.x = 200.0;
        blocker.y = 90.0;
        blocker.width = 100.0;
        blocker.height = 100.0;
        reg.insert(blocker);

        let mut flow = Element::new(Id(0), BpmnType::SequenceFlow);
        flow.source = Some(source);
        flow.target = Some(target);
        flow.waypoints = Some(vec![Point::new(100.0, 140.0), Point::new(400.0, 140.0)]);
        let flow_id = reg.insert(flow);

        avoid_obstacles(&mut reg);

        let routed = reg.get(flow_id).unwrap().waypoints.clone().unwrap();
        let blocker_rect = Rect::new(200.0, 90.0, 100.0, 100.0);
        for pair in routed.windows(2) {
            assert!(!segment_intersects_rect(pair[0], pair[1], &blocker_rect));
        }
    }

    #[test]
    fn gateway_endpoints_are_skipped() {
        let mut reg = Registry::new();
        let mut gw = Element::new(Id(0), BpmnType::ExclusiveGateway);
        gw.x = 0.0;
        gw.y = 100.0;
        gw.width = 50.0;
        gw.height = 50.0;
        let source = reg.insert(gw);

        let mut b = Element::new(Id(0), BpmnType::Task);
        b.x = 400.0;
        b.y = 100.0;
        b.width = 100.0;
        b.height = 80.0;
        let target = reg.insert(b);

        let original = vec![Point::new(50.0, 125.0), Point::new(400.0, 140.0)];
        let mut flow = Element::new(Id(0), BpmnType::SequenceFlow);
        flow.source = Some(source);
        flow.target = Some(target);
        flow.waypoints = Some(original.clone());
        let flow_id = reg.insert(flow);

        avoid_obstacles(&mut reg);
        assert_eq!(reg.get(flow_id).unwrap().waypoints.clone().unwrap(), original);
    }
}
