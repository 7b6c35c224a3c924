//! Lane layout (spec.md §4.9): snapshot lanes before the oracle touches
//! anything, reassign bands and member shapes afterwards, then keep
//! cross-lane and intra-lane sequence flows readable.

use layout_geom::Point;
use layout_model::{BpmnType, Id, Modeller, Registry, constants};
use std::collections::{HashMap, HashSet};

/// Per-lane state captured before any geometry mutation, so band
/// assignment has a stable "original order" and member set to work from
/// even after the oracle repositions everything.
#[derive(Debug, Clone)]
pub struct LaneSnapshot {
    pub lane_id: Id,
    pub pool_id: Id,
    pub original_y: f64,
    pub members: HashSet<Id>,
}

/// Capture one snapshot per lane currently in the registry.
pub fn snapshot_lanes(registry: &Registry) -> Vec<LaneSnapshot> {
    registry
        .filter(|e| e.bpmn_type == BpmnType::Lane)
        .into_iter()
        .filter_map(|lane| {
            let pool_id = lane.parent?;
            Some(LaneSnapshot {
                lane_id: lane.id,
                pool_id,
                original_y: lane.y,
                members: lane.flow_node_refs.iter().copied().collect(),
            })
        })
        .collect()
}

/// Post-oracle band assignment and member repositioning for every
/// participant pool that has lanes, per spec.md §4.9 steps 1-7.
///
/// `optimize_order` gates step 3's crossing-minimising reorder
/// (`lane_strategy = OPTIMIZE`); when `false` lanes keep their original
/// top-to-bottom order (`lane_strategy = PRESERVE`, the default).
pub fn assign_bands(registry: &mut Registry, snapshots: &[LaneSnapshot], optimize_order: bool) {
    let pools: HashSet<Id> = snapshots.iter().map(|s| s.pool_id).collect();
    for pool_id in pools {
        let mut lanes: Vec<&LaneSnapshot> =
            snapshots.iter().filter(|s| s.pool_id == pool_id).collect();
        if lanes.is_empty() {
            continue;
        }
        lanes.sort_by(|a, b| a.original_y.partial_cmp(&b.original_y).unwrap());

        let mut member_sets: Vec<HashSet<Id>> = lanes.iter().map(|l| l.members.clone()).collect();
        assign_orphans(registry, pool_id, &lanes, &mut member_sets);

        // Invariant 5 (spec.md §3): reapply the captured membership (plus
        // any orphans just assigned) to the model before band positioning.
        for (lane, members) in lanes.iter().zip(member_sets.iter()) {
            if let Some(lane_el) = registry.get_mut(lane.lane_id) {
                lane_el.flow_node_refs = members.iter().copied().collect();
            }
        }

        let lane_order = if optimize_order {
            reorder_lanes(registry, &lanes, &member_sets)
        } else {
            (0..lanes.len()).collect()
        };

        let Some(pool) = registry.get(pool_id) else { continue };
        let pool_rect = pool.rect();
        let mut band_y = pool_rect.y;
        let mut bands: Vec<(Id, f64, f64)> = Vec::new(); // (lane_id, band_y, band_height)

        for &idx in &lane_order {
            let lane_id = lanes[idx].lane_id;
            let members = &member_sets[idx];
            let content_height = content_height_of(registry, members);
            let band_height =
                (content_height + 2.0 * constants::LANE_VERTICAL_PADDING).max(constants::MIN_LANE_HEIGHT);
            bands.push((lane_id, band_y, band_height));
            band_y += band_height;
        }
        let total_height = band_y - pool_rect.y;

        for &(lane_id, by, bh) in &bands {
            let members = {
                let idx = lanes.iter().position(|l| l.lane_id == lane_id).unwrap();
                member_sets[idx].clone()
            };
            recenter_members(registry, &members, by, bh);
        }

        for &(lane_id, by, bh) in &bands {
            let Some(pool) = registry.get(pool_id) else { continue };
            let pool_rect = pool.rect();
            let lane_rect = layout_geom::Rect::new(
                pool_rect.x + constants::POOL_LABEL_BAND,
                by,
                (pool_rect.width - constants::POOL_LABEL_BAND).max(0.0),
                bh,
            );
            let _ = registry.resize_shape(lane_id, lane_rect);
        }

        if let Some(pool) = registry.get(pool_id) {
            let mut resized = pool.rect();
            resized.height = total_height;
            let _ = registry.resize_shape(pool_id, resized);
        }

        // Repeat the lane resize once to counter any pool-resize redistribution.
        for &(lane_id, by, bh) in &bands {
            let Some(pool) = registry.get(pool_id) else { continue };
            let pool_rect = pool.rect();
            let lane_rect = layout_geom::Rect::new(
                pool_rect.x + constants::POOL_LABEL_BAND,
                by,
                (pool_rect.width - constants::POOL_LABEL_BAND).max(0.0),
                bh,
            );
            let _ = registry.resize_shape(lane_id, lane_rect);
        }
    }
}

fn assign_orphans(
    registry: &Registry,
    pool_id: Id,
    lanes: &[&LaneSnapshot],
    member_sets: &mut [HashSet<Id>],
) {
    let assigned: HashSet<Id> = member_sets.iter().flatten().copied().collect();
    let children = registry.child_ids_of(pool_id);
    for child_id in children {
        if assigned.contains(&child_id) {
            continue;
        }
        let Some(child) = registry.get(child_id) else { continue };
        if !matches!(
            child.bpmn_type,
            BpmnType::Task
                | BpmnType::StartEvent
                | BpmnType::EndEvent
                | BpmnType::IntermediateEvent
                | BpmnType::ExclusiveGateway
                | BpmnType::InclusiveGateway
                | BpmnType::ParallelGateway
                | BpmnType::EventBasedGateway
                | BpmnType::SubProcess
                | BpmnType::CallActivity
        ) {
            continue;
        }
        let child_cy = child.rect().center().y;
        let closest = lanes
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (registry.get(a.lane_id).map(|l| l.rect().center().y).unwrap_or(0.0) - child_cy).abs();
                let db = (registry.get(b.lane_id).map(|l| l.rect().center().y).unwrap_or(0.0) - child_cy).abs();
                da.partial_cmp(&db).unwrap()
            })
            .map(|(idx, _)| idx);
        if let Some(idx) = closest {
            member_sets[idx].insert(child_id);
        }
    }
}

/// Reorder lanes to minimise the inter-lane sequence-flow crossing cost.
/// Returns an index permutation into `lanes`/`member_sets`.
fn reorder_lanes(
    registry: &Registry,
    lanes: &[&LaneSnapshot],
    member_sets: &[HashSet<Id>],
) -> Vec<usize> {
    let n = lanes.len();
    let identity: Vec<usize> = (0..n).collect();
    if n <= 1 {
        return identity;
    }

    let lane_of = |node: Id| -> Option<usize> {
        member_sets.iter().position(|m| m.contains(&node))
    };
    let flows: Vec<(usize, usize)> = registry
        .filter(|e| e.bpmn_type == BpmnType::SequenceFlow)
        .into_iter()
        .filter_map(|e| {
            let (s, t) = (e.source?, e.target?);
            Some((lane_of(s)?, lane_of(t)?))
        })
        .collect();

    let cost = |order: &[usize]| -> usize {
        let mut position = vec![0usize; n];
        for (pos, &lane_idx) in order.iter().enumerate() {
            position[lane_idx] = pos;
        }
        flows
            .iter()
            .map(|&(s, t)| position[s].abs_diff(position[t]))
            .sum()
    };

    if n <= constants::LANE_REORDER_BRUTE_FORCE_MAX {
        let mut best = identity.clone();
        let mut best_cost = cost(&identity);
        let mut perm = identity.clone();
        permute(&mut perm, 0, &mut |candidate| {
            let c = cost(candidate);
            if c < best_cost {
                best_cost = c;
                best = candidate.to_vec();
            }
        });
        best
    } else {
        let mut order = identity;
        loop {
            let mut improved = false;
            for i in 0..n - 1 {
                let mut candidate = order.clone();
                candidate.swap(i, i + 1);
                if cost(&candidate) < cost(&order) {
                    order = candidate;
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }
        order
    }
}

fn permute(arr: &mut [usize], k: usize, visit: &mut impl FnMut(&[usize])) {
    if k == arr.len() {
        visit(arr);
        return;
    }
    for i in k..arr.len() {
        arr.swap(k, i);
        permute(arr, k + 1, visit);
        arr.swap(k, i);
    }
}

fn content_height_of(registry: &Registry, members: &HashSet<Id>) -> f64 {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &id in members {
        if let Some(e) = registry.get(id) {
            min_y = min_y.min(e.rect().top());
            max_y = max_y.max(e.rect().bottom());
        }
    }
    if !min_y.is_finite() {
        0.0
    } else {
        max_y - min_y
    }
}

fn recenter_members(registry: &mut Registry, members: &HashSet<Id>, band_y: f64, band_height: f64) {
    if members.is_empty() {
        return;
    }
    let band_centre = band_y + band_height / 2.0;
    let mut centres: Vec<f64> = members
        .iter()
        .filter_map(|&id| registry.get(id).map(|e| e.rect().center().y))
        .collect();
    if centres.is_empty() {
        return;
    }
    centres.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = centres[centres.len() / 2];
    let dy = band_centre - median;
    if dy.abs() < constants::MOVEMENT_THRESHOLD {
        return;
    }
    let ids: Vec<Id> = members.iter().copied().collect();
    let _ = registry.move_elements(&ids, 0.0, dy);
}

/// Cross-lane staircase routing for a single sequence flow whose source
/// and target sit in different lanes of the same pool (spec.md §4.9).
pub fn staircase_route(
    crossed_lane_boundaries: &[f64],
    source: Point,
    target: Point,
) -> Vec<Point> {
    if crossed_lane_boundaries.len() == 1 {
        let mid_x = (source.x + target.x) / 2.0;
        return vec![
            source,
            Point::new(mid_x, source.y),
            Point::new(mid_x, target.y),
            target,
        ];
    }
    let steps = crossed_lane_boundaries.len();
    let mut route = vec![source];
    let span = target.x - source.x;
    for (i, &boundary_y) in crossed_lane_boundaries.iter().enumerate() {
        let x = source.x + span * (i + 1) as f64 / (steps + 1) as f64;
        let prev_y = route.last().unwrap().y;
        route.push(Point::new(x, prev_y));
        route.push(Point::new(x, boundary_y));
    }
    let last_x = route.last().unwrap().x;
    route.push(Point::new(last_x, target.y));
    route.push(target);
    route
}

/// Clamp every waypoint of an intra-lane sequence flow's route into
/// `[lane_top + margin, lane_bottom - margin]`, grouping near-equal-Y runs
/// so the clamp doesn't break orthogonality (spec.md §4.9).
pub fn clamp_intra_lane(waypoints: &[Point], lane_top: f64, lane_bottom: f64, margin: f64) -> Vec<Point> {
    let min_y = lane_top + margin;
    let max_y = lane_bottom - margin;
    if waypoints.is_empty() {
        return Vec::new();
    }

    let mut out = waypoints.to_vec();
    let mut i = 0;
    while i < out.len() {
        let mut j = i;
        while j + 1 < out.len() && (out[j + 1].y - out[i].y).abs() <= 2.0 {
            j += 1;
        }
        let avg_y: f64 = out[i..=j].iter().map(|p| p.y).sum::<f64>() / (j - i + 1) as f64;
        let clamped = avg_y.clamp(min_y, max_y);
        for p in &mut out[i..=j] {
            p.y = clamped;
        }
        i = j + 1;
    }
    out
}

/// Lanes of one pool, top-to-bottom, with their current band rect and
/// post-assignment membership — the shared lookup both
/// [`route_cross_lane_flows`] and [`clamp_intra_lane_flows`] need.
fn ordered_lane_bands(registry: &Registry, pool_id: Id) -> Vec<(Id, layout_geom::Rect, HashSet<Id>)> {
    let mut lanes: Vec<(Id, layout_geom::Rect, HashSet<Id>)> = registry
        .filter(|e| e.bpmn_type == BpmnType::Lane && e.parent == Some(pool_id))
        .into_iter()
        .map(|l| (l.id, l.rect(), l.flow_node_refs.iter().copied().collect()))
        .collect();
    lanes.sort_by(|a, b| a.1.top().partial_cmp(&b.1.top()).unwrap());
    lanes
}

fn pools_with_lanes(registry: &Registry) -> HashSet<Id> {
    registry
        .filter(|e| e.bpmn_type == BpmnType::Lane)
        .into_iter()
        .filter_map(|l| l.parent)
        .collect()
}

/// Cross-lane staircase routing (spec.md §4.9) applied to every sequence
/// flow whose source and target sit in different lanes of the same pool,
/// run after band assignment has settled lane rects and membership.
pub fn route_cross_lane_flows(registry: &mut Registry) {
    for pool_id in pools_with_lanes(registry) {
        let bands = ordered_lane_bands(registry, pool_id);
        if bands.len() < 2 {
            continue;
        }
        let lane_of = |node: Id| bands.iter().position(|(_, _, members)| members.contains(&node));

        let flow_ids: Vec<Id> = registry
            .filter(|e| e.bpmn_type == BpmnType::SequenceFlow && e.source.is_some() && e.target.is_some())
            .into_iter()
            .map(|e| e.id)
            .collect();

        for flow_id in flow_ids {
            let Some(flow) = registry.get(flow_id) else { continue };
            let (source, target) = (flow.source.unwrap(), flow.target.unwrap());
            let (Some(si), Some(ti)) = (lane_of(source), lane_of(target)) else { continue };
            if si == ti {
                continue;
            }
            let Some(src_el) = registry.get(source) else { continue };
            let Some(tgt_el) = registry.get(target) else { continue };
            if tgt_el.center().x <= src_el.center().x {
                continue;
            }
            let src_point = Point::new(src_el.rect().right(), src_el.center().y);
            let tgt_point = Point::new(tgt_el.rect().left(), tgt_el.center().y);
            let (lo, hi) = (si.min(ti), si.max(ti));
            let crossed: Vec<f64> = (lo..hi).map(|i| bands[i].1.bottom()).collect();
            let route = staircase_route(&crossed, src_point, tgt_point);
            let _ = registry.update_waypoints(flow_id, route);
        }
    }
}

/// Intra-lane clamping (spec.md §4.9) applied to every sequence flow whose
/// source and target share a lane, keeping routed waypoints inside the
/// lane's band after flows may have drifted from earlier passes.
pub fn clamp_intra_lane_flows(registry: &mut Registry, margin: f64) {
    for pool_id in pools_with_lanes(registry) {
        let bands = ordered_lane_bands(registry, pool_id);
        let lane_of = |node: Id| bands.iter().position(|(_, _, members)| members.contains(&node));

        let flow_ids: Vec<Id> = registry
            .filter(|e| e.bpmn_type == BpmnType::SequenceFlow && e.source.is_some() && e.target.is_some())
            .into_iter()
            .map(|e| e.id)
            .collect();

        for flow_id in flow_ids {
            let Some(flow) = registry.get(flow_id) else { continue };
            let (source, target) = (flow.source.unwrap(), flow.target.unwrap());
            let (Some(si), Some(ti)) = (lane_of(source), lane_of(target)) else { continue };
            if si != ti {
                continue;
            }
            let Some(waypoints) = flow.waypoints.clone() else { continue };
            if waypoints.len() < 2 {
                continue;
            }
            let lane_rect = bands[si].1;
            let clamped = clamp_intra_lane(&waypoints, lane_rect.top(), lane_rect.bottom(), margin);
            let _ = registry.update_waypoints(flow_id, clamped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layout_model::Element;

    fn lane(reg: &mut Registry, pool: Id, y: f64, members: Vec<Id>) -> Id {
        let mut e = Element::new(Id(0), BpmnType::Lane);
        e.parent = Some(pool);
        e.y = y;
        e.flow_node_refs = members;
        reg.insert(e)
    }

    fn task(reg: &mut Registry, parent: Id, y: f64) -> Id {
        let mut e = Element::new(Id(0), BpmnType::Task);
        e.parent = Some(parent);
        e.x = 0.0;
        e.y = y;
        e.width = 100.0;
        e.height = 80.0;
        reg.insert(e)
    }

    #[test]
    fn snapshot_captures_member_sets() {
        let mut reg = Registry::new();
        let mut pool = Element::new(Id(0), BpmnType::Participant);
        pool.y = 0.0;
        pool.height = 0.0;
        let pool_id = reg.insert(pool);
        let t1 = task(&mut reg, pool_id, 0.0);
        let _lane1 = lane(&mut reg, pool_id, 0.0, vec![t1]);

        let snapshots = snapshot_lanes(&reg);
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].members.contains(&t1));
    }

    #[test]
    fn band_height_respects_minimum() {
        let mut reg = Registry::new();
        let mut pool = Element::new(Id(0), BpmnType::Participant);
        pool.x = 0.0;
        pool.y = 0.0;
        pool.width = 400.0;
        pool.height = 0.0;
        let pool_id = reg.insert(pool);
        let t1 = task(&mut reg, pool_id, 10.0);
        let lane1 = lane(&mut reg, pool_id, 0.0, vec![t1]);

        let snapshots = snapshot_lanes(&reg);
        assign_bands(&mut reg, &snapshots, true);

        let lane_height = reg.get(lane1).unwrap().rect().height;
        assert!(lane_height >= constants::MIN_LANE_HEIGHT);
    }

    #[test]
    fn staircase_single_crossing_is_z_shape() {
        let route = staircase_route(&[100.0], Point::new(0.0, 50.0), Point::new(200.0, 150.0));
        assert_eq!(route.len(), 4);
    }

    #[test]
    fn intra_lane_clamp_keeps_waypoints_inside_band() {
        let wps = vec![Point::new(0.0, -50.0), Point::new(100.0, -50.0)];
        let clamped = clamp_intra_lane(&wps, 0.0, 100.0, 10.0);
        assert!(clamped.iter().all(|p| p.y >= 10.0 && p.y <= 90.0));
    }

    fn flow(reg: &mut Registry, source: Id, target: Id) -> Id {
        let mut e = Element::new(Id(0), BpmnType::SequenceFlow);
        e.source = Some(source);
        e.target = Some(target);
        e.waypoints = Some(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        reg.insert(e)
    }

    #[test]
    fn cross_lane_flow_gets_staircase_route() {
        let mut reg = Registry::new();
        let mut pool = Element::new(Id(0), BpmnType::Participant);
        pool.x = 0.0;
        pool.y = 0.0;
        pool.width = 400.0;
        let pool_id = reg.insert(pool);
        let t1 = task(&mut reg, pool_id, 10.0);
        let t2 = {
            let mut e = Element::new(Id(0), BpmnType::Task);
            e.parent = Some(pool_id);
            e.x = 300.0;
            e.y = 210.0;
            e.width = 100.0;
            e.height = 80.0;
            reg.insert(e)
        };
        let _lane1 = lane(&mut reg, pool_id, 0.0, vec![t1]);
        let _lane2 = lane(&mut reg, pool_id, 200.0, vec![t2]);
        let f = flow(&mut reg, t1, t2);

        route_cross_lane_flows(&mut reg);
        let wps = reg.get(f).unwrap().waypoints.clone().unwrap();
        assert_eq!(wps.len(), 4);
    }

    #[test]
    fn same_lane_flow_is_untouched_by_cross_lane_routing() {
        let mut reg = Registry::new();
        let mut pool = Element::new(Id(0), BpmnType::Participant);
        pool.x = 0.0;
        pool.y = 0.0;
        pool.width = 400.0;
        let pool_id = reg.insert(pool);
        let t1 = task(&mut reg, pool_id, 10.0);
        let t2 = task(&mut reg, pool_id, 10.0);
        let _lane1 = lane(&mut reg, pool_id, 0.0, vec![t1, t2]);
        let f = flow(&mut reg, t1, t2);

        route_cross_lane_flows(&mut reg);
        let wps = reg.get(f).unwrap().waypoints.clone().unwrap();
        assert_eq!(wps, vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
    }
}
