//! Boundary-event save/restore/repositioning (spec.md §4.10).
//!
//! Boundary events are attached to a host shape's border, not laid out as
//! independent nodes. A headless bulk-move can occasionally reclassify one
//! mid-pipeline (spec.md §9); this crate snapshots the attachment up front
//! so it can be restored, and always repositions afterward using the
//! modeller's direct-write path, never a bulk move.

use layout_geom::{Point, Rect};
use layout_model::{BpmnType, Id, Modeller, Registry};

/// `(event_id, host_id)` captured before any pass that could disturb a
/// boundary event's type or attachment.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryEventSnapshot {
    pub event_id: Id,
    pub host_id: Id,
}

pub fn snapshot_boundary_events(registry: &Registry) -> Vec<BoundaryEventSnapshot> {
    registry
        .filter(|e| e.bpmn_type == BpmnType::BoundaryEvent)
        .into_iter()
        .filter_map(|e| {
            e.host.map(|host_id| BoundaryEventSnapshot {
                event_id: e.id,
                host_id,
            })
        })
        .collect()
}

/// Rewrite any snapshotted boundary event whose type or host attachment
/// was mutated during intermediate passes back to its snapshotted state.
pub fn restore_boundary_events(registry: &mut Registry, snapshots: &[BoundaryEventSnapshot]) {
    for snap in snapshots {
        let Some(el) = registry.get_mut(snap.event_id) else { continue };
        if el.bpmn_type != BpmnType::BoundaryEvent || el.host != Some(snap.host_id) {
            el.bpmn_type = BpmnType::BoundaryEvent;
            el.host = Some(snap.host_id);
            el.business_object
                .extensions
                .insert("restoredBoundaryEvent".to_string(), "true".to_string());
            tracing::debug!(
                target: "boundary.restore",
                event = snap.event_id.0,
                host = snap.host_id.0,
                "restored boundary event attachment"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Border {
    Top,
    Bottom,
    Left,
    Right,
}

fn choose_border(host: Rect, target: Option<Point>) -> Border {
    let Some(target) = target else { return Border::Bottom };
    let dx = target.x - host.center().x;
    let dy = target.y - host.center().y;
    if dy.abs() > host.height / 2.0 && dy.abs() > dx.abs() && dy < 0.0 {
        Border::Top
    } else if dx.abs() > dy.abs() && dx < 0.0 {
        Border::Left
    } else if dx > 0.0 && dy.abs() < host.height {
        Border::Right
    } else {
        Border::Bottom
    }
}

fn border_point(host: Rect, border: Border) -> Point {
    match border {
        Border::Top => Point::new(host.x + 0.67 * host.width, host.top()),
        Border::Bottom => Point::new(host.center().x, host.bottom()),
        Border::Left => Point::new(host.left(), host.y + 0.67 * host.height),
        Border::Right => Point::new(host.right(), host.y + 0.67 * host.height),
    }
}

/// First outgoing sequence/message flow's target centre, if any.
fn first_outgoing_target_centre(registry: &Registry, event_id: Id) -> Option<Point> {
    let out = registry
        .filter(|e| e.is_connection() && e.source == Some(event_id))
        .into_iter()
        .min_by_key(|e| e.id.0)?;
    let target_id = out.target?;
    registry.get(target_id).map(|e| e.center())
}

/// Reposition every boundary event onto its chosen host border, moving it
/// (and its label shape, if any) by direct write only. `force` mirrors
/// spec.md §4.10: always reposition after a full pipeline run; during
/// incidental passes only reposition if the event has drifted past
/// `tolerance`.
pub fn reposition_boundary_events(registry: &mut Registry, force: bool, tolerance: f64) {
    let event_ids: Vec<Id> = registry
        .filter(|e| e.bpmn_type == BpmnType::BoundaryEvent && e.host.is_some())
        .into_iter()
        .map(|e| e.id)
        .collect();

    for event_id in event_ids {
        let Some(event) = registry.get(event_id) else { continue };
        let Some(host_id) = event.host else { continue };
        let Some(host) = registry.get(host_id) else { continue };
        let host_rect = host.rect();

        let target_centre = first_outgoing_target_centre(registry, event_id);
        let border = choose_border(host_rect, target_centre);
        let anchor = border_point(host_rect, border);

        let event = registry.get(event_id).unwrap();
        let current_centre = event.center();
        let desired_centre = anchor;
        let drift = current_centre.distance_to(desired_centre);
        if !force && drift <= tolerance {
            continue;
        }

        let dx = desired_centre.x - current_centre.x;
        let dy = desired_centre.y - current_centre.y;
        let (width, height, label) = {
            let e = registry.get(event_id).unwrap();
            (e.width, e.height, e.label)
        };
        let new_x = desired_centre.x - width / 2.0;
        let new_y = desired_centre.y - height / 2.0;
        let _ = registry.direct_move(event_id, new_x, new_y);

        if let Some(label_id) = label {
            if let Some(label_el) = registry.get(label_id) {
                let (lx, ly) = (label_el.x, label_el.y);
                let _ = registry.direct_move(label_id, lx + dx, ly + dy);
            }
        }
    }
}
