//! Artifact repositioning (spec.md §4.11): artifacts never go through the
//! oracle, so once the flow settles, groups get resized to fit their
//! content and annotations/data objects get placed relative to whatever
//! they're associated with.

use layout_classify::is_layoutable_shape;
use layout_geom::Rect;
use layout_model::{BpmnType, Id, Modeller, Registry, constants};
use std::collections::HashMap;

/// Resize every group to the bounding box of its layoutable children plus
/// padding. Groups with no layoutable children are left untouched.
pub fn resize_groups(registry: &mut Registry) {
    let group_ids: Vec<Id> = registry
        .filter(|e| e.bpmn_type == BpmnType::Group)
        .into_iter()
        .map(|e| e.id)
        .collect();

    for group_id in group_ids {
        let children = registry.child_ids_of(group_id);
        let mut bounds: Option<Rect> = None;
        for child_id in children {
            let Some(child) = registry.get(child_id) else { continue };
            if !is_layoutable_shape(child.bpmn_type) {
                continue;
            }
            bounds = Some(match bounds {
                Some(b) => b.union(&child.rect()),
                None => child.rect(),
            });
        }
        let Some(bounds) = bounds else { continue };
        let padded = bounds.expand(constants::ARTIFACT_PADDING);
        let _ = registry.resize_shape(group_id, padded);
    }
}

/// Reposition text annotations, data object references, and data store
/// references around the flow element they're associated with, resolving
/// collisions by shifting right then, failing that, further vertically.
pub fn reposition_artifacts(registry: &mut Registry) {
    let associated = associated_element_map(registry);
    let mut by_target: HashMap<Id, Vec<Id>> = HashMap::new();
    let mut unlinked: Vec<Id> = Vec::new();

    for artifact in registry.filter(|e| {
        matches!(
            e.bpmn_type,
            BpmnType::TextAnnotation | BpmnType::DataObjectReference | BpmnType::DataStoreReference
        )
    }) {
        match associated.get(&artifact.id) {
            Some(&target) => by_target.entry(target).or_default().push(artifact.id),
            None => unlinked.push(artifact.id),
        }
    }

    tracing::debug!(target: "artifacts.reposition", linked = by_target.len(), unlinked = unlinked.len(), "repositioning artifacts");
    let flow_bounds = flow_bounding_box(registry);

    for (target_id, artifact_ids) in by_target {
        let Some(target) = registry.get(target_id) else { continue };
        let target_rect = target.rect();
        place_group(registry, &artifact_ids, target_rect);
    }

    if let Some(bounds) = flow_bounds {
        place_unlinked(registry, &unlinked, bounds);
    }
}

fn associated_element_map(registry: &Registry) -> HashMap<Id, Id> {
    let mut map = HashMap::new();
    for assoc in registry.filter(|e| e.bpmn_type == BpmnType::Association) {
        let (Some(source), Some(target)) = (assoc.source, assoc.target) else {
            continue;
        };
        let source_is_artifact = registry
            .get(source)
            .is_some_and(|e| {
                matches!(
                    e.bpmn_type,
                    BpmnType::TextAnnotation | BpmnType::DataObjectReference | BpmnType::DataStoreReference
                )
            });
        if source_is_artifact {
            map.insert(source, target);
        } else {
            map.insert(target, source);
        }
    }
    map
}

fn flow_bounding_box(registry: &Registry) -> Option<Rect> {
    let mut bounds: Option<Rect> = None;
    for e in registry.filter(|e| is_layoutable_shape(e.bpmn_type)) {
        bounds = Some(match bounds {
            Some(b) => b.union(&e.rect()),
            None => e.rect(),
        });
    }
    bounds
}

fn place_group(registry: &mut Registry, artifact_ids: &[Id], anchor: Rect) {
    let mut placed: Vec<Rect> = Vec::new();
    let mut step = 0.0;
    for &id in artifact_ids {
        let Some(el) = registry.get(id) else { continue };
        let (w, h, bpmn_type) = (el.width.max(60.0), el.height.max(30.0), el.bpmn_type);
        let above = bpmn_type == BpmnType::TextAnnotation;
        let base_y = if above {
            anchor.top() - h - constants::ARTIFACT_ABOVE_OFFSET
        } else {
            anchor.bottom() + constants::ARTIFACT_BELOW_OFFSET
        };
        let base_x = anchor.center().x - w / 2.0 + step;
        let rect = resolve_collision(Rect::new(base_x, base_y, w, h), &placed);
        let _ = registry.resize_shape(id, rect);
        placed.push(rect);
        step += w + constants::ARTIFACT_PADDING;
    }
}

fn place_unlinked(registry: &mut Registry, artifact_ids: &[Id], flow_bounds: Rect) {
    let mut placed: Vec<Rect> = Vec::new();
    let mut step = 0.0;
    for &id in artifact_ids {
        let Some(el) = registry.get(id) else { continue };
        let (w, h, bpmn_type) = (el.width.max(60.0), el.height.max(30.0), el.bpmn_type);
        let above = bpmn_type == BpmnType::TextAnnotation;
        let base_y = if above {
            flow_bounds.top() - h - constants::ARTIFACT_ABOVE_OFFSET
        } else {
            flow_bounds.bottom() + constants::ARTIFACT_BELOW_OFFSET
        };
        let base_x = flow_bounds.left() + step;
        let rect = resolve_collision(Rect::new(base_x, base_y, w, h), &placed);
        let _ = registry.resize_shape(id, rect);
        placed.push(rect);
        step += w + constants::ARTIFACT_PADDING;
    }
}

fn resolve_collision(mut rect: Rect, placed: &[Rect]) -> Rect {
    loop {
        let collides = placed.iter().any(|p| p.intersects(&rect));
        if !collides {
            return rect;
        }
        if let Some(blocker) = placed.iter().find(|p| p.intersects(&rect)) {
            rect.x = blocker.right() + constants::ARTIFACT_PADDING;
            if placed.iter().any(|p| p.intersects(&rect)) {
                rect.y += rect.height + constants::ARTIFACT_PADDING;
            }
        } else {
            return rect;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layout_model::Element;

    fn task(reg: &mut Registry, x: f64, y: f64) -> Id {
        let mut e = Element::new(Id(0), BpmnType::Task);
        e.x = x;
        e.y = y;
        e.width = 100.0;
        e.height = 80.0;
        reg.insert(e)
    }

    #[test]
    fn group_resizes_to_enclose_children() {
        let mut reg = Registry::new();
        let group = Element::new(Id(0), BpmnType::Group);
        let group_id = reg.insert(group);
        let t1 = task(&mut reg, 0.0, 0.0);
        reg.get_mut(t1).unwrap().parent = Some(group_id);
        let t2 = task(&mut reg, 300.0, 200.0);
        reg.get_mut(t2).unwrap().parent = Some(group_id);

        resize_groups(&mut reg);
        let rect = reg.get(group_id).unwrap().rect();
        assert!(rect.width >= 400.0);
        assert!(rect.height >= 280.0);
    }

    #[test]
    fn annotation_placed_above_associated_task() {
        let mut reg = Registry::new();
        let t1 = task(&mut reg, 0.0, 100.0);
        let mut ann = Element::new(Id(0), BpmnType::TextAnnotation);
        ann.width = 80.0;
        ann.height = 40.0;
        let ann_id = reg.insert(ann);
        let mut assoc = Element::new(Id(0), BpmnType::Association);
        assoc.source = Some(ann_id);
        assoc.target = Some(t1);
        assoc.waypoints = Some(vec![]);
        reg.insert(assoc);

        reposition_artifacts(&mut reg);
        let ann_rect = reg.get(ann_id).unwrap().rect();
        let task_rect = reg.get(t1).unwrap().rect();
        assert!(ann_rect.bottom() <= task_rect.top());
    }
}
