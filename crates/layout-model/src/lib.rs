//! The element registry: the single mutable owner of a BPMN diagram's
//! geometry for the lifetime of a layout call (spec.md §3).
//!
//! Elements live in an arena keyed by [`Id`]; parent/host/source/target/lane
//! membership are all `Id`s into the same arena, so the naturally cyclic
//! BPMN element graph (containment, attachment, connection, lane
//! membership) needs no reference counting (spec.md §9).

pub mod constants;

use layout_geom::{Point, Rect};
use std::collections::BTreeMap;
use thiserror::Error;

/// An opaque handle into a [`Registry`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Id(pub u32);

/// The BPMN-semantic type tag carried by every element (spec.md glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BpmnType {
    StartEvent,
    EndEvent,
    IntermediateEvent,
    BoundaryEvent,
    Task,
    SubProcess,
    CallActivity,
    ExclusiveGateway,
    InclusiveGateway,
    ParallelGateway,
    EventBasedGateway,
    SequenceFlow,
    MessageFlow,
    Association,
    DataAssociation,
    Participant,
    Lane,
    TextAnnotation,
    DataObjectReference,
    DataStoreReference,
    Group,
    Process,
    Collaboration,
    Label,
    Plane,
    Diagram,
}

/// BPMN-semantic payload carried alongside geometry (spec.md §3: "a
/// `businessObject` carrying the BPMN-semantic type and extension
/// properties").
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BusinessObject {
    pub name: Option<String>,
    /// Free-form extension properties; a `BTreeMap` keeps iteration order
    /// deterministic, which the determinism property in spec.md §8 relies on
    /// transitively wherever extensions influence layout decisions.
    pub extensions: BTreeMap<String, String>,
}

/// A single node or connection in the diagram.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Element {
    pub id: Id,
    pub bpmn_type: BpmnType,
    pub parent: Option<Id>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Present only for connections; always `len() >= 2` once committed.
    pub waypoints: Option<Vec<Point>>,
    /// Present only for boundary events.
    pub host: Option<Id>,
    /// Present only for connections.
    pub source: Option<Id>,
    pub target: Option<Id>,
    /// Present only for lanes: member flow-node ids.
    pub flow_node_refs: Vec<Id>,
    /// Present only for an element that has a separate label shape.
    pub label: Option<Id>,
    pub business_object: BusinessObject,
}

impl Element {
    pub fn new(id: Id, bpmn_type: BpmnType) -> Self {
        Self {
            id,
            bpmn_type,
            parent: None,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            waypoints: None,
            host: None,
            source: None,
            target: None,
            flow_node_refs: Vec::new(),
            label: None,
            business_object: BusinessObject::default(),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> Point {
        self.rect().center()
    }

    pub fn is_connection(&self) -> bool {
        self.waypoints.is_some()
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ModellerError {
    #[error("element {0:?} not found in registry")]
    NotFound(Id),
    #[error("waypoint sequence for {0:?} would have fewer than 2 points after commit")]
    TooFewWaypoints(Id),
    #[error("waypoint sequence for {0:?} contains a non-finite coordinate")]
    NonFiniteGeometry(Id),
    #[error("{0:?} is not a connection")]
    NotAConnection(Id),
}

/// Capability surface passes use to mutate geometry (spec.md §9: "Modeller
/// side effects" — distinguishes direct geometry writes from
/// modeller-mediated writes).
pub trait Modeller {
    /// Move a set of elements by `(dx, dy)`. May trigger mediated side
    /// effects a real bpmn-js-backed modeller would perform (re-syncing DI,
    /// and — in the corrupting headless scenario spec.md §9 calls out —
    /// occasionally reclassifying an attached boundary event).
    fn move_elements(&mut self, ids: &[Id], dx: f64, dy: f64) -> Result<(), ModellerError>;
    /// Resize a shape to an absolute rect.
    fn resize_shape(&mut self, id: Id, rect: Rect) -> Result<(), ModellerError>;
    /// Replace a connection's waypoints. Rejects (leaving prior waypoints in
    /// place) if the result would have fewer than 2 points or any
    /// non-finite coordinate (spec.md §7 invariant violation handling).
    fn update_waypoints(&mut self, id: Id, waypoints: Vec<Point>) -> Result<(), ModellerError>;
    /// Re-run border/DI synchronisation for a connection without changing
    /// its waypoints (a no-op for this in-process implementation, since
    /// there is no separate DI layer to resync).
    fn layout_connection(&mut self, id: Id) -> Result<(), ModellerError>;
    /// Move a single element to an absolute position by writing `x, y`
    /// directly, bypassing any bulk-move side effects. Used by boundary
    /// event repositioning (spec.md §4.10) so it never risks triggering
    /// the reclassification corruption a bulk move can.
    fn direct_move(&mut self, id: Id, x: f64, y: f64) -> Result<(), ModellerError>;
}

/// Owns the full set of elements for the lifetime of a layout call.
#[derive(Debug, Default)]
pub struct Registry {
    elements: Vec<Option<Element>>,
    /// Test/diagnostic knob: when true, `move_elements` simulates the
    /// headless bulk-move corruption described in spec.md §9 by flipping
    /// any moved boundary event's type to `IntermediateEvent` and clearing
    /// its host. Defaults to `false`; production callers never need it.
    pub simulate_bulk_move_corruption: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut element: Element) -> Id {
        let id = Id(self.elements.len() as u32);
        element.id = id;
        self.elements.push(Some(element));
        id
    }

    pub fn get(&self, id: Id) -> Option<&Element> {
        self.elements.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut Element> {
        self.elements.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn remove(&mut self, id: Id) -> Option<Element> {
        self.elements.get_mut(id.0 as usize)?.take()
    }

    pub fn get_all(&self) -> Vec<&Element> {
        self.elements.iter().filter_map(|e| e.as_ref()).collect()
    }

    pub fn filter(&self, pred: impl Fn(&Element) -> bool) -> Vec<&Element> {
        self.elements
            .iter()
            .filter_map(|e| e.as_ref())
            .filter(|e| pred(e))
            .collect()
    }

    pub fn children_of(&self, parent: Id) -> Vec<&Element> {
        self.filter(|e| e.parent == Some(parent))
    }

    /// Direct children that are not yet tombstoned by id (cheaper than
    /// cloning `Element`s when only ids are needed downstream).
    pub fn child_ids_of(&self, parent: Id) -> Vec<Id> {
        self.children_of(parent).into_iter().map(|e| e.id).collect()
    }
}

impl Modeller for Registry {
    fn move_elements(&mut self, ids: &[Id], dx: f64, dy: f64) -> Result<(), ModellerError> {
        for &id in ids {
            let corrupt = self.simulate_bulk_move_corruption
                && self
                    .get(id)
                    .is_some_and(|e| e.bpmn_type == BpmnType::BoundaryEvent);
            let element = self.get_mut(id).ok_or(ModellerError::NotFound(id))?;
            element.x += dx;
            element.y += dy;
            if corrupt {
                element.bpmn_type = BpmnType::IntermediateEvent;
                element.host = None;
                tracing::debug!(target: "model.modeller", element = id.0, "bulk_move_corrupted_boundary_event");
            }
        }
        Ok(())
    }

    fn resize_shape(&mut self, id: Id, rect: Rect) -> Result<(), ModellerError> {
        let element = self.get_mut(id).ok_or(ModellerError::NotFound(id))?;
        element.x = rect.x;
        element.y = rect.y;
        element.width = rect.width;
        element.height = rect.height;
        Ok(())
    }

    fn update_waypoints(&mut self, id: Id, waypoints: Vec<Point>) -> Result<(), ModellerError> {
        if waypoints.len() < 2 {
            return Err(ModellerError::TooFewWaypoints(id));
        }
        if waypoints.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ModellerError::NonFiniteGeometry(id));
        }
        let element = self.get_mut(id).ok_or(ModellerError::NotFound(id))?;
        element.waypoints = Some(waypoints);
        Ok(())
    }

    fn layout_connection(&mut self, id: Id) -> Result<(), ModellerError> {
        if self.get(id).is_none() {
            return Err(ModellerError::NotFound(id));
        }
        Ok(())
    }

    fn direct_move(&mut self, id: Id, x: f64, y: f64) -> Result<(), ModellerError> {
        let element = self.get_mut(id).ok_or(ModellerError::NotFound(id))?;
        element.x = x;
        element.y = y;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(reg: &mut Registry, x: f64, y: f64) -> Id {
        let mut e = Element::new(Id(0), BpmnType::Task);
        e.x = x;
        e.y = y;
        e.width = constants::DEFAULT_TASK_WIDTH;
        e.height = constants::DEFAULT_TASK_HEIGHT;
        reg.insert(e)
    }

    #[test]
    fn insert_assigns_stable_ids() {
        let mut reg = Registry::new();
        let a = task(&mut reg, 0.0, 0.0);
        let b = task(&mut reg, 100.0, 0.0);
        assert_ne!(a, b);
        assert_eq!(reg.get(a).unwrap().id, a);
    }

    #[test]
    fn update_waypoints_rejects_short_sequence() {
        let mut reg = Registry::new();
        let a = task(&mut reg, 0.0, 0.0);
        let err = reg.update_waypoints(a, vec![Point::new(0.0, 0.0)]).unwrap_err();
        assert_eq!(err, ModellerError::TooFewWaypoints(a));
    }

    #[test]
    fn update_waypoints_rejects_nan() {
        let mut reg = Registry::new();
        let a = task(&mut reg, 0.0, 0.0);
        let err = reg
            .update_waypoints(a, vec![Point::new(f64::NAN, 0.0), Point::new(1.0, 1.0)])
            .unwrap_err();
        assert_eq!(err, ModellerError::NonFiniteGeometry(a));
    }

    #[test]
    fn bulk_move_corrupts_boundary_event_when_simulated() {
        let mut reg = Registry::new();
        let host = task(&mut reg, 0.0, 0.0);
        let mut be = Element::new(Id(0), BpmnType::BoundaryEvent);
        be.host = Some(host);
        let be_id = reg.insert(be);
        reg.simulate_bulk_move_corruption = true;
        reg.move_elements(&[be_id], 5.0, 5.0).unwrap();
        let e = reg.get(be_id).unwrap();
        assert_eq!(e.bpmn_type, BpmnType::IntermediateEvent);
        assert!(e.host.is_none());
    }

    #[test]
    fn direct_move_never_corrupts() {
        let mut reg = Registry::new();
        let host = task(&mut reg, 0.0, 0.0);
        let mut be = Element::new(Id(0), BpmnType::BoundaryEvent);
        be.host = Some(host);
        let be_id = reg.insert(be);
        reg.simulate_bulk_move_corruption = true;
        reg.direct_move(be_id, 10.0, 10.0).unwrap();
        let e = reg.get(be_id).unwrap();
        assert_eq!(e.bpmn_type, BpmnType::BoundaryEvent);
        assert_eq!(e.host, Some(host));
    }
}
