//! Pure predicates over [`BpmnType`], used everywhere a pass needs to decide
//! whether an element participates in layout, routing, or just rides along
//! (spec.md §4.2).

use layout_model::BpmnType;

/// Sequence flow, message flow, association, or data-association.
pub fn is_connection(t: BpmnType) -> bool {
    matches!(
        t,
        BpmnType::SequenceFlow
            | BpmnType::MessageFlow
            | BpmnType::Association
            | BpmnType::DataAssociation
    )
}

/// Process/collaboration/label/plane/diagram — structural, never laid out.
pub fn is_infrastructure(t: BpmnType) -> bool {
    matches!(
        t,
        BpmnType::Process
            | BpmnType::Collaboration
            | BpmnType::Label
            | BpmnType::Plane
            | BpmnType::Diagram
    )
}

/// Text annotation, data object/store reference, or group.
pub fn is_artifact(t: BpmnType) -> bool {
    matches!(
        t,
        BpmnType::TextAnnotation
            | BpmnType::DataObjectReference
            | BpmnType::DataStoreReference
            | BpmnType::Group
    )
}

pub fn is_lane(t: BpmnType) -> bool {
    matches!(t, BpmnType::Lane)
}

pub fn is_participant(t: BpmnType) -> bool {
    matches!(t, BpmnType::Participant)
}

pub fn is_boundary_event(t: BpmnType) -> bool {
    matches!(t, BpmnType::BoundaryEvent)
}

pub fn is_gateway(t: BpmnType) -> bool {
    matches!(
        t,
        BpmnType::ExclusiveGateway
            | BpmnType::InclusiveGateway
            | BpmnType::ParallelGateway
            | BpmnType::EventBasedGateway
    )
}

pub fn is_event(t: BpmnType) -> bool {
    matches!(
        t,
        BpmnType::StartEvent
            | BpmnType::EndEvent
            | BpmnType::IntermediateEvent
            | BpmnType::BoundaryEvent
    )
}

pub fn is_container(t: BpmnType) -> bool {
    matches!(
        t,
        BpmnType::SubProcess | BpmnType::Participant | BpmnType::CallActivity
    )
}

/// Not infrastructure, not a connection, not an artifact, not a lane, not a
/// participant, not a boundary event — i.e. something the graph builder
/// submits to the oracle as an ordinary node (spec.md §4.2).
pub fn is_layoutable_shape(t: BpmnType) -> bool {
    !is_infrastructure(t)
        && !is_connection(t)
        && !is_artifact(t)
        && !is_lane(t)
        && !is_participant(t)
        && !is_boundary_event(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_flow_is_connection_not_layoutable() {
        assert!(is_connection(BpmnType::SequenceFlow));
        assert!(!is_layoutable_shape(BpmnType::SequenceFlow));
    }

    #[test]
    fn task_is_layoutable() {
        assert!(is_layoutable_shape(BpmnType::Task));
        assert!(!is_connection(BpmnType::Task));
        assert!(!is_artifact(BpmnType::Task));
    }

    #[test]
    fn boundary_event_excluded_from_layoutable() {
        assert!(is_boundary_event(BpmnType::BoundaryEvent));
        assert!(!is_layoutable_shape(BpmnType::BoundaryEvent));
    }

    #[test]
    fn participant_excluded_from_layoutable() {
        assert!(is_participant(BpmnType::Participant));
        assert!(!is_layoutable_shape(BpmnType::Participant));
    }

    #[test]
    fn group_is_artifact() {
        assert!(is_artifact(BpmnType::Group));
        assert!(!is_layoutable_shape(BpmnType::Group));
    }
}
