//! Exercises C6 -> C7 -> C8 end to end against a small hand-built diagram,
//! without going through the oracle (routing synthesizes its own L-routes
//! when no section map entry exists for a connection).

use layout_model::{BpmnType, Element, Id, Registry};
use layout_routing::{avoid_obstacles, route_connections, run_passes};
use std::collections::HashMap;

fn task(reg: &mut Registry, x: f64, y: f64) -> Id {
    let mut e = Element::new(Id(0), BpmnType::Task);
    e.x = x;
    e.y = y;
    e.width = 100.0;
    e.height = 80.0;
    reg.insert(e)
}

fn flow(reg: &mut Registry, source: Id, target: Id) -> Id {
    let mut e = Element::new(Id(0), BpmnType::SequenceFlow);
    e.source = Some(source);
    e.target = Some(target);
    e.waypoints = Some(vec![]);
    reg.insert(e)
}

#[test]
fn linear_chain_ends_with_orthogonal_connected_waypoints() {
    let mut reg = Registry::new();
    let a = task(&mut reg, 0.0, 0.0);
    let b = task(&mut reg, 300.0, 0.0);
    let c = task(&mut reg, 600.0, 200.0);
    let ab = flow(&mut reg, a, b);
    let bc = flow(&mut reg, b, c);

    route_connections(&mut reg, &HashMap::new());
    run_passes(&mut reg);
    avoid_obstacles(&mut reg);

    for id in [ab, bc] {
        let wps = reg.get(id).unwrap().waypoints.clone().unwrap();
        assert!(wps.len() >= 2);
        assert!(layout_geom::is_orthogonal(&wps, 0.5));
    }
}

#[test]
fn detour_survives_downstream_passes() {
    let mut reg = Registry::new();
    let a = task(&mut reg, 0.0, 100.0);
    let b = task(&mut reg, 400.0, 100.0);
    let _blocker = {
        let mut blocker = Element::new(Id(0), BpmnType::Task);
        blocker.x = 200.0;
        blocker.y = 90.0;
        blocker.width = 100.0;
        blocker.height = 100.0;
        reg.insert(blocker)
    };
    let ab = flow(&mut reg, a, b);

    route_connections(&mut reg, &HashMap::new());
    run_passes(&mut reg);
    avoid_obstacles(&mut reg);

    let wps = reg.get(ab).unwrap().waypoints.clone().unwrap();
    let blocker_rect = layout_geom::Rect::new(200.0, 90.0, 100.0, 100.0);
    for pair in wps.windows(2) {
        assert!(!layout_geom::segment_intersects_rect(pair[0], pair[1], &blocker_rect));
    }
}
