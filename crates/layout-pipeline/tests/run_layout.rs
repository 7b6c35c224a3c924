use layout_config::{Overrides, resolve};
use layout_model::{BpmnType, Element, Id, Registry};
use layout_oracle::reference::ReferenceOracle;
use layout_oracle::{LayeredLayoutOracle, LayeringStrategy, OracleError, OracleResult};
use layout_pipeline::{LayoutError, run_layout};
use std::sync::Mutex;

fn build_linear_diagram() -> (Registry, Id) {
    let mut reg = Registry::new();
    let canvas = {
        let e = Element::new(Id(0), BpmnType::Process);
        reg.insert(e)
    };
    let mut start = Element::new(Id(0), BpmnType::StartEvent);
    start.parent = Some(canvas);
    start.width = 36.0;
    start.height = 36.0;
    let start = reg.insert(start);

    let mut task = Element::new(Id(0), BpmnType::Task);
    task.parent = Some(canvas);
    task.width = 100.0;
    task.height = 80.0;
    let task = reg.insert(task);

    let mut end = Element::new(Id(0), BpmnType::EndEvent);
    end.parent = Some(canvas);
    end.width = 36.0;
    end.height = 36.0;
    let end = reg.insert(end);

    for (s, t) in [(start, task), (task, end)] {
        let mut flow = Element::new(Id(0), BpmnType::SequenceFlow);
        flow.parent = Some(canvas);
        flow.source = Some(s);
        flow.target = Some(t);
        flow.waypoints = Some(vec![]);
        reg.insert(flow);
    }
    (reg, canvas)
}

#[tokio::test]
async fn linear_diagram_lays_out_without_error() {
    let (mut reg, canvas) = build_linear_diagram();
    let resolved = resolve(&Default::default(), &Overrides::default());
    let report = run_layout(&mut reg, canvas, &ReferenceOracle::new(), &resolved)
        .await
        .unwrap();

    assert!(!report.log.records().is_empty());
    for el in reg.get_all() {
        if let Some(wps) = &el.waypoints {
            assert!(wps.len() >= 2);
        }
    }
}

#[tokio::test]
async fn run_layout_is_deterministic() {
    let (mut a, canvas_a) = build_linear_diagram();
    let (mut b, canvas_b) = build_linear_diagram();
    let resolved = resolve(&Default::default(), &Overrides::default());
    let oracle = ReferenceOracle::new();

    run_layout(&mut a, canvas_a, &oracle, &resolved).await.unwrap();
    run_layout(&mut b, canvas_b, &oracle, &resolved).await.unwrap();

    for (ea, eb) in a.get_all().iter().zip(b.get_all().iter()) {
        assert_eq!(ea.x, eb.x);
        assert_eq!(ea.y, eb.y);
        assert_eq!(ea.waypoints, eb.waypoints);
    }
}

#[tokio::test]
async fn scoped_relayout_rejects_unknown_scope() {
    let (mut reg, canvas) = build_linear_diagram();
    let resolved = resolve(
        &Default::default(),
        &Overrides {
            scope_element_id: Some(Id(9999)),
            ..Default::default()
        },
    );
    let err = run_layout(&mut reg, canvas, &ReferenceOracle::new(), &resolved)
        .await
        .unwrap_err();
    assert!(matches!(err, LayoutError::ScopeNotFound(Id(9999))));
}

/// Wraps the reference oracle and records the `layering_strategy` it was
/// last invoked with, so the test below can assert on what `run_layout`
/// actually resolved rather than on the caller's own `ResolvedOptions`.
#[derive(Default)]
struct RecordingOracle {
    inner: ReferenceOracle,
    seen_strategy: Mutex<Option<LayeringStrategy>>,
}

impl LayeredLayoutOracle for RecordingOracle {
    async fn run(
        &self,
        graph: &layout_graph::GraphNode,
        options: &layout_oracle::LayoutOptions,
    ) -> Result<OracleResult, OracleError> {
        *self.seen_strategy.lock().unwrap() = Some(options.layering_strategy);
        self.inner.run(graph, options).await
    }
}

#[tokio::test]
async fn scoped_relayout_forces_interactive_layering_strategy() {
    let (mut reg, canvas) = build_linear_diagram();
    let resolved = resolve(
        &Default::default(),
        &Overrides {
            scope_element_id: Some(canvas),
            ..Default::default()
        },
    );
    // Deliberately not calling `layout_config::apply_scope_strategy` here:
    // `run_layout` itself must enforce the interactive strategy for a
    // scoped re-layout, not just the config-resolution helper.
    let oracle = RecordingOracle::default();
    run_layout(&mut reg, canvas, &oracle, &resolved).await.unwrap();
    assert_eq!(*oracle.seen_strategy.lock().unwrap(), Some(LayeringStrategy::Interactive));
}

#[tokio::test]
async fn running_twice_is_idempotent_within_a_pixel() {
    let (mut reg, canvas) = build_linear_diagram();
    let resolved = resolve(&Default::default(), &Overrides::default());
    let oracle = ReferenceOracle::new();

    run_layout(&mut reg, canvas, &oracle, &resolved).await.unwrap();
    let first: Vec<(f64, f64)> = reg.get_all().iter().map(|e| (e.x, e.y)).collect();

    run_layout(&mut reg, canvas, &oracle, &resolved).await.unwrap();
    let second: Vec<(f64, f64)> = reg.get_all().iter().map(|e| (e.x, e.y)).collect();

    for ((x1, y1), (x2, y2)) in first.iter().zip(second.iter()) {
        assert!((x1 - x2).abs() <= 1.0);
        assert!((y1 - y2).abs() <= 1.0);
    }
}
