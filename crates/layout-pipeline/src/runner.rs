//! The pipeline runner (C13): times and logs every step, optionally
//! counting how many elements a step moved by more than
//! [`constants::MOVEMENT_THRESHOLD`] on either axis (spec.md §4.13).
//!
//! Stderr emission goes through `tracing` and is gated by whatever
//! `RUST_LOG`/`EnvFilter` the embedding binary installs; the in-memory
//! [`PipelineLog`] is always collected, independent of logging
//! configuration, so tests can assert on step outcomes without capturing
//! stderr.

use layout_model::{Id, Registry, constants};
use std::future::Future;
use std::time::{Duration, Instant};

/// One step's recorded outcome.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: &'static str,
    pub duration: Duration,
    pub skipped: bool,
    /// `Some(count)` when the step asked for delta tracking; `None`
    /// otherwise (most snapshot/read-only steps don't track deltas).
    pub elements_moved: Option<usize>,
}

/// The full, ordered record of a `run_layout` call.
#[derive(Debug, Clone, Default)]
pub struct PipelineLog {
    records: Vec<StepRecord>,
}

impl PipelineLog {
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn total_duration(&self) -> Duration {
        self.records.iter().map(|r| r.duration).sum()
    }

    pub fn find(&self, name: &str) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.name == name)
    }
}

/// Owns the registry for the duration of a layout call and drives each
/// step through it, matching spec.md §5's "exclusively owned by the
/// driver" resource policy.
pub(crate) struct PipelineRunner<'a> {
    registry: &'a mut Registry,
    log: PipelineLog,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(registry: &'a mut Registry) -> Self {
        Self {
            registry,
            log: PipelineLog::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    fn snapshot(&self) -> Vec<(Id, f64, f64)> {
        self.registry.get_all().iter().map(|e| (e.id, e.x, e.y)).collect()
    }

    fn count_moved(&self, before: &[(Id, f64, f64)]) -> usize {
        before
            .iter()
            .filter(|&&(id, x, y)| {
                self.registry.get(id).is_some_and(|e| {
                    (e.x - x).abs() > constants::MOVEMENT_THRESHOLD
                        || (e.y - y).abs() > constants::MOVEMENT_THRESHOLD
                })
            })
            .count()
    }

    fn record(&mut self, name: &'static str, duration: Duration, skipped: bool, moved: Option<usize>) {
        tracing::debug!(
            target: "pipeline.step",
            name,
            duration_us = duration.as_micros() as u64,
            skipped,
            moved = ?moved,
            "step complete"
        );
        self.log.records.push(StepRecord {
            name,
            duration,
            skipped,
            elements_moved: moved,
        });
    }

    /// Run an infallible step, optionally tracking how many elements moved.
    pub fn step<T>(&mut self, name: &'static str, track_delta: bool, f: impl FnOnce(&mut Registry) -> T) -> T {
        let before = track_delta.then(|| self.snapshot());
        let start = Instant::now();
        let result = f(self.registry);
        let duration = start.elapsed();
        let moved = before.map(|b| self.count_moved(&b));
        self.record(name, duration, false, moved);
        result
    }

    /// Run a fallible step. Errors still get logged (duration and, if
    /// requested, a moved count reflecting whatever partial mutation
    /// happened before the failure) before propagating.
    pub fn try_step<T, E>(
        &mut self,
        name: &'static str,
        track_delta: bool,
        f: impl FnOnce(&mut Registry) -> Result<T, E>,
    ) -> Result<T, E> {
        let before = track_delta.then(|| self.snapshot());
        let start = Instant::now();
        let result = f(self.registry);
        let duration = start.elapsed();
        let moved = before.map(|b| self.count_moved(&b));
        self.record(name, duration, false, moved);
        result
    }

    /// Run the one step allowed to suspend (spec.md §5: "the only
    /// suspension point is the call to the external layered-layout
    /// oracle").
    pub async fn step_async<T, E, Fut>(&mut self, name: &'static str, track_delta: bool, fut: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let before = track_delta.then(|| self.snapshot());
        let start = Instant::now();
        let result = fut.await;
        let duration = start.elapsed();
        let moved = before.map(|b| self.count_moved(&b));
        self.record(name, duration, false, moved);
        result
    }

    /// Record a skipped step without running it (spec.md §4.13's skip
    /// predicate path).
    #[allow(dead_code)]
    pub fn skip(&mut self, name: &'static str) {
        tracing::debug!(target: "pipeline.step", name, "skipped");
        self.record(name, Duration::ZERO, true, None);
    }

    pub fn finish(self) -> PipelineLog {
        tracing::info!(
            target: "pipeline",
            steps = self.log.records.len(),
            total_us = self.log.total_duration().as_micros() as u64,
            "layout pipeline finished"
        );
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layout_model::{BpmnType, Element};

    #[test]
    fn step_without_tracking_leaves_moved_count_none() {
        let mut reg = Registry::new();
        let mut runner = PipelineRunner::new(&mut reg);
        runner.step("noop", false, |_| {});
        let record = &runner.log.records()[0];
        assert!(record.elements_moved.is_none());
        assert!(!record.skipped);
    }

    #[test]
    fn step_with_tracking_counts_moved_elements() {
        let mut reg = Registry::new();
        let a = reg.insert(Element::new(Id(0), BpmnType::Task));
        let mut runner = PipelineRunner::new(&mut reg);
        runner.step("move", true, |r| {
            use layout_model::Modeller;
            let _ = r.direct_move(a, 50.0, 50.0);
        });
        let record = runner.log.records()[0].clone();
        assert_eq!(record.elements_moved, Some(1));
    }

    #[test]
    fn skip_records_skipped_flag() {
        let mut reg = Registry::new();
        let mut runner = PipelineRunner::new(&mut reg);
        runner.skip("not_applicable");
        assert!(runner.log.records()[0].skipped);
    }
}
