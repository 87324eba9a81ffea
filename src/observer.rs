//! Observability hooks for the solve loop.
//!
//! Observers are notified synchronously from [`Ddp::solve`](crate::Ddp::solve);
//! every method has a no-op default so an observer only implements the events
//! it cares about.

use crate::ddp::{LineSearch, SolveStatus};
use std::cell::RefCell;
use std::rc::Rc;

/// Summary of one accepted outer iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationInfo {
    /// 1-based iteration number.
    pub iteration: usize,
    pub cost: f64,
    /// Previous accepted cost minus `cost` (infinite on the first iteration).
    pub improvement: f64,
    /// Step scale accepted by the line search.
    pub step: f64,
    pub regularization: u32,
}

pub trait DdpObserver {
    /// A backward sweep finished at the given regularization level.
    fn on_backward_pass(&mut self, _regularization: u32) {}
    /// `Quu` was ill-posed and the sweep restarts at `level`.
    fn on_regularize(&mut self, _level: u32) {}
    fn on_forward_pass(&mut self, _result: &LineSearch) {}
    fn on_iteration(&mut self, _info: &IterationInfo) {}
    fn on_finish(&mut self, _status: SolveStatus) {}
}

/// Forwards every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl DdpObserver for LogObserver {
    fn on_backward_pass(&mut self, regularization: u32) {
        log::debug!("backward pass done (regulate = {regularization})");
    }

    fn on_regularize(&mut self, level: u32) {
        log::warn!("Quu is not positive-definite, regulate -> {level}");
    }

    fn on_forward_pass(&mut self, result: &LineSearch) {
        match result {
            LineSearch::Accepted { step, cost, trials } => {
                log::debug!("forward pass accepted a = {step:.4} after {trials} trial(s), cost = {cost:.6}")
            }
            LineSearch::Exhausted => log::warn!("forward pass: line search exhausted"),
        }
    }

    fn on_iteration(&mut self, info: &IterationInfo) {
        log::info!(
            "iter {:4}: total_cost = {:.6e}, improvement = {:.3e}, a = {:.4}, regulate = {}",
            info.iteration,
            info.cost,
            info.improvement,
            info.step,
            info.regularization
        );
    }

    fn on_finish(&mut self, status: SolveStatus) {
        log::info!("solve finished: {status:?}");
    }
}

/// Records every accepted iteration into a shared buffer.
///
/// Clone it before handing it to the solver to keep a handle on the records.
#[derive(Debug, Default, Clone)]
pub struct CostRecorder {
    records: Rc<RefCell<Vec<IterationInfo>>>,
    restarts: Rc<RefCell<Vec<u32>>>,
}

impl CostRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<IterationInfo> {
        self.records.borrow().clone()
    }

    /// Regularization levels at which the backward sweep restarted.
    pub fn restarts(&self) -> Vec<u32> {
        self.restarts.borrow().clone()
    }
}

impl DdpObserver for CostRecorder {
    fn on_regularize(&mut self, level: u32) {
        self.restarts.borrow_mut().push(level);
    }

    fn on_iteration(&mut self, info: &IterationInfo) {
        self.records.borrow_mut().push(*info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_clones_share_records() {
        let recorder = CostRecorder::new();
        let mut handle: Box<dyn DdpObserver> = Box::new(recorder.clone());
        let info = IterationInfo {
            iteration: 1,
            cost: 2.0,
            improvement: f64::INFINITY,
            step: 1.0,
            regularization: 0,
        };
        handle.on_iteration(&info);
        handle.on_regularize(3);
        assert_eq!(recorder.records(), vec![info]);
        assert_eq!(recorder.restarts(), vec![3]);
    }
}
