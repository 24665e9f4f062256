//! Cooperative process orchestration
//!
//! Long-running work (proof attempts, model training) is broken into
//! processes that advance in small resumable slices. A single
//! [`ProcessManager`] multiplexes any number of them on one thread: it pops a
//! process, gives it a bounded number of `advance` calls, and requeues it
//! until it reports completion. A [`ProcessSequence`] chains processes so a
//! later one can consume what an earlier one selected.

pub mod proof;
pub mod select;
pub mod sequence;
pub mod training;

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::error::{AtpError, AtpResult};

pub use proof::{ProofPhase, ProofProcess, TargetResult};
pub use select::{Selection, UnprovenSelectorProcess};
pub use sequence::{ProcessSequence, StageFactory};
pub use training::{TrainHmmProcess, TrainingPhase};

/// Advance calls per scheduling slice
pub const DEFAULT_SLICE: usize = 50;

/// A resumable unit of work
pub trait Process {
    fn name(&self) -> String;

    /// Do a bounded amount of work; `Ok(true)` once finished
    fn advance(&mut self) -> AtpResult<bool>;

    /// Human-readable result lines, meaningful once finished
    fn summary(&self) -> Vec<String>;
}

/// What became of a process
#[derive(Debug)]
pub struct ProcessReport {
    pub name: String,
    pub lines: Vec<String>,
    /// `None` on success
    pub error: Option<AtpError>,
}

impl ProcessReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

type CompletionCallback = Box<dyn FnMut(&ProcessReport)>;

/// Round-robin scheduler for processes
pub struct ProcessManager {
    queue: VecDeque<Box<dyn Process>>,
    slice: usize,
    on_complete: Option<CompletionCallback>,
    reports: Vec<ProcessReport>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        ProcessManager {
            queue: VecDeque::new(),
            slice: DEFAULT_SLICE,
            on_complete: None,
            reports: Vec::new(),
        }
    }

    pub fn with_slice(mut self, slice: usize) -> Self {
        self.slice = slice.max(1);
        self
    }

    /// Called with the report of every process as it finishes or fails
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ProcessReport) + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn add(&mut self, process: Box<dyn Process>) {
        debug!(process = %process.name(), "process queued");
        self.queue.push_back(process);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Give the next process one slice; returns whether work remains
    pub fn run_once(&mut self) -> bool {
        let Some(mut process) = self.queue.pop_front() else {
            return false;
        };

        let mut outcome = Ok(false);
        for _ in 0..self.slice {
            outcome = process.advance();
            if !matches!(outcome, Ok(false)) {
                break;
            }
        }

        match outcome {
            Ok(false) => self.queue.push_back(process),
            Ok(true) => {
                info!(process = %process.name(), "process finished");
                self.finish(ProcessReport {
                    name: process.name(),
                    lines: process.summary(),
                    error: None,
                });
            }
            Err(e) => {
                warn!(process = %process.name(), error = %e, "process failed");
                self.finish(ProcessReport {
                    name: process.name(),
                    lines: process.summary(),
                    error: Some(e),
                });
            }
        }
        !self.queue.is_empty()
    }

    fn finish(&mut self, report: ProcessReport) {
        if let Some(callback) = self.on_complete.as_mut() {
            callback(&report);
        }
        self.reports.push(report);
    }

    /// Run every process to completion; returns their reports in
    /// completion order
    pub fn run(&mut self) -> Vec<ProcessReport> {
        while self.run_once() {}
        std::mem::take(&mut self.reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::error::ErrorCode;

    struct Countdown {
        name: &'static str,
        left: usize,
        fail_at: Option<usize>,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Process for Countdown {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn advance(&mut self) -> AtpResult<bool> {
            self.log.borrow_mut().push(self.name);
            if Some(self.left) == self.fail_at {
                return Err(AtpError::internal("boom"));
            }
            self.left -= 1;
            Ok(self.left == 0)
        }

        fn summary(&self) -> Vec<String> {
            vec![format!("{} left {}", self.name, self.left)]
        }
    }

    fn countdown(name: &'static str, left: usize, log: &Rc<RefCell<Vec<&'static str>>>) -> Box<dyn Process> {
        Box::new(Countdown { name, left, fail_at: None, log: Rc::clone(log) })
    }

    #[test]
    fn test_round_robin_slices() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = ProcessManager::new().with_slice(2);
        manager.add(countdown("a", 3, &log));
        manager.add(countdown("b", 2, &log));
        let reports = manager.run();

        assert_eq!(*log.borrow(), vec!["a", "a", "b", "b", "a"]);
        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(reports.iter().all(ProcessReport::succeeded));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_failure_reported_and_others_continue() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let completed = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&completed);
        let mut manager = ProcessManager::new()
            .with_slice(1)
            .on_complete(move |r| seen.borrow_mut().push((r.name.clone(), r.succeeded())));
        manager.add(Box::new(Countdown { name: "bad", left: 3, fail_at: Some(2), log: Rc::clone(&log) }));
        manager.add(countdown("good", 2, &log));
        let reports = manager.run();

        assert_eq!(reports.len(), 2);
        let bad = reports.iter().find(|r| r.name == "bad").unwrap();
        assert_eq!(bad.error.as_ref().unwrap().code, ErrorCode::InternalError);
        assert_eq!(
            *completed.borrow(),
            vec![("bad".to_string(), false), ("good".to_string(), true)]
        );
    }

    #[test]
    fn test_empty_manager() {
        let mut manager = ProcessManager::new();
        assert!(!manager.run_once());
        assert!(manager.run().is_empty());
    }
}
