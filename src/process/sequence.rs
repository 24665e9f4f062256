//! Sequential composition of processes
//!
//! A [`ProcessSequence`] runs its stages one after another as a single
//! process. Later stages are built only once the previous one has finished,
//! so they can consume what it produced. A failing stage fails the whole
//! sequence and the remaining stages are never built.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::AtpResult;
use super::Process;

/// Builds the next stage once the previous one is done
pub type StageFactory = Box<dyn FnOnce() -> AtpResult<Box<dyn Process>>>;

pub struct ProcessSequence {
    name: String,
    current: Box<dyn Process>,
    pending: VecDeque<StageFactory>,
    /// Summaries of finished stages
    lines: Vec<String>,
    finished: bool,
}

impl ProcessSequence {
    pub fn new(name: impl Into<String>, first: Box<dyn Process>) -> Self {
        ProcessSequence {
            name: name.into(),
            current: first,
            pending: VecDeque::new(),
            lines: Vec::new(),
            finished: false,
        }
    }

    /// Append a stage
    pub fn then<F>(mut self, stage: F) -> Self
    where
        F: FnOnce() -> AtpResult<Box<dyn Process>> + 'static,
    {
        self.pending.push_back(Box::new(stage));
        self
    }

    /// Stages not started yet
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    fn stop(&mut self) {
        self.pending.clear();
        self.finished = true;
    }
}

impl Process for ProcessSequence {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn advance(&mut self) -> AtpResult<bool> {
        if self.finished {
            return Ok(true);
        }
        match self.current.advance() {
            Ok(false) => Ok(false),
            Ok(true) => {
                self.lines.extend(self.current.summary());
                let Some(next) = self.pending.pop_front() else {
                    self.finished = true;
                    return Ok(true);
                };
                match next() {
                    Ok(stage) => {
                        debug!(sequence = %self.name, stage = %stage.name(), "next stage started");
                        self.current = stage;
                        Ok(false)
                    }
                    Err(e) => {
                        self.stop();
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.lines.extend(self.current.summary());
                self.stop();
                Err(e)
            }
        }
    }

    fn summary(&self) -> Vec<String> {
        let mut lines = self.lines.clone();
        if !self.finished {
            lines.extend(self.current.summary());
        }
        lines
    }
}
