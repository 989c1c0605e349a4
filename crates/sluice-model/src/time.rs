//! Run clock
//!
//! Timesteps carry a calendar date so recorders can filter by month and
//! detect year boundaries, and an elapsed-days length for integration.

use chrono::{Datelike, Days, NaiveDate};

/// A single step of the simulation clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestep {
    /// Zero-based position in the run
    pub index: usize,
    /// Calendar date of this step
    pub date: NaiveDate,
    /// Elapsed days covered by this step
    pub days: f64,
}

impl Timestep {
    pub fn new(index: usize, date: NaiveDate, days: f64) -> Self {
        Self { index, date, days }
    }

    /// Calendar year of this step.
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Calendar month of this step (1-12).
    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

/// Generates the fixed sequence of timesteps for a run.
#[derive(Debug, Clone)]
pub struct Timestepper {
    start: NaiveDate,
    end: NaiveDate,
    step_days: u64,
}

impl Timestepper {
    /// A clock from `start` to `end` inclusive, stepping `step_days` at a
    /// time. `step_days` is clamped to at least one day.
    pub fn new(start: NaiveDate, end: NaiveDate, step_days: u64) -> Self {
        Self {
            start,
            end,
            step_days: step_days.max(1),
        }
    }

    /// Length of one step in days.
    pub fn step_days(&self) -> f64 {
        self.step_days as f64
    }

    /// Materialise the run clock.
    pub fn timesteps(&self) -> Vec<Timestep> {
        let mut steps = Vec::new();
        let mut date = self.start;
        let mut index = 0;
        while date <= self.end {
            steps.push(Timestep::new(index, date, self.step_days as f64));
            index += 1;
            match date.checked_add_days(Days::new(self.step_days)) {
                Some(next) => date = next,
                None => break,
            }
        }
        steps
    }
}
