//! Once-a-day trigger for the summary task

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use super::error::{SchedulerError, SchedulerResult};

/// Minutes after the target hour during which the trigger may fire
pub const FIRE_WINDOW_MINUTES: u32 = 5;

/// Fires at most once per calendar day, inside the first minutes of `hour`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyTrigger {
    hour: u32,
    last_fired: Option<NaiveDate>,
}

impl DailyTrigger {
    pub fn new(hour: u32) -> SchedulerResult<Self> {
        if hour > 23 {
            return Err(SchedulerError::invalid_hour(hour));
        }

        Ok(Self {
            hour,
            last_fired: None,
        })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn last_fired(&self) -> Option<NaiveDate> {
        self.last_fired
    }

    /// Whether `now` (local wall-clock) falls in an unfired window
    pub fn should_fire(&self, now: NaiveDateTime) -> bool {
        now.hour() == self.hour
            && now.minute() < FIRE_WINDOW_MINUTES
            && self.last_fired != Some(now.date())
    }

    /// Fire if due, remembering the date
    pub fn try_fire(&mut self, now: NaiveDateTime) -> bool {
        if !self.should_fire(now) {
            return false;
        }
        self.last_fired = Some(now.date());
        true
    }
}
