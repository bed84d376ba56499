use crate::state::ConcurrencyToken;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Send counters for one accounting period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub request_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
}

impl Counters {
    pub fn new(request_count: u64, success_count: u64, failure_count: u64) -> Self {
        Self {
            request_count,
            success_count,
            failure_count,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Counters::default()
    }
}

impl Add for Counters {
    type Output = Counters;

    fn add(self, rhs: Counters) -> Counters {
        Counters {
            request_count: self.request_count.saturating_add(rhs.request_count),
            success_count: self.success_count.saturating_add(rhs.success_count),
            failure_count: self.failure_count.saturating_add(rhs.failure_count),
        }
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Counters) {
        *self = *self + rhs;
    }
}

impl Sum for Counters {
    fn sum<I: Iterator<Item = Counters>>(iter: I) -> Self {
        iter.fold(Counters::default(), Add::add)
    }
}

/// Persisted counters for one calendar day
#[derive(Debug, Clone, PartialEq)]
pub struct CounterDocument {
    pub day: NaiveDate,
    pub counters: Counters,
    /// `None` when the day has no stored document yet
    pub token: Option<ConcurrencyToken>,
}

impl CounterDocument {
    /// Document id for a day bucket
    pub fn day_key(day: NaiveDate) -> String {
        day.format("%Y-%m-%d").to_string()
    }

    /// Zero-valued placeholder for a day without a stored document
    pub fn absent(day: NaiveDate) -> Self {
        Self {
            day,
            counters: Counters::default(),
            token: None,
        }
    }

    pub fn key(&self) -> String {
        Self::day_key(self.day)
    }
}

/// Stored body of a counter document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CounterBody {
    pub day: NaiveDate,
    #[serde(flatten)]
    pub counters: Counters,
}
