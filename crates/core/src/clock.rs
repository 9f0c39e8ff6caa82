//! Calendar source for quota rollover.

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;

/// Supplies the current local calendar date.
pub trait Clock: Send + Sync {
	fn today(&self) -> NaiveDate;
}

/// Host local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn today(&self) -> NaiveDate {
		Local::now().date_naive()
	}
}

/// Settable clock for tests and dry runs.
#[derive(Debug)]
pub struct FixedClock {
	date: Mutex<NaiveDate>,
}

impl FixedClock {
	pub fn new(date: NaiveDate) -> Self {
		Self { date: Mutex::new(date) }
	}

	pub fn set(&self, date: NaiveDate) {
		*self.date.lock() = date;
	}

	/// Moves the clock forward by `days`.
	pub fn advance_days(&self, days: u64) {
		let mut date = self.date.lock();
		if let Some(next) = date.checked_add_days(chrono::Days::new(days)) {
			*date = next;
		}
	}
}

impl Clock for FixedClock {
	fn today(&self) -> NaiveDate {
		*self.date.lock()
	}
}
