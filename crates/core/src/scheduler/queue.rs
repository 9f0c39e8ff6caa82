//! Shared FIFO of pending work items.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::item::WorkItem;

/// Thread-safe work queue shared by every worker of a run.
#[derive(Debug)]
pub struct WorkQueue {
	items: Mutex<VecDeque<WorkItem>>,
	total: usize,
	completed: AtomicUsize,
}

impl WorkQueue {
	pub fn new(items: Vec<WorkItem>) -> Self {
		Self {
			total: items.len(),
			items: Mutex::new(items.into()),
			completed: AtomicUsize::new(0),
		}
	}

	pub fn pop(&self) -> Option<WorkItem> {
		self.items.lock().pop_front()
	}

	/// Puts an item that was taken but not attempted back at the head.
	pub fn requeue_front(&self, item: WorkItem) {
		self.items.lock().push_front(item);
	}

	pub fn len(&self) -> usize {
		self.items.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.lock().is_empty()
	}

	/// Number of items the run started with.
	pub fn total(&self) -> usize {
		self.total
	}

	/// Counts one finished item and returns the running total.
	pub fn complete_one(&self) -> usize {
		self.completed.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub fn completed(&self) -> usize {
		self.completed.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	fn item(name: &str) -> WorkItem {
		WorkItem {
			path: PathBuf::from(name),
			digest: format!("sha256:{name}"),
			size: 1,
			reference: None,
		}
	}

	#[test]
	fn pops_in_fifo_order_and_requeues_at_head() {
		let queue = WorkQueue::new(vec![item("a"), item("b"), item("c")]);
		let first = queue.pop().unwrap();
		assert_eq!(first.path, PathBuf::from("a"));
		queue.requeue_front(first);
		assert_eq!(queue.pop().unwrap().path, PathBuf::from("a"));
		assert_eq!(queue.pop().unwrap().path, PathBuf::from("b"));
		assert_eq!(queue.len(), 1);
		assert_eq!(queue.total(), 3);
	}

	#[test]
	fn completion_counter_is_monotonic() {
		let queue = WorkQueue::new(vec![item("a")]);
		assert_eq!(queue.complete_one(), 1);
		assert_eq!(queue.complete_one(), 2);
		assert_eq!(queue.completed(), 2);
	}
}
