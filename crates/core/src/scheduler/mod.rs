//! Bounded, continuously refilled pool of account workers.
//!
//! The scheduler keeps up to N account workers running over one shared FIFO
//! of work items. Whenever a worker finishes, for any reason, its slot is
//! handed to the next account in the roster while items remain.
//!
//! Run states: `Idle → Running → Draining → Finished | Stopped`. `Draining`
//! means no further workers will be started and the scheduler is waiting for
//! the active ones to finish.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use fanout_protocol::Account;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, error, info, info_span, warn};

use crate::context::RunContext;
use crate::error::{FanoutError, Result};
use crate::item::WorkItem;

mod observer;
mod queue;
mod stop;
mod summary;
mod worker;

pub use observer::{NoopObserver, RunObserver};
pub use queue::WorkQueue;
pub use stop::StopSignal;
pub use summary::{AccountFailure, AccountReport, RunSummary, WorkerExit};

/// Batch-run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
	Idle,
	Running,
	Draining,
	Finished,
	Stopped,
}

impl RunState {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Finished | Self::Stopped)
	}
}

impl fmt::Display for RunState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Idle => "idle",
			Self::Running => "running",
			Self::Draining => "draining",
			Self::Finished => "finished",
			Self::Stopped => "stopped",
		};
		f.write_str(name)
	}
}

/// Orchestrates one batch run. Each scheduler runs at most once.
pub struct Scheduler {
	ctx: Arc<RunContext>,
	stop: StopSignal,
	state: watch::Sender<RunState>,
}

impl Scheduler {
	pub fn new(ctx: RunContext) -> Self {
		let (state, _) = watch::channel(RunState::Idle);
		Self {
			ctx: Arc::new(ctx),
			stop: StopSignal::new(),
			state,
		}
	}

	pub fn context(&self) -> &Arc<RunContext> {
		&self.ctx
	}

	pub fn stop_signal(&self) -> StopSignal {
		self.stop.clone()
	}

	/// Requests a cooperative stop.
	pub fn stop(&self) {
		info!(target: "fanout.scheduler", "stop requested");
		self.stop.stop();
	}

	pub fn state(&self) -> RunState {
		*self.state.borrow()
	}

	pub fn subscribe(&self) -> watch::Receiver<RunState> {
		self.state.subscribe()
	}

	/// Spawns the run onto the tokio runtime and returns a handle to it.
	pub fn start(self, roster: Vec<Account>, items: Vec<WorkItem>, concurrency: usize, per_account_cap: u32) -> RunHandle {
		let stop = self.stop_signal();
		let state = self.subscribe();
		let join = tokio::spawn(async move { self.run(roster, items, concurrency, per_account_cap).await });
		RunHandle { stop, state, join }
	}

	/// Runs to completion and returns the summary once every worker is joined.
	pub async fn run(&self, roster: Vec<Account>, items: Vec<WorkItem>, concurrency: usize, per_account_cap: u32) -> Result<RunSummary> {
		if self.state() != RunState::Idle {
			return Err(FanoutError::Context(format!("Scheduler already {}", self.state())));
		}
		self.set_state(RunState::Running);

		match self.execute(roster, items, concurrency.max(1), per_account_cap).await {
			Ok(summary) => {
				self.set_state(summary.state);
				info!(target: "fanout.scheduler", %summary, "run complete");
				Ok(summary)
			}
			Err(err) => {
				self.set_state(RunState::Finished);
				Err(err)
			}
		}
	}

	async fn execute(&self, roster: Vec<Account>, items: Vec<WorkItem>, concurrency: usize, per_account_cap: u32) -> Result<RunSummary> {
		let ctx = &self.ctx;
		let target = ctx.settings.daily_target;

		if ctx.settings.preflight {
			ctx.observer.on_status("*", "running tooling health check");
			ctx.sessions.preflight().await?;
		}

		ctx.sessions.allocator().set_roster(roster.iter().map(|a| a.name.clone()));
		let partition = ctx.quota.partition(roster, target)?;

		let (pending, published): (Vec<_>, Vec<_>) = items.into_iter().partition(|item| !ctx.ledger.is_processed(&item.digest));
		let queue = Arc::new(WorkQueue::new(pending));
		let mut summary = RunSummary::new(queue.total(), published.len());
		for (name, progress) in &partition.complete {
			ctx.observer.on_status(name, &format!("{progress}"));
			summary.completed_accounts.push(name.clone());
		}

		info!(
			target: "fanout.scheduler",
			items = queue.total(),
			skipped = published.len(),
			accounts = partition.eligible.len(),
			complete = partition.complete.len(),
			concurrency,
			"run starting"
		);
		ctx.observer.on_progress(0, queue.total());

		let mut roster: VecDeque<Account> = partition.eligible.into();
		let mut workers = JoinSet::new();
		let mut names = HashMap::new();

		self.fill(&mut workers, &mut names, &mut roster, &queue, concurrency, per_account_cap);

		while let Some(joined) = workers.join_next_with_id().await {
			match joined {
				Ok((id, report)) => {
					names.remove(&id);
					summary.absorb(report);
				}
				Err(err) => {
					let name = names.remove(&err.id()).unwrap_or_default();
					let reason = if err.is_panic() {
						"worker panicked".to_string()
					} else {
						format!("worker cancelled: {err}")
					};
					error!(target: "fanout.scheduler", account = %name, %reason, "worker ended abnormally");
					ctx.sessions.release_account(&name).await;
					ctx.observer.on_liveness(&name, false);
					summary.record_failure(&name, reason);
				}
			}

			if self.stop.is_stopped() || queue.is_empty() || roster.is_empty() {
				if !workers.is_empty() {
					self.set_state(RunState::Draining);
				}
				continue;
			}
			self.fill(&mut workers, &mut names, &mut roster, &queue, concurrency, per_account_cap);
		}

		ctx.sessions.shutdown().await;
		summary.remaining = queue.len();
		summary.state = if self.stop.is_stopped() { RunState::Stopped } else { RunState::Finished };
		if !roster.is_empty() && summary.state == RunState::Finished {
			info!(target: "fanout.scheduler", unused = roster.len(), "queue drained before every account ran");
		}
		if !summary.unreconciled.is_empty() {
			warn!(
				target: "fanout.scheduler",
				count = summary.unreconciled.len(),
				"published items missing from the ledger; reconcile before the next run"
			);
		}
		Ok(summary)
	}

	fn fill(
		&self,
		workers: &mut JoinSet<AccountReport>,
		names: &mut HashMap<tokio::task::Id, String>,
		roster: &mut VecDeque<Account>,
		queue: &Arc<WorkQueue>,
		concurrency: usize,
		per_account_cap: u32,
	) {
		while workers.len() < concurrency && !self.stop.is_stopped() && !queue.is_empty() {
			let Some(account) = roster.pop_front() else {
				break;
			};
			let name = account.name.clone();
			let span = info_span!("worker", account = %name);
			let handle = workers.spawn(
				worker::run_worker(Arc::clone(&self.ctx), account, Arc::clone(queue), self.stop.clone(), per_account_cap).instrument(span),
			);
			names.insert(handle.id(), name);
		}
	}

	fn set_state(&self, next: RunState) {
		let previous = self.state.send_replace(next);
		if previous != next {
			info!(target: "fanout.scheduler", from = %previous, to = %next, "run state changed");
		}
	}
}

/// Handle to a run started with [`Scheduler::start`].
pub struct RunHandle {
	stop: StopSignal,
	state: watch::Receiver<RunState>,
	join: JoinHandle<Result<RunSummary>>,
}

impl RunHandle {
	pub fn stop(&self) {
		self.stop.stop();
	}

	pub fn stop_signal(&self) -> StopSignal {
		self.stop.clone()
	}

	pub fn state(&self) -> RunState {
		*self.state.borrow()
	}

	/// Waits until the run reaches a terminal state.
	pub async fn wait_terminal(&mut self) -> RunState {
		let reached = self.state.wait_for(|state| state.is_terminal()).await.map(|state| *state);
		match reached {
			Ok(state) => state,
			Err(_) => *self.state.borrow(),
		}
	}

	pub async fn join(self) -> Result<RunSummary> {
		self.join
			.await
			.map_err(|err| FanoutError::Context(format!("Scheduler task failed: {err}")))?
	}
}
