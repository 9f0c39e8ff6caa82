//! One account's worker loop.

use std::sync::Arc;

use fanout_protocol::Account;
use tracing::{debug, error, info, warn};

use super::queue::WorkQueue;
use super::stop::StopSignal;
use super::summary::{AccountReport, WorkerExit};
use crate::context::RunContext;
use crate::processor::ItemOutcome;
use crate::session::Session;

/// Runs `account` until its quota, cap, the queue or the stop signal ends it.
///
/// The session is released on every path out of this function.
pub(crate) async fn run_worker(ctx: Arc<RunContext>, account: Account, queue: Arc<WorkQueue>, stop: StopSignal, cap: u32) -> AccountReport {
	let name = account.name.clone();
	let mut report = AccountReport::new(&name);
	let target = ctx.settings.daily_target;

	ctx.observer.on_status(&name, "checking quota");
	match ctx.quota.progress(&name, target) {
		Ok(progress) if progress.complete => {
			ctx.observer.on_status(&name, &format!("{progress}"));
			report.exit = WorkerExit::AlreadyComplete;
			return report;
		}
		Ok(_) => {}
		Err(err) => {
			report.exit = WorkerExit::Failed(format!("quota check failed: {err}"));
			return report;
		}
	}

	if stop.is_stopped() {
		report.exit = WorkerExit::Stopped;
		return report;
	}

	ctx.observer.on_status(&name, "starting session");
	let mut session = match ctx.sessions.acquire(&account).await {
		Ok(session) => session,
		Err(err) => {
			error!(target: "fanout.scheduler", account = %name, error = %err, "session acquisition failed; skipping account");
			ctx.observer.on_status(&name, &format!("skipped: {err}"));
			report.exit = WorkerExit::Failed(err.to_string());
			return report;
		}
	};
	ctx.observer.on_liveness(&name, true);

	let exit = drive(&ctx, &account, &mut session, &queue, &stop, cap, &mut report).await;
	report.exit = exit;

	let location = session.handle().current_location().await.ok();
	ctx.sessions.release(&mut session).await;
	ctx.observer.on_liveness(&name, false);
	ctx.observer.on_status(&name, &format!("finished: {}", report.exit));
	debug!(target: "fanout.scheduler", account = %name, exit = %report.exit, last_location = ?location, "worker finished");
	report
}

async fn drive(
	ctx: &RunContext,
	account: &Account,
	session: &mut Session,
	queue: &WorkQueue,
	stop: &StopSignal,
	cap: u32,
	report: &mut AccountReport,
) -> WorkerExit {
	let name = account.name.as_str();
	let target = ctx.settings.daily_target;
	let mut dispatched: u32 = 0;

	loop {
		if stop.is_stopped() {
			return WorkerExit::Stopped;
		}
		if dispatched >= cap {
			return WorkerExit::CapReached;
		}
		match ctx.quota.progress(name, target) {
			Ok(progress) if progress.complete => {
				ctx.observer.on_status(name, &format!("{progress}"));
				return WorkerExit::QuotaMet;
			}
			Ok(_) => {}
			Err(err) => return WorkerExit::Failed(format!("quota check failed: {err}")),
		}
		let Some(item) = queue.pop() else {
			return WorkerExit::QueueEmpty;
		};

		if dispatched > 0 && ctx.settings.renavigate_every > 0 && dispatched % ctx.settings.renavigate_every == 0 {
			renavigate(ctx, session).await;
		}
		dispatched += 1;

		let outcome = ctx.processor.process(session, account, &item, stop).await;
		if matches!(outcome, Ok(ItemOutcome::Stopped)) {
			queue.requeue_front(item);
			return WorkerExit::Stopped;
		}

		report.processed += 1;
		let done = queue.complete_one();
		ctx.observer.on_progress(done, queue.total());

		match outcome {
			Ok(ItemOutcome::Published { .. }) => report.succeeded += 1,
			Ok(ItemOutcome::Discarded { .. }) => report.discarded += 1,
			Ok(ItemOutcome::AlreadyPublished) => report.already_published += 1,
			Ok(ItemOutcome::Stopped) => {}
			Ok(ItemOutcome::Deferred { reason, session_dead }) => {
				report.deferred += 1;
				if session_dead {
					warn!(target: "fanout.scheduler", account = %name, %reason, "session died; recreating");
					ctx.sessions.release(session).await;
					ctx.observer.on_liveness(name, false);
					match ctx.sessions.acquire(account).await {
						Ok(fresh) => {
							*session = fresh;
							ctx.observer.on_liveness(name, true);
						}
						Err(err) => return WorkerExit::Failed(format!("session lost and could not be recreated: {err}")),
					}
				}
			}
			Err(err) => {
				error!(
					target: "fanout.scheduler",
					account = %name,
					file = %item.path.display(),
					error = %err,
					"reconciliation risk: stopping run"
				);
				report.unreconciled.push(item.path.clone());
				stop.stop();
				return WorkerExit::Failed(err.to_string());
			}
		}
	}
}

async fn renavigate(ctx: &RunContext, session: &Session) {
	let Some(url) = ctx.processor.flow().entry_url().or(ctx.sessions.settings().entry_url.as_deref()) else {
		return;
	};
	match session.handle().navigate(url).await {
		Ok(()) => info!(target: "fanout.scheduler", account = %session.account(), %url, "periodic re-navigation"),
		Err(err) => warn!(target: "fanout.scheduler", account = %session.account(), error = %err, "periodic re-navigation failed"),
	}
}
