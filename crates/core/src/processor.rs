//! Validation and execution of one work item against one session.
//!
//! Item-level failures never escape as errors: they become an
//! [`ItemOutcome`]. The only error returned is a persistence failure after a
//! real publication, which callers must escalate.

use std::fs;
use std::sync::Arc;

use fanout_protocol::{Account, ItemDescription};
use tracing::{debug, error, info, warn};

use crate::error::{FanoutError, Result};
use crate::flow::{PublishContext, PublishFlow, PublishStep};
use crate::item::WorkItem;
use crate::ledger::{ContentHashStore, ProcessedItem};
use crate::quota::AccountQuotaTracker;
use crate::scheduler::{RunObserver, StopSignal};
use crate::session::{Session, SessionManager};
use crate::validate::{Validation, Validator, normalize_reference};

/// In-place recovery attempts after a transient interaction failure.
pub const DEFAULT_RECOVERY_ATTEMPTS: u32 = 2;

/// Result of processing one item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
	/// Published, recorded in the ledger and counted against quota.
	Published { reference: String, description: ItemDescription },
	/// Unusable item; removed from disk without a ledger entry.
	Discarded { reason: String },
	/// Environment problem; the item stays on disk for a later run.
	Deferred { reason: String, session_dead: bool },
	/// Digest already in the ledger; the item is left alone.
	AlreadyPublished,
	/// The stop signal was raised before the interaction started.
	Stopped,
}

pub struct WorkItemProcessor {
	ledger: Arc<ContentHashStore>,
	quota: Arc<AccountQuotaTracker>,
	sessions: Arc<SessionManager>,
	validator: Arc<dyn Validator>,
	flow: Arc<dyn PublishFlow>,
	observer: Arc<dyn RunObserver>,
	recovery_attempts: u32,
}

impl WorkItemProcessor {
	pub fn new(
		ledger: Arc<ContentHashStore>,
		quota: Arc<AccountQuotaTracker>,
		sessions: Arc<SessionManager>,
		validator: Arc<dyn Validator>,
		flow: Arc<dyn PublishFlow>,
		observer: Arc<dyn RunObserver>,
	) -> Self {
		Self {
			ledger,
			quota,
			sessions,
			validator,
			flow,
			observer,
			recovery_attempts: DEFAULT_RECOVERY_ATTEMPTS,
		}
	}

	pub fn with_recovery_attempts(mut self, attempts: u32) -> Self {
		self.recovery_attempts = attempts;
		self
	}

	pub fn flow(&self) -> &Arc<dyn PublishFlow> {
		&self.flow
	}

	/// Runs the full pipeline for `item`.
	///
	/// Returns `Err` only with [`FanoutError::Persistence`], meaning the item
	/// was published but the ledger or quota write failed.
	pub async fn process(&self, session: &mut Session, account: &Account, item: &WorkItem, stop: &StopSignal) -> Result<ItemOutcome> {
		let name = account.name.as_str();
		let file = item.file_name();

		// Held until this attempt ends so a same-content file in another worker backs off.
		let Some(_claim) = self.ledger.try_claim(&item.digest) else {
			debug!(target: "fanout.processor", account = %name, %file, "digest already published or in flight");
			return Ok(ItemOutcome::AlreadyPublished);
		};

		let Some(reference) = item.reference.as_deref() else {
			return Ok(self.discard(name, item, FanoutError::InvalidReference(file)));
		};
		let reference = normalize_reference(reference);

		self.observer.on_status(name, &format!("validating reference {reference}"));
		let description = match self.validator.validate(&reference, &account.credentials).await {
			Ok(Validation::Accepted(description)) => description,
			Ok(Validation::Rejected(reason)) => {
				return Ok(self.discard(name, item, FanoutError::Rejected { reference, reason }));
			}
			Err(err) if err.is_permanent() => return Ok(self.discard(name, item, err)),
			Err(err) => {
				warn!(target: "fanout.processor", account = %name, %file, error = %err, "validation unavailable; leaving item");
				return Ok(ItemOutcome::Deferred {
					reason: err.to_string(),
					session_dead: false,
				});
			}
		};

		if stop.is_stopped() {
			return Ok(ItemOutcome::Stopped);
		}

		if let Err(err) = session.begin_work() {
			return Ok(ItemOutcome::Deferred {
				reason: err.to_string(),
				session_dead: !self.sessions.is_session_live(session).await,
			});
		}
		let interaction = self.interact(session, account, item, &reference, &description).await;
		if let Err(err) = session.end_work() {
			debug!(target: "fanout.processor", account = %name, error = %err, "session not returned to ready");
		}

		match interaction {
			Ok(()) => self.commit(name, item, reference, description),
			Err(err) if err.is_permanent() => Ok(self.discard(name, item, err)),
			Err(err) => {
				let session_dead = !self.sessions.is_session_live(session).await;
				warn!(
					target: "fanout.processor",
					account = %name,
					%file,
					session_dead,
					error = %err,
					"interaction failed; leaving item for a later run"
				);
				Ok(ItemOutcome::Deferred {
					reason: err.to_string(),
					session_dead,
				})
			}
		}
	}

	async fn interact(&self, session: &mut Session, account: &Account, item: &WorkItem, reference: &str, description: &ItemDescription) -> Result<()> {
		let mut recoveries = 0;
		loop {
			let failed_step = match self.run_steps(session, account, item, reference, description).await {
				Ok(()) => return Ok(()),
				Err((step, err)) => {
					if err.is_permanent() || step.is_commit() || recoveries >= self.recovery_attempts {
						return Err(err);
					}
					if !self.sessions.is_session_live(session).await {
						return Err(FanoutError::SessionLost(err.to_string()));
					}
					(step, err)
				}
			};

			recoveries += 1;
			let (step, err) = failed_step;
			warn!(
				target: "fanout.processor",
				account = %account.name,
				%step,
				attempt = recoveries,
				error = %err,
				"step failed; recovering"
			);
			self.observer.on_status(&account.name, &format!("recovering from {step} failure ({recoveries}/{})", self.recovery_attempts));
			self.flow.recover(session.handle()).await?;
		}
	}

	async fn run_steps(
		&self,
		session: &mut Session,
		account: &Account,
		item: &WorkItem,
		reference: &str,
		description: &ItemDescription,
	) -> std::result::Result<(), (PublishStep, FanoutError)> {
		for step in PublishStep::ALL {
			let ctx = PublishContext {
				item,
				account: &account.name,
				reference,
				title: item.title(),
				description,
				first_popup_pending: !session.popup_handled(),
			};
			self.observer.on_status(&account.name, &format!("{step}: {}", item.file_name()));
			self.flow.run_step(step, session.handle(), &ctx).await.map_err(|err| (step, err))?;
			if step == PublishStep::Upload {
				session.mark_popup_handled();
			}
		}
		Ok(())
	}

	fn commit(&self, account: &str, item: &WorkItem, reference: String, description: ItemDescription) -> Result<ItemOutcome> {
		let file = item.file_name();
		let record = ProcessedItem {
			filename: &file,
			account,
			reference: &reference,
			size: item.size,
		};
		match self.ledger.record_processed(&item.digest, record) {
			Ok(true) => {}
			Ok(false) => {
				warn!(target: "fanout.processor", %account, %file, digest = %item.digest, "digest recorded by another publication; not charging quota");
				return Ok(ItemOutcome::AlreadyPublished);
			}
			Err(err) => {
				error!(
					target: "fanout.processor",
					%account,
					%file,
					digest = %item.digest,
					error = %err,
					"published but ledger write failed; reconciliation required"
				);
				return Err(err);
			}
		}

		if let Err(err) = self.quota.record_success(account) {
			error!(target: "fanout.processor", %account, %file, error = %err, "published but quota update failed");
			return Err(FanoutError::persistence(err));
		}

		match fs::remove_file(&item.path) {
			Ok(()) => {
				if let Err(err) = self.ledger.mark_deleted(&item.digest) {
					warn!(target: "fanout.processor", %account, %file, error = %err, "failed to flag ledger entry as deleted");
				}
			}
			Err(err) => warn!(target: "fanout.processor", %account, %file, error = %err, "published item could not be removed"),
		}

		info!(target: "fanout.processor", %account, %file, %reference, "item published");
		self.observer.on_status(account, &format!("published {file}"));
		Ok(ItemOutcome::Published { reference, description })
	}

	fn discard(&self, account: &str, item: &WorkItem, reason: FanoutError) -> ItemOutcome {
		let file = item.file_name();
		info!(target: "fanout.processor", %account, %file, reason = %reason, "discarding item");
		if let Err(err) = fs::remove_file(&item.path) {
			warn!(target: "fanout.processor", %account, %file, error = %err, "discarded item could not be removed");
		}
		self.observer.on_status(account, &format!("discarded {file}: {reason}"));
		ItemOutcome::Discarded { reason: reason.to_string() }
	}
}
