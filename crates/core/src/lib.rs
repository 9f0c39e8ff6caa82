//! Fanout: publish a directory of content items across many accounts.
//!
//! A run discovers work items on disk, validates each one against a remote
//! catalog, drives a browser automation session per account through the
//! publishing pages and records every success in a digest ledger so nothing
//! is ever published twice.
//!
//! The engine is assembled from a few components, all wired through a
//! [`RunContext`]:
//!
//! - [`ContentHashStore`]: SHA-256 digest ledger of published items.
//! - [`AccountQuotaTracker`]: daily per-account targets with date rollover.
//! - [`SessionManager`]: session creation with tiered fallback and teardown.
//! - [`WorkItemProcessor`]: the per-item validate, interact, commit pipeline.
//! - [`Scheduler`]: bounded worker pool with backfill over a shared queue.
//!
//! Port assignment lives in `fanout-runtime` and the persisted data model in
//! `fanout-protocol`.

pub mod clock;
pub mod context;
pub mod error;
pub mod flow;
pub mod item;
pub mod ledger;
pub mod processor;
pub mod quota;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod testing;
pub mod validate;

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{RunContext, RunContextBuilder, RunSettings};
pub use error::{ErrorClass, FanoutError, Result, TierFailure};
pub use flow::{PublishContext, PublishFlow, PublishStep};
pub use item::{DEFAULT_REFERENCE_PATTERN, Discovery, ReferencePattern, WorkItem, discover};
pub use ledger::{ContentHashStore, DigestClaim, LedgerStats, ProcessedItem, compute_digest};
pub use processor::{ItemOutcome, WorkItemProcessor};
pub use quota::{AccountQuotaTracker, Progress, RosterPartition};
pub use scheduler::{AccountReport, RunHandle, RunObserver, RunState, RunSummary, Scheduler, StopSignal, WorkerExit};
pub use session::{AutomationSession, SessionLauncher, SessionManager, SessionSettings};
pub use store::{MemoryStore, Store};
pub use validate::{Validation, Validator};
