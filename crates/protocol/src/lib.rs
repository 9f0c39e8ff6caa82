//! Record types shared by the fanout engine and its storage backends.
//!
//! Types in this crate are pure data: they carry no behavior beyond
//! serialization and a few constructors. Everything the engine persists or
//! hands to a collaborator is defined here, so a storage backend can depend
//! on this crate alone.

pub mod account;
pub mod catalog;
pub mod cookie;
pub mod ledger;

pub use account::*;
pub use catalog::*;
pub use cookie::*;
pub use ledger::*;
