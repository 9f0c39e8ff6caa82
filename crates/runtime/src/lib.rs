//! Host-level resources shared by automation sessions.
//!
//! Sessions are isolated from each other by the local TCP port their driver
//! listens on. This crate owns the table that hands those ports out and the
//! probes that check whether the host can actually bind one.

pub mod host;
pub mod ports;

pub use host::{port_available, port_listening};
pub use ports::{AllocError, DEFAULT_BASE_PORT, DEFAULT_RESERVED_PORT, PortAllocator, PortAllocatorConfig, stable_hash};
