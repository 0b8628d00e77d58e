//! Common types for the order sync system.
//!
//! Everything that crosses a crate boundary lives here: ledger records and
//! their statuses, consolidated orders, pass reports and the shared
//! configuration validation framework.

/// API error types for the HTTP surface.
pub mod api;
/// Consolidated orders, submission outcomes and tracking data.
pub mod order;
/// Ledger records, statuses and write-back patches.
pub mod record;
/// Pass reports returned by the sync drivers.
pub mod report;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Zeroizing string wrapper for credentials.
pub mod secret_string;
/// Small text helpers shared by the HTTP collaborators.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use order::*;
pub use record::*;
pub use registry::ImplementationRegistry;
pub use report::*;
pub use secret_string::SecretString;
pub use utils::{join_distinct, truncate_chars};
pub use validation::*;
