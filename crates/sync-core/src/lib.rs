//! Core sync engine for the order sync system.
//!
//! Turns ledger rows into consolidated orders, submits them to the
//! fulfillment provider and reconciles tracking back into the ledger. The
//! engine is assembled by [`SyncBuilder`] from pluggable ledger and
//! fulfillment implementations.

pub mod builder;
pub mod consolidate;
pub mod engine;
pub mod handlers;
pub mod state;
pub mod validate;

pub use builder::{BuilderError, SyncBuilder, SyncFactories};
pub use consolidate::{consolidate, OrderBook};
pub use engine::{EngineError, SyncEngine};
pub use validate::validate_order;
