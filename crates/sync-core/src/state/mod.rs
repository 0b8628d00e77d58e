//! Status changes on ledger rows.
//!
//! Every status write goes through the record state machine so that the
//! lifecycle table is enforced in one place.

pub mod record;

pub use record::{RecordStateMachine, StateError};
