//! Application layer orchestrating the expense workflow.
//!
//! `workflow` holds the pure submit/approve/reject actions, `service` wires
//! them to a record store, and `settlement` pays approved expenses out in the
//! background through the `payment` client.

pub mod payment;
pub mod service;
pub mod settlement;
pub mod workflow;
