//! Domain layer: entities, business rules and the ports the application
//! layer talks through.

pub mod audit;
pub mod expense;
pub mod ports;
pub mod rules;
