//! HTTP handlers for pricing-service.

pub mod agents;
pub mod calls;
pub mod clients;
pub mod health;
pub mod plans;
