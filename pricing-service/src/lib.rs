//! pricing-service: pricing plans, agent plan history and per-call cost
//! finalization against a remote metering/billing service.

pub mod config;
pub mod cost;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod remote;
pub mod services;
pub mod startup;

pub use error::PricingError;
