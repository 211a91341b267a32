//! Domain models for pricing-service.

mod agent;
mod call;
mod client;
mod history;
mod plan;
mod usage;

pub use agent::{Agent, CreateAgent};
pub use call::{Call, CreateCall};
pub use client::{Client, CreateClient};
pub use history::{HistoryAction, HistoryTransition, PricingHistoryRecord};
pub use plan::{Charge, ChargeKind, PricingPlan, UpsertPlan};
pub use usage::{UsageEvent, UsageMetrics};
