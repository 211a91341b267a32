//! Services module for pricing-service.

pub mod clock;
pub mod database;
pub mod history;
pub mod memory;
pub mod metrics;
pub mod plans;
pub mod pricing;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use database::Database;
pub use history::HistoryTracker;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use plans::{PlanCatalog, PlanSyncReport, RejectedPlan};
pub use pricing::{FinalizedCost, PricingService, UsageEventResult, UsageEventStatus};
pub use store::PricingStore;
