//! Remote billing service client.
//!
//! [`BillingTransport`] is the raw request/response seam (HTTP in production,
//! scripted substitutes in tests); [`RemoteBillingClient`] adds retry/backoff,
//! error translation and the typed operations.

mod client;
mod transport;
mod types;

pub use client::RemoteBillingClient;
pub use transport::{
    BillingTransport, HttpTransport, TransportRequest, TransportResponse, IDEMPOTENCY_KEY_HEADER,
};
pub use types::{RemoteCustomer, RemotePage, RemotePlan};
