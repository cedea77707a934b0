//! Subscription entitlement gating for employer accounts.
//!
//! The backend owns subscription accounting. This module only turns the fetched
//! record into capability flags, keeps the latest result available to screens,
//! and forwards purchases.

pub mod backend;
pub mod domain;
pub mod entitlements;
pub mod http;
pub mod router;
pub mod store;
pub mod views;

#[cfg(test)]
mod tests;

pub use backend::{BackendError, Clock, FixedClock, SubscriptionBackend, SystemClock};
pub use domain::{
    parse_timestamp, AccessToken, PlanId, PlanLimits, PlanRecord, PurchaseReceipt,
    SessionIdentity, SubscriptionSnapshot, SubscriptionStatus, UserId, UserRole,
};
pub use entitlements::{evaluate, Capability, DenialReason, EntitlementDenied, EntitlementView};
pub use http::{decode_current, HttpSubscriptionBackend};
pub use router::entitlement_router;
pub use store::{EntitlementState, EntitlementStore, RefreshOutcome, SubscriptionError};
pub use views::{EntitlementSummary, PlanSummary};
