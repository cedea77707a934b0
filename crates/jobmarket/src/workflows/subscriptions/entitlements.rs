//! Derived entitlement flags computed from a subscription snapshot.
//!
//! [`evaluate`] is a pure function of `(snapshot, now)`. It never fails: an
//! absent snapshot or zero-valued fields simply yield a view with every
//! capability switched off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{SubscriptionSnapshot, SubscriptionStatus};

const DAY_MILLIS: i64 = 86_400_000;

/// Plan type that always carries work-log access.
pub const PREMIUM_PLAN: &str = "premium";

/// Capability flags and counters used to gate employer actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementView {
    pub days_remaining: i64,
    pub credits: u32,
    pub has_active_subscription: bool,
    pub can_unlock_worker: bool,
    pub can_change_location: bool,
    pub can_post_job: bool,
    pub has_worklog_access: bool,
}

/// Computes the entitlement view for `snapshot` at instant `now`.
pub fn evaluate(snapshot: Option<&SubscriptionSnapshot>, now: DateTime<Utc>) -> EntitlementView {
    let Some(snapshot) = snapshot else {
        return EntitlementView::default();
    };

    let days_remaining = snapshot
        .end_date
        .map(|end| ceil_days(end.signed_duration_since(now).num_milliseconds()))
        .unwrap_or(0);

    let credits = snapshot
        .max_database_unlocks
        .saturating_sub(snapshot.database_unlocks_used);

    // The date check guards against a backend that has not yet flipped the status.
    let active = snapshot.status == SubscriptionStatus::Active
        && snapshot.end_date.is_some_and(|end| end >= now);

    let worklog_granted = snapshot.plan_type == PREMIUM_PLAN
        || snapshot
            .worklog_access_expiry
            .is_some_and(|expiry| expiry > now);

    EntitlementView {
        days_remaining,
        credits,
        has_active_subscription: active,
        can_unlock_worker: active
            && snapshot.database_unlocks_used < snapshot.max_database_unlocks,
        can_change_location: active
            && snapshot.location_changes_used < snapshot.max_location_changes,
        can_post_job: active && snapshot.max_active_jobs > 0,
        has_worklog_access: active && worklog_granted,
    }
}

fn ceil_days(millis: i64) -> i64 {
    let whole = millis / DAY_MILLIS;
    if millis % DAY_MILLIS > 0 {
        whole + 1
    } else {
        whole
    }
}

/// Employer actions gated by the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PostJob,
    UnlockWorker,
    ChangeLocation,
    WorklogAccess,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::PostJob,
        Capability::UnlockWorker,
        Capability::ChangeLocation,
        Capability::WorklogAccess,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Capability::PostJob => "post a job",
            Capability::UnlockWorker => "unlock worker contact",
            Capability::ChangeLocation => "change location",
            Capability::WorklogAccess => "use work logs",
        }
    }
}

/// Why a capability is currently unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NoActiveSubscription,
    AllowanceExhausted,
    NotIncludedInPlan,
}

impl DenialReason {
    pub const fn label(self) -> &'static str {
        match self {
            DenialReason::NoActiveSubscription => "no active subscription",
            DenialReason::AllowanceExhausted => "plan allowance used up",
            DenialReason::NotIncludedInPlan => "not included in the current plan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {}: {}", .capability.label(), .reason.label())]
pub struct EntitlementDenied {
    pub capability: Capability,
    pub reason: DenialReason,
}

impl EntitlementView {
    pub fn permits(&self, capability: Capability) -> bool {
        match capability {
            Capability::PostJob => self.can_post_job,
            Capability::UnlockWorker => self.can_unlock_worker,
            Capability::ChangeLocation => self.can_change_location,
            Capability::WorklogAccess => self.has_worklog_access,
        }
    }

    pub fn require(&self, capability: Capability) -> Result<(), EntitlementDenied> {
        if self.permits(capability) {
            return Ok(());
        }

        let reason = if !self.has_active_subscription {
            DenialReason::NoActiveSubscription
        } else if capability == Capability::WorklogAccess {
            DenialReason::NotIncludedInPlan
        } else {
            DenialReason::AllowanceExhausted
        };

        Err(EntitlementDenied { capability, reason })
    }
}
