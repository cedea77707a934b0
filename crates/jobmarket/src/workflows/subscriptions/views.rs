use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{PlanRecord, SubscriptionStatus};
use super::entitlements::{Capability, EntitlementView};
use super::store::EntitlementState;

/// Screen-ready rendering of the published entitlement state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSummary {
    pub status_label: &'static str,
    /// Raw backend status, when a record exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    pub remaining_label: String,
    pub credits_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub view: EntitlementView,
    pub capabilities: Vec<CapabilityEntry>,
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityEntry {
    pub capability: Capability,
    pub label: &'static str,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl EntitlementSummary {
    pub fn from_state(state: &EntitlementState) -> Self {
        let view = state.view;
        let snapshot = state.snapshot.as_ref();

        let status_label = match snapshot {
            None => "No subscription",
            Some(_) if view.has_active_subscription => "Active",
            Some(snapshot) if snapshot.status == SubscriptionStatus::Inactive => "Inactive",
            Some(_) => "Expired",
        };

        let remaining_label = if snapshot.is_none() {
            "No active plan".to_string()
        } else {
            remaining_label(view.days_remaining)
        };

        let capabilities = Capability::ALL
            .iter()
            .map(|capability| {
                let verdict = view.require(*capability);
                CapabilityEntry {
                    capability: *capability,
                    label: capability.label(),
                    allowed: verdict.is_ok(),
                    reason: verdict.err().map(|denied| denied.reason.label()),
                }
            })
            .collect();

        Self {
            status_label,
            status: snapshot.map(|snapshot| snapshot.status.label()),
            role: state.identity.as_ref().map(|identity| identity.role.label()),
            remaining_label,
            credits_label: credits_label(view.credits),
            plan_type: snapshot
                .map(|snapshot| snapshot.plan_type.clone())
                .filter(|plan| !plan.is_empty()),
            end_date: snapshot.and_then(|snapshot| snapshot.end_date),
            view,
            capabilities,
            generation: state.generation,
            refreshed_at: state.refreshed_at,
        }
    }
}

pub fn remaining_label(days_remaining: i64) -> String {
    match days_remaining {
        0 => "Expires today".to_string(),
        1 => "1 day remaining".to_string(),
        -1 => "Expired 1 day ago".to_string(),
        days if days > 1 => format!("{days} days remaining"),
        days => format!("Expired {} days ago", days.unsigned_abs()),
    }
}

pub fn credits_label(credits: u32) -> String {
    match credits {
        1 => "1 credit".to_string(),
        other => format!("{other} credits"),
    }
}

/// Catalog entry with display strings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub id: String,
    pub name: String,
    pub price_label: String,
    pub features: Vec<String>,
    pub max_active_jobs: u32,
    pub max_database_unlocks: u32,
    pub max_location_changes: u32,
    pub worklog_access: bool,
}

impl From<&PlanRecord> for PlanSummary {
    fn from(plan: &PlanRecord) -> Self {
        let price_label = match plan.duration_days {
            0 => format!("{:.2}", plan.price),
            1 => format!("{:.2} / 1 day", plan.price),
            days => format!("{:.2} / {days} days", plan.price),
        };

        Self {
            id: plan.id.0.clone(),
            name: plan.name.clone(),
            price_label,
            features: plan.features.clone(),
            max_active_jobs: plan.limits.max_active_jobs,
            max_database_unlocks: plan.limits.max_database_unlocks,
            max_location_changes: plan.limits.max_location_changes,
            worklog_access: plan.limits.worklog_access,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::subscriptions::domain::{PlanId, PlanLimits, SubscriptionSnapshot};
    use crate::workflows::subscriptions::entitlements::evaluate;
    use chrono::{Duration, TimeZone};

    fn state_for(snapshot: Option<SubscriptionSnapshot>, now: DateTime<Utc>) -> EntitlementState {
        EntitlementState {
            generation: 3,
            identity: None,
            view: evaluate(snapshot.as_ref(), now),
            snapshot,
            refreshed_at: Some(now),
        }
    }

    #[test]
    fn remaining_label_covers_past_and_future() {
        assert_eq!(remaining_label(12), "12 days remaining");
        assert_eq!(remaining_label(1), "1 day remaining");
        assert_eq!(remaining_label(0), "Expires today");
        assert_eq!(remaining_label(-1), "Expired 1 day ago");
        assert_eq!(remaining_label(-4), "Expired 4 days ago");
    }

    #[test]
    fn summary_labels_expired_subscription() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let snapshot = SubscriptionSnapshot {
            status: SubscriptionStatus::Active,
            plan_type: "basic".to_string(),
            end_date: Some(now - Duration::days(3)),
            max_active_jobs: 2,
            max_database_unlocks: 5,
            database_unlocks_used: 4,
            ..SubscriptionSnapshot::default()
        };

        let summary = EntitlementSummary::from_state(&state_for(Some(snapshot), now));
        assert_eq!(summary.status_label, "Expired");
        assert_eq!(summary.status, Some("active"));
        assert_eq!(summary.remaining_label, "Expired 3 days ago");
        assert_eq!(summary.credits_label, "1 credit");
        assert_eq!(summary.plan_type.as_deref(), Some("basic"));
        assert!(summary.capabilities.iter().all(|entry| !entry.allowed));
        assert!(summary
            .capabilities
            .iter()
            .all(|entry| entry.reason == Some("no active subscription")));
    }

    #[test]
    fn summary_without_snapshot() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let summary = EntitlementSummary::from_state(&state_for(None, now));
        assert_eq!(summary.status_label, "No subscription");
        assert!(summary.status.is_none());
        assert!(summary.role.is_none());
        assert_eq!(summary.credits_label, "0 credits");
        assert!(summary.plan_type.is_none());
    }

    #[test]
    fn plan_summary_formats_price() {
        let plan = PlanRecord {
            id: PlanId("premium".to_string()),
            name: "Premium".to_string(),
            price: 999.0,
            duration_days: 30,
            features: vec!["Work logs".to_string()],
            limits: PlanLimits {
                worklog_access: true,
                ..PlanLimits::default()
            },
        };
        let summary = PlanSummary::from(&plan);
        assert_eq!(summary.price_label, "999.00 / 30 days");
        assert!(summary.worklog_access);
    }
}
