use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identifier wrapper for marketplace users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for subscription plans in the backend catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub String);

/// Marketplace role of the signed-in account. Only employers hold subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Worker,
    Employer,
}

impl UserRole {
    pub const fn label(self) -> &'static str {
        match self {
            UserRole::Worker => "worker",
            UserRole::Employer => "employer",
        }
    }
}

/// Bearer token handed over by the session layer. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Authenticated account as reported by the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub role: UserRole,
    #[serde(default, skip_serializing)]
    pub access_token: Option<AccessToken>,
}

impl SessionIdentity {
    pub fn employer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role: UserRole::Employer,
            access_token: None,
        }
    }

    pub fn worker(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role: UserRole::Worker,
            access_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(AccessToken(token.into()));
        self
    }

    pub fn is_employer(&self) -> bool {
        self.role == UserRole::Employer
    }
}

/// Backend-reported lifecycle of a subscription record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    #[default]
    Inactive,
    Expired,
}

impl SubscriptionStatus {
    /// Case-insensitive; anything unrecognized is treated as inactive.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "expired" => Self::Expired,
            _ => Self::Inactive,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

/// Fetched copy of the backend subscription record at one point in time.
///
/// Decoding coalesces missing or mistyped fields to their zero value so that a
/// sloppy payload never prevents the entitlement view from being computed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSubscriptionRecord")]
pub struct SubscriptionSnapshot {
    pub status: SubscriptionStatus,
    pub plan_type: String,
    pub end_date: Option<DateTime<Utc>>,
    pub max_active_jobs: u32,
    pub max_database_unlocks: u32,
    pub database_unlocks_used: u32,
    pub max_location_changes: u32,
    pub location_changes_used: u32,
    pub worklog_access_expiry: Option<DateTime<Utc>>,
}

impl SubscriptionSnapshot {
    /// Decodes an arbitrary JSON value. Non-object payloads yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) if map.is_empty() => None,
            Value::Object(_) => serde_json::from_value::<RawSubscriptionRecord>(value)
                .ok()
                .map(Self::from),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSubscriptionRecord {
    status: Option<Value>,
    plan_type: Option<Value>,
    end_date: Option<Value>,
    max_active_jobs: Option<Value>,
    max_database_unlocks: Option<Value>,
    database_unlocks_used: Option<Value>,
    max_location_changes: Option<Value>,
    location_changes_used: Option<Value>,
    worklog_access_expiry: Option<Value>,
}

impl From<RawSubscriptionRecord> for SubscriptionSnapshot {
    fn from(raw: RawSubscriptionRecord) -> Self {
        Self {
            status: raw
                .status
                .as_ref()
                .and_then(Value::as_str)
                .map(SubscriptionStatus::parse_lenient)
                .unwrap_or_default(),
            plan_type: lenient_string(raw.plan_type.as_ref()),
            end_date: lenient_timestamp(raw.end_date.as_ref()),
            max_active_jobs: lenient_count(raw.max_active_jobs.as_ref()),
            max_database_unlocks: lenient_count(raw.max_database_unlocks.as_ref()),
            database_unlocks_used: lenient_count(raw.database_unlocks_used.as_ref()),
            max_location_changes: lenient_count(raw.max_location_changes.as_ref()),
            location_changes_used: lenient_count(raw.location_changes_used.as_ref()),
            worklog_access_expiry: lenient_timestamp(raw.worklog_access_expiry.as_ref()),
        }
    }
}

/// Usage limits granted by a catalog plan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_active_jobs: u32,
    pub max_database_unlocks: u32,
    pub max_location_changes: u32,
    pub worklog_access: bool,
}

/// Entry of the purchasable plan catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawPlanRecord")]
pub struct PlanRecord {
    pub id: PlanId,
    pub name: String,
    pub price: f64,
    pub duration_days: u32,
    pub features: Vec<String>,
    pub limits: PlanLimits,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPlanRecord {
    #[serde(alias = "_id")]
    id: Option<Value>,
    name: Option<Value>,
    price: Option<Value>,
    #[serde(alias = "duration")]
    duration_days: Option<Value>,
    features: Option<Value>,
    limits: Option<Value>,
}

impl From<RawPlanRecord> for PlanRecord {
    fn from(raw: RawPlanRecord) -> Self {
        let limits = match raw.limits {
            Some(Value::Object(map)) => PlanLimits {
                max_active_jobs: lenient_count(map.get("maxActiveJobs")),
                max_database_unlocks: lenient_count(map.get("maxDatabaseUnlocks")),
                max_location_changes: lenient_count(map.get("maxLocationChanges")),
                worklog_access: map
                    .get("worklogAccess")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            _ => PlanLimits::default(),
        };

        let features = match raw.features {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            _ => Vec::new(),
        };

        Self {
            id: PlanId(lenient_string(raw.id.as_ref())),
            name: lenient_string(raw.name.as_ref()),
            price: lenient_decimal(raw.price.as_ref()),
            duration_days: lenient_count(raw.duration_days.as_ref()),
            features,
            limits,
        }
    }
}

/// Outcome of a successful purchase request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "optional_snapshot")]
    pub subscription: Option<SubscriptionSnapshot>,
}

fn optional_snapshot<'de, D>(deserializer: D) -> Result<Option<SubscriptionSnapshot>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(SubscriptionSnapshot::from_value(value))
}

fn lenient_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn lenient_count(value: Option<&Value>) -> u32 {
    let raw = match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64)),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|float| float.trunc() as i64))
        }
        _ => None,
    };

    raw.map(|count| count.clamp(0, i64::from(u32::MAX)) as u32)
        .unwrap_or(0)
}

fn lenient_decimal(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    raw.filter(|price| price.is_finite() && *price >= 0.0)
        .unwrap_or(0.0)
}

fn lenient_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(text) => parse_timestamp(text),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
