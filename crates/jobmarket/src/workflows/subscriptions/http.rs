use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::backend::{BackendError, SubscriptionBackend};
use super::domain::{PlanId, PlanRecord, PurchaseReceipt, SessionIdentity, SubscriptionSnapshot};
use crate::config::BackendConfig;

/// `reqwest` client for the subscription endpoints of the marketplace API.
#[derive(Debug, Clone)]
pub struct HttpSubscriptionBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSubscriptionBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(request: RequestBuilder, identity: &SessionIdentity) -> RequestBuilder {
        match &identity.access_token {
            Some(token) => request.bearer_auth(&token.0),
            None => request,
        }
    }

    async fn read_json(response: Response) -> Result<Value, BackendError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = extract_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            warn!(status = status.as_u16(), %message, "backend returned an error");
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|err| BackendError::Decode(err.to_string()))
    }
}

#[async_trait]
impl SubscriptionBackend for HttpSubscriptionBackend {
    async fn list_plans(&self) -> Result<Vec<PlanRecord>, BackendError> {
        let response = self
            .client
            .get(self.url("/subscriptions/plans"))
            .send()
            .await?;
        let payload = Self::read_json(response).await?;
        let plans = decode_plans(payload)?;
        debug!(count = plans.len(), "fetched plan catalog");
        Ok(plans)
    }

    async fn current_subscription(
        &self,
        identity: &SessionIdentity,
    ) -> Result<Option<SubscriptionSnapshot>, BackendError> {
        let request = self.client.get(self.url("/subscriptions/current"));
        let response = Self::authorize(request, identity).send().await?;
        let payload = Self::read_json(response).await?;
        Ok(decode_current(payload))
    }

    async fn purchase_plan(
        &self,
        identity: &SessionIdentity,
        plan_id: &PlanId,
    ) -> Result<PurchaseReceipt, BackendError> {
        let request = self
            .client
            .post(self.url("/subscriptions/purchase"))
            .json(&json!({ "planId": plan_id.0 }));
        let response = Self::authorize(request, identity).send().await?;
        let payload = Self::read_json(response).await?;
        serde_json::from_value(payload).map_err(|err| BackendError::Decode(err.to_string()))
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Decodes a current-subscription payload, unwrapping `{ "subscription": ... }` and
/// `{ "data": ... }` envelopes. Empty or null payloads yield `None`.
pub fn decode_current(payload: Value) -> Option<SubscriptionSnapshot> {
    let inner = match payload {
        Value::Object(mut map) => {
            if let Some(value) = map.remove("subscription") {
                value
            } else if let Some(value) = map.remove("data") {
                value
            } else {
                Value::Object(map)
            }
        }
        other => other,
    };
    SubscriptionSnapshot::from_value(inner)
}

fn decode_plans(payload: Value) -> Result<Vec<PlanRecord>, BackendError> {
    let list = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("plans").or_else(|| map.remove("data")) {
            Some(Value::Array(items)) => items,
            _ => return Err(BackendError::Decode("plan catalog is not a list".to_string())),
        },
        Value::Null => Vec::new(),
        _ => return Err(BackendError::Decode("plan catalog is not a list".to_string())),
    };

    Ok(list
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value::<PlanRecord>(item).ok())
        .collect())
}
