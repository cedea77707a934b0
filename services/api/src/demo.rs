use crate::infra::{demo_plans, InMemorySubscriptionBackend};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use jobmarket::config::{AppConfig, BackendConfig};
use jobmarket::error::AppError;
use jobmarket::workflows::subscriptions::{
    decode_current, evaluate, Capability, EntitlementState, EntitlementStore, EntitlementSummary, FixedClock,
    HttpSubscriptionBackend, PlanId, PlanSummary, SessionIdentity, SubscriptionBackend,
    SubscriptionError, SubscriptionSnapshot, SubscriptionStatus,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// JSON file holding a subscription record (bare or wrapped in `subscription`)
    pub(crate) snapshot: PathBuf,
    /// Evaluation instant (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_timestamp)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Print the summary as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PlansListArgs {
    /// Override the marketplace backend base URL
    #[arg(long)]
    pub(crate) backend_url: Option<String>,
    /// Print the catalog as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Instant the demo clock is pinned to (defaults to now)
    #[arg(long, value_parser = crate::infra::parse_timestamp)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Employer account used for the walkthrough
    #[arg(long, default_value = "emp-demo")]
    pub(crate) employer: String,
    /// Plan purchased during the walkthrough
    #[arg(long, default_value = "premium")]
    pub(crate) plan: String,
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        snapshot,
        now,
        json,
    } = args;

    let raw = std::fs::read_to_string(&snapshot)?;
    let document: Value = serde_json::from_str(&raw)?;
    let snapshot = decode_current(document);
    let now = now.unwrap_or_else(Utc::now);

    let state = EntitlementState {
        generation: 0,
        identity: None,
        view: evaluate(snapshot.as_ref(), now),
        snapshot,
        refreshed_at: Some(now),
    };
    let summary = EntitlementSummary::from_state(&state);

    if json {
        let rendered = serde_json::to_string_pretty(&summary).map_err(AppError::Output)?;
        println!("{rendered}");
    } else {
        println!("Entitlements as of {}", now.to_rfc3339());
        render_summary(&summary);
    }
    Ok(())
}

pub(crate) async fn run_plans_list(args: PlansListArgs) -> Result<(), AppError> {
    let PlansListArgs { backend_url, json } = args;

    let mut config = AppConfig::load()?;
    if let Some(base_url) = backend_url {
        config.backend = BackendConfig::new(base_url, config.backend.timeout_secs)?;
    }

    let backend = HttpSubscriptionBackend::new(&config.backend).map_err(SubscriptionError::from)?;
    let plans = backend
        .list_plans()
        .await
        .map_err(SubscriptionError::from)?;
    let summaries: Vec<PlanSummary> = plans.iter().map(PlanSummary::from).collect();

    if json {
        let rendered = serde_json::to_string_pretty(&summaries).map_err(AppError::Output)?;
        println!("{rendered}");
    } else {
        println!("Plans offered by {}", backend.base_url());
        render_plans(&summaries);
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        now,
        employer,
        plan,
    } = args;

    let now = now.unwrap_or_else(Utc::now);
    let clock = FixedClock(now);
    let backend = Arc::new(InMemorySubscriptionBackend::new(demo_plans(), clock));
    let store = EntitlementStore::with_clock(backend.clone(), clock);
    let identity = SessionIdentity::employer(employer.clone());

    println!("Entitlement demo for employer {employer}");

    let expired = SubscriptionSnapshot {
        status: SubscriptionStatus::Active,
        plan_type: "basic".to_string(),
        end_date: Some(now - Duration::days(3)),
        max_active_jobs: 5,
        max_database_unlocks: 10,
        database_unlocks_used: 10,
        max_location_changes: 1,
        location_changes_used: 1,
        worklog_access_expiry: None,
    };
    backend
        .seed(&identity.user_id, expired)
        .map_err(SubscriptionError::from)?;

    store.set_identity(Some(identity.clone())).await?;
    println!("\n1. Signed in with a lapsed basic plan");
    render_summary(&EntitlementSummary::from_state(&store.current()));

    println!("\n2. Plan catalog");
    let plans = store.plans().await?;
    let summaries: Vec<PlanSummary> = plans.iter().map(PlanSummary::from).collect();
    render_plans(&summaries);

    let receipt = store.purchase(&PlanId(plan.clone())).await?;
    store.refresh().await?;
    println!("\n3. Purchased '{plan}': {}", receipt.message);
    render_summary(&EntitlementSummary::from_state(&store.current()));

    backend
        .consume_unlock(&identity.user_id)
        .map_err(SubscriptionError::from)?;
    store.refresh().await?;
    println!("\n4. After unlocking one worker profile");
    render_summary(&EntitlementSummary::from_state(&store.current()));

    store.set_identity(None).await?;
    println!("\n5. Signed out");
    match store.require(Capability::PostJob) {
        Ok(()) => println!("- posting a job is still allowed"),
        Err(err) => println!("- {err}"),
    }

    Ok(())
}

fn render_summary(summary: &EntitlementSummary) {
    let plan = summary.plan_type.as_deref().unwrap_or("none");
    println!(
        "- {} | plan {} | {} | {}",
        summary.status_label, plan, summary.remaining_label, summary.credits_label
    );
    for entry in &summary.capabilities {
        match entry.reason {
            None => println!("  - {}: allowed", entry.label),
            Some(reason) => println!("  - {}: blocked ({reason})", entry.label),
        }
    }
}

fn render_plans(plans: &[PlanSummary]) {
    if plans.is_empty() {
        println!("- no plans available");
        return;
    }
    for plan in plans {
        println!("- {} ({}) {}", plan.name, plan.id, plan.price_label);
        println!(
            "  {} active jobs | {} unlocks | {} location changes | work logs: {}",
            plan.max_active_jobs,
            plan.max_database_unlocks,
            plan.max_location_changes,
            if plan.worklog_access { "yes" } else { "no" }
        );
        for feature in &plan.features {
            println!("  * {feature}");
        }
    }
}
