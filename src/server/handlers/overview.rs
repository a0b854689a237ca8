use axum::{Json, extract::State};
use std::sync::Arc;

use crate::catalog::StoryStore as _;
use crate::error::AppError;
use crate::server::AppState;
use crate::subscription::{LedgerStore as _, format_minor_units};
use crate::users::UserStore as _;

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Admin dashboard metrics: totals plus per-year month-bucketed subscription
/// revenue and user growth. Each story part carries four audio tracks, hence
/// the audio count.
pub async fn overview(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let total_users = app_state.users.count_users().await?;
    let total_audios = app_state.stories.count_parts().await? * 4;
    let total_subscriptions = app_state.ledger.count_entries().await?;
    let total_revenue = app_state.ledger.total_revenue_minor_units().await?;

    let revenue_buckets = app_state.ledger.monthly_revenue().await?;
    let mut subscriptions_by_month: Vec<serde_json::Value> = Vec::new();
    for bucket in &revenue_buckets {
        let year = bucket.year;
        if subscriptions_by_month
            .last()
            .and_then(|v| v["year"].as_i64())
            != Some(year as i64)
        {
            subscriptions_by_month.push(serde_json::json!({
                "year": year,
                "totalRevenue": "0.00",
                "monthlySales": MONTHS
                    .iter()
                    .map(|m| serde_json::json!({ "month": m, "totalSales": "0.00" }))
                    .collect::<Vec<_>>(),
            }));
        }
        let entry = subscriptions_by_month
            .last_mut()
            .ok_or_else(|| AppError::Config("overview bucketing".into()))?;
        let year_total: i64 = revenue_buckets
            .iter()
            .filter(|b| b.year == year)
            .map(|b| b.total_minor_units)
            .sum();
        entry["totalRevenue"] = serde_json::json!(format_minor_units(year_total));
        entry["monthlySales"][(bucket.month - 1) as usize]["totalSales"] =
            serde_json::json!(format_minor_units(bucket.total_minor_units));
    }

    let growth_buckets = app_state.users.monthly_signup_counts().await?;
    let mut user_growth_by_month: Vec<serde_json::Value> = Vec::new();
    for bucket in &growth_buckets {
        let year = bucket.year;
        if user_growth_by_month.last().and_then(|v| v["year"].as_i64()) != Some(year as i64) {
            user_growth_by_month.push(serde_json::json!({
                "year": year,
                "totalUserGrowth": 0,
                "monthlyUserGrowth": MONTHS
                    .iter()
                    .map(|m| serde_json::json!({ "month": m, "userCount": 0 }))
                    .collect::<Vec<_>>(),
            }));
        }
        let entry = user_growth_by_month
            .last_mut()
            .ok_or_else(|| AppError::Config("overview bucketing".into()))?;
        let year_total: i64 = growth_buckets
            .iter()
            .filter(|b| b.year == year)
            .map(|b| b.count)
            .sum();
        entry["totalUserGrowth"] = serde_json::json!(year_total);
        entry["monthlyUserGrowth"][(bucket.month - 1) as usize]["userCount"] =
            serde_json::json!(bucket.count);
    }

    Ok(Json(serde_json::json!({
        "totalUsers": total_users,
        "totalAudios": total_audios,
        "totalRevenue": format_minor_units(total_revenue),
        "totalSubscriptions": total_subscriptions,
        "subscriptionsByMonth": subscriptions_by_month,
        "userGrowthByMonth": user_growth_by_month,
    })))
}
