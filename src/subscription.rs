use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::users::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Annually,
}

impl BillingPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Annually => "annually",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(BillingPeriod::Monthly),
            "annually" => Some(BillingPeriod::Annually),
            _ => None,
        }
    }

    /// Length of the entitlement window opened by one confirmed payment.
    pub fn entitlement_days(self) -> i64 {
        match self {
            BillingPeriod::Monthly => 30,
            BillingPeriod::Annually => 365,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub name: String,
    // 价格以十进制字符串存储，避免浮点舍入
    pub price: String,
    pub billing: BillingPeriod,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Exact-precision conversion of the decimal price into minor units
    /// (cents). Accepts at most two fractional digits.
    pub fn price_minor_units(&self) -> Result<i64, AppError> {
        parse_minor_units(&self.price)
            .ok_or_else(|| AppError::Config(format!("invalid plan price: {}", self.price)))
    }
}

pub fn parse_minor_units(price: &str) -> Option<i64> {
    let price = price.trim();
    let (whole, frac) = match price.split_once('.') {
        Some((w, f)) => (w, f),
        None => (price, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 2 {
        return None;
    }
    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<2}", frac);
        padded.parse().ok()?
    };
    if whole < 0 || frac < 0 {
        return None;
    }
    Some(whole * 100 + frac)
}

pub fn format_minor_units(amount: i64) -> String {
    format!("{}.{:02}", amount / 100, amount % 100)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanPayload {
    pub name: String,
    pub price: String,
    pub billing: BillingPeriod,
    #[serde(default)]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub billing: Option<BillingPeriod>,
    #[serde(default)]
    pub details: Option<Vec<String>>,
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn create_plan(&self, payload: CreatePlanPayload) -> Result<Plan, AppError>;
    async fn get_plan(&self, id: &str) -> Result<Option<Plan>, AppError>;
    async fn list_plans(&self, page: i64, limit: i64) -> Result<Vec<Plan>, AppError>;
    async fn update_plan(
        &self,
        id: &str,
        payload: UpdatePlanPayload,
    ) -> Result<Option<Plan>, AppError>;
    /// Plans referenced by ledger rows stay around for historical accuracy;
    /// deletion only flips the flag.
    async fn soft_delete_plan(&self, id: &str) -> Result<Option<Plan>, AppError>;
}

/// One confirmed purchase. Append-only: nothing in the system mutates or
/// deletes these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub purchased_at: DateTime<Utc>,
}

/// Ledger row joined with display fields for the admin subscriber listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberRecord {
    pub id: String,
    pub purchased_at: DateTime<Utc>,
    pub plan: Plan,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub user_image: String,
    pub user_language: Language,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyRevenue {
    pub year: i32,
    pub month: u32,
    pub total_minor_units: i64,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append_entry(&self, user_id: &str, plan_id: &str) -> Result<LedgerEntry, AppError>;
    async fn get_entry(&self, id: &str) -> Result<Option<SubscriberRecord>, AppError>;
    async fn list_subscribers(
        &self,
        page: i64,
        limit: i64,
    ) -> Result<Vec<SubscriberRecord>, AppError>;
    async fn count_entries(&self) -> Result<i64, AppError>;
    async fn total_revenue_minor_units(&self) -> Result<i64, AppError>;
    async fn monthly_revenue(&self) -> Result<Vec<MonthlyRevenue>, AppError>;
}
