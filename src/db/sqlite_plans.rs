use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::db::Database;
use crate::db::time::{parse_utc_column, to_utc_string};
use crate::error::AppError;
use crate::subscription::{
    BillingPeriod, CreatePlanPayload, LedgerEntry, LedgerStore, MonthlyRevenue, Plan, PlanStore,
    SubscriberRecord, UpdatePlanPayload, parse_minor_units,
};
use crate::users::Language;

const PLAN_COLUMNS: &str = "id, name, price, billing, details, is_deleted, created_at, updated_at";

fn row_to_plan(row: &rusqlite::Row<'_>) -> rusqlite::Result<Plan> {
    let billing_s: String = row.get(3)?;
    let details_s: String = row.get(4)?;
    let is_deleted: i64 = row.get(5)?;
    let created_at_s: String = row.get(6)?;
    let updated_at_s: String = row.get(7)?;
    Ok(Plan {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        billing: BillingPeriod::parse(&billing_s).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, "billing".into(), rusqlite::types::Type::Text)
        })?,
        details: serde_json::from_str(&details_s).unwrap_or_default(),
        is_deleted: is_deleted != 0,
        created_at: parse_utc_column(6, &created_at_s)?,
        updated_at: parse_utc_column(7, &updated_at_s)?,
    })
}

#[async_trait]
impl PlanStore for Database {
    async fn create_plan(&self, payload: CreatePlanPayload) -> Result<Plan, AppError> {
        if parse_minor_units(&payload.price).is_none() {
            return Err(AppError::InvalidState(format!(
                "invalid plan price: {}",
                payload.price
            )));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let details = serde_json::to_string(&payload.details)?;

        let conn = self.connection.lock().await;
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM plans WHERE name = ?1",
                [&payload.name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(AppError::Conflict("Name already exist!".into()));
        }

        conn.execute(
            "INSERT INTO plans (id, name, price, billing, details, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            rusqlite::params![
                &id,
                &payload.name,
                &payload.price,
                payload.billing.as_str(),
                &details,
                to_utc_string(&now),
                to_utc_string(&now),
            ],
        )?;

        Ok(Plan {
            id,
            name: payload.name,
            price: payload.price,
            billing: payload.billing,
            details: payload.details,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_plan(&self, id: &str) -> Result<Option<Plan>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM plans WHERE id = ?1", PLAN_COLUMNS))?;
        Ok(stmt.query_row([id], row_to_plan).optional()?)
    }

    async fn list_plans(&self, page: i64, limit: i64) -> Result<Vec<Plan>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM plans ORDER BY created_at LIMIT ?1 OFFSET ?2",
            PLAN_COLUMNS
        ))?;
        let rows = stmt.query_map([limit, (page - 1) * limit], row_to_plan)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn update_plan(
        &self,
        id: &str,
        payload: UpdatePlanPayload,
    ) -> Result<Option<Plan>, AppError> {
        if let Some(price) = &payload.price {
            if parse_minor_units(price).is_none() {
                return Err(AppError::InvalidState(format!("invalid plan price: {}", price)));
            }
        }

        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM plans WHERE id = ?1", PLAN_COLUMNS))?;
        let Some(mut plan) = stmt.query_row([id], row_to_plan).optional()? else {
            return Ok(None);
        };

        if let Some(v) = payload.name {
            let clash: Option<String> = conn
                .query_row(
                    "SELECT id FROM plans WHERE name = ?1 AND id != ?2",
                    rusqlite::params![&v, id],
                    |row| row.get(0),
                )
                .optional()?;
            if clash.is_some() {
                return Err(AppError::Conflict("Name already exist!".into()));
            }
            plan.name = v;
        }
        if let Some(v) = payload.price {
            plan.price = v;
        }
        if let Some(v) = payload.billing {
            plan.billing = v;
        }
        if let Some(v) = payload.details {
            plan.details = v;
        }
        plan.updated_at = Utc::now();

        conn.execute(
            "UPDATE plans SET name = ?2, price = ?3, billing = ?4, details = ?5, updated_at = ?6
             WHERE id = ?1",
            rusqlite::params![
                &plan.id,
                &plan.name,
                &plan.price,
                plan.billing.as_str(),
                serde_json::to_string(&plan.details)?,
                to_utc_string(&plan.updated_at),
            ],
        )?;

        Ok(Some(plan))
    }

    async fn soft_delete_plan(&self, id: &str) -> Result<Option<Plan>, AppError> {
        let now = Utc::now();
        let conn = self.connection.lock().await;
        let changed = conn.execute(
            "UPDATE plans SET is_deleted = 1, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![id, to_utc_string(&now)],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM plans WHERE id = ?1", PLAN_COLUMNS))?;
        Ok(stmt.query_row([id], row_to_plan).optional()?)
    }
}

fn row_to_subscriber(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriberRecord> {
    let purchased_at_s: String = row.get(1)?;
    let billing_s: String = row.get(5)?;
    let details_s: String = row.get(6)?;
    let is_deleted: i64 = row.get(7)?;
    let plan_created_s: String = row.get(8)?;
    let plan_updated_s: String = row.get(9)?;
    let language_s: String = row.get(14)?;
    Ok(SubscriberRecord {
        id: row.get(0)?,
        purchased_at: parse_utc_column(1, &purchased_at_s)?,
        plan: Plan {
            id: row.get(2)?,
            name: row.get(3)?,
            price: row.get(4)?,
            billing: BillingPeriod::parse(&billing_s).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(5, "billing".into(), rusqlite::types::Type::Text)
            })?,
            details: serde_json::from_str(&details_s).unwrap_or_default(),
            is_deleted: is_deleted != 0,
            created_at: parse_utc_column(8, &plan_created_s)?,
            updated_at: parse_utc_column(9, &plan_updated_s)?,
        },
        user_id: row.get(10)?,
        user_name: row.get(11)?,
        user_email: row.get(12)?,
        user_image: row.get(13)?,
        user_language: Language::parse(&language_s).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(14, "language".into(), rusqlite::types::Type::Text)
        })?,
    })
}

const SUBSCRIBER_SELECT: &str = "SELECT l.id, l.purchased_at,
        p.id, p.name, p.price, p.billing, p.details, p.is_deleted, p.created_at, p.updated_at,
        u.id, u.name, u.email, u.image, u.language
 FROM ledger l
 JOIN plans p ON p.id = l.plan_id
 JOIN users u ON u.id = l.user_id";

#[async_trait]
impl LedgerStore for Database {
    async fn append_entry(&self, user_id: &str, plan_id: &str) -> Result<LedgerEntry, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO ledger (id, user_id, plan_id, purchased_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![&id, user_id, plan_id, to_utc_string(&now)],
        )?;
        Ok(LedgerEntry {
            id,
            user_id: user_id.to_string(),
            plan_id: plan_id.to_string(),
            purchased_at: now,
        })
    }

    async fn get_entry(&self, id: &str) -> Result<Option<SubscriberRecord>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!("{} WHERE l.id = ?1", SUBSCRIBER_SELECT))?;
        Ok(stmt.query_row([id], row_to_subscriber).optional()?)
    }

    async fn list_subscribers(
        &self,
        page: i64,
        limit: i64,
    ) -> Result<Vec<SubscriberRecord>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY l.purchased_at DESC LIMIT ?1 OFFSET ?2",
            SUBSCRIBER_SELECT
        ))?;
        let rows = stmt.query_map([limit, (page - 1) * limit], row_to_subscriber)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn count_entries(&self) -> Result<i64, AppError> {
        let conn = self.connection.lock().await;
        Ok(conn.query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0))?)
    }

    async fn total_revenue_minor_units(&self) -> Result<i64, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT p.price FROM ledger l JOIN plans p ON p.id = l.plan_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut total = 0i64;
        for r in rows {
            let price = r?;
            total += parse_minor_units(&price)
                .ok_or_else(|| AppError::Config(format!("invalid plan price: {}", price)))?;
        }
        Ok(total)
    }

    async fn monthly_revenue(&self) -> Result<Vec<MonthlyRevenue>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT CAST(strftime('%Y', l.purchased_at) AS INTEGER),
                    CAST(strftime('%m', l.purchased_at) AS INTEGER),
                    p.price
             FROM ledger l JOIN plans p ON p.id = l.plan_id
             ORDER BY 1, 2",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i32>(0)?, row.get::<_, u32>(1)?, row.get::<_, String>(2)?))
        })?;
        let mut out: Vec<MonthlyRevenue> = Vec::new();
        for r in rows {
            let (year, month, price) = r?;
            let amount = parse_minor_units(&price)
                .ok_or_else(|| AppError::Config(format!("invalid plan price: {}", price)))?;
            match out.last_mut() {
                Some(bucket) if bucket.year == year && bucket.month == month => {
                    bucket.total_minor_units += amount;
                }
                _ => out.push(MonthlyRevenue {
                    year,
                    month,
                    total_minor_units: amount,
                }),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{CreateUserPayload, UserStore};
    use tempfile::tempdir;

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (dir, db)
    }

    fn pro_plan() -> CreatePlanPayload {
        CreatePlanPayload {
            name: "Pro".into(),
            price: "9.99".into(),
            billing: BillingPeriod::Monthly,
            details: vec!["all stories".into()],
        }
    }

    #[tokio::test]
    async fn plan_names_are_unique() {
        let (_dir, db) = test_db().await;
        db.create_plan(pro_plan()).await.unwrap();
        let err = db.create_plan(pro_plan()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn bad_price_is_rejected_up_front() {
        let (_dir, db) = test_db().await;
        let mut payload = pro_plan();
        payload.price = "9.999".into();
        let err = db.create_plan(payload).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn soft_delete_keeps_the_row() {
        let (_dir, db) = test_db().await;
        let plan = db.create_plan(pro_plan()).await.unwrap();
        let deleted = db.soft_delete_plan(&plan.id).await.unwrap().unwrap();
        assert!(deleted.is_deleted);
        // Still resolvable by id for historical ledger joins.
        assert!(db.get_plan(&plan.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ledger_appends_and_aggregates() {
        let (_dir, db) = test_db().await;
        let plan = db.create_plan(pro_plan()).await.unwrap();
        let user = db
            .create_user(CreateUserPayload {
                name: "Alice".into(),
                email: "alice@example.com".into(),
                image: None,
                language: crate::users::Language::English,
            })
            .await
            .unwrap();

        db.append_entry(&user.id, &plan.id).await.unwrap();
        db.append_entry(&user.id, &plan.id).await.unwrap();

        assert_eq!(db.count_entries().await.unwrap(), 2);
        assert_eq!(db.total_revenue_minor_units().await.unwrap(), 1998);

        let buckets = db.monthly_revenue().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total_minor_units, 1998);

        let subs = db.list_subscribers(1, 10).await.unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].plan.name, "Pro");
        assert_eq!(subs[0].user_email, "alice@example.com");

        let one = db.get_entry(&subs[0].id).await.unwrap().unwrap();
        assert_eq!(one.user_name, "Alice");
    }
}
