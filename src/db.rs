use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Row};
use uuid::Uuid;

use crate::error::StudioError;
use crate::kpi::MonthPeriod;
use crate::models::{
    normalize_join, ActiveSubscription, BookingCount, CategorizedExpense, ChurnLogEntry,
    ClassInstance, ClassSchedule, ConfigRow, FinancialStatsCache, Joined, MarketingSpend,
    MemberSubscription, MemberTicket, MembershipRow, MonthlyExpense, NewExpense,
    NewMarketingSpend, NewMember, PaidDocument, PlanRef, TenureSubscription,
};
use crate::store::StudioStore;

/// Plan joined as a JSON object so the row decodes through the same
/// normalization as array-shaped joins.
const PLAN_JOIN: &str =
    "(SELECT to_jsonb(p) FROM subscription_plans p WHERE p.id = s.plan_id) AS plan";

/// Statuses that occupy a seat.
const BOOKING_COUNT_JOIN: &str = "(SELECT jsonb_build_array(jsonb_build_object('count', count(*))) \
     FROM class_bookings b \
     WHERE b.class_id = c.id AND b.status IN ('confirmed', 'completed', 'no_show', 'late')) AS bookings";

async fn insert_expense_row<'e, E>(executor: E, expense: &NewExpense) -> Result<(), StudioError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO monthly_expenses
        (id, month, year, category, description, amount, is_fixed, vendor_name, notes)
        VALUES ($1, $2, $3, $4, $5, $6::float8, $7, $8, $9)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(expense.month)
    .bind(expense.year)
    .bind(&expense.category)
    .bind(&expense.description)
    .bind(expense.amount)
    .bind(expense.is_fixed)
    .bind(&expense.vendor_name)
    .bind(&expense.notes)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn to_local(at: DateTime<Utc>) -> NaiveDateTime {
    at.with_timezone(&Local).naive_local()
}

/// Local wall-clock time to an instant. Times skipped by a DST jump are
/// read as UTC.
fn to_utc(at: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&at)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| at.and_utc())
}

fn local_column(row: &PgRow, column: &str) -> Result<NaiveDateTime, sqlx::Error> {
    Ok(to_local(row.try_get::<DateTime<Utc>, _>(column)?))
}

fn optional_local_column(row: &PgRow, column: &str) -> Result<Option<NaiveDateTime>, sqlx::Error> {
    Ok(row
        .try_get::<Option<DateTime<Utc>>, _>(column)?
        .map(to_local))
}

fn plan_column(row: &PgRow) -> Result<Option<PlanRef>, sqlx::Error> {
    let raw: Option<Json<Joined<PlanRef>>> = row.try_get("plan")?;
    Ok(normalize_join(raw.map(|json| json.0)))
}

fn decode_all<T>(
    rows: Vec<PgRow>,
    decode: impl Fn(&PgRow) -> Result<T, sqlx::Error>,
) -> Result<Vec<T>, StudioError> {
    Ok(rows.iter().map(decode).collect::<Result<Vec<_>, _>>()?)
}

pub struct PgStudioStore {
    pool: PgPool,
}

impl PgStudioStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudioStore for PgStudioStore {
    async fn active_subscriptions(&self) -> Result<Vec<ActiveSubscription>, StudioError> {
        let query = format!(
            "SELECT s.id, s.user_id, s.start_date, {PLAN_JOIN} \
             FROM user_subscriptions s \
             WHERE s.is_active = TRUE AND s.plan_status = 'active'"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        decode_all(rows, |row| {
            Ok(ActiveSubscription {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                start_date: optional_local_column(row, "start_date")?,
                plan: plan_column(row)?,
            })
        })
    }

    async fn churn_log(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<ChurnLogEntry>, StudioError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, churn_date, reason, price_at_churn::float8 AS price_at_churn,
                   plan_name, months_subscribed
            FROM member_churn_log
            WHERE churn_date >= $1 AND churn_date <= $2
            "#,
        )
        .bind(to_utc(from))
        .bind(to_utc(to))
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows, |row| {
            Ok(ChurnLogEntry {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                churn_date: local_column(row, "churn_date")?,
                reason: row.try_get("reason")?,
                price_at_churn: row.try_get("price_at_churn")?,
                plan_name: row.try_get("plan_name")?,
                months_subscribed: row.try_get("months_subscribed")?,
            })
        })
    }

    async fn marketing_spend(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Vec<MarketingSpend>, StudioError> {
        let rows = sqlx::query(
            r#"
            SELECT id, month, year, channel, amount::float8 AS amount, leads_generated,
                   trials_booked, conversions, notes
            FROM marketing_spend
            WHERE month = $1 AND year = $2
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows, |row| {
            Ok(MarketingSpend {
                id: row.try_get("id")?,
                month: row.try_get("month")?,
                year: row.try_get("year")?,
                channel: row.try_get("channel")?,
                amount: row.try_get("amount")?,
                leads_generated: row.try_get("leads_generated")?,
                trials_booked: row.try_get("trials_booked")?,
                conversions: row.try_get("conversions")?,
                notes: row.try_get("notes")?,
            })
        })
    }

    async fn monthly_expenses(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Vec<MonthlyExpense>, StudioError> {
        let rows = sqlx::query(
            r#"
            SELECT id, month, year, category, description, amount::float8 AS amount, is_fixed,
                   vendor_name, notes
            FROM monthly_expenses
            WHERE month = $1 AND year = $2
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows, |row| {
            Ok(MonthlyExpense {
                id: row.try_get("id")?,
                month: row.try_get("month")?,
                year: row.try_get("year")?,
                category: row.try_get("category")?,
                description: row.try_get("description")?,
                amount: row.try_get("amount")?,
                is_fixed: row.try_get("is_fixed")?,
                vendor_name: row.try_get("vendor_name")?,
                notes: row.try_get("notes")?,
            })
        })
    }

    async fn studio_config(&self) -> Result<Vec<ConfigRow>, StudioError> {
        let rows = sqlx::query("SELECT key, value FROM studio_config ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        decode_all(rows, |row| {
            Ok(ConfigRow {
                key: row.try_get("key")?,
                value: row.try_get("value")?,
            })
        })
    }

    async fn financial_stats(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Option<FinancialStatsCache>, StudioError> {
        let row = sqlx::query(
            r#"
            SELECT month, year, total_income::float8 AS total_income,
                   total_expenses::float8 AS total_expenses, net_profit::float8 AS net_profit,
                   income_by_payment_type
            FROM financial_stats_cache
            WHERE month = $1 AND year = $2
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let by_type: Option<Json<BTreeMap<String, f64>>> = row.try_get("income_by_payment_type")?;
        Ok(Some(FinancialStatsCache {
            month: row.try_get("month")?,
            year: row.try_get("year")?,
            total_income: row.try_get("total_income")?,
            total_expenses: row.try_get("total_expenses")?,
            net_profit: row.try_get("net_profit")?,
            income_by_payment_type: by_type.map(|json| json.0).unwrap_or_default(),
        }))
    }

    async fn new_members(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<NewMember>, StudioError> {
        let rows = sqlx::query(
            "SELECT id, start_date FROM user_subscriptions WHERE start_date >= $1 AND start_date <= $2",
        )
        .bind(to_utc(from))
        .bind(to_utc(to))
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows, |row| {
            Ok(NewMember {
                id: row.try_get("id")?,
                start_date: local_column(row, "start_date")?,
            })
        })
    }

    async fn tenure_subscriptions(&self) -> Result<Vec<TenureSubscription>, StudioError> {
        let rows = sqlx::query(
            r#"
            SELECT id, start_date, is_active, plan_status
            FROM user_subscriptions
            WHERE is_active = TRUE AND start_date IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows, |row| {
            Ok(TenureSubscription {
                id: row.try_get("id")?,
                start_date: local_column(row, "start_date")?,
                is_active: row.try_get("is_active")?,
                plan_status: row.try_get("plan_status")?,
            })
        })
    }

    async fn categorized_expenses(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CategorizedExpense>, StudioError> {
        let rows = sqlx::query(
            r#"
            SELECT category, amount::float8 AS amount
            FROM expenses
            WHERE expense_date >= $1 AND expense_date <= $2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows, |row| {
            Ok(CategorizedExpense {
                category: row.try_get("category")?,
                amount: row.try_get("amount")?,
            })
        })
    }

    async fn class_schedules(&self, day_of_week: i32) -> Result<Vec<ClassSchedule>, StudioError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, day_of_week, start_time, duration_minutes, max_participants,
                   coach_name, is_active
            FROM class_schedules
            WHERE is_active = TRUE AND day_of_week = $1
            ORDER BY start_time
            "#,
        )
        .bind(day_of_week)
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows, |row| {
            Ok(ClassSchedule {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                day_of_week: row.try_get("day_of_week")?,
                start_time: row.try_get::<NaiveTime, _>("start_time")?,
                duration_minutes: row.try_get("duration_minutes")?,
                max_participants: row.try_get("max_participants")?,
                coach_name: row.try_get("coach_name")?,
                is_active: row.try_get("is_active")?,
            })
        })
    }

    async fn class_instances(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<ClassInstance>, StudioError> {
        let query = format!(
            "SELECT c.id, c.schedule_id, c.name, c.name_hebrew, c.class_date, \
             c.max_participants, c.coach_name, {BOOKING_COUNT_JOIN} \
             FROM classes c \
             WHERE c.class_date >= $1 AND c.class_date <= $2 \
             ORDER BY c.class_date"
        );
        let rows = sqlx::query(&query)
            .bind(to_utc(from))
            .bind(to_utc(to))
            .fetch_all(&self.pool)
            .await?;

        decode_all(rows, |row| {
            let bookings: Option<Json<Joined<BookingCount>>> = row.try_get("bookings")?;
            Ok(ClassInstance {
                id: row.try_get("id")?,
                schedule_id: row.try_get("schedule_id")?,
                name: row.try_get("name")?,
                name_hebrew: row.try_get("name_hebrew")?,
                class_date: local_column(row, "class_date")?,
                max_participants: row.try_get("max_participants")?,
                coach_name: row.try_get("coach_name")?,
                bookings: normalize_join(bookings.map(|json| json.0)),
            })
        })
    }

    async fn paid_documents(&self, since: NaiveDateTime) -> Result<Vec<PaidDocument>, StudioError> {
        let rows = sqlx::query(
            r#"
            SELECT amount::float8 AS amount, created_at
            FROM green_invoice_documents
            WHERE created_at >= $1 AND status = 'paid'
            "#,
        )
        .bind(to_utc(since))
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows, |row| {
            Ok(PaidDocument {
                amount: row.try_get("amount")?,
                created_at: local_column(row, "created_at")?,
            })
        })
    }

    async fn lead_statuses(&self) -> Result<Vec<String>, StudioError> {
        let rows = sqlx::query("SELECT status FROM leads")
            .fetch_all(&self.pool)
            .await?;
        decode_all(rows, |row| row.try_get("status"))
    }

    async fn membership_rows(&self) -> Result<Vec<MembershipRow>, StudioError> {
        let rows = sqlx::query(
            r#"
            SELECT is_active, plan_status, outstanding_balance::float8 AS outstanding_balance,
                   end_date, created_at
            FROM user_subscriptions
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows, |row| {
            Ok(MembershipRow {
                is_active: row.try_get("is_active")?,
                plan_status: row.try_get("plan_status")?,
                outstanding_balance: row.try_get("outstanding_balance")?,
                end_date: optional_local_column(row, "end_date")?,
                created_at: local_column(row, "created_at")?,
            })
        })
    }

    async fn member_subscriptions(&self) -> Result<Vec<MemberSubscription>, StudioError> {
        let query = format!(
            "SELECT s.id, s.user_id, s.plan_status, s.is_active, s.start_date, s.end_date, \
             s.sessions_remaining, s.outstanding_balance::float8 AS outstanding_balance, \
             s.has_debt, s.debt_amount::float8 AS debt_amount, s.created_at, {PLAN_JOIN} \
             FROM user_subscriptions s \
             ORDER BY s.created_at DESC"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        decode_all(rows, |row| {
            Ok(MemberSubscription {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                plan_status: row.try_get("plan_status")?,
                is_active: row.try_get("is_active")?,
                start_date: optional_local_column(row, "start_date")?,
                end_date: optional_local_column(row, "end_date")?,
                sessions_remaining: row.try_get("sessions_remaining")?,
                outstanding_balance: row.try_get("outstanding_balance")?,
                has_debt: row.try_get("has_debt")?,
                debt_amount: row.try_get("debt_amount")?,
                created_at: local_column(row, "created_at")?,
                plan: plan_column(row)?,
            })
        })
    }

    async fn member_tickets(&self) -> Result<Vec<MemberTicket>, StudioError> {
        let query = format!(
            "SELECT s.id, s.user_id, s.status, s.sessions_remaining, s.total_sessions, \
             s.purchase_date, s.expiry_date, s.has_debt, s.created_at, {PLAN_JOIN} \
             FROM user_tickets s \
             ORDER BY s.created_at DESC"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        decode_all(rows, |row| {
            Ok(MemberTicket {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                status: row.try_get("status")?,
                sessions_remaining: row.try_get("sessions_remaining")?,
                total_sessions: row.try_get("total_sessions")?,
                purchase_date: optional_local_column(row, "purchase_date")?,
                expiry_date: optional_local_column(row, "expiry_date")?,
                has_debt: row.try_get("has_debt")?,
                created_at: local_column(row, "created_at")?,
                plan: plan_column(row)?,
            })
        })
    }

    async fn insert_expense(&self, expense: &NewExpense) -> Result<(), StudioError> {
        insert_expense_row(&self.pool, expense).await
    }

    async fn insert_expenses(&self, expenses: &[NewExpense]) -> Result<(), StudioError> {
        let mut tx = self.pool.begin().await?;
        for expense in expenses {
            insert_expense_row(&mut *tx, expense).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_marketing_spend(&self, spend: &NewMarketingSpend) -> Result<(), StudioError> {
        sqlx::query(
            r#"
            INSERT INTO marketing_spend
            (id, month, year, channel, amount, leads_generated, trials_booked, conversions, notes)
            VALUES ($1, $2, $3, $4, $5::float8, $6, $7, $8, $9)
            ON CONFLICT (year, month, channel) DO UPDATE
            SET amount = EXCLUDED.amount,
                leads_generated = EXCLUDED.leads_generated,
                trials_booked = EXCLUDED.trials_booked,
                conversions = EXCLUDED.conversions,
                notes = EXCLUDED.notes
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(spend.month)
        .bind(spend.year)
        .bind(&spend.channel)
        .bind(spend.amount)
        .bind(spend.leads_generated)
        .bind(spend.trials_booked)
        .bind(spend.conversions)
        .bind(&spend.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_config_value(
        &self,
        key: &str,
        value: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StudioError> {
        sqlx::query(
            r#"
            INSERT INTO studio_config (key, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn notification_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<BTreeMap<String, bool>, StudioError> {
        let rows = sqlx::query("SELECT key, enabled FROM notification_preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let pairs = decode_all(rows, |row| {
            Ok((row.try_get::<String, _>("key")?, row.try_get::<bool, _>("enabled")?))
        })?;
        Ok(pairs.into_iter().collect())
    }

    async fn set_notification_preference(
        &self,
        user_id: Uuid,
        key: &str,
        enabled: bool,
    ) -> Result<(), StudioError> {
        sqlx::query(
            r#"
            INSERT INTO notification_preferences (user_id, key, enabled, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, key) DO UPDATE
            SET enabled = EXCLUDED.enabled, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(key)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Demo studio data around the current month. Safe to run repeatedly.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let today = Local::now().date_naive();
    let current = MonthPeriod::containing(today);
    let previous = current.previous();
    let days_ago = |days: i64| Utc::now() - Duration::days(days);

    let unlimited = Uuid::parse_str("6f0f2a4e-8d1b-4c53-9a55-0d6b3f9c1a01")?;
    let twice_weekly = Uuid::parse_str("6f0f2a4e-8d1b-4c53-9a55-0d6b3f9c1a02")?;
    let punch_card = Uuid::parse_str("6f0f2a4e-8d1b-4c53-9a55-0d6b3f9c1a03")?;
    let plans = vec![
        (unlimited, "ללא הגבלה", 450.0, None, "subscription"),
        (twice_weekly, "פעמיים בשבוע", 320.0, None, "subscription"),
        (punch_card, "כרטיסייה 10", 500.0, Some(10), "ticket"),
    ];
    for (id, name, price, total_sessions, plan_type) in plans {
        sqlx::query(
            r#"
            INSERT INTO subscription_plans (id, name, "price-per-month", total_sessions, plan_type)
            VALUES ($1, $2, $3::float8, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, "price-per-month" = EXCLUDED."price-per-month"
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(price)
        .bind(total_sessions)
        .bind(plan_type)
        .execute(pool)
        .await?;
    }

    let subscriptions = vec![
        ("2b7e1d62-55c3-4f7e-b3f4-1a4e0c9d7e01", unlimited, "active", true, 400, None),
        ("2b7e1d62-55c3-4f7e-b3f4-1a4e0c9d7e02", unlimited, "active", true, 180, Some(250.0)),
        ("2b7e1d62-55c3-4f7e-b3f4-1a4e0c9d7e03", twice_weekly, "active", true, 5, None),
        ("2b7e1d62-55c3-4f7e-b3f4-1a4e0c9d7e04", twice_weekly, "frozen", true, 90, None),
        ("2b7e1d62-55c3-4f7e-b3f4-1a4e0c9d7e05", twice_weekly, "cancelled", false, 300, None),
    ];
    for (index, (id, plan_id, status, active, started_days_ago, balance)) in
        subscriptions.into_iter().enumerate()
    {
        let user_id = Uuid::from_u128(0x5eed_0000_0000_0000_0000_0000_0000_0001 + index as u128);
        let start = days_ago(started_days_ago);
        sqlx::query(
            r#"
            INSERT INTO user_subscriptions
            (id, user_id, plan_id, plan_status, is_active, start_date, end_date,
             outstanding_balance, has_debt, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::float8, $9, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(user_id)
        .bind(plan_id)
        .bind(status)
        .bind(active)
        .bind(start)
        .bind(Utc::now() + Duration::days(2 + index as i64 * 30))
        .bind(balance)
        .bind(balance.is_some())
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO user_tickets
        (id, user_id, plan_id, status, sessions_remaining, total_sessions, purchase_date, created_at)
        VALUES ($1, $2, $3, 'active', 6, 10, $4, $4)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("9c4d7a10-3e2b-4f61-8a7c-5b2e9d0f4a01")?)
    .bind(Uuid::from_u128(0x5eed_0000_0000_0000_0000_0000_0000_0003))
    .bind(punch_card)
    .bind(days_ago(20))
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO member_churn_log
        (id, user_id, churn_date, reason, price_at_churn, plan_name, months_subscribed)
        VALUES ($1, $2, $3, 'מעבר דירה', 320, 'פעמיים בשבוע', 9)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("1d3c5e7a-9b2f-4d6e-8a1c-3f5e7a9b2d01")?)
    .bind(Uuid::from_u128(0x5eed_0000_0000_0000_0000_0000_0000_0005))
    .bind(to_utc(current.start()) + Duration::hours(12))
    .execute(pool)
    .await?;

    let config = vec![
        ("studio_area_sqm", "120"),
        ("target_mrr", "30000"),
        ("target_members", "80"),
        ("current_rent", "9000"),
    ];
    for (key, value) in config {
        sqlx::query(
            r#"
            INSERT INTO studio_config (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    }

    let month = current.month as i32;
    let year = current.year;
    let manual_expenses = vec![
        ("7a1e0b3c-4d5f-4e6a-9b8c-0d1e2f3a4b01", "שכירות", "שכירות חודשית", 9_000.0, true),
        ("7a1e0b3c-4d5f-4e6a-9b8c-0d1e2f3a4b02", "ניקיון", "ניקיון שבועי", 800.0, false),
    ];
    for (id, category, description, amount, is_fixed) in manual_expenses {
        sqlx::query(
            r#"
            INSERT INTO monthly_expenses (id, month, year, category, description, amount, is_fixed)
            VALUES ($1, $2, $3, $4, $5, $6::float8, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(month)
        .bind(year)
        .bind(category)
        .bind(description)
        .bind(amount)
        .bind(is_fixed)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO marketing_spend
        (id, month, year, channel, amount, leads_generated, trials_booked, conversions)
        VALUES ($1, $2, $3, 'אינסטגרם', 1500, 24, 9, 3)
        ON CONFLICT (year, month, channel) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(month)
    .bind(year)
    .execute(pool)
    .await?;

    let stats = vec![
        (previous, 21_400.0, 6_100.0, r#"{"credit_card": 17800, "bank_transfer": 3600}"#),
        (current, 19_850.0, 9_950.0, r#"{"credit_card": 16250, "bit": 3600}"#),
    ];
    for (period, income, expenses, by_type) in stats {
        let by_type: serde_json::Value = serde_json::from_str(by_type)?;
        sqlx::query(
            r#"
            INSERT INTO financial_stats_cache
            (month, year, total_income, total_expenses, net_profit, income_by_payment_type)
            VALUES ($1, $2, $3::float8, $4::float8, $5::float8, $6)
            ON CONFLICT (year, month) DO NOTHING
            "#,
        )
        .bind(period.month as i32)
        .bind(period.year)
        .bind(income)
        .bind(expenses)
        .bind(income - expenses)
        .bind(Json(by_type))
        .execute(pool)
        .await?;
    }

    let synced_expenses = vec![
        ("3e5a7c9e-1b3d-4f5a-8c7e-9a1b3c5d7e01", "ציוד", 4_200.0, "Rogue"),
        ("3e5a7c9e-1b3d-4f5a-8c7e-9a1b3c5d7e02", "חשמל", 1_350.0, "חברת החשמל"),
        ("3e5a7c9e-1b3d-4f5a-8c7e-9a1b3c5d7e03", "", 400.0, "קופה קטנה"),
    ];
    for (id, category, amount, supplier) in synced_expenses {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, expense_date, category, amount, supplier_name)
            VALUES ($1, $2, NULLIF($3, ''), $4::float8, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(current.first_day)
        .bind(category)
        .bind(amount)
        .bind(supplier)
        .execute(pool)
        .await?;
    }

    let schedules = vec![
        ("c1a5e9f3-2b4d-4c6e-8f0a-1b3d5f7a9c01", "CrossFit WOD", 1, "07:00", Some("דנה")),
        ("c1a5e9f3-2b4d-4c6e-8f0a-1b3d5f7a9c02", "Olympic Lifting", 1, "18:30", None),
        ("c1a5e9f3-2b4d-4c6e-8f0a-1b3d5f7a9c03", "CrossFit WOD", 3, "07:00", Some("יואב")),
        ("c1a5e9f3-2b4d-4c6e-8f0a-1b3d5f7a9c04", "Mobility", 5, "19:00", Some("דנה")),
    ];
    let weekday = i32::try_from(today.weekday().num_days_from_sunday())? + 1;
    for (id, name, day_of_week, start_time, coach) in schedules {
        let start_time = NaiveTime::parse_from_str(start_time, "%H:%M")
            .with_context(|| format!("invalid start time for {name}"))?;
        sqlx::query(
            r#"
            INSERT INTO class_schedules
            (id, name, day_of_week, start_time, duration_minutes, max_participants, coach_name)
            VALUES ($1, $2, $3, $4, 60, 15, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(name)
        // Rotate onto today so the demo day view is never empty.
        .bind((day_of_week + weekday - 2).rem_euclid(7) + 1)
        .bind(start_time)
        .bind(coach)
        .execute(pool)
        .await?;
    }

    let leads = vec!["new", "new", "trial_scheduled", "trial_completed", "converted", "lost"];
    for (index, status) in leads.into_iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO leads (id, name, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::from_u128(0x1ead_0000_0000_0000_0000_0000_0000_0001 + index as u128))
        .bind(format!("Lead {}", index + 1))
        .bind(status)
        .execute(pool)
        .await?;
    }

    let documents = vec![(40, 2_400.0), (33, 1_800.0), (12, 3_150.0), (3, 900.0), (0, 450.0)];
    for (index, (age_days, amount)) in documents.into_iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO green_invoice_documents (id, amount, status, created_at)
            VALUES ($1, $2::float8, 'paid', $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::from_u128(0xd0c0_0000_0000_0000_0000_0000_0000_0001 + index as u128))
        .bind(amount)
        .bind(days_ago(age_days))
        .execute(pool)
        .await?;
    }

    Ok(())
}
