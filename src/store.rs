use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::StudioError;
use crate::models::{
    ActiveSubscription, CategorizedExpense, ChurnLogEntry, ClassInstance, ClassSchedule,
    ConfigRow, FinancialStatsCache, MarketingSpend, MemberSubscription, MemberTicket,
    MembershipRow, MonthlyExpense, NewExpense, NewMarketingSpend, NewMember, PaidDocument,
    TenureSubscription,
};

/// Reads and writes against the studio's relational store. Date-time
/// arguments and results are local wall-clock time.
#[async_trait]
pub trait StudioStore: Send + Sync {
    /// Subscriptions that are active with an active plan status, plan joined.
    async fn active_subscriptions(&self) -> Result<Vec<ActiveSubscription>, StudioError>;

    async fn churn_log(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<ChurnLogEntry>, StudioError>;

    async fn marketing_spend(&self, month: u32, year: i32)
        -> Result<Vec<MarketingSpend>, StudioError>;

    async fn monthly_expenses(&self, month: u32, year: i32)
        -> Result<Vec<MonthlyExpense>, StudioError>;

    async fn studio_config(&self) -> Result<Vec<ConfigRow>, StudioError>;

    async fn financial_stats(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Option<FinancialStatsCache>, StudioError>;

    /// Subscriptions whose start date falls inside the window.
    async fn new_members(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<NewMember>, StudioError>;

    /// Every subscription flagged active, regardless of plan status.
    async fn tenure_subscriptions(&self) -> Result<Vec<TenureSubscription>, StudioError>;

    async fn categorized_expenses(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CategorizedExpense>, StudioError>;

    /// Active templates for a weekday (1 = Sunday).
    async fn class_schedules(&self, day_of_week: i32) -> Result<Vec<ClassSchedule>, StudioError>;

    async fn class_instances(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<ClassInstance>, StudioError>;

    async fn paid_documents(&self, since: NaiveDateTime) -> Result<Vec<PaidDocument>, StudioError>;

    async fn lead_statuses(&self) -> Result<Vec<String>, StudioError>;

    async fn membership_rows(&self) -> Result<Vec<MembershipRow>, StudioError>;

    async fn member_subscriptions(&self) -> Result<Vec<MemberSubscription>, StudioError>;

    async fn member_tickets(&self) -> Result<Vec<MemberTicket>, StudioError>;

    async fn insert_expense(&self, expense: &NewExpense) -> Result<(), StudioError>;

    /// Inserts every row or none of them.
    async fn insert_expenses(&self, expenses: &[NewExpense]) -> Result<(), StudioError>;

    /// Insert or replace the row for `(year, month, channel)`.
    async fn upsert_marketing_spend(&self, spend: &NewMarketingSpend) -> Result<(), StudioError>;

    async fn set_config_value(
        &self,
        key: &str,
        value: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StudioError>;

    async fn notification_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<BTreeMap<String, bool>, StudioError>;

    async fn set_notification_preference(
        &self,
        user_id: Uuid,
        key: &str,
        enabled: bool,
    ) -> Result<(), StudioError>;
}
