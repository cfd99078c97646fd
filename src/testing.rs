//! In-memory store and sync doubles for service tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

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
use crate::store::StudioStore;
use crate::sync::{InvoiceSync, SyncSummary};

#[derive(Default)]
pub struct MemoryState {
    pub active_subscriptions: Vec<ActiveSubscription>,
    pub churn_log: Vec<ChurnLogEntry>,
    pub marketing_spend: Vec<MarketingSpend>,
    pub monthly_expenses: Vec<MonthlyExpense>,
    pub config: BTreeMap<String, String>,
    pub stats: Vec<FinancialStatsCache>,
    pub new_members: Vec<NewMember>,
    pub tenure_subscriptions: Vec<TenureSubscription>,
    pub categorized_expenses: Vec<(NaiveDate, CategorizedExpense)>,
    pub schedules: Vec<ClassSchedule>,
    pub instances: Vec<ClassInstance>,
    pub documents: Vec<PaidDocument>,
    pub leads: Vec<String>,
    pub memberships: Vec<MembershipRow>,
    pub member_subscriptions: Vec<MemberSubscription>,
    pub member_tickets: Vec<MemberTicket>,
    pub preferences: BTreeMap<(Uuid, String), bool>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    /// 1-based row of an expense batch that the store rejects; 0 accepts all.
    pub fail_expense_row: AtomicUsize,
    pub reads: AtomicUsize,
    read_delay: Duration,
}

impl MemoryStore {
    pub fn with_read_delay(read_delay: Duration) -> Self {
        Self {
            read_delay,
            ..Self::default()
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    async fn gate(&self) -> Result<(), StudioError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StudioError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn write(&self) -> Result<MutexGuard<'_, MemoryState>, StudioError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StudioError::Database(sqlx::Error::PoolClosed));
        }
        Ok(self.state())
    }
}

fn expense_row(expense: &NewExpense) -> MonthlyExpense {
    MonthlyExpense {
        id: Uuid::new_v4(),
        month: expense.month,
        year: expense.year,
        category: expense.category.clone(),
        description: expense.description.clone(),
        amount: Some(expense.amount),
        is_fixed: expense.is_fixed,
        vendor_name: expense.vendor_name.clone(),
        notes: expense.notes.clone(),
    }
}

fn within(at: NaiveDateTime, from: NaiveDateTime, to: NaiveDateTime) -> bool {
    at >= from && at <= to
}

#[async_trait]
impl StudioStore for MemoryStore {
    async fn active_subscriptions(&self) -> Result<Vec<ActiveSubscription>, StudioError> {
        self.gate().await?;
        Ok(self.state().active_subscriptions.clone())
    }

    async fn churn_log(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<ChurnLogEntry>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .churn_log
            .iter()
            .filter(|entry| within(entry.churn_date, from, to))
            .cloned()
            .collect())
    }

    async fn marketing_spend(&self, month: u32, year: i32) -> Result<Vec<MarketingSpend>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .marketing_spend
            .iter()
            .filter(|row| row.month == month as i32 && row.year == year)
            .cloned()
            .collect())
    }

    async fn monthly_expenses(&self, month: u32, year: i32) -> Result<Vec<MonthlyExpense>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .monthly_expenses
            .iter()
            .filter(|row| row.month == month as i32 && row.year == year)
            .cloned()
            .collect())
    }

    async fn studio_config(&self) -> Result<Vec<ConfigRow>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .config
            .iter()
            .map(|(key, value)| ConfigRow {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn financial_stats(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Option<FinancialStatsCache>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .stats
            .iter()
            .find(|row| row.month == month as i32 && row.year == year)
            .cloned())
    }

    async fn new_members(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<NewMember>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .new_members
            .iter()
            .filter(|row| within(row.start_date, from, to))
            .cloned()
            .collect())
    }

    async fn tenure_subscriptions(&self) -> Result<Vec<TenureSubscription>, StudioError> {
        self.gate().await?;
        Ok(self.state().tenure_subscriptions.clone())
    }

    async fn categorized_expenses(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CategorizedExpense>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .categorized_expenses
            .iter()
            .filter(|(date, _)| *date >= from && *date <= to)
            .map(|(_, expense)| expense.clone())
            .collect())
    }

    async fn class_schedules(&self, day_of_week: i32) -> Result<Vec<ClassSchedule>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .schedules
            .iter()
            .filter(|row| row.is_active && row.day_of_week == day_of_week)
            .cloned()
            .collect())
    }

    async fn class_instances(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<ClassInstance>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .instances
            .iter()
            .filter(|row| within(row.class_date, from, to))
            .cloned()
            .collect())
    }

    async fn paid_documents(&self, since: NaiveDateTime) -> Result<Vec<PaidDocument>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .documents
            .iter()
            .filter(|row| row.created_at >= since)
            .cloned()
            .collect())
    }

    async fn lead_statuses(&self) -> Result<Vec<String>, StudioError> {
        self.gate().await?;
        Ok(self.state().leads.clone())
    }

    async fn membership_rows(&self) -> Result<Vec<MembershipRow>, StudioError> {
        self.gate().await?;
        Ok(self.state().memberships.clone())
    }

    async fn member_subscriptions(&self) -> Result<Vec<MemberSubscription>, StudioError> {
        self.gate().await?;
        Ok(self.state().member_subscriptions.clone())
    }

    async fn member_tickets(&self) -> Result<Vec<MemberTicket>, StudioError> {
        self.gate().await?;
        Ok(self.state().member_tickets.clone())
    }

    async fn insert_expense(&self, expense: &NewExpense) -> Result<(), StudioError> {
        self.insert_expenses(std::slice::from_ref(expense)).await
    }

    async fn insert_expenses(&self, expenses: &[NewExpense]) -> Result<(), StudioError> {
        let mut state = self.write()?;
        let reject_at = self.fail_expense_row.load(Ordering::SeqCst);
        if reject_at > 0 && reject_at <= expenses.len() {
            return Err(StudioError::Database(sqlx::Error::RowNotFound));
        }
        state.monthly_expenses.extend(expenses.iter().map(expense_row));
        Ok(())
    }

    async fn upsert_marketing_spend(&self, spend: &NewMarketingSpend) -> Result<(), StudioError> {
        let mut state = self.write()?;
        state.marketing_spend.retain(|row| {
            !(row.month == spend.month && row.year == spend.year && row.channel == spend.channel)
        });
        state.marketing_spend.push(MarketingSpend {
            id: Uuid::new_v4(),
            month: spend.month,
            year: spend.year,
            channel: spend.channel.clone(),
            amount: Some(spend.amount),
            leads_generated: Some(spend.leads_generated),
            trials_booked: Some(spend.trials_booked),
            conversions: Some(spend.conversions),
            notes: spend.notes.clone(),
        });
        Ok(())
    }

    async fn set_config_value(
        &self,
        key: &str,
        value: &str,
        _updated_at: DateTime<Utc>,
    ) -> Result<(), StudioError> {
        self.write()?.config.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn notification_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<BTreeMap<String, bool>, StudioError> {
        self.gate().await?;
        let state = self.state();
        Ok(state
            .preferences
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|((_, key), enabled)| (key.clone(), *enabled))
            .collect())
    }

    async fn set_notification_preference(
        &self,
        user_id: Uuid,
        key: &str,
        enabled: bool,
    ) -> Result<(), StudioError> {
        self.write()?
            .preferences
            .insert((user_id, key.to_string()), enabled);
        Ok(())
    }
}

/// Stands in for the remote sync: optionally writes a stats row into the
/// shared store, the way the real function refreshes the cache.
pub struct FakeSync {
    store: Arc<MemoryStore>,
    produces: Option<FinancialStatsCache>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl FakeSync {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            produces: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn producing(mut self, stats: FinancialStatsCache) -> Self {
        self.produces = Some(stats);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl InvoiceSync for FakeSync {
    async fn sync_financial_data(&self) -> Result<SyncSummary, StudioError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StudioError::Sync("Green Invoice API error: 401".to_string()));
        }
        if let Some(stats) = &self.produces {
            let mut state = self.store.state();
            state
                .stats
                .retain(|row| !(row.month == stats.month && row.year == stats.year));
            state.stats.push(stats.clone());
        }
        Ok(SyncSummary::default())
    }
}
