use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dashboard::{self, AdminOverview};
use crate::error::StudioError;
use crate::kpi::{self, KpiDashboardData, MonthPeriod, CONFIG_LAST_SYNC};
use crate::membership::{self, ClientMembership};
use crate::models::{
    ExpenseForm, KpiSources, MarketingForm, MergedClass, NewExpense, StudioConfigForm,
};
use crate::schedule;
use crate::store::StudioStore;
use crate::sync::InvoiceSync;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct LoadSettings {
    pub query_timeout: Duration,
    pub sync_stale_after: chrono::Duration,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(15),
            sync_stale_after: chrono::Duration::hours(1),
        }
    }
}

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

fn local(now: DateTime<Utc>) -> NaiveDateTime {
    now.with_timezone(&Local).naive_local()
}

/// Runs `work` until it finishes, the token fires, or `limit` elapses. The
/// losing branch is dropped, which abandons any in-flight reads.
pub async fn guarded<T, F>(
    limit: Duration,
    cancel: &CancellationToken,
    work: F,
) -> Result<T, StudioError>
where
    F: Future<Output = Result<T, StudioError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(StudioError::Cancelled),
        outcome = tokio::time::timeout(limit, work) => match outcome {
            Ok(result) => result,
            Err(_) => Err(StudioError::Timeout(limit)),
        },
    }
}

/// Monthly KPI dashboard: concurrent reads, aggregation, invoice sync and
/// the financial mutations that force a reload.
pub struct KpiService {
    store: Arc<dyn StudioStore>,
    sync: Arc<dyn InvoiceSync>,
    settings: LoadSettings,
    clock: Clock,
    auto_sync_checked: AtomicBool,
}

impl KpiService {
    pub fn new(
        store: Arc<dyn StudioStore>,
        sync: Arc<dyn InvoiceSync>,
        settings: LoadSettings,
    ) -> Self {
        Self {
            store,
            sync,
            settings,
            clock: system_clock(),
            auto_sync_checked: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    async fn read_sources(&self, period: &MonthPeriod) -> Result<KpiSources, StudioError> {
        let previous = period.previous();
        let store = self.store.as_ref();

        let (
            active_subscriptions,
            churn_log,
            marketing_spend,
            monthly_expenses,
            config_rows,
            stats,
            new_members,
            tenure_subscriptions,
            categorized_expenses,
            previous_stats,
        ) = tokio::try_join!(
            store.active_subscriptions(),
            store.churn_log(period.start(), period.end()),
            store.marketing_spend(period.month, period.year),
            store.monthly_expenses(period.month, period.year),
            store.studio_config(),
            store.financial_stats(period.month, period.year),
            store.new_members(period.start(), period.end()),
            store.tenure_subscriptions(),
            store.categorized_expenses(period.first_day, period.last_day),
            store.financial_stats(previous.month, previous.year),
        )?;

        Ok(KpiSources {
            active_subscriptions,
            churn_log,
            marketing_spend,
            monthly_expenses,
            config_rows,
            stats,
            new_members,
            tenure_subscriptions,
            categorized_expenses,
            previous_stats,
        })
    }

    /// Loads the dashboard for one month. Any failed read fails the whole load.
    pub async fn load(
        &self,
        month: u32,
        year: i32,
        cancel: &CancellationToken,
    ) -> Result<KpiDashboardData, StudioError> {
        let period = MonthPeriod::new(month, year)?;
        debug!(month, year, "Loading KPI dashboard");

        let sources = guarded(self.settings.query_timeout, cancel, self.read_sources(&period))
            .await
            .inspect_err(|err| error!(month, year, error = %err, "KPI dashboard load failed"))?;

        let data = kpi::aggregate(&period, &sources, local((self.clock)()));
        info!(
            month,
            year,
            active_members = data.financial.active_members,
            anomalies = data.anomalies.len(),
            "KPI dashboard loaded"
        );
        Ok(data)
    }

    /// Whether the recorded sync time is older than the staleness threshold.
    /// A missing or unreadable timestamp never counts as stale.
    pub fn sync_is_stale(&self, data: &KpiDashboardData) -> bool {
        data.last_sync_at()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .is_some_and(|last| {
                (self.clock)() - last.with_timezone(&Utc) > self.settings.sync_stale_after
            })
    }

    /// Like [`KpiService::load`], but the first successful load of this
    /// service also refreshes invoice data when the last sync is stale.
    pub async fn load_with_auto_sync(
        &self,
        month: u32,
        year: i32,
        cancel: &CancellationToken,
    ) -> Result<KpiDashboardData, StudioError> {
        let data = self.load(month, year, cancel).await?;
        if self.auto_sync_checked.swap(true, Ordering::SeqCst) || !self.sync_is_stale(&data) {
            return Ok(data);
        }

        info!(last_sync = ?data.last_sync_at(), "Invoice data is stale, syncing");
        match self.trigger_sync(month, year, cancel).await {
            Ok(refreshed) => Ok(refreshed),
            Err(err) => {
                warn!(error = %err, "Automatic invoice sync failed");
                Ok(data)
            }
        }
    }

    /// Pulls fresh invoice data, stamps the sync time and reloads.
    pub async fn trigger_sync(
        &self,
        month: u32,
        year: i32,
        cancel: &CancellationToken,
    ) -> Result<KpiDashboardData, StudioError> {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(StudioError::Cancelled),
            outcome = self.sync.sync_financial_data() => outcome,
        };
        let summary = outcome.inspect_err(|err| error!(error = %err, "Invoice sync failed"))?;
        debug!(?summary, "Invoice sync summary");

        let synced_at = (self.clock)();
        self.store
            .set_config_value(CONFIG_LAST_SYNC, &synced_at.to_rfc3339(), synced_at)
            .await?;
        info!(synced_at = %synced_at, "Recorded invoice sync time");

        self.load(month, year, cancel).await
    }

    pub async fn config(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, String>, StudioError> {
        let rows = guarded(self.settings.query_timeout, cancel, self.store.studio_config()).await?;
        Ok(kpi::fold_config(&rows))
    }

    pub async fn add_expense(
        &self,
        month: u32,
        year: i32,
        form: ExpenseForm,
        cancel: &CancellationToken,
    ) -> Result<KpiDashboardData, StudioError> {
        let period = MonthPeriod::new(month, year)?;
        let expense = form.into_new_expense(period.month as i32, period.year);
        self.store.insert_expense(&expense).await?;
        info!(month, year, category = %expense.category, amount = expense.amount, "Added expense");
        self.load(month, year, cancel).await
    }

    /// Inserts the rows as one batch, then reloads once. A failed batch
    /// leaves nothing behind, so the same file can be imported again.
    pub async fn import_expenses(
        &self,
        month: u32,
        year: i32,
        forms: Vec<ExpenseForm>,
        cancel: &CancellationToken,
    ) -> Result<(usize, KpiDashboardData), StudioError> {
        let period = MonthPeriod::new(month, year)?;
        let expenses: Vec<NewExpense> = forms
            .into_iter()
            .map(|form| form.into_new_expense(period.month as i32, period.year))
            .collect();
        self.store
            .insert_expenses(&expenses)
            .await
            .inspect_err(|err| {
                warn!(month, year, rows = expenses.len(), error = %err, "Expense import rolled back")
            })?;
        let inserted = expenses.len();
        info!(month, year, inserted, "Imported expenses");
        let data = self.load(month, year, cancel).await?;
        Ok((inserted, data))
    }

    pub async fn add_marketing_spend(
        &self,
        month: u32,
        year: i32,
        form: MarketingForm,
        cancel: &CancellationToken,
    ) -> Result<KpiDashboardData, StudioError> {
        let period = MonthPeriod::new(month, year)?;
        let spend = form.into_new_spend(period.month as i32, period.year);
        self.store.upsert_marketing_spend(&spend).await?;
        info!(month, year, channel = %spend.channel, amount = spend.amount, "Recorded marketing spend");
        self.load(month, year, cancel).await
    }

    /// Writes the four studio settings one by one; the first failure stops
    /// the update and skips the reload.
    pub async fn update_config(
        &self,
        month: u32,
        year: i32,
        form: &StudioConfigForm,
        cancel: &CancellationToken,
    ) -> Result<KpiDashboardData, StudioError> {
        for (key, value) in form.entries() {
            self.store
                .set_config_value(key, value, (self.clock)())
                .await
                .inspect_err(|err| error!(key, error = %err, "Config update failed"))?;
        }
        info!("Updated studio config");
        self.load(month, year, cancel).await
    }
}

/// Day view of classes.
pub struct ScheduleService {
    store: Arc<dyn StudioStore>,
    settings: LoadSettings,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn StudioStore>, settings: LoadSettings) -> Self {
        Self { store, settings }
    }

    /// Both reads must succeed; a failure yields no list at all.
    pub async fn day_classes(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<Vec<MergedClass>, StudioError> {
        let store = self.store.as_ref();
        let (from, to) = schedule::day_window(date);
        let (schedules, instances) = guarded(self.settings.query_timeout, cancel, async {
            tokio::try_join!(
                store.class_schedules(schedule::day_of_week(date)),
                store.class_instances(from, to),
            )
        })
        .await
        .inspect_err(|err| error!(%date, error = %err, "Class schedule load failed"))?;

        let classes = schedule::materialize(date, &schedules, &instances);
        debug!(%date, classes = classes.len(), "Materialized classes");
        Ok(classes)
    }
}

/// Back-office overview and client membership lookup.
pub struct OverviewService {
    store: Arc<dyn StudioStore>,
    settings: LoadSettings,
    clock: Clock,
}

impl OverviewService {
    pub fn new(store: Arc<dyn StudioStore>, settings: LoadSettings) -> Self {
        Self {
            store,
            settings,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn load(&self, cancel: &CancellationToken) -> Result<AdminOverview, StudioError> {
        let now = local((self.clock)());
        let today = now.date();
        let store = self.store.as_ref();
        let (from, to) = schedule::day_window(today);

        let (documents, leads, memberships, schedules, instances) =
            guarded(self.settings.query_timeout, cancel, async {
                tokio::try_join!(
                    store.paid_documents(dashboard::revenue_window_start(now)),
                    store.lead_statuses(),
                    store.membership_rows(),
                    store.class_schedules(schedule::day_of_week(today)),
                    store.class_instances(from, to),
                )
            })
            .await
            .inspect_err(|err| error!(error = %err, "Overview load failed"))?;

        Ok(AdminOverview {
            revenue: dashboard::summarize_revenue(&documents, now),
            funnel: dashboard::summarize_funnel(&leads),
            stats: dashboard::summarize_memberships(&memberships, now),
            todays_classes: schedule::materialize(today, &schedules, &instances),
        })
    }

    pub async fn memberships(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<Uuid, ClientMembership>, StudioError> {
        let store = self.store.as_ref();
        let (subscriptions, tickets) = guarded(self.settings.query_timeout, cancel, async {
            tokio::try_join!(store.member_subscriptions(), store.member_tickets())
        })
        .await?;
        Ok(membership::resolve_memberships(&subscriptions, &tickets))
    }
}

/// Per-user notification switches with optimistic local updates.
pub struct PreferenceService {
    store: Arc<dyn StudioStore>,
    user_id: Uuid,
    preferences: Mutex<BTreeMap<String, bool>>,
}

impl PreferenceService {
    pub fn new(store: Arc<dyn StudioStore>, user_id: Uuid) -> Self {
        Self {
            store,
            user_id,
            preferences: Mutex::new(BTreeMap::new()),
        }
    }

    fn local_state(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, bool>> {
        self.preferences
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn load(&self) -> Result<BTreeMap<String, bool>, StudioError> {
        let stored = self.store.notification_preferences(self.user_id).await?;
        *self.local_state() = stored.clone();
        Ok(stored)
    }

    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.local_state().clone()
    }

    /// Flips `key` locally, then persists it. On a failed write the previous
    /// value is restored and the error returned.
    pub async fn toggle(&self, key: &str) -> Result<bool, StudioError> {
        let previous = {
            let mut state = self.local_state();
            let previous = state.get(key).copied().unwrap_or(false);
            state.insert(key.to_string(), !previous);
            previous
        };

        match self
            .store
            .set_notification_preference(self.user_id, key, !previous)
            .await
        {
            Ok(()) => Ok(!previous),
            Err(err) => {
                warn!(user_id = %self.user_id, key, error = %err, "Preference write failed, rolling back");
                self.local_state().insert(key.to_string(), previous);
                Err(err)
            }
        }
    }
}
