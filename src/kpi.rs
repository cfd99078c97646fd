use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::error::StudioError;
use crate::formulas;
use crate::models::{ConfigRow, FinancialStatsCache, KpiSources};

const DAYS_PER_MONTH: f64 = 30.44;
const SPARKLINE_MONTHS: u32 = 6;
const UNCATEGORIZED: &str = "אחר";

pub const CONFIG_STUDIO_AREA: &str = "studio_area_sqm";
pub const CONFIG_TARGET_MRR: &str = "target_mrr";
pub const CONFIG_TARGET_MEMBERS: &str = "target_members";
pub const CONFIG_CURRENT_RENT: &str = "current_rent";
pub const CONFIG_LAST_SYNC: &str = "last_gi_sync_at";

/// A calendar month with inclusive local-time boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthPeriod {
    pub month: u32,
    pub year: i32,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl MonthPeriod {
    pub fn new(month: u32, year: i32) -> Result<Self, StudioError> {
        let invalid = || StudioError::InvalidInput(format!("no such month: {month}/{year}"));
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let last_day = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|next| next.pred_opt())
            .ok_or_else(invalid)?;
        Ok(Self {
            month,
            year,
            first_day,
            last_day,
        })
    }

    pub fn containing(date: NaiveDate) -> Self {
        let first_day = date.with_day(1).unwrap_or(date);
        let last_day = first_day
            .checked_add_months(chrono::Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(date);
        Self {
            month: date.month(),
            year: date.year(),
            first_day,
            last_day,
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.first_day.and_time(NaiveTime::MIN)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.last_day
            .and_hms_opt(23, 59, 59)
            .unwrap_or_else(|| self.last_day.and_time(NaiveTime::MIN))
    }

    pub fn previous(&self) -> Self {
        Self::containing(self.first_day.pred_opt().unwrap_or(self.first_day))
    }

    /// The `n`th month before this one.
    pub fn months_back(&self, n: u32) -> Self {
        let mut period = *self;
        for _ in 0..n {
            period = period.previous();
        }
        period
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialKpis {
    pub mrr: f64,
    pub active_members: usize,
    pub arpm: f64,
    pub total_income: f64,
    pub synced_expenses: f64,
    pub total_expenses: f64,
    pub net_profit: f64,
    pub total_fixed_costs: f64,
    pub total_variable_costs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionKpis {
    pub churn_rate: f64,
    pub retention_rate: f64,
    pub churned_this_month: usize,
    pub active_at_start_of_month: usize,
    pub avg_tenure_months: f64,
    pub ltv: f64,
    pub cac: f64,
    pub ltv_cac_ratio: f64,
    pub new_members_this_month: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEvenKpis {
    pub break_even_members: u64,
    pub break_even_revenue: f64,
    pub current_members: usize,
    #[serde(rename = "currentMRR")]
    pub current_mrr: f64,
    pub progress_percent: f64,
    pub revenue_per_sqm: f64,
    pub studio_area_sqm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Targets {
    #[serde(rename = "targetMRR")]
    pub target_mrr: f64,
    pub target_members: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthOverMonth {
    pub income_change: f64,
    pub expense_change: f64,
    pub profit_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiDashboardData {
    pub month: u32,
    pub year: i32,
    pub financial: FinancialKpis,
    pub retention: RetentionKpis,
    pub break_even: BreakEvenKpis,
    pub targets: Targets,
    pub config: BTreeMap<String, String>,
    pub expenses_by_category: BTreeMap<String, f64>,
    pub income_by_payment_type: BTreeMap<String, f64>,
    pub month_over_month: MonthOverMonth,
    pub anomalies: Vec<String>,
    pub member_sparkline: Vec<usize>,
}

impl KpiDashboardData {
    pub fn last_sync_at(&self) -> Option<&str> {
        self.config.get(CONFIG_LAST_SYNC).map(String::as_str)
    }
}

/// Later rows win on duplicate keys.
pub fn fold_config(rows: &[ConfigRow]) -> BTreeMap<String, String> {
    rows.iter()
        .map(|row| (row.key.clone(), row.value.clone()))
        .collect()
}

/// Numeric config value, 0 when absent or unparsable.
pub fn config_number(config: &BTreeMap<String, String>, key: &str) -> f64 {
    config
        .get(key)
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn months_between(start: NaiveDateTime, now: NaiveDateTime) -> f64 {
    let millis = (now - start).num_milliseconds() as f64;
    (millis / (1000.0 * 60.0 * 60.0 * 24.0 * DAYS_PER_MONTH)).max(0.0)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn stats_totals(stats: Option<&FinancialStatsCache>) -> (f64, f64, f64) {
    stats
        .map(|stats| {
            (
                stats.total_income.unwrap_or(0.0),
                stats.total_expenses.unwrap_or(0.0),
                stats.net_profit.unwrap_or(0.0),
            )
        })
        .unwrap_or((0.0, 0.0, 0.0))
}

pub fn month_over_month(
    income: f64,
    synced_expenses: f64,
    net_profit: f64,
    previous: Option<&FinancialStatsCache>,
) -> MonthOverMonth {
    let (prev_income, prev_expenses, prev_profit) = stats_totals(previous);
    let profit_change = if prev_profit != 0.0 {
        (net_profit - prev_profit) / prev_profit.abs() * 100.0
    } else {
        0.0
    };

    MonthOverMonth {
        income_change: formulas::percent_change(income, prev_income),
        expense_change: formulas::percent_change(synced_expenses, prev_expenses),
        profit_change,
    }
}

/// Advisory messages comparing this month with the previous cached month.
pub fn detect_anomalies(
    change: &MonthOverMonth,
    net_profit: f64,
    previous: Option<&FinancialStatsCache>,
) -> Vec<String> {
    let (prev_income, prev_expenses, prev_profit) = stats_totals(previous);
    let mut anomalies = Vec::new();

    if change.expense_change > 50.0 && prev_expenses > 0.0 {
        anomalies.push(format!(
            "הוצאות עלו ב-{}% מחודש קודם",
            change.expense_change.round()
        ));
    }
    if change.income_change < -30.0 && prev_income > 0.0 {
        anomalies.push(format!(
            "הכנסות ירדו ב-{}% מחודש קודם",
            change.income_change.round().abs()
        ));
    }
    if net_profit < 0.0 && prev_profit > 0.0 {
        anomalies.push("החודש עברתם להפסד לראשונה".to_string());
    }

    anomalies
}

/// Cumulative count of known subscriptions started by the end of each of the
/// trailing six months, oldest first. Churn before the snapshot is not
/// subtracted.
pub fn member_sparkline(period: &MonthPeriod, start_dates: &[NaiveDateTime]) -> Vec<usize> {
    (0..SPARKLINE_MONTHS)
        .rev()
        .map(|back| {
            let month_end = period.months_back(back).end();
            start_dates.iter().filter(|start| **start <= month_end).count()
        })
        .collect()
}

/// Average tenure in months over the given active start dates, falling back
/// to the churn log's recorded tenure when the active set yields nothing.
pub fn average_tenure_months(
    active_starts: &[NaiveDateTime],
    churned_months: &[Option<i32>],
    now: NaiveDateTime,
) -> f64 {
    let mut average = 0.0;
    if !active_starts.is_empty() {
        let total: f64 = active_starts
            .iter()
            .map(|start| months_between(*start, now))
            .sum();
        average = total / active_starts.len() as f64;
    }
    if average == 0.0 && !churned_months.is_empty() {
        let total: f64 = churned_months
            .iter()
            .map(|months| f64::from(months.unwrap_or(0)))
            .sum();
        average = total / churned_months.len() as f64;
    }
    average
}

/// Shapes one month of raw reads into the dashboard snapshot. Pure: the
/// same sources and `now` always produce the same output.
pub fn aggregate(period: &MonthPeriod, sources: &KpiSources, now: NaiveDateTime) -> KpiDashboardData {
    let config = fold_config(&sources.config_rows);
    let studio_area_sqm = config_number(&config, CONFIG_STUDIO_AREA);
    let target_mrr = config_number(&config, CONFIG_TARGET_MRR);
    let target_members = config_number(&config, CONFIG_TARGET_MEMBERS);

    let mrr = formulas::mrr(
        sources
            .active_subscriptions
            .iter()
            .map(|subscription| subscription.price_per_month()),
    );
    let active_members = sources.active_subscriptions.len();
    let arpm = formulas::arpm(mrr, active_members);

    let (total_income, synced_expenses, _) = stats_totals(sources.stats.as_ref());
    let total_fixed_costs: f64 = sources
        .monthly_expenses
        .iter()
        .filter(|expense| expense.is_fixed)
        .map(|expense| expense.amount.unwrap_or(0.0))
        .sum();
    let total_variable_costs: f64 = sources
        .monthly_expenses
        .iter()
        .filter(|expense| !expense.is_fixed)
        .map(|expense| expense.amount.unwrap_or(0.0))
        .sum();
    let total_expenses = synced_expenses + total_fixed_costs + total_variable_costs;
    let net_profit = total_income - total_expenses;

    let financial = FinancialKpis {
        mrr,
        active_members,
        arpm,
        total_income,
        synced_expenses,
        total_expenses,
        net_profit,
        total_fixed_costs,
        total_variable_costs,
    };

    let mut expenses_by_category = BTreeMap::new();
    for expense in &sources.categorized_expenses {
        let category = expense
            .category
            .clone()
            .filter(|category| !category.is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        *expenses_by_category.entry(category).or_insert(0.0) += expense.amount.unwrap_or(0.0);
    }

    let income_by_payment_type = sources
        .stats
        .as_ref()
        .map(|stats| stats.income_by_payment_type.clone())
        .unwrap_or_default();

    let change = month_over_month(
        total_income,
        synced_expenses,
        net_profit,
        sources.previous_stats.as_ref(),
    );
    let anomalies = detect_anomalies(&change, net_profit, sources.previous_stats.as_ref());

    let churned_this_month = sources.churn_log.len();
    let new_members_this_month = sources.new_members.len();
    let active_at_start_of_month =
        (active_members + churned_this_month).saturating_sub(new_members_this_month);
    let churn_rate = formulas::churn_rate(churned_this_month, active_at_start_of_month);
    let retention_rate = formulas::retention_rate(churn_rate);

    let tenure_starts: Vec<NaiveDateTime> = sources
        .tenure_subscriptions
        .iter()
        .map(|subscription| subscription.start_date)
        .collect();
    let churned_months: Vec<Option<i32>> = sources
        .churn_log
        .iter()
        .map(|entry| entry.months_subscribed)
        .collect();
    let avg_tenure_months = average_tenure_months(&tenure_starts, &churned_months, now);

    let marketing_total: f64 = sources
        .marketing_spend
        .iter()
        .map(|spend| spend.amount.unwrap_or(0.0))
        .sum();
    let conversions: i64 = sources
        .marketing_spend
        .iter()
        .map(|spend| i64::from(spend.conversions.unwrap_or(0)))
        .sum();
    let new_paying_members = if conversions > 0 {
        conversions as usize
    } else {
        new_members_this_month
    };

    let cac = formulas::cac(marketing_total, new_paying_members);
    let ltv = formulas::ltv(arpm, avg_tenure_months);
    let ltv_cac_ratio = formulas::ltv_cac_ratio(ltv, cac);

    let retention = RetentionKpis {
        churn_rate,
        retention_rate,
        churned_this_month,
        active_at_start_of_month,
        avg_tenure_months: round_one_decimal(avg_tenure_months),
        ltv,
        cac,
        ltv_cac_ratio,
        new_members_this_month,
    };

    let break_even_members = formulas::break_even_members(total_fixed_costs, arpm);
    let progress_percent = if break_even_members > 0 {
        active_members as f64 / break_even_members as f64 * 100.0
    } else if active_members > 0 {
        100.0
    } else {
        0.0
    };

    let break_even = BreakEvenKpis {
        break_even_members,
        break_even_revenue: total_fixed_costs,
        current_members: active_members,
        current_mrr: mrr,
        progress_percent,
        revenue_per_sqm: formulas::revenue_per_sqm(mrr, studio_area_sqm),
        studio_area_sqm,
    };

    KpiDashboardData {
        month: period.month,
        year: period.year,
        financial,
        retention,
        break_even,
        targets: Targets {
            target_mrr,
            target_members,
        },
        config,
        expenses_by_category,
        income_by_payment_type,
        month_over_month: change,
        anomalies,
        member_sparkline: member_sparkline(period, &tenure_starts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActiveSubscription, CategorizedExpense, ChurnLogEntry, MarketingSpend, MonthlyExpense,
        NewMember, PlanRef, TenureSubscription,
    };
    use uuid::Uuid;

    fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn march() -> MonthPeriod {
        MonthPeriod::new(3, 2026).unwrap()
    }

    fn subscription(price: Option<f64>) -> ActiveSubscription {
        ActiveSubscription {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            start_date: Some(at(2025, 10, 1)),
            plan: Some(PlanRef {
                price_per_month: price,
                ..PlanRef::default()
            }),
        }
    }

    fn tenure(start: NaiveDateTime) -> TenureSubscription {
        TenureSubscription {
            id: Uuid::new_v4(),
            start_date: start,
            is_active: true,
            plan_status: Some("active".to_string()),
        }
    }

    fn churned(months: Option<i32>) -> ChurnLogEntry {
        ChurnLogEntry {
            id: Uuid::new_v4(),
            user_id: None,
            churn_date: at(2026, 3, 10),
            reason: None,
            price_at_churn: None,
            plan_name: None,
            months_subscribed: months,
        }
    }

    fn expense(amount: f64, is_fixed: bool) -> MonthlyExpense {
        MonthlyExpense {
            id: Uuid::new_v4(),
            month: 3,
            year: 2026,
            category: "שכירות".to_string(),
            description: None,
            amount: Some(amount),
            is_fixed,
            vendor_name: None,
            notes: None,
        }
    }

    fn stats(income: f64, expenses: f64, profit: f64) -> FinancialStatsCache {
        FinancialStatsCache {
            month: 2,
            year: 2026,
            total_income: Some(income),
            total_expenses: Some(expenses),
            net_profit: Some(profit),
            income_by_payment_type: BTreeMap::new(),
        }
    }

    fn config(key: &str, value: &str) -> ConfigRow {
        ConfigRow {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn month_boundaries_are_inclusive() {
        let feb = MonthPeriod::new(2, 2028).unwrap();
        assert_eq!(feb.last_day, NaiveDate::from_ymd_opt(2028, 2, 29).unwrap());
        assert_eq!(feb.end().format("%H:%M:%S").to_string(), "23:59:59");
        assert_eq!(feb.start(), NaiveDate::from_ymd_opt(2028, 2, 1).unwrap().and_time(NaiveTime::MIN));

        let january = MonthPeriod::new(1, 2026).unwrap();
        let december = january.previous();
        assert_eq!((december.month, december.year), (12, 2025));
        assert_eq!(december.last_day.day(), 31);
    }

    #[test]
    fn rejects_out_of_range_month() {
        assert!(matches!(MonthPeriod::new(0, 2026), Err(StudioError::InvalidInput(_))));
        assert!(matches!(MonthPeriod::new(13, 2026), Err(StudioError::InvalidInput(_))));
    }

    #[test]
    fn config_numbers_default_to_zero() {
        let map = fold_config(&[
            config(CONFIG_STUDIO_AREA, "120.5"),
            config(CONFIG_TARGET_MRR, "lots"),
        ]);
        assert_eq!(config_number(&map, CONFIG_STUDIO_AREA), 120.5);
        assert_eq!(config_number(&map, CONFIG_TARGET_MRR), 0.0);
        assert_eq!(config_number(&map, CONFIG_TARGET_MEMBERS), 0.0);
    }

    #[test]
    fn financial_totals_combine_synced_and_manual() {
        let sources = KpiSources {
            active_subscriptions: vec![subscription(Some(400.0)), subscription(None), subscription(Some(500.0))],
            monthly_expenses: vec![expense(6_000.0, true), expense(1_500.0, false)],
            stats: Some(stats(20_000.0, 4_000.0, 16_000.0)),
            config_rows: vec![config(CONFIG_STUDIO_AREA, "150")],
            ..KpiSources::default()
        };

        let data = aggregate(&march(), &sources, at(2026, 3, 20));
        assert_eq!(data.financial.mrr, 900.0);
        assert_eq!(data.financial.active_members, 3);
        assert_eq!(data.financial.arpm, 300.0);
        assert_eq!(data.financial.total_fixed_costs, 6_000.0);
        assert_eq!(data.financial.total_variable_costs, 1_500.0);
        assert_eq!(data.financial.total_expenses, 11_500.0);
        assert_eq!(data.financial.net_profit, 8_500.0);
        assert_eq!(data.break_even.break_even_members, 20);
        assert!((data.break_even.progress_percent - 15.0).abs() < 1e-9);
        assert_eq!(data.break_even.revenue_per_sqm, 6.0);
    }

    #[test]
    fn zero_active_members_yields_zeros() {
        let sources = KpiSources {
            monthly_expenses: vec![expense(5_000.0, true)],
            config_rows: vec![config(CONFIG_STUDIO_AREA, "100")],
            ..KpiSources::default()
        };

        let data = aggregate(&march(), &sources, at(2026, 3, 20));
        assert_eq!(data.financial.arpm, 0.0);
        assert_eq!(data.financial.mrr, 0.0);
        assert_eq!(data.break_even.break_even_members, 0);
        assert_eq!(data.break_even.revenue_per_sqm, 0.0);
        assert_eq!(data.break_even.progress_percent, 0.0);
        assert_eq!(data.retention.ltv_cac_ratio, 0.0);
    }

    #[test]
    fn progress_is_full_when_no_break_even_needed() {
        let sources = KpiSources {
            active_subscriptions: vec![subscription(Some(300.0))],
            ..KpiSources::default()
        };
        let data = aggregate(&march(), &sources, at(2026, 3, 20));
        assert_eq!(data.break_even.break_even_members, 0);
        assert_eq!(data.break_even.progress_percent, 100.0);
    }

    #[test]
    fn churn_log_fallback_for_tenure() {
        let sources = KpiSources {
            churn_log: vec![churned(Some(3)), churned(Some(5))],
            ..KpiSources::default()
        };
        let data = aggregate(&march(), &sources, at(2026, 3, 20));
        assert_eq!(data.retention.avg_tenure_months, 4.0);
    }

    #[test]
    fn tenure_uses_active_start_dates() {
        let now = at(2026, 3, 20);
        let starts = [now - chrono::Duration::days(61), now - chrono::Duration::days(122)];
        let average = average_tenure_months(&starts, &[Some(40)], now);
        let expected = (61.0 + 122.0) / 2.0 / 30.44;
        assert!((average - expected).abs() < 1e-9);
    }

    #[test]
    fn active_at_start_never_negative() {
        let sources = KpiSources {
            active_subscriptions: vec![subscription(Some(300.0))],
            new_members: (0..3)
                .map(|_| NewMember {
                    id: Uuid::new_v4(),
                    start_date: at(2026, 3, 2),
                })
                .collect(),
            churn_log: vec![churned(Some(2))],
            ..KpiSources::default()
        };
        let data = aggregate(&march(), &sources, at(2026, 3, 20));
        assert_eq!(data.retention.active_at_start_of_month, 0);
        assert_eq!(data.retention.churn_rate, 0.0);
        assert_eq!(data.retention.retention_rate, 1.0);
    }

    #[test]
    fn churn_and_retention_rates() {
        let sources = KpiSources {
            active_subscriptions: (0..9).map(|_| subscription(Some(300.0))).collect(),
            churn_log: vec![churned(Some(6))],
            ..KpiSources::default()
        };
        let data = aggregate(&march(), &sources, at(2026, 3, 20));
        assert_eq!(data.retention.active_at_start_of_month, 10);
        assert!((data.retention.churn_rate - 0.1).abs() < 1e-12);
        assert!((data.retention.retention_rate - 0.9).abs() < 1e-12);
    }

    #[test]
    fn cac_prefers_marketing_conversions() {
        let spend = |amount: f64, conversions: i32| MarketingSpend {
            id: Uuid::new_v4(),
            month: 3,
            year: 2026,
            channel: "גוגל".to_string(),
            amount: Some(amount),
            leads_generated: Some(10),
            trials_booked: Some(4),
            conversions: Some(conversions),
            notes: None,
        };
        let new_members: Vec<NewMember> = (0..5)
            .map(|_| NewMember {
                id: Uuid::new_v4(),
                start_date: at(2026, 3, 3),
            })
            .collect();

        let attributed = KpiSources {
            marketing_spend: vec![spend(1_000.0, 2), spend(1_000.0, 2)],
            new_members: new_members.clone(),
            ..KpiSources::default()
        };
        assert_eq!(aggregate(&march(), &attributed, at(2026, 3, 20)).retention.cac, 500.0);

        let unattributed = KpiSources {
            marketing_spend: vec![spend(2_000.0, 0)],
            new_members,
            ..KpiSources::default()
        };
        assert_eq!(aggregate(&march(), &unattributed, at(2026, 3, 20)).retention.cac, 400.0);
    }

    #[test]
    fn month_over_month_guards_zero_previous() {
        let change = month_over_month(5_000.0, 1_000.0, 4_000.0, Some(&stats(0.0, 0.0, 0.0)));
        assert_eq!(change.income_change, 0.0);
        assert_eq!(change.expense_change, 0.0);
        assert_eq!(change.profit_change, 0.0);

        let missing = month_over_month(5_000.0, 1_000.0, 4_000.0, None);
        assert_eq!(missing.income_change, 0.0);
    }

    #[test]
    fn profit_change_uses_absolute_previous() {
        let change = month_over_month(0.0, 0.0, 500.0, Some(&stats(0.0, 0.0, -1_000.0)));
        assert_eq!(change.profit_change, 150.0);
    }

    #[test]
    fn expense_anomaly_threshold_is_strict() {
        let previous = stats(10_000.0, 1_000.0, 9_000.0);

        let at_fifty = month_over_month(10_000.0, 1_500.0, 8_500.0, Some(&previous));
        assert!(detect_anomalies(&at_fifty, 8_500.0, Some(&previous)).is_empty());

        let at_fifty_one = month_over_month(10_000.0, 1_510.0, 8_490.0, Some(&previous));
        let anomalies = detect_anomalies(&at_fifty_one, 8_490.0, Some(&previous));
        assert_eq!(anomalies, vec!["הוצאות עלו ב-51% מחודש קודם".to_string()]);
    }

    #[test]
    fn income_drop_and_first_loss_are_flagged() {
        let previous = stats(10_000.0, 2_000.0, 8_000.0);
        let change = month_over_month(6_000.0, 2_000.0, -500.0, Some(&previous));
        let anomalies = detect_anomalies(&change, -500.0, Some(&previous));
        assert_eq!(
            anomalies,
            vec![
                "הכנסות ירדו ב-40% מחודש קודם".to_string(),
                "החודש עברתם להפסד לראשונה".to_string(),
            ]
        );
    }

    #[test]
    fn loss_after_break_even_month_is_not_flagged() {
        let previous = stats(5_000.0, 5_000.0, 0.0);
        let change = month_over_month(5_000.0, 5_000.0, -100.0, Some(&previous));
        assert!(detect_anomalies(&change, -100.0, Some(&previous)).is_empty());
    }

    #[test]
    fn sparkline_counts_cumulative_signups() {
        let starts = vec![at(2025, 9, 15), at(2025, 12, 31), at(2026, 2, 1), at(2026, 3, 30)];
        let spark = member_sparkline(&march(), &starts);
        // Oct, Nov, Dec, Jan, Feb, Mar
        assert_eq!(spark, vec![1, 1, 2, 2, 3, 4]);
    }

    #[test]
    fn breakdowns_group_by_category_and_copy_payment_types() {
        let mut current = stats(8_000.0, 1_000.0, 7_000.0);
        current
            .income_by_payment_type
            .insert("credit".to_string(), 6_000.0);
        let sources = KpiSources {
            categorized_expenses: vec![
                CategorizedExpense {
                    category: Some("חשמל".to_string()),
                    amount: Some(300.0),
                },
                CategorizedExpense {
                    category: None,
                    amount: Some(100.0),
                },
                CategorizedExpense {
                    category: Some("חשמל".to_string()),
                    amount: Some(200.0),
                },
            ],
            stats: Some(current),
            ..KpiSources::default()
        };
        let data = aggregate(&march(), &sources, at(2026, 3, 20));
        assert_eq!(data.expenses_by_category.get("חשמל"), Some(&500.0));
        assert_eq!(data.expenses_by_category.get(UNCATEGORIZED), Some(&100.0));
        assert_eq!(data.income_by_payment_type.get("credit"), Some(&6_000.0));
    }

    #[test]
    fn aggregation_is_deterministic() {
        let sources = KpiSources {
            active_subscriptions: vec![subscription(Some(350.0)), subscription(Some(420.0))],
            tenure_subscriptions: vec![tenure(at(2025, 6, 1)), tenure(at(2026, 1, 12))],
            churn_log: vec![churned(Some(7))],
            config_rows: vec![config(CONFIG_TARGET_MRR, "20000"), config(CONFIG_TARGET_MEMBERS, "80")],
            stats: Some(stats(15_000.0, 3_000.0, 12_000.0)),
            previous_stats: Some(stats(14_000.0, 2_500.0, 11_500.0)),
            ..KpiSources::default()
        };
        let now = at(2026, 3, 20);
        let first = aggregate(&march(), &sources, now);
        let second = aggregate(&march(), &sources, now);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.targets.target_mrr, 20_000.0);
        assert_eq!(first.targets.target_members, 80.0);
    }

    #[test]
    fn snapshot_serializes_with_ui_field_names() {
        let data = aggregate(&march(), &KpiSources::default(), at(2026, 3, 20));
        let json = serde_json::to_value(&data).unwrap();
        assert!(json["breakEven"]["currentMRR"].is_number());
        assert!(json["targets"]["targetMRR"].is_number());
        assert!(json["retention"]["ltvCacRatio"].is_number());
        assert!(json["monthOverMonth"]["incomeChange"].is_number());
        assert_eq!(json["memberSparkline"].as_array().unwrap().len(), 6);
    }
}
