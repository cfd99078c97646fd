//! Back-office overview: revenue trend, lead funnel, membership counters and
//! today's classes.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::kpi::MonthPeriod;
use crate::models::{MembershipRow, MergedClass, PaidDocument};

const CHART_DAYS: i64 = 30;
const SPARKLINE_WEEKS: usize = 8;
const EXPIRY_HORIZON_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub current_total: f64,
    pub last_month_total: f64,
    pub trend_percent: f64,
    pub trend_up: bool,
    /// Daily totals for the last 30 days, oldest first.
    pub chart: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelSummary {
    pub total: usize,
    pub new_leads: usize,
    pub trials: usize,
    pub converted: usize,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipStats {
    pub active: usize,
    pub frozen: usize,
    pub debt_count: usize,
    pub debt_total: f64,
    pub expiring_soon: usize,
    pub active_sparkline: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverview {
    pub revenue: RevenueSummary,
    pub funnel: FunnelSummary,
    pub stats: MembershipStats,
    pub todays_classes: Vec<MergedClass>,
}

/// First instant of last month; the revenue read starts here.
pub fn revenue_window_start(now: NaiveDateTime) -> NaiveDateTime {
    MonthPeriod::containing(now.date()).previous().start()
}

pub fn summarize_revenue(documents: &[PaidDocument], now: NaiveDateTime) -> RevenueSummary {
    let current_start = MonthPeriod::containing(now.date()).start();
    let mut current_total = 0.0;
    let mut last_month_total = 0.0;

    for document in documents {
        let amount = document.amount.unwrap_or(0.0);
        if document.created_at >= current_start {
            current_total += amount;
        } else {
            last_month_total += amount;
        }
    }

    let trend_percent = if last_month_total > 0.0 {
        (current_total - last_month_total) / last_month_total * 100.0
    } else {
        100.0
    };

    let today = now.date();
    let mut daily: BTreeMap<NaiveDate, f64> = (0..CHART_DAYS)
        .map(|offset| (today - Duration::days(offset), 0.0))
        .collect();
    for document in documents {
        if let Some(total) = daily.get_mut(&document.created_at.date()) {
            *total += document.amount.unwrap_or(0.0);
        }
    }

    RevenueSummary {
        current_total,
        last_month_total,
        trend_percent,
        trend_up: trend_percent >= 0.0,
        chart: daily.into_values().collect(),
    }
}

pub fn summarize_funnel(statuses: &[String]) -> FunnelSummary {
    let count = |wanted: &[&str]| {
        statuses
            .iter()
            .filter(|status| wanted.contains(&status.as_str()))
            .count()
    };
    let total = statuses.len();
    let converted = count(&["converted"]);

    FunnelSummary {
        total,
        new_leads: count(&["new"]),
        trials: count(&["trial_scheduled", "trial_completed"]),
        converted,
        conversion_rate: if total > 0 {
            converted as f64 / total as f64 * 100.0
        } else {
            0.0
        },
    }
}

pub fn summarize_memberships(rows: &[MembershipRow], now: NaiveDateTime) -> MembershipStats {
    let expiry_horizon = now + Duration::days(EXPIRY_HORIZON_DAYS);
    let sparkline_start = now - Duration::weeks(SPARKLINE_WEEKS as i64);
    let mut active_sparkline = vec![0; SPARKLINE_WEEKS];

    let debts: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.outstanding_balance.filter(|balance| *balance > 0.0))
        .collect();

    for row in rows.iter().filter(|row| row.is_active && row.created_at >= sparkline_start) {
        let weeks_ago = ((now - row.created_at).num_days().max(0) / 7) as usize;
        let bucket = weeks_ago.min(SPARKLINE_WEEKS - 1);
        active_sparkline[SPARKLINE_WEEKS - 1 - bucket] += 1;
    }

    MembershipStats {
        active: rows.iter().filter(|row| row.is_active).count(),
        frozen: rows
            .iter()
            .filter(|row| row.plan_status.as_deref() == Some("frozen"))
            .count(),
        debt_count: debts.len(),
        debt_total: debts.iter().sum(),
        expiring_soon: rows
            .iter()
            .filter(|row| row.is_active && row.end_date.is_some_and(|end| end <= expiry_horizon))
            .count(),
        active_sparkline,
    }
}
