//! Financial KPI formulas.
//!
//! Every function is total: a zero denominator yields 0, never NaN or
//! infinity. Read such a 0 as "no data yet".

use serde::Serialize;

/// Sum of monthly plan prices over active subscriptions. Missing prices count as 0.
pub fn mrr<I>(prices: I) -> f64
where
    I: IntoIterator<Item = Option<f64>>,
{
    prices.into_iter().map(|price| price.unwrap_or(0.0)).sum()
}

/// Average revenue per member.
pub fn arpm(mrr: f64, active_members: usize) -> f64 {
    if active_members == 0 {
        return 0.0;
    }
    mrr / active_members as f64
}

/// Customer acquisition cost.
pub fn cac(marketing_spend: f64, new_paying_members: usize) -> f64 {
    if new_paying_members == 0 {
        return 0.0;
    }
    marketing_spend / new_paying_members as f64
}

pub fn ltv(arpm: f64, avg_tenure_months: f64) -> f64 {
    arpm * avg_tenure_months
}

pub fn ltv_cac_ratio(ltv: f64, cac: f64) -> f64 {
    if cac == 0.0 {
        return 0.0;
    }
    ltv / cac
}

/// Fraction of the members present at the start of the month who left.
pub fn churn_rate(churned: usize, active_at_start: usize) -> f64 {
    if active_at_start == 0 {
        return 0.0;
    }
    churned as f64 / active_at_start as f64
}

/// Complement of the churn rate, floored at 0.
///
/// The floor is intentional: when churned members exceed the derived
/// start-of-month count the rate reads 0, not a negative share.
pub fn retention_rate(churn_rate: f64) -> f64 {
    (1.0 - churn_rate).max(0.0)
}

/// Members needed to cover fixed costs, rounded up to a whole member.
pub fn break_even_members(fixed_costs: f64, arpm: f64) -> u64 {
    if arpm == 0.0 {
        return 0;
    }
    let members = (fixed_costs / arpm).ceil();
    if members.is_finite() && members > 0.0 {
        members as u64
    } else {
        0
    }
}

pub fn revenue_per_sqm(mrr: f64, area_sqm: f64) -> f64 {
    if area_sqm == 0.0 {
        return 0.0;
    }
    mrr / area_sqm
}

/// Percent change against a previous value; 0 unless the previous value is positive.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiStatus {
    Good,
    Warning,
    Bad,
}

/// Traffic-light status of a metric against its target. `inverted` marks
/// metrics where lower is better (churn, CAC).
pub fn kpi_status(current: f64, target: f64, inverted: bool) -> KpiStatus {
    if target == 0.0 {
        return KpiStatus::Good;
    }

    if inverted {
        if current <= target {
            return KpiStatus::Good;
        }
        if current <= target * 1.1 {
            return KpiStatus::Warning;
        }
        return KpiStatus::Bad;
    }

    let ratio = current / target;
    if ratio >= 1.0 {
        KpiStatus::Good
    } else if ratio >= 0.9 {
        KpiStatus::Warning
    } else {
        KpiStatus::Bad
    }
}

/// Shekel amount rounded to whole units with thousands separators: `₪12,500`.
pub fn format_currency(amount: f64) -> String {
    if !amount.is_finite() {
        return "₪0".to_string();
    }
    let rounded = amount.round();
    let digits = format!("{}", rounded.abs() as u64);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-₪{grouped}")
    } else {
        format!("₪{grouped}")
    }
}

pub fn format_percent(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "0%".to_string();
    }
    format!("{value:.decimals$}%")
}

pub fn format_ratio(value: f64) -> String {
    if !value.is_finite() || value == 0.0 {
        return "0x".to_string();
    }
    format!("{value:.1}x")
}
