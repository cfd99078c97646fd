use std::collections::BTreeMap;
use std::fmt::Write;

use crate::formulas::{format_currency, format_percent, format_ratio, kpi_status, KpiStatus};
use crate::kpi::KpiDashboardData;

fn status_label(status: KpiStatus) -> &'static str {
    match status {
        KpiStatus::Good => "on track",
        KpiStatus::Warning => "close",
        KpiStatus::Bad => "behind",
    }
}

fn signed_percent(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_percent(value, 1))
    } else {
        format_percent(value, 1)
    }
}

/// Categories by amount, largest first; equal amounts keep name order.
fn ranked(map: &BTreeMap<String, f64>) -> Vec<(&str, f64)> {
    let mut entries: Vec<(&str, f64)> = map.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries
}

pub fn build_report(data: &KpiDashboardData) -> String {
    let financial = &data.financial;
    let retention = &data.retention;
    let break_even = &data.break_even;
    let mut output = String::new();

    let _ = writeln!(output, "# Studio KPI Report");
    let _ = writeln!(output, "Month {:02}/{}", data.month, data.year);
    if let Some(last_sync) = data.last_sync_at() {
        let _ = writeln!(output, "Invoice data synced at {last_sync}");
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Financial");
    let _ = writeln!(
        output,
        "- MRR: {} ({} against target {})",
        format_currency(financial.mrr),
        status_label(kpi_status(financial.mrr, data.targets.target_mrr, false)),
        format_currency(data.targets.target_mrr)
    );
    let _ = writeln!(
        output,
        "- Active members: {} ({} against target {})",
        financial.active_members,
        status_label(kpi_status(
            financial.active_members as f64,
            data.targets.target_members,
            false
        )),
        data.targets.target_members
    );
    let _ = writeln!(output, "- ARPM: {}", format_currency(financial.arpm));
    let _ = writeln!(output, "- Income: {}", format_currency(financial.total_income));
    let _ = writeln!(
        output,
        "- Expenses: {} (synced {}, fixed {}, variable {})",
        format_currency(financial.total_expenses),
        format_currency(financial.synced_expenses),
        format_currency(financial.total_fixed_costs),
        format_currency(financial.total_variable_costs)
    );
    let _ = writeln!(output, "- Net profit: {}", format_currency(financial.net_profit));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Retention");
    let _ = writeln!(
        output,
        "- Churn: {} ({} of {} at month start)",
        format_percent(retention.churn_rate * 100.0, 1),
        retention.churned_this_month,
        retention.active_at_start_of_month
    );
    let _ = writeln!(
        output,
        "- Retention: {}",
        format_percent(retention.retention_rate * 100.0, 1)
    );
    let _ = writeln!(output, "- New members: {}", retention.new_members_this_month);
    let _ = writeln!(output, "- Average tenure: {:.1} months", retention.avg_tenure_months);
    let _ = writeln!(
        output,
        "- LTV {} / CAC {} = {}",
        format_currency(retention.ltv),
        format_currency(retention.cac),
        format_ratio(retention.ltv_cac_ratio)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Break-even");
    if break_even.break_even_revenue == 0.0 {
        let _ = writeln!(output, "No fixed costs recorded for this month.");
    } else if break_even.break_even_members == 0 {
        let _ = writeln!(
            output,
            "- Fixed costs of {} with no paying members to cover them",
            format_currency(break_even.break_even_revenue)
        );
    } else {
        let _ = writeln!(
            output,
            "- {} of {} members needed to cover {} ({})",
            break_even.current_members,
            break_even.break_even_members,
            format_currency(break_even.break_even_revenue),
            format_percent(break_even.progress_percent, 0)
        );
    }
    if break_even.studio_area_sqm > 0.0 {
        let _ = writeln!(
            output,
            "- Revenue per sqm: {} over {} sqm",
            format_currency(break_even.revenue_per_sqm),
            break_even.studio_area_sqm
        );
    }

    let change = &data.month_over_month;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Month over Month");
    let _ = writeln!(output, "- Income: {}", signed_percent(change.income_change));
    let _ = writeln!(output, "- Expenses: {}", signed_percent(change.expense_change));
    let _ = writeln!(output, "- Profit: {}", signed_percent(change.profit_change));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Anomalies");
    if data.anomalies.is_empty() {
        let _ = writeln!(output, "Nothing unusual this month.");
    } else {
        for anomaly in &data.anomalies {
            let _ = writeln!(output, "- {anomaly}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Expenses by Category");
    if data.expenses_by_category.is_empty() {
        let _ = writeln!(output, "No synced expenses for this month.");
    } else {
        for (category, amount) in ranked(&data.expenses_by_category) {
            let _ = writeln!(output, "- {category}: {}", format_currency(amount));
        }
    }

    if !data.income_by_payment_type.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Income by Payment Type");
        for (payment_type, amount) in ranked(&data.income_by_payment_type) {
            let _ = writeln!(output, "- {payment_type}: {}", format_currency(amount));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Members, Last Six Months");
    let trend: Vec<String> = data
        .member_sparkline
        .iter()
        .map(|count| count.to_string())
        .collect();
    let _ = writeln!(output, "{}", trend.join(" → "));

    output
}
