use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A joined relation as the query layer hands it back: a single object for
/// to-one joins, an array when the join cardinality is ambiguous.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Joined<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Joined<T> {
    pub fn into_first(self) -> Option<T> {
        match self {
            Joined::Many(items) => items.into_iter().next(),
            Joined::One(item) => Some(item),
        }
    }
}

/// Collapses an optional, possibly array-wrapped join into one optional record.
pub fn normalize_join<T>(raw: Option<Joined<T>>) -> Option<T> {
    raw.and_then(Joined::into_first)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlanRef {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    #[serde(rename = "price-per-month")]
    pub price_per_month: Option<f64>,
    pub sessions_per_week: Option<i32>,
    pub total_sessions: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct BookingCount {
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSubscription {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub start_date: Option<NaiveDateTime>,
    pub plan: Option<PlanRef>,
}

impl ActiveSubscription {
    pub fn price_per_month(&self) -> Option<f64> {
        self.plan.as_ref().and_then(|plan| plan.price_per_month)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChurnLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub churn_date: NaiveDateTime,
    pub reason: Option<String>,
    pub price_at_churn: Option<f64>,
    pub plan_name: Option<String>,
    pub months_subscribed: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketingSpend {
    pub id: Uuid,
    pub month: i32,
    pub year: i32,
    pub channel: String,
    pub amount: Option<f64>,
    pub leads_generated: Option<i32>,
    pub trials_booked: Option<i32>,
    pub conversions: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyExpense {
    pub id: Uuid,
    pub month: i32,
    pub year: i32,
    pub category: String,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub is_fixed: bool,
    pub vendor_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRow {
    pub key: String,
    pub value: String,
}

/// Monthly totals written by the invoice sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialStatsCache {
    pub month: i32,
    pub year: i32,
    pub total_income: Option<f64>,
    pub total_expenses: Option<f64>,
    pub net_profit: Option<f64>,
    pub income_by_payment_type: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMember {
    pub id: Uuid,
    pub start_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TenureSubscription {
    pub id: Uuid,
    pub start_date: NaiveDateTime,
    pub is_active: bool,
    pub plan_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedExpense {
    pub category: Option<String>,
    pub amount: Option<f64>,
}

/// Everything the KPI aggregation reads for one month.
#[derive(Debug, Clone, Default)]
pub struct KpiSources {
    pub active_subscriptions: Vec<ActiveSubscription>,
    pub churn_log: Vec<ChurnLogEntry>,
    pub marketing_spend: Vec<MarketingSpend>,
    pub monthly_expenses: Vec<MonthlyExpense>,
    pub config_rows: Vec<ConfigRow>,
    pub stats: Option<FinancialStatsCache>,
    pub new_members: Vec<NewMember>,
    pub tenure_subscriptions: Vec<TenureSubscription>,
    pub categorized_expenses: Vec<CategorizedExpense>,
    pub previous_stats: Option<FinancialStatsCache>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSchedule {
    pub id: Uuid,
    pub name: String,
    /// 1 = Sunday .. 7 = Saturday
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub duration_minutes: Option<i32>,
    pub max_participants: Option<i32>,
    pub coach_name: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInstance {
    pub id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub name: Option<String>,
    pub name_hebrew: Option<String>,
    pub class_date: NaiveDateTime,
    pub max_participants: Option<i32>,
    pub coach_name: Option<String>,
    pub bookings: Option<BookingCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassStatus {
    Open,
    Filling,
    Full,
}

/// One row of the day view, either backed by a real class or projected
/// from its weekly template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedClass {
    pub id: String,
    pub schedule_id: Option<Uuid>,
    pub name: String,
    pub name_hebrew: Option<String>,
    pub time_label: String,
    pub date: NaiveDate,
    pub starts_at: NaiveDateTime,
    pub coach_name: String,
    pub registered: i64,
    pub capacity: i32,
    pub status: ClassStatus,
    pub is_instance: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaidDocument {
    pub amount: Option<f64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MembershipRow {
    pub is_active: bool,
    pub plan_status: Option<String>,
    pub outstanding_balance: Option<f64>,
    pub end_date: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_status: Option<String>,
    pub is_active: bool,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub sessions_remaining: Option<i32>,
    pub outstanding_balance: Option<f64>,
    pub has_debt: Option<bool>,
    pub debt_amount: Option<f64>,
    pub created_at: NaiveDateTime,
    pub plan: Option<PlanRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub sessions_remaining: Option<i32>,
    pub total_sessions: Option<i32>,
    pub purchase_date: Option<NaiveDateTime>,
    pub expiry_date: Option<NaiveDateTime>,
    pub has_debt: Option<bool>,
    pub created_at: NaiveDateTime,
    pub plan: Option<PlanRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpenseForm {
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub amount: String,
    #[serde(default)]
    pub is_fixed: bool,
    #[serde(default)]
    pub vendor_name: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketingForm {
    pub channel: String,
    pub amount: String,
    pub leads_generated: String,
    pub trials_booked: String,
    pub conversions: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfigForm {
    pub studio_area_sqm: String,
    pub target_mrr: String,
    pub target_members: String,
    pub current_rent: String,
}

/// Validated manual expense ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub month: i32,
    pub year: i32,
    pub category: String,
    pub description: Option<String>,
    pub amount: f64,
    pub is_fixed: bool,
    pub vendor_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMarketingSpend {
    pub month: i32,
    pub year: i32,
    pub channel: String,
    pub amount: f64,
    pub leads_generated: i32,
    pub trials_booked: i32,
    pub conversions: i32,
    pub notes: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn lenient_f64(value: &str) -> f64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .unwrap_or(0.0)
}

fn lenient_i32(value: &str) -> i32 {
    value.trim().parse::<i32>().unwrap_or(0)
}

impl ExpenseForm {
    pub fn into_new_expense(self, month: i32, year: i32) -> NewExpense {
        NewExpense {
            month,
            year,
            category: self.category,
            description: non_empty(&self.description),
            amount: lenient_f64(&self.amount),
            is_fixed: self.is_fixed,
            vendor_name: non_empty(&self.vendor_name),
            notes: non_empty(&self.notes),
        }
    }
}

impl MarketingForm {
    pub fn into_new_spend(self, month: i32, year: i32) -> NewMarketingSpend {
        NewMarketingSpend {
            month,
            year,
            channel: self.channel,
            amount: lenient_f64(&self.amount),
            leads_generated: lenient_i32(&self.leads_generated),
            trials_booked: lenient_i32(&self.trials_booked),
            conversions: lenient_i32(&self.conversions),
            notes: non_empty(&self.notes),
        }
    }
}

impl StudioConfigForm {
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("studio_area_sqm", self.studio_area_sqm.as_str()),
            ("target_mrr", self.target_mrr.as_str()),
            ("target_members", self.target_members.as_str()),
            ("current_rent", self.current_rent.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_object_and_array_collapse_to_same_record() {
        let object: Joined<BookingCount> = serde_json::from_str(r#"{"count": 4}"#).unwrap();
        let array: Joined<BookingCount> = serde_json::from_str(r#"[{"count": 4}]"#).unwrap();
        assert_eq!(normalize_join(Some(object)), Some(BookingCount { count: 4 }));
        assert_eq!(normalize_join(Some(array)), Some(BookingCount { count: 4 }));
    }

    #[test]
    fn empty_join_array_is_none() {
        let empty: Joined<BookingCount> = serde_json::from_str("[]").unwrap();
        assert_eq!(normalize_join(Some(empty)), None);
        assert_eq!(normalize_join::<BookingCount>(None), None);
    }

    #[test]
    fn plan_reads_hyphenated_price_column() {
        let plan: Joined<PlanRef> =
            serde_json::from_str(r#"{"name": "Unlimited", "price-per-month": 450, "created_at": "x"}"#)
                .unwrap();
        let plan = normalize_join(Some(plan)).unwrap();
        assert_eq!(plan.price_per_month, Some(450.0));
        assert_eq!(plan.name.as_deref(), Some("Unlimited"));
    }

    #[test]
    fn expense_form_parses_leniently() {
        let form = ExpenseForm {
            category: "חשמל".to_string(),
            description: "  ".to_string(),
            amount: "abc".to_string(),
            is_fixed: true,
            vendor_name: "IEC".to_string(),
            notes: String::new(),
        };
        let expense = form.into_new_expense(3, 2026);
        assert_eq!(expense.amount, 0.0);
        assert_eq!(expense.description, None);
        assert_eq!(expense.vendor_name.as_deref(), Some("IEC"));
        assert_eq!(expense.notes, None);
    }

    #[test]
    fn marketing_form_defaults_bad_counts_to_zero() {
        let form = MarketingForm {
            channel: "אינסטגרם".to_string(),
            amount: "1200.5".to_string(),
            leads_generated: "30".to_string(),
            trials_booked: "".to_string(),
            conversions: "x".to_string(),
            notes: "spring".to_string(),
        };
        let spend = form.into_new_spend(4, 2026);
        assert_eq!(spend.amount, 1200.5);
        assert_eq!(spend.leads_generated, 30);
        assert_eq!(spend.trials_booked, 0);
        assert_eq!(spend.conversions, 0);
    }
}
