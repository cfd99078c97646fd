use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{MemberSubscription, MemberTicket};

const DEFAULT_SUBSCRIPTION_LABEL: &str = "מנוי";
const DEFAULT_TICKET_LABEL: &str = "כרטיסייה";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub id: Uuid,
    pub plan_name: String,
    pub plan_status: String,
    pub sessions_remaining: Option<i32>,
    pub end_date: Option<NaiveDateTime>,
    pub outstanding_balance: f64,
    pub has_debt: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    pub id: Uuid,
    pub plan_name: String,
    pub status: String,
    pub sessions_remaining: Option<i32>,
    pub total_sessions: Option<i32>,
    pub expiry_date: Option<NaiveDateTime>,
    pub has_debt: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientMembership {
    pub subscription: Option<SubscriptionView>,
    pub ticket: Option<TicketView>,
}

/// Keeps, per user, the row with the greatest `created_at` among those
/// accepted by `is_current`. Ties keep the first row seen.
fn latest_per_user<'a, T>(
    rows: &'a [T],
    user_of: impl Fn(&T) -> Uuid,
    created_of: impl Fn(&T) -> NaiveDateTime,
    is_current: impl Fn(&T) -> bool,
) -> BTreeMap<Uuid, &'a T> {
    let mut latest: BTreeMap<Uuid, &T> = BTreeMap::new();
    for row in rows.iter().filter(|row| is_current(row)) {
        let user_id = user_of(row);
        let newer = latest
            .get(&user_id)
            .map_or(true, |existing| created_of(existing) < created_of(row));
        if newer {
            latest.insert(user_id, row);
        }
    }
    latest
}

pub fn latest_active_subscriptions(
    rows: &[MemberSubscription],
) -> BTreeMap<Uuid, &MemberSubscription> {
    latest_per_user(rows, |row| row.user_id, |row| row.created_at, |row| row.is_active)
}

pub fn latest_active_tickets(rows: &[MemberTicket]) -> BTreeMap<Uuid, &MemberTicket> {
    latest_per_user(
        rows,
        |row| row.user_id,
        |row| row.created_at,
        |row| row.status == "active",
    )
}

fn subscription_view(row: &MemberSubscription) -> SubscriptionView {
    SubscriptionView {
        id: row.id,
        plan_name: row
            .plan
            .as_ref()
            .and_then(|plan| plan.name.clone())
            .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_LABEL.to_string()),
        plan_status: row
            .plan_status
            .clone()
            .unwrap_or_else(|| "active".to_string()),
        sessions_remaining: row.sessions_remaining,
        end_date: row.end_date,
        outstanding_balance: row.outstanding_balance.unwrap_or(0.0),
        has_debt: row.has_debt.unwrap_or(false),
    }
}

fn ticket_view(row: &MemberTicket) -> TicketView {
    TicketView {
        id: row.id,
        plan_name: row
            .plan
            .as_ref()
            .and_then(|plan| plan.name.clone())
            .unwrap_or_else(|| DEFAULT_TICKET_LABEL.to_string()),
        status: row.status.clone(),
        sessions_remaining: row.sessions_remaining,
        total_sessions: row.total_sessions,
        expiry_date: row.expiry_date,
        has_debt: row.has_debt.unwrap_or(false),
    }
}

/// Current subscription and punch card for every user holding either.
pub fn resolve_memberships(
    subscriptions: &[MemberSubscription],
    tickets: &[MemberTicket],
) -> BTreeMap<Uuid, ClientMembership> {
    let mut clients: BTreeMap<Uuid, ClientMembership> = BTreeMap::new();
    for (user_id, row) in latest_active_subscriptions(subscriptions) {
        clients.entry(user_id).or_default().subscription = Some(subscription_view(row));
    }
    for (user_id, row) in latest_active_tickets(tickets) {
        clients.entry(user_id).or_default().ticket = Some(ticket_view(row));
    }
    clients
}
