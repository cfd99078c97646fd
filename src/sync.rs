use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::StudioError;

pub const SYNC_FUNCTION: &str = "sync-financial-data";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    #[serde(default)]
    pub total_income: f64,
    #[serde(default)]
    pub total_expenses: f64,
    #[serde(default)]
    pub net_profit: f64,
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub expense_count: u64,
    #[serde(default)]
    pub new_documents: u64,
    #[serde(default)]
    pub new_expenses: u64,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    #[serde(default)]
    success: bool,
    summary: Option<SyncSummary>,
    error: Option<String>,
    details: Option<String>,
}

/// The external invoice sync. Refreshes `financial_stats_cache` as a side
/// effect; the caller only awaits completion.
#[async_trait]
pub trait InvoiceSync: Send + Sync {
    async fn sync_financial_data(&self) -> Result<SyncSummary, StudioError>;
}

/// Invokes the sync function on the serverless functions host.
pub struct HttpInvoiceSync {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpInvoiceSync {
    pub fn new(functions_url: &str, token: impl Into<String>) -> Self {
        let endpoint = format!(
            "{}/functions/v1/{}",
            functions_url.trim_end_matches('/'),
            SYNC_FUNCTION
        );
        Self {
            client: reqwest::Client::new(),
            endpoint,
            token: token.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Stand-in when no functions host is configured; every sync fails.
pub struct UnconfiguredSync;

#[async_trait]
impl InvoiceSync for UnconfiguredSync {
    async fn sync_financial_data(&self) -> Result<SyncSummary, StudioError> {
        Err(StudioError::Sync(
            "STUDIO_FUNCTIONS_URL and STUDIO_FUNCTIONS_TOKEN are not set".to_string(),
        ))
    }
}

fn interpret(status: u16, body: &str) -> Result<SyncSummary, StudioError> {
    let parsed: SyncResponse = serde_json::from_str(body)
        .map_err(|err| StudioError::Sync(format!("http {status}: unreadable response: {err}")))?;

    if !parsed.success || status >= 400 {
        let reason = parsed.error.unwrap_or_else(|| format!("http {status}"));
        return Err(match parsed.details {
            Some(details) => StudioError::Sync(format!("{reason}: {details}")),
            None => StudioError::Sync(reason),
        });
    }

    Ok(parsed.summary.unwrap_or_default())
}

#[async_trait]
impl InvoiceSync for HttpInvoiceSync {
    async fn sync_financial_data(&self) -> Result<SyncSummary, StudioError> {
        info!(endpoint = %self.endpoint, "Invoking invoice sync");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let outcome = interpret(status, &body);
        match &outcome {
            Ok(summary) => info!(
                documents = summary.document_count,
                expenses = summary.expense_count,
                "Invoice sync finished"
            ),
            Err(err) => warn!(status, error = %err, "Invoice sync rejected"),
        }
        outcome
    }
}
