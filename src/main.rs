use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use studio_kpi::config::AppConfig;
use studio_kpi::db::{self, PgStudioStore};
use studio_kpi::formulas::format_currency;
use studio_kpi::kpi::{
    CONFIG_CURRENT_RENT, CONFIG_STUDIO_AREA, CONFIG_TARGET_MEMBERS, CONFIG_TARGET_MRR,
};
use studio_kpi::models::{ExpenseForm, MarketingForm, StudioConfigForm};
use studio_kpi::report;
use studio_kpi::service::{
    KpiService, LoadSettings, OverviewService, PreferenceService, ScheduleService,
};
use studio_kpi::store::StudioStore;
use studio_kpi::sync::{HttpInvoiceSync, InvoiceSync, UnconfiguredSync};

#[derive(Parser)]
#[command(name = "studio-kpi")]
#[command(about = "KPI dashboard and back-office tooling for a fitness studio", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MonthArgs {
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: u32,
    #[arg(long)]
    year: i32,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo studio data
    Seed,
    /// Print the KPI dashboard for a month
    Kpi {
        #[command(flatten)]
        period: MonthArgs,
        #[arg(long)]
        json: bool,
        /// Skip the automatic invoice sync for stale data
        #[arg(long)]
        no_auto_sync: bool,
    },
    /// Write the KPI dashboard as a markdown report
    Report {
        #[command(flatten)]
        period: MonthArgs,
        #[arg(long, default_value = "kpi-report.md")]
        out: PathBuf,
    },
    /// List the classes of one day, templates and real classes merged
    Classes {
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Revenue, lead funnel, membership counters and today's classes
    Overview {
        #[arg(long)]
        json: bool,
    },
    /// Current subscription and punch card per client
    Members {
        #[arg(long)]
        json: bool,
    },
    /// Pull invoice data now and print the refreshed current month
    Sync,
    /// Record a manual expense
    AddExpense {
        #[command(flatten)]
        period: MonthArgs,
        #[arg(long)]
        category: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        fixed: bool,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        vendor: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Record marketing spend for a channel, replacing any earlier entry
    AddMarketing {
        #[command(flatten)]
        period: MonthArgs,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "0")]
        leads: String,
        #[arg(long, default_value = "0")]
        trials: String,
        #[arg(long, default_value = "0")]
        conversions: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Update studio settings; omitted values keep their current setting
    SetConfig {
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        target_mrr: Option<String>,
        #[arg(long)]
        target_members: Option<String>,
        #[arg(long)]
        rent: Option<String>,
    },
    /// Import manual expenses from a CSV file
    ImportExpenses {
        #[command(flatten)]
        period: MonthArgs,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Flip one notification preference for a user
    TogglePref {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        key: String,
    },
}

fn invoice_sync(config: &AppConfig) -> Arc<dyn InvoiceSync> {
    match (&config.functions_url, &config.functions_token) {
        (Some(url), Some(token)) => Arc::new(HttpInvoiceSync::new(url, token.clone())),
        _ => Arc::new(UnconfiguredSync),
    }
}

fn require_sync(config: &AppConfig) -> anyhow::Result<Arc<dyn InvoiceSync>> {
    anyhow::ensure!(
        config.functions_url.is_some() && config.functions_token.is_some(),
        "STUDIO_FUNCTIONS_URL and STUDIO_FUNCTIONS_TOKEN must be set to sync invoices"
    );
    Ok(invoice_sync(config))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancels in-flight loads on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store: Arc<dyn StudioStore> = Arc::new(PgStudioStore::new(pool.clone()));
    let settings = LoadSettings {
        query_timeout: config.query_timeout(),
        sync_stale_after: config.sync_stale_after(),
    };
    let cancel = interrupt_token();
    let today = Local::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Kpi {
            period,
            json,
            no_auto_sync,
        } => {
            let service = KpiService::new(store, invoice_sync(&config), settings);
            let auto_sync = !no_auto_sync && config.functions_url.is_some();
            let data = if auto_sync {
                service
                    .load_with_auto_sync(period.month, period.year, &cancel)
                    .await
            } else {
                service.load(period.month, period.year, &cancel).await
            }
            .context("failed to load data")?;

            if json {
                print_json(&data)?;
            } else {
                print!("{}", report::build_report(&data));
            }
        }
        Commands::Report { period, out } => {
            let service = KpiService::new(store, invoice_sync(&config), settings);
            let data = service
                .load(period.month, period.year, &cancel)
                .await
                .context("failed to load data")?;
            std::fs::write(&out, report::build_report(&data))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Classes { date, json } => {
            let date = date.unwrap_or(today);
            let classes = ScheduleService::new(store, settings)
                .day_classes(date, &cancel)
                .await
                .context("failed to load classes")?;

            if json {
                print_json(&classes)?;
            } else if classes.is_empty() {
                println!("No classes on {date}.");
            } else {
                println!("Classes on {date}:");
                for class in &classes {
                    println!(
                        "- {} {} with {}: {}/{} ({:?})",
                        class.time_label,
                        class.name_hebrew.as_deref().unwrap_or(&class.name),
                        class.coach_name,
                        class.registered,
                        class.capacity,
                        class.status
                    );
                }
            }
        }
        Commands::Overview { json } => {
            let overview = OverviewService::new(store, settings)
                .load(&cancel)
                .await
                .context("failed to load data")?;

            if json {
                print_json(&overview)?;
            } else {
                let revenue = &overview.revenue;
                println!(
                    "Revenue this month: {} ({:.1}% {} vs {} last month)",
                    format_currency(revenue.current_total),
                    revenue.trend_percent.abs(),
                    if revenue.trend_up { "up" } else { "down" },
                    format_currency(revenue.last_month_total)
                );
                println!(
                    "Leads: {} new, {} in trial, {:.1}% converted",
                    overview.funnel.new_leads, overview.funnel.trials, overview.funnel.conversion_rate
                );
                println!(
                    "Members: {} active, {} frozen, {} expiring soon, {} in debt ({})",
                    overview.stats.active,
                    overview.stats.frozen,
                    overview.stats.expiring_soon,
                    overview.stats.debt_count,
                    format_currency(overview.stats.debt_total)
                );
                println!("Classes today: {}", overview.todays_classes.len());
            }
        }
        Commands::Members { json } => {
            let members = OverviewService::new(store, settings)
                .memberships(&cancel)
                .await
                .context("failed to load data")?;

            if json {
                print_json(&members)?;
            } else {
                for (user_id, membership) in &members {
                    let subscription = membership
                        .subscription
                        .as_ref()
                        .map(|view| format!("{} ({})", view.plan_name, view.plan_status))
                        .unwrap_or_else(|| "-".to_string());
                    let ticket = membership
                        .ticket
                        .as_ref()
                        .map(|view| {
                            format!(
                                "{} {}/{}",
                                view.plan_name,
                                view.sessions_remaining.unwrap_or(0),
                                view.total_sessions.unwrap_or(0)
                            )
                        })
                        .unwrap_or_else(|| "-".to_string());
                    println!("- {user_id}: subscription {subscription}, ticket {ticket}");
                }
            }
        }
        Commands::Sync => {
            let service = KpiService::new(store, require_sync(&config)?, settings);
            let data = service
                .trigger_sync(today.month(), today.year(), &cancel)
                .await
                .context("failed to sync financial data")?;
            print!("{}", report::build_report(&data));
        }
        Commands::AddExpense {
            period,
            category,
            amount,
            fixed,
            description,
            vendor,
            notes,
        } => {
            let form = ExpenseForm {
                category,
                description,
                amount,
                is_fixed: fixed,
                vendor_name: vendor,
                notes,
            };
            let data = KpiService::new(store, invoice_sync(&config), settings)
                .add_expense(period.month, period.year, form, &cancel)
                .await
                .context("failed to add expense")?;
            println!(
                "Expense recorded. Net profit for {:02}/{} is now {}.",
                data.month,
                data.year,
                format_currency(data.financial.net_profit)
            );
        }
        Commands::AddMarketing {
            period,
            channel,
            amount,
            leads,
            trials,
            conversions,
            notes,
        } => {
            let form = MarketingForm {
                channel,
                amount,
                leads_generated: leads,
                trials_booked: trials,
                conversions,
                notes,
            };
            let data = KpiService::new(store, invoice_sync(&config), settings)
                .add_marketing_spend(period.month, period.year, form, &cancel)
                .await
                .context("failed to record marketing spend")?;
            println!(
                "Marketing spend recorded. CAC for {:02}/{} is now {}.",
                data.month,
                data.year,
                format_currency(data.retention.cac)
            );
        }
        Commands::SetConfig {
            area,
            target_mrr,
            target_members,
            rent,
        } => {
            let service = KpiService::new(store, invoice_sync(&config), settings);
            let current = service
                .config(&cancel)
                .await
                .context("failed to load studio config")?;
            let keep = |value: Option<String>, key: &str| {
                value.unwrap_or_else(|| current.get(key).cloned().unwrap_or_default())
            };
            let form = StudioConfigForm {
                studio_area_sqm: keep(area, CONFIG_STUDIO_AREA),
                target_mrr: keep(target_mrr, CONFIG_TARGET_MRR),
                target_members: keep(target_members, CONFIG_TARGET_MEMBERS),
                current_rent: keep(rent, CONFIG_CURRENT_RENT),
            };
            service
                .update_config(today.month(), today.year(), &form, &cancel)
                .await
                .context("failed to update studio config")?;
            for (key, value) in form.entries() {
                println!("{key} = {value}");
            }
        }
        Commands::ImportExpenses { period, csv } => {
            let mut reader = csv::Reader::from_path(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let forms = reader
                .deserialize::<ExpenseForm>()
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("failed to parse {}", csv.display()))?;
            info!(rows = forms.len(), path = %csv.display(), "Parsed expense CSV");

            let (inserted, data) = KpiService::new(store, invoice_sync(&config), settings)
                .import_expenses(period.month, period.year, forms, &cancel)
                .await
                .context("failed to import expenses")?;
            println!(
                "Imported {inserted} expenses from {}. Total expenses for {:02}/{}: {}.",
                csv.display(),
                data.month,
                data.year,
                format_currency(data.financial.total_expenses)
            );
        }
        Commands::TogglePref { user, key } => {
            let preferences = PreferenceService::new(store, user);
            preferences
                .load()
                .await
                .context("failed to load notification preferences")?;
            let enabled = preferences
                .toggle(&key)
                .await
                .context("failed to save notification preference")?;
            println!("{key} is now {}.", if enabled { "on" } else { "off" });
        }
    }

    Ok(())
}
