use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{Datelike, Local, NaiveDate};
use clap::{ArgGroup, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod balance;
mod config;
mod dates;
mod db;
mod heatmap;
mod import;
mod models;
mod report;
mod roster;
mod stats;

use config::Config;
use models::{normalize_uid, ClientStatus, NewClient, NewLesson, NewPayment, PaymentStatus};

#[derive(Parser)]
#[command(name = "tutoring-ledger")]
#[command(about = "Clients, payments, lessons and hour balances for a tutoring service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a few sample clients with payments and lessons
    Seed,
    /// Import clients.csv, payments.csv and lessons.csv from a directory
    Import {
        #[arg(long, default_value = "database/exports")]
        dir: PathBuf,
    },
    /// Manage clients
    Client {
        #[command(subcommand)]
        command: ClientCommand,
    },
    /// Manage payments
    Payment {
        #[command(subcommand)]
        command: PaymentCommand,
    },
    /// Manage lessons
    Lesson {
        #[command(subcommand)]
        command: LessonCommand,
    },
    /// Show clients that still have prepaid hours
    #[command(group(
        ArgGroup::new("format")
            .args(["all", "json"])
            .multiple(false)
    ))]
    Balances {
        /// Include every client, not just those with hours remaining
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show lesson activity per day
    Heatmap {
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(heatmap::MAX_WINDOW_MONTHS)))]
        months: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(heatmap::MAX_WINDOW_MONTHS)))]
        months: Option<u32>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ClientCommand {
    /// List clients with their hours balance
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        teacher: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Add {
        uid: String,
        full_name: String,
        #[command(flatten)]
        details: ClientDetails,
    },
    Update {
        uid: String,
        #[arg(long)]
        new_uid: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
        #[command(flatten)]
        details: ClientDetails,
    },
    /// Delete a client together with its payments and lessons
    Delete {
        uid: String,
        #[arg(long)]
        yes: bool,
    },
    /// List the teachers assigned to clients
    Teachers,
}

#[derive(Args)]
struct ClientDetails {
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    teacher: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    telephone: Option<String>,
    #[arg(long)]
    lead_source: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Subcommand)]
enum PaymentCommand {
    List,
    Add {
        uid: String,
        hours: Decimal,
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
        #[arg(long)]
        package: Option<String>,
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        hourly_rate: Option<Decimal>,
        /// Add 13% HST to the amount paid
        #[arg(long)]
        apply_tax: bool,
        #[arg(long, default_value = "paid")]
        status: String,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum LessonCommand {
    List,
    Add {
        uid: String,
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "1.0")]
        hours: Decimal,
        #[arg(long)]
        teacher: Option<String>,
        #[arg(long, default_value = "General")]
        topic: String,
        #[arg(long, default_value = "paid")]
        billing: String,
        #[arg(long, value_parser = parse_date_arg)]
        paid_teacher: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    Delete {
        id: i64,
    },
}

/// Fails when a write touched no rows, e.g. the client vanished after the
/// existence check.
fn ensure_written(written: bool, record: &str, uid: &str) -> anyhow::Result<()> {
    if !written {
        bail!("no {record} saved: client {} not found", normalize_uid(uid));
    }
    Ok(())
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    dates::parse_record_date(raw).ok_or_else(|| format!("unrecognised date {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool).await?;
            println!("Seeded {inserted} clients.");
        }
        Commands::Import { dir } => {
            let defaults = import::ImportDefaults::new(&config.default_teacher);
            let report = import::run_import(&pool, &dir, &defaults).await?;
            println!(
                "Imported {} clients ({} skipped), {} payments ({} skipped), {} lessons ({} skipped) from {}.",
                report.clients.inserted,
                report.clients.skipped,
                report.payments.inserted,
                report.payments.skipped,
                report.lessons.inserted,
                report.lessons.skipped,
                dir.display()
            );
        }
        Commands::Client { command } => run_client(&pool, &config, command).await?,
        Commands::Payment { command } => run_payment(&pool, command).await?,
        Commands::Lesson { command } => run_lesson(&pool, &config, command).await?,
        Commands::Balances { all, json } => {
            let snapshot = db::fetch_snapshot(&pool).await?;
            let summaries =
                balance::reconcile(&snapshot.clients, &snapshot.payments, &snapshot.lessons);

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if all {
                let clients: Vec<&models::Client> = snapshot.clients.iter().collect();
                print!("{}", report::balance_table(&clients, &summaries));
            } else {
                let balances = stats::hours_report(&snapshot.clients, &summaries);
                if balances.is_empty() {
                    println!("No clients with hours remaining.");
                    return Ok(());
                }
                println!("Clients with hours remaining:");
                for balance in &balances {
                    println!(
                        "- {} ({}) {:.1}h remaining of {:.1}h, last lesson {}",
                        balance.full_name,
                        balance.uid,
                        balance.summary.remaining,
                        balance.summary.total_purchased,
                        report::format_date(balance.summary.last_lesson_date)
                    );
                }
            }
        }
        Commands::Heatmap { months, json } => {
            let lessons = db::fetch_lessons(&pool).await?;
            let heatmap = heatmap::build_now(&lessons, months.unwrap_or(config.heatmap_months));
            if json {
                println!("{}", serde_json::to_string_pretty(&heatmap)?);
            } else {
                print!("{}", report::render_heatmap(&heatmap));
            }
        }
        Commands::Report { months, out } => {
            let snapshot = db::fetch_snapshot(&pool).await?;
            let heatmap =
                heatmap::build_now(&snapshot.lessons, months.unwrap_or(config.heatmap_months));
            let report = report::build_report(&snapshot, &heatmap);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn run_client(pool: &PgPool, config: &Config, command: ClientCommand) -> anyhow::Result<()> {
    match command {
        ClientCommand::List {
            search,
            status,
            teacher,
            json,
        } => {
            let snapshot = db::fetch_snapshot(pool).await?;
            let summaries =
                balance::reconcile(&snapshot.clients, &snapshot.payments, &snapshot.lessons);
            let filter = roster::ClientFilter {
                search,
                status: status.as_deref().map(ClientStatus::parse),
                teacher,
            };
            let clients = roster::filter_clients(&snapshot.clients, &filter);

            if json {
                println!("{}", serde_json::to_string_pretty(&clients)?);
            } else if clients.is_empty() {
                println!("No clients found.");
            } else {
                print!("{}", report::balance_table(&clients, &summaries));
            }
        }
        ClientCommand::Add {
            uid,
            full_name,
            details,
        } => {
            let client = NewClient {
                uid: normalize_uid(&uid),
                full_name,
                status: ClientStatus::parse(details.status.as_deref().unwrap_or("active")),
                teacher: details
                    .teacher
                    .or_else(|| Some(config.default_teacher.clone())),
                email: details.email,
                telephone: details.telephone,
                lead_source: details.lead_source,
                notes: details.notes,
            };
            if client.uid.is_empty() {
                bail!("client uid must not be empty");
            }
            if !db::insert_client(pool, &client).await? {
                bail!("a client with uid {} already exists", client.uid);
            }
            tracing::info!(uid = %client.uid, "client added");
            println!("Client {} added.", client.uid);
        }
        ClientCommand::Update {
            uid,
            new_uid,
            full_name,
            details,
        } => {
            let existing = db::fetch_clients(pool)
                .await?
                .into_iter()
                .find(|client| client.uid == normalize_uid(&uid))
                .with_context(|| format!("client {} not found", normalize_uid(&uid)))?;

            let updated = NewClient {
                uid: new_uid
                    .map(|value| normalize_uid(&value))
                    .unwrap_or(existing.uid),
                full_name: full_name.unwrap_or(existing.full_name),
                status: details
                    .status
                    .as_deref()
                    .map(ClientStatus::parse)
                    .unwrap_or(existing.status),
                teacher: details.teacher.or(existing.teacher),
                email: details.email.or(existing.email),
                telephone: details.telephone.or(existing.telephone),
                lead_source: details.lead_source.or(existing.lead_source),
                notes: details.notes.or(existing.notes),
            };
            if updated.uid.is_empty() {
                bail!("client uid must not be empty");
            }
            let changed = db::update_client(pool, &uid, &updated).await?;
            ensure_written(changed, "client", &uid)?;
            println!("Client {} updated.", updated.uid);
        }
        ClientCommand::Delete { uid, yes } => {
            let snapshot = db::fetch_snapshot(pool).await?;
            let Some(client) = snapshot
                .clients
                .iter()
                .find(|client| client.uid == normalize_uid(&uid))
            else {
                println!("Client {} not found.", normalize_uid(&uid));
                return Ok(());
            };
            let summaries =
                balance::reconcile(&snapshot.clients, &snapshot.payments, &snapshot.lessons);
            let (payments, lessons) = balance::dependent_counts(&summaries, &client.uid);

            if !yes {
                println!(
                    "Deleting \"{}\" ({}) also deletes {} payment(s) and {} lesson(s). Re-run with --yes to confirm.",
                    client.full_name, client.uid, payments, lessons
                );
                return Ok(());
            }
            db::delete_client(pool, &client.uid).await?;
            tracing::info!(uid = %client.uid, payments, lessons, "client deleted");
            println!("Client {} deleted.", client.uid);
        }
        ClientCommand::Teachers => {
            let clients = db::fetch_clients(pool).await?;
            for teacher in roster::teachers(&clients) {
                println!("{teacher}");
            }
        }
    }

    Ok(())
}

async fn run_payment(pool: &PgPool, command: PaymentCommand) -> anyhow::Result<()> {
    match command {
        PaymentCommand::List => {
            let payments = db::fetch_payments(pool).await?;
            if payments.is_empty() {
                println!("No payments recorded yet.");
            } else {
                print!("{}", report::payment_table(&payments));
            }
        }
        PaymentCommand::Add {
            uid,
            hours,
            date,
            package,
            amount,
            hourly_rate,
            apply_tax,
            status,
            method,
            notes,
        } => {
            if hours.is_sign_negative() {
                bail!("hours purchased must not be negative");
            }
            if !db::client_exists(pool, &uid).await? {
                bail!("client {} not found", normalize_uid(&uid));
            }

            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let (hst, total) = match amount {
                Some(amount) => {
                    let (hst, total) = stats::calculate_tax(amount, apply_tax);
                    (Some(hst), Some(total))
                }
                None => (Some(Decimal::ZERO), None),
            };
            let payment = NewPayment {
                client_uid: normalize_uid(&uid),
                payment_date: Some(date),
                package_type: package,
                hours_purchased: Some(hours),
                amount_paid: amount,
                hourly_rate,
                amount_owing_pretax: None,
                apply_tax,
                hst_amount: hst,
                total_payment: total,
                status: PaymentStatus::parse(&status),
                payment_method: method.map(|value| value.to_lowercase()),
                year: Some(date.year()),
                notes,
            };
            let written = db::insert_payment(pool, &payment).await?;
            ensure_written(written, "payment", &payment.client_uid)?;
            println!(
                "Payment of {:.1}h recorded for {}.",
                hours, payment.client_uid
            );
        }
        PaymentCommand::Delete { id } => {
            if db::delete_payment(pool, id).await? {
                println!("Payment {id} deleted.");
            } else {
                println!("Payment {id} not found.");
            }
        }
    }

    Ok(())
}

async fn run_lesson(pool: &PgPool, config: &Config, command: LessonCommand) -> anyhow::Result<()> {
    match command {
        LessonCommand::List => {
            let lessons = db::fetch_lessons(pool).await?;
            if lessons.is_empty() {
                println!("No lessons recorded yet.");
            } else {
                print!("{}", report::lesson_table(&lessons));
            }
        }
        LessonCommand::Add {
            uid,
            date,
            hours,
            teacher,
            topic,
            billing,
            paid_teacher,
            notes,
        } => {
            if hours.is_sign_negative() {
                bail!("hours taught must not be negative");
            }
            if !db::client_exists(pool, &uid).await? {
                bail!("client {} not found", normalize_uid(&uid));
            }

            let lesson = NewLesson {
                client_uid: normalize_uid(&uid),
                lesson_date: Some(date.unwrap_or_else(|| Local::now().date_naive())),
                hours_taught: Some(hours),
                teacher: Some(teacher.unwrap_or_else(|| config.default_teacher.clone())),
                lesson_topic: Some(topic),
                paid_or_probono: billing.to_lowercase(),
                paid_teacher,
                notes,
            };
            let written = db::insert_lesson(pool, &lesson).await?;
            ensure_written(written, "lesson", &lesson.client_uid)?;
            println!("Lesson of {:.1}h recorded for {}.", hours, lesson.client_uid);
        }
        LessonCommand::Delete { id } => {
            if db::delete_lesson(pool, id).await? {
                println!("Lesson {id} deleted.");
            } else {
                println!("Lesson {id} not found.");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("tutoring-ledger").chain(args.iter().copied()))
    }

    #[test]
    fn heatmap_months_are_bounded() {
        assert!(parse(&["heatmap", "--months", "0"]).is_err());
        assert!(parse(&["heatmap", "--months", "121"]).is_err());
        assert!(parse(&["heatmap", "--months", "4294967295"]).is_err());
        assert!(parse(&["report", "--months", "2147483648"]).is_err());

        match parse(&["heatmap", "--months", "120"]).unwrap().command {
            Commands::Heatmap { months, .. } => assert_eq!(months, Some(120)),
            _ => panic!("expected heatmap"),
        }
    }

    #[test]
    fn unwritten_records_are_errors() {
        assert!(ensure_written(true, "lesson", "c1").is_ok());
        let err = ensure_written(false, "payment", " c1 ").unwrap_err();
        assert_eq!(err.to_string(), "no payment saved: client C1 not found");
    }

    #[test]
    fn balances_formats_are_exclusive() {
        assert!(parse(&["balances", "--all", "--json"]).is_err());
        assert!(parse(&["balances", "--json"]).is_ok());
    }
}
