use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Datelike, Local};
use csv::StringRecord;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::dates::parse_record_date;
use crate::db;
use crate::models::{normalize_uid, ClientStatus, NewClient, NewLesson, NewPayment, PaymentStatus};

const BATCH_SIZE: usize = 100;

const CLIENT_UID: &[&str] = &["UID", "uid"];
const CLIENT_NAME: &[&str] = &["full name", "full_name", "name"];
const CLIENT_STATUS: &[&str] = &["status", "Status"];
const CLIENT_EMAIL: &[&str] = &["email", "Email"];
const CLIENT_PHONE: &[&str] = &["telephone", "Telephone", "phone", "Phone"];
const CLIENT_LEAD_SOURCE: &[&str] = &["Lead Source", "lead_source"];
const CLIENT_TEACHER: &[&str] = &["Teacher", "teacher"];
const NOTES: &[&str] = &["notes", "Notes"];

const PAYMENT_DATE: &[&str] = &["Date (a/receivable)", "Date", "date"];
const PAYMENT_PACKAGE: &[&str] = &["package (payments)", "package", "package_type"];
const PAYMENT_HOURS: &[&str] = &["# of hours (payments)", "hours", "hours_purchased"];
const PAYMENT_AMOUNT: &[&str] = &["amount paid (payments)", "amount_paid", "amount"];
const PAYMENT_RATE: &[&str] = &["hourly rate", "hourly_rate"];
const PAYMENT_OWING: &[&str] = &["amount owing (pretax)", "amount_owing"];
const PAYMENT_APPLY_TAX: &[&str] = &["apply tax (payments)", "apply_tax"];
const PAYMENT_HST: &[&str] = &["hst (P)", "hst"];
const PAYMENT_TOTAL: &[&str] = &["total payment (p)", "total_payment", "total"];
const PAYMENT_STATUS: &[&str] = &["status (p)", "status"];
const PAYMENT_METHOD: &[&str] = &["payment method (p)", "payment_method"];
const PAYMENT_YEAR: &[&str] = &["year (p)", "year"];

const LESSON_DATE: &[&str] = &["date of lesson", "Date", "date"];
const LESSON_HOURS: &[&str] = &["# of hours taught", "hours_taught", "hours"];
const LESSON_TEACHER: &[&str] = &["teacher (lesson) drop", "teacher", "Teacher"];
const LESSON_BILLING: &[&str] = &["paid or probono", "paid_or_probono"];
const LESSON_PAID_TEACHER: &[&str] = &["paid teacher (lesson)", "paid_teacher"];
const LESSON_DESCRIPTION: &[&str] = &["Description of Lesson", "description", "notes"];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("missing CSV exports in {}: {}", dir.display(), files.join(", "))]
    MissingFiles { dir: PathBuf, files: Vec<String> },
    #[error("{file} has no column for {field} (expected one of: {})", aliases.join(", "))]
    MissingColumn {
        file: &'static str,
        field: &'static str,
        aliases: Vec<String>,
    },
    #[error("failed to read {file}: {source}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
}

/// Records parsed from one export, plus how many rows were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCount {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub clients: TableCount,
    pub payments: TableCount,
    pub lessons: TableCount,
}

#[derive(Debug, Clone)]
pub struct ImportDefaults {
    pub teacher: String,
    pub year: i32,
}

impl ImportDefaults {
    pub fn new(teacher: impl Into<String>) -> Self {
        Self {
            teacher: teacher.into(),
            year: Local::now().year(),
        }
    }
}

/// Column positions for each accepted header alias, resolved once per file.
struct HeaderIndex {
    headers: StringRecord,
}

impl HeaderIndex {
    fn new(headers: StringRecord) -> Self {
        Self { headers }
    }

    fn positions(&self, aliases: &[&str]) -> Vec<usize> {
        aliases
            .iter()
            .filter_map(|alias| self.headers.iter().position(|h| h.trim() == *alias))
            .collect()
    }

    fn field(&self, aliases: &'static [&'static str]) -> Field {
        Field {
            positions: self.positions(aliases),
        }
    }

    fn require(
        &self,
        file: &'static str,
        field: &'static str,
        aliases: &'static [&'static str],
    ) -> Result<Field, ImportError> {
        let resolved = self.field(aliases);
        if resolved.positions.is_empty() {
            return Err(ImportError::MissingColumn {
                file,
                field,
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
            });
        }
        Ok(resolved)
    }
}

/// A canonical field, read from the first alias column holding a value.
struct Field {
    positions: Vec<usize>,
}

impl Field {
    fn get<'r>(&self, record: &'r StringRecord) -> Option<&'r str> {
        self.positions
            .iter()
            .filter_map(|&idx| record.get(idx))
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    fn text(&self, record: &StringRecord) -> Option<String> {
        self.get(record).map(str::to_string)
    }
}

fn read_csv<R: io::Read>(
    file: &'static str,
    reader: R,
) -> Result<(HeaderIndex, Vec<StringRecord>), ImportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|source| ImportError::Csv { file, source })?
        .clone();
    let records = rdr
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ImportError::Csv { file, source })?;
    Ok((HeaderIndex::new(headers), records))
}

/// Parses a number the way spreadsheet cells hold it: `$1,250.00`, ` 3.5 `.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ','))
        .collect();
    cleaned.parse().ok()
}

/// Hours cells must hold a non-negative number; anything else is unparseable.
fn parse_hours(raw: &str) -> Option<Decimal> {
    let hours = parse_decimal(raw)?;
    if hours.is_sign_negative() && !hours.is_zero() {
        tracing::warn!(value = raw, "negative hours, ignoring value");
        return None;
    }
    Some(hours)
}

fn nonzero(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| !v.is_zero())
}

/// Pulls the topic out of a `comments (m): ...` line, defaulting to `General`.
pub fn extract_topic(description: &str) -> String {
    const MARKER: &str = "comments (m):";
    description
        .lines()
        .find_map(|line| {
            let lower = line.to_ascii_lowercase();
            lower
                .find(MARKER)
                .map(|idx| line[idx + MARKER.len()..].trim().to_string())
        })
        .filter(|topic| !topic.is_empty())
        .unwrap_or_else(|| "General".to_string())
}

pub fn parse_clients<R: io::Read>(
    reader: R,
    defaults: &ImportDefaults,
) -> Result<Parsed<NewClient>, ImportError> {
    const FILE: &str = "clients.csv";
    let (index, rows) = read_csv(FILE, reader)?;
    let uid = index.require(FILE, "uid", CLIENT_UID)?;
    let name = index.field(CLIENT_NAME);
    let status = index.field(CLIENT_STATUS);
    let email = index.field(CLIENT_EMAIL);
    let phone = index.field(CLIENT_PHONE);
    let lead_source = index.field(CLIENT_LEAD_SOURCE);
    let teacher = index.field(CLIENT_TEACHER);
    let notes = index.field(NOTES);

    let mut parsed = Parsed {
        records: Vec::new(),
        skipped: 0,
    };
    let mut seen = HashSet::new();

    for row in &rows {
        let (Some(client_uid), Some(full_name)) = (uid.get(row), name.get(row)) else {
            parsed.skipped += 1;
            continue;
        };
        let client_uid = normalize_uid(client_uid);
        if !seen.insert(client_uid.clone()) {
            tracing::warn!(uid = %client_uid, "duplicate client uid in export, keeping first row");
            parsed.skipped += 1;
            continue;
        }

        parsed.records.push(NewClient {
            uid: client_uid,
            full_name: full_name.to_string(),
            status: ClientStatus::parse(status.get(row).unwrap_or("active")),
            teacher: Some(teacher.text(row).unwrap_or_else(|| defaults.teacher.clone())),
            email: email.text(row),
            telephone: phone.text(row),
            lead_source: lead_source.text(row),
            notes: notes.text(row),
        });
    }

    Ok(parsed)
}

pub fn parse_payments<R: io::Read>(
    reader: R,
    known_uids: &HashSet<String>,
    defaults: &ImportDefaults,
) -> Result<Parsed<NewPayment>, ImportError> {
    const FILE: &str = "payments.csv";
    let (index, rows) = read_csv(FILE, reader)?;
    let uid = index.require(FILE, "uid", CLIENT_UID)?;
    let date = index.field(PAYMENT_DATE);
    let package = index.field(PAYMENT_PACKAGE);
    let hours = index.field(PAYMENT_HOURS);
    let amount = index.field(PAYMENT_AMOUNT);
    let rate = index.field(PAYMENT_RATE);
    let owing = index.field(PAYMENT_OWING);
    let apply_tax = index.field(PAYMENT_APPLY_TAX);
    let hst = index.field(PAYMENT_HST);
    let total = index.field(PAYMENT_TOTAL);
    let status = index.field(PAYMENT_STATUS);
    let method = index.field(PAYMENT_METHOD);
    let year = index.field(PAYMENT_YEAR);
    let notes = index.field(NOTES);

    let mut parsed = Parsed {
        records: Vec::new(),
        skipped: 0,
    };

    for row in &rows {
        let client_uid = normalize_uid(uid.get(row).unwrap_or_default());
        if !known_uids.contains(&client_uid) {
            tracing::warn!(uid = %client_uid, "client not found for payment, skipping row");
            parsed.skipped += 1;
            continue;
        }

        parsed.records.push(NewPayment {
            client_uid,
            payment_date: date.get(row).and_then(parse_record_date),
            package_type: package.text(row),
            hours_purchased: hours.get(row).map_or(Some(Decimal::ZERO), parse_hours),
            amount_paid: nonzero(amount.get(row).and_then(parse_decimal)),
            hourly_rate: nonzero(rate.get(row).and_then(parse_decimal)),
            amount_owing_pretax: nonzero(owing.get(row).and_then(parse_decimal)),
            apply_tax: apply_tax
                .get(row)
                .is_some_and(|value| value.eq_ignore_ascii_case("yes")),
            hst_amount: Some(hst.get(row).and_then(parse_decimal).unwrap_or(Decimal::ZERO)),
            total_payment: nonzero(total.get(row).and_then(parse_decimal)),
            status: PaymentStatus::parse(status.get(row).unwrap_or("paid")),
            payment_method: method.get(row).map(str::to_lowercase),
            year: Some(
                year.get(row)
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(defaults.year),
            ),
            notes: notes.text(row),
        });
    }

    Ok(parsed)
}

pub fn parse_lessons<R: io::Read>(
    reader: R,
    known_uids: &HashSet<String>,
    defaults: &ImportDefaults,
) -> Result<Parsed<NewLesson>, ImportError> {
    const FILE: &str = "lessons.csv";
    let (index, rows) = read_csv(FILE, reader)?;
    let uid = index.require(FILE, "uid", CLIENT_UID)?;
    let date = index.field(LESSON_DATE);
    let hours = index.field(LESSON_HOURS);
    let teacher = index.field(LESSON_TEACHER);
    let billing = index.field(LESSON_BILLING);
    let paid_teacher = index.field(LESSON_PAID_TEACHER);
    let description = index.field(LESSON_DESCRIPTION);

    let mut parsed = Parsed {
        records: Vec::new(),
        skipped: 0,
    };

    for row in &rows {
        let client_uid = normalize_uid(uid.get(row).unwrap_or_default());
        if !known_uids.contains(&client_uid) {
            tracing::warn!(uid = %client_uid, "client not found for lesson, skipping row");
            parsed.skipped += 1;
            continue;
        }

        let raw_date = date.get(row);
        let lesson_date = raw_date.and_then(parse_record_date);
        if let (Some(raw), None) = (raw_date, lesson_date) {
            tracing::debug!(uid = %client_uid, value = raw, "unparseable lesson date");
        }

        let notes = description.text(row);
        parsed.records.push(NewLesson {
            client_uid,
            lesson_date,
            hours_taught: hours
                .get(row)
                .map_or(Some(Decimal::ONE), parse_hours),
            teacher: Some(teacher.text(row).unwrap_or_else(|| defaults.teacher.clone())),
            lesson_topic: Some(extract_topic(notes.as_deref().unwrap_or_default())),
            paid_or_probono: billing
                .get(row)
                .map(str::to_lowercase)
                .unwrap_or_else(|| "paid".to_string()),
            paid_teacher: paid_teacher.get(row).and_then(parse_record_date),
            notes,
        });
    }

    Ok(parsed)
}

/// Paths of the three exports inside `dir`, failing if any is missing.
pub fn export_paths(dir: &Path) -> Result<[PathBuf; 3], ImportError> {
    let paths = ["clients.csv", "payments.csv", "lessons.csv"].map(|name| dir.join(name));
    let missing: Vec<String> = paths
        .iter()
        .filter(|path| !path.exists())
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();

    if !missing.is_empty() {
        return Err(ImportError::MissingFiles {
            dir: dir.to_path_buf(),
            files: missing,
        });
    }
    Ok(paths)
}

fn open(file: &'static str, path: &Path) -> anyhow::Result<File> {
    File::open(path).with_context(|| format!("failed to open {file} at {}", path.display()))
}

/// Loads the three spreadsheet exports into the store. Clients go first so
/// payments and lessons can resolve their client uid.
pub async fn run_import(
    pool: &PgPool,
    dir: &Path,
    defaults: &ImportDefaults,
) -> anyhow::Result<ImportReport> {
    let [clients_path, payments_path, lessons_path] = export_paths(dir)?;
    let mut report = ImportReport::default();

    let clients = parse_clients(open("clients.csv", &clients_path)?, defaults)?;
    tracing::info!(rows = clients.records.len(), "importing clients");
    for batch in clients.records.chunks(BATCH_SIZE) {
        report.clients.inserted += db::insert_clients(pool, batch).await?;
    }
    report.clients.skipped = clients.skipped;

    let known_uids: HashSet<String> = db::fetch_clients(pool)
        .await?
        .into_iter()
        .map(|client| normalize_uid(&client.uid))
        .collect();

    let payments = parse_payments(open("payments.csv", &payments_path)?, &known_uids, defaults)?;
    tracing::info!(rows = payments.records.len(), "importing payments");
    for batch in payments.records.chunks(BATCH_SIZE) {
        report.payments.inserted += db::insert_payments(pool, batch).await?;
    }
    report.payments.skipped = payments.skipped;

    let lessons = parse_lessons(open("lessons.csv", &lessons_path)?, &known_uids, defaults)?;
    tracing::info!(rows = lessons.records.len(), "importing lessons");
    for batch in lessons.records.chunks(BATCH_SIZE) {
        report.lessons.inserted += db::insert_lessons(pool, batch).await?;
    }
    report.lessons.skipped = lessons.skipped;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn defaults() -> ImportDefaults {
        ImportDefaults {
            teacher: "Rahul".to_string(),
            year: 2024,
        }
    }

    fn known(uids: &[&str]) -> HashSet<String> {
        uids.iter().map(|uid| uid.to_string()).collect()
    }

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn clients_use_sheet_headers_and_defaults() {
        let csv = "UID,full name,status,email,telephone,Lead Source,Teacher\n\
                   al01,Avery Lee,Active,avery@example.com,416-555-0100,Referral,Priya\n\
                   jm02,Jules Moreno,,,,,\n\
                   ,No Uid,active,,,,\n\
                   kp03,,active,,,,\n";

        let parsed = parse_clients(csv.as_bytes(), &defaults()).unwrap();
        assert_eq!(parsed.skipped, 2);
        assert_eq!(parsed.records.len(), 2);

        let avery = &parsed.records[0];
        assert_eq!(avery.uid, "AL01");
        assert_eq!(avery.status, ClientStatus::Active);
        assert_eq!(avery.teacher.as_deref(), Some("Priya"));
        assert_eq!(avery.lead_source.as_deref(), Some("Referral"));

        let jules = &parsed.records[1];
        assert_eq!(jules.status, ClientStatus::Active);
        assert_eq!(jules.teacher.as_deref(), Some("Rahul"));
        assert_eq!(jules.email, None);
    }

    #[test]
    fn earlier_alias_wins_when_both_present() {
        let csv = "uid,name,full_name\nC1,Short,Full Name\nC2,Only Short,\n";
        let parsed = parse_clients(csv.as_bytes(), &defaults()).unwrap();
        assert_eq!(parsed.records[0].full_name, "Full Name");
        assert_eq!(parsed.records[1].full_name, "Only Short");
    }

    #[test]
    fn duplicate_client_uids_keep_first() {
        let csv = "uid,name\nC1,First\nc1,Second\n";
        let parsed = parse_clients(csv.as_bytes(), &defaults()).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].full_name, "First");
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn missing_uid_column_is_an_error() {
        let csv = "name,email\nAvery,a@example.com\n";
        let err = parse_clients(csv.as_bytes(), &defaults()).unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn { field: "uid", .. }));
        assert!(err.to_string().contains("clients.csv"));
    }

    #[test]
    fn payments_map_spreadsheet_columns() {
        let csv = "UID,Full Name,Date (a/receivable),package (payments),# of hours (payments),\
                   amount paid (payments),hourly rate,amount owing (pretax),apply tax (payments),\
                   hst (P),total payment (p),status (p),payment method (p),year (p)\n\
                   c1,Avery Lee,2020/06/10 0:00,10-pack,10,\"$500.00\",50,0,Yes,65,565,Owing,E-Transfer,2020\n\
                   ghost,Nobody,4/23/2020,,1,,,,,,,,,\n\
                   c1,Avery Lee,garbage,,,,,,no,,,,,\n";

        let parsed = parse_payments(csv.as_bytes(), &known(&["C1"]), &defaults()).unwrap();
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.records.len(), 2);

        let first = &parsed.records[0];
        assert_eq!(first.client_uid, "C1");
        assert_eq!(first.payment_date, NaiveDate::from_ymd_opt(2020, 6, 10));
        assert_eq!(first.package_type.as_deref(), Some("10-pack"));
        assert_eq!(first.hours_purchased, Some(dec("10")));
        assert_eq!(first.amount_paid, Some(dec("500.00")));
        assert_eq!(first.amount_owing_pretax, None);
        assert!(first.apply_tax);
        assert_eq!(first.hst_amount, Some(dec("65")));
        assert_eq!(first.total_payment, Some(dec("565")));
        assert_eq!(first.status, PaymentStatus::Owing);
        assert_eq!(first.payment_method.as_deref(), Some("e-transfer"));
        assert_eq!(first.year, Some(2020));

        let second = &parsed.records[1];
        assert_eq!(second.payment_date, None);
        assert_eq!(second.hours_purchased, Some(Decimal::ZERO));
        assert!(!second.apply_tax);
        assert_eq!(second.hst_amount, Some(Decimal::ZERO));
        assert_eq!(second.status, PaymentStatus::Paid);
        assert_eq!(second.year, Some(2024));
    }

    #[test]
    fn lessons_default_hours_and_extract_topic() {
        let csv = "UID,student name,date of lesson,# of hours taught,paid teacher (lesson),\
                   paid or probono,teacher (lesson) drop,Description of Lesson\n\
                   c1,Avery,3/15/2024,1.5,3/31/2024,Probono,Priya,\"worked on essays\ncomments (m): Grade 11 English\"\n\
                   c1,Avery,2024-03-16,,,,,\n\
                   c1,Avery,someday,abc,,,,\n\
                   zz,Ghost,2024-03-16,1,,,,\n";

        let parsed = parse_lessons(csv.as_bytes(), &known(&["C1"]), &defaults()).unwrap();
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.records.len(), 3);

        let first = &parsed.records[0];
        assert_eq!(first.lesson_date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(first.hours_taught, Some(dec("1.5")));
        assert_eq!(first.teacher.as_deref(), Some("Priya"));
        assert_eq!(first.lesson_topic.as_deref(), Some("Grade 11 English"));
        assert_eq!(first.paid_or_probono, "probono");
        assert_eq!(first.paid_teacher, NaiveDate::from_ymd_opt(2024, 3, 31));

        let second = &parsed.records[1];
        assert_eq!(second.hours_taught, Some(Decimal::ONE));
        assert_eq!(second.teacher.as_deref(), Some("Rahul"));
        assert_eq!(second.lesson_topic.as_deref(), Some("General"));
        assert_eq!(second.paid_or_probono, "paid");
        assert_eq!(second.notes, None);

        let third = &parsed.records[2];
        assert_eq!(third.lesson_date, None);
        assert_eq!(third.hours_taught, None);
    }

    #[test]
    fn negative_hours_are_treated_as_unparseable() {
        let payments = "UID,# of hours (payments)\nc1,-3\nc1,0\n";
        let parsed = parse_payments(payments.as_bytes(), &known(&["C1"]), &defaults()).unwrap();
        assert_eq!(parsed.records[0].hours_purchased, None);
        assert_eq!(parsed.records[1].hours_purchased, Some(Decimal::ZERO));

        let lessons = "UID,# of hours taught\nc1,-1.5\nc1,2\n";
        let parsed = parse_lessons(lessons.as_bytes(), &known(&["C1"]), &defaults()).unwrap();
        assert_eq!(parsed.records[0].hours_taught, None);
        assert_eq!(parsed.records[1].hours_taught, Some(dec("2")));
    }

    #[test]
    fn decimals_tolerate_currency_formatting() {
        assert_eq!(parse_decimal("$1,250.50"), Some(dec("1250.50")));
        assert_eq!(parse_decimal(" 3.5 "), Some(dec("3.5")));
        assert_eq!(parse_decimal("n/a"), None);
    }

    #[test]
    fn topic_marker_is_case_insensitive() {
        assert_eq!(extract_topic("Comments (M):  Algebra review "), "Algebra review");
        assert_eq!(extract_topic("no marker here"), "General");
        assert_eq!(extract_topic("comments (m):"), "General");
    }

    #[test]
    fn export_paths_lists_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clients.csv"), "uid,name\n").unwrap();

        let err = export_paths(dir.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("payments.csv"));
        assert!(message.contains("lessons.csv"));
        assert!(!message.contains("clients.csv"));

        std::fs::write(dir.path().join("payments.csv"), "uid\n").unwrap();
        std::fs::write(dir.path().join("lessons.csv"), "uid\n").unwrap();
        assert!(export_paths(dir.path()).is_ok());
    }
}
