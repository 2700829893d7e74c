use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Inactive,
    #[serde(untagged)]
    Other(String),
}

impl ClientStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "active" => ClientStatus::Active,
            "inactive" => ClientStatus::Inactive,
            other => ClientStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ClientStatus::Active => "active",
            ClientStatus::Inactive => "inactive",
            ClientStatus::Other(value) => value,
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Owing,
    #[serde(untagged)]
    Other(String),
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "paid" => PaymentStatus::Paid,
            "owing" => PaymentStatus::Owing,
            other => PaymentStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Owing => "owing",
            PaymentStatus::Other(value) => value,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Uppercases and trims a client identifier so lookups are case-insensitive.
pub fn normalize_uid(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub id: i64,
    pub uid: String,
    pub full_name: String,
    pub status: ClientStatus,
    pub teacher: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
    pub lead_source: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: i64,
    pub client_uid: String,
    pub client_name: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub package_type: Option<String>,
    pub hours_purchased: Option<Decimal>,
    pub amount_paid: Option<Decimal>,
    pub hourly_rate: Option<Decimal>,
    pub amount_owing_pretax: Option<Decimal>,
    pub apply_tax: bool,
    pub hst_amount: Option<Decimal>,
    pub total_payment: Option<Decimal>,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub year: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lesson {
    pub id: i64,
    pub client_uid: String,
    pub client_name: Option<String>,
    pub lesson_date: Option<NaiveDate>,
    pub hours_taught: Option<Decimal>,
    pub teacher: Option<String>,
    pub lesson_topic: Option<String>,
    pub paid_or_probono: String,
    pub paid_teacher: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Hours balance for one client, derived from its payments and lessons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientSummary {
    pub total_purchased: Decimal,
    pub total_used: Decimal,
    pub remaining: Decimal,
    pub last_lesson_date: Option<NaiveDate>,
    pub payment_count: usize,
    pub lesson_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapCell {
    pub date: NaiveDate,
    pub count: usize,
    pub level: u8,
    pub in_range: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapWeek {
    pub days: [HeatmapCell; 7],
}

impl HeatmapWeek {
    pub fn first_day(&self) -> NaiveDate {
        self.days[0].date
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heatmap {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub weeks: Vec<HeatmapWeek>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentTotals {
    pub revenue: Decimal,
    pub hours: Decimal,
    pub outstanding: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LessonTotals {
    pub count: usize,
    pub hours: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    pub package_type: String,
    pub count: usize,
    pub hours: Decimal,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub active_clients: usize,
    pub hours_purchased: Decimal,
    pub hours_used: Decimal,
    pub hours_remaining: Decimal,
}

/// A client joined with its balance, used for the hours report.
#[derive(Debug, Clone, Serialize)]
pub struct ClientBalance {
    pub uid: String,
    pub full_name: String,
    pub summary: ClientSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub uid: String,
    pub full_name: String,
    pub status: ClientStatus,
    pub teacher: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
    pub lead_source: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub client_uid: String,
    pub payment_date: Option<NaiveDate>,
    pub package_type: Option<String>,
    pub hours_purchased: Option<Decimal>,
    pub amount_paid: Option<Decimal>,
    pub hourly_rate: Option<Decimal>,
    pub amount_owing_pretax: Option<Decimal>,
    pub apply_tax: bool,
    pub hst_amount: Option<Decimal>,
    pub total_payment: Option<Decimal>,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub year: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLesson {
    pub client_uid: String,
    pub lesson_date: Option<NaiveDate>,
    pub hours_taught: Option<Decimal>,
    pub teacher: Option<String>,
    pub lesson_topic: Option<String>,
    pub paid_or_probono: String,
    pub paid_teacher: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// One consistent read of all three collections.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub clients: Vec<Client>,
    pub payments: Vec<Payment>,
    pub lessons: Vec<Lesson>,
}
