use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;

use crate::balance::summary_for;
use crate::models::{
    Client, ClientBalance, ClientStatus, ClientSummary, Lesson, LessonTotals, Overview,
    PackageSummary, Payment, PaymentStatus, PaymentTotals,
};

/// Ontario HST rate applied when a payment is taxable.
pub fn hst_rate() -> Decimal {
    Decimal::new(13, 2)
}

/// Returns `(hst, total)` for an amount paid.
pub fn calculate_tax(amount_paid: Decimal, apply_tax: bool) -> (Decimal, Decimal) {
    if apply_tax && amount_paid > Decimal::ZERO {
        let hst = (amount_paid * hst_rate()).round_dp(2);
        (hst, amount_paid + hst)
    } else {
        (Decimal::ZERO, amount_paid.round_dp(2))
    }
}

pub fn payment_totals(payments: &[Payment]) -> PaymentTotals {
    let mut totals = PaymentTotals::default();
    for payment in payments {
        let total = payment.total_payment.unwrap_or(Decimal::ZERO);
        totals.revenue += total;
        totals.hours += payment.hours_purchased.unwrap_or(Decimal::ZERO);
        if payment.status == PaymentStatus::Owing {
            totals.outstanding += total;
        }
    }
    totals
}

pub fn lesson_totals(lessons: &[Lesson]) -> LessonTotals {
    LessonTotals {
        count: lessons.len(),
        hours: lessons
            .iter()
            .map(|lesson| lesson.hours_taught.unwrap_or(Decimal::ZERO))
            .sum(),
    }
}

/// Groups payments by package type, highest revenue first.
pub fn package_breakdown(payments: &[Payment]) -> Vec<PackageSummary> {
    let mut map: HashMap<String, PackageSummary> = HashMap::new();

    for payment in payments {
        let package_type = payment
            .package_type
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or("Unspecified")
            .to_string();
        let entry = map
            .entry(package_type.clone())
            .or_insert_with(|| PackageSummary {
                package_type,
                count: 0,
                hours: Decimal::ZERO,
                revenue: Decimal::ZERO,
            });
        entry.count += 1;
        entry.hours += payment.hours_purchased.unwrap_or(Decimal::ZERO);
        entry.revenue += payment.total_payment.unwrap_or(Decimal::ZERO);
    }

    let mut packages: Vec<PackageSummary> = map.into_values().collect();
    packages.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| a.package_type.cmp(&b.package_type))
    });
    packages
}

pub fn overview(clients: &[Client], summaries: &BTreeMap<String, ClientSummary>) -> Overview {
    let hours_purchased: Decimal = summaries.values().map(|s| s.total_purchased).sum();
    let hours_used: Decimal = summaries.values().map(|s| s.total_used).sum();

    Overview {
        active_clients: clients
            .iter()
            .filter(|client| client.status == ClientStatus::Active)
            .count(),
        hours_purchased,
        hours_used,
        hours_remaining: hours_purchased - hours_used,
    }
}

/// Clients that still have prepaid hours, largest balance first.
pub fn hours_report(
    clients: &[Client],
    summaries: &BTreeMap<String, ClientSummary>,
) -> Vec<ClientBalance> {
    let mut balances: Vec<ClientBalance> = clients
        .iter()
        .map(|client| ClientBalance {
            uid: client.uid.clone(),
            full_name: client.full_name.clone(),
            summary: summary_for(summaries, &client.uid),
        })
        .filter(|balance| balance.summary.remaining > Decimal::ZERO)
        .collect();

    balances.sort_by(|a, b| b.summary.remaining.cmp(&a.summary.remaining));
    balances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::fixtures::{client, lesson, payment, ymd};
    use crate::balance::reconcile;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn priced(uid: &str, hours: &str, total: &str, package: Option<&str>) -> Payment {
        let mut p = payment(uid, hours);
        p.total_payment = Some(dec(total));
        p.package_type = package.map(str::to_string);
        p
    }

    #[test]
    fn tax_applies_only_when_flagged() {
        assert_eq!(calculate_tax(dec("100"), true), (dec("13.00"), dec("113.00")));
        assert_eq!(calculate_tax(dec("100"), false), (Decimal::ZERO, dec("100")));
        assert_eq!(calculate_tax(Decimal::ZERO, true), (Decimal::ZERO, Decimal::ZERO));
        assert_eq!(calculate_tax(dec("45.50"), true), (dec("5.92"), dec("51.42")));
    }

    #[test]
    fn payment_totals_track_outstanding() {
        let mut owing = priced("C1", "2", "90.40", None);
        owing.status = PaymentStatus::Owing;
        let payments = vec![priced("C1", "10", "452.00", None), owing];

        let totals = payment_totals(&payments);
        assert_eq!(totals.revenue, dec("542.40"));
        assert_eq!(totals.hours, dec("12"));
        assert_eq!(totals.outstanding, dec("90.40"));
    }

    #[test]
    fn lesson_totals_sum_hours() {
        let lessons = vec![
            lesson("C1", "1.5", Some(ymd(2024, 1, 1))),
            lesson("C2", "0.5", None),
        ];
        let totals = lesson_totals(&lessons);
        assert_eq!(totals.count, 2);
        assert_eq!(totals.hours, dec("2.0"));
    }

    #[test]
    fn packages_group_and_sort_by_revenue() {
        let payments = vec![
            priced("C1", "10", "500", Some("10-pack")),
            priced("C2", "10", "500", Some("10-pack")),
            priced("C3", "5", "300", Some("5-pack")),
            priced("C3", "1", "60", None),
            priced("C4", "1", "60", Some("  ")),
        ];

        let packages = package_breakdown(&payments);
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0].package_type, "10-pack");
        assert_eq!(packages[0].count, 2);
        assert_eq!(packages[0].hours, dec("20"));
        assert_eq!(packages[1].package_type, "5-pack");
        assert_eq!(packages[2].package_type, "Unspecified");
        assert_eq!(packages[2].revenue, dec("120"));
    }

    #[test]
    fn overview_and_hours_report() {
        let mut inactive = client("C3", "Kiara Patel");
        inactive.status = ClientStatus::Inactive;
        let clients = vec![client("C1", "Avery Lee"), client("C2", "Jules Moreno"), inactive];
        let payments = vec![payment("C1", "5"), payment("C2", "10"), payment("C3", "1")];
        let lessons = vec![
            lesson("C1", "6", Some(ymd(2024, 1, 1))),
            lesson("C2", "2", Some(ymd(2024, 1, 2))),
        ];
        let summaries = reconcile(&clients, &payments, &lessons);

        let stats = overview(&clients, &summaries);
        assert_eq!(stats.active_clients, 2);
        assert_eq!(stats.hours_purchased, dec("16"));
        assert_eq!(stats.hours_used, dec("8"));
        assert_eq!(stats.hours_remaining, dec("8"));

        let report = hours_report(&clients, &summaries);
        let uids: Vec<&str> = report.iter().map(|b| b.uid.as_str()).collect();
        assert_eq!(uids, vec!["C2", "C3"]);
        assert_eq!(report[0].summary.remaining, dec("8"));
    }
}
