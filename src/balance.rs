use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::models::{normalize_uid, Client, ClientSummary, Lesson, Payment};

/// Derives the hours balance of every client from the full set of payments
/// and lessons. Records pointing at an unknown client are dropped.
pub fn reconcile(
    clients: &[Client],
    payments: &[Payment],
    lessons: &[Lesson],
) -> BTreeMap<String, ClientSummary> {
    let mut summaries: BTreeMap<String, ClientSummary> = clients
        .iter()
        .map(|client| (normalize_uid(&client.uid), ClientSummary::default()))
        .collect();

    for payment in payments {
        if let Some(entry) = summaries.get_mut(&normalize_uid(&payment.client_uid)) {
            entry.total_purchased += payment.hours_purchased.unwrap_or(Decimal::ZERO);
            entry.payment_count += 1;
        }
    }

    for lesson in lessons {
        if let Some(entry) = summaries.get_mut(&normalize_uid(&lesson.client_uid)) {
            entry.total_used += lesson.hours_taught.unwrap_or(Decimal::ZERO);
            entry.lesson_count += 1;
            if lesson.lesson_date > entry.last_lesson_date {
                entry.last_lesson_date = lesson.lesson_date;
            }
        }
    }

    for entry in summaries.values_mut() {
        entry.remaining = entry.total_purchased - entry.total_used;
    }

    summaries
}

/// Looks up a client's summary, falling back to an empty balance.
pub fn summary_for(summaries: &BTreeMap<String, ClientSummary>, uid: &str) -> ClientSummary {
    summaries
        .get(&normalize_uid(uid))
        .cloned()
        .unwrap_or_default()
}

/// Counts how many payments and lessons would go with a deleted client.
pub fn dependent_counts(
    summaries: &BTreeMap<String, ClientSummary>,
    uid: &str,
) -> (usize, usize) {
    let summary = summary_for(summaries, uid);
    (summary.payment_count, summary.lesson_count)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn client_without_records_has_empty_balance() {
        let clients = vec![client("C1", "Avery Lee")];
        let summaries = reconcile(&clients, &[], &[]);

        let summary = &summaries["C1"];
        assert_eq!(summary.total_purchased, Decimal::ZERO);
        assert_eq!(summary.total_used, Decimal::ZERO);
        assert_eq!(summary.remaining, Decimal::ZERO);
        assert_eq!(summary.last_lesson_date, None);
        assert_eq!(summary.payment_count, 0);
        assert_eq!(summary.lesson_count, 0);
    }

    #[test]
    fn remaining_is_purchased_minus_used() {
        let clients = vec![client("C1", "Avery Lee")];
        let payments = vec![payment("C1", "6.0"), payment("C1", "4.0")];
        let lessons = vec![
            lesson("C1", "1.5", Some(ymd(2024, 2, 1))),
            lesson("C1", "2.0", Some(ymd(2024, 2, 8))),
        ];

        let summaries = reconcile(&clients, &payments, &lessons);
        let summary = &summaries["C1"];
        assert_eq!(summary.total_purchased, dec("10.0"));
        assert_eq!(summary.total_used, dec("3.5"));
        assert_eq!(summary.remaining, dec("6.5"));
        assert_eq!(summary.payment_count, 2);
        assert_eq!(summary.lesson_count, 2);
    }

    #[test]
    fn overdraft_goes_negative() {
        let clients = vec![client("C1", "Avery Lee")];
        let payments = vec![payment("C1", "1.0")];
        let lessons = vec![
            lesson("C1", "1.0", Some(ymd(2024, 2, 1))),
            lesson("C1", "1.5", Some(ymd(2024, 2, 2))),
        ];

        let summary = &reconcile(&clients, &payments, &lessons)["C1"];
        assert_eq!(summary.remaining, dec("-1.5"));
        assert_eq!(summary.remaining, summary.total_purchased - summary.total_used);
    }

    #[test]
    fn orphaned_records_are_ignored() {
        let clients = vec![client("C1", "Avery Lee")];
        let payments = vec![payment("C1", "2.0"), payment("GHOST", "50.0")];
        let lessons = vec![lesson("GHOST", "3.0", Some(ymd(2024, 2, 1)))];

        let summaries = reconcile(&clients, &payments, &lessons);
        assert_eq!(summaries.len(), 1);
        assert!(!summaries.contains_key("GHOST"));
        assert_eq!(summaries["C1"].total_purchased, dec("2.0"));
        assert_eq!(summaries["C1"].lesson_count, 0);
    }

    #[test]
    fn client_reference_is_case_insensitive() {
        let clients = vec![client("ab12", "Jules Moreno")];
        let payments = vec![payment("AB12 ", "3.0")];
        let lessons = vec![lesson("Ab12", "1.0", None)];

        let summaries = reconcile(&clients, &payments, &lessons);
        let summary = &summaries["AB12"];
        assert_eq!(summary.remaining, dec("2.0"));
        assert_eq!(summary.last_lesson_date, None);
    }

    #[test]
    fn missing_hours_count_as_zero() {
        let clients = vec![client("C1", "Avery Lee")];
        let mut blank = payment("C1", "0");
        blank.hours_purchased = None;
        let mut untimed = lesson("C1", "0", Some(ymd(2024, 1, 1)));
        untimed.hours_taught = None;

        let summary = &reconcile(&clients, &[blank], &[untimed])["C1"];
        assert_eq!(summary.total_purchased, Decimal::ZERO);
        assert_eq!(summary.total_used, Decimal::ZERO);
        assert_eq!(summary.payment_count, 1);
        assert_eq!(summary.lesson_count, 1);
    }

    #[test]
    fn last_lesson_date_ignores_input_order() {
        let clients = vec![client("C1", "Avery Lee")];
        let lessons = vec![
            lesson("C1", "1.0", Some(ymd(2024, 1, 5))),
            lesson("C1", "1.0", None),
            lesson("C1", "1.0", Some(ymd(2024, 3, 9))),
            lesson("C1", "1.0", Some(ymd(2024, 2, 20))),
        ];

        let summary = &reconcile(&clients, &[], &lessons)["C1"];
        assert_eq!(summary.last_lesson_date, Some(ymd(2024, 3, 9)));
    }

    #[test]
    fn reconcile_is_idempotent() {
        let clients = vec![client("C1", "Avery Lee"), client("C2", "Kiara Patel")];
        let payments = vec![payment("C1", "10.0"), payment("C2", "0.3")];
        let lessons = vec![
            lesson("C1", "0.1", Some(ymd(2024, 1, 1))),
            lesson("C2", "0.2", Some(ymd(2024, 1, 2))),
        ];

        let first = reconcile(&clients, &payments, &lessons);
        let second = reconcile(&clients, &payments, &lessons);
        assert_eq!(first, second);
        assert_eq!(first["C2"].remaining, dec("0.1"));
    }

    #[test]
    fn summary_for_unknown_client_is_default() {
        let summaries = reconcile(&[client("C1", "Avery Lee")], &[payment("C1", "2")], &[]);
        assert_eq!(summary_for(&summaries, "nope"), ClientSummary::default());
        assert_eq!(summary_for(&summaries, "c1").total_purchased, dec("2"));
        assert_eq!(dependent_counts(&summaries, "C1"), (1, 0));
    }
}
