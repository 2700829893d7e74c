use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::balance::summary_for;
use crate::models::{Client, ClientSummary, Heatmap, Lesson, Payment, Snapshot};
use crate::stats;

const LEVEL_GLYPHS: [char; 5] = ['·', '░', '▒', '▓', '█'];

pub fn format_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.format("%b %-d, %Y").to_string(),
        None => "-".to_string(),
    }
}

/// One row per client with its hours balance.
pub fn balance_table(
    clients: &[&Client],
    summaries: &BTreeMap<String, ClientSummary>,
) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{:<10} {:<24} {:<9} {:>9} {:>8} {:>10} {:<13} {}",
        "UID", "Name", "Status", "Purchased", "Used", "Remaining", "Last lesson", "Teacher"
    );

    for client in clients {
        let summary = summary_for(summaries, &client.uid);
        let flag = if summary.remaining < Decimal::ZERO {
            " !"
        } else {
            ""
        };
        let _ = writeln!(
            output,
            "{:<10} {:<24} {:<9} {:>8.1}h {:>7.1}h {:>9.1}h {:<13} {}{}",
            client.uid,
            client.full_name,
            client.status,
            summary.total_purchased,
            summary.total_used,
            summary.remaining,
            format_date(summary.last_lesson_date),
            client.teacher.as_deref().unwrap_or("-"),
            flag
        );
    }

    output
}

pub fn payment_table(payments: &[Payment]) -> String {
    let mut output = String::new();
    for payment in payments {
        let money = |value: Option<Decimal>| match value {
            Some(value) if !value.is_zero() => format!("${value:.2}"),
            _ => "-".to_string(),
        };
        let _ = writeln!(
            output,
            "#{:<5} {:<13} {} ({}) {} {:.1}h paid {} hst {} total {} [{}]",
            payment.id,
            format_date(payment.payment_date),
            payment.client_name.as_deref().unwrap_or("Unknown"),
            payment.client_uid,
            payment.package_type.as_deref().unwrap_or("-"),
            payment.hours_purchased.unwrap_or_default(),
            money(payment.amount_paid),
            money(payment.hst_amount),
            money(payment.total_payment),
            payment.status
        );
    }

    let totals = stats::payment_totals(payments);
    let _ = writeln!(
        output,
        "Revenue ${:.2} | Hours sold {:.1} | Outstanding ${:.2}",
        totals.revenue, totals.hours, totals.outstanding
    );
    output
}

pub fn lesson_table(lessons: &[Lesson]) -> String {
    let mut output = String::new();
    for lesson in lessons {
        let _ = writeln!(
            output,
            "#{:<5} {:<13} {} ({}) {:.1}h {} with {} [{}] teacher paid {}",
            lesson.id,
            format_date(lesson.lesson_date),
            lesson.client_name.as_deref().unwrap_or("Unknown"),
            lesson.client_uid,
            lesson.hours_taught.unwrap_or_default(),
            lesson.lesson_topic.as_deref().unwrap_or("General"),
            lesson.teacher.as_deref().unwrap_or("-"),
            lesson.paid_or_probono,
            format_date(lesson.paid_teacher)
        );
    }

    let totals = stats::lesson_totals(lessons);
    let _ = writeln!(
        output,
        "{} lessons | {:.1} hours taught",
        totals.count, totals.hours
    );
    output
}

/// Renders the heatmap with one text row per weekday, one column per week.
pub fn render_heatmap(heatmap: &Heatmap) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Lessons from {} to {}",
        heatmap.start.format("%Y-%m-%d"),
        heatmap.end.format("%Y-%m-%d")
    );

    let mut months = String::from("    ");
    let mut last_month = None;
    for week in &heatmap.weeks {
        let first = week.first_day();
        let key = (first.year(), first.month());
        if last_month != Some(key) {
            months.push_str(&first.format("%b").to_string()[..1]);
            last_month = Some(key);
        } else {
            months.push(' ');
        }
    }
    let _ = writeln!(output, "{}", months.trim_end());

    for (weekday, label) in ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"]
        .iter()
        .enumerate()
    {
        let mut row = format!("{label} ");
        for week in &heatmap.weeks {
            let cell = &week.days[weekday];
            row.push(if cell.in_range {
                LEVEL_GLYPHS[cell.level as usize]
            } else {
                ' '
            });
        }
        let _ = writeln!(output, "{}", row.trim_end());
    }

    let total: usize = heatmap
        .weeks
        .iter()
        .flat_map(|week| week.days.iter())
        .map(|cell| cell.count)
        .sum();
    let _ = writeln!(
        output,
        "{} lessons in range. Less {} More",
        total,
        LEVEL_GLYPHS.iter().collect::<String>()
    );
    output
}

pub fn build_report(snapshot: &Snapshot, heatmap: &Heatmap) -> String {
    let summaries = crate::balance::reconcile(
        &snapshot.clients,
        &snapshot.payments,
        &snapshot.lessons,
    );
    let overview = stats::overview(&snapshot.clients, &summaries);
    let with_hours = stats::hours_report(&snapshot.clients, &summaries);
    let packages = stats::package_breakdown(&snapshot.payments);

    let mut output = String::new();

    let _ = writeln!(output, "# Tutoring Ledger Report");
    let _ = writeln!(output, "Generated for {}", heatmap.end.format("%Y-%m-%d"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Active clients: {}", overview.active_clients);
    let _ = writeln!(output, "- Hours purchased: {:.1}", overview.hours_purchased);
    let _ = writeln!(output, "- Hours used: {:.1}", overview.hours_used);
    let _ = writeln!(output, "- Hours remaining: {:.1}", overview.hours_remaining);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Clients With Hours Remaining");
    if with_hours.is_empty() {
        let _ = writeln!(output, "No clients with hours remaining.");
    } else {
        for balance in &with_hours {
            let _ = writeln!(
                output,
                "- {} ({}): {:.1}h purchased, {:.1}h used, {:.1}h remaining, last lesson {}",
                balance.full_name,
                balance.uid,
                balance.summary.total_purchased,
                balance.summary.total_used,
                balance.summary.remaining,
                format_date(balance.summary.last_lesson_date)
            );
        }
    }

    let overdrawn: Vec<(&Client, ClientSummary)> = snapshot
        .clients
        .iter()
        .map(|client| (client, summary_for(&summaries, &client.uid)))
        .filter(|(_, summary)| summary.remaining < Decimal::ZERO)
        .collect();
    if !overdrawn.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Overdrawn Clients");
        for (client, summary) in overdrawn {
            let _ = writeln!(
                output,
                "- {} ({}): {:.1}h owed",
                client.full_name,
                client.uid,
                -summary.remaining
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Packages");
    if packages.is_empty() {
        let _ = writeln!(output, "No payment data available.");
    } else {
        for package in &packages {
            let _ = writeln!(
                output,
                "- {}: {} sold, {:.1}h, ${:.2}",
                package.package_type, package.count, package.hours, package.revenue
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Lesson Activity");
    let _ = writeln!(output, "```");
    let _ = write!(output, "{}", render_heatmap(heatmap));
    let _ = writeln!(output, "```");

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Lessons");
    let mut recent: Vec<&Lesson> = snapshot.lessons.iter().collect();
    recent.sort_by(|a, b| b.lesson_date.cmp(&a.lesson_date));
    if recent.is_empty() {
        let _ = writeln!(output, "No lessons recorded yet.");
    } else {
        for lesson in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} on {}: {}",
                lesson.client_name.as_deref().unwrap_or(&lesson.client_uid),
                format_date(lesson.lesson_date),
                lesson.lesson_topic.as_deref().unwrap_or("General")
            );
        }
    }

    output
}
